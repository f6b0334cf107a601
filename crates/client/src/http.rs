// crates/client/src/http.rs
//! [`OperationApi`] over HTTP: JSON request/response calls plus an SSE push
//! channel.

use async_trait::async_trait;
use futures_util::StreamExt;
use opwatch_types::{EventLogPage, LogQuery, OperationEvent, OperationId, StepHistory, StepRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::api::{FrameStream, OperationApi};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::sse::data_frames;

/// Servers answer the log endpoint either with a bare array or a page object.
#[derive(Deserialize)]
#[serde(untagged)]
enum LogBody {
    Entries(Vec<OperationEvent>),
    Page(EventLogPage),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepsBody {
    Steps(Vec<StepRecord>),
    History(StepHistory),
}

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        // No overall timeout on the client: the push channel is long-lived.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let body = checked(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Turn a non-success status into [`ClientError::Status`].
async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl OperationApi for HttpApi {
    async fn open_stream(&self, id: &OperationId) -> Result<FrameStream, ClientError> {
        let url = self.config.url(&self.config.endpoints.stream, id)?;
        debug!(operation_id = %id, %url, "Opening event stream");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        let response = checked(response).await?;
        Ok(data_frames(response.bytes_stream()).boxed())
    }

    async fn event_log(
        &self,
        id: &OperationId,
        query: LogQuery,
    ) -> Result<Vec<OperationEvent>, ClientError> {
        let mut url = self.config.url(&self.config.endpoints.event_log, id)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = query.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
            if let Some(severity) = query.severity {
                pairs.append_pair("severity", severity.as_str());
            }
        }
        // Drop a dangling `?` when no filter was set.
        if url.query() == Some("") {
            url.set_query(None);
        }
        let body: LogBody = self.get_json(url).await?;
        Ok(match body {
            LogBody::Entries(entries) => entries,
            LogBody::Page(page) => page.entries,
        })
    }

    async fn step_history(&self, id: &OperationId) -> Result<Vec<StepRecord>, ClientError> {
        let url = self.config.url(&self.config.endpoints.step_history, id)?;
        let body: StepsBody = self.get_json(url).await?;
        Ok(match body {
            StepsBody::Steps(steps) => steps,
            StepsBody::History(history) => history.steps,
        })
    }

    async fn cancel(&self, id: &OperationId) -> Result<(), ClientError> {
        let url = self.config.url(&self.config.endpoints.cancel, id)?;
        let response = self
            .client
            .post(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }
}
