// crates/client/src/api.rs
//! The server-side collaborators the tracker depends on.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use opwatch_types::{LogQuery, OperationEvent, OperationId, StepRecord};
use tracing::warn;

use crate::error::ClientError;

/// Raw frame payloads from a push channel. The stream ends when the server
/// closes the channel; an `Err` item means the transport failed.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

/// Push channel, historical log, step history and cancel endpoints for
/// operations on one server.
#[async_trait]
pub trait OperationApi: Send + Sync {
    /// Open the push channel. Resolves once the server accepted the request.
    async fn open_stream(&self, id: &OperationId) -> Result<FrameStream, ClientError>;

    /// Events the server has already recorded for the operation.
    async fn event_log(
        &self,
        id: &OperationId,
        query: LogQuery,
    ) -> Result<Vec<OperationEvent>, ClientError>;

    /// Persisted per-step results, in execution order.
    async fn step_history(&self, id: &OperationId) -> Result<Vec<StepRecord>, ClientError>;

    async fn cancel(&self, id: &OperationId) -> Result<(), ClientError>;

    /// The whole historical log, read `page_size` entries at a time until a
    /// short page. A single capped request would return only the oldest
    /// entries and miss the latest step events of a long operation.
    ///
    /// Only a failure on the first page is an error; a later failure keeps
    /// the pages already read. Gives up after `max_pages`.
    async fn full_event_log(
        &self,
        id: &OperationId,
        page_size: usize,
        max_pages: usize,
    ) -> Result<Vec<OperationEvent>, ClientError> {
        let page_size = page_size.max(1);
        let mut events: Vec<OperationEvent> = Vec::new();
        for page_number in 0..max_pages.max(1) {
            let query = LogQuery {
                limit: Some(page_size),
                offset: Some(events.len()),
                severity: None,
            };
            let page = match self.event_log(id, query).await {
                Ok(page) => page,
                Err(e) if page_number == 0 => return Err(e),
                Err(e) => {
                    warn!(
                        operation_id = %id,
                        read = events.len(),
                        error = %e,
                        "Event log page failed, keeping partial log"
                    );
                    return Ok(events);
                }
            };
            let short = page.len() < page_size;
            events.extend(page);
            if short {
                return Ok(events);
            }
        }
        warn!(
            operation_id = %id,
            max_pages,
            read = events.len(),
            "Event log longer than page cap"
        );
        Ok(events)
    }
}
