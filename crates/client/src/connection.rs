// crates/client/src/connection.rs
//! Stream Connection Manager: at most one push-channel task per operation.
//!
//! Each channel runs as a pump task that forwards what it reads to the
//! tracker loop as [`StreamSignal`]s tagged with the channel token. The
//! manager never retries on its own; a failed channel reports once and
//! exits, and reopening is the caller's decision.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use opwatch_types::OperationId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::OperationApi;

/// What a pump task observed on its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    Opened { id: OperationId, channel: u64 },
    Frame { id: OperationId, channel: u64, payload: String },
    Failed { id: OperationId, channel: u64, reason: String },
    Ended { id: OperationId, channel: u64 },
}

pub struct ConnectionManager {
    api: Arc<dyn OperationApi>,
    signals: mpsc::UnboundedSender<StreamSignal>,
    channels: HashMap<OperationId, JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(api: Arc<dyn OperationApi>, signals: mpsc::UnboundedSender<StreamSignal>) -> Self {
        Self {
            api,
            signals,
            channels: HashMap::new(),
        }
    }

    /// Start a pump for `id`. Any earlier pump for the same id is stopped
    /// first, so two channels never feed one operation.
    pub fn open(&mut self, id: OperationId, channel: u64) {
        if let Some(previous) = self.channels.remove(&id) {
            previous.abort();
        }
        let task = tokio::spawn(pump(
            Arc::clone(&self.api),
            id.clone(),
            channel,
            self.signals.clone(),
        ));
        self.channels.insert(id, task);
    }

    /// Stop the pump for `id`. No-op when none is running.
    pub fn close(&mut self, id: &OperationId) {
        if let Some(task) = self.channels.remove(id) {
            task.abort();
            debug!(operation_id = %id, "Closed push channel");
        }
    }

    pub fn is_open(&self, id: &OperationId) -> bool {
        self.channels.get(id).is_some_and(|task| !task.is_finished())
    }

    /// Number of pump tasks still running.
    pub fn open_count(&self) -> usize {
        self.channels.values().filter(|task| !task.is_finished()).count()
    }

    pub fn close_all(&mut self) {
        for (_, task) in self.channels.drain() {
            task.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

async fn pump(
    api: Arc<dyn OperationApi>,
    id: OperationId,
    channel: u64,
    signals: mpsc::UnboundedSender<StreamSignal>,
) {
    let mut frames = match api.open_stream(&id).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(operation_id = %id, channel, error = %e, "Failed to open push channel");
            let _ = signals.send(StreamSignal::Failed {
                id,
                channel,
                reason: e.reason(),
            });
            return;
        }
    };
    if signals
        .send(StreamSignal::Opened {
            id: id.clone(),
            channel,
        })
        .is_err()
    {
        return;
    }

    while let Some(item) = frames.next().await {
        let signal = match item {
            Ok(payload) => StreamSignal::Frame {
                id: id.clone(),
                channel,
                payload,
            },
            Err(e) => {
                let _ = signals.send(StreamSignal::Failed {
                    id,
                    channel,
                    reason: e.reason(),
                });
                return;
            }
        };
        if signals.send(signal).is_err() {
            return;
        }
    }

    let _ = signals.send(StreamSignal::Ended { id, channel });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FrameStream;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use futures_util::stream;
    use opwatch_types::{LogQuery, OperationEvent, StepRecord};

    /// Channels that open and then stay silent.
    struct SilentApi;

    #[async_trait]
    impl OperationApi for SilentApi {
        async fn open_stream(&self, _id: &OperationId) -> Result<FrameStream, ClientError> {
            Ok(stream::pending().boxed())
        }

        async fn event_log(
            &self,
            _id: &OperationId,
            _query: LogQuery,
        ) -> Result<Vec<OperationEvent>, ClientError> {
            Ok(Vec::new())
        }

        async fn step_history(&self, _id: &OperationId) -> Result<Vec<StepRecord>, ClientError> {
            Ok(Vec::new())
        }

        async fn cancel(&self, _id: &OperationId) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reopen_replaces_previous_pump() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = ConnectionManager::new(Arc::new(SilentApi), tx);
        let id = OperationId::from("wo-1");

        manager.open(id.clone(), 1);
        manager.open(id.clone(), 2);
        assert_eq!(manager.open_count(), 1);
        assert!(manager.is_open(&id));

        assert_eq!(
            rx.recv().await,
            Some(StreamSignal::Opened {
                id: id.clone(),
                channel: 2
            })
        );

        manager.close(&id);
        assert!(!manager.is_open(&id));
        assert_eq!(manager.open_count(), 0);
        manager.close(&id);
    }
}
