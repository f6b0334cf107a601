// crates/client/src/tracker.rs
//! Single-threaded event loop around the [`OperationRegistry`].
//!
//! One tokio task owns the registry and the connection manager. Commands
//! from [`TrackerHandle`]s, push-channel signals, fetch completions and the
//! projection tick are all messages into that task, each processed to
//! completion before the next. Network calls run in their own tasks and
//! report back as messages; the loop itself never awaits I/O.

use std::sync::Arc;

use futures_util::Stream;
use opwatch_core::{Effect, OperationRegistry};
use opwatch_types::{OperationEvent, OperationId, OperationSnapshot, Severity, StepRecord};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tracing::{info, warn};

use crate::api::OperationApi;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, StreamSignal};
use crate::error::{ClientError, TrackerError};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

enum Command {
    Subscribe(OperationId),
    Unsubscribe(OperationId),
    Clear(OperationId),
    Cancel {
        id: OperationId,
        reply: oneshot::Sender<Result<(), TrackerError>>,
    },
    Snapshot {
        id: OperationId,
        reply: oneshot::Sender<Option<OperationSnapshot>>,
    },
    Events {
        id: OperationId,
        severity: Option<Severity>,
        reply: oneshot::Sender<Option<Vec<OperationEvent>>>,
    },
    ActiveIds {
        reply: oneshot::Sender<Vec<OperationId>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Results of network calls started by the loop.
enum Completion {
    EventLog {
        id: OperationId,
        generation: u64,
        result: Result<Vec<OperationEvent>, ClientError>,
    },
    StepHistory {
        id: OperationId,
        generation: u64,
        result: Result<Vec<StepRecord>, ClientError>,
    },
    Cancel {
        id: OperationId,
        result: Result<(), ClientError>,
        reply: oneshot::Sender<Result<(), TrackerError>>,
    },
}

/// Cloneable front door to a running tracker.
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<OperationSnapshot>,
}

impl TrackerHandle {
    fn send(&self, command: Command) -> Result<(), TrackerError> {
        self.commands.send(command).map_err(|_| TrackerError::Stopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TrackerError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| TrackerError::Stopped)
    }

    /// Start observing `id`. Idempotent; reopens an errored channel.
    pub fn subscribe(&self, id: impl Into<OperationId>) -> Result<(), TrackerError> {
        self.send(Command::Subscribe(id.into()))
    }

    pub fn unsubscribe(&self, id: impl Into<OperationId>) -> Result<(), TrackerError> {
        self.send(Command::Unsubscribe(id.into()))
    }

    /// Hide the events received so far from [`TrackerHandle::events`].
    pub fn clear(&self, id: impl Into<OperationId>) -> Result<(), TrackerError> {
        self.send(Command::Clear(id.into()))
    }

    /// Ask the server to cancel `id`. On failure the operation keeps its
    /// current state and the call may be retried.
    pub async fn cancel(&self, id: impl Into<OperationId>) -> Result<(), TrackerError> {
        let id = id.into();
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    pub async fn snapshot(
        &self,
        id: impl Into<OperationId>,
    ) -> Result<Option<OperationSnapshot>, TrackerError> {
        let id = id.into();
        self.request(|reply| Command::Snapshot { id, reply }).await
    }

    pub async fn events(
        &self,
        id: impl Into<OperationId>,
        severity: Option<Severity>,
    ) -> Result<Option<Vec<OperationEvent>>, TrackerError> {
        let id = id.into();
        self.request(|reply| Command::Events { id, severity, reply })
            .await
    }

    /// Operations still being observed with a non-terminal lifecycle.
    pub async fn active_ids(&self) -> Result<Vec<OperationId>, TrackerError> {
        self.request(|reply| Command::ActiveIds { reply }).await
    }

    /// Every snapshot published after this call.
    pub fn updates(&self) -> broadcast::Receiver<OperationSnapshot> {
        self.updates.subscribe()
    }

    /// [`TrackerHandle::updates`] as a stream; lagged gaps are skipped.
    pub fn update_stream(&self) -> impl Stream<Item = OperationSnapshot> {
        BroadcastStream::new(self.updates.subscribe()).filter_map(Result::ok)
    }

    /// Close every channel and stop the loop. Resolves once it has exited.
    pub async fn shutdown(&self) -> Result<(), TrackerError> {
        self.request(|done| Command::Shutdown { done }).await
    }
}

pub struct Tracker {
    api: Arc<dyn OperationApi>,
    registry: OperationRegistry,
    connections: ConnectionManager,
    commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedReceiver<StreamSignal>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    updates: broadcast::Sender<OperationSnapshot>,
    config: ClientConfig,
}

impl Tracker {
    /// Spawn the event loop on the current runtime.
    pub fn spawn(api: Arc<dyn OperationApi>, config: ClientConfig) -> TrackerHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let tracker = Tracker {
            connections: ConnectionManager::new(Arc::clone(&api), signals_tx),
            api,
            registry: OperationRegistry::new(config.grace_period),
            commands,
            signals,
            completions_tx,
            completions,
            updates: updates.clone(),
            config,
        };
        tokio::spawn(tracker.run());

        TrackerHandle {
            commands: commands_tx,
            updates,
        }
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(base_url = %self.config.base_url, "Tracker started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { done }) => {
                        self.commands.close();
                        self.connections.close_all();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    // Every handle dropped.
                    None => break,
                },
                Some(signal) = self.signals.recv() => self.handle_signal(signal),
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                _ = ticker.tick() => {
                    let effects = self.registry.tick(now());
                    self.apply(effects);
                }
            }
        }

        self.connections.close_all();
        info!("Tracker stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe(id) => {
                let effects = self.registry.subscribe(id, now());
                self.apply(effects);
            }
            Command::Unsubscribe(id) => {
                let effects = self.registry.unsubscribe(&id, now());
                self.apply(effects);
            }
            Command::Clear(id) => {
                let effects = self.registry.clear(&id);
                self.apply(effects);
            }
            Command::Cancel { id, reply } => {
                let api = Arc::clone(&self.api);
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = api.cancel(&id).await;
                    let _ = completions.send(Completion::Cancel { id, result, reply });
                });
            }
            Command::Snapshot { id, reply } => {
                let _ = reply.send(self.registry.snapshot(&id));
            }
            Command::Events {
                id,
                severity,
                reply,
            } => {
                let _ = reply.send(self.registry.events(&id, severity));
            }
            Command::ActiveIds { reply } => {
                let _ = reply.send(self.registry.active_ids());
            }
            Command::Shutdown { .. } => {}
        }
    }

    fn handle_signal(&mut self, signal: StreamSignal) {
        let effects = match signal {
            StreamSignal::Opened { id, channel } => self.registry.stream_opened(&id, channel),
            StreamSignal::Frame {
                id,
                channel,
                payload,
            } => self.registry.on_frame(&id, channel, &payload, now()),
            StreamSignal::Failed {
                id,
                channel,
                reason,
            } => self.registry.stream_failed(&id, channel, &reason, now()),
            StreamSignal::Ended { id, channel } => self.registry.stream_ended(&id, channel, now()),
        };
        self.apply(effects);
    }

    fn handle_completion(&mut self, completion: Completion) {
        let effects = match completion {
            Completion::EventLog {
                id,
                generation,
                result,
            } => match result {
                Ok(events) => self.registry.event_log_loaded(&id, generation, events, now()),
                Err(e) => self
                    .registry
                    .event_log_failed(&id, generation, &e.reason(), now()),
            },
            Completion::StepHistory {
                id,
                generation,
                result,
            } => match result {
                Ok(steps) => self.registry.step_history_loaded(&id, generation, steps, now()),
                Err(e) => self
                    .registry
                    .step_history_failed(&id, generation, &e.reason(), now()),
            },
            Completion::Cancel { id, result, reply } => match result {
                Ok(()) => {
                    info!(operation_id = %id, "Cancel accepted by server");
                    let _ = reply.send(Ok(()));
                    self.registry.cancel_succeeded(&id)
                }
                Err(e) => {
                    warn!(operation_id = %id, error = %e, "Cancel rejected");
                    let _ = reply.send(Err(TrackerError::CancelFailed {
                        operation_id: id,
                        reason: e.reason(),
                    }));
                    Vec::new()
                }
            },
        };
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenStream {
                    operation_id,
                    channel,
                } => self.connections.open(operation_id, channel),
                Effect::CloseStream { operation_id } => self.connections.close(&operation_id),
                Effect::FetchEventLog {
                    operation_id,
                    generation,
                } => {
                    let api = Arc::clone(&self.api);
                    let completions = self.completions_tx.clone();
                    let (page_size, max_pages) =
                        (self.config.event_log_limit, self.config.event_log_max_pages);
                    tokio::spawn(async move {
                        let result = api
                            .full_event_log(&operation_id, page_size, max_pages)
                            .await;
                        let _ = completions.send(Completion::EventLog {
                            id: operation_id,
                            generation,
                            result,
                        });
                    });
                }
                Effect::FetchStepHistory {
                    operation_id,
                    generation,
                } => {
                    let api = Arc::clone(&self.api);
                    let completions = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let result = api.step_history(&operation_id).await;
                        let _ = completions.send(Completion::StepHistory {
                            id: operation_id,
                            generation,
                            result,
                        });
                    });
                }
                Effect::Publish(snapshot) => {
                    // No receivers is fine.
                    let _ = self.updates.send(snapshot);
                }
            }
        }
    }
}

/// Monotonic now, routed through tokio so paused-clock tests control it.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
