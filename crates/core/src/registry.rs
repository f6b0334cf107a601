// crates/core/src/registry.rs
//! Process-wide map of tracked operations.
//!
//! The registry is sans-IO: every input (subscribe, inbound frame, fetch
//! result, tick) is applied to completion and answered with a list of
//! [`Effect`]s for the event loop to carry out. Nothing here awaits, spawns
//! or locks, so interleaving many operations needs no synchronisation.
//!
//! Stale results are recognised by two tokens:
//!
//! - `generation` is assigned when an entry is created. Fetch results carry
//!   it back; a mismatch means the entry was torn down (and possibly
//!   re-created) while the fetch was outstanding.
//! - `channel` is assigned every time a push channel is opened. Frames from
//!   a channel that has since been closed or replaced are ignored.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use opwatch_types::{
    ConnectionState, LifecycleStatus, OperationEvent, OperationId, OperationSnapshot,
    ProgressRecord, ProgressSource, Severity, StepRecord,
};
use tracing::{debug, info, warn};

use crate::buffer::EventBuffer;
use crate::frame::parse_frame;
use crate::lifecycle::TerminalStateDetector;
use crate::projector::ElapsedProjector;
use crate::reconcile::{ProgressReconciler, ProgressSources};

/// Work the event loop must perform on behalf of the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open the push channel; report frames with the given channel token.
    OpenStream { operation_id: OperationId, channel: u64 },
    /// Close whatever push channel is open for the operation.
    CloseStream { operation_id: OperationId },
    FetchEventLog { operation_id: OperationId, generation: u64 },
    FetchStepHistory { operation_id: OperationId, generation: u64 },
    /// Deliver a fresh snapshot to observers.
    Publish(OperationSnapshot),
}

impl Effect {
    pub fn operation_id(&self) -> &OperationId {
        match self {
            Effect::OpenStream { operation_id, .. }
            | Effect::CloseStream { operation_id }
            | Effect::FetchEventLog { operation_id, .. }
            | Effect::FetchStepHistory { operation_id, .. } => operation_id,
            Effect::Publish(snapshot) => &snapshot.operation_id,
        }
    }
}

/// Progress of one request/response fetch.
#[derive(Debug, Clone, PartialEq)]
enum FetchState<T> {
    NotRequested,
    InFlight,
    Loaded(T),
    /// Fetch failed; treated as an empty source.
    Failed,
}

impl<T> FetchState<T> {
    fn loaded(&self) -> Option<&T> {
        match self {
            FetchState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, FetchState::Loaded(_) | FetchState::Failed)
    }
}

// =============================================================================
// Per-operation state
// =============================================================================

#[derive(Debug)]
struct TrackedOperation {
    id: OperationId,
    generation: u64,
    channel: u64,
    connection: ConnectionState,
    buffer: EventBuffer,
    event_log: FetchState<Vec<OperationEvent>>,
    step_history: FetchState<Vec<StepRecord>>,
    reconciler: ProgressReconciler,
    projector: ElapsedProjector,
    detector: TerminalStateDetector,
    progress: ProgressRecord,
    malformed_frames: u64,
    /// Cleanup has run: channel closed, projector frozen.
    finished: bool,
    /// Set by `unsubscribe`; the entry is reaped once the grace period ends.
    retired_at: Option<Instant>,
    last_published_display: Option<u64>,
}

impl TrackedOperation {
    fn new(id: OperationId, generation: u64, channel: u64) -> Self {
        Self {
            id,
            generation,
            channel,
            connection: ConnectionState::Connecting,
            buffer: EventBuffer::new(),
            event_log: FetchState::NotRequested,
            step_history: FetchState::NotRequested,
            reconciler: ProgressReconciler::new(),
            projector: ElapsedProjector::new(),
            detector: TerminalStateDetector::new(),
            progress: ProgressRecord::pending(),
            malformed_frames: 0,
            finished: false,
            retired_at: None,
            last_published_display: None,
        }
    }

    fn is_live(&self) -> bool {
        self.retired_at.is_none()
    }

    fn channel_open(&self) -> bool {
        matches!(
            self.connection,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    /// Recompute the authoritative record from every loaded source.
    fn reconcile(&mut self, now: Instant) {
        if self.finished {
            return;
        }
        let sources = ProgressSources {
            live: self.buffer.all(),
            event_log: self.event_log.loaded().map(Vec::as_slice),
            step_history: self.step_history.loaded().map(Vec::as_slice),
        };
        let record = self.reconciler.compute(sources);
        self.detector.on_progress(&record);
        if !self.detector.is_terminal() && record.source != ProgressSource::None {
            self.projector.update(record.elapsed_seconds, now);
        }
        self.progress = record;
    }

    /// Run terminal cleanup once the detector has reached a terminal state.
    fn finish_if_terminal(&mut self, effects: &mut Vec<Effect>) {
        if self.finished || !self.detector.is_terminal() {
            return;
        }
        let terminal = self.detector.state();
        self.progress.lifecycle_status = terminal;
        if terminal == LifecycleStatus::Completed {
            self.progress.progress_percent = 100;
        }
        self.projector.freeze(self.progress.elapsed_seconds);
        self.finished = true;

        if self.channel_open() {
            effects.push(Effect::CloseStream {
                operation_id: self.id.clone(),
            });
        }
        self.connection = ConnectionState::Disconnected;

        info!(
            operation_id = %self.id,
            lifecycle = terminal.as_str(),
            progress_percent = self.progress.progress_percent,
            elapsed_seconds = self.projector.display_seconds(),
            "Operation reached terminal state"
        );
    }

    /// Request the next polling source when the higher-priority ones came up
    /// empty.
    fn plan_fetches(&mut self, effects: &mut Vec<Effect>) {
        if self.finished || !self.is_live() {
            return;
        }
        if self.event_log == FetchState::NotRequested {
            self.event_log = FetchState::InFlight;
            effects.push(Effect::FetchEventLog {
                operation_id: self.id.clone(),
                generation: self.generation,
            });
            return;
        }
        if self.event_log.is_settled()
            && self.step_history == FetchState::NotRequested
            && self.progress.source == ProgressSource::None
        {
            self.step_history = FetchState::InFlight;
            effects.push(Effect::FetchStepHistory {
                operation_id: self.id.clone(),
                generation: self.generation,
            });
        }
    }

    fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            operation_id: self.id.clone(),
            connection: self.connection,
            lifecycle: self.detector.state(),
            progress: self.progress.clone(),
            display_elapsed_seconds: self.projector.display_seconds(),
            visible_events: saturating_u32(self.buffer.visible_len()),
            total_events: saturating_u32(self.buffer.len()),
            malformed_frames: self.malformed_frames,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn publish(&mut self, effects: &mut Vec<Effect>) {
        self.last_published_display = Some(self.projector.display_seconds());
        effects.push(Effect::Publish(self.snapshot()));
    }

    /// Common tail of every input: terminal cleanup, fallback fetches, publish.
    fn settle(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        self.reconcile(now);
        self.finish_if_terminal(effects);
        self.plan_fetches(effects);
        self.publish(effects);
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// =============================================================================
// Registry
// =============================================================================

/// Keyed store of every operation under observation.
#[derive(Debug)]
pub struct OperationRegistry {
    operations: HashMap<OperationId, TrackedOperation>,
    next_generation: u64,
    next_channel: u64,
    grace_period: Duration,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl OperationRegistry {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            operations: HashMap::new(),
            next_generation: 0,
            next_channel: 0,
            grace_period,
        }
    }

    fn issue_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn issue_channel(&mut self) -> u64 {
        self.next_channel += 1;
        self.next_channel
    }

    /// Live (not retired) entry for `id`.
    fn live_mut(&mut self, id: &OperationId) -> Option<&mut TrackedOperation> {
        self.operations.get_mut(id).filter(|op| op.is_live())
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    /// Begin (or resume) observing an operation.
    ///
    /// Idempotent while a channel is connecting or connected. An operation
    /// whose channel errored or closed gets a fresh channel, which is the
    /// caller-driven retry path. A retired entry is replaced by a new
    /// observation session.
    pub fn subscribe(&mut self, id: OperationId, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(op) = self.operations.get(&id) {
            if op.is_live() {
                if op.finished || op.channel_open() {
                    debug!(operation_id = %id, "Subscribe is a no-op, already attached");
                    return effects;
                }
                let channel = self.issue_channel();
                if let Some(op) = self.operations.get_mut(&id) {
                    op.channel = channel;
                    op.connection = ConnectionState::Connecting;
                    info!(operation_id = %id, channel, "Reopening push channel");
                    effects.push(Effect::OpenStream {
                        operation_id: id.clone(),
                        channel,
                    });
                    op.publish(&mut effects);
                }
                return effects;
            }
        }

        let generation = self.issue_generation();
        let channel = self.issue_channel();
        let mut op = TrackedOperation::new(id.clone(), generation, channel);
        info!(operation_id = %id, generation, "Tracking operation");

        effects.push(Effect::OpenStream {
            operation_id: id.clone(),
            channel,
        });
        op.settle(now, &mut effects);
        self.operations.insert(id, op);
        effects
    }

    /// The transport reports the channel is open.
    pub fn stream_opened(&mut self, id: &OperationId, channel: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.live_mut(id) else {
            return effects;
        };
        if op.channel != channel || op.connection != ConnectionState::Connecting {
            return effects;
        }
        op.connection = ConnectionState::Connected;
        debug!(operation_id = %id, channel, "Push channel connected");
        op.publish(&mut effects);
        effects
    }

    /// One inbound text frame from the push channel.
    pub fn on_frame(
        &mut self,
        id: &OperationId,
        channel: u64,
        payload: &str,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.live_mut(id) else {
            return effects;
        };
        if op.channel != channel || !op.channel_open() || op.finished {
            debug!(operation_id = %id, channel, "Dropping frame from inactive channel");
            return effects;
        }
        // Frames prove the channel is up even if the open notification lags.
        op.connection = ConnectionState::Connected;

        match parse_frame(payload) {
            Ok(Some(event)) => {
                op.detector.on_event(&event);
                op.buffer.append(event);
                op.settle(now, &mut effects);
            }
            Ok(None) => {}
            Err(e) => {
                op.malformed_frames += 1;
                warn!(
                    operation_id = %id,
                    malformed_frames = op.malformed_frames,
                    error = %e,
                    "Dropped malformed frame"
                );
                op.publish(&mut effects);
            }
        }
        effects
    }

    /// The push channel failed to open or dropped. The operation itself is
    /// unaffected; progress falls back to the polling sources.
    pub fn stream_failed(
        &mut self,
        id: &OperationId,
        channel: u64,
        reason: &str,
        now: Instant,
    ) -> Vec<Effect> {
        self.stream_closed(id, channel, ConnectionState::Error, Some(reason), now)
    }

    /// The server closed the push channel cleanly.
    pub fn stream_ended(&mut self, id: &OperationId, channel: u64, now: Instant) -> Vec<Effect> {
        self.stream_closed(id, channel, ConnectionState::Disconnected, None, now)
    }

    fn stream_closed(
        &mut self,
        id: &OperationId,
        channel: u64,
        state: ConnectionState,
        reason: Option<&str>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.live_mut(id) else {
            return effects;
        };
        if op.channel != channel || !op.channel_open() || op.finished {
            return effects;
        }
        op.connection = state;
        match reason {
            Some(reason) => warn!(operation_id = %id, channel, reason, "Push channel failed"),
            None => debug!(operation_id = %id, channel, "Push channel closed by server"),
        }
        op.settle(now, &mut effects);
        effects
    }

    pub fn event_log_loaded(
        &mut self,
        id: &OperationId,
        generation: u64,
        events: Vec<OperationEvent>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.accepting_fetch(id, generation, "event log") else {
            return effects;
        };
        debug!(operation_id = %id, count = events.len(), "Historical event log loaded");
        for event in &events {
            op.detector.on_event(event);
        }
        op.event_log = FetchState::Loaded(events);
        op.settle(now, &mut effects);
        effects
    }

    pub fn event_log_failed(
        &mut self,
        id: &OperationId,
        generation: u64,
        reason: &str,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.accepting_fetch(id, generation, "event log") else {
            return effects;
        };
        warn!(operation_id = %id, reason, "Historical event log unavailable");
        op.event_log = FetchState::Failed;
        op.settle(now, &mut effects);
        effects
    }

    pub fn step_history_loaded(
        &mut self,
        id: &OperationId,
        generation: u64,
        steps: Vec<StepRecord>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.accepting_fetch(id, generation, "step history") else {
            return effects;
        };
        debug!(operation_id = %id, count = steps.len(), "Step history loaded");
        op.step_history = FetchState::Loaded(steps);
        op.settle(now, &mut effects);
        effects
    }

    pub fn step_history_failed(
        &mut self,
        id: &OperationId,
        generation: u64,
        reason: &str,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.accepting_fetch(id, generation, "step history") else {
            return effects;
        };
        warn!(operation_id = %id, reason, "Step history unavailable");
        op.step_history = FetchState::Failed;
        op.settle(now, &mut effects);
        effects
    }

    /// Entry a fetch result may be applied to, or `None` if the result is
    /// stale and must be discarded.
    fn accepting_fetch(
        &mut self,
        id: &OperationId,
        generation: u64,
        what: &'static str,
    ) -> Option<&mut TrackedOperation> {
        let accepted = self
            .operations
            .get_mut(id)
            .filter(|op| op.generation == generation && op.is_live() && !op.finished);
        if accepted.is_none() {
            debug!(operation_id = %id, generation, source = what, "Discarding stale fetch result");
        }
        accepted
    }

    /// The server accepted a cancel request for `id`.
    pub fn cancel_succeeded(&mut self, id: &OperationId) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.live_mut(id) else {
            return effects;
        };
        if op.detector.on_cancelled().is_none() {
            return effects;
        }
        op.finish_if_terminal(&mut effects);
        op.publish(&mut effects);
        effects
    }

    /// Stop observing `id`. Safe on unknown or already retired ids.
    ///
    /// The channel closes immediately; the entry keeps answering queries
    /// until the grace period elapses.
    pub fn unsubscribe(&mut self, id: &OperationId, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(op) = self.live_mut(id) else {
            return effects;
        };
        if op.channel_open() {
            effects.push(Effect::CloseStream {
                operation_id: id.clone(),
            });
        }
        op.connection = ConnectionState::Disconnected;
        op.retired_at = Some(now);
        info!(operation_id = %id, "Stopped tracking operation");
        op.publish(&mut effects);
        effects
    }

    /// Hide the buffered events of `id` from display.
    pub fn clear(&mut self, id: &OperationId) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(op) = self.live_mut(id) {
            op.buffer.clear();
            op.publish(&mut effects);
        }
        effects
    }

    /// Periodic timer: advance elapsed projections and reap retired entries.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        let grace = self.grace_period;
        self.operations.retain(|id, op| match op.retired_at {
            Some(retired) if now.saturating_duration_since(retired) >= grace => {
                debug!(operation_id = %id, "Reaped retired operation");
                false
            }
            _ => true,
        });

        let mut effects = Vec::new();
        for op in self.operations.values_mut() {
            if !op.is_live() || op.finished {
                continue;
            }
            let display = op.projector.tick(now);
            if op.last_published_display != Some(display) {
                op.publish(&mut effects);
            }
        }
        effects
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Latest state of `id`, including retired entries still in their grace
    /// period.
    pub fn snapshot(&self, id: &OperationId) -> Option<OperationSnapshot> {
        self.operations.get(id).map(TrackedOperation::snapshot)
    }

    /// Visible events of `id`, optionally restricted to one severity.
    pub fn events(&self, id: &OperationId, severity: Option<Severity>) -> Option<Vec<OperationEvent>> {
        self.operations
            .get(id)
            .map(|op| op.buffer.filter(severity).to_vec())
    }

    pub fn progress(&self, id: &OperationId) -> Option<&ProgressRecord> {
        self.operations.get(id).map(|op| &op.progress)
    }

    pub fn connection(&self, id: &OperationId) -> Option<ConnectionState> {
        self.operations.get(id).map(|op| op.connection)
    }

    pub fn lifecycle(&self, id: &OperationId) -> Option<LifecycleStatus> {
        self.operations.get(id).map(|op| op.detector.state())
    }

    /// Observed and not retired.
    pub fn is_tracked(&self, id: &OperationId) -> bool {
        self.operations.get(id).is_some_and(TrackedOperation::is_live)
    }

    /// Tracked ids whose lifecycle is still open.
    pub fn active_ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self
            .operations
            .values()
            .filter(|op| op.is_live() && !op.finished)
            .map(|op| op.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> OperationId {
        OperationId::from(s)
    }

    fn opened_channel(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|e| match e {
            Effect::OpenStream { channel, .. } => Some(*channel),
            _ => None,
        })
    }

    fn log_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|e| match e {
            Effect::FetchEventLog { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    fn closes(effects: &[Effect]) -> bool {
        effects.iter().any(|e| matches!(e, Effect::CloseStream { .. }))
    }

    fn last_snapshot(effects: &[Effect]) -> Option<&OperationSnapshot> {
        effects.iter().rev().find_map(|e| match e {
            Effect::Publish(s) => Some(s),
            _ => None,
        })
    }

    #[test]
    fn test_subscribe_opens_channel_and_requests_log() {
        let mut registry = OperationRegistry::default();
        let effects = registry.subscribe(id("wo-1"), Instant::now());

        assert!(opened_channel(&effects).is_some());
        assert!(log_generation(&effects).is_some());
        assert_eq!(
            registry.connection(&id("wo-1")),
            Some(ConnectionState::Connecting)
        );
        assert!(registry.is_tracked(&id("wo-1")));
    }

    #[test]
    fn test_second_subscribe_is_idempotent() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let first = registry.subscribe(id("wo-1"), now);
        let channel = opened_channel(&first).unwrap();
        registry.stream_opened(&id("wo-1"), channel);

        let second = registry.subscribe(id("wo-1"), now);
        assert!(second.is_empty());
        assert_eq!(
            registry.connection(&id("wo-1")),
            Some(ConnectionState::Connected)
        );
    }

    #[test]
    fn test_malformed_frame_is_counted_not_buffered() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let channel = opened_channel(&registry.subscribe(id("wo-1"), now)).unwrap();

        let effects = registry.on_frame(&id("wo-1"), channel, "{not json", now);
        let snapshot = last_snapshot(&effects).unwrap();
        assert_eq!(snapshot.malformed_frames, 1);
        assert_eq!(snapshot.total_events, 0);
        assert_eq!(snapshot.lifecycle, LifecycleStatus::Pending);
    }

    #[test]
    fn test_frame_from_replaced_channel_is_ignored() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let old = opened_channel(&registry.subscribe(id("wo-1"), now)).unwrap();
        registry.stream_failed(&id("wo-1"), old, "reset", now);
        let new = opened_channel(&registry.subscribe(id("wo-1"), now)).unwrap();
        assert_ne!(old, new);

        let effects = registry.on_frame(&id("wo-1"), old, r#"{"text":"late"}"#, now);
        assert!(effects.is_empty());
        assert_eq!(registry.events(&id("wo-1"), None).unwrap().len(), 0);
    }

    #[test]
    fn test_transport_error_does_not_fail_operation() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let channel = opened_channel(&registry.subscribe(id("wo-1"), now)).unwrap();
        registry.on_frame(&id("wo-1"), channel, r#"{"text":"started"}"#, now);

        registry.stream_failed(&id("wo-1"), channel, "connection reset", now);
        assert_eq!(registry.connection(&id("wo-1")), Some(ConnectionState::Error));
        assert_eq!(
            registry.lifecycle(&id("wo-1")),
            Some(LifecycleStatus::Running)
        );
    }

    #[test]
    fn test_empty_log_falls_back_to_step_history() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let generation = log_generation(&registry.subscribe(id("wo-1"), now)).unwrap();

        let effects = registry.event_log_loaded(&id("wo-1"), generation, Vec::new(), now);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::FetchStepHistory { .. })));
    }

    #[test]
    fn test_terminal_event_closes_channel_and_freezes() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let channel = opened_channel(&registry.subscribe(id("wo-1"), now)).unwrap();
        registry.stream_opened(&id("wo-1"), channel);
        registry.on_frame(
            &id("wo-1"),
            channel,
            r#"{"stepIndex":2,"totalSteps":4,"elapsedSeconds":12}"#,
            now,
        );

        let effects = registry.on_frame(
            &id("wo-1"),
            channel,
            r#"{"severity":"error","text":"Workflow failed: agent crashed"}"#,
            now,
        );
        assert!(closes(&effects));
        let snapshot = last_snapshot(&effects).unwrap();
        assert_eq!(snapshot.lifecycle, LifecycleStatus::Failed);
        assert_eq!(snapshot.progress.progress_percent, 25);
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);

        // Ten ticks later the display has not moved.
        for secs in 1..=10 {
            assert!(registry.tick(now + Duration::from_secs(secs)).is_empty());
        }
        assert_eq!(
            registry.snapshot(&id("wo-1")).unwrap().display_elapsed_seconds,
            12
        );
        // Re-subscribing a finished operation opens nothing.
        assert!(registry.subscribe(id("wo-1"), now).is_empty());
    }

    #[test]
    fn test_cancel_moves_to_cancelled_and_closes() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        registry.subscribe(id("wo-1"), now);

        let effects = registry.cancel_succeeded(&id("wo-1"));
        assert!(closes(&effects));
        assert_eq!(
            registry.lifecycle(&id("wo-1")),
            Some(LifecycleStatus::Cancelled)
        );
        assert!(registry.cancel_succeeded(&id("wo-1")).is_empty());
    }

    #[test]
    fn test_unsubscribe_discards_outstanding_fetch() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let generation = log_generation(&registry.subscribe(id("wo-1"), now)).unwrap();

        let effects = registry.unsubscribe(&id("wo-1"), now);
        assert!(closes(&effects));

        let late = vec![OperationEvent {
            step_index: Some(3),
            total_steps: Some(4),
            ..Default::default()
        }];
        let effects = registry.event_log_loaded(&id("wo-1"), generation, late, now);
        assert!(effects.is_empty());
        assert_eq!(
            registry.progress(&id("wo-1")),
            Some(&ProgressRecord::pending())
        );
    }

    #[test]
    fn test_retired_entries_are_reaped_after_grace() {
        let mut registry = OperationRegistry::new(Duration::from_secs(5));
        let now = Instant::now();
        registry.subscribe(id("wo-1"), now);
        registry.unsubscribe(&id("wo-1"), now);

        registry.tick(now + Duration::from_secs(4));
        assert!(registry.snapshot(&id("wo-1")).is_some());
        assert!(!registry.is_tracked(&id("wo-1")));

        registry.tick(now + Duration::from_secs(5));
        assert!(registry.snapshot(&id("wo-1")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resubscribe_after_unsubscribe_starts_new_generation() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let first = log_generation(&registry.subscribe(id("wo-1"), now)).unwrap();
        registry.unsubscribe(&id("wo-1"), now);
        let second = log_generation(&registry.subscribe(id("wo-1"), now)).unwrap();
        assert_ne!(first, second);

        // The first session's late result cannot leak into the second.
        let late = vec![OperationEvent {
            text: "workflow completed".into(),
            ..Default::default()
        }];
        assert!(registry
            .event_log_loaded(&id("wo-1"), first, late, now)
            .is_empty());
        assert_eq!(
            registry.lifecycle(&id("wo-1")),
            Some(LifecycleStatus::Pending)
        );
    }

    #[test]
    fn test_tick_publishes_only_when_display_changes() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let channel = opened_channel(&registry.subscribe(id("wo-1"), now)).unwrap();
        registry.on_frame(
            &id("wo-1"),
            channel,
            r#"{"stepIndex":1,"totalSteps":2,"elapsedSeconds":3}"#,
            now,
        );

        assert!(registry.tick(now + Duration::from_millis(500)).is_empty());
        let effects = registry.tick(now + Duration::from_secs(1));
        assert_eq!(last_snapshot(&effects).unwrap().display_elapsed_seconds, 4);
    }

    #[test]
    fn test_clear_hides_events_but_keeps_progress() {
        let mut registry = OperationRegistry::default();
        let now = Instant::now();
        let channel = opened_channel(&registry.subscribe(id("wo-1"), now)).unwrap();
        registry.on_frame(
            &id("wo-1"),
            channel,
            r#"{"stepIndex":3,"totalSteps":4}"#,
            now,
        );
        registry.clear(&id("wo-1"));
        registry.on_frame(&id("wo-1"), channel, r#"{"text":"after clear"}"#, now);

        let visible = registry.events(&id("wo-1"), None).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].text, "after clear");
        assert_eq!(registry.progress(&id("wo-1")).unwrap().progress_percent, 50);
    }
}
