// crates/core/src/reconcile.rs
//! Progress reconciliation across the three data sources.
//!
//! Source priority is strict, first source that yields information wins:
//!
//! 1. Live push-channel events received during this session
//! 2. The historical event log (page reload mid-operation)
//! 3. The persisted step history (finished operations, server restarts)
//!
//! On top of that the reconciler never hands out a lower `progress_percent`
//! or `elapsed_seconds` than it already returned for the same operation, and
//! a terminal record is never replaced.

use opwatch_types::{LifecycleStatus, OperationEvent, ProgressRecord, ProgressSource, StepRecord};

use crate::signal::{carries_progress, first_terminal_signal};

/// Borrowed view of everything the reconciler may consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressSources<'a> {
    /// Full live buffer (including entries hidden by a display clear).
    pub live: &'a [OperationEvent],
    /// `None` until the historical log has been fetched successfully.
    pub event_log: Option<&'a [OperationEvent]>,
    /// `None` until the step history has been fetched successfully.
    pub step_history: Option<&'a [StepRecord]>,
}

/// `round(completed / total * 100)`, clamped to 0..=100.
fn percent_of(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(completed) / f64::from(total) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Whole seconds from a server-reported float; negative or NaN reads as 0.
fn whole_seconds(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.floor() as u64
    } else {
        0
    }
}

/// Derive a record from an ordered event list (sources 1 and 2).
///
/// Returns `None` when no event carries step/progress information.
pub fn derive_from_events(events: &[OperationEvent], source: ProgressSource) -> Option<ProgressRecord> {
    if !events.iter().any(carries_progress) {
        return None;
    }

    let step_index = events.iter().rev().find_map(|e| e.step_index);
    let total_steps = events.iter().rev().find_map(|e| e.total_steps);
    let current_step = events
        .iter()
        .rev()
        .find_map(|e| e.step.clone())
        .unwrap_or_default();

    let mut progress_percent = match (step_index, total_steps) {
        (Some(index), Some(total)) => percent_of(index.saturating_sub(1).min(total), total),
        _ => 0,
    };

    // Max, never the latest: events may arrive out of order.
    let elapsed_seconds = events
        .iter()
        .filter_map(|e| e.elapsed_seconds)
        .map(whole_seconds)
        .max()
        .unwrap_or(0);

    let lifecycle_status = match first_terminal_signal(events) {
        Some(LifecycleStatus::Completed) => {
            progress_percent = 100;
            LifecycleStatus::Completed
        }
        Some(terminal) => terminal,
        None => LifecycleStatus::Running,
    };

    Some(ProgressRecord {
        current_step,
        step_index,
        total_steps,
        progress_percent,
        elapsed_seconds,
        lifecycle_status,
        source,
    })
}

/// Derive a record from the persisted step history (source 3).
///
/// Returns `None` for an empty history.
pub fn derive_from_steps(steps: &[StepRecord]) -> Option<ProgressRecord> {
    let last = steps.last()?;

    let total = u32::try_from(steps.len()).unwrap_or(u32::MAX);
    let completed = u32::try_from(steps.iter().filter(|s| s.success).count()).unwrap_or(u32::MAX);
    let duration: f64 = steps
        .iter()
        .map(|s| s.duration_seconds)
        .filter(|d| d.is_finite() && *d > 0.0)
        .sum();

    let lifecycle_status = if steps.iter().any(|s| !s.success) {
        LifecycleStatus::Failed
    } else {
        LifecycleStatus::Completed
    };

    Some(ProgressRecord {
        current_step: last.step.clone(),
        step_index: Some(total),
        total_steps: Some(total),
        progress_percent: percent_of(completed, total),
        elapsed_seconds: whole_seconds(duration),
        lifecycle_status,
        source: ProgressSource::StepHistory,
    })
}

/// Apply the priority order without any memory of earlier results.
pub fn derive(sources: ProgressSources<'_>) -> ProgressRecord {
    derive_from_events(sources.live, ProgressSource::Live)
        .or_else(|| {
            sources
                .event_log
                .and_then(|log| derive_from_events(log, ProgressSource::EventLog))
        })
        .or_else(|| sources.step_history.and_then(derive_from_steps))
        .unwrap_or_else(ProgressRecord::pending)
}

/// Merge a freshly derived record into the previously returned one.
///
/// - terminal records are frozen
/// - percent and elapsed never decrease
/// - completion snaps percent to 100, failure holds it
/// - when the fresh record sits behind the previous one (e.g. a late live
///   stream behind an already-applied poll), the previous step position is
///   kept until the fresh source catches up
pub fn merge_monotonic(previous: &ProgressRecord, fresh: ProgressRecord) -> ProgressRecord {
    if previous.lifecycle_status.is_terminal() {
        return previous.clone();
    }
    if fresh.source == ProgressSource::None && previous.source != ProgressSource::None {
        return previous.clone();
    }

    let mut merged = fresh;
    merged.elapsed_seconds = merged.elapsed_seconds.max(previous.elapsed_seconds);

    if merged.progress_percent < previous.progress_percent {
        merged.progress_percent = previous.progress_percent;
        merged.current_step = previous.current_step.clone();
        merged.step_index = previous.step_index;
        merged.total_steps = previous.total_steps;
    }
    if merged.lifecycle_status == LifecycleStatus::Completed {
        merged.progress_percent = 100;
    }
    merged
}

/// Stateful reconciler for one operation within one observation session.
#[derive(Debug, Clone, Default)]
pub struct ProgressReconciler {
    last: Option<ProgressRecord>,
}

impl ProgressReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last record handed out, if any.
    pub fn last(&self) -> Option<&ProgressRecord> {
        self.last.as_ref()
    }

    /// Recompute the authoritative record. Caller-visible values are
    /// `max(newly computed, previously returned)`.
    pub fn compute(&mut self, sources: ProgressSources<'_>) -> ProgressRecord {
        let fresh = derive(sources);
        let record = match &self.last {
            Some(previous) => merge_monotonic(previous, fresh),
            None => fresh,
        };
        self.last = Some(record.clone());
        record
    }
}
