// crates/core/src/signal.rs
//! Lifecycle signals carried by individual events.
//!
//! Both the progress reconciler and the terminal-state detector read events
//! through these functions, so the two always agree on what "completed" and
//! "failed" mean.

use opwatch_types::{LifecycleStatus, OperationEvent, Severity};

const COMPLETION_KINDS: &[&str] = &["workflow_completed", "completed"];
const FAILURE_KINDS: &[&str] = &["workflow_failed", "failed"];

const COMPLETION_TEXT: &str = "workflow completed";
const FAILURE_TEXT: &str = "workflow failed";

fn kind_is(event: &OperationEvent, kinds: &[&str]) -> bool {
    event
        .event_type
        .as_deref()
        .is_some_and(|kind| kinds.iter().any(|k| kind.eq_ignore_ascii_case(k)))
}

fn text_mentions(event: &OperationEvent, needle: &str) -> bool {
    event.text.to_ascii_lowercase().contains(needle)
}

/// The event marks completion of the whole workflow.
pub fn is_completion_marker(event: &OperationEvent) -> bool {
    kind_is(event, COMPLETION_KINDS) || text_mentions(event, COMPLETION_TEXT)
}

/// The event explicitly marks the workflow as failed.
pub fn is_failure_marker(event: &OperationEvent) -> bool {
    kind_is(event, FAILURE_KINDS) || text_mentions(event, FAILURE_TEXT)
}

/// An `error` event ends the workflow unless the server tagged it
/// `terminal: false` (e.g. a retried step).
pub fn is_workflow_ending_error(event: &OperationEvent) -> bool {
    event.severity == Severity::Error && event.terminal != Some(false)
}

pub fn signals_failure(event: &OperationEvent) -> bool {
    is_failure_marker(event) || is_workflow_ending_error(event)
}

/// Terminal lifecycle state this event drives the operation into, if any.
/// Failure wins when one event carries both signals.
pub fn terminal_signal(event: &OperationEvent) -> Option<LifecycleStatus> {
    if signals_failure(event) {
        Some(LifecycleStatus::Failed)
    } else if is_completion_marker(event) {
        Some(LifecycleStatus::Completed)
    } else {
        None
    }
}

/// The event carries step or progress information (or a terminal marker),
/// which makes its buffer a usable progress source.
pub fn carries_progress(event: &OperationEvent) -> bool {
    event.step.is_some()
        || event.step_index.is_some()
        || event.total_steps.is_some()
        || event.elapsed_seconds.is_some()
        || terminal_signal(event).is_some()
}

/// First terminal signal in arrival order.
pub fn first_terminal_signal<'a, I>(events: I) -> Option<LifecycleStatus>
where
    I: IntoIterator<Item = &'a OperationEvent>,
{
    events.into_iter().find_map(terminal_signal)
}
