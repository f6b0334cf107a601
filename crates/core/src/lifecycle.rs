// crates/core/src/lifecycle.rs
//! Terminal-state detection for one operation.
//!
//! ```text
//! pending ──► running ──► completed
//!    │           │  └───► failed
//!    └───────────┴──────► cancelled   (successful cancel call only)
//! ```
//!
//! Transport failures are deliberately absent from this machine: a dropped
//! push channel says nothing about the operation itself.

use opwatch_types::{LifecycleStatus, OperationEvent, ProgressRecord};

use crate::signal::terminal_signal;

#[derive(Debug, Clone, Default)]
pub struct TerminalStateDetector {
    state: LifecycleStatus,
}

impl TerminalStateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleStatus {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Inspect one received event. Returns the state entered, if it changed.
    pub fn on_event(&mut self, event: &OperationEvent) -> Option<LifecycleStatus> {
        if self.is_terminal() {
            return None;
        }
        match terminal_signal(event) {
            Some(terminal) => self.enter(terminal),
            None if self.state == LifecycleStatus::Pending => self.enter(LifecycleStatus::Running),
            None => None,
        }
    }

    /// Inspect a reconciled record. Completion from step history and failure
    /// from any source arrive this way.
    pub fn on_progress(&mut self, record: &ProgressRecord) -> Option<LifecycleStatus> {
        if self.is_terminal() {
            return None;
        }
        match record.lifecycle_status {
            LifecycleStatus::Completed => self.enter(LifecycleStatus::Completed),
            LifecycleStatus::Failed => self.enter(LifecycleStatus::Failed),
            LifecycleStatus::Running if self.state == LifecycleStatus::Pending => {
                self.enter(LifecycleStatus::Running)
            }
            _ if self.state == LifecycleStatus::Pending && record.progress_percent > 0 => {
                self.enter(LifecycleStatus::Running)
            }
            _ => None,
        }
    }

    /// The server accepted a cancel request.
    pub fn on_cancelled(&mut self) -> Option<LifecycleStatus> {
        if self.is_terminal() {
            return None;
        }
        self.enter(LifecycleStatus::Cancelled)
    }

    fn enter(&mut self, next: LifecycleStatus) -> Option<LifecycleStatus> {
        if next == self.state {
            return None;
        }
        tracing::trace!(from = self.state.as_str(), to = next.as_str(), "lifecycle transition");
        self.state = next;
        Some(next)
    }
}
