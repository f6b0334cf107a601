// crates/types/src/progress.rs
//! Derived progress types: the reconciled record, the lifecycle and
//! connection states, and the snapshot pushed to the presentation layer.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::event::OperationId;

/// Lifecycle of a tracked operation.
///
/// `Cancelled` is only ever entered through a successful cancel call; the
/// reconciler itself produces the other four.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl LifecycleStatus {
    /// Completed, failed and cancelled operations expect no further updates.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleStatus::Completed | LifecycleStatus::Failed | LifecycleStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Pending => "pending",
            LifecycleStatus::Running => "running",
            LifecycleStatus::Completed => "completed",
            LifecycleStatus::Failed => "failed",
            LifecycleStatus::Cancelled => "cancelled",
        }
    }
}

/// State of the push channel for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Which data source a progress record was derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub enum ProgressSource {
    /// No source had anything to say yet.
    #[default]
    None,
    /// Push-channel events received during this session.
    Live,
    /// The server's historical event log.
    EventLog,
    /// The persisted step history.
    StepHistory,
}

/// The reconciled, authoritative progress of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub current_step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    /// 0..=100
    pub progress_percent: u8,
    #[ts(type = "number")]
    pub elapsed_seconds: u64,
    pub lifecycle_status: LifecycleStatus,
    pub source: ProgressSource,
}

impl ProgressRecord {
    /// The record reported when no source yields any information.
    pub fn pending() -> Self {
        Self::default()
    }
}

/// Everything the presentation layer needs to render one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct OperationSnapshot {
    pub operation_id: OperationId,
    pub connection: ConnectionState,
    /// Lifecycle as seen by the terminal-state detector (may be `cancelled`).
    pub lifecycle: LifecycleStatus,
    pub progress: ProgressRecord,
    /// Live-ticking elapsed time; frozen once the lifecycle is terminal.
    #[ts(type = "number")]
    pub display_elapsed_seconds: u64,
    /// Events appended since the last user clear.
    pub visible_events: u32,
    /// Size of the full buffer, including entries hidden by a clear.
    pub total_events: u32,
    /// Push-channel frames that could not be decoded and were dropped.
    #[ts(type = "number")]
    pub malformed_frames: u64,
    /// RFC 3339 time this snapshot was produced.
    pub updated_at: String,
}
