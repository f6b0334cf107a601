// crates/types/src/event.rs
//! Event records as delivered by the push channel and the historical log,
//! plus the persisted step-history rows.

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Opaque key scoping all tracked state for one server-side operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Log severity attached to every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    #[serde(alias = "critical")]
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped occurrence belonging to an operation.
///
/// Servers emit both camelCase and snake_case field names; every optional
/// field defaults so a sparse log line still decodes. Events are never
/// mutated once they enter a buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct OperationEvent {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, alias = "level")]
    pub severity: Severity,
    #[serde(default, alias = "message")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(
        default,
        alias = "step_index",
        alias = "step_number",
        alias = "stepNumber",
        skip_serializing_if = "Option::is_none"
    )]
    pub step_index: Option<u32>,
    #[serde(default, alias = "total_steps", skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, alias = "elapsed_seconds", skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    /// Server-side event kind (e.g. `step_started`, `workflow_completed`).
    #[serde(
        default,
        alias = "event",
        alias = "event_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_type: Option<String>,
    /// Whether an `error` event ends the workflow. Absent means yes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<bool>,
}

/// One row of the persisted step history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: String,
    pub success: bool,
    #[serde(default, alias = "duration_seconds")]
    pub duration_seconds: f64,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, alias = "error_message", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Optional filters for the historical event log endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub severity: Option<Severity>,
}

/// One page of the historical event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogPage {
    #[serde(default, alias = "log_entries", alias = "logEntries", alias = "events")]
    pub entries: Vec<OperationEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// The persisted step history of one operation, oldest step first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepHistory {
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

// =============================================================================
// Tests
// =============================================================================
