// crates/client/src/error.rs
use opwatch_types::OperationId;
use thiserror::Error;

/// Failure talking to the operation server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Best-effort human-readable reason from an error response body.
    ///
    /// Servers usually answer `{"detail": "..."}` or `{"error": "..."}`; fall
    /// back to the raw body.
    pub fn reason(&self) -> String {
        match self {
            ClientError::Status { status, body } => {
                let detail = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("detail")
                            .or_else(|| v.get("error"))
                            .and_then(|d| d.as_str().map(str::to_owned))
                    });
                match detail {
                    Some(detail) => format!("{status}: {detail}"),
                    None if body.is_empty() => format!("HTTP {status}"),
                    None => format!("{status}: {body}"),
                }
            }
            other => other.to_string(),
        }
    }
}

/// Errors surfaced by the tracker API. Everything else degrades inside the
/// event loop.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Cancel failed for {operation_id}: {reason}")]
    CancelFailed {
        operation_id: OperationId,
        reason: String,
    },

    #[error("Tracker event loop has stopped")]
    Stopped,
}
