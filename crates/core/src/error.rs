// crates/core/src/error.rs
use thiserror::Error;

/// Why a push-channel frame could not be turned into an event.
///
/// Frames that fail here are dropped and counted; they never reach the
/// event buffer.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Empty frame payload")]
    Empty,

    #[error("Frame is not a JSON object: {snippet}")]
    NotAnObject { snippet: String },

    #[error("Malformed event frame: {source}")]
    MalformedJson {
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    /// Build a `NotAnObject` error carrying at most the first 64 characters
    /// of the payload, so a huge garbage frame does not flood the logs.
    pub fn not_an_object(payload: &str) -> Self {
        Self::NotAnObject {
            snippet: payload.chars().take(64).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_an_object_truncates_snippet() {
        let payload = "x".repeat(500);
        let err = FrameError::not_an_object(&payload);
        match err {
            FrameError::NotAnObject { snippet } => assert_eq!(snippet.len(), 64),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_frame_error_display() {
        assert_eq!(FrameError::Empty.to_string(), "Empty frame payload");
        let err = FrameError::not_an_object("[1,2]");
        assert!(err.to_string().contains("[1,2]"));
    }
}
