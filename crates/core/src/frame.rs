// crates/core/src/frame.rs
//! Decoding of push-channel frame payloads into events.

use opwatch_types::OperationEvent;

use crate::error::FrameError;

/// Event kinds servers send purely to keep the channel warm.
const KEEPALIVE_KINDS: &[&str] = &["heartbeat", "ping", "keepalive", "connected"];

/// Parse one frame payload.
///
/// Returns `Ok(None)` for keep-alive frames, which carry no information about
/// the operation and must not count as "first event received".
pub fn parse_frame(payload: &str) -> Result<Option<OperationEvent>, FrameError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }
    if !trimmed.starts_with('{') {
        return Err(FrameError::not_an_object(trimmed));
    }

    let event: OperationEvent =
        serde_json::from_str(trimmed).map_err(|source| FrameError::MalformedJson { source })?;

    let is_keepalive = event
        .event_type
        .as_deref()
        .is_some_and(|kind| KEEPALIVE_KINDS.contains(&kind));
    if is_keepalive {
        return Ok(None);
    }

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opwatch_types::Severity;

    #[test]
    fn test_parses_event_object() {
        let event = parse_frame(r#"{"severity":"error","text":"boom","stepIndex":2}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.severity, Severity::Error);
        assert_eq!(event.text, "boom");
        assert_eq!(event.step_index, Some(2));
    }

    #[test]
    fn test_tolerates_surrounding_whitespace() {
        assert!(parse_frame("  {\"text\":\"x\"}\n").unwrap().is_some());
    }

    #[test]
    fn test_keepalive_frames_are_skipped() {
        assert!(parse_frame(r#"{"eventType":"heartbeat"}"#).unwrap().is_none());
        assert!(parse_frame(r#"{"event":"ping"}"#).unwrap().is_none());
    }

    #[test]
    fn test_empty_payload_is_an_error() {
        assert!(matches!(parse_frame("   "), Err(FrameError::Empty)));
    }

    #[test]
    fn test_non_object_payload_is_an_error() {
        assert!(matches!(
            parse_frame("[1, 2, 3]"),
            Err(FrameError::NotAnObject { .. })
        ));
        assert!(matches!(
            parse_frame("hello"),
            Err(FrameError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_truncated_json_is_an_error() {
        assert!(matches!(
            parse_frame(r#"{"text": "unterminated"#),
            Err(FrameError::MalformedJson { .. })
        ));
    }
}
