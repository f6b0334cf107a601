// crates/client/src/sse.rs
//! Incremental `text/event-stream` decoding.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder`] buffers partial lines
//! and yields one [`SseFrame`] per blank-line-terminated block.

use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::error::ClientError;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
    pub retry_ms: Option<u64>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
    pending: SseFrame,
    has_data: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.line_buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline_index) = self.line_buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    /// End of stream. An event that was never terminated by a blank line is
    /// incomplete and gets discarded; returns whether one was pending.
    pub fn finish(&mut self) -> bool {
        let had_partial_line = !std::mem::take(&mut self.line_buffer).is_empty();
        let had_data = std::mem::replace(&mut self.has_data, false);
        self.pending = SseFrame::default();
        had_partial_line || had_data
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment, typically a keep-alive.
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.pending.event = Some(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            "retry" => self.pending.retry_ms = value.trim().parse().ok(),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let frame = std::mem::take(&mut self.pending);
        let had_data = std::mem::replace(&mut self.has_data, false);
        had_data.then_some(frame)
    }
}

/// Decode a byte stream into the `data` payloads of its frames.
///
/// Frames without data (pure comments, `retry:` hints) are skipped. A chunk
/// error ends the stream after yielding the error. A trailing event with no
/// blank line after it is dropped.
pub fn data_frames<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, ClientError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ClientError>,
{
    async_stream::stream! {
        futures_util::pin_mut!(bytes);
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for frame in decoder.push(chunk.as_ref()) {
                        if !frame.data.trim().is_empty() {
                            yield Ok(frame.data);
                        }
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }
        }
        if decoder.finish() {
            debug!("Discarded unterminated event at end of stream");
        }
    }
}
