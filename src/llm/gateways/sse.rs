//! Line-oriented decoder for server-sent chat-completion streams.
//!
//! Bytes arrive in arbitrary chunks. The decoder buffers until a newline and
//! handles exactly one complete line at a time, so fragments come out in
//! wire order.

use crate::llm::gateway::{StreamEnd, StreamEvent};
use crate::llm::gateways::normalizer::extract_delta;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Incremental SSE decoder for one streaming connection.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    done: bool,
    lines_read: usize,
    fragments: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes and return the events of every line it
    /// completes.
    ///
    /// After `[DONE]` the decoder is closed: the terminal event is the last
    /// one returned and further input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.buffer.extend_from_slice(chunk);

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(event) = self.decode_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }

        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&String::from_utf8_lossy(&line))
            .into_iter()
            .collect()
    }

    /// Decode a single line.
    pub fn decode_line(&mut self, line: &str) -> Option<StreamEvent> {
        if self.done {
            return None;
        }

        let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        if line.trim().is_empty() {
            return None;
        }
        self.lines_read += 1;

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            debug!(line = self.lines_read, "Ignoring non-data line: {}", line);
            return None;
        };

        if payload.trim() == DONE_MARKER {
            debug!(
                lines = self.lines_read,
                fragments = self.fragments,
                "Stream finished with [DONE]"
            );
            self.done = true;
            return Some(StreamEvent::Done(StreamEnd::Completed));
        }

        match extract_delta(payload) {
            Ok(Some(content)) => {
                self.fragments += 1;
                debug!(line = self.lines_read, fragment = self.fragments, "Decoded content fragment");
                Some(StreamEvent::Content(content))
            }
            Ok(None) => {
                debug!(line = self.lines_read, "Data line carried no content");
                None
            }
            Err(e) => {
                warn!(line = self.lines_read, "Skipping malformed stream chunk: {} ({})", payload, e);
                None
            }
        }
    }

    /// True once `[DONE]` has been decoded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Non-blank lines decoded so far.
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Content fragments emitted so far.
    pub fn fragments(&self) -> usize {
        self.fragments
    }
}
