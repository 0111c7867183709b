//! SSE line decoding
//!
//! A line-oriented decoder for `data:`/`event:` streams. It is deliberately
//! independent of I/O so the push and pull adapters drive exactly the same
//! state machine.
//!
//! Rules, per line:
//! - blank lines and `:` comment lines are skipped;
//! - `event: <name>` sets the current event name and emits nothing;
//! - `data: ` is stripped; a `[DONE]` remainder completes the stream (a bare
//!   `[DONE]` line without the prefix is ordinary payload);
//! - any other non-blank text is decoded as JSON and emitted with the current
//!   event name.
//!
//! The event name is never reset after a data line: a later data line with no
//! `event:` line in between still carries the previous name.

use crate::error::TransportError;
use crate::metadata::{ApiResponse, enrich};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

pub const DATA_PREFIX: &str = "data: ";
pub const EVENT_PREFIX: &str = "event: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of an SSE stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncEvent<T> {
    /// Name from the most recent `event:` line; empty if none was seen.
    pub event_name: String,
    pub data: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseState {
    AwaitingLine,
    Completed,
    Errored,
    Cancelled,
}

impl SseState {
    pub fn is_terminal(self) -> bool {
        self != SseState::AwaitingLine
    }
}

/// What a single line contributed.
#[derive(Debug)]
pub enum LineOutcome<T> {
    Skip,
    Event(AsyncEvent<T>),
    Done,
    Error(TransportError),
}

#[derive(Debug, Clone)]
pub struct SseLineDecoder {
    current_event: String,
    state: SseState,
}

impl Default for SseLineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self {
            current_event: String::new(),
            state: SseState::AwaitingLine,
        }
    }

    pub fn state(&self) -> SseState {
        self.state
    }

    pub fn current_event(&self) -> &str {
        &self.current_event
    }

    /// Mark the stream finished without a sentinel (end of input, I/O error,
    /// cancellation).
    pub fn finish(&mut self, state: SseState) {
        if !self.state.is_terminal() {
            self.state = state;
        }
    }

    /// Decode one line (without its terminator). Lines fed after a terminal
    /// state are skipped.
    pub fn decode<T: ApiResponse>(&mut self, line: &str, headers: &HeaderMap) -> LineOutcome<T> {
        if self.state.is_terminal() {
            return LineOutcome::Skip;
        }
        if line.trim().is_empty() || line.starts_with(':') {
            return LineOutcome::Skip;
        }
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            self.current_event = name.to_string();
            return LineOutcome::Skip;
        }

        let (payload, prefixed) = match line.strip_prefix(DATA_PREFIX) {
            Some(rest) => (rest.trim(), true),
            None => (line.trim(), false),
        };
        if prefixed && payload == DONE_SENTINEL {
            self.state = SseState::Completed;
            return LineOutcome::Done;
        }
        if payload.is_empty() {
            return LineOutcome::Skip;
        }

        match serde_json::from_str::<T>(payload) {
            Ok(mut data) => {
                enrich(&mut data, headers);
                LineOutcome::Event(AsyncEvent {
                    event_name: self.current_event.clone(),
                    data,
                })
            }
            Err(e) => {
                self.state = SseState::Errored;
                LineOutcome::Error(TransportError::Parse(format!(
                    "Failed to parse SSE JSON: {e}"
                )))
            }
        }
    }
}
