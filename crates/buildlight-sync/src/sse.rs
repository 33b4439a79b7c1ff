//! Incremental Server-Sent Events decoder
//!
//! Bytes arrive in arbitrary chunks; complete lines are processed as they
//! appear and an event is dispatched on every blank line. Supports `event`,
//! `data` (multi-line), `id` and comment lines. `retry` and unknown fields
//! are ignored. A line that grows past the decoder's limit without a line
//! break is an error; the stream cannot be trusted after that.

use thiserror::Error;

/// Event name used when the stream does not set one
pub const DEFAULT_EVENT: &str = "message";

/// Longest line accepted by [`SseDecoder::new`]
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("SSE line longer than {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// One dispatched event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    /// Last event ID seen on the stream (persists across events)
    pub id: Option<String>,
}

#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Leading bytes of `buffer` already known to hold no line break
    scanned: usize,
    max_line: usize,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
            event: None,
            data: Vec::new(),
            last_id: None,
        }
    }

    /// Feed a chunk of the response body, returning every event it completes.
    ///
    /// Buffered input is discarded when a line exceeds the limit.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LineTooLong> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut search = self.scanned;
        while let Some(offset) = self.buffer[search..].iter().position(|&b| b == b'\n') {
            let end = search + offset;
            if end - start > self.max_line {
                return Err(self.overflow());
            }
            let mut line = &self.buffer[start..end];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            start = end + 1;
            search = start;
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        if self.buffer.len() > self.max_line {
            return Err(self.overflow());
        }
        Ok(events)
    }

    fn overflow(&mut self) -> LineTooLong {
        self.buffer.clear();
        self.scanned = 0;
        LineTooLong {
            limit: self.max_line,
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}
