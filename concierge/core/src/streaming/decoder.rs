//! Event Stream Decoder
//!
//! Turns an incremental response body into typed [`StreamEvent`]s.
//!
//! # Design Philosophy
//!
//! The decoder is an explicit state machine over a text buffer and a cursor,
//! independent of any network layer. Bytes can arrive split anywhere: inside
//! a UTF-8 sequence, inside a line, or between the lines of one event block.
//! Incomplete trailing bytes and lines are carried to the next read, and the
//! event being assembled survives across reads until a blank line ends it.
//!
//! Wire format: blocks separated by a blank line, each holding an `event:`
//! line and one or more `data:` lines. Lines starting with `:` are comments.
//! A block without an `event:` line is a `chunk`.

use std::fmt;

use serde_json::Value;

/// Recognized event types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    /// Stream opened
    Start,
    /// Content format declaration
    Meta,
    /// Incremental content
    Chunk,
    /// Liveness signal
    Heartbeat,
    /// Terminal signal, may carry diagnostics
    Done,
    /// Terminal failure
    Error,
    /// Terminal signal, alias of `done`
    End,
}

impl StreamEventKind {
    /// Parse an `event:` name; unknown names yield `None`
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "meta" => Some(Self::Meta),
            "chunk" | "message" => Some(Self::Chunk),
            "heartbeat" | "ping" => Some(Self::Heartbeat),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    /// Whether the event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::End | Self::Error)
    }
}

impl fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Meta => "meta",
            Self::Chunk => "chunk",
            Self::Heartbeat => "heartbeat",
            Self::Done => "done",
            Self::Error => "error",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

/// Data carried by an event
#[derive(Clone, Debug, PartialEq)]
pub enum StreamPayload {
    /// No `data:` lines
    Empty,
    /// Data parsed as JSON
    Json(Value),
    /// Data that is not JSON, kept verbatim
    Text(String),
}

impl StreamPayload {
    fn from_data(data: String) -> Self {
        if data.is_empty() {
            return Self::Empty;
        }
        match serde_json::from_str::<Value>(&data) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(data),
        }
    }
}

/// A decoded event
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    /// Event type
    pub kind: StreamEventKind,
    /// Event data
    pub payload: StreamPayload,
}

/// Incremental event stream decoder
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    /// Decoded text not yet consumed as complete lines
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,
    /// `event:` value of the block being assembled
    event_name: Option<String>,
    /// `data:` lines of the block being assembled
    data_lines: Vec<String>,
}

impl EventStreamDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.decode_utf8(bytes);
        self.drain_lines()
    }

    /// Feed already-decoded text
    pub fn push_str(&mut self, text: &str) -> Vec<StreamEvent> {
        self.flush_pending_bytes();
        self.buffer.push_str(text);
        self.drain_lines()
    }

    /// Signal end of input and flush any partially assembled event
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        self.flush_pending_bytes();
        let mut events = self.drain_lines();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    /// Whether partial input is waiting for more bytes
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
            || !self.pending_bytes.is_empty()
            || self.event_name.is_some()
            || !self.data_lines.is_empty()
    }

    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.pending_bytes.extend_from_slice(bytes);
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match e.error_len() {
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + invalid);
                        }
                        None => {
                            self.pending_bytes.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn flush_pending_bytes(&mut self) {
        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
    }

    fn drain_lines(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let buffer = std::mem::take(&mut self.buffer);
        let mut cursor = 0;

        while let Some(offset) = buffer[cursor..].find('\n') {
            let end = cursor + offset;
            let line = buffer[cursor..end].trim_end_matches('\r');
            self.process_line(line, &mut events);
            cursor = end + 1;
        }

        self.buffer = buffer[cursor..].to_string();
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<StreamEvent>) {
        if self.event_name.is_none() && self.data_lines.is_empty() {
            return;
        }
        let name = self.event_name.take();
        let data = std::mem::take(&mut self.data_lines).join("\n");

        let kind = match name.as_deref() {
            None => StreamEventKind::Chunk,
            Some(name) => match StreamEventKind::from_name(name) {
                Some(kind) => kind,
                None => {
                    tracing::debug!(event = name, "Ignoring unknown stream event");
                    return;
                }
            },
        };

        tracing::trace!(event = %kind, bytes = data.len(), "Decoded stream event");
        events.push(StreamEvent {
            kind,
            payload: StreamPayload::from_data(data),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const STREAM: &str = concat!(
        "event: start\ndata: {}\n\n",
        "event: meta\ndata: {\"format\":\"text\"}\n\n",
        "event: chunk\ndata: {\"text\":\"Check-in is \"}\n\n",
        ": keep-alive comment\n\n",
        "event: heartbeat\ndata: {}\n\n",
        "event: chunk\ndata: {\"text\":\"at 14:00 in კოტეჯი.\"}\n\n",
        "event: done\ndata: {\"chunks\":2,\"firstChunkMs\":140}\n\n",
    );

    fn decode_all(input: &[u8]) -> Vec<StreamEvent> {
        let mut decoder = EventStreamDecoder::new();
        let mut events = decoder.push_bytes(input);
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_decodes_full_stream() {
        let events = decode_all(STREAM.as_bytes());
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::Start,
                StreamEventKind::Meta,
                StreamEventKind::Chunk,
                StreamEventKind::Heartbeat,
                StreamEventKind::Chunk,
                StreamEventKind::Done,
            ]
        );
        assert_eq!(events[2].payload, StreamPayload::Json(json!({"text": "Check-in is "})));
    }

    #[test]
    fn test_split_at_every_byte_boundary() {
        let expected = decode_all(STREAM.as_bytes());
        let bytes = STREAM.as_bytes();
        for split in 1..bytes.len() {
            let mut decoder = EventStreamDecoder::new();
            let mut events = decoder.push_bytes(&bytes[..split]);
            events.extend(decoder.push_bytes(&bytes[split..]));
            events.extend(decoder.finish());
            assert_eq!(events, expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let expected = decode_all(STREAM.as_bytes());
        let mut decoder = EventStreamDecoder::new();
        let mut events = Vec::new();
        for b in STREAM.as_bytes() {
            events.extend(decoder.push_bytes(std::slice::from_ref(b)));
        }
        events.extend(decoder.finish());
        assert_eq!(events, expected);
    }

    #[test]
    fn test_partial_block_waits_for_blank_line() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.push_str("event: chunk\ndata: hel").is_empty());
        assert!(decoder.has_partial());
        let events = decoder.push_str("lo\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, StreamPayload::Text("hello".to_string()));
    }

    #[test]
    fn test_crlf_and_multiline_data() {
        let events = decode_all(b"event: chunk\r\ndata: line one\r\ndata: line two\r\n\r\n");
        assert_eq!(
            events[0].payload,
            StreamPayload::Text("line one\nline two".to_string())
        );
    }

    #[test]
    fn test_missing_event_line_is_chunk() {
        let events = decode_all(b"data: {\"text\":\"hi\"}\n\n");
        assert_eq!(events[0].kind, StreamEventKind::Chunk);
    }

    #[test]
    fn test_unknown_event_ignored() {
        let events = decode_all(b"event: telemetry\ndata: {}\n\nevent: chunk\ndata: ok\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, StreamEventKind::Chunk);
    }

    #[test]
    fn test_invalid_json_degrades_to_text() {
        let events = decode_all(b"event: chunk\ndata: {\"text\": unterminated\n\n");
        assert_eq!(
            events[0].payload,
            StreamPayload::Text("{\"text\": unterminated".to_string())
        );
    }

    #[test]
    fn test_finish_flushes_unterminated_block() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.push_str("event: done\ndata: {}").is_empty());
        let events = decoder.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, StreamEventKind::Done);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(StreamEventKind::Done.is_terminal());
        assert!(StreamEventKind::End.is_terminal());
        assert!(StreamEventKind::Error.is_terminal());
        assert!(!StreamEventKind::Heartbeat.is_terminal());
    }
}
