//! Content Aggregator
//!
//! Merges decoded stream events into the running body of one in-flight reply.
//!
//! Two renderings are tracked side by side. Structured payloads replace the
//! previous structured value outright because every structured chunk is
//! complete. Text payloads are concatenated in arrival order, and the sections
//! for a text body are re-derived from the concatenation on demand.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::decoder::{StreamEvent, StreamEventKind, StreamPayload};
use crate::messages::{ChatSection, ChatStructuredContent, Locale, ReplyBody};

/// Declared content format of a reply
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Flat text, concatenated across chunks
    #[default]
    Text,
    /// Sectioned content, each chunk complete
    Structured,
}

impl ContentFormat {
    /// Parse a header or meta value
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.contains("structured") || value.contains("sections") {
            Some(Self::Structured)
        } else if value.contains("text") || value.contains("plain") || value.contains("markdown") {
            Some(Self::Text)
        } else {
            None
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Structured => f.write_str("structured"),
        }
    }
}

/// The backend reported a failure inside the stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("stream error event: {message}")]
pub struct StreamFailure {
    /// Message carried by the `error` event
    pub message: String,
}

/// What applying an event did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamProgress {
    /// Visible content changed
    Content,
    /// Liveness signal only
    Heartbeat,
    /// Nothing visible changed
    Idle,
    /// Terminal event received
    Finished,
}

/// Timing and counters for one stream
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDiagnostics {
    /// Chunk events seen by the client
    pub chunk_count: u64,
    /// Milliseconds from stream start to the first chunk
    pub first_chunk_ms: Option<u64>,
    /// Chunk count reported by the server in `done`/`end`
    pub reported_chunks: Option<u64>,
    /// First-chunk latency reported by the server
    pub reported_first_chunk_ms: Option<u64>,
}

/// Running body of one in-flight reply
#[derive(Debug)]
pub struct ContentAggregator {
    format: ContentFormat,
    locale: Locale,
    text: String,
    structured: Option<Vec<ChatSection>>,
    started_at: Instant,
    diagnostics: StreamDiagnostics,
    finished: bool,
}

impl ContentAggregator {
    /// Start aggregating a reply declared with `format`
    #[must_use]
    pub fn new(format: ContentFormat, locale: Locale) -> Self {
        Self::started_at(format, locale, Instant::now())
    }

    /// Start aggregating with an explicit start instant
    #[must_use]
    pub fn started_at(format: ContentFormat, locale: Locale, started_at: Instant) -> Self {
        Self {
            format,
            locale,
            text: String::new(),
            structured: None,
            started_at,
            diagnostics: StreamDiagnostics::default(),
            finished: false,
        }
    }

    /// Apply one event received now
    ///
    /// # Errors
    ///
    /// Returns [`StreamFailure`] when the event is an `error` event.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<StreamProgress, StreamFailure> {
        self.apply_at(event, Instant::now())
    }

    /// Apply one event received at `now`
    ///
    /// # Errors
    ///
    /// Returns [`StreamFailure`] when the event is an `error` event.
    pub fn apply_at(&mut self, event: &StreamEvent, now: Instant) -> Result<StreamProgress, StreamFailure> {
        match event.kind {
            StreamEventKind::Start => Ok(StreamProgress::Idle),
            StreamEventKind::Heartbeat => Ok(StreamProgress::Heartbeat),
            StreamEventKind::Meta => {
                if let Some(format) = meta_format(&event.payload) {
                    self.switch_format(format);
                }
                Ok(StreamProgress::Idle)
            }
            StreamEventKind::Chunk => {
                self.diagnostics.chunk_count += 1;
                if self.diagnostics.first_chunk_ms.is_none() {
                    self.diagnostics.first_chunk_ms = Some(millis_between(self.started_at, now));
                }
                Ok(self.apply_chunk(&event.payload))
            }
            StreamEventKind::Done | StreamEventKind::End => {
                self.record_reported_diagnostics(&event.payload);
                self.finished = true;
                tracing::debug!(
                    chunks = self.diagnostics.chunk_count,
                    first_chunk_ms = self.diagnostics.first_chunk_ms,
                    reported_chunks = self.diagnostics.reported_chunks,
                    reported_first_chunk_ms = self.diagnostics.reported_first_chunk_ms,
                    "Stream finished"
                );
                Ok(StreamProgress::Finished)
            }
            StreamEventKind::Error => {
                self.finished = true;
                Err(StreamFailure {
                    message: error_message(&event.payload),
                })
            }
        }
    }

    /// Current reply body
    #[must_use]
    pub fn body(&self) -> ReplyBody {
        match &self.structured {
            Some(sections) => ReplyBody::structured(sections.clone()),
            None => ReplyBody::text(self.text.clone()),
        }
    }

    /// Whether anything visible has been aggregated
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.body().is_empty()
    }

    /// Declared format
    #[must_use]
    pub fn format(&self) -> ContentFormat {
        self.format
    }

    /// Whether a terminal event was received
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Diagnostics gathered so far
    #[must_use]
    pub fn diagnostics(&self) -> &StreamDiagnostics {
        &self.diagnostics
    }

    fn switch_format(&mut self, format: ContentFormat) {
        if format == self.format {
            return;
        }
        if self.has_content() {
            tracing::warn!(
                from = %self.format,
                to = %format,
                "Content format changed mid-stream, discarding aggregated content"
            );
        }
        self.text.clear();
        self.structured = None;
        self.format = format;
    }

    fn apply_chunk(&mut self, payload: &StreamPayload) -> StreamProgress {
        let body = match payload {
            StreamPayload::Empty => None,
            StreamPayload::Text(text) => Some(ReplyBody::text(text.clone())),
            StreamPayload::Json(value) => reply_from_value(value, self.locale),
        };
        match body {
            Some(ReplyBody::Structured { sections }) if !sections.is_empty() => {
                self.structured = Some(sections);
                StreamProgress::Content
            }
            Some(ReplyBody::Text { body }) if !body.is_empty() => {
                self.text.push_str(&body);
                StreamProgress::Content
            }
            _ => StreamProgress::Idle,
        }
    }

    fn record_reported_diagnostics(&mut self, payload: &StreamPayload) {
        if let StreamPayload::Json(Value::Object(map)) = payload {
            self.diagnostics.reported_chunks = map.get("chunks").and_then(Value::as_u64);
            self.diagnostics.reported_first_chunk_ms = map
                .get("firstChunkMs")
                .or_else(|| map.get("first_chunk_ms"))
                .and_then(Value::as_u64);
        }
    }
}

fn millis_between(start: Instant, now: Instant) -> u64 {
    u64::try_from(now.saturating_duration_since(start).as_millis()).unwrap_or(u64::MAX)
}

fn meta_format(payload: &StreamPayload) -> Option<ContentFormat> {
    match payload {
        StreamPayload::Json(Value::Object(map)) => ["format", "contentFormat", "content_format", "type"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .and_then(ContentFormat::parse),
        StreamPayload::Json(Value::String(s)) | StreamPayload::Text(s) => ContentFormat::parse(s),
        _ => None,
    }
}

fn error_message(payload: &StreamPayload) -> String {
    match payload {
        StreamPayload::Empty => "unspecified stream error".to_string(),
        StreamPayload::Text(text) => text.clone(),
        StreamPayload::Json(Value::Object(map)) => ["message", "error", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map_or_else(|| Value::Object(map.clone()).to_string(), ToString::to_string),
        StreamPayload::Json(value) => value.to_string(),
    }
}

const CONTENT_KEYS: &[&str] = &["content", "response", "message", "text", "delta", "chunk", "body"];

/// Interpret a JSON value as reply content
///
/// Accepts a string, an object carrying `sections`, an object wrapping content
/// under one of the common keys, or a list of localized renderings (the one
/// matching `locale` wins, else the first).
#[must_use]
pub fn reply_from_value(value: &Value, locale: Locale) -> Option<ReplyBody> {
    match value {
        Value::String(text) => Some(ReplyBody::text(text.clone())),
        Value::Number(_) | Value::Bool(_) => Some(ReplyBody::text(value.to_string())),
        Value::Null => None,
        Value::Array(items) => localized_sections(items, locale)
            .map(ReplyBody::structured)
            .or_else(|| {
                let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                (!parts.is_empty()).then(|| ReplyBody::text(parts.join("\n\n")))
            }),
        Value::Object(map) => {
            if let Some(sections) = map.get("sections") {
                return serde_json::from_value::<Vec<ChatSection>>(sections.clone())
                    .ok()
                    .map(ReplyBody::structured);
            }
            CONTENT_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(|inner| reply_from_value(inner, locale))
        }
    }
}

fn localized_sections(items: &[Value], locale: Locale) -> Option<Vec<ChatSection>> {
    let renderings: Vec<ChatStructuredContent> =
        serde_json::from_value(Value::Array(items.to_vec())).ok()?;
    let mut renderings = renderings.into_iter();
    let first = renderings.next()?;
    if first.language == locale {
        return Some(first.sections);
    }
    Some(
        renderings
            .find(|r| r.language == locale)
            .unwrap_or(first)
            .sections,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::decoder::EventStreamDecoder;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn chunk(value: Value) -> StreamEvent {
        StreamEvent {
            kind: StreamEventKind::Chunk,
            payload: StreamPayload::Json(value),
        }
    }

    fn meta(format: &str) -> StreamEvent {
        StreamEvent {
            kind: StreamEventKind::Meta,
            payload: StreamPayload::Json(json!({ "format": format })),
        }
    }

    #[test]
    fn test_text_chunks_concatenate_in_order() {
        let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
        for part in ["The cottage ", "sleeps ", "six."] {
            assert_eq!(agg.apply(&chunk(json!({ "text": part }))), Ok(StreamProgress::Content));
        }
        assert_eq!(agg.body(), ReplyBody::text("The cottage sleeps six."));
        assert_eq!(agg.diagnostics().chunk_count, 3);
    }

    #[test]
    fn test_structured_chunks_replace() {
        let mut agg = ContentAggregator::new(ContentFormat::Structured, Locale::En);
        agg.apply(&chunk(json!({ "sections": [{ "title": "Draft", "bullets": ["a"] }] })))
            .unwrap();
        agg.apply(&chunk(json!({ "sections": [{ "title": "Final", "bullets": ["b"], "cta": "Book" }] })))
            .unwrap();
        let ReplyBody::Structured { sections } = agg.body() else {
            panic!("expected structured body");
        };
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Final");
    }

    #[test]
    fn test_text_sections_rederived_from_concatenation() {
        let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
        agg.apply(&chunk(json!("Pool is heated.\n"))).unwrap();
        agg.apply(&chunk(json!("\nSauna costs extra."))).unwrap();
        let sections = agg.body().sections();
        assert_eq!(sections[0].bullets, vec!["Pool is heated.", "Sauna costs extra."]);
    }

    #[test]
    fn test_raw_text_payload_used_verbatim() {
        let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
        agg.apply(&StreamEvent {
            kind: StreamEventKind::Chunk,
            payload: StreamPayload::Text("{not json".to_string()),
        })
        .unwrap();
        assert_eq!(agg.body().plain_text(), "{not json");
    }

    #[test]
    fn test_heartbeat_and_empty_chunk_do_not_change_content() {
        let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
        let heartbeat = StreamEvent {
            kind: StreamEventKind::Heartbeat,
            payload: StreamPayload::Empty,
        };
        assert_eq!(agg.apply(&heartbeat), Ok(StreamProgress::Heartbeat));
        assert_eq!(agg.apply(&chunk(json!({}))), Ok(StreamProgress::Idle));
        assert!(!agg.has_content());
    }

    #[test]
    fn test_meta_switch_discards_content() {
        let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
        agg.apply(&chunk(json!({ "text": "partial" }))).unwrap();
        agg.apply(&meta("structured")).unwrap();
        assert!(!agg.has_content());
        assert_eq!(agg.format(), ContentFormat::Structured);
    }

    #[test]
    fn test_meta_same_format_keeps_content() {
        let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
        agg.apply(&chunk(json!({ "text": "partial" }))).unwrap();
        agg.apply(&meta("text")).unwrap();
        assert_eq!(agg.body().plain_text(), "partial");
    }

    #[test]
    fn test_done_records_diagnostics() {
        let t0 = Instant::now();
        let mut agg = ContentAggregator::started_at(ContentFormat::Text, Locale::En, t0);
        agg.apply_at(&chunk(json!("hi")), t0 + Duration::from_millis(120))
            .unwrap();
        let done = StreamEvent {
            kind: StreamEventKind::Done,
            payload: StreamPayload::Json(json!({ "chunks": 1, "firstChunkMs": 95 })),
        };
        assert_eq!(agg.apply(&done), Ok(StreamProgress::Finished));
        assert!(agg.is_finished());
        let diag = agg.diagnostics();
        assert_eq!(diag.first_chunk_ms, Some(120));
        assert_eq!(diag.reported_chunks, Some(1));
        assert_eq!(diag.reported_first_chunk_ms, Some(95));
    }

    #[test]
    fn test_error_event_is_failure() {
        let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
        let err = agg
            .apply(&StreamEvent {
                kind: StreamEventKind::Error,
                payload: StreamPayload::Json(json!({ "message": "model overloaded" })),
            })
            .unwrap_err();
        assert_eq!(err.message, "model overloaded");
    }

    #[test]
    fn test_localized_list_prefers_locale() {
        let value = json!([
            { "language": "ka", "sections": [{ "title": "კოტეჯი", "bullets": ["ტბასთან"] }] },
            { "language": "en", "sections": [{ "title": "Cottage", "bullets": ["By the lake"] }] }
        ]);
        let body = reply_from_value(&value, Locale::En).unwrap();
        assert_eq!(body.sections()[0].title, "Cottage");
        let body = reply_from_value(&value, Locale::Ka).unwrap();
        assert_eq!(body.sections()[0].title, "კოტეჯი");
    }

    #[test]
    fn test_reply_from_wrapped_value() {
        let body = reply_from_value(&json!({ "response": "Hello" }), Locale::En).unwrap();
        assert_eq!(body, ReplyBody::text("Hello"));
        assert!(reply_from_value(&json!({ "unrelated": 1 }), Locale::En).is_none());
    }

    #[test]
    fn test_stream_boundary_invariance() {
        let stream = concat!(
            "event: meta\ndata: {\"format\":\"text\"}\n\n",
            "event: chunk\ndata: {\"text\":\"სასტუმრო \"}\n\n",
            "event: chunk\ndata: {\"text\":\"has free \"}\n\n",
            "event: heartbeat\ndata: {}\n\n",
            "event: chunk\ndata: {\"text\":\"parking.\"}\n\n",
            "event: done\ndata: {}\n\n",
        )
        .as_bytes();

        let aggregate = |pieces: &[&[u8]]| {
            let mut decoder = EventStreamDecoder::new();
            let mut agg = ContentAggregator::new(ContentFormat::Text, Locale::En);
            for piece in pieces {
                for event in decoder.push_bytes(piece) {
                    agg.apply(&event).unwrap();
                }
            }
            for event in decoder.finish() {
                agg.apply(&event).unwrap();
            }
            agg.body()
        };

        let whole = aggregate(&[stream]);
        assert_eq!(whole.plain_text(), "სასტუმრო has free parking.");
        for a in (1..stream.len()).step_by(7) {
            for b in (a + 1..stream.len()).step_by(11) {
                let pieces = [&stream[..a], &stream[a..b], &stream[b..]];
                assert_eq!(aggregate(&pieces), whole, "split at {a}/{b}");
            }
        }
    }
}
