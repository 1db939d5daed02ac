//! Completion Backend Traits
//!
//! The seam between the chat client and the remote completion endpoint.
//!
//! # Design Philosophy
//!
//! The client never talks HTTP directly. It hands a [`ChatRequest`] to a
//! [`CompletionBackend`] and receives a status, a few headers and a body that
//! is either complete or still streaming. Classifying that response (rate
//! limit, auth, client error, fallback, success) is the dispatcher's job, so
//! test backends only have to script raw responses.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::{Audience, Locale};
use crate::session::HistoryEntry;
use crate::streaming::ContentFormat;

/// Failure to complete an HTTP exchange
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Endpoint unreachable
    #[error("connection failed: {0}")]
    Connect(String),
    /// No answer in time
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The read was abandoned by the caller
    #[error("request aborted")]
    Aborted,
    /// Anything else on the wire
    #[error("transport error: {0}")]
    Other(String),
}

/// Incremental response body
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Whether the client asks for an event stream or a single JSON payload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Incremental event stream
    #[default]
    Stream,
    /// One JSON payload
    Single,
}

impl ResponseMode {
    /// Wire/config name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Single => "single",
        }
    }

    /// Parse a config value
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stream" | "streaming" | "sse" => Some(Self::Stream),
            "single" | "json" => Some(Self::Single),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locale and mode metadata sent with every request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    /// Reply language
    pub language: Locale,
    /// Requested response mode
    pub mode: ResponseMode,
    /// Client tag
    pub client: String,
    /// ISO-8601 send time
    pub timestamp: String,
    /// Surface the request comes from
    pub audience: Audience,
}

/// Outbound chat request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's message
    pub message: String,
    /// Optional identity hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_id: Option<String>,
    /// Bounded, condensed prior turns
    pub conversation_history: Vec<HistoryEntry>,
    /// Surface the request comes from
    pub audience: Audience,
    /// Locale/mode metadata
    pub metadata: RequestMetadata,
}

/// Body of a backend response
pub enum ResponseBody {
    /// Fully read body
    Full(String),
    /// Body still arriving
    Stream(ByteStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(text) => f.debug_tuple("Full").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Raw response as seen by the dispatcher
#[derive(Debug)]
pub struct BackendResponse {
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header
    pub content_type: Option<String>,
    /// Declared content format header
    pub content_format: Option<ContentFormat>,
    /// `Retry-After` header, unparsed
    pub retry_after: Option<String>,
    /// Response body
    pub body: ResponseBody,
}

impl BackendResponse {
    /// Response with a complete body
    pub fn full(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(content_type.to_string()),
            content_format: None,
            retry_after: None,
            body: ResponseBody::Full(body.into()),
        }
    }

    /// Event-stream response with a streaming body
    #[must_use]
    pub fn stream(status: u16, body: ByteStream) -> Self {
        Self {
            status,
            content_type: Some(EVENT_STREAM.to_string()),
            content_format: None,
            retry_after: None,
            body: ResponseBody::Stream(body),
        }
    }

    /// Set the declared content format
    #[must_use]
    pub fn with_content_format(mut self, format: ContentFormat) -> Self {
        self.content_format = Some(format);
        self
    }

    /// Set the `Retry-After` header
    #[must_use]
    pub fn with_retry_after(mut self, value: impl Into<String>) -> Self {
        self.retry_after = Some(value.into());
        self
    }

    /// Whether the response declares an event stream
    #[must_use]
    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM))
    }
}

/// Event-stream media type
pub const EVENT_STREAM: &str = "text/event-stream";

/// Header declaring structured vs text content
pub const CONTENT_FORMAT_HEADER: &str = "x-content-format";

/// Completion backend trait
///
/// Implement this trait to point the client at a different transport.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Get the backend name (e.g., "http")
    fn name(&self) -> &str;

    /// Endpoint description used in diagnostics
    fn endpoint(&self) -> &str;

    /// Send a request and return the raw response
    ///
    /// Returns once status and headers are known; a streaming body is read
    /// afterwards by the caller.
    async fn dispatch(&self, request: &ChatRequest) -> Result<BackendResponse, TransportError>;
}
