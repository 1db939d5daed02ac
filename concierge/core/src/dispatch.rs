//! Request Dispatcher
//!
//! Builds the outbound [`ChatRequest`], hands it to a [`CompletionBackend`],
//! and classifies what comes back:
//!
//! | Outcome                     | Result                                   |
//! |-----------------------------|------------------------------------------|
//! | 429                         | [`DispatchError::RateLimited`]           |
//! | 401 / 403                   | [`DispatchError::AuthRequired`]          |
//! | other non-2xx below 500     | [`DispatchError::Client`]                |
//! | 5xx                         | [`DispatchError::Server`] (fallback)     |
//! | transport failure           | [`DispatchError::Transport`] (fallback)  |
//! | 2xx event stream            | [`DispatchOutcome::Stream`]              |
//! | 2xx anything else           | [`DispatchOutcome::Single`]              |

use std::time::Duration;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;

use crate::backend::{
    BackendResponse, ByteStream, ChatRequest, CompletionBackend, RequestMetadata, ResponseBody,
    ResponseMode, TransportError,
};
use crate::messages::{Audience, Locale, ReplyBody};
use crate::session::HistoryEntry;
use crate::streaming::{reply_from_value, ContentFormat};
use crate::transport::parse_retry_after;

/// Errors classified from a dispatch attempt
#[derive(Debug, Error)]
pub enum DispatchError {
    /// HTTP 429
    #[error("rate limited by server")]
    RateLimited {
        /// Parsed `Retry-After`, if present and valid
        retry_after: Option<Duration>,
    },
    /// HTTP 401/403
    #[error("authentication required (HTTP {status})")]
    AuthRequired {
        /// HTTP status code
        status: u16,
    },
    /// Other HTTP 4xx
    #[error("request rejected (HTTP {status})")]
    Client {
        /// HTTP status code
        status: u16,
    },
    /// HTTP 5xx
    #[error("server error (HTTP {status})")]
    Server {
        /// HTTP status code
        status: u16,
    },
    /// The exchange never produced a response
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Whether this failure goes down the fallback path
    #[must_use]
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            Self::Server { .. } => true,
            Self::Transport(e) => !matches!(e, TransportError::Aborted),
            _ => false,
        }
    }

    /// HTTP status, when one was received
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::AuthRequired { status } | Self::Client { status } | Self::Server { status } => {
                Some(*status)
            }
            Self::Transport(_) => None,
        }
    }
}

/// A successful response ready for aggregation
pub enum DispatchOutcome {
    /// Event stream to decode
    Stream {
        /// HTTP status
        status: u16,
        /// Declared content format
        format: ContentFormat,
        /// Body bytes
        body: ByteStream,
    },
    /// Complete single-shot reply
    Single {
        /// HTTP status
        status: u16,
        /// Parsed reply
        body: ReplyBody,
        /// `metadata.telemetry` from the payload, if any
        telemetry: Option<Value>,
    },
}

impl std::fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream { status, format, .. } => f
                .debug_struct("Stream")
                .field("status", status)
                .field("format", format)
                .finish_non_exhaustive(),
            Self::Single {
                status,
                body,
                telemetry,
            } => f
                .debug_struct("Single")
                .field("status", status)
                .field("body", body)
                .field("telemetry", telemetry)
                .finish(),
        }
    }
}

/// Everything needed to build one outbound request
#[derive(Clone, Debug)]
pub struct RequestContext<'a> {
    /// Trimmed user text
    pub message: &'a str,
    /// Condensed prior turns
    pub history: Vec<HistoryEntry>,
    /// Deployment audience
    pub audience: Audience,
    /// Reply language
    pub locale: Locale,
    /// Requested response mode
    pub mode: ResponseMode,
    /// Client tag for metadata
    pub client_tag: &'a str,
    /// Optional identity hint
    pub personal_id: Option<&'a str>,
}

/// Build the outbound request body
#[must_use]
pub fn build_request(ctx: RequestContext<'_>) -> ChatRequest {
    ChatRequest {
        message: ctx.message.to_string(),
        personal_id: ctx.personal_id.map(ToString::to_string),
        conversation_history: ctx.history,
        audience: ctx.audience,
        metadata: RequestMetadata {
            language: ctx.locale,
            mode: ctx.mode,
            client: ctx.client_tag.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            audience: ctx.audience,
        },
    }
}

/// Send a request and classify the response
///
/// # Errors
///
/// Returns a [`DispatchError`] for every non-success outcome.
pub async fn dispatch<B>(
    backend: &B,
    request: &ChatRequest,
    locale: Locale,
) -> Result<DispatchOutcome, DispatchError>
where
    B: CompletionBackend + ?Sized,
{
    let response = backend.dispatch(request).await?;
    classify_response(response, locale).await
}

/// Classify a raw backend response
///
/// # Errors
///
/// Returns a [`DispatchError`] for every non-2xx status, or a transport error
/// while reading a non-streaming body.
pub async fn classify_response(
    response: BackendResponse,
    locale: Locale,
) -> Result<DispatchOutcome, DispatchError> {
    let status = response.status;
    match status {
        429 => {
            let retry_after = response
                .retry_after
                .as_deref()
                .and_then(|v| parse_retry_after(v, Utc::now()));
            return Err(DispatchError::RateLimited { retry_after });
        }
        401 | 403 => return Err(DispatchError::AuthRequired { status }),
        500..=u16::MAX => return Err(DispatchError::Server { status }),
        200..=299 => {}
        _ => return Err(DispatchError::Client { status }),
    }

    if response.is_event_stream() {
        let format = response.content_format.unwrap_or_default();
        let body = match response.body {
            ResponseBody::Stream(stream) => stream,
            ResponseBody::Full(text) => {
                futures::stream::iter(vec![Ok(Bytes::from(text))]).boxed()
            }
        };
        return Ok(DispatchOutcome::Stream {
            status,
            format,
            body,
        });
    }

    let text = match response.body {
        ResponseBody::Full(text) => text,
        ResponseBody::Stream(mut stream) => {
            let mut buf = Vec::new();
            while let Some(chunk) = stream.next().await {
                buf.extend_from_slice(&chunk?);
            }
            String::from_utf8_lossy(&buf).into_owned()
        }
    };
    let (body, telemetry) = parse_single_payload(&text, locale);
    Ok(DispatchOutcome::Single {
        status,
        body,
        telemetry,
    })
}

/// Parse a single-shot payload
///
/// Content is taken from `response`, `message` or `content` (string, sections
/// object, or localized list). A body that is not JSON is used as plain text.
#[must_use]
pub fn parse_single_payload(text: &str, locale: Locale) -> (ReplyBody, Option<Value>) {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Single-shot payload is not JSON, using raw text");
            return (ReplyBody::text(text), None);
        }
    };

    let telemetry = value.pointer("/metadata/telemetry").cloned();
    if let Some(t) = &telemetry {
        tracing::debug!(telemetry = %t, "Single-shot telemetry");
    }

    let body = match &value {
        Value::Object(map) => ["response", "message", "content"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|inner| reply_from_value(inner, locale))
            .or_else(|| reply_from_value(&value, locale)),
        _ => reply_from_value(&value, locale),
    };
    (body.unwrap_or_else(|| ReplyBody::text("")), telemetry)
}
