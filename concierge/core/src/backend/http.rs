//! HTTP Completion Backend
//!
//! Posts the chat request as JSON to the configured endpoint with `reqwest`.
//! Event-stream responses are handed back as a byte stream; everything else
//! is read to completion.
//!
//! Only the connect phase is bounded here. The overall wait for headers and
//! the quiet-stream limits are enforced by the client so that every backend
//! shares the same timeout semantics.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, RETRY_AFTER};

use super::traits::{
    BackendResponse, ChatRequest, CompletionBackend, ResponseBody, ResponseMode, TransportError,
    CONTENT_FORMAT_HEADER, EVENT_STREAM,
};
use crate::streaming::ContentFormat;

/// Default completion endpoint
pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:8080/api/assistant/chat";

/// Default client tag sent as `X-Client-Id`
pub const DEFAULT_CLIENT_TAG: &str = "concierge-core";

/// Settings for the HTTP backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpBackendConfig {
    /// Endpoint URL
    pub url: String,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// Value of the `X-Client-Id` header
    pub client_tag: String,
    /// Value of the `X-Client-Role` header, when known
    pub role_hint: Option<String>,
    /// Requested response mode (drives the `Accept` header)
    pub response_mode: ResponseMode,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            client_tag: DEFAULT_CLIENT_TAG.to_string(),
            role_hint: None,
            response_mode: ResponseMode::Stream,
        }
    }
}

impl HttpBackendConfig {
    /// Configuration for `url` with defaults elsewhere
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the client tag
    #[must_use]
    pub fn with_client_tag(mut self, tag: impl Into<String>) -> Self {
        self.client_tag = tag.into();
        self
    }

    /// Set the role hint
    #[must_use]
    pub fn with_role_hint(mut self, role: Option<String>) -> Self {
        self.role_hint = role;
        self
    }

    /// Set the response mode
    #[must_use]
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }
}

/// Completion backend over HTTP
#[derive(Clone, Debug)]
pub struct HttpCompletionBackend {
    config: HttpBackendConfig,
    http_client: reqwest::Client,
}

impl HttpCompletionBackend {
    /// Create a backend for the given configuration
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the HTTP client cannot be built.
    pub fn new(config: HttpBackendConfig) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn accept(&self) -> &'static str {
        match self.config.response_mode {
            ResponseMode::Stream => EVENT_STREAM,
            ResponseMode::Single => "application/json",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

fn header_str(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn endpoint(&self) -> &str {
        &self.config.url
    }

    async fn dispatch(&self, request: &ChatRequest) -> Result<BackendResponse, TransportError> {
        let mut builder = self
            .http_client
            .post(&self.config.url)
            .header(ACCEPT, self.accept())
            .header("X-Client-Id", &self.config.client_tag)
            .json(request);
        if let Some(role) = &self.config.role_hint {
            builder = builder.header("X-Client-Role", role);
        }

        tracing::debug!(
            url = %self.config.url,
            mode = %self.config.response_mode,
            history = request.conversation_history.len(),
            "Dispatching chat request"
        );

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers();
        let content_type = header_str(headers, CONTENT_TYPE);
        let retry_after = header_str(headers, RETRY_AFTER);
        let content_format =
            header_str(headers, CONTENT_FORMAT_HEADER).and_then(|v| ContentFormat::parse(&v));

        let streaming = response.status().is_success()
            && content_type
                .as_deref()
                .is_some_and(|ct| ct.to_ascii_lowercase().contains(EVENT_STREAM));

        let body = if streaming {
            ResponseBody::Stream(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(TransportError::from))
                    .boxed(),
            )
        } else {
            ResponseBody::Full(response.text().await?)
        };

        Ok(BackendResponse {
            status,
            content_type,
            content_format,
            retry_after,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = HttpBackendConfig::new("http://example.test/chat")
            .with_client_tag("shell")
            .with_role_hint(Some("guest".to_string()))
            .with_response_mode(ResponseMode::Single)
            .with_connect_timeout(Duration::from_secs(3));
        assert_eq!(config.url, "http://example.test/chat");
        assert_eq!(config.client_tag, "shell");
        assert_eq!(config.role_hint.as_deref(), Some("guest"));
        assert_eq!(config.response_mode, ResponseMode::Single);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_backend_reports_endpoint() {
        let backend = HttpCompletionBackend::new(HttpBackendConfig::new("http://example.test/chat")).unwrap();
        assert_eq!(backend.name(), "http");
        assert_eq!(backend.endpoint(), "http://example.test/chat");
        assert_eq!(backend.accept(), EVENT_STREAM);
    }
}
