//! Completion Backend Integration
//!
//! Abstracted access to the remote completion endpoint through the
//! [`CompletionBackend`] trait.
//!
//! # Available Backends
//!
//! - **HTTP**: JSON POST with an event-stream or single JSON reply (default)
//!
//! # Usage
//!
//! ```ignore
//! use concierge_core::backend::{HttpBackendConfig, HttpCompletionBackend, CompletionBackend};
//!
//! let backend = HttpCompletionBackend::new(HttpBackendConfig::new("http://localhost:8080/chat"))?;
//! let response = backend.dispatch(&request).await?;
//! ```

mod http;
mod traits;

pub use http::{HttpBackendConfig, HttpCompletionBackend, DEFAULT_CLIENT_TAG, DEFAULT_ENDPOINT_URL};
pub use traits::{
    BackendResponse, ByteStream, ChatRequest, CompletionBackend, RequestMetadata, ResponseBody,
    ResponseMode, TransportError, CONTENT_FORMAT_HEADER, EVENT_STREAM,
};
