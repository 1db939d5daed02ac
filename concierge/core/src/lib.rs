//! Concierge Core - Headless Assistant Chat Client
//!
//! This crate provides the client side of the booking platform's
//! conversational assistant: it screens what the guest types, sends it to a
//! remote completion endpoint, consumes the incrementally streamed reply, and
//! screens what comes back before it reaches the transcript. It has no UI
//! dependencies and can drive a terminal shell, a web view, or run headless in
//! tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          UI Shell                                 │
//! │        send_message(text) ▼            ▲ ClientUpdate (mpsc)      │
//! └────────────────────────────┼───────────┼──────────────────────────┘
//!                              │           │
//! ┌────────────────────────────┼───────────┼──────────────────────────┐
//! │                     ConciergeClient                               │
//! │  ┌────────────┐  ┌─────────────┐  ┌────────────┐  ┌────────────┐  │
//! │  │ TopicGuard │─▶│ RateLimiter │─▶│  dispatch  │─▶│  Decoder + │  │
//! │  │ (rules)    │  │             │  │ (backend)  │  │ Aggregator │  │
//! │  └────────────┘  └─────────────┘  └────────────┘  └─────┬──────┘  │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────▼───────┐ │
//! │  │ Fallback/Liveness│  │ ConversationStore│◀─│ OutputSanitizer  │ │
//! │  │ Telemetry        │  │                  │  │                  │ │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────┘ │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ConciergeClient`]: owns all per-conversation state and runs exchanges
//! - [`ClientUpdate`]: transcript and status changes published to the UI
//! - [`CompletionBackend`]: the seam to the remote completion endpoint
//! - [`ClientConfig`]: layered configuration (defaults, file, env, CLI)
//!
//! # Quick Start
//!
//! ```ignore
//! use concierge_core::{load_config, ConciergeClient, HttpCompletionBackend};
//! use tokio::sync::mpsc;
//!
//! let config = load_config()?;
//! let backend = HttpCompletionBackend::new(config.http_backend_config())?;
//! let (tx, mut rx) = mpsc::channel(64);
//! let mut client = ConciergeClient::new(config, backend, tx)?;
//!
//! client.send_message("Is the lakeside cottage free this weekend?").await;
//! while let Ok(update) = rx.try_recv() {
//!     // render update
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`messages`]: transcript message model and the structured/text reply union
//! - [`session`]: the in-memory conversation store and history condensation
//! - [`security`]: rule tables, topic guard, output sanitizer, notice templates
//! - [`transport`]: client and server rate limiting
//! - [`backend`]: completion backend trait and the HTTP implementation
//! - [`dispatch`]: request building and response classification
//! - [`streaming`]: event-stream decoder and content aggregator
//! - [`monitor`]: fallback, liveness and telemetry
//! - [`config`]: configuration loading
//! - [`client`]: the exchange orchestrator

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod messages;
pub mod monitor;
pub mod security;
pub mod session;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use backend::{
    BackendResponse, ChatRequest, CompletionBackend, HttpBackendConfig, HttpCompletionBackend,
    ResponseBody, ResponseMode, TransportError,
};
pub use client::{CancelHandle, ChatError, ClientUpdate, ConciergeClient, ExchangeOutcome};
pub use messages::{
    Audience, ChatMessage, ChatSection, ChatStructuredContent, ContentType, Locale, MessageId,
    MessageRole, MessageStatus, ReplyBody,
};
pub use session::{ConversationStore, HistoryEntry};

// Security exports
pub use security::{GuardReason, OutputSanitizer, RuleTables, TopicGuard};

// Monitor exports
pub use monitor::{ConnectionStatus, TelemetryCounters, UnavailableCode, UnavailableDetails};

// Streaming exports
pub use streaming::{ContentAggregator, ContentFormat, EventStreamDecoder, StreamEvent, StreamEventKind};

// Rate limit exports
pub use transport::{RateLimitConfig, RateLimited, RateLimiter};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConciergeToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
