//! The Concierge Client - headless assistant chat orchestration
//!
//! One [`ConciergeClient`] owns everything a chat surface needs: the
//! transcript, the guard and sanitizer, the rate limiter, and the fallback,
//! liveness and telemetry monitors. A UI shell calls
//! [`ConciergeClient::send_message`] and renders the [`ClientUpdate`]s it
//! receives on its channel.
//!
//! # Exchange pipeline
//!
//! ```text
//! text ─▶ TopicGuard ─▶ RateLimiter ─▶ dispatch ─┬─▶ single JSON ─────────────┐
//!                                                 └─▶ EventStreamDecoder        │
//!                                                       └─▶ ContentAggregator ─┴─▶ OutputSanitizer ─▶ store
//! ```
//!
//! # Design Philosophy
//!
//! - All state lives on the client and is mutated through `&mut self`, one
//!   exchange at a time; nothing is shared across threads.
//! - Every path ends with the placeholder holding real content or a localized
//!   notice, never left empty.
//! - Cancellation is cooperative: a [`CancelHandle`] wakes the exchange out of
//!   its current await point.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::backend::{ByteStream, CompletionBackend, TransportError};
use crate::config::ClientConfig;
use crate::dispatch::{build_request, dispatch, DispatchError, DispatchOutcome, RequestContext};
use crate::messages::{
    Audience, ChatMessage, ChatSection, ContentType, Locale, MessageId, MessageStatus, ReplyBody,
};
use crate::monitor::{
    render_unavailable, ConnectionStatus, FallbackMonitor, LivenessCheck, LivenessMonitor,
    TelemetryCounters, UnavailableCode, UnavailableDetails,
};
use crate::security::{
    render, GuardReason, NoticeKey, OutputSanitizer, RuleError, TopicGuard,
};
use crate::session::ConversationStore;
use crate::streaming::{
    ContentAggregator, ContentFormat, EventStreamDecoder, StreamDiagnostics, StreamEvent,
    StreamFailure, StreamProgress,
};
use crate::transport::{RateLimitDecision, RateLimitState, RateLimited, RateLimiter};

// =============================================================================
// Public Types
// =============================================================================

/// A change the UI should render, published in the order it happened
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientUpdate {
    /// A message was added to the transcript
    MessageAppended {
        /// Snapshot of the new message
        message: ChatMessage,
    },
    /// An in-flight or existing message changed
    MessageUpdated {
        /// Snapshot after the change
        message: ChatMessage,
    },
    /// A reply settled with its final content and status
    MessageFinalized {
        /// Final snapshot
        message: ChatMessage,
    },
    /// The connection badge changed
    StatusChanged {
        /// New badge
        status: ConnectionStatus,
    },
    /// The transcript was cleared
    TranscriptCleared,
}

/// Why an exchange did not produce an assistant reply
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    /// Input refused before dispatch
    #[error("input blocked by guard ({0})")]
    GuardBlocked(GuardReason),

    /// Client or server cooldown in effect
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    /// Endpoint rejected the caller's credentials
    #[error("authentication required (HTTP {status})")]
    AuthRequired {
        /// HTTP status code
        status: u16,
    },

    /// Endpoint rejected the request itself
    #[error("request rejected (HTTP {status})")]
    ClientError {
        /// HTTP status code
        status: u16,
    },

    /// Fallback path engaged
    #[error("assistant unavailable ({code}), retry in {retry_in_seconds}s")]
    ServerUnavailable {
        /// Failure classification
        code: UnavailableCode,
        /// HTTP status, if one was received
        status: Option<u16>,
        /// Suggested wait before retrying
        retry_in_seconds: u64,
    },
}

/// How a call to [`ConciergeClient::send_message`] ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Blank input, nothing happened
    Ignored,
    /// The reply settled in the message with this id
    Completed {
        /// Assistant message id
        id: MessageId,
    },
    /// A notice was written to the message with this id instead of a reply
    Failed {
        /// Assistant message id
        id: MessageId,
        /// What went wrong
        error: ChatError,
    },
    /// The exchange was cancelled; partial content was kept
    Cancelled {
        /// Assistant message id
        id: MessageId,
    },
}

impl ExchangeOutcome {
    /// Id of the assistant message this exchange settled in
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Ignored => None,
            Self::Completed { id } | Self::Failed { id, .. } | Self::Cancelled { id } => Some(id),
        }
    }
}

/// Aborts the exchange currently running on a client
///
/// Cloneable and usable from any task. A cancel issued while no exchange is
/// running has no effect on later exchanges.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<u64>>,
}

impl CancelHandle {
    /// Abort the active dispatch or stream read
    pub fn cancel(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

/// One step of the stream read loop
enum StreamStep {
    Bytes(bytes::Bytes),
    Closed,
    Silent,
    Failed(TransportError),
    Cancelled,
}

// =============================================================================
// Client
// =============================================================================

/// Headless assistant chat client
pub struct ConciergeClient<B: CompletionBackend> {
    config: ClientConfig,
    backend: Arc<B>,
    locale: Locale,
    guard: TopicGuard,
    sanitizer: OutputSanitizer,
    rate_limiter: RateLimiter,
    fallback: FallbackMonitor,
    liveness: LivenessMonitor,
    telemetry: TelemetryCounters,
    store: ConversationStore,
    status: ConnectionStatus,
    last_diagnostics: Option<StreamDiagnostics>,
    tx: mpsc::Sender<ClientUpdate>,
    cancel_tx: Arc<watch::Sender<u64>>,
}

impl<B: CompletionBackend + 'static> ConciergeClient<B> {
    /// Create a client over `backend`, publishing updates on `tx`
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] if a configured guard pattern does not compile.
    pub fn new(
        config: ClientConfig,
        backend: B,
        tx: mpsc::Sender<ClientUpdate>,
    ) -> Result<Self, RuleError> {
        let rules = Arc::new(config.rule_tables()?);
        let guard = TopicGuard::new(Arc::clone(&rules)).with_max_input_chars(config.max_input_chars);
        let sanitizer = OutputSanitizer::new(rules);
        let (cancel_tx, _) = watch::channel(0u64);

        tracing::info!(
            backend = backend.name(),
            endpoint = backend.endpoint(),
            audience = %config.audience,
            locale = %config.locale,
            "Concierge client created"
        );

        Ok(Self {
            locale: config.locale,
            guard,
            sanitizer,
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            fallback: FallbackMonitor::new(config.fallback.clone()),
            liveness: LivenessMonitor::new(config.liveness.clone()),
            telemetry: TelemetryCounters::default(),
            store: ConversationStore::new(),
            status: ConnectionStatus::Online,
            last_diagnostics: None,
            backend: Arc::new(backend),
            config,
            tx,
            cancel_tx: Arc::new(cancel_tx),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Deployment audience
    #[must_use]
    pub fn audience(&self) -> Audience {
        self.config.audience
    }

    /// Current reply language
    #[must_use]
    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Switch the reply language for later exchanges
    pub fn set_locale(&mut self, locale: Locale) {
        tracing::debug!(locale = %locale, "Locale changed");
        self.locale = locale;
    }

    /// Connection badge
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Why the assistant is unavailable, while the fallback path is active
    #[must_use]
    pub fn unavailable_details(&self) -> Option<&UnavailableDetails> {
        self.fallback.details()
    }

    /// Blocked/fallback counters
    #[must_use]
    pub fn telemetry(&self) -> TelemetryCounters {
        self.telemetry
    }

    /// Rate limiter state (read-only)
    #[must_use]
    pub fn rate_limit_state(&self) -> &RateLimitState {
        self.rate_limiter.state()
    }

    /// Diagnostics of the most recent stream
    #[must_use]
    pub fn last_stream_diagnostics(&self) -> Option<&StreamDiagnostics> {
        self.last_diagnostics.as_ref()
    }

    /// Messages in order
    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    /// Handle for aborting the running exchange from another task
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Empty the transcript and reset telemetry
    ///
    /// Rate-limit deadlines are kept.
    pub async fn clear_history(&mut self) {
        self.store.clear();
        self.telemetry.reset();
        self.liveness.reset();
        self.last_diagnostics = None;
        tracing::info!("Conversation cleared");
        self.send(ClientUpdate::TranscriptCleared).await;
        self.set_status(self.settled_status()).await;
    }

    /// Run one full exchange for `text`
    pub async fn send_message(&mut self, text: &str) -> ExchangeOutcome {
        let text = text.trim();
        if text.is_empty() {
            return ExchangeOutcome::Ignored;
        }

        let history = self.store.history(
            self.config.history_limit,
            self.config.history_preview_chars,
            None,
        );
        let user_msg = ChatMessage::user(text, self.locale);
        let user_id = self.store.push(user_msg.clone());
        self.send(ClientUpdate::MessageAppended { message: user_msg }).await;

        if let Err(blocked) = self.guard.evaluate(text, self.locale, self.config.audience) {
            self.telemetry.increment_blocked();
            self.set_message_status(&user_id, MessageStatus::Error).await;
            let id = self.append_notice(&blocked.notice).await;
            return ExchangeOutcome::Failed {
                id,
                error: ChatError::GuardBlocked(blocked.reason),
            };
        }

        if let RateLimitDecision::Limited(limited) = self.rate_limiter.check() {
            tracing::warn!(
                origin = %limited.origin,
                wait_secs = limited.wait_secs,
                "Message rate limited"
            );
            self.set_message_status(&user_id, MessageStatus::Error).await;
            let notice = self.rate_limited_notice(&limited);
            let id = self.append_notice(&notice).await;
            return ExchangeOutcome::Failed {
                id,
                error: limited.into(),
            };
        }

        self.set_message_status(&user_id, MessageStatus::Success).await;
        let reply_id = self.store.start_placeholder();
        if let Some(placeholder) = self.store.get(&reply_id).cloned() {
            self.send(ClientUpdate::MessageAppended {
                message: placeholder,
            })
            .await;
        }

        self.liveness.reset();
        let request = build_request(RequestContext {
            message: text,
            history,
            audience: self.config.audience,
            locale: self.locale,
            mode: self.config.response_mode,
            client_tag: &self.config.client_tag,
            personal_id: self.config.personal_id.as_deref(),
        });

        let mut cancel = self.cancel_tx.subscribe();
        let started = Instant::now();
        let request_timeout = self.config.request_timeout;

        tracing::debug!(
            history = request.conversation_history.len(),
            mode = self.config.response_mode.as_str(),
            "Dispatching message"
        );

        let dispatched = tokio::select! {
            biased;
            _ = cancel.changed() => None,
            result = tokio::time::timeout(
                request_timeout,
                dispatch(self.backend.as_ref(), &request, self.locale),
            ) => Some(result.unwrap_or_else(|_| {
                Err(DispatchError::Transport(TransportError::Timeout(format!(
                    "no response within {}ms",
                    request_timeout.as_millis()
                ))))
            })),
        };

        let outcome = match dispatched {
            None => self.finish_cancelled(&reply_id, None).await,
            Some(Err(error)) => self.finish_dispatch_error(&reply_id, error, started).await,
            Some(Ok(DispatchOutcome::Single { body, .. })) => {
                self.last_diagnostics = None;
                self.finalize_reply(&reply_id, &body).await
            }
            Some(Ok(DispatchOutcome::Stream {
                status,
                format,
                body,
            })) => {
                self.consume_stream(&reply_id, status, format, body, cancel, started)
                    .await
            }
        };

        // Undelivered turns stay out of later history
        if matches!(outcome, ExchangeOutcome::Failed { .. }) {
            self.set_message_status(&user_id, MessageStatus::Error).await;
        }
        outcome
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    async fn consume_stream(
        &mut self,
        id: &MessageId,
        status: u16,
        format: ContentFormat,
        mut body: ByteStream,
        mut cancel: watch::Receiver<u64>,
        started: Instant,
    ) -> ExchangeOutcome {
        let mut decoder = EventStreamDecoder::new();
        let mut aggregator = ContentAggregator::new(format, self.locale);
        self.liveness.begin_at(Instant::now());

        loop {
            let wait = self.liveness.next_check_in(Instant::now());
            let step = tokio::select! {
                biased;
                _ = cancel.changed() => StreamStep::Cancelled,
                read = tokio::time::timeout(wait, body.next()) => match read {
                    Err(_) => StreamStep::Silent,
                    Ok(None) => StreamStep::Closed,
                    Ok(Some(Err(e))) => StreamStep::Failed(e),
                    Ok(Some(Ok(bytes))) => StreamStep::Bytes(bytes),
                },
            };

            match step {
                StreamStep::Cancelled | StreamStep::Failed(TransportError::Aborted) => {
                    self.liveness.reset();
                    self.last_diagnostics = Some(aggregator.diagnostics().clone());
                    return self.finish_cancelled(id, Some(&aggregator)).await;
                }
                StreamStep::Failed(error) => {
                    self.liveness.reset();
                    let code = UnavailableCode::from_dispatch_error(&DispatchError::Transport(error));
                    return self.finish_fallback(id, code, Some(status), started).await;
                }
                StreamStep::Silent => match self.liveness.check_at(Instant::now()) {
                    LivenessCheck::WentQuiet => self.set_status(ConnectionStatus::Degraded).await,
                    LivenessCheck::Expired => {
                        tracing::warn!(
                            idle_ms = u64::try_from(self.liveness.config().stream_idle_timeout.as_millis())
                                .unwrap_or(u64::MAX),
                            "Stream idle timeout"
                        );
                        self.liveness.reset();
                        return self
                            .finish_fallback(id, UnavailableCode::Timeout, Some(status), started)
                            .await;
                    }
                    LivenessCheck::Alive | LivenessCheck::StillQuiet => {}
                },
                StreamStep::Bytes(bytes) => {
                    if self.liveness.record_activity_at(Instant::now()) {
                        self.set_status(self.settled_status()).await;
                    }
                    let events = decoder.push_bytes(&bytes);
                    if let Err(failure) = self.apply_events(id, &mut aggregator, &events).await {
                        return self.finish_stream_failure(id, &failure, status, started).await;
                    }
                    if aggregator.is_finished() {
                        break;
                    }
                }
                StreamStep::Closed => {
                    let events = decoder.finish();
                    if let Err(failure) = self.apply_events(id, &mut aggregator, &events).await {
                        return self.finish_stream_failure(id, &failure, status, started).await;
                    }
                    break;
                }
            }
        }

        if self.liveness.end() {
            self.set_status(ConnectionStatus::Degraded).await;
        }
        self.last_diagnostics = Some(aggregator.diagnostics().clone());
        self.finalize_reply(id, &aggregator.body()).await
    }

    /// Apply decoded events in order, publishing each visible change
    async fn apply_events(
        &mut self,
        id: &MessageId,
        aggregator: &mut ContentAggregator,
        events: &[StreamEvent],
    ) -> Result<(), StreamFailure> {
        for event in events {
            tracing::trace!(kind = %event.kind, "Stream event");
            match aggregator.apply(event)? {
                StreamProgress::Content => self.publish_partial(id, &aggregator.body()).await,
                StreamProgress::Finished => {
                    self.liveness.record_terminal();
                    return Ok(());
                }
                StreamProgress::Heartbeat | StreamProgress::Idle => {}
            }
        }
        Ok(())
    }

    async fn publish_partial(&mut self, id: &MessageId, body: &ReplyBody) {
        let sanitized = self.sanitizer.sanitize(body, self.locale, self.config.audience);
        let locale = self.locale;
        let updated = self
            .store
            .update(id, |m| m.set_sections(locale, sanitized.sections, sanitized.content_type))
            .cloned();
        if let Some(message) = updated {
            self.send(ClientUpdate::MessageUpdated { message }).await;
        }
    }

    // =========================================================================
    // Settling the placeholder
    // =========================================================================

    async fn finalize_reply(&mut self, id: &MessageId, body: &ReplyBody) -> ExchangeOutcome {
        let (sections, content_type, status) = if body.is_empty() {
            tracing::warn!("Exchange produced no content");
            (
                vec![ChatSection::text(self.notice(NoticeKey::NoResponse, &[]))],
                ContentType::Text,
                MessageStatus::Error,
            )
        } else {
            let sanitized = self.sanitizer.sanitize(body, self.locale, self.config.audience);
            if sanitized.blocked {
                self.telemetry.increment_blocked();
            }
            (sanitized.sections, sanitized.content_type, sanitized.status)
        };

        self.settle(id, sections, content_type, status).await;
        self.fallback.record_success();
        self.set_status(self.settled_status()).await;
        ExchangeOutcome::Completed { id: id.clone() }
    }

    async fn finish_cancelled(
        &mut self,
        id: &MessageId,
        aggregator: Option<&ContentAggregator>,
    ) -> ExchangeOutcome {
        tracing::info!("Exchange cancelled");
        let body = aggregator.map_or_else(|| ReplyBody::text(""), ContentAggregator::body);
        let (sections, content_type, status) = if body.is_empty() {
            (
                vec![ChatSection::text(self.notice(NoticeKey::NoResponse, &[]))],
                ContentType::Text,
                MessageStatus::Error,
            )
        } else {
            let sanitized = self.sanitizer.sanitize(&body, self.locale, self.config.audience);
            if sanitized.blocked {
                self.telemetry.increment_blocked();
            }
            (sanitized.sections, sanitized.content_type, sanitized.status)
        };
        self.settle(id, sections, content_type, status).await;
        self.set_status(self.settled_status()).await;
        ExchangeOutcome::Cancelled { id: id.clone() }
    }

    async fn finish_dispatch_error(
        &mut self,
        id: &MessageId,
        error: DispatchError,
        started: Instant,
    ) -> ExchangeOutcome {
        match error {
            DispatchError::RateLimited { retry_after } => {
                let penalty = self.rate_limiter.apply_server_penalty(retry_after);
                let limited = RateLimited::from_server_penalty(penalty);
                let notice = self.rate_limited_notice(&limited);
                self.settle_notice(id, &notice).await;
                ExchangeOutcome::Failed {
                    id: id.clone(),
                    error: limited.into(),
                }
            }
            DispatchError::AuthRequired { status } => {
                tracing::warn!(status, "Assistant endpoint requires authentication");
                let notice = self.notice(NoticeKey::AuthRequired, &[("status", status.to_string())]);
                self.settle_notice(id, &notice).await;
                ExchangeOutcome::Failed {
                    id: id.clone(),
                    error: ChatError::AuthRequired { status },
                }
            }
            DispatchError::Client { status } => {
                tracing::warn!(status, "Assistant endpoint rejected the request");
                let notice = self.notice(NoticeKey::ClientFailure, &[("status", status.to_string())]);
                self.settle_notice(id, &notice).await;
                ExchangeOutcome::Failed {
                    id: id.clone(),
                    error: ChatError::ClientError { status },
                }
            }
            DispatchError::Transport(TransportError::Aborted) => self.finish_cancelled(id, None).await,
            error => {
                tracing::debug!(error = %error, "Dispatch failed");
                let code = UnavailableCode::from_dispatch_error(&error);
                self.finish_fallback(id, code, error.status(), started).await
            }
        }
    }

    async fn finish_stream_failure(
        &mut self,
        id: &MessageId,
        failure: &StreamFailure,
        status: u16,
        started: Instant,
    ) -> ExchangeOutcome {
        tracing::warn!(error = %failure, "Stream reported an error");
        self.liveness.reset();
        self.finish_fallback(id, UnavailableCode::Unknown, Some(status), started)
            .await
    }

    async fn finish_fallback(
        &mut self,
        id: &MessageId,
        code: UnavailableCode,
        status: Option<u16>,
        started: Instant,
    ) -> ExchangeOutcome {
        let details = self
            .fallback
            .record_failure(code, status, started.elapsed(), self.backend.endpoint())
            .clone();
        self.telemetry.increment_fallback();
        let notice = render_unavailable(&details, self.locale, self.config.audience);
        self.settle_notice(id, &notice).await;
        self.set_status(ConnectionStatus::Offline).await;
        ExchangeOutcome::Failed {
            id: id.clone(),
            error: ChatError::ServerUnavailable {
                code: details.code,
                status: details.status,
                retry_in_seconds: details.retry_in_seconds,
            },
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn notice(&self, key: NoticeKey, args: &[(&str, String)]) -> String {
        render(key, self.locale, self.config.audience, args)
    }

    fn rate_limited_notice(&self, limited: &RateLimited) -> String {
        self.notice(
            NoticeKey::RateLimited,
            &[("seconds", limited.wait_secs.to_string())],
        )
    }

    /// Badge to show once an exchange settles without a fallback
    fn settled_status(&self) -> ConnectionStatus {
        if self.fallback.is_offline() {
            ConnectionStatus::Offline
        } else if self.liveness.is_degraded() {
            ConnectionStatus::Degraded
        } else {
            ConnectionStatus::Online
        }
    }

    async fn append_notice(&mut self, text: &str) -> MessageId {
        let msg = ChatMessage::notice(text, self.locale, MessageStatus::Error);
        let id = self.store.push(msg.clone());
        self.send(ClientUpdate::MessageAppended { message: msg }).await;
        id
    }

    async fn settle_notice(&mut self, id: &MessageId, text: &str) {
        self.settle(
            id,
            vec![ChatSection::text(text)],
            ContentType::Text,
            MessageStatus::Error,
        )
        .await;
    }

    async fn settle(
        &mut self,
        id: &MessageId,
        sections: Vec<ChatSection>,
        content_type: ContentType,
        status: MessageStatus,
    ) {
        let locale = self.locale;
        let settled = self
            .store
            .update(id, |m| {
                m.set_sections(locale, sections, content_type);
                m.status = Some(status);
            })
            .cloned();
        self.store.finish_in_flight(id);
        if let Some(message) = settled {
            self.send(ClientUpdate::MessageFinalized { message }).await;
        }
    }

    async fn set_message_status(&mut self, id: &MessageId, status: MessageStatus) {
        let updated = self.store.update(id, |m| m.status = Some(status)).cloned();
        if let Some(message) = updated {
            self.send(ClientUpdate::MessageUpdated { message }).await;
        }
    }

    async fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        tracing::info!(from = %self.status, to = %status, "Connection status changed");
        self.status = status;
        self.send(ClientUpdate::StatusChanged { status }).await;
    }

    async fn send(&self, update: ClientUpdate) {
        if let Err(e) = self.tx.send(update).await {
            tracing::warn!("Failed to publish client update: {}", e);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
