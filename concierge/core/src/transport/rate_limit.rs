//! Client-Side Rate Limiting
//!
//! Enforces two independent brakes on outbound requests:
//!
//! - A client cooldown: a minimum gap between consecutive dispatched requests
//! - A server cooldown: set when the backend answers HTTP 429, lasting the
//!   larger of the server's `Retry-After` and a configured minimum penalty
//!
//! # Design
//!
//! The limiter is owned by a single client and mutated through `&mut self`,
//! so a conversation has exactly one rate-limit state. Every check takes an
//! explicit `now` so behaviour is testable without sleeping. A request only
//! counts toward the cooldown once it is actually allowed through.
//!
//! # Usage
//!
//! ```
//! use std::time::{Duration, Instant};
//! use concierge_core::transport::rate_limit::{RateLimitConfig, RateLimiter};
//!
//! let mut limiter = RateLimiter::new(RateLimitConfig::default());
//! let t0 = Instant::now();
//! assert!(limiter.check_at(t0).is_allowed());
//! assert!(!limiter.check_at(t0 + Duration::from_millis(500)).is_allowed());
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Configuration
// =============================================================================

/// Default minimum gap between requests (milliseconds)
pub const DEFAULT_COOLDOWN_MS: u64 = 2500;

/// Default minimum server penalty after HTTP 429 (seconds)
pub const DEFAULT_MIN_SERVER_PENALTY_SECS: u64 = 15;

/// Configuration for client-side rate limiting
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum gap between consecutive dispatched requests
    pub cooldown: Duration,

    /// Floor for the server cooldown applied after HTTP 429
    pub min_server_penalty: Duration,

    /// Whether to enable rate limiting (can be disabled for testing)
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            min_server_penalty: Duration::from_secs(DEFAULT_MIN_SERVER_PENALTY_SECS),
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client cooldown
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the minimum server penalty
    #[must_use]
    pub fn with_min_server_penalty(mut self, penalty: Duration) -> Self {
        self.min_server_penalty = penalty;
        self
    }

    /// Enable or disable rate limiting
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Create a disabled configuration (for testing)
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

// =============================================================================
// Decision Types
// =============================================================================

/// Which brake produced a rate-limit decision
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitSource {
    /// Local cooldown between requests
    Client,
    /// Cooldown imposed by the backend (HTTP 429)
    Server,
}

impl fmt::Display for RateLimitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// Request is rate limited
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Rate limited ({origin}): retry in {wait_secs}s")]
pub struct RateLimited {
    /// Which brake fired
    pub origin: RateLimitSource,
    /// Remaining wait, rounded up to whole seconds (at least 1)
    pub wait_secs: u64,
}

impl RateLimited {
    /// The decision a freshly applied server penalty implies
    #[must_use]
    pub fn from_server_penalty(penalty: Duration) -> Self {
        Self {
            origin: RateLimitSource::Server,
            wait_secs: ceil_secs(penalty),
        }
    }
}

/// Result of a rate limit check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request may be dispatched; it has been recorded
    Allowed,
    /// Request must not be dispatched
    Limited(RateLimited),
}

impl RateLimitDecision {
    /// Check if the request is allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Remaining wait in whole seconds, if limited
    #[must_use]
    pub fn wait_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed => None,
            Self::Limited(limited) => Some(limited.wait_secs),
        }
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Per-conversation rate-limit state
#[derive(Clone, Debug, Default)]
pub struct RateLimitState {
    /// When the last request was dispatched
    pub last_request_at: Option<Instant>,
    /// Until when the backend asked us to back off
    pub server_cooldown_until: Option<Instant>,
}

/// Two-brake rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: RateLimitState,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: RateLimitState::default(),
        }
    }

    /// Check whether a request may be dispatched now
    pub fn check(&mut self) -> RateLimitDecision {
        self.check_at(Instant::now())
    }

    /// Check whether a request may be dispatched at `now`
    ///
    /// An allowed request is recorded as the latest dispatch. A server
    /// cooldown takes precedence over the client cooldown.
    pub fn check_at(&mut self, now: Instant) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Allowed;
        }

        if let Some(until) = self.state.server_cooldown_until {
            if until > now {
                return RateLimitDecision::Limited(RateLimited {
                    origin: RateLimitSource::Server,
                    wait_secs: ceil_secs(until - now),
                });
            }
            self.state.server_cooldown_until = None;
        }

        if let Some(last) = self.state.last_request_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.config.cooldown {
                return RateLimitDecision::Limited(RateLimited {
                    origin: RateLimitSource::Client,
                    wait_secs: ceil_secs(self.config.cooldown - elapsed),
                });
            }
        }

        self.state.last_request_at = Some(now);
        RateLimitDecision::Allowed
    }

    /// Record an HTTP 429 received at `now`
    ///
    /// The cooldown lasts `max(suggested, min_server_penalty)`.
    pub fn apply_server_penalty_at(&mut self, now: Instant, suggested: Option<Duration>) -> Duration {
        let penalty = suggested
            .unwrap_or_default()
            .max(self.config.min_server_penalty);
        self.state.server_cooldown_until = Some(now + penalty);
        tracing::warn!(
            penalty_secs = penalty.as_secs(),
            suggested_secs = suggested.map(|d| d.as_secs()),
            "Server rate limit applied"
        );
        penalty
    }

    /// Record an HTTP 429 received now
    pub fn apply_server_penalty(&mut self, suggested: Option<Duration>) -> Duration {
        self.apply_server_penalty_at(Instant::now(), suggested)
    }

    /// Current state (read-only)
    #[must_use]
    pub fn state(&self) -> &RateLimitState {
        &self.state
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

/// Parse a `Retry-After` header value (delta-seconds or HTTP-date)
///
/// Dates in the past yield a zero duration. Unparseable values yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    #[test]
    fn test_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.cooldown, Duration::from_millis(2500));
        assert_eq!(config.min_server_penalty, Duration::from_secs(15));
        assert!(config.enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = RateLimitConfig::new()
            .with_cooldown(Duration::from_secs(1))
            .with_min_server_penalty(Duration::from_secs(30))
            .with_enabled(false);
        assert_eq!(config.cooldown, Duration::from_secs(1));
        assert_eq!(config.min_server_penalty, Duration::from_secs(30));
        assert!(!config.enabled);
    }

    // =========================================================================
    // Limiter Tests
    // =========================================================================

    #[test]
    fn test_first_request_allowed() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        assert!(limiter.check_at(Instant::now()).is_allowed());
    }

    #[test]
    fn test_client_cooldown() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        assert!(limiter.check_at(t0).is_allowed());

        let decision = limiter.check_at(t0 + Duration::from_millis(500));
        assert_eq!(
            decision,
            RateLimitDecision::Limited(RateLimited {
                origin: RateLimitSource::Client,
                wait_secs: 2,
            })
        );

        assert!(limiter.check_at(t0 + Duration::from_millis(2500)).is_allowed());
    }

    #[test]
    fn test_limited_request_not_recorded() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        limiter.check_at(t0);
        limiter.check_at(t0 + Duration::from_millis(2000));
        assert_eq!(limiter.state().last_request_at, Some(t0));
    }

    #[test]
    fn test_server_penalty_uses_retry_after() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        limiter.check_at(t0);

        let penalty = limiter.apply_server_penalty_at(t0, Some(Duration::from_secs(30)));
        assert_eq!(penalty, Duration::from_secs(30));

        let decision = limiter.check_at(t0 + Duration::from_secs(5));
        assert_eq!(
            decision,
            RateLimitDecision::Limited(RateLimited {
                origin: RateLimitSource::Server,
                wait_secs: 25,
            })
        );
    }

    #[test]
    fn test_server_penalty_floor() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        assert_eq!(
            limiter.apply_server_penalty_at(t0, Some(Duration::from_secs(2))),
            Duration::from_secs(15)
        );
        assert_eq!(
            limiter.apply_server_penalty_at(t0, None),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_from_server_penalty_rounds_up() {
        let limited = RateLimited::from_server_penalty(Duration::from_millis(15_200));
        assert_eq!(limited.origin, RateLimitSource::Server);
        assert_eq!(limited.wait_secs, 16);
    }

    #[test]
    fn test_server_cooldown_expires() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        limiter.apply_server_penalty_at(t0, None);
        assert!(limiter.check_at(t0 + Duration::from_secs(16)).is_allowed());
        assert!(limiter.state().server_cooldown_until.is_none());
    }

    #[test]
    fn test_wait_rounds_up_to_at_least_one_second() {
        let mut limiter = RateLimiter::new(RateLimitConfig::default());
        let t0 = Instant::now();
        limiter.check_at(t0);
        let decision = limiter.check_at(t0 + Duration::from_millis(2499));
        assert_eq!(decision.wait_secs(), Some(1));
    }

    #[test]
    fn test_disabled_allows_everything() {
        let mut limiter = RateLimiter::new(RateLimitConfig::disabled());
        let t0 = Instant::now();
        for _ in 0..100 {
            assert!(limiter.check_at(t0).is_allowed());
        }
    }

    // =========================================================================
    // Retry-After Tests
    // =========================================================================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(
            parse_retry_after(" 30 ", Utc::now()),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:45 GMT", now),
            Some(Duration::from_secs(45))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_garbage() {
        assert_eq!(parse_retry_after("soon", Utc::now()), None);
    }

    #[test]
    fn test_error_display() {
        let err = RateLimited {
            origin: RateLimitSource::Server,
            wait_secs: 12,
        };
        assert_eq!(err.to_string(), "Rate limited (server): retry in 12s");
    }
}
