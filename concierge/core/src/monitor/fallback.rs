//! Fallback Monitor
//!
//! Classifies fallback-eligible failures and tracks the resulting
//! [`UnavailableDetails`] until the next successful exchange.
//!
//! The retry estimate scales with how long the failed attempt took:
//! `ceil(latency_secs * retry_latency_factor)`, clamped to
//! `[min_retry, max_retry]`. The constants are configurable.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::TransportError;
use crate::dispatch::DispatchError;
use crate::messages::{Audience, Locale};
use crate::security::{render, NoticeKey};

/// Failure classification shown to operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnavailableCode {
    /// Endpoint unreachable
    #[serde(rename = "NETWORK")]
    Network,
    /// No answer in time
    #[serde(rename = "TIMEOUT")]
    Timeout,
    /// Server-side error status
    #[serde(rename = "HTTP_5xx")]
    Http5xx,
    /// Anything else, including errors reported inside a stream
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl UnavailableCode {
    /// Wire/display name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
            Self::Http5xx => "HTTP_5xx",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Classify a dispatch failure
    #[must_use]
    pub fn from_dispatch_error(error: &DispatchError) -> Self {
        match error {
            DispatchError::Server { .. } => Self::Http5xx,
            DispatchError::Transport(TransportError::Connect(_)) => Self::Network,
            DispatchError::Transport(TransportError::Timeout(_)) => Self::Timeout,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for UnavailableCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the assistant is currently unavailable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableDetails {
    /// Failure classification
    pub code: UnavailableCode,
    /// HTTP status, if one was received
    pub status: Option<u16>,
    /// Time from dispatch to failure
    pub latency_ms: u64,
    /// Endpoint that failed
    pub endpoint: String,
    /// Suggested wait before retrying
    pub retry_in_seconds: u64,
}

/// Connection badge shown by the UI
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Last exchange succeeded
    #[default]
    Online,
    /// Live channel went quiet without a terminal event
    Degraded,
    /// Last exchange hit the fallback path
    Offline,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Degraded => f.write_str("degraded"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// Retry-estimate bounds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Lower bound of the retry estimate (default: 5 seconds)
    pub min_retry: Duration,
    /// Upper bound of the retry estimate (default: 60 seconds)
    pub max_retry: Duration,
    /// Multiplier applied to the failed attempt's latency (default: 3.0)
    pub retry_latency_factor: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            min_retry: Duration::from_secs(5),
            max_retry: Duration::from_secs(60),
            retry_latency_factor: 3.0,
        }
    }
}

impl FallbackConfig {
    /// Create a new config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry bounds
    #[must_use]
    pub fn with_retry_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_retry = min;
        self.max_retry = max.max(min);
        self
    }

    /// Set the latency multiplier
    #[must_use]
    pub fn with_retry_latency_factor(mut self, factor: f64) -> Self {
        self.retry_latency_factor = factor;
        self
    }
}

/// Tracks whether the assistant is reachable
#[derive(Debug, Default)]
pub struct FallbackMonitor {
    config: FallbackConfig,
    details: Option<UnavailableDetails>,
}

impl FallbackMonitor {
    /// Create a monitor
    #[must_use]
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            details: None,
        }
    }

    /// Retry estimate in whole seconds for a failure after `latency`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn retry_estimate(&self, latency: Duration) -> u64 {
        let min = self.config.min_retry.as_secs();
        let max = self.config.max_retry.as_secs().max(min);
        let scaled = (latency.as_secs_f64() * self.config.retry_latency_factor.max(0.0)).ceil();
        let scaled = if scaled.is_finite() { scaled as u64 } else { max };
        scaled.clamp(min, max)
    }

    /// Record a fallback-eligible failure
    pub fn record_failure(
        &mut self,
        code: UnavailableCode,
        status: Option<u16>,
        latency: Duration,
        endpoint: &str,
    ) -> &UnavailableDetails {
        let details = UnavailableDetails {
            code,
            status,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            endpoint: endpoint.to_string(),
            retry_in_seconds: self.retry_estimate(latency),
        };
        tracing::info!(
            code = %details.code,
            status = details.status,
            latency_ms = details.latency_ms,
            endpoint = %details.endpoint,
            retry_in_seconds = details.retry_in_seconds,
            "Assistant unavailable, fallback engaged"
        );
        self.details.insert(details)
    }

    /// Clear the failure after a successful exchange
    ///
    /// Returns true if the monitor was offline.
    pub fn record_success(&mut self) -> bool {
        let was_offline = self.details.take().is_some();
        if was_offline {
            tracing::info!("Assistant reachable again");
        }
        was_offline
    }

    /// Current failure, if any
    #[must_use]
    pub fn details(&self) -> Option<&UnavailableDetails> {
        self.details.as_ref()
    }

    /// Whether the last exchange hit the fallback path
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.details.is_some()
    }
}

/// Render the unavailable notice for a failure
///
/// Admin surfaces get code, status, latency, endpoint and retry estimate;
/// public surfaces only the retry estimate.
#[must_use]
pub fn render_unavailable(details: &UnavailableDetails, locale: Locale, audience: Audience) -> String {
    let status = details
        .status
        .map_or_else(|| "n/a".to_string(), |s| s.to_string());
    render(
        NoticeKey::Unavailable,
        locale,
        audience,
        &[
            ("code", details.code.to_string()),
            ("status", status),
            ("latency_ms", details.latency_ms.to_string()),
            ("endpoint", details.endpoint.clone()),
            ("retry", details.retry_in_seconds.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_code_wire_names() {
        assert_eq!(serde_json::to_string(&UnavailableCode::Http5xx).unwrap(), "\"HTTP_5xx\"");
        assert_eq!(UnavailableCode::Network.to_string(), "NETWORK");
    }

    #[test]
    fn test_code_classification() {
        assert_eq!(
            UnavailableCode::from_dispatch_error(&DispatchError::Server { status: 503 }),
            UnavailableCode::Http5xx
        );
        assert_eq!(
            UnavailableCode::from_dispatch_error(&DispatchError::Transport(TransportError::Connect(
                "refused".into()
            ))),
            UnavailableCode::Network
        );
        assert_eq!(
            UnavailableCode::from_dispatch_error(&DispatchError::Transport(TransportError::Timeout(
                "slow".into()
            ))),
            UnavailableCode::Timeout
        );
        assert_eq!(
            UnavailableCode::from_dispatch_error(&DispatchError::Transport(TransportError::Other(
                "?".into()
            ))),
            UnavailableCode::Unknown
        );
    }

    #[test]
    fn test_retry_estimate_bounds() {
        let monitor = FallbackMonitor::new(FallbackConfig::default());
        assert_eq!(monitor.retry_estimate(Duration::ZERO), 5);
        assert_eq!(monitor.retry_estimate(Duration::from_millis(2500)), 8);
        assert_eq!(monitor.retry_estimate(Duration::from_secs(10)), 30);
        assert_eq!(monitor.retry_estimate(Duration::from_secs(90)), 60);
    }

    #[test]
    fn test_retry_estimate_configurable() {
        let monitor = FallbackMonitor::new(
            FallbackConfig::new()
                .with_retry_bounds(Duration::from_secs(2), Duration::from_secs(10))
                .with_retry_latency_factor(1.0),
        );
        assert_eq!(monitor.retry_estimate(Duration::from_secs(4)), 4);
        assert_eq!(monitor.retry_estimate(Duration::from_secs(40)), 10);
    }

    #[test]
    fn test_failure_then_success() {
        let mut monitor = FallbackMonitor::default();
        assert!(!monitor.is_offline());

        let details = monitor
            .record_failure(
                UnavailableCode::Network,
                None,
                Duration::from_millis(40),
                "http://localhost:9/chat",
            )
            .clone();
        assert_eq!(details.code, UnavailableCode::Network);
        assert_eq!(details.latency_ms, 40);
        assert!((5..=60).contains(&details.retry_in_seconds));
        assert!(monitor.is_offline());

        assert!(monitor.record_success());
        assert!(monitor.details().is_none());
        assert!(!monitor.record_success());
    }

    #[test]
    fn test_render_detail_by_audience() {
        let details = UnavailableDetails {
            code: UnavailableCode::Http5xx,
            status: Some(503),
            latency_ms: 812,
            endpoint: "https://assist.example/chat".to_string(),
            retry_in_seconds: 5,
        };
        let admin = render_unavailable(&details, Locale::En, Audience::AdminDev);
        assert!(admin.contains("HTTP_5xx"));
        assert!(admin.contains("503"));
        assert!(admin.contains("812"));
        assert!(admin.contains("https://assist.example/chat"));

        let public = render_unavailable(&details, Locale::En, Audience::PublicFront);
        assert!(!public.contains("503"));
        assert!(!public.contains("assist.example"));
        assert!(public.contains('5'));
    }

    #[test]
    fn test_details_serialize_camel_case() {
        let details = UnavailableDetails {
            code: UnavailableCode::Timeout,
            status: None,
            latency_ms: 1,
            endpoint: "e".to_string(),
            retry_in_seconds: 5,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["code"], "TIMEOUT");
        assert_eq!(json["retryInSeconds"], 5);
        assert_eq!(json["latencyMs"], 1);
    }
}
