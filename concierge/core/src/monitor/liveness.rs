//! Stream Liveness Monitoring
//!
//! Tracks activity on the live channel of an in-flight exchange. Any bytes
//! (heartbeats included) count as activity.
//!
//! # Protocol
//!
//! 1. The stream opens: the monitor starts watching
//! 2. Nothing arrives for `quiet_after`: the channel is flagged degraded
//! 3. Nothing arrives for `stream_idle_timeout`: the exchange is abandoned
//!    and reported as a timeout
//! 4. Activity after step 2 clears the degraded flag
//!
//! A stream that closes without a terminal event is also flagged degraded.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Configuration for liveness behavior
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Silence before the channel is flagged degraded (default: 20 seconds)
    pub quiet_after: Duration,
    /// Silence before the exchange is abandoned (default: 60 seconds)
    pub stream_idle_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            quiet_after: Duration::from_secs(20),
            stream_idle_timeout: Duration::from_secs(60),
        }
    }
}

impl LivenessConfig {
    /// Create a new config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quiet threshold
    #[must_use]
    pub fn with_quiet_after(mut self, quiet_after: Duration) -> Self {
        self.quiet_after = quiet_after;
        self
    }

    /// Set the idle timeout
    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Create a config suitable for testing (shorter intervals)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            quiet_after: Duration::from_millis(100),
            stream_idle_timeout: Duration::from_millis(300),
        }
    }
}

/// Result of a liveness check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LivenessCheck {
    /// Activity within the quiet threshold
    Alive,
    /// Channel just crossed the quiet threshold
    WentQuiet,
    /// Channel is quiet but not yet abandoned
    StillQuiet,
    /// Idle timeout exceeded
    Expired,
}

/// Liveness state of the active channel
#[derive(Debug)]
pub struct LivenessMonitor {
    config: LivenessConfig,
    last_seen: Option<Instant>,
    degraded: bool,
    terminal_seen: bool,
}

impl LivenessMonitor {
    /// Create a monitor
    #[must_use]
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            last_seen: None,
            degraded: false,
            terminal_seen: false,
        }
    }

    /// Start watching a freshly opened channel
    pub fn begin_at(&mut self, now: Instant) {
        self.last_seen = Some(now);
        self.degraded = false;
        self.terminal_seen = false;
    }

    /// Record activity; returns true if this cleared a degraded flag
    pub fn record_activity_at(&mut self, now: Instant) -> bool {
        self.last_seen = Some(now);
        std::mem::replace(&mut self.degraded, false)
    }

    /// Record the terminal event
    pub fn record_terminal(&mut self) {
        self.terminal_seen = true;
    }

    /// Close the channel; returns true if it closed without a terminal event
    pub fn end(&mut self) -> bool {
        let abrupt = !self.terminal_seen;
        if abrupt {
            tracing::warn!("Stream closed without a terminal event");
            self.degraded = true;
        }
        self.last_seen = None;
        abrupt
    }

    /// Evaluate silence at `now`
    pub fn check_at(&mut self, now: Instant) -> LivenessCheck {
        let Some(last) = self.last_seen else {
            return LivenessCheck::Alive;
        };
        let silent = now.saturating_duration_since(last);
        if silent >= self.config.stream_idle_timeout {
            return LivenessCheck::Expired;
        }
        if silent >= self.config.quiet_after {
            if self.degraded {
                return LivenessCheck::StillQuiet;
            }
            tracing::warn!(silent_ms = silent.as_millis() as u64, "Stream went quiet");
            self.degraded = true;
            return LivenessCheck::WentQuiet;
        }
        LivenessCheck::Alive
    }

    /// How long to wait for activity before the next check is due
    #[must_use]
    pub fn next_check_in(&self, now: Instant) -> Duration {
        let Some(last) = self.last_seen else {
            return self.config.quiet_after;
        };
        let silent = now.saturating_duration_since(last);
        let deadline = if self.degraded || silent >= self.config.quiet_after {
            self.config.stream_idle_timeout
        } else {
            self.config.quiet_after
        };
        deadline.saturating_sub(silent)
    }

    /// Whether the channel is currently flagged degraded
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Clear the degraded flag (e.g. after a history clear)
    pub fn reset(&mut self) {
        self.last_seen = None;
        self.degraded = false;
        self.terminal_seen = false;
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> (LivenessMonitor, Instant) {
        let mut m = LivenessMonitor::new(LivenessConfig::default());
        let t0 = Instant::now();
        m.begin_at(t0);
        (m, t0)
    }

    #[test]
    fn test_quiet_then_expired() {
        let (mut m, t0) = monitor();
        assert_eq!(m.check_at(t0 + Duration::from_secs(5)), LivenessCheck::Alive);
        assert_eq!(m.check_at(t0 + Duration::from_secs(21)), LivenessCheck::WentQuiet);
        assert!(m.is_degraded());
        assert_eq!(m.check_at(t0 + Duration::from_secs(30)), LivenessCheck::StillQuiet);
        assert_eq!(m.check_at(t0 + Duration::from_secs(61)), LivenessCheck::Expired);
    }

    #[test]
    fn test_activity_recovers() {
        let (mut m, t0) = monitor();
        m.check_at(t0 + Duration::from_secs(25));
        assert!(m.record_activity_at(t0 + Duration::from_secs(26)));
        assert!(!m.is_degraded());
        assert!(!m.record_activity_at(t0 + Duration::from_secs(27)));
    }

    #[test]
    fn test_end_without_terminal_degrades() {
        let (mut m, _) = monitor();
        assert!(m.end());
        assert!(m.is_degraded());

        let (mut m, _) = monitor();
        m.record_terminal();
        assert!(!m.end());
        assert!(!m.is_degraded());
    }

    #[test]
    fn test_next_check_in() {
        let (mut m, t0) = monitor();
        assert_eq!(m.next_check_in(t0 + Duration::from_secs(5)), Duration::from_secs(15));
        m.check_at(t0 + Duration::from_secs(20));
        assert_eq!(m.next_check_in(t0 + Duration::from_secs(20)), Duration::from_secs(40));
    }

    #[test]
    fn test_unwatched_channel_is_alive() {
        let mut m = LivenessMonitor::new(LivenessConfig::for_testing());
        assert_eq!(m.check_at(Instant::now()), LivenessCheck::Alive);
    }
}
