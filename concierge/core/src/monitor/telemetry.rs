//! Telemetry counters
//!
//! Monotonic per-client counters, reset only when the conversation history is
//! cleared.

use serde::{Deserialize, Serialize};

/// Counts of guard/sanitizer blocks and fallback activations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryCounters {
    /// Inputs blocked by the guard plus replies replaced by the sanitizer
    pub blocked: u64,
    /// Exchanges that went down the fallback path
    pub fallback: u64,
}

impl TelemetryCounters {
    /// Count one blocked input or reply
    pub fn increment_blocked(&mut self) {
        self.blocked += 1;
        tracing::debug!(blocked = self.blocked, "Telemetry: blocked");
    }

    /// Count one fallback activation
    pub fn increment_fallback(&mut self) {
        self.fallback += 1;
        tracing::debug!(fallback = self.fallback, "Telemetry: fallback");
    }

    /// Zero both counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_reset() {
        let mut t = TelemetryCounters::default();
        t.increment_blocked();
        t.increment_blocked();
        t.increment_fallback();
        assert_eq!(t, TelemetryCounters { blocked: 2, fallback: 1 });
        t.reset();
        assert_eq!(t, TelemetryCounters::default());
    }
}
