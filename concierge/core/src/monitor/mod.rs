//! Fallback, liveness and telemetry monitoring
//!
//! - [`FallbackMonitor`]: classifies failures, estimates a retry interval and
//!   holds the current [`UnavailableDetails`]
//! - [`LivenessMonitor`]: flags a quiet live channel as degraded
//! - [`TelemetryCounters`]: blocked/fallback counts
//!
//! All three are owned by one client instance and mutated through `&mut self`.

pub mod fallback;
pub mod liveness;
pub mod telemetry;

pub use fallback::{
    render_unavailable, ConnectionStatus, FallbackConfig, FallbackMonitor, UnavailableCode,
    UnavailableDetails,
};
pub use liveness::{LivenessCheck, LivenessConfig, LivenessMonitor};
pub use telemetry::TelemetryCounters;
