//! Centralized Configuration for the Concierge Client
//!
//! Consolidates every tunable of the chat client into one place and loads it
//! from several sources.
//!
//! # Priority Order (highest first)
//!
//! 1. CLI arguments (applied by the caller via [`ConfigOverrides`])
//! 2. Environment variables (`CONCIERGE_*`)
//! 3. TOML configuration file (`~/.config/concierge/concierge.toml`)
//! 4. Default values
//!
//! # Example TOML
//!
//! ```toml
//! [endpoint]
//! url = "https://assist.example/api/assistant/chat"
//! request_timeout_ms = 30000
//! response_mode = "stream"
//!
//! [conversation]
//! audience = "public_front"
//! locale = "ka"
//! history_limit = 6
//!
//! [rate_limit]
//! cooldown_ms = 2500
//! min_server_penalty_secs = 15
//!
//! [guard]
//! max_input_chars = 2000
//! extra_topics = ["\\bski pass\\b"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{HttpBackendConfig, ResponseMode, DEFAULT_CLIENT_TAG, DEFAULT_ENDPOINT_URL};
use crate::messages::{Audience, Locale};
use crate::monitor::{FallbackConfig, LivenessConfig};
use crate::security::{RuleError, RuleTables, DEFAULT_MAX_INPUT_CHARS};
use crate::transport::RateLimitConfig;

/// Smallest history window sent with a request
pub const MIN_HISTORY_LIMIT: usize = 3;

/// Largest history window sent with a request
pub const MAX_HISTORY_LIMIT: usize = 6;

// =============================================================================
// Error Types
// =============================================================================

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A configured rule pattern does not compile
    #[error("Invalid guard rule: {0}")]
    RuleError(#[from] RuleError),

    /// Configuration validation failed
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// Value from CLI argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[endpoint]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointToml {
    /// Completion endpoint URL
    pub url: Option<String>,
    /// Whole-exchange timeout until a response arrives, in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Client identifier sent with every request
    pub client_tag: Option<String>,
    /// Role hint header value
    pub role_hint: Option<String>,
    /// `stream` or `single`
    pub response_mode: Option<String>,
}

/// `[conversation]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationToml {
    /// `public_front` or `admin_dev`
    pub audience: Option<String>,
    /// `ka` or `en`
    pub locale: Option<String>,
    /// Prior turns sent with a request (clamped to 3..=6)
    pub history_limit: Option<usize>,
    /// Characters kept per history entry
    pub history_preview_chars: Option<usize>,
    /// Identity hint forwarded to the endpoint
    pub personal_id: Option<String>,
}

/// `[rate_limit]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitToml {
    /// Minimum gap between dispatches in milliseconds
    pub cooldown_ms: Option<u64>,
    /// Minimum server-imposed penalty in seconds
    pub min_server_penalty_secs: Option<u64>,
    /// Enable or disable the client-side brake
    pub enabled: Option<bool>,
}

/// `[fallback]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackToml {
    /// Lower bound of the retry estimate
    pub min_retry_secs: Option<u64>,
    /// Upper bound of the retry estimate
    pub max_retry_secs: Option<u64>,
    /// Multiplier applied to failure latency
    pub retry_latency_factor: Option<f64>,
}

/// `[liveness]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessToml {
    /// Silence before the stream is flagged degraded
    pub quiet_after_ms: Option<u64>,
    /// Silence before the stream is abandoned
    pub stream_idle_timeout_ms: Option<u64>,
}

/// `[guard]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardToml {
    /// Input length cap in characters
    pub max_input_chars: Option<usize>,
    /// Additional denylist regexes
    pub extra_denylist: Option<Vec<String>>,
    /// Additional consumer-topic regexes
    pub extra_topics: Option<Vec<String>>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConciergeToml {
    /// Endpoint section
    pub endpoint: EndpointToml,
    /// Conversation section
    pub conversation: ConversationToml,
    /// Rate limiting section
    pub rate_limit: RateLimitToml,
    /// Fallback section
    pub fallback: FallbackToml,
    /// Liveness section
    pub liveness: LivenessToml,
    /// Guard section
    pub guard: GuardToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration for one chat client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Completion endpoint URL
    pub endpoint_url: String,
    /// Time allowed until a response (or stream head) arrives
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Client identifier
    pub client_tag: String,
    /// Role hint header value
    pub role_hint: Option<String>,
    /// Requested response mode
    pub response_mode: ResponseMode,

    /// Deployment audience
    pub audience: Audience,
    /// Initial reply language
    pub locale: Locale,
    /// Prior turns sent with a request
    pub history_limit: usize,
    /// Characters kept per history entry
    pub history_preview_chars: usize,
    /// Identity hint
    pub personal_id: Option<String>,

    /// Rate limiter settings
    pub rate_limit: RateLimitConfig,
    /// Fallback settings
    pub fallback: FallbackConfig,
    /// Liveness settings
    pub liveness: LivenessConfig,

    /// Input length cap in characters
    pub max_input_chars: usize,
    /// Additional denylist regexes
    pub extra_denylist: Vec<String>,
    /// Additional consumer-topic regexes
    pub extra_topics: Vec<String>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            client_tag: DEFAULT_CLIENT_TAG.to_string(),
            role_hint: None,
            response_mode: ResponseMode::Stream,
            audience: Audience::PublicFront,
            locale: Locale::Ka,
            history_limit: MAX_HISTORY_LIMIT,
            history_preview_chars: 280,
            personal_id: None,
            rate_limit: RateLimitConfig::default(),
            fallback: FallbackConfig::default(),
            liveness: LivenessConfig::default(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            extra_denylist: Vec::new(),
            extra_topics: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint URL
    #[must_use]
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    /// Set the audience
    #[must_use]
    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    /// Set the initial locale
    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Set the rate limiter settings
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the liveness settings
    #[must_use]
    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the history window (clamped to 3..=6)
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = clamp_history_limit(limit);
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// HTTP backend settings derived from this configuration
    #[must_use]
    pub fn http_backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfig::new(self.endpoint_url.clone())
            .with_connect_timeout(self.connect_timeout)
            .with_client_tag(self.client_tag.clone())
            .with_role_hint(self.role_hint.clone())
            .with_response_mode(self.response_mode)
    }

    /// Compile the rule tables, including configured extensions
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] if an extra pattern is not a valid regex.
    pub fn rule_tables(&self) -> Result<RuleTables, RuleError> {
        RuleTables::with_extensions(&self.extra_denylist, &self.extra_topics)
    }

    /// Check cross-field invariants and compile configured rules
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "endpoint url must not be empty".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "request timeout must be positive".to_string(),
            ));
        }
        if self.liveness.quiet_after > self.liveness.stream_idle_timeout {
            return Err(ConfigError::ValidationError(format!(
                "liveness quiet_after ({:?}) exceeds stream_idle_timeout ({:?})",
                self.liveness.quiet_after, self.liveness.stream_idle_timeout
            )));
        }
        if self.max_input_chars == 0 {
            return Err(ConfigError::ValidationError(
                "guard max_input_chars must be positive".to_string(),
            ));
        }
        self.rule_tables()?;
        Ok(())
    }
}

fn clamp_history_limit(limit: usize) -> usize {
    limit.clamp(MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT)
}

fn parse_audience(value: &str) -> Result<Audience, ConfigError> {
    Audience::parse(value)
        .ok_or_else(|| ConfigError::ValidationError(format!("unknown audience '{value}'")))
}

fn parse_locale(value: &str) -> Result<Locale, ConfigError> {
    Locale::parse(value)
        .ok_or_else(|| ConfigError::ValidationError(format!("unknown locale '{value}'")))
}

fn parse_mode(value: &str) -> Result<ResponseMode, ConfigError> {
    ResponseMode::parse(value)
        .ok_or_else(|| ConfigError::ValidationError(format!("unknown response mode '{value}'")))
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/concierge/concierge.toml` or
/// `~/.config/concierge/concierge.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("concierge").join("concierge.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if a
/// configured value fails validation. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if a configured value fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConciergeToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config)?;
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ConciergeToml) -> Result<(), ConfigError> {
    // Endpoint
    if let Some(ref url) = toml.endpoint.url {
        config.endpoint_url = url.clone();
    }
    if let Some(ms) = toml.endpoint.request_timeout_ms {
        config.request_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.endpoint.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ref tag) = toml.endpoint.client_tag {
        config.client_tag = tag.clone();
    }
    if toml.endpoint.role_hint.is_some() {
        config.role_hint = toml.endpoint.role_hint.clone();
    }
    if let Some(ref mode) = toml.endpoint.response_mode {
        config.response_mode = parse_mode(mode)?;
    }

    // Conversation
    if let Some(ref audience) = toml.conversation.audience {
        config.audience = parse_audience(audience)?;
    }
    if let Some(ref locale) = toml.conversation.locale {
        config.locale = parse_locale(locale)?;
    }
    if let Some(limit) = toml.conversation.history_limit {
        config.history_limit = clamp_history_limit(limit);
    }
    if let Some(chars) = toml.conversation.history_preview_chars {
        config.history_preview_chars = chars;
    }
    if toml.conversation.personal_id.is_some() {
        config.personal_id = toml.conversation.personal_id.clone();
    }

    // Rate limit
    if let Some(ms) = toml.rate_limit.cooldown_ms {
        config.rate_limit.cooldown = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.rate_limit.min_server_penalty_secs {
        config.rate_limit.min_server_penalty = Duration::from_secs(secs);
    }
    if let Some(enabled) = toml.rate_limit.enabled {
        config.rate_limit.enabled = enabled;
    }

    // Fallback
    let min_retry = toml
        .fallback
        .min_retry_secs
        .map_or(config.fallback.min_retry, Duration::from_secs);
    let max_retry = toml
        .fallback
        .max_retry_secs
        .map_or(config.fallback.max_retry, Duration::from_secs);
    config.fallback = config.fallback.clone().with_retry_bounds(min_retry, max_retry);
    if let Some(factor) = toml.fallback.retry_latency_factor {
        config.fallback.retry_latency_factor = factor;
    }

    // Liveness
    if let Some(ms) = toml.liveness.quiet_after_ms {
        config.liveness.quiet_after = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.liveness.stream_idle_timeout_ms {
        config.liveness.stream_idle_timeout = Duration::from_millis(ms);
    }

    // Guard
    if let Some(max) = toml.guard.max_input_chars {
        config.max_input_chars = max;
    }
    if let Some(ref patterns) = toml.guard.extra_denylist {
        config.extra_denylist.clone_from(patterns);
    }
    if let Some(ref patterns) = toml.guard.extra_topics {
        config.extra_topics.clone_from(patterns);
    }

    Ok(())
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring non-numeric environment value");
            None
        }
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ClientConfig) -> Result<(), ConfigError> {
    if let Ok(url) = std::env::var("CONCIERGE_ENDPOINT") {
        config.endpoint_url = url;
        config.source = ConfigSource::Env;
    }
    if let Ok(audience) = std::env::var("CONCIERGE_AUDIENCE") {
        config.audience = parse_audience(&audience)?;
        config.source = ConfigSource::Env;
    }
    if let Ok(locale) = std::env::var("CONCIERGE_LOCALE") {
        config.locale = parse_locale(&locale)?;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env_u64("CONCIERGE_COOLDOWN_MS") {
        config.rate_limit.cooldown = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env_u64("CONCIERGE_MIN_PENALTY_SECS") {
        config.rate_limit.min_server_penalty = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env_u64("CONCIERGE_REQUEST_TIMEOUT_MS") {
        config.request_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(limit) = env_u64("CONCIERGE_HISTORY_LIMIT") {
        config.history_limit = clamp_history_limit(usize::try_from(limit).unwrap_or(usize::MAX));
        config.source = ConfigSource::Env;
    }
    if let Ok(id) = std::env::var("CONCIERGE_PERSONAL_ID") {
        config.personal_id = Some(id);
        config.source = ConfigSource::Env;
    }
    if let Ok(role) = std::env::var("CONCIERGE_ROLE_HINT") {
        config.role_hint = Some(role);
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Endpoint URL override
    pub endpoint_url: Option<String>,
    /// Audience override
    pub audience: Option<Audience>,
    /// Locale override
    pub locale: Option<Locale>,
    /// Response mode override
    pub response_mode: Option<ResponseMode>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set endpoint URL override
    #[must_use]
    pub fn with_endpoint_url(mut self, url: String) -> Self {
        self.endpoint_url = Some(url);
        self
    }

    /// Set audience override
    #[must_use]
    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Set locale override
    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    /// Set response mode override
    #[must_use]
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = Some(mode);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.endpoint_url.is_some()
            || self.audience.is_some()
            || self.locale.is_some()
            || self.response_mode.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.endpoint_url {
            config.endpoint_url.clone_from(url);
        }
        if let Some(audience) = self.audience {
            config.audience = audience;
        }
        if let Some(locale) = self.locale {
            config.locale = locale;
        }
        if let Some(mode) = self.response_mode {
            config.response_mode = mode;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
