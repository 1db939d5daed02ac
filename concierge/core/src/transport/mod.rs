//! Transport-level policy applied around every outbound request
//!
//! Currently this is rate limiting: the client cooldown between requests and
//! the server cooldown imposed by HTTP 429 responses.

pub mod rate_limit;

pub use rate_limit::{
    parse_retry_after, RateLimitConfig, RateLimitDecision, RateLimitSource, RateLimitState,
    RateLimited, RateLimiter,
};
