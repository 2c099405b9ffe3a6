/// Structured error handling for whalewatch
///
/// One enum per failure domain. `ProviderError` carries the retry taxonomy the
/// cache and the HTTP client branch on: transient failures are retryable at the
/// call site, rate limits feed the global cooldown, client errors and malformed
/// data are never retried.
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// UPSTREAM PROVIDER ERRORS
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Provider-signaled throttling (HTTP 429); feeds the global backoff
    #[error("provider rate limit (HTTP 429) at {endpoint}")]
    RateLimited { endpoint: String },

    /// Connection failures, timeouts, 5xx and 408 responses; retryable
    #[error("transient upstream failure at {endpoint}: {message}")]
    Transient { endpoint: String, message: String },

    /// 4xx responses other than 408/429 (bad request, auth); never retried
    #[error("upstream rejected request (HTTP {status}) at {endpoint}: {message}")]
    Client {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Response body failed to decode into the expected shape
    #[error("malformed provider response at {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },
}

impl ProviderError {
    /// True for provider-signaled throttling (the cache's cooldown trigger)
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// True for failures worth an immediate bounded retry at the call site
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}

// =============================================================================
// CACHE ERRORS
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Rate limited with no cached value to fall back on
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The synchronous fetch failed and no usable cached value existed
    #[error(transparent)]
    Fetch(#[from] ProviderError),
}

// =============================================================================
// NORMALIZATION ERRORS
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum NormalizeError {
    /// Value field could not be converted to an exact base-10 integer
    #[error("transfer value {value:?} is not an exact base-10 integer: {reason}")]
    InvalidValue { value: String, reason: String },

    /// Token decimals outside the supported 0..=36 range
    #[error("unsupported token decimals: {0}")]
    UnsupportedDecimals(u32),

    /// Scaled value exceeded the 256-bit integer range
    #[error("value {0} out of range after decimal scaling")]
    ValueOutOfRange(String),

    /// A field the record cannot be normalized without
    #[error("raw transfer missing required field '{0}'")]
    MissingField(&'static str),
}

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
