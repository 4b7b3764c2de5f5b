//! Backoff policy: retry delays and rate-limit classification.

use std::time::Duration;

use crate::error::{InvalidConfig, RemoteError};

/// JSON-RPC error code used by RPC providers for rate limiting
pub const JSONRPC_RATE_LIMIT_CODE: i64 = -32429;
/// HTTP Too Many Requests
pub const HTTP_RATE_LIMIT_CODE: i64 = 429;

const RATE_LIMIT_MARKERS: [&str; 3] = ["rate limit", "429", "exceeded limit"];

/// How a failed request should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Recoverable; retry after a delay
    RateLimited,
    /// Surface to the caller immediately
    Fatal,
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.base_delay.is_zero() {
            return Err(InvalidConfig::Zero {
                field: "base_delay",
            });
        }
        if self.max_delay < self.base_delay {
            return Err(InvalidConfig::CeilingBelowBase);
        }
        Ok(())
    }
}

/// Stateless retry policy shared by the governor and the stream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    config: BackoffConfig,
}

impl BackoffPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        BackoffPolicy { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Classify a remote failure by status code or message text
    pub fn classify(&self, error: &RemoteError) -> Classification {
        if matches!(
            error.code,
            Some(JSONRPC_RATE_LIMIT_CODE) | Some(HTTP_RATE_LIMIT_CODE)
        ) {
            return Classification::RateLimited;
        }

        let message = error.message.to_lowercase();
        if RATE_LIMIT_MARKERS.iter().any(|m| message.contains(m)) {
            Classification::RateLimited
        } else {
            Classification::Fatal
        }
    }

    /// `base * 2^attempt`, capped at the configured ceiling
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
