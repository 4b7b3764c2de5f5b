//! Governor configuration

use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::error::InvalidConfig;

/// Per-endpoint limits for a request governor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorConfig {
    /// Admissions allowed in any one-second span
    pub max_requests_per_second: u32,
    /// Maximum requests combined into one wire call
    pub batch_size: usize,
    /// Pause after each completed batch
    pub batch_interval: Duration,
    /// Rate-limited resubmissions before giving up
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    /// Deadline applied by `submit` when the caller gives none
    pub default_timeout: Option<Duration>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        GovernorConfig {
            max_requests_per_second: 5,
            batch_size: 3,
            batch_interval: Duration::from_secs(2),
            max_retries: 3,
            backoff: BackoffConfig::default(),
            default_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl GovernorConfig {
    /// Limits observed for a shared RPC node
    pub fn rpc() -> Self {
        GovernorConfig {
            max_requests_per_second: 40,
            batch_size: 10,
            batch_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Limits observed for the swap quote router
    pub fn quote() -> Self {
        GovernorConfig {
            max_requests_per_second: 3,
            batch_size: 2,
            batch_interval: Duration::from_secs(2),
            backoff: BackoffConfig {
                base_delay: Duration::from_secs(2),
                ..BackoffConfig::default()
            },
            ..Default::default()
        }
    }

    /// Limits observed for the transaction lookup service
    pub fn transaction_lookup() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.max_requests_per_second == 0 {
            return Err(InvalidConfig::Zero {
                field: "max_requests_per_second",
            });
        }
        if self.batch_size == 0 {
            return Err(InvalidConfig::Zero {
                field: "batch_size",
            });
        }
        // A batch is admitted whole, so it must fit in one window
        if self.batch_size > self.max_requests_per_second as usize {
            return Err(InvalidConfig::BatchExceedsRate {
                batch_size: self.batch_size,
                max_per_second: self.max_requests_per_second,
            });
        }
        self.backoff.validate()
    }
}
