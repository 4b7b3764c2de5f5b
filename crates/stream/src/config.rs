//! Stream transport configuration

use std::time::Duration;

use relay_core::{BackoffConfig, InvalidConfig};
use url::Url;

use crate::error::StreamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// `ws://` or `wss://` endpoint
    pub url: String,
    /// Interval between outbound `ping` frames while connected
    pub heartbeat_interval: Duration,
    /// Connection is considered dead if no `pong` arrives within this span
    pub heartbeat_timeout: Duration,
    /// Delay before reconnect attempt `n` is `base * 2^(n-1)`, capped
    pub reconnect: BackoffConfig,
    pub max_reconnect_attempts: u32,
    pub connect_timeout: Duration,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        StreamConfig {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(45),
            reconnect: BackoffConfig {
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
            },
            max_reconnect_attempts: 5,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        validate_url(&self.url)?;

        if self.heartbeat_interval.is_zero() {
            return Err(InvalidConfig::Zero {
                field: "heartbeat_interval",
            }
            .into());
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(InvalidConfig::NotAfter {
                field: "heartbeat_timeout",
                other: "heartbeat_interval",
            }
            .into());
        }
        if self.connect_timeout.is_zero() {
            return Err(InvalidConfig::Zero {
                field: "connect_timeout",
            }
            .into());
        }
        self.reconnect.validate()?;
        Ok(())
    }
}

/// Stream endpoints must be WebSocket URLs
pub fn validate_url(url: &str) -> Result<Url, StreamError> {
    let parsed = Url::parse(url).map_err(|e| StreamError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        scheme => Err(StreamError::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme must be ws or wss, got {scheme}"),
        }),
    }
}
