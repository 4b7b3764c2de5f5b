use serde::{Deserialize, Serialize};
use std::time::Duration;

use relay_core::{BackoffConfig, GovernorConfig};
use relay_stream::StreamConfig;

use crate::rest::RestSettings;
use crate::rpc::{RpcMode, RpcSettings};

/// Root configuration for the relay clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfigFile {
    /// Blockchain RPC node
    pub rpc: EndpointConfig,
    /// JSON-RPC transaction lookup service
    pub transactions: EndpointConfig,
    /// Swap quote router (REST)
    pub quote: EndpointConfig,
    /// Price oracle (REST)
    pub price: EndpointConfig,
    #[serde(default)]
    pub stream: StreamConfigJson,
}

/// One remote endpoint and the limits its governor enforces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    /// JSON-RPC only: one envelope per batch, or one call per request
    #[serde(default)]
    pub mode: RpcMode,
    /// JSON-RPC only: commitment level merged into every call
    #[serde(default)]
    pub commitment: Option<String>,
    #[serde(default)]
    pub limits: RateLimitConfig,
}

impl EndpointConfig {
    pub fn to_rpc_settings(&self) -> RpcSettings {
        RpcSettings {
            url: self.url.clone(),
            mode: self.mode,
            commitment: self.commitment.clone(),
            governor: self.limits.to_governor_config(),
        }
    }

    pub fn to_rest_settings(&self) -> RestSettings {
        RestSettings {
            base_url: self.url.clone(),
            governor: self.limits.to_governor_config(),
        }
    }
}

/// Governor limits (JSON representation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests_per_second")]
    pub max_requests_per_second: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval")]
    pub batch_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// `null` disables the default deadline
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max_requests_per_second: default_max_requests_per_second(),
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl RateLimitConfig {
    pub fn to_governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            max_requests_per_second: self.max_requests_per_second,
            batch_size: self.batch_size,
            batch_interval: Duration::from_millis(self.batch_interval_ms),
            max_retries: self.max_retries,
            backoff: BackoffConfig {
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
            },
            default_timeout: self.request_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Trade feed connection settings (JSON representation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfigJson {
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Wallets the monitor follows on startup
    #[serde(default)]
    pub wallets: Vec<String>,
}

impl Default for StreamConfigJson {
    fn default() -> Self {
        StreamConfigJson {
            url: default_stream_url(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_ms: default_connect_timeout(),
            wallets: Vec::new(),
        }
    }
}

impl StreamConfigJson {
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.url.clone(),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            reconnect: BackoffConfig {
                base_delay: Duration::from_millis(self.reconnect_delay_ms),
                max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            },
            max_reconnect_attempts: self.max_reconnect_attempts,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

// Default value functions for serde
fn default_max_requests_per_second() -> u32 {
    5
}

fn default_batch_size() -> usize {
    3
}

fn default_batch_interval() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30000
}

fn default_request_timeout() -> Option<u64> {
    Some(120_000)
}

fn default_stream_url() -> String {
    "ws://localhost:8005/trades/ws".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30000
}

fn default_heartbeat_timeout() -> u64 {
    45000
}

fn default_reconnect_delay() -> u64 {
    2000
}

fn default_reconnect_max_delay() -> u64 {
    30000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_endpoint_with_defaults() {
        let json = r#"{ "url": "https://rpc.example.com" }"#;

        let config: EndpointConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, RpcMode::Envelope);
        assert!(config.commitment.is_none());
        assert_eq!(config.limits.to_governor_config(), GovernorConfig::default());
    }

    #[test]
    fn test_null_timeout_disables_deadline() {
        let json = r#"{ "batch_size": 2, "request_timeout_ms": null }"#;

        let limits: RateLimitConfig = serde_json::from_str(json).unwrap();
        let governor = limits.to_governor_config();
        assert_eq!(governor.batch_size, 2);
        assert_eq!(governor.default_timeout, None);
    }

    #[test]
    fn test_stream_config_conversion() {
        let json = r#"{
            "url": "wss://feed.example.com/trades/ws",
            "heartbeat_interval_ms": 10000,
            "wallets": ["7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU"]
        }"#;

        let config: StreamConfigJson = serde_json::from_str(json).unwrap();
        let stream = config.to_stream_config();
        assert_eq!(stream.url, "wss://feed.example.com/trades/ws");
        assert_eq!(stream.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(stream.heartbeat_timeout, Duration::from_secs(45));
        assert_eq!(stream.reconnect.base_delay, Duration::from_secs(2));
        assert_eq!(stream.max_reconnect_attempts, 5);
        assert_eq!(config.wallets.len(), 1);
    }
}
