use std::path::Path;
use thiserror::Error;

use relay_core::InvalidConfig;
use relay_stream::StreamError;
use url::Url;

use super::types::{EndpointConfig, RelayConfigFile};
use crate::feed::validate_wallet_address;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid {section} url {url}: {reason}")]
    InvalidUrl {
        section: &'static str,
        url: String,
        reason: String,
    },
    #[error("Invalid {section} limits: {source}")]
    InvalidLimits {
        section: &'static str,
        #[source]
        source: InvalidConfig,
    },
    #[error("Invalid stream settings: {0}")]
    InvalidStream(#[from] StreamError),
    #[error("Invalid wallet address in config: {0}")]
    InvalidWallet(String),
}

/// Load relay configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RelayConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: RelayConfigFile = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<RelayConfigFile, ConfigError> {
    let config: RelayConfigFile = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<RelayConfigFile, ConfigError> {
    let default_config = include_str!("relay_config.json");
    load_config_from_str(default_config)
}

impl RelayConfigFile {
    fn endpoints(&self) -> [(&'static str, &EndpointConfig); 4] {
        [
            ("rpc", &self.rpc),
            ("transactions", &self.transactions),
            ("quote", &self.quote),
            ("price", &self.price),
        ]
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (section, endpoint) in self.endpoints() {
            validate_http_url(section, &endpoint.url)?;
            endpoint
                .limits
                .to_governor_config()
                .validate()
                .map_err(|source| ConfigError::InvalidLimits { section, source })?;
        }

        self.stream.to_stream_config().validate()?;

        for wallet in &self.stream.wallets {
            validate_wallet_address(wallet)
                .map_err(|_| ConfigError::InvalidWallet(wallet.clone()))?;
        }
        Ok(())
    }
}

fn validate_http_url(section: &'static str, url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        section,
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcMode;

    #[test]
    fn test_load_default_config() {
        let config = load_default_config().unwrap();
        config.validate().unwrap();

        assert_eq!(config.rpc.url, "https://api.mainnet-beta.solana.com");
        assert_eq!(config.rpc.mode, RpcMode::Envelope);
        assert_eq!(config.rpc.limits.batch_size, 10);
        assert_eq!(config.transactions.mode, RpcMode::Single);
        assert_eq!(config.transactions.commitment.as_deref(), Some("confirmed"));
        assert_eq!(config.stream.url, "ws://localhost:8005/trades/ws");
    }

    #[test]
    fn test_default_presets_match_governor_presets() {
        let config = load_default_config().unwrap();

        assert_eq!(
            config.rpc.limits.to_governor_config(),
            relay_core::GovernorConfig::rpc()
        );
        assert_eq!(
            config.quote.limits.to_governor_config(),
            relay_core::GovernorConfig::quote()
        );
        assert_eq!(
            config.transactions.limits.to_governor_config(),
            relay_core::GovernorConfig::transaction_lookup()
        );
    }

    #[test]
    fn test_rejects_batch_larger_than_rate() {
        let mut config = load_default_config().unwrap();
        config.quote.limits.batch_size = 4;

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidLimits {
                section: "quote",
                source: InvalidConfig::BatchExceedsRate { .. }
            }
        ));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let mut config = load_default_config().unwrap();
        config.price.url = "ws://localhost:8005".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { section: "price", .. })
        ));
    }

    #[test]
    fn test_rejects_heartbeat_timeout_before_interval() {
        let mut config = load_default_config().unwrap();
        config.stream.heartbeat_timeout_ms = config.stream.heartbeat_interval_ms;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStream(StreamError::Config(
                InvalidConfig::NotAfter { .. }
            )))
        ));
    }

    #[test]
    fn test_rejects_malformed_wallet() {
        let mut config = load_default_config().unwrap();
        config.stream.wallets.push("not-a-wallet".to_string());

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWallet(w)) if w == "not-a-wallet"
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config("/nonexistent/relay_config.json");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
