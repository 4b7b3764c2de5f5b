//! Live trade feed
//!
//! Typed view over a [`StreamTransport`]: follows wallets with `subscribe`
//! frames that survive reconnects and decodes `trade` and `price_update`
//! envelopes for the registered handlers.

use std::sync::Arc;

use relay_core::EndpointRegistry;
use relay_stream::{
    ConnectionState, Envelope, HandlerId, StreamConfig, StreamObserver, StreamTransport,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};

pub const TRADE: &str = "trade";
pub const PRICE_UPDATE: &str = "price_update";
pub const ERROR: &str = "error";

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A trade made by a followed wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub signature: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub token_address: String,
    /// Trade value as reported by the server, unparsed
    pub value: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub token_address: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(rename = "volume24h", default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

/// Check that `address` looks like a base58 public key (32-44 characters)
pub fn validate_wallet_address(address: &str) -> ClientResult<()> {
    let well_formed = (32..=44).contains(&address.len())
        && address.chars().all(|c| BASE58_ALPHABET.contains(c));
    if well_formed {
        Ok(())
    } else {
        Err(ClientError::InvalidAddress(address.to_string()))
    }
}

fn wallet_key(address: &str) -> String {
    format!("wallet:{address}")
}

#[derive(Clone)]
pub struct TradeFeed {
    transport: StreamTransport,
}

impl TradeFeed {
    /// Feed over the process-wide transport for `config.url`. The first
    /// feed created for a URL decides the transport's settings and observer.
    pub fn new(config: StreamConfig, observer: Arc<dyn StreamObserver>) -> ClientResult<Self> {
        Self::with_registry(config, observer, EndpointRegistry::global())
    }

    pub fn with_registry(
        config: StreamConfig,
        observer: Arc<dyn StreamObserver>,
        registry: &EndpointRegistry,
    ) -> ClientResult<Self> {
        let key = format!("stream:{}", config.url);
        let transport = registry.get_or_try_init(&key, || -> ClientResult<_> {
            Ok(StreamTransport::new(config, observer)?)
        })?;
        Ok(TradeFeed { transport })
    }

    pub fn from_transport(transport: StreamTransport) -> Self {
        TradeFeed { transport }
    }

    pub fn transport(&self) -> &StreamTransport {
        &self.transport
    }

    /// Connect and wait for the session to open
    pub async fn connect(&self) -> ClientResult<()> {
        self.transport.connect_and_wait().await?;
        info!(url = self.transport.url(), "trade feed connected");
        Ok(())
    }

    pub fn disconnect(&self) -> ClientResult<()> {
        Ok(self.transport.disconnect()?)
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Ask the server for `address`'s trades. The subscription is
    /// re-sent after every reconnect.
    pub fn follow_wallet(&self, address: &str) -> ClientResult<()> {
        validate_wallet_address(address)?;
        self.transport.subscribe(
            wallet_key(address),
            &json!({"type": "subscribe", "walletAddress": address}),
        )?;
        info!(wallet = address, "following wallet");
        Ok(())
    }

    /// Stop re-subscribing `address` on reconnect
    pub fn unfollow_wallet(&self, address: &str) -> ClientResult<()> {
        Ok(self.transport.unsubscribe(wallet_key(address))?)
    }

    pub fn on_trade<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(Trade) + Send + Sync + 'static,
    {
        self.on_typed(TRADE, handler)
    }

    pub fn on_price_update<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(PriceUpdate) + Send + Sync + 'static,
    {
        self.on_typed(PRICE_UPDATE, handler)
    }

    /// Server-side error notices, passed through as the raw envelope
    pub fn on_server_error<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.transport.on(ERROR, handler)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.transport.remove_handler(id)
    }

    fn on_typed<T, F>(&self, kind: &'static str, handler: F) -> HandlerId
    where
        T: serde::de::DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.transport
            .on(kind, move |envelope| match envelope.data_as::<T>() {
                Ok(message) => handler(message),
                Err(e) => warn!(kind, error = %e, "dropping malformed feed message"),
            })
    }
}
