//! Price oracle client

use relay_core::{EndpointRegistry, GovernorConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ClientError, ClientResult};
use crate::rest::{RestCall, RestClient, RestSettings};

/// Market figures for one token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    /// Missing or null prices read as zero
    #[serde(default, deserialize_with = "zero_if_null")]
    pub price: f64,
    #[serde(rename = "volume24h", default)]
    pub volume_24h: Option<f64>,
    #[serde(rename = "marketCap", default)]
    pub market_cap: Option<f64>,
    #[serde(rename = "priceChange24h", default)]
    pub price_change_24h: Option<f64>,
}

fn zero_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
struct PriceReply {
    #[serde(default)]
    data: Option<TokenPrice>,
}

#[derive(Deserialize)]
struct BulkPriceReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct PriceClient {
    rest: RestClient,
}

impl PriceClient {
    pub fn new(settings: RestSettings) -> ClientResult<Self> {
        Self::with_registry(settings, EndpointRegistry::global())
    }

    pub fn with_registry(settings: RestSettings, registry: &EndpointRegistry) -> ClientResult<Self> {
        Ok(PriceClient {
            rest: RestClient::with_registry(settings, registry)?,
        })
    }

    /// Default limits against `base_url`
    pub fn settings(base_url: impl Into<String>) -> RestSettings {
        RestSettings::new(base_url, GovernorConfig::default())
    }

    pub async fn get_price(&self, token_address: &str) -> ClientResult<TokenPrice> {
        let value = self
            .rest
            .execute(RestCall::get("/price").query("address", token_address))
            .await?;
        let reply: PriceReply =
            serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(reply.data.unwrap_or_default())
    }

    /// Prices for several tokens in one request, keyed as the oracle
    /// returns them
    pub async fn get_prices<S: AsRef<str>>(&self, token_addresses: &[S]) -> ClientResult<Value> {
        let addresses: Vec<&str> = token_addresses.iter().map(AsRef::as_ref).collect();
        let value = self
            .rest
            .execute(RestCall::post(
                "/price",
                json!({ "token_addresses": addresses }),
            ))
            .await?;

        let reply: BulkPriceReply =
            serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))?;
        if !reply.success {
            return Err(ClientError::Unsuccessful(
                reply.error.unwrap_or_else(|| "price lookup failed".to_string()),
            ));
        }
        Ok(reply.data)
    }
}
