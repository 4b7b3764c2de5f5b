//! Swap quote router client

use relay_core::{EndpointRegistry, GovernorConfig};
use serde_json::{Value, json};

use crate::error::ClientResult;
use crate::rest::{RestCall, RestClient, RestSettings};

pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

#[derive(Clone)]
pub struct QuoteClient {
    rest: RestClient,
    slippage_bps: u16,
}

impl QuoteClient {
    pub fn new(settings: RestSettings) -> ClientResult<Self> {
        Self::with_registry(settings, EndpointRegistry::global())
    }

    pub fn with_registry(settings: RestSettings, registry: &EndpointRegistry) -> ClientResult<Self> {
        Ok(QuoteClient {
            rest: RestClient::with_registry(settings, registry)?,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        })
    }

    /// Quote router limits against `base_url`
    pub fn settings(base_url: impl Into<String>) -> RestSettings {
        RestSettings::new(base_url, GovernorConfig::quote())
    }

    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps;
        self
    }

    /// Quote for swapping `amount` base units of `input_mint` into
    /// `output_mint`. The reply is passed back to [`swap`](Self::swap) as is.
    pub async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
    ) -> ClientResult<Value> {
        let call = RestCall::get("/quote")
            .query("inputMint", input_mint)
            .query("outputMint", output_mint)
            .query("amount", amount)
            .query("slippageBps", self.slippage_bps);
        self.rest.execute(call).await
    }

    /// Build the swap transaction for a previously fetched quote
    pub async fn swap(&self, quote: &Value, user_public_key: &str) -> ClientResult<Value> {
        let body = json!({
            "quoteResponse": quote,
            "userPublicKey": user_public_key,
            "wrapUnwrapSOL": true,
        });
        self.rest.execute(RestCall::post("/swap", body)).await
    }
}
