//! Governed REST calls
//!
//! Each request is its own HTTP call; the calls of one batch run
//! concurrently. Non-2xx statuses are reported with the status as the error
//! code, so `429 Too Many Requests` is retried with backoff like any other
//! rate-limit reply.

use async_trait::async_trait;
use reqwest::Client;
use relay_core::{
    Concurrent, DispatchError, EndpointRegistry, GovernorConfig, ItemDispatcher, RemoteError,
    RequestGovernor,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ClientResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestMethod {
    Get,
    Post,
}

/// One REST request relative to the endpoint's base URL
#[derive(Debug, Clone, PartialEq)]
pub struct RestCall {
    pub method: RestMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RestCall {
    pub fn get(path: impl Into<String>) -> Self {
        RestCall {
            method: RestMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        RestCall {
            method: RestMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(alias = "message")]
    error: String,
}

/// Issues [`RestCall`]s against one base URL
pub struct HttpRest {
    client: Client,
    base_url: String,
}

impl HttpRest {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        HttpRest {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ItemDispatcher<RestCall, Value> for HttpRest {
    async fn call(&self, request: &RestCall) -> Result<Value, DispatchError> {
        let url = format!("{}{}", self.base_url, request.path);
        let builder = match request.method {
            RestMethod::Get => self.client.get(&url),
            RestMethod::Post => self.client.post(&url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let resp = builder
            .query(&request.query)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !status.is_success() {
            debug!(path = %request.path, %status, "REST call failed");
            // Only the API's own error message is classified, never the path
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("HTTP error").to_string());
            return Err(RemoteError::with_code(i64::from(status.as_u16()), message).into());
        }

        serde_json::from_str(&text)
            .map_err(|e| DispatchError::Transport(format!("invalid response body: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestSettings {
    pub base_url: String,
    pub governor: GovernorConfig,
}

impl RestSettings {
    pub fn new(base_url: impl Into<String>, governor: GovernorConfig) -> Self {
        RestSettings {
            base_url: base_url.into(),
            governor,
        }
    }

    fn registry_key(&self) -> String {
        format!("rest:{}", self.base_url.trim_end_matches('/'))
    }
}

/// Governed REST endpoint. Clients built for the same base URL share one
/// governor through the endpoint registry.
#[derive(Clone)]
pub struct RestClient {
    governor: RequestGovernor<RestCall, Value>,
}

impl RestClient {
    pub fn new(settings: RestSettings) -> ClientResult<Self> {
        Self::with_registry(settings, EndpointRegistry::global())
    }

    pub fn with_registry(settings: RestSettings, registry: &EndpointRegistry) -> ClientResult<Self> {
        let key = settings.registry_key();
        let governor = registry.get_or_try_init(&key, || -> ClientResult<_> {
            let dispatcher = Concurrent(HttpRest::new(Client::new(), settings.base_url.clone()));
            Ok(RequestGovernor::new(
                key.clone(),
                settings.governor.clone(),
                dispatcher,
            )?)
        })?;
        Ok(RestClient { governor })
    }

    pub fn governor(&self) -> &RequestGovernor<RestCall, Value> {
        &self.governor
    }

    pub async fn execute(&self, call: RestCall) -> ClientResult<Value> {
        Ok(self.governor.submit(call).await?)
    }
}
