//! JSON-RPC over HTTP
//!
//! Two wire shapes are supported per endpoint:
//! - [`RpcMode::Envelope`]: a whole batch goes out as one
//!   `{method: "batchRequest", batchRequests: [...]}` call and the reply
//!   carries `batchResponses` in the same order
//! - [`RpcMode::Single`]: every request is its own JSON-RPC call, the calls
//!   of one batch run concurrently

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use relay_core::{
    BatchDispatcher, BatchReply, Concurrent, DispatchError, EndpointRegistry, GovernorConfig,
    ItemDispatcher, RemoteError, RequestGovernor,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

const JSONRPC_VERSION: &str = "2.0";
const BATCH_METHOD: &str = "batchRequest";
/// SPL token program, used to filter token accounts by owner
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// One JSON-RPC method invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        RpcCall {
            method: method.into(),
            params,
        }
    }

    /// Add `commitment` to the trailing options object, or append one
    fn with_commitment(mut self, commitment: &str) -> Self {
        match self.params.last_mut() {
            Some(Value::Object(options)) => {
                options
                    .entry("commitment")
                    .or_insert_with(|| Value::String(commitment.to_string()));
            }
            _ => {
                let mut options = Map::new();
                options.insert(
                    "commitment".to_string(),
                    Value::String(commitment.to_string()),
                );
                self.params.push(Value::Object(options));
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcMode {
    #[default]
    Envelope,
    Single,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEnvelope<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    batch_requests: Vec<RpcRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

impl From<RpcErrorBody> for RemoteError {
    fn from(body: RpcErrorBody) -> Self {
        RemoteError {
            code: body.code,
            message: body.message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, RemoteError> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchReplyEnvelope {
    #[serde(default)]
    error: Option<RpcErrorBody>,
    #[serde(default)]
    batch_responses: Vec<RpcResponse>,
}

/// Posts JSON-RPC calls to one endpoint
pub struct HttpJsonRpc {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpJsonRpc {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        HttpJsonRpc {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        body: &B,
    ) -> Result<T, DispatchError> {
        let resp = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !status.is_success() {
            // Only the node's own error message is classified, never the body
            let message = serde_json::from_str::<RpcResponse>(&text)
                .ok()
                .and_then(|reply| reply.error)
                .map(|error| error.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("HTTP error").to_string());
            return Err(DispatchError::Remote(RemoteError::with_code(
                i64::from(status.as_u16()),
                message,
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| DispatchError::Transport(format!("invalid JSON-RPC reply: {e}")))
    }
}

#[async_trait]
impl BatchDispatcher<RpcCall, Value> for HttpJsonRpc {
    async fn dispatch(&self, batch: &[RpcCall]) -> BatchReply<Value> {
        let envelope = BatchEnvelope {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id(),
            method: BATCH_METHOD,
            batch_requests: batch
                .iter()
                .enumerate()
                .map(|(index, call)| RpcRequest {
                    jsonrpc: JSONRPC_VERSION,
                    id: index as u64,
                    method: &call.method,
                    params: &call.params,
                })
                .collect(),
        };

        let reply: BatchReplyEnvelope = self.post(&envelope).await?;
        if let Some(error) = reply.error {
            return Err(DispatchError::Remote(error.into()));
        }

        debug!(
            url = %self.url,
            sent = batch.len(),
            received = reply.batch_responses.len(),
            "batch envelope answered"
        );
        Ok(reply
            .batch_responses
            .into_iter()
            .map(|response| response.into_result().map_err(DispatchError::from))
            .collect())
    }
}

#[async_trait]
impl ItemDispatcher<RpcCall, Value> for HttpJsonRpc {
    async fn call(&self, request: &RpcCall) -> Result<Value, DispatchError> {
        let body = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id(),
            method: &request.method,
            params: &request.params,
        };

        let reply: RpcResponse = self.post(&body).await?;
        Ok(reply.into_result()?)
    }
}

/// Everything needed to build a governed JSON-RPC client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcSettings {
    pub url: String,
    pub mode: RpcMode,
    pub commitment: Option<String>,
    pub governor: GovernorConfig,
}

impl RpcSettings {
    /// Batched envelope calls to an RPC node at `finalized` commitment
    pub fn node(url: impl Into<String>) -> Self {
        RpcSettings {
            url: url.into(),
            mode: RpcMode::Envelope,
            commitment: Some("finalized".to_string()),
            governor: GovernorConfig::rpc(),
        }
    }

    /// One call per lookup at `confirmed` commitment
    pub fn transaction_service(url: impl Into<String>) -> Self {
        RpcSettings {
            url: url.into(),
            mode: RpcMode::Single,
            commitment: Some("confirmed".to_string()),
            governor: GovernorConfig::transaction_lookup(),
        }
    }

    fn registry_key(&self) -> String {
        format!("jsonrpc:{}", self.url)
    }
}

/// Governed JSON-RPC client. Clients built for the same URL share one
/// governor through the endpoint registry.
#[derive(Clone)]
pub struct RpcClient {
    governor: RequestGovernor<RpcCall, Value>,
    http: Client,
    url: String,
    commitment: Option<String>,
}

impl RpcClient {
    pub fn new(settings: RpcSettings) -> ClientResult<Self> {
        Self::with_registry(settings, EndpointRegistry::global())
    }

    pub fn with_registry(settings: RpcSettings, registry: &EndpointRegistry) -> ClientResult<Self> {
        let http = Client::new();
        let governor = registry.get_or_try_init(&settings.registry_key(), || {
            spawn_governor(&settings, http.clone())
        })?;

        Ok(RpcClient {
            governor,
            http,
            url: settings.url,
            commitment: settings.commitment,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn governor(&self) -> &RequestGovernor<RpcCall, Value> {
        &self.governor
    }

    /// Submit a raw call; the configured commitment is merged into params
    pub async fn call(&self, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        let mut call = RpcCall::new(method, params);
        if let Some(commitment) = &self.commitment {
            call = call.with_commitment(commitment);
        }
        Ok(self.governor.submit(call).await?)
    }

    /// Balance in lamports
    pub async fn get_balance(&self, address: &str) -> ClientResult<u64> {
        let result = self.call("getBalance", vec![json!(address)]).await?;
        result["value"]
            .as_u64()
            .ok_or_else(|| ClientError::Decode(format!("getBalance returned {result}")))
    }

    /// Parsed transaction, or `None` if the node does not know it
    pub async fn get_transaction(&self, signature: &str) -> ClientResult<Option<Value>> {
        let result = self
            .call(
                "getTransaction",
                vec![
                    json!(signature),
                    json!({"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}),
                ],
            )
            .await?;
        Ok((!result.is_null()).then_some(result))
    }

    /// Token accounts held by `owner`
    pub async fn get_token_accounts(&self, owner: &str) -> ClientResult<Vec<Value>> {
        let result = self
            .call(
                "getTokenAccountsByOwner",
                vec![
                    json!(owner),
                    json!({"programId": TOKEN_PROGRAM_ID}),
                    json!({"encoding": "jsonParsed"}),
                ],
            )
            .await?;

        match result.get("value") {
            Some(Value::Array(accounts)) => Ok(accounts.clone()),
            _ => Err(ClientError::Decode(format!(
                "getTokenAccountsByOwner returned {result}"
            ))),
        }
    }

    /// Node health text. Not governed.
    pub async fn get_health(&self) -> ClientResult<String> {
        let url = format!("{}/health", self.url.trim_end_matches('/'));
        let text = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

fn spawn_governor(
    settings: &RpcSettings,
    http: Client,
) -> ClientResult<RequestGovernor<RpcCall, Value>> {
    let name = settings.registry_key();
    let dispatcher = HttpJsonRpc::new(http, settings.url.clone());
    let governor = match settings.mode {
        RpcMode::Envelope => RequestGovernor::new(name, settings.governor.clone(), dispatcher)?,
        RpcMode::Single => {
            RequestGovernor::new(name, settings.governor.clone(), Concurrent(dispatcher))?
        }
    };
    Ok(governor)
}
