//! Transaction lookup service client

use futures_util::future::join_all;
use relay_core::EndpointRegistry;
use serde_json::{Value, json};

use crate::error::{ClientError, ClientResult};
use crate::rpc::{RpcClient, RpcSettings};

#[derive(Clone)]
pub struct TransactionClient {
    rpc: RpcClient,
}

impl TransactionClient {
    pub fn new(settings: RpcSettings) -> ClientResult<Self> {
        Self::with_registry(settings, EndpointRegistry::global())
    }

    pub fn with_registry(settings: RpcSettings, registry: &EndpointRegistry) -> ClientResult<Self> {
        Ok(TransactionClient {
            rpc: RpcClient::with_registry(settings, registry)?,
        })
    }

    /// Fetch one parsed transaction. A reply without a `transaction` body
    /// is reported as [`ClientError::NotFound`].
    pub async fn lookup(&self, signature: &str) -> ClientResult<Value> {
        let result = self
            .rpc
            .call(
                "getTransaction",
                vec![
                    json!(signature),
                    json!({"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}),
                ],
            )
            .await?;

        match result.get("transaction") {
            Some(transaction) if !transaction.is_null() => Ok(result),
            _ => Err(ClientError::NotFound(format!(
                "transaction {signature} not found or invalid"
            ))),
        }
    }

    /// Look up several signatures; results keep the input order
    pub async fn lookup_many<S: AsRef<str>>(&self, signatures: &[S]) -> Vec<ClientResult<Value>> {
        join_all(signatures.iter().map(|s| self.lookup(s.as_ref()))).await
    }
}
