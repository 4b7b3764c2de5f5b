//! JSON-RPC clients against a local node stub
//!
//! The stub answers both batch envelopes and plain JSON-RPC calls, rate
//! limits the first `getBalance` for the address `flaky` and fails the whole
//! call with HTTP 500 when a batch contains the method `boom`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use relay_clients::{ClientError, RpcClient, RpcMode, RpcSettings, TransactionClient};
use relay_core::{BackoffConfig, EndpointRegistry, GovernorConfig, GovernorError};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Default)]
struct NodeStub {
    bodies: Mutex<Vec<Value>>,
    limited_once: AtomicBool,
}

impl NodeStub {
    fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    fn answer(&self, request: &Value) -> Value {
        let first = request["params"][0].as_str().unwrap_or_default();
        match request["method"].as_str() {
            Some("getBalance") => {
                if first == "flaky" && !self.limited_once.swap(true, Ordering::SeqCst) {
                    return json!({"error": {"code": -32429, "message": "Too many requests"}});
                }
                json!({"result": {"context": {"slot": 1}, "value": first.len() * 100}})
            }
            Some("getTransaction") if first == "missing" => json!({"result": null}),
            Some("getTransaction") => json!({
                "result": {"slot": 7, "transaction": {"signatures": [first]}}
            }),
            Some("getTokenAccountsByOwner") => json!({
                "result": {"context": {"slot": 1}, "value": [{"pubkey": "acct1"}, {"pubkey": "acct2"}]}
            }),
            _ => json!({"error": {"code": -32601, "message": "Method not found"}}),
        }
    }
}

async fn rpc_handler(State(stub): State<Arc<NodeStub>>, Json(body): Json<Value>) -> Response {
    stub.bodies.lock().unwrap().push(body.clone());

    if let Some(requests) = body["batchRequests"].as_array() {
        if requests.iter().any(|r| r["method"] == "boom") {
            return (StatusCode::INTERNAL_SERVER_ERROR, "node exploded").into_response();
        }
        let responses: Vec<Value> = requests.iter().map(|r| stub.answer(r)).collect();
        return Json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "batchResponses": responses,
        }))
        .into_response();
    }

    let mut reply = stub.answer(&body);
    reply["jsonrpc"] = json!("2.0");
    reply["id"] = body["id"].clone();
    Json(reply).into_response()
}

/// Start a node stub and return its address
async fn start_node() -> (SocketAddr, Arc<NodeStub>) {
    let stub = Arc::new(NodeStub::default());
    let app = Router::new()
        .route("/", post(rpc_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(Arc::clone(&stub));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, stub)
}

fn fast_limits() -> GovernorConfig {
    GovernorConfig {
        max_requests_per_second: 40,
        batch_size: 10,
        batch_interval: Duration::from_millis(10),
        max_retries: 3,
        backoff: BackoffConfig {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
        },
        default_timeout: Some(Duration::from_secs(5)),
    }
}

fn node_settings(addr: SocketAddr) -> RpcSettings {
    RpcSettings {
        governor: fast_limits(),
        ..RpcSettings::node(format!("http://{addr}"))
    }
}

#[tokio::test]
async fn test_concurrent_calls_share_one_envelope() {
    let (addr, stub) = start_node().await;
    let client = RpcClient::with_registry(node_settings(addr), &EndpointRegistry::new()).unwrap();

    let (a, b, c) = tokio::join!(
        client.get_balance("a"),
        client.get_balance("bb"),
        client.get_balance("ccc"),
    );
    assert_eq!(a.unwrap(), 100);
    assert_eq!(b.unwrap(), 200);
    assert_eq!(c.unwrap(), 300);

    let bodies = stub.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["method"], "batchRequest");

    let requests = bodies[0]["batchRequests"].as_array().unwrap();
    assert_eq!(requests.len(), 3);
    for (index, request) in requests.iter().enumerate() {
        assert_eq!(request["id"], index);
        assert_eq!(request["params"][1], json!({"commitment": "finalized"}));
    }
}

#[tokio::test]
async fn test_rate_limited_item_is_retried() {
    let (addr, stub) = start_node().await;
    let client = RpcClient::with_registry(node_settings(addr), &EndpointRegistry::new()).unwrap();

    let balance = client.get_balance("flaky").await.unwrap();

    assert_eq!(balance, 500);
    assert_eq!(stub.bodies().len(), 2);
}

#[tokio::test]
async fn test_unknown_method_is_rejected_without_retry() {
    let (addr, stub) = start_node().await;
    let client = RpcClient::with_registry(node_settings(addr), &EndpointRegistry::new()).unwrap();

    let err = client.call("getNothing", vec![]).await.unwrap_err();

    match err {
        ClientError::Governor(GovernorError::Rejected(remote)) => {
            assert_eq!(remote.code, Some(-32601));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stub.bodies().len(), 1);
}

#[tokio::test]
async fn test_http_failure_rejects_every_item_in_batch() {
    let (addr, _stub) = start_node().await;
    let client = RpcClient::with_registry(node_settings(addr), &EndpointRegistry::new()).unwrap();

    let (balance, boom) = tokio::join!(client.get_balance("a"), client.call("boom", vec![]));

    for result in [balance.map(|_| ()), boom.map(|_| ())] {
        match result {
            Err(ClientError::Governor(GovernorError::Rejected(remote))) => {
                assert_eq!(remote.code, Some(500));
                // The raw body stays out of the classified message
                assert_eq!(remote.message, "Internal Server Error");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_token_accounts_and_transaction() {
    let (addr, _stub) = start_node().await;
    let client = RpcClient::with_registry(node_settings(addr), &EndpointRegistry::new()).unwrap();

    let accounts = client.get_token_accounts("owner").await.unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0]["pubkey"], "acct1");

    let tx = client.get_transaction("sig1").await.unwrap().unwrap();
    assert_eq!(tx["slot"], 7);
    assert!(client.get_transaction("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_health_is_plain_text() {
    let (addr, stub) = start_node().await;
    let client = RpcClient::with_registry(node_settings(addr), &EndpointRegistry::new()).unwrap();

    assert_eq!(client.get_health().await.unwrap(), "ok");
    // Not routed through the governor
    assert!(stub.bodies().is_empty());
}

#[tokio::test]
async fn test_transaction_lookup_in_single_mode() {
    let (addr, stub) = start_node().await;
    let settings = RpcSettings {
        governor: fast_limits(),
        ..RpcSettings::transaction_service(format!("http://{addr}"))
    };
    assert_eq!(settings.mode, RpcMode::Single);
    let client = TransactionClient::with_registry(settings, &EndpointRegistry::new()).unwrap();

    let results = client.lookup_many(&["sigA", "missing"]).await;

    assert_eq!(results[0].as_ref().unwrap()["transaction"]["signatures"][0], "sigA");
    assert!(matches!(results[1], Err(ClientError::NotFound(_))));

    let bodies = stub.bodies();
    assert_eq!(bodies.len(), 2);
    for body in &bodies {
        assert!(body.get("batchRequests").is_none());
        assert_eq!(body["method"], "getTransaction");
        assert_eq!(
            body["params"][1],
            json!({
                "encoding": "jsonParsed",
                "maxSupportedTransactionVersion": 0,
                "commitment": "confirmed"
            })
        );
    }
}

#[tokio::test]
async fn test_unreachable_node_fails_lookup_as_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = RpcSettings {
        governor: fast_limits(),
        ..RpcSettings::transaction_service(format!("http://{addr}/rate-limit"))
    };
    let client = TransactionClient::with_registry(settings, &EndpointRegistry::new()).unwrap();

    let err = client.lookup("sig429").await.unwrap_err();

    assert!(
        matches!(err, ClientError::Governor(GovernorError::Transport(_))),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_clients_for_one_endpoint_share_a_governor() {
    let (addr, _stub) = start_node().await;
    let registry = EndpointRegistry::new();

    let rpc = RpcClient::with_registry(node_settings(addr), &registry).unwrap();
    let lookups = TransactionClient::with_registry(
        RpcSettings::transaction_service(format!("http://{addr}")),
        &registry,
    )
    .unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(rpc.governor().name(), format!("jsonrpc:http://{addr}"));

    // Both go through the first registration, batched envelope included
    let (balance, tx) = tokio::join!(rpc.get_balance("a"), lookups.lookup("sigB"));
    assert_eq!(balance.unwrap(), 100);
    assert_eq!(tx.unwrap()["slot"], 7);
}
