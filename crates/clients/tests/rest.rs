//! Quote and price clients against a local REST stub
//!
//! The first `/quote` request is answered with 429 so the retry path runs.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use relay_clients::{
    ClientError, PriceClient, QuoteClient, RestCall, RestClient, RestSettings, TokenPrice,
};
use relay_core::{BackoffConfig, EndpointRegistry, GovernorConfig, GovernorError};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Default)]
struct ApiStub {
    quote_hits: AtomicUsize,
}

async fn quote(
    State(stub): State<Arc<ApiStub>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if stub.quote_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many requests"})),
        )
            .into_response();
    }
    Json(json!({
        "inputMint": params["inputMint"],
        "outputMint": params["outputMint"],
        "inAmount": params["amount"],
        "slippageBps": params["slippageBps"],
    }))
    .into_response()
}

async fn swap(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({"swapTransaction": "AQAB", "request": body}))
}

async fn price(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("address").map(String::as_str) {
        Some("unknown") => Json(json!({"data": null})),
        _ => Json(json!({
            "data": {"price": 1.5, "volume24h": 100.0, "marketCap": 2000.0, "priceChange24h": -3.2}
        })),
    }
}

async fn prices(Json(body): Json<Value>) -> Json<Value> {
    let tokens = body["token_addresses"].as_array().cloned().unwrap_or_default();
    if tokens.is_empty() {
        return Json(json!({"success": false, "error": "no tokens"}));
    }
    let data: serde_json::Map<String, Value> = tokens
        .iter()
        .filter_map(|t| t.as_str())
        .map(|t| (t.to_string(), json!({"price": 2.0})))
        .collect();
    Json(json!({"success": true, "data": data}))
}

async fn missing() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"message": "no such route"}))).into_response()
}

/// Start the REST stub and return its address
async fn start_api() -> (SocketAddr, Arc<ApiStub>) {
    let stub = Arc::new(ApiStub::default());
    let app = Router::new()
        .route("/quote", get(quote))
        .route("/swap", post(swap))
        .route("/price", get(price).post(prices))
        .route("/missing", get(missing))
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

fn settings(addr: SocketAddr) -> RestSettings {
    RestSettings::new(
        format!("http://{addr}"),
        GovernorConfig {
            max_requests_per_second: 3,
            batch_size: 2,
            batch_interval: Duration::from_millis(10),
            max_retries: 3,
            backoff: BackoffConfig {
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(100),
            },
            default_timeout: Some(Duration::from_secs(5)),
        },
    )
}

#[tokio::test]
async fn test_quote_retries_after_429() {
    let (addr, stub) = start_api().await;
    let client = QuoteClient::with_registry(settings(addr), &EndpointRegistry::new()).unwrap();

    let quote = client.get_quote("MintIn", "MintOut", 1_000_000).await.unwrap();

    assert_eq!(stub.quote_hits.load(Ordering::SeqCst), 2);
    assert_eq!(quote["inputMint"], "MintIn");
    assert_eq!(quote["outputMint"], "MintOut");
    assert_eq!(quote["inAmount"], "1000000");
    assert_eq!(quote["slippageBps"], "50");
}

#[tokio::test]
async fn test_swap_posts_quote_back() {
    let (addr, _stub) = start_api().await;
    let client = QuoteClient::with_registry(settings(addr), &EndpointRegistry::new())
        .unwrap()
        .with_slippage_bps(100);

    let quote = json!({"inAmount": "5", "outAmount": "9"});
    let swap = client.swap(&quote, "UserKey").await.unwrap();

    assert_eq!(swap["swapTransaction"], "AQAB");
    assert_eq!(
        swap["request"],
        json!({"quoteResponse": quote, "userPublicKey": "UserKey", "wrapUnwrapSOL": true})
    );
}

#[tokio::test]
async fn test_price_lookup() {
    let (addr, _stub) = start_api().await;
    let client = PriceClient::with_registry(settings(addr), &EndpointRegistry::new()).unwrap();

    let price = client.get_price("MintA").await.unwrap();
    assert_eq!(price.price, 1.5);
    assert_eq!(price.volume_24h, Some(100.0));
    assert_eq!(price.market_cap, Some(2000.0));
    assert_eq!(price.price_change_24h, Some(-3.2));

    let unknown = client.get_price("unknown").await.unwrap();
    assert_eq!(unknown, TokenPrice::default());
}

#[tokio::test]
async fn test_bulk_prices() {
    let (addr, _stub) = start_api().await;
    let client = PriceClient::with_registry(settings(addr), &EndpointRegistry::new()).unwrap();

    let prices = client.get_prices(&["MintA", "MintB"]).await.unwrap();
    assert_eq!(prices["MintB"]["price"], 2.0);

    let empty: [&str; 0] = [];
    let err = client.get_prices(&empty).await.unwrap_err();
    assert!(matches!(err, ClientError::Unsuccessful(msg) if msg == "no tokens"));
}

#[tokio::test]
async fn test_client_error_status_is_rejected() {
    let (addr, _stub) = start_api().await;
    let client = RestClient::with_registry(settings(addr), &EndpointRegistry::new()).unwrap();

    let err = client.execute(RestCall::get("/missing")).await.unwrap_err();

    match err {
        ClientError::Governor(GovernorError::Rejected(remote)) => {
            assert_eq!(remote.code, Some(404));
            assert!(remote.message.contains("no such route"), "{}", remote.message);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_as_transport_error() {
    // Reserve a port, then free it so nothing is listening there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = RestClient::with_registry(settings(addr), &EndpointRegistry::new()).unwrap();

    // The URL text contains "429", which must not read as a rate limit
    let err = client
        .execute(RestCall::get("/v429/price"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, ClientError::Governor(GovernorError::Transport(_))),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_path_is_not_classified_as_rate_limit() {
    let (addr, _stub) = start_api().await;
    let client = RestClient::with_registry(settings(addr), &EndpointRegistry::new()).unwrap();

    // Unrouted, so the stub answers with a bare 404
    let err = client
        .execute(RestCall::get("/rate-limit/429"))
        .await
        .unwrap_err();

    match err {
        ClientError::Governor(GovernorError::Rejected(remote)) => {
            assert_eq!(remote.code, Some(404));
            assert_eq!(remote.message, "Not Found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_quote_and_price_share_one_governor() {
    let (addr, _stub) = start_api().await;
    let registry = EndpointRegistry::new();

    let quotes = QuoteClient::with_registry(settings(addr), &registry).unwrap();
    let prices = PriceClient::with_registry(settings(addr), &registry).unwrap();
    assert_eq!(registry.len(), 1);

    let (quote, price) = tokio::join!(quotes.get_quote("A", "B", 1), prices.get_price("A"));
    assert!(quote.is_ok());
    assert_eq!(price.unwrap().price, 1.5);
}
