//! Relay Clients
//!
//! Endpoint facades over the governed transports in `relay-core` and
//! `relay-stream`:
//!
//! - [`RpcClient`]: blockchain RPC node (batched envelope or single calls)
//! - [`TransactionClient`]: transaction lookup service
//! - [`QuoteClient`]: swap quote router
//! - [`PriceClient`]: token price oracle
//! - [`TradeFeed`]: live trades for followed wallets
//!
//! Facades built for the same endpoint share one governor (or transport)
//! through [`relay_core::EndpointRegistry`], so an endpoint's rate limit
//! holds across all of them.

pub mod config;
pub mod error;
pub mod feed;
pub mod price;
pub mod quote;
pub mod rest;
pub mod rpc;
pub mod transactions;

pub use config::{ConfigError, RelayConfigFile, load_config, load_default_config};
pub use error::{ClientError, ClientResult};
pub use feed::{PriceUpdate, Trade, TradeFeed, TradeSide, validate_wallet_address};
pub use price::{PriceClient, TokenPrice};
pub use quote::QuoteClient;
pub use rest::{RestCall, RestClient, RestMethod, RestSettings};
pub use rpc::{RpcCall, RpcClient, RpcMode, RpcSettings};
pub use transactions::TransactionClient;
