//! Relay Core
//!
//! Client-side traffic shaping for remote endpoints that enforce request
//! quotas and answer rate-limit errors.
//!
//! # Architecture
//!
//! - [`RateWindow`] counts admissions over a rolling second
//! - [`BackoffPolicy`] classifies remote errors and computes retry delays
//! - [`RequestGovernor`] queues requests, forms batches within the rate cap,
//!   dispatches them through a [`BatchDispatcher`] and resubmits
//!   rate-limited items with exponential backoff
//! - [`EndpointRegistry`] hands every facade of one endpoint the same
//!   governor
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │  RpcClient   │  │ QuoteClient  │  │   TxClient   │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ submit          │ submit          │ submit
//!        ▼                 ▼                 ▼
//! ┌──────────────────────────────────────────────────┐
//! │        EndpointRegistry (one per endpoint)       │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │ RequestGovernor: queue + RateWindow +      │  │
//! │  │ BackoffPolicy                              │  │
//! │  └─────────────────────┬──────────────────────┘  │
//! └────────────────────────┼─────────────────────────┘
//!                          │ BatchDispatcher
//!                          ▼
//!                   remote endpoint
//! ```

pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod governor;
pub mod rate_window;
pub mod registry;

pub use backoff::{
    BackoffConfig, BackoffPolicy, Classification, HTTP_RATE_LIMIT_CODE, JSONRPC_RATE_LIMIT_CODE,
};
pub use config::GovernorConfig;
pub use dispatch::{BatchDispatcher, BatchReply, Concurrent, ItemDispatcher};
pub use error::{DispatchError, GovernorError, GovernorResult, InvalidConfig, RemoteError};
pub use governor::RequestGovernor;
pub use rate_window::RateWindow;
pub use registry::EndpointRegistry;
