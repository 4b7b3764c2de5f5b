//! Relay Stream
//!
//! Resilient WebSocket transport for push-style feeds.
//!
//! - [`StreamTransport`] keeps one connection alive: heartbeat with pong
//!   timeout, exponential-backoff reconnect with a bounded attempt budget,
//!   and an outbound queue flushed in order on every connection
//! - [`HandlerRegistry`] routes inbound `{type, data}` envelopes by type
//! - [`StreamObserver`] receives lifecycle callbacks
//! - [`Connector`] opens the underlying session; [`TungsteniteConnector`] is
//!   the production implementation

pub mod config;
pub mod connector;
pub mod error;
pub mod handlers;
pub mod message;
pub mod observer;
pub mod queue;
pub mod state;
pub mod transport;

pub use config::{StreamConfig, validate_url};
pub use connector::{Connector, FrameSink, FrameStream, TungsteniteConnector};
pub use error::{StreamError, StreamResult};
pub use handlers::{Handler, HandlerId, HandlerRegistry};
pub use message::{Envelope, Inbound, PING, PONG};
pub use observer::{ChannelObserver, NoopObserver, StreamEvent, StreamObserver};
pub use queue::OutboundQueue;
pub use state::ConnectionState;
pub use transport::StreamTransport;

/// Re-exported so connectors and tests can build frames
pub use tokio_tungstenite::tungstenite::Message;
