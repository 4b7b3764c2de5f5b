//! Connection seam
//!
//! The transport never opens sockets itself. A [`Connector`] yields the two
//! halves of a WebSocket session; the default one uses tokio-tungstenite,
//! tests substitute in-memory channels.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::StreamError;

pub type FrameSink = Pin<Box<dyn Sink<Message, Error = StreamError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, StreamError>> + Send>>;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), StreamError>;
}

/// Opens real WebSocket connections
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), StreamError> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        debug!(url, status = %response.status(), "websocket handshake complete");

        let (write, read) = ws_stream.split();
        let sink: FrameSink = Box::pin(write.sink_map_err(StreamError::from));
        let stream: FrameStream = Box::pin(read.map(|msg| msg.map_err(StreamError::from)));
        Ok((sink, stream))
    }
}
