use relay_core::InvalidConfig;
use thiserror::Error;

/// Failure of a streaming session or of a request made to the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Invalid stream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid stream config: {0}")]
    Config(#[from] InvalidConfig),

    #[error("Connection error: {0}")]
    Connect(String),

    /// Abnormal closure, read/write failure or missed heartbeat
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    /// The session ended normally, or the transport task is gone
    #[error("Transport closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::ConnectionLost(err.to_string())
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
