//! Error types for the relay-core crate

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a remote endpoint, either for one item of a batch or
/// for the whole call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// Status or JSON-RPC error code, when the endpoint supplied one
    pub code: Option<i64>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        RemoteError {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        RemoteError {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Failure of a dispatched call, either a whole batch or one item of it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The wire call itself could not be completed (network, decode)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The endpoint answered, but rejected the call as a whole
    #[error("Remote rejected call: {0}")]
    Remote(#[from] RemoteError),
}

/// Terminal failure delivered to a caller of the governor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernorError {
    #[error("Max retries exceeded after {retries} rate-limited attempts: {last}")]
    MaxRetriesExceeded { retries: u32, last: String },

    #[error("Request rejected: {0}")]
    Rejected(RemoteError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Governor worker has shut down")]
    ShutDown,

    #[error("Endpoint {0} is already registered with a different type")]
    RegistryMismatch(String),
}

/// Configuration validation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("batch size {batch_size} exceeds max requests per second {max_per_second}")]
    BatchExceedsRate { batch_size: usize, max_per_second: u32 },

    #[error("max delay must be >= base delay")]
    CeilingBelowBase,

    #[error("{field} must be greater than {other}")]
    NotAfter {
        field: &'static str,
        other: &'static str,
    },
}

pub type GovernorResult<T> = std::result::Result<T, GovernorError>;
