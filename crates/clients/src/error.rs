//! Error types for the relay-clients crate

use relay_core::{GovernorError, InvalidConfig};
use relay_stream::StreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Governor(#[from] GovernorError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] InvalidConfig),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Request unsuccessful: {0}")]
    Unsuccessful(String),
}

impl ClientError {
    /// True when the governor gave up after repeated rate limiting
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ClientError::Governor(GovernorError::MaxRetriesExceeded { .. })
        )
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
