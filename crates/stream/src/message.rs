//! Wire frames
//!
//! Heartbeats are the bare text frames `ping` and `pong`. Everything else is
//! a JSON envelope `{"type": ..., "data": ...}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Typed envelope carried by every non-heartbeat frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Envelope {
            kind: kind.into(),
            data,
        }
    }

    /// Deserialize the payload into a concrete message type
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        T::deserialize(&self.data).map_err(|e| StreamError::Decode(format!("{}: {e}", self.kind)))
    }
}

/// A decoded inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Pong,
    Message(Envelope),
}

pub fn decode(text: &str) -> Result<Inbound, StreamError> {
    if text == PONG {
        return Ok(Inbound::Pong);
    }
    serde_json::from_str(text)
        .map(Inbound::Message)
        .map_err(|e| StreamError::Decode(e.to_string()))
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, StreamError> {
    serde_json::to_string(message).map_err(|e| StreamError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_pong() {
        assert_eq!(decode("pong").unwrap(), Inbound::Pong);
    }

    #[test]
    fn test_decode_envelope() {
        let inbound = decode(r#"{"type":"trade","data":{"signature":"abc"}}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Message(Envelope::new("trade", json!({"signature": "abc"})))
        );
    }

    #[test]
    fn test_decode_envelope_without_data() {
        let inbound = decode(r#"{"type":"welcome"}"#).unwrap();
        assert_eq!(inbound, Inbound::Message(Envelope::new("welcome", Value::Null)));
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        assert!(matches!(decode("PONG!"), Err(StreamError::Decode(_))));
        assert!(matches!(decode(r#"{"data":{}}"#), Err(StreamError::Decode(_))));
    }

    #[test]
    fn test_data_as() {
        #[derive(Deserialize)]
        struct Price {
            price: f64,
        }

        let envelope = Envelope::new("price_update", json!({"price": 1.5}));
        assert_eq!(envelope.data_as::<Price>().unwrap().price, 1.5);
        assert!(envelope.data_as::<Vec<u8>>().is_err());
    }
}
