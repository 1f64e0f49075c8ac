//! Payload types on either side of the frame codec.
//!
//! MESSAGE frames carry UTF-8 JSON. A JSON array is handed to the consumer as
//! its raw text, anything else as the parsed value: the mesh-sync layer
//! above treats a text payload as a batch of messages and a parsed value as a
//! single message.

use super::frame::{Frame, FrameType};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

/// Decoded content of a MESSAGE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// Raw JSON text of an array payload.
    Text(String),
    /// Any non-array JSON value.
    Parsed(Value),
}

impl MessagePayload {
    /// Decode a MESSAGE frame payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Protocol(format!("message is not UTF-8: {}", e)))?;
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("message is not JSON: {}", e)))?;

        Ok(match value {
            Value::Array(_) => Self::Text(text.to_string()),
            other => Self::Parsed(other),
        })
    }
}

/// Something delivered to the application from one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Payload of a BINARY frame.
    Binary(Vec<u8>),
    /// Payload of a MESSAGE frame.
    Message(MessagePayload),
}

impl Delivery {
    /// Turn a decoded frame into a delivery. Heartbeats deliver nothing.
    pub fn from_frame(frame: Frame) -> Result<Option<Self>> {
        match frame.frame_type {
            FrameType::Binary => Ok(Some(Self::Binary(frame.payload))),
            FrameType::Message => MessagePayload::decode(&frame.payload)
                .map(|payload| Some(Self::Message(payload))),
            FrameType::Heartbeat => Ok(None),
        }
    }
}

/// Data handed to `send`.
///
/// Bytes travel as BINARY frames; everything else is JSON-encoded into a
/// MESSAGE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Raw bytes.
    Binary(Vec<u8>),
    /// A JSON value.
    Json(Value),
}

impl Outgoing {
    /// JSON-encode any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Build the wire frame for this payload.
    pub fn into_frame(self) -> Result<Frame> {
        match self {
            Self::Binary(bytes) => Ok(Frame::new(FrameType::Binary, bytes)),
            Self::Json(value) => Ok(Frame::new(FrameType::Message, serde_json::to_vec(&value)?)),
        }
    }
}

impl From<Vec<u8>> for Outgoing {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for Outgoing {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Self::Json(Value::String(text.to_string()))
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Self::Json(Value::String(text))
    }
}

impl From<Value> for Outgoing {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}
