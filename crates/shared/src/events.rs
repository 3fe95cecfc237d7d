//! Event channels the vision backend emits to dashboard clients.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// The five events a dashboard connection listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connect,
    Disconnect,
    ConnectError,
    /// Runtime statistics from the predictor (fps, latency, load, ...)
    Metrics,
    /// Per-frame detection output
    Predictions,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::Connect,
        EventName::Disconnect,
        EventName::ConnectError,
        EventName::Metrics,
        EventName::Predictions,
    ];

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Connect => "connect",
            EventName::Disconnect => "disconnect",
            EventName::ConnectError => "connect_error",
            EventName::Metrics => "metrics",
            EventName::Predictions => "predictions",
        }
    }

    /// Lifecycle events are raised by the transport itself, not by the server.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            EventName::Connect | EventName::Disconnect | EventName::ConnectError
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ProtocolError::Unsupported(format!("unknown event '{}'", s)))
    }
}

/// Collapse Socket.IO event arguments into the single payload handed to
/// listeners: one argument passes through, none becomes `null`, several
/// become an array.
pub fn payload_from_args(mut args: Vec<Value>) -> Value {
    match args.len() {
        0 => Value::Null,
        1 => args.remove(0),
        _ => Value::Array(args),
    }
}

/// Decode an opaque event payload into a typed schema.
pub fn decode_payload<T: DeserializeOwned>(payload: &Value) -> ProtocolResult<T> {
    Ok(T::deserialize(payload)?)
}

/// Human-readable detail from a `connect_error` payload. Servers send either a
/// bare string or an object with a `message` field.
pub fn error_detail(payload: &Value) -> String {
    match payload {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}
