//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the subset needed by a websocket-only client is implemented: text
//! frames, JSON payloads, one namespace per connection. Binary attachments are
//! rejected at decode time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Engine.IO protocol revision sent in the `EIO` query parameter.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Path the Socket.IO server listens on.
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Namespace used when none is given; omitted on the wire.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Payload of the Engine.IO OPEN packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// How long the client may go without hearing from the server before the
    /// session is considered dead.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// Outer Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    /// Carries an encoded [`SocketPacket`]
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> ProtocolResult<Self> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        let packet = match kind {
            '0' => EnginePacket::Open(serde_json::from_str(rest)?),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(rest.to_string()),
            '3' => EnginePacket::Pong(rest.to_string()),
            '4' => EnginePacket::Message(rest.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => {
                return Err(ProtocolError::UnknownPacketType {
                    layer: "engine.io",
                    found: other,
                })
            }
        };
        Ok(packet)
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // A struct of strings and integers always serializes.
                format!("0{}", serde_json::to_value(handshake).unwrap_or(Value::Null))
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Inner Socket.IO packet, carried inside [`EnginePacket::Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

impl SocketPacket {
    /// CONNECT request for `namespace` without auth data.
    pub fn connect(namespace: &str) -> Self {
        SocketPacket::Connect {
            namespace: namespace.to_string(),
            data: None,
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        SocketPacket::Disconnect {
            namespace: namespace.to_string(),
        }
    }

    /// EVENT carrying a single payload argument.
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        SocketPacket::Event {
            namespace: namespace.to_string(),
            id: None,
            name: name.to_string(),
            args: vec![payload],
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn decode(frame: &str) -> ProtocolResult<Self> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0'..='4' => {}
            '5' | '6' => {
                return Err(ProtocolError::Unsupported(
                    "binary attachments".to_string(),
                ))
            }
            other => {
                return Err(ProtocolError::UnknownPacketType {
                    layer: "socket.io",
                    found: other,
                })
            }
        }

        let (namespace, rest) = split_namespace(rest)?;
        let (id, rest) = split_ack_id(rest);
        let data = if rest.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        let packet = match kind {
            '0' => SocketPacket::Connect { namespace, data },
            '1' => SocketPacket::Disconnect { namespace },
            '2' => {
                let (name, args) = split_event(data)?;
                SocketPacket::Event {
                    namespace,
                    id,
                    name,
                    args,
                }
            }
            '3' => {
                let id = id.ok_or_else(|| ProtocolError::Unsupported("ack without id".into()))?;
                let args = match data {
                    Some(Value::Array(args)) => args,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                SocketPacket::Ack {
                    namespace,
                    id,
                    args,
                }
            }
            _ => SocketPacket::ConnectError {
                namespace,
                data: data.unwrap_or(Value::Null),
            },
        };
        Ok(packet)
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect { namespace, data } => {
                let mut out = prefix('0', namespace);
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
            SocketPacket::Disconnect { namespace } => prefix('1', namespace),
            SocketPacket::Event {
                namespace,
                id,
                name,
                args,
            } => {
                let mut out = prefix('2', namespace);
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&Value::Array(items).to_string());
                out
            }
            SocketPacket::Ack {
                namespace,
                id,
                args,
            } => {
                let mut out = prefix('3', namespace);
                out.push_str(&id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
                out
            }
            SocketPacket::ConnectError { namespace, data } => {
                let mut out = prefix('4', namespace);
                out.push_str(&data.to_string());
                out
            }
        }
    }

    /// Wrap into an Engine.IO MESSAGE frame ready to go on the socket.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

fn prefix(kind: char, namespace: &str) -> String {
    let mut out = String::new();
    out.push(kind);
    if namespace != DEFAULT_NAMESPACE {
        out.push_str(namespace);
        out.push(',');
    }
    out
}

fn split_namespace(rest: &str) -> ProtocolResult<(String, &str)> {
    if !rest.starts_with('/') {
        return Ok((DEFAULT_NAMESPACE.to_string(), rest));
    }
    let (namespace, rest) = match rest.find(',') {
        Some(idx) => (&rest[..idx], &rest[idx + 1..]),
        None => (rest, ""),
    };
    if namespace.chars().any(|c| c.is_whitespace() || c == '[' || c == '{') {
        return Err(ProtocolError::InvalidNamespace(namespace.to_string()));
    }
    Ok((namespace.to_string(), rest))
}

fn split_ack_id(rest: &str) -> (Option<u64>, &str) {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, rest);
    }
    match rest[..digits].parse::<u64>() {
        Ok(id) => (Some(id), &rest[digits..]),
        Err(_) => (None, rest),
    }
}

fn split_event(data: Option<Value>) -> ProtocolResult<(String, Vec<Value>)> {
    let Some(Value::Array(mut items)) = data else {
        return Err(ProtocolError::Unsupported("event payload is not an array".into()));
    };
    if items.is_empty() {
        return Err(ProtocolError::Unsupported("event without a name".into()));
    }
    match items.remove(0) {
        Value::String(name) => Ok((name, items)),
        _ => Err(ProtocolError::Unsupported("event name is not a string".into())),
    }
}
