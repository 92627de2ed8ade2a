//! Engine.IO v4 / Socket.IO v5 text packets, as carried over a websocket.
//!
//! Only the text framing is supported. Binary attachments are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const ENGINE_IO_VERSION: &str = "4";
pub const DEFAULT_NAMESPACE: &str = "/";

pub const EVENT_STATUS_UPDATE: &str = "status_update";
pub const EVENT_REQUEST_STATUS: &str = "request_status";
pub const EVENT_CONNECTED: &str = "connected";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown engine.io packet type: {0:?}")]
    UnknownEngineType(char),
    #[error("unknown socket.io packet type: {0:?}")]
    UnknownSocketType(char),
    #[error("binary packets are not supported")]
    Binary,
    #[error("invalid open handshake: {0}")]
    Handshake(String),
    #[error("invalid ack id: {0}")]
    AckId(String),
    #[error("packet decode failed: {0}")]
    Decode(String),
    #[error("event payload must be an array starting with the event name")]
    EventShape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// Silence longer than this means the server is gone.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn kind(&self) -> &'static str {
        match self {
            EnginePacket::Open(_) => "open",
            EnginePacket::Close => "close",
            EnginePacket::Ping(_) => "ping",
            EnginePacket::Pong(_) => "pong",
            EnginePacket::Message(_) => "message",
            EnginePacket::Upgrade => "upgrade",
            EnginePacket::Noop => "noop",
        }
    }
}

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
        ack: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    pub fn connect() -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack: None,
            name: name.into(),
            args,
        }
    }

    fn type_char(&self) -> char {
        match self {
            SocketPacket::Connect { .. } => '0',
            SocketPacket::Disconnect { .. } => '1',
            SocketPacket::Event { .. } => '2',
            SocketPacket::Ack { .. } => '3',
            SocketPacket::ConnectError { .. } => '4',
        }
    }

    fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }
}

pub fn encode_packet(packet: &EnginePacket) -> String {
    match packet {
        EnginePacket::Open(handshake) => {
            let body = serde_json::to_string(handshake).unwrap_or_else(|_| "{}".to_string());
            format!("0{body}")
        }
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping(payload) => format!("2{payload}"),
        EnginePacket::Pong(payload) => format!("3{payload}"),
        EnginePacket::Message(socket) => {
            let mut out = String::from("4");
            encode_socket(socket, &mut out);
            out
        }
        EnginePacket::Upgrade => "5".to_string(),
        EnginePacket::Noop => "6".to_string(),
    }
}

fn encode_socket(packet: &SocketPacket, out: &mut String) {
    out.push(packet.type_char());
    let namespace = packet.namespace();
    if namespace != DEFAULT_NAMESPACE {
        out.push_str(namespace);
        out.push(',');
    }
    let body = match packet {
        SocketPacket::Connect { data, .. } | SocketPacket::ConnectError { data, .. } => {
            data.clone()
        }
        SocketPacket::Disconnect { .. } => None,
        SocketPacket::Event {
            ack, name, args, ..
        } => {
            if let Some(id) = ack {
                out.push_str(&id.to_string());
            }
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            Some(Value::Array(items))
        }
        SocketPacket::Ack { ack, args, .. } => {
            out.push_str(&ack.to_string());
            Some(Value::Array(args.clone()))
        }
    };
    if let Some(body) = body {
        out.push_str(&body.to_string());
    }
}

pub fn decode_packet(text: &str) -> Result<EnginePacket, PacketError> {
    let kind = text.chars().next().ok_or(PacketError::Empty)?;
    let rest = &text[kind.len_utf8()..];
    match kind {
        '0' => serde_json::from_str::<OpenHandshake>(rest)
            .map(EnginePacket::Open)
            .map_err(|err| PacketError::Handshake(err.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        'b' => Err(PacketError::Binary),
        other => Err(PacketError::UnknownEngineType(other)),
    }
}

fn decode_socket(raw: &str) -> Result<SocketPacket, PacketError> {
    let kind = raw.chars().next().ok_or(PacketError::Empty)?;
    match kind {
        '0'..='4' => {}
        '5' | '6' => return Err(PacketError::Binary),
        other => return Err(PacketError::UnknownSocketType(other)),
    }
    let mut rest = &raw[1..];

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(end) => {
                let namespace = rest[..end].to_string();
                rest = &rest[end + 1..];
                namespace
            }
            None => {
                let namespace = rest.to_string();
                rest = "";
                namespace
            }
        }
    } else {
        DEFAULT_NAMESPACE.to_string()
    };

    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let ack = if digits > 0 {
        Some(
            rest[..digits]
                .parse::<u64>()
                .map_err(|err| PacketError::AckId(err.to_string()))?,
        )
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(rest)
                .map_err(|err| PacketError::Decode(err.to_string()))?,
        )
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut items = match data {
                Some(Value::Array(items)) => items,
                _ => return Err(PacketError::EventShape),
            };
            if items.is_empty() {
                return Err(PacketError::EventShape);
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                _ => return Err(PacketError::EventShape),
            };
            Ok(SocketPacket::Event {
                namespace,
                ack,
                name,
                args: items,
            })
        }
        '3' => {
            let ack = ack.ok_or_else(|| PacketError::AckId("missing".to_string()))?;
            let args = match data {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            Ok(SocketPacket::Ack {
                namespace,
                ack,
                args,
            })
        }
        _ => Ok(SocketPacket::ConnectError { namespace, data }),
    }
}
