//! Engine.IO v4 / Socket.IO v5 text packets, as carried over a plain
//! websocket (`EIO=4&transport=websocket`).
//!
//! Only the subset a listening client needs is modelled: the open
//! handshake, heartbeats, namespace connect/disconnect and events. Binary
//! attachments are not supported.

use serde_json::Value;

use crate::error::{LinkError, Result};

/// An Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}` handshake sent by the server right after the upgrade.
    Open(Value),
    /// `1` transport close.
    Close,
    /// `2` heartbeat from the server.
    Ping(String),
    /// `3` heartbeat reply.
    Pong(String),
    /// `4...` a Socket.IO packet on the default namespace `/`.
    Message(SocketPacket),
    /// `4...` a Socket.IO packet addressed to another namespace.
    Namespaced {
        namespace: String,
        packet: SocketPacket,
    },
    /// `5` upgrade.
    Upgrade,
    /// `6` noop.
    Noop,
}

/// A Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    Ack { id: u64, data: Value },
    ConnectError(Value),
}

/// The namespace every packet without a prefix belongs to.
pub const DEFAULT_NAMESPACE: &str = "/";

impl Packet {
    /// Parse one websocket text frame.
    pub fn decode(text: &str) -> Result<Packet> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| LinkError::Codec("empty frame".into()))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(rest.to_string())),
            '3' => Ok(Packet::Pong(rest.to_string())),
            '4' => {
                let (namespace, packet) = SocketPacket::decode(rest)?;
                if namespace == DEFAULT_NAMESPACE {
                    Ok(Packet::Message(packet))
                } else {
                    Ok(Packet::Namespaced { namespace, packet })
                }
            }
            '5' => Ok(Packet::Upgrade),
            '6' => Ok(Packet::Noop),
            other => Err(LinkError::Codec(format!("unknown packet type {:?}", other))),
        }
    }

    /// Render as a websocket text frame.
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(v) => format!("0{}", v),
            Packet::Close => "1".to_string(),
            Packet::Ping(p) => format!("2{}", p),
            Packet::Pong(p) => format!("3{}", p),
            Packet::Message(m) => format!("4{}", m.encode()),
            Packet::Namespaced { namespace, packet } => {
                let body = packet.encode();
                let (kind, rest) = body.split_at(1);
                format!("4{}{},{}", kind, namespace, rest)
            }
            Packet::Upgrade => "5".to_string(),
            Packet::Noop => "6".to_string(),
        }
    }
}

impl SocketPacket {
    /// Returns the packet with the namespace it was addressed to.
    fn decode(text: &str) -> Result<(String, SocketPacket)> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| LinkError::Codec("empty socket packet".into()))?;
        let mut rest = chars.as_str();

        // Optional namespace: "/admin,"
        let mut namespace = DEFAULT_NAMESPACE;
        if rest.starts_with('/') {
            (namespace, rest) = match rest.find(',') {
                Some(pos) => (&rest[..pos], &rest[pos + 1..]),
                None => (rest, ""),
            };
        }

        // Optional ack id before the payload
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            rest[..digits].parse::<u64>().ok()
        } else {
            None
        };
        let payload = &rest[digits..];

        let packet = match kind {
            '0' => {
                if payload.is_empty() {
                    SocketPacket::Connect(None)
                } else {
                    SocketPacket::Connect(Some(serde_json::from_str(payload)?))
                }
            }
            '1' => SocketPacket::Disconnect,
            '2' => {
                let args: Value = serde_json::from_str(payload)?;
                let mut args = match args {
                    Value::Array(a) => a.into_iter(),
                    _ => return Err(LinkError::Codec("event payload is not an array".into())),
                };
                let name = match args.next() {
                    Some(Value::String(s)) => s,
                    _ => return Err(LinkError::Codec("event name missing".into())),
                };
                SocketPacket::Event {
                    name,
                    data: args.next().unwrap_or(Value::Null),
                }
            }
            '3' => {
                let args: Value = serde_json::from_str(payload)?;
                let data = match args {
                    Value::Array(mut a) if !a.is_empty() => a.swap_remove(0),
                    _ => Value::Null,
                };
                SocketPacket::Ack {
                    id: ack_id.unwrap_or_default(),
                    data,
                }
            }
            '4' => SocketPacket::ConnectError(serde_json::from_str(payload).unwrap_or(Value::Null)),
            other => {
                return Err(LinkError::Codec(format!(
                    "unsupported socket packet type {:?}",
                    other
                )))
            }
        };
        Ok((namespace.to_string(), packet))
    }

    fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, data } => {
                format!("2{}", Value::Array(vec![Value::String(name.clone()), data.clone()]))
            }
            SocketPacket::Ack { id, data } => format!("3{}{}", id, Value::Array(vec![data.clone()])),
            SocketPacket::ConnectError(v) => format!("4{}", v),
        }
    }
}
