//! Protocol messages and JSON text frames.

use crate::error::{ProtocolError, ProtocolResult};
use crate::records::{PeerAddress, ServerRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

/// Room every peer joins unless configured otherwise.
pub const DEFAULT_ROOM: &str = "default";

/// An application message, broadcast to every peer in the room.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A peer's own relay/store endpoints.
    PeerAddresses(PeerAddress),
    /// A peer's full known-server directory.
    ServerList(ServerList),
    /// A single newly produced block (untrusted JSON).
    NewBlock(Value),
    /// A single newly produced signed event (untrusted JSON).
    NewEvent(Value),
    /// Notification that new bulk content exists in the replicated store.
    NewPoll(Value),
    /// "Send me everything after `last_index`".
    RequestSync(RequestSync),
    /// Answer to a request-sync, visible to the whole room.
    SyncResponse(SyncResponse),
}

impl Message {
    /// Returns the wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::PeerAddresses(_) => "peer-addresses",
            Message::ServerList(_) => "server-list",
            Message::NewBlock(_) => "new-block",
            Message::NewEvent(_) => "new-event",
            Message::NewPoll(_) => "new-poll",
            Message::RequestSync(_) => "request-sync",
            Message::SyncResponse(_) => "sync-response",
        }
    }

    /// Encodes the payload that goes in the envelope's `data` field.
    pub fn payload(&self) -> ProtocolResult<Value> {
        let value = match self {
            Message::PeerAddresses(p) => serde_json::to_value(p)?,
            Message::ServerList(p) => serde_json::to_value(p)?,
            Message::NewBlock(v) | Message::NewEvent(v) | Message::NewPoll(v) => v.clone(),
            Message::RequestSync(p) => serde_json::to_value(p)?,
            Message::SyncResponse(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    fn decode(kind: &str, payload: Value) -> ProtocolResult<Self> {
        let message = match kind {
            "peer-addresses" => Message::PeerAddresses(typed("peer-addresses", payload)?),
            "server-list" => Message::ServerList(typed("server-list", payload)?),
            "new-block" => Message::NewBlock(payload),
            "new-event" => Message::NewEvent(payload),
            "new-poll" => Message::NewPoll(payload),
            "request-sync" => Message::RequestSync(typed("request-sync", payload)?),
            "sync-response" => Message::SyncResponse(typed("sync-response", payload)?),
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(message)
    }
}

fn typed<T: DeserializeOwned>(kind: &'static str, payload: Value) -> ProtocolResult<T> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Payload of `server-list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerList {
    /// Sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    /// Known servers. Entries that fail to decode are skipped.
    #[serde(deserialize_with = "lenient_records")]
    pub servers: Vec<ServerRecord>,
}

fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<ServerRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

/// Payload of `request-sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSync {
    /// Requester.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    /// Highest index the requester holds, `-1` for none.
    ///
    /// A missing or non-integer value reads as `-1`.
    #[serde(default = "no_index", deserialize_with = "lenient_index")]
    pub last_index: i64,
}

fn no_index() -> i64 {
    -1
}

fn lenient_index<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_i64).unwrap_or(-1))
}

/// Payload of `sync-response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Responder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    /// Blocks after the requested index, as untrusted JSON.
    pub blocks: Vec<Value>,
}

/// Relay-originated session bookkeeping. Never application data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayControl {
    /// Greeting after the socket opens.
    Welcome,
    /// Current peer ids in the room.
    PeerList(Vec<String>),
    /// A peer disconnected.
    PeerLeft(Option<String>),
    /// Keepalive answer.
    Pong,
}

/// An application message with its send time.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The message.
    pub message: Message,
    /// Sender's epoch milliseconds.
    pub timestamp: i64,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(message: Message, timestamp: i64) -> Self {
        Self { message, timestamp }
    }

    /// Encodes `{type, data, timestamp}`.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(json!({
            "type": self.message.kind(),
            "data": self.message.payload()?,
            "timestamp": self.timestamp,
        }))
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Relay bookkeeping.
    Control(RelayControl),
    /// Application message from another peer.
    Message(Envelope),
}

/// A frame this peer sends to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Announce this peer to the relay.
    Register {
        /// Own peer id.
        peer_id: String,
    },
    /// Join a broadcast room.
    JoinRoom {
        /// Room name.
        room_id: String,
    },
    /// Fan an envelope out to the room.
    Broadcast(Envelope),
    /// Keepalive.
    Ping,
}

impl Outbound {
    /// Encodes the frame as JSON text.
    pub fn to_frame(&self) -> ProtocolResult<String> {
        let value = match self {
            Outbound::Register { peer_id } => json!({"type": "register", "peerId": peer_id}),
            Outbound::JoinRoom { room_id } => json!({"type": "join-room", "roomId": room_id}),
            Outbound::Broadcast(envelope) => {
                json!({"type": "broadcast", "data": envelope.to_value()?})
            }
            Outbound::Ping => json!({"type": "ping"}),
        };
        Ok(serde_json::to_string(&value)?)
    }

    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Outbound::Register { .. } => "register",
            Outbound::JoinRoom { .. } => "join-room",
            Outbound::Broadcast(envelope) => envelope.message.kind(),
            Outbound::Ping => "ping",
        }
    }
}

/// Decodes one inbound text frame.
///
/// Frames without a `data` field use their own top-level fields as the
/// payload. A `broadcast` frame delivered as-is by the relay is unwrapped.
pub fn decode_frame(text: &str) -> ProtocolResult<Inbound> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(value, true)
}

fn decode_value(value: Value, allow_unwrap: bool) -> ProtocolResult<Inbound> {
    let Value::Object(mut obj) = value else {
        return Err(ProtocolError::Malformed("expected a JSON object".into()));
    };
    let kind = match obj.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::Malformed("missing type tag".into())),
    };

    match kind.as_str() {
        "welcome" => return Ok(Inbound::Control(RelayControl::Welcome)),
        "pong" => return Ok(Inbound::Control(RelayControl::Pong)),
        "peer-list" => return Ok(Inbound::Control(RelayControl::PeerList(peer_ids(&obj)))),
        "peer-left" => {
            let peer_id = obj.get("peerId").and_then(Value::as_str).map(str::to_string);
            return Ok(Inbound::Control(RelayControl::PeerLeft(peer_id)));
        }
        "broadcast" if allow_unwrap => {
            let inner = obj
                .remove("data")
                .ok_or_else(|| ProtocolError::Malformed("broadcast without data".into()))?;
            return decode_value(inner, false);
        }
        _ => {}
    }

    let timestamp = obj.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
    let payload = match obj.remove("data") {
        Some(data) if !data.is_null() => data,
        _ => Value::Object(obj),
    };
    let message = Message::decode(&kind, payload)?;
    Ok(Inbound::Message(Envelope::new(message, timestamp)))
}

fn peer_ids(obj: &Map<String, Value>) -> Vec<String> {
    obj.get("peers")
        .and_then(Value::as_array)
        .map(|peers| {
            peers
                .iter()
                .filter_map(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
