//! Discovery records exchanged between peers.

use serde::{Deserialize, Serialize};

/// A known relay/store endpoint triple.
///
/// The websocket URL is the unique key. `added_by` and `first_seen` are
/// filled in by the directory when a peer omits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// WebSocket relay URL.
    pub websocket: String,
    /// Replicated store URL, `gun` on the wire.
    #[serde(default, rename = "gun", alias = "store")]
    pub store: String,
    /// HTTP API base URL.
    #[serde(default)]
    pub api: String,
    /// Peer id that first reported this server.
    #[serde(default)]
    pub added_by: String,
    /// Epoch milliseconds when first recorded.
    #[serde(default)]
    pub first_seen: i64,
    /// True if the reporting peer hosts this server itself.
    #[serde(default)]
    pub self_hosted: bool,
}

impl ServerRecord {
    /// Creates a record with empty attribution.
    pub fn new(
        websocket: impl Into<String>,
        store: impl Into<String>,
        api: impl Into<String>,
    ) -> Self {
        Self {
            websocket: websocket.into(),
            store: store.into(),
            api: api.into(),
            added_by: String::new(),
            first_seen: 0,
            self_hosted: false,
        }
    }
}

/// A live peer's own endpoints, advertised once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAddress {
    /// Advertising peer.
    pub peer_id: String,
    /// Relay the peer is connected through.
    #[serde(default)]
    pub relay_url: String,
    /// Replicated store peers the peer uses, `gunPeers` on the wire.
    #[serde(default, rename = "gunPeers", alias = "storePeers")]
    pub store_peers: Vec<String>,
    /// True for headless, always-on peers.
    #[serde(default)]
    pub self_hosted: bool,
    /// Epoch milliseconds when the peer joined.
    #[serde(default)]
    pub joined_at: i64,
}
