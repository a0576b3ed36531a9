//! The node context: ledger, event log, directory and connection state
//! behind one owner, driven by inbound frames and timers.
//!
//! Handlers never touch a socket. Frames to write are collected and taken
//! with [`Node::drain_outgoing`] by whatever drives the node, which keeps
//! every handler synchronous and lets tests run several nodes in one
//! process.

use crate::config::NodeConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::directory::ServerDirectory;
use crate::error::{SyncError, SyncResult};
use crate::monitor::DowngradeMonitor;
use crate::store::ReplicatedStore;
use ledgerlink_ledger::{Block, EventLog, Ledger, LedgerResult, SignedEvent};
use ledgerlink_storage::{DataDir, InMemoryDocument, JsonStore, BLOCKS_FILE, EVENTS_FILE, SERVERS_FILE};
use ledgerlink_sync_protocol::{
    decode_frame, Envelope, Inbound, Message, Outbound, PeerAddress, RelayControl, RequestSync,
    ServerList, ServerRecord, SyncResponse,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, trace, warn};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// The three persisted documents of a node.
pub struct NodeStores {
    /// Ledger blocks.
    pub blocks: JsonStore<Block>,
    /// Signed events.
    pub events: JsonStore<SignedEvent>,
    /// Known servers.
    pub servers: JsonStore<ServerRecord>,
}

impl NodeStores {
    /// Stores backed by files in a data directory.
    pub fn in_dir(dir: &DataDir) -> Self {
        Self {
            blocks: dir.json_store(BLOCKS_FILE),
            events: dir.json_store(EVENTS_FILE),
            servers: dir.json_store(SERVERS_FILE),
        }
    }

    /// Stores kept in memory.
    pub fn in_memory() -> Self {
        Self::from_documents(
            InMemoryDocument::new(),
            InMemoryDocument::new(),
            InMemoryDocument::new(),
        )
    }

    /// Stores over given in-memory documents, so a test can inspect or
    /// break them.
    pub fn from_documents(
        blocks: InMemoryDocument,
        events: InMemoryDocument,
        servers: InMemoryDocument,
    ) -> Self {
        Self {
            blocks: JsonStore::new(Box::new(blocks)),
            events: JsonStore::new(Box::new(events)),
            servers: JsonStore::new(Box::new(servers)),
        }
    }
}

/// Point-in-time counters for status output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    /// This node's id.
    pub peer_id: String,
    /// Relay URL.
    pub relay_url: String,
    /// Connection state name.
    pub connection: String,
    /// True while frames can be written.
    pub connected: bool,
    /// Peers the relay reported in the room.
    pub relay_peers: usize,
    /// Peers that advertised their addresses.
    pub known_peers: usize,
    /// Held blocks.
    pub blocks: usize,
    /// Highest held index, `-1` if none.
    pub last_index: i64,
    /// Held events.
    pub events: usize,
    /// Known servers.
    pub known_servers: usize,
    /// `new-poll` notifications seen.
    pub polls_seen: u64,
    /// `request-sync` messages received from other peers, answered or not.
    pub sync_requests: u64,
    /// `sync-response` messages sent in answer.
    pub sync_responses_sent: u64,
    /// Application messages received.
    pub messages_in: u64,
    /// Peer blocks refused.
    pub blocks_rejected: u64,
    /// Entries observed by replicated store sweeps.
    pub store_updates: u64,
    /// Downgrade alarms raised.
    pub alarms: u64,
    /// Broadcasts waiting for a connection.
    pub queued: usize,
    /// Epoch milliseconds when the node started.
    pub started_at: i64,
}

#[derive(Debug, Default)]
struct Counters {
    polls_seen: u64,
    sync_requests: u64,
    sync_responses_sent: u64,
    messages_in: u64,
    blocks_rejected: u64,
    store_updates: u64,
}

/// One ledger replica and its relay session.
pub struct Node {
    config: NodeConfig,
    ledger: Ledger,
    events: EventLog,
    directory: ServerDirectory,
    peers: HashMap<String, PeerAddress>,
    relay_peers: Vec<String>,
    monitor: DowngradeMonitor,
    connection: ConnectionManager,
    stores: NodeStores,
    content: Option<Arc<dyn ReplicatedStore>>,
    outgoing: Vec<Outbound>,
    counters: Counters,
    started_at: i64,
}

impl Node {
    /// Creates a node, loading whatever the stores hold.
    ///
    /// Unreadable documents load as empty.
    pub fn open(config: NodeConfig, stores: NodeStores) -> Self {
        let ledger = Ledger::from_blocks(stores.blocks.load_or_default(), config.max_blocks);
        let events = EventLog::from_events(stores.events.load_or_default(), config.max_events);
        let directory = ServerDirectory::from_records(stores.servers.load_or_default());
        let connection =
            ConnectionManager::new(config.relay_url.clone(), config.retry.clone(), config.max_queued);

        info!(
            peer_id = %config.peer_id,
            blocks = ledger.len(),
            last_index = ledger.last_index(),
            events = events.len(),
            servers = directory.len(),
            "node state loaded"
        );

        Self {
            config,
            ledger,
            events,
            directory,
            peers: HashMap::new(),
            relay_peers: Vec::new(),
            monitor: DowngradeMonitor::new(),
            connection,
            stores,
            content: None,
            outgoing: Vec::new(),
            counters: Counters::default(),
            started_at: now_millis(),
        }
    }

    /// Attaches the replicated store that `new-poll` payloads are mirrored
    /// into.
    pub fn with_content_store(mut self, store: Arc<dyn ReplicatedStore>) -> Self {
        self.content = Some(store);
        self
    }

    /// This node's peer id.
    pub fn peer_id(&self) -> &str {
        &self.config.peer_id
    }

    /// Configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The held ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The held events.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The Server Directory.
    pub fn directory(&self) -> &ServerDirectory {
        &self.directory
    }

    /// Peers that advertised their addresses this session.
    pub fn peers(&self) -> &HashMap<String, PeerAddress> {
        &self.peers
    }

    /// Peer ids the relay reported in the room.
    pub fn relay_peers(&self) -> &[String] {
        &self.relay_peers
    }

    /// The downgrade monitor.
    pub fn monitor(&self) -> &DowngradeMonitor {
        &self.monitor
    }

    /// Connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Broadcasts waiting for a connection.
    pub fn queued(&self) -> usize {
        self.connection.queued()
    }

    // --- connection lifecycle ---------------------------------------------

    /// Marks a connect attempt as started.
    pub fn begin_connect(&mut self) {
        self.connection.begin_connect();
    }

    /// Socket opened: registers, joins the room, replays queued broadcasts
    /// and advertises this node and its directory.
    ///
    /// The initial sync request goes out in [`Node::complete_handshake`].
    pub fn on_open(&mut self) {
        let replay = self.connection.on_open();
        info!(
            url = %self.config.relay_url,
            replayed = replay.len(),
            "connected to relay"
        );

        self.send(Outbound::Register {
            peer_id: self.config.peer_id.clone(),
        });
        self.send(Outbound::JoinRoom {
            room_id: self.config.room.clone(),
        });
        self.outgoing.extend(replay);

        self.broadcast(Message::PeerAddresses(self.own_address()));
        self.announce_servers();
    }

    /// Asks the room for everything after the local head.
    pub fn complete_handshake(&mut self) {
        if !self.connection.is_open() {
            return;
        }
        let last_index = self.ledger.last_index();
        self.broadcast(Message::RequestSync(RequestSync {
            peer_id: Some(self.config.peer_id.clone()),
            last_index,
        }));
        self.connection.on_synced();
        debug!(last_index, "requested sync");
    }

    /// Socket closed or failed to open. Session peers are forgotten and the
    /// delay before the next attempt is returned.
    pub fn on_close(&mut self) -> Duration {
        let was_open = self.connection.is_open();
        self.peers.clear();
        self.relay_peers.clear();
        self.outgoing.clear();
        let delay = self.connection.on_close();
        if was_open {
            warn!(retry_in_ms = delay.as_millis() as u64, "relay connection lost");
        } else {
            debug!(
                attempt = self.connection.attempt(),
                retry_in_ms = delay.as_millis() as u64,
                "relay unreachable"
            );
        }
        delay
    }

    /// Queues a keepalive ping if connected.
    pub fn keepalive(&mut self) {
        self.send(Outbound::Ping);
    }

    /// Takes every frame waiting to be written.
    pub fn drain_outgoing(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outgoing)
    }

    fn send(&mut self, outbound: Outbound) {
        if self.connection.is_open() {
            self.outgoing.push(outbound);
        } else {
            trace!(frame = outbound.label(), "not connected, dropping frame");
        }
    }

    fn broadcast(&mut self, message: Message) {
        let outbound = Outbound::Broadcast(Envelope::new(message, now_millis()));
        if self.connection.is_open() {
            self.outgoing.push(outbound);
        } else {
            self.connection.enqueue(outbound);
        }
    }

    fn own_address(&self) -> PeerAddress {
        PeerAddress {
            peer_id: self.config.peer_id.clone(),
            relay_url: self.config.relay_url.clone(),
            store_peers: vec![self.config.store_url.clone()],
            self_hosted: true,
            joined_at: self.started_at,
        }
    }

    fn own_record(&self) -> ServerRecord {
        ServerRecord {
            websocket: self.config.relay_url.clone(),
            store: self.config.store_url.clone(),
            api: self.config.api_url.clone(),
            added_by: self.config.peer_id.clone(),
            first_seen: now_millis(),
            self_hosted: true,
        }
    }

    /// Inserts the own endpoint and broadcasts the whole directory.
    fn announce_servers(&mut self) {
        let own = self.own_record();
        let peer_id = self.config.peer_id.clone();
        if self.directory.merge(vec![own], &peer_id, now_millis()) > 0 {
            self.persist_servers();
        }
        self.broadcast(Message::ServerList(ServerList {
            peer_id: Some(peer_id),
            servers: self.directory.records().to_vec(),
        }));
    }

    // --- inbound ------------------------------------------------------------

    /// Handles one inbound text frame.
    ///
    /// Malformed frames are dropped without noise; unknown types get a
    /// debug line.
    pub fn handle_frame(&mut self, text: &str) {
        match decode_frame(text) {
            Ok(Inbound::Control(control)) => self.handle_control(control),
            Ok(Inbound::Message(envelope)) => self.handle_message(envelope.message),
            Err(e) if e.is_silent() => trace!(error = %e, "dropping malformed frame"),
            Err(e) => debug!(error = %e, "ignoring frame"),
        }
    }

    fn handle_control(&mut self, control: RelayControl) {
        match control {
            RelayControl::Welcome => debug!("relay welcomed us"),
            RelayControl::PeerList(peers) => {
                let own = &self.config.peer_id;
                self.relay_peers = peers.into_iter().filter(|p| p != own).collect();
                debug!(peers = self.relay_peers.len(), "room peer list");
            }
            RelayControl::PeerLeft(Some(peer_id)) => {
                self.peers.remove(&peer_id);
                self.relay_peers.retain(|p| p != &peer_id);
                debug!(peer = %peer_id, "peer left");
            }
            RelayControl::PeerLeft(None) => {}
            RelayControl::Pong => trace!("pong"),
        }
    }

    /// Dispatches one application message.
    pub fn handle_message(&mut self, message: Message) {
        self.counters.messages_in += 1;
        match message {
            Message::PeerAddresses(address) => self.handle_peer_addresses(address),
            Message::ServerList(list) => self.handle_server_list(list),
            Message::NewBlock(value) => self.handle_new_block(&value),
            Message::NewEvent(value) => self.handle_new_event(&value),
            Message::NewPoll(value) => self.handle_new_poll(value),
            Message::RequestSync(request) => self.handle_request_sync(request),
            Message::SyncResponse(response) => self.handle_sync_response(response),
        }
    }

    fn handle_peer_addresses(&mut self, address: PeerAddress) {
        if address.peer_id.is_empty() || address.peer_id == self.config.peer_id {
            return;
        }
        debug!(peer = %address.peer_id, relay = %address.relay_url, "peer addresses");
        self.peers.insert(address.peer_id.clone(), address);
    }

    fn handle_server_list(&mut self, list: ServerList) {
        let from = list.peer_id.unwrap_or_else(|| "unknown".into());
        let added = self.directory.merge(list.servers, &from, now_millis());
        if added > 0 {
            info!(added, from = %from, total = self.directory.len(), "learned servers");
            self.persist_servers();
        }
    }

    fn handle_request_sync(&mut self, request: RequestSync) {
        if request.peer_id.as_deref() == Some(self.config.peer_id.as_str()) {
            return;
        }
        self.counters.sync_requests += 1;
        let missing = self.ledger.missing_since(request.last_index);
        if missing.is_empty() {
            return;
        }

        let blocks: Vec<Value> = missing
            .iter()
            .filter_map(|b| serde_json::to_value(b).ok())
            .collect();
        self.counters.sync_responses_sent += 1;
        info!(
            to = request.peer_id.as_deref().unwrap_or("unknown"),
            after = request.last_index,
            count = blocks.len(),
            "answering sync request"
        );
        self.broadcast(Message::SyncResponse(SyncResponse {
            peer_id: Some(self.config.peer_id.clone()),
            blocks,
        }));
    }

    fn handle_sync_response(&mut self, response: SyncResponse) {
        if response.peer_id.as_deref() == Some(self.config.peer_id.as_str()) {
            return;
        }
        let mut accepted = Vec::with_capacity(response.blocks.len());
        for value in &response.blocks {
            match self.admit(value) {
                Ok(block) => accepted.push(block),
                Err(e) => {
                    self.counters.blocks_rejected += 1;
                    debug!(error = %e, "rejected synced block");
                }
            }
        }

        let added = self.ledger.extend_new(accepted);
        if added == 0 {
            return;
        }
        info!(
            added,
            from = response.peer_id.as_deref().unwrap_or("unknown"),
            last_index = self.ledger.last_index(),
            "synced blocks"
        );
        self.persist_blocks();
        self.audit();
        self.check_head();
    }

    fn handle_new_block(&mut self, value: &Value) {
        let block = match Block::from_json(value) {
            Ok(block) => block,
            Err(e) => {
                self.counters.blocks_rejected += 1;
                debug!(error = %e, "rejected block");
                return;
            }
        };
        if self.ledger.contains(block.index, &block.current_hash) {
            return;
        }

        // Alarms are reported only; storage follows the ingest policy, as
        // for sync-response.
        self.check_head();
        if let Some(alarm) = self.monitor.observe_peer_head(None, &block) {
            error!(%alarm, index = block.index, "downgrade alarm");
        }
        if let Err(e) = self.config.ingest_policy.admit(&block) {
            self.counters.blocks_rejected += 1;
            debug!(error = %e, "rejected block");
            return;
        }

        let index = block.index;
        let short = block.short_hash().to_string();
        if self.ledger.append_if_new(block) {
            debug!(index, hash = %short, "stored block");
            self.persist_blocks();
        }
    }

    fn handle_new_event(&mut self, value: &Value) {
        let event = match SignedEvent::from_json(value) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "ignoring event");
                return;
            }
        };
        let id = event.short_id().to_string();
        if self.events.insert_if_new(event) {
            debug!(id = %id, "stored event");
            self.persist_events();
        }
    }

    fn handle_new_poll(&mut self, value: Value) {
        self.counters.polls_seen += 1;
        let Some(store) = self.content.as_ref() else {
            return;
        };
        let Some(id) = value.get("id").and_then(Value::as_str).map(str::to_string) else {
            return;
        };
        if let Err(e) = store.put(&format!("polls/{id}"), value) {
            warn!(error = %e, poll = %id, "could not mirror poll");
        }
    }

    fn admit(&self, value: &Value) -> LedgerResult<Block> {
        let block = Block::from_json(value)?;
        self.config.ingest_policy.admit(&block)?;
        Ok(block)
    }

    // --- local production --------------------------------------------------

    /// Stores a locally produced block, persists, then broadcasts it.
    ///
    /// Returns false if the block was already held.
    ///
    /// # Errors
    ///
    /// Returns an error if the block's hash does not match its fields.
    pub fn publish_block(&mut self, block: Block) -> SyncResult<bool> {
        block.verify_hash()?;
        let value = serde_json::to_value(&block).map_err(ledgerlink_ledger::LedgerError::from)?;
        if !self.ledger.append_if_new(block) {
            return Ok(false);
        }
        self.persist_blocks();
        self.check_head();
        self.broadcast(Message::NewBlock(value));
        Ok(true)
    }

    /// Stores a locally produced event, persists, then broadcasts it.
    ///
    /// Returns false if the event was already held.
    pub fn publish_event(&mut self, event: SignedEvent) -> SyncResult<bool> {
        let value = serde_json::to_value(&event).map_err(ledgerlink_ledger::LedgerError::from)?;
        if !self.events.insert_if_new(event) {
            return Ok(false);
        }
        self.persist_events();
        self.broadcast(Message::NewEvent(value));
        Ok(true)
    }

    /// Adds entries seen by a replicated store sweep to the counters.
    pub fn record_store_updates(&mut self, count: u64) {
        self.counters.store_updates += count;
    }

    // --- monitoring -------------------------------------------------------

    /// Runs the downgrade monitor against the local head.
    pub fn check_head(&mut self) {
        if let Some(alarm) = self.monitor.tick(&self.ledger) {
            error!(%alarm, "downgrade alarm");
        }
    }

    /// Scans the held chain and logs the first broken link.
    pub fn audit(&self) -> Option<usize> {
        let position = self.ledger.audit()?;
        let index = self.ledger.blocks().get(position).map(|b| b.index);
        warn!(position, index, "ledger linkage broken");
        Some(position)
    }

    /// Status snapshot.
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            peer_id: self.config.peer_id.clone(),
            relay_url: self.config.relay_url.clone(),
            connection: self.connection.state().as_str().to_string(),
            connected: self.connection.is_open(),
            relay_peers: self.relay_peers.len(),
            known_peers: self.peers.len(),
            blocks: self.ledger.len(),
            last_index: self.ledger.last_index(),
            events: self.events.len(),
            known_servers: self.directory.len(),
            polls_seen: self.counters.polls_seen,
            sync_requests: self.counters.sync_requests,
            sync_responses_sent: self.counters.sync_responses_sent,
            messages_in: self.counters.messages_in,
            blocks_rejected: self.counters.blocks_rejected,
            store_updates: self.counters.store_updates,
            alarms: self.monitor.total_alarms(),
            queued: self.connection.queued(),
            started_at: self.started_at,
        }
    }

    // --- persistence --------------------------------------------------------

    fn persist_blocks(&mut self) {
        if let Err(e) = self.stores.blocks.save(self.ledger.blocks()) {
            warn!(location = %self.stores.blocks.describe(), error = %e, "could not persist blocks");
        }
    }

    fn persist_events(&mut self) {
        if let Err(e) = self.stores.events.save(&self.events.events()) {
            warn!(location = %self.stores.events.describe(), error = %e, "could not persist events");
        }
    }

    fn persist_servers(&mut self) {
        if let Err(e) = self.stores.servers.save(self.directory.records()) {
            warn!(location = %self.stores.servers.describe(), error = %e, "could not persist servers");
        }
    }

    /// Writes all three documents.
    ///
    /// Every document is attempted even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn flush(&mut self) -> SyncResult<()> {
        let results = [
            self.stores.blocks.save(self.ledger.blocks()),
            self.stores.events.save(&self.events.events()),
            self.stores.servers.save(self.directory.records()),
        ];
        match results.into_iter().find_map(Result::err) {
            Some(e) => Err(SyncError::Storage(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(peer_id: &str) -> Node {
        Node::open(
            NodeConfig::new(peer_id).with_relay_url(format!("ws://{peer_id}")),
            NodeStores::in_memory(),
        )
    }

    fn chain(n: usize) -> Vec<Block> {
        let mut blocks = vec![Block::genesis(0, "v0", "s0")];
        for i in 1..n {
            let next = blocks[i - 1].next(i as i64, format!("v{i}"), format!("s{i}"));
            blocks.push(next);
        }
        blocks
    }

    fn kinds(frames: &[Outbound]) -> Vec<&'static str> {
        frames.iter().map(Outbound::label).collect()
    }

    fn frame(kind: &str, data: Value) -> String {
        json!({"type": kind, "data": data, "timestamp": 1}).to_string()
    }

    #[test]
    fn handshake_sequence() {
        let mut node = node("a");
        node.begin_connect();
        node.on_open();
        assert_eq!(node.connection_state(), ConnectionState::Handshaking);
        assert_eq!(
            kinds(&node.drain_outgoing()),
            vec!["register", "join-room", "peer-addresses", "server-list"]
        );
        assert!(node.directory().contains("ws://a"));

        node.complete_handshake();
        assert_eq!(node.connection_state(), ConnectionState::Synced);
        let frames = node.drain_outgoing();
        let Outbound::Broadcast(envelope) = &frames[0] else {
            panic!("expected broadcast");
        };
        assert_eq!(
            envelope.message,
            Message::RequestSync(RequestSync {
                peer_id: Some("a".into()),
                last_index: -1
            })
        );
    }

    #[test]
    fn offline_broadcasts_replay_after_join() {
        let mut node = node("a");
        let blocks = chain(2);
        node.publish_block(blocks[0].clone()).unwrap();
        node.publish_block(blocks[1].clone()).unwrap();
        assert_eq!(node.queued(), 2);
        assert!(node.drain_outgoing().is_empty());

        node.on_open();
        let frames = node.drain_outgoing();
        assert_eq!(
            kinds(&frames),
            vec!["register", "join-room", "new-block", "new-block", "peer-addresses", "server-list"]
        );
        let Outbound::Broadcast(first) = &frames[2] else {
            panic!("expected broadcast");
        };
        assert_eq!(first.message, Message::NewBlock(serde_json::to_value(&blocks[0]).unwrap()));
    }

    #[test]
    fn keepalive_only_when_connected() {
        let mut node = node("a");
        node.keepalive();
        assert!(node.drain_outgoing().is_empty());

        node.on_open();
        node.drain_outgoing();
        node.keepalive();
        assert_eq!(node.drain_outgoing(), vec![Outbound::Ping]);
    }

    #[test]
    fn request_sync_answers_missing_suffix() {
        let mut node = node("a");
        for block in chain(5) {
            node.publish_block(block).unwrap();
        }
        node.on_open();
        node.drain_outgoing();

        node.handle_frame(&frame("request-sync", json!({"peerId": "b", "lastIndex": 2})));
        let frames = node.drain_outgoing();
        assert_eq!(frames.len(), 1);
        let Outbound::Broadcast(envelope) = &frames[0] else {
            panic!("expected broadcast");
        };
        let Message::SyncResponse(response) = &envelope.message else {
            panic!("expected sync-response");
        };
        let indices: Vec<u64> = response.blocks.iter().map(|b| b["index"].as_u64().unwrap()).collect();
        assert_eq!(indices, vec![3, 4]);

        // Already up to date: no reply at all.
        node.handle_frame(&frame("request-sync", json!({"peerId": "b", "lastIndex": 4})));
        assert!(node.drain_outgoing().is_empty());
        assert_eq!(node.stats().sync_requests, 2);
        assert_eq!(node.stats().sync_responses_sent, 1);
    }

    #[test]
    fn sync_response_rejects_bad_hashes() {
        let mut node = node("b");
        let blocks = chain(3);
        let mut values: Vec<Value> = blocks.iter().map(|b| serde_json::to_value(b).unwrap()).collect();
        values[1]["voteHash"] = json!("tampered");
        values.push(json!({"index": "x"}));

        node.handle_frame(&frame("sync-response", json!({"peerId": "a", "blocks": values})));
        assert_eq!(node.ledger().len(), 2);
        assert_eq!(node.stats().blocks_rejected, 2);
    }

    #[test]
    fn accept_all_policy_stores_then_audits() {
        let mut node = Node::open(
            NodeConfig::new("b").with_ingest_policy(crate::config::IngestPolicy::AcceptAll),
            NodeStores::in_memory(),
        );
        let blocks = chain(3);
        let mut values: Vec<Value> = blocks.iter().map(|b| serde_json::to_value(b).unwrap()).collect();
        values[1]["voteHash"] = json!("tampered");

        node.handle_frame(&frame("sync-response", json!({"peerId": "a", "blocks": values})));
        assert_eq!(node.ledger().len(), 3);
        assert_eq!(node.audit(), Some(1));
    }

    #[test]
    fn new_block_and_event_dedup() {
        let mut node = node("a");
        let block = serde_json::to_value(Block::genesis(1, "v", "s")).unwrap();
        node.handle_frame(&frame("new-block", block.clone()));
        node.handle_frame(&frame("new-block", block));
        assert_eq!(node.ledger().len(), 1);

        let event = json!({"id": "e1", "kind": 1, "content": "hi"});
        node.handle_frame(&frame("new-event", event.clone()));
        node.handle_frame(&frame("new-event", event));
        node.handle_frame(&frame("new-event", json!({"kind": 1})));
        assert_eq!(node.events().len(), 1);
        assert_eq!(node.stats().messages_in, 5);
    }

    #[test]
    fn forged_stale_head_raises_alarm() {
        let mut node = node("a");
        let blocks = chain(10);
        for block in &blocks {
            node.publish_block(block.clone()).unwrap();
        }

        let mut forged = serde_json::to_value(&blocks[5]).unwrap();
        forged["voteHash"] = json!("rewritten");
        forged["currentHash"] = json!("f".repeat(64));
        node.handle_frame(&frame("new-block", forged));

        assert_eq!(node.ledger().last_index(), 9);
        assert_eq!(node.ledger().len(), 10);
        assert_eq!(node.monitor().total_alarms(), 1);
    }

    #[test]
    fn stale_fork_alarms_but_is_stored_like_synced_blocks() {
        let blocks = chain(10);
        let fork = Block::new(5, 42, blocks[4].current_hash.clone(), "fork-vote", "fork-sig");
        let fork_value = serde_json::to_value(&fork).unwrap();

        let mut gossiped = node("a");
        let mut synced = node("b");
        for block in &blocks {
            gossiped.publish_block(block.clone()).unwrap();
            synced.publish_block(block.clone()).unwrap();
        }

        gossiped.handle_frame(&frame("new-block", fork_value.clone()));
        synced.handle_frame(&frame(
            "sync-response",
            json!({"peerId": "c", "blocks": [fork_value]}),
        ));

        assert_eq!(gossiped.ledger().blocks(), synced.ledger().blocks());
        assert_eq!(gossiped.ledger().len(), 11);
        assert!(gossiped.ledger().contains(5, &fork.current_hash));
        assert_eq!(gossiped.ledger().last_index(), 9);
        assert!(matches!(
            gossiped.monitor().alarms()[0],
            crate::monitor::DowngradeAlarm::StaleHead { .. }
        ));
        assert_eq!(gossiped.stats().blocks_rejected, 0);
    }

    #[test]
    fn new_event_with_symbolic_kind_is_stored() {
        let mut node = node("a");
        node.handle_frame(&frame("new-event", json!({"id": "e1", "kind": "vote", "poll": "p1"})));
        assert_eq!(node.events().len(), 1);
        assert_eq!(node.events().events()[0].payload["poll"], "p1");
    }

    #[test]
    fn server_list_and_peer_bookkeeping() {
        let mut node = node("a");
        node.on_open();
        node.handle_frame(&frame(
            "server-list",
            json!({"peerId": "b", "servers": [{"websocket": "ws://b", "gun": "g", "api": "x"}]}),
        ));
        assert_eq!(node.directory().get("ws://b").unwrap().added_by, "b");

        node.handle_frame(&frame("peer-addresses", json!({"peerId": "a"})));
        node.handle_frame(&frame("peer-addresses", json!({"peerId": "b", "relayUrl": "ws://b"})));
        assert_eq!(node.peers().len(), 1);

        node.handle_frame(r#"{"type":"peer-list","peers":["a","b","c"]}"#);
        assert_eq!(node.relay_peers(), &["b".to_string(), "c".to_string()]);

        node.handle_frame(r#"{"type":"peer-left","peerId":"b"}"#);
        assert!(node.peers().is_empty());
        assert_eq!(node.relay_peers(), &["c".to_string()]);

        node.on_close();
        assert!(node.relay_peers().is_empty());
        assert_eq!(node.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn junk_frames_are_ignored() {
        let mut node = node("a");
        node.handle_frame("not json");
        node.handle_frame(r#"{"type":"mystery","data":{}}"#);
        node.handle_frame(r#"{"type":"pong"}"#);
        assert_eq!(node.stats().messages_in, 0);
    }

    #[test]
    fn persistence_failure_is_not_fatal() {
        let blocks_doc = InMemoryDocument::new();
        blocks_doc.set_read_only(true);
        let mut node = Node::open(
            NodeConfig::new("a"),
            NodeStores::from_documents(blocks_doc, InMemoryDocument::new(), InMemoryDocument::new()),
        );

        assert!(node.publish_block(Block::genesis(0, "v", "s")).unwrap());
        assert_eq!(node.ledger().len(), 1);
        assert!(node.flush().is_err());
    }

    #[test]
    fn state_reloads_from_stores() {
        let blocks_doc = InMemoryDocument::new();
        let events_doc = InMemoryDocument::new();
        let servers_doc = InMemoryDocument::new();

        let mut node = Node::open(
            NodeConfig::new("a"),
            NodeStores::from_documents(blocks_doc.clone(), events_doc.clone(), servers_doc.clone()),
        );
        for block in chain(3) {
            node.publish_block(block).unwrap();
        }
        node.publish_event(SignedEvent::from_json(&json!({"id": "e", "kind": 7})).unwrap())
            .unwrap();
        node.on_open();
        node.flush().unwrap();

        let reopened = Node::open(
            NodeConfig::new("a"),
            NodeStores::from_documents(blocks_doc, events_doc, servers_doc),
        );
        assert_eq!(reopened.ledger().len(), 3);
        assert_eq!(reopened.events().len(), 1);
        assert_eq!(reopened.directory().len(), 1);
    }
}
