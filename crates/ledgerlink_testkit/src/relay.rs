//! In-process loopback relay.
//!
//! Connects several [`Node`]s without sockets: frames a node queues are
//! drained, interpreted the way a relay would, and delivered as text to the
//! other nodes in the same room.

use ledgerlink_sync_engine::{now_millis, Node};
use ledgerlink_sync_protocol::{Envelope, Message, Outbound};
use serde_json::json;
use std::collections::VecDeque;

/// One delivered frame: `(recipient, sender, text)`.
pub type Delivery = (usize, usize, String);

struct Slot {
    node: Node,
    connected: bool,
    room: Option<String>,
}

/// A relay fanning broadcasts out between in-process nodes.
#[derive(Default)]
pub struct LoopbackRelay {
    slots: Vec<Slot>,
    history: Vec<Delivery>,
}

impl LoopbackRelay {
    /// Creates an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a disconnected node and returns its slot id.
    pub fn add(&mut self, node: Node) -> usize {
        self.slots.push(Slot {
            node,
            connected: false,
            room: None,
        });
        self.slots.len() - 1
    }

    /// Borrows a node.
    pub fn node(&self, id: usize) -> &Node {
        &self.slots[id].node
    }

    /// Mutably borrows a node, e.g. to publish. Call [`LoopbackRelay::pump`]
    /// afterwards to deliver what it queued.
    pub fn node_mut(&mut self, id: usize) -> &mut Node {
        &mut self.slots[id].node
    }

    /// Opens a node's connection and delivers its handshake.
    pub fn connect(&mut self, id: usize) {
        let slot = &mut self.slots[id];
        slot.connected = true;
        slot.node.begin_connect();
        slot.node.on_open();
        self.pump();
    }

    /// Connects a node and immediately finishes its handshake.
    pub fn connect_and_sync(&mut self, id: usize) {
        self.connect(id);
        self.slots[id].node.complete_handshake();
        self.pump();
    }

    /// Drops a node's connection and tells the room it left.
    pub fn disconnect(&mut self, id: usize) {
        let slot = &mut self.slots[id];
        if !slot.connected {
            return;
        }
        slot.connected = false;
        let room = slot.room.take();
        slot.node.on_close();

        let left = json!({"type": "peer-left", "peerId": self.slots[id].node.peer_id()}).to_string();
        let mut queue = VecDeque::new();
        for other in self.members(room.as_deref(), id) {
            queue.push_back((other, id, left.clone()));
        }
        self.deliver(queue);
    }

    /// Delivers frames until no node has anything left to send.
    pub fn pump(&mut self) {
        loop {
            let mut queue = VecDeque::new();
            for id in 0..self.slots.len() {
                let frames = self.slots[id].node.drain_outgoing();
                for outbound in frames {
                    self.route(id, outbound, &mut queue);
                }
            }
            if queue.is_empty() {
                return;
            }
            self.deliver(queue);
        }
    }

    /// Broadcasts a message on behalf of a node, bypassing its handlers.
    ///
    /// Lets a test play a misbehaving peer.
    pub fn broadcast_from(&mut self, from: usize, message: Message) {
        let mut queue = VecDeque::new();
        let outbound = Outbound::Broadcast(Envelope::new(message, now_millis()));
        self.route(from, outbound, &mut queue);
        self.deliver(queue);
        self.pump();
    }

    /// Delivers a frame to one node again, as a relay might on a retry.
    pub fn redeliver(&mut self, delivery: &Delivery) {
        let (to, from, text) = delivery.clone();
        self.deliver(VecDeque::from([(to, from, text)]));
        self.pump();
    }

    /// Every frame delivered so far.
    pub fn history(&self) -> &[Delivery] {
        &self.history
    }

    /// Delivered frames of one message type.
    pub fn delivered(&self, kind: &str) -> Vec<Delivery> {
        let tag = format!("\"type\":\"{kind}\"");
        self.history
            .iter()
            .filter(|(_, _, text)| text.contains(&tag))
            .cloned()
            .collect()
    }

    fn members(&self, room: Option<&str>, except: usize) -> Vec<usize> {
        let Some(room) = room else {
            return Vec::new();
        };
        (0..self.slots.len())
            .filter(|&i| i != except)
            .filter(|&i| self.slots[i].connected && self.slots[i].room.as_deref() == Some(room))
            .collect()
    }

    fn route(&mut self, from: usize, outbound: Outbound, queue: &mut VecDeque<Delivery>) {
        match outbound {
            Outbound::Register { .. } => {
                queue.push_back((from, from, json!({"type": "welcome"}).to_string()));
            }
            Outbound::JoinRoom { room_id } => {
                self.slots[from].room = Some(room_id.clone());
                let peers: Vec<String> = (0..self.slots.len())
                    .filter(|&i| self.slots[i].room.as_deref() == Some(room_id.as_str()))
                    .map(|i| self.slots[i].node.peer_id().to_string())
                    .collect();
                let list = json!({"type": "peer-list", "peers": peers}).to_string();
                queue.push_back((from, from, list.clone()));
                for other in self.members(Some(&room_id), from) {
                    queue.push_back((other, from, list.clone()));
                }
            }
            Outbound::Ping => {
                queue.push_back((from, from, json!({"type": "pong"}).to_string()));
            }
            Outbound::Broadcast(envelope) => {
                let Ok(value) = envelope.to_value() else {
                    return;
                };
                let text = value.to_string();
                let room = self.slots[from].room.clone();
                for other in self.members(room.as_deref(), from) {
                    queue.push_back((other, from, text.clone()));
                }
            }
        }
    }

    fn deliver(&mut self, mut queue: VecDeque<Delivery>) {
        while let Some((to, from, text)) = queue.pop_front() {
            if !self.slots[to].connected {
                continue;
            }
            self.slots[to].node.handle_frame(&text);
            self.history.push((to, from, text));
        }
    }
}
