//! # LedgerLink Sync Engine
//!
//! Keeps ledger replicas consistent across peers that can only reach each
//! other through a broadcast relay.
//!
//! This crate provides:
//! - [`Node`], the single owner of a replica's ledger, events, Server
//!   Directory and connection state
//! - [`ConnectionManager`] state machine with capped exponential backoff
//!   and an offline queue
//! - [`ServerDirectory`], the deduplicated registry of known relays
//! - [`DowngradeMonitor`], which flags stale, conflicting and forged heads
//! - [`ReplicatedStore`] plus the deadline-then-live-tail read primitives
//! - [`RelayDriver`], the WebSocket event loop
//!
//! ## Architecture
//!
//! Sync is push-based gossip:
//! 1. On connect a node registers, joins its room and advertises itself
//! 2. It asks the room for every block after its head (`request-sync`)
//! 3. Any peer holding more answers with the missing suffix
//!    (`sync-response`), visible to the whole room
//! 4. New blocks and events are broadcast as they are produced
//!
//! ## Key Invariants
//!
//! - State is persisted before the matching broadcast is written
//! - Blocks are deduplicated by `(index, current_hash)`
//! - Reconnects retry forever; only one retry timer is ever pending
//! - The downgrade monitor never mutates the ledger

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod directory;
mod driver;
mod error;
mod monitor;
mod node;
pub mod store;

pub use config::{
    IngestPolicy, NodeConfig, RetryConfig, DEFAULT_API_URL, DEFAULT_RELAY_URL, DEFAULT_STORE_URL,
};
pub use connection::{ConnectionManager, ConnectionState, ReconnectTimer};
pub use directory::ServerDirectory;
pub use driver::{NodeCommand, NodeHandle, RelayDriver};
pub use error::{SyncError, SyncResult};
pub use monitor::{DowngradeAlarm, DowngradeMonitor};
pub use node::{now_millis, Node, NodeStats, NodeStores};
pub use store::{MemoryStore, ReplicatedStore, Subscription};
