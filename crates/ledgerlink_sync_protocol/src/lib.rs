//! # LedgerLink Sync Protocol
//!
//! Wire types for talking to a relay and, through it, to every other peer
//! in the same room.
//!
//! This crate provides:
//! - [`Message`], the closed set of application messages
//! - [`RelayControl`], relay-originated session bookkeeping
//! - [`Outbound`], every frame a peer sends
//! - [`ServerRecord`] and [`PeerAddress`] discovery records
//! - JSON text frame encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Frames
//!
//! Every application message travels as `{type, data, timestamp}`. A peer
//! hands it to the relay wrapped in `{"type": "broadcast", "data": ...}`
//! and the relay fans the inner envelope out to the room.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod records;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode_frame, Envelope, Inbound, Message, Outbound, RelayControl, RequestSync, ServerList,
    SyncResponse, DEFAULT_ROOM,
};
pub use records::{PeerAddress, ServerRecord};
