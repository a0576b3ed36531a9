//! # LedgerLink Ledger
//!
//! The tamper-evident, append-only block ledger.
//!
//! This crate provides:
//! - [`Block`] and the versioned [`HashScheme`] every node must agree on
//! - Structural and linkage validation, plus a single-pass chain scan
//! - [`Ledger`], the capacity-bounded, index-ordered block set
//! - [`EventLog`], the capacity-bounded signed event set
//!
//! This is a pure data crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - Blocks are deduplicated by `(index, currentHash)`
//! - Held blocks are always sorted ascending by `index`
//! - Eviction removes the lowest indices first
//! - Accepted blocks are never edited

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod block;
mod error;
mod event;
mod ledger;
mod validation;

pub use block::{Block, HashScheme};
pub use error::{LedgerError, LedgerResult};
pub use event::{EventLog, SignedEvent, DEFAULT_MAX_EVENTS};
pub use ledger::{ChainHead, Ledger, DEFAULT_MAX_BLOCKS};
pub use validation::{
    scan_for_first_invalid, validate_hash, validate_linkage, validate_structure,
};
