//! # LedgerLink Testkit
//!
//! Test utilities for LedgerLink.
//!
//! This crate provides:
//! - Node fixtures, in memory or over a temporary data directory
//! - Chain builders and proptest generators
//! - An in-process loopback relay for multi-node scenarios
//! - Fuzz testing harnesses
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledgerlink_testkit::prelude::*;
//!
//! #[test]
//! fn two_nodes_sync() {
//!     let mut relay = LoopbackRelay::new();
//!     let a = relay.add(seeded_node(test_config("a"), &valid_chain(5)));
//!     let b = relay.add(memory_node("b"));
//!     relay.connect_and_sync(a);
//!     relay.connect_and_sync(b);
//!     assert_eq!(relay.node(b).ledger().len(), 5);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod relay;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::relay::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use relay::*;
