//! # LedgerLink Storage
//!
//! Whole-document storage backends and data directory management.
//!
//! Every persisted collection (blocks, signed events, known servers) is a
//! single JSON document that is rewritten in full on every save. There is
//! no incremental append.
//!
//! ## Design Principles
//!
//! - Backends are opaque document stores (read whole, write whole)
//! - [`JsonStore`] owns the JSON encoding, backends never interpret bytes
//! - A [`DataDir`] holds an advisory lock so two peers cannot share it
//!
//! ## Available Backends
//!
//! - [`InMemoryDocument`] - For testing and ephemeral nodes
//! - [`FileDocument`] - Persistent, atomic write-then-rename
//!
//! ## Example
//!
//! ```rust
//! use ledgerlink_storage::{InMemoryDocument, JsonStore};
//!
//! let mut store: JsonStore<u32> = JsonStore::new(Box::new(InMemoryDocument::new()));
//! store.save(&[1, 2, 3]).unwrap();
//! assert_eq!(store.load().unwrap(), vec![1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod dir;
mod error;
mod file;
mod json;
mod memory;

pub use backend::DocumentBackend;
pub use dir::{DataDir, BLOCKS_FILE, EVENTS_FILE, SERVERS_FILE};
pub use error::{StorageError, StorageResult};
pub use file::FileDocument;
pub use json::JsonStore;
pub use memory::InMemoryDocument;
