//! In-memory document backend for testing.

use crate::backend::DocumentBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory document backend.
///
/// Clones share the same underlying document, so a test can keep one
/// handle to inspect what a node persisted through another.
///
/// # Example
///
/// ```rust
/// use ledgerlink_storage::{DocumentBackend, InMemoryDocument};
///
/// let mut doc = InMemoryDocument::new();
/// let observer = doc.clone();
/// doc.write(b"[]").unwrap();
/// assert_eq!(observer.data().unwrap(), b"[]");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    data: Option<Vec<u8>>,
    writes: u64,
    read_only: bool,
}

impl InMemoryDocument {
    /// Creates a new empty in-memory document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document with pre-existing contents.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        let doc = Self::default();
        doc.inner.write().data = Some(data);
        doc
    }

    /// Returns a copy of the current document.
    #[must_use]
    pub fn data(&self) -> Option<Vec<u8>> {
        self.inner.read().data.clone()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.read().writes
    }

    /// Makes every subsequent write fail with [`StorageError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.inner.write().read_only = read_only;
    }
}

impl DocumentBackend for InMemoryDocument {
    fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.read().data.clone())
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut inner = self.inner.write();
        if inner.read_only {
            return Err(StorageError::ReadOnly);
        }
        inner.data = Some(data.to_vec());
        inner.writes += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
