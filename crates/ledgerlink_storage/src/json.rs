//! Typed JSON array documents on top of a [`DocumentBackend`].

use crate::backend::DocumentBackend;
use crate::error::StorageResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::warn;

/// A persisted JSON array of `T`.
///
/// Each save rewrites the whole document, pretty-printed.
pub struct JsonStore<T> {
    backend: Box<dyn DocumentBackend>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Wraps a backend.
    pub fn new(backend: Box<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            _marker: PhantomData,
        }
    }

    /// Loads all items.
    ///
    /// A missing or blank document is an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or is not a JSON
    /// array of `T`.
    pub fn load(&self) -> StorageResult<Vec<T>> {
        let Some(bytes) = self.backend.read()? else {
            return Ok(Vec::new());
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads all items, falling back to an empty list on any error.
    pub fn load_or_default(&self) -> Vec<T> {
        match self.load() {
            Ok(items) => items,
            Err(e) => {
                warn!(location = %self.backend.describe(), error = %e, "unreadable store, starting empty");
                Vec::new()
            }
        }
    }

    /// Replaces the stored document with `items`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails. The
    /// previous document is left intact in that case.
    pub fn save(&mut self, items: &[T]) -> StorageResult<()> {
        let data = serde_json::to_vec_pretty(items)?;
        self.backend.write(&data)
    }

    /// Location of the underlying document, for logging.
    pub fn describe(&self) -> String {
        self.backend.describe()
    }
}
