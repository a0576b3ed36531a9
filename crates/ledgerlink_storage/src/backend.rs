//! Document backend trait definition.

use crate::error::StorageResult;

/// A whole-document storage backend.
///
/// Backends store exactly one opaque document. Callers read it back in
/// full and replace it in full; there are no partial writes.
///
/// # Invariants
///
/// - `read` returns `None` until the first successful `write`
/// - `read` after `write(data)` returns exactly `data`
/// - A failed `write` leaves the previous document intact
pub trait DocumentBackend: Send {
    /// Reads the whole document.
    ///
    /// Returns `Ok(None)` if nothing has been written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the whole document with `data`.
    ///
    /// After this returns successfully the new document survives process
    /// termination (for persistent backends).
    ///
    /// # Errors
    ///
    /// Returns an error if the document could not be written.
    fn write(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Short human-readable location, used in log lines.
    fn describe(&self) -> String;
}
