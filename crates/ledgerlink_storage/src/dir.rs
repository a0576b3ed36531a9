//! Peer data directory management.
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                 # Advisory lock, one peer per directory
//! ├─ blocks.json          # Ledger blocks
//! ├─ events.json          # Signed events
//! └─ known-servers.json   # Server directory
//! ```

use crate::error::{StorageError, StorageResult};
use crate::file::FileDocument;
use crate::json::JsonStore;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
/// File name of the blocks document.
pub const BLOCKS_FILE: &str = "blocks.json";
/// File name of the signed events document.
pub const EVENTS_FILE: &str = "events.json";
/// File name of the known servers document.
pub const SERVERS_FILE: &str = "known-servers.json";

/// A peer's data directory, held under an exclusive advisory lock.
///
/// The lock is released when the `DataDir` is dropped.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens or creates a data directory.
    ///
    /// Missing directories are created recursively when `create_if_missing`
    /// is set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path is not a directory
    /// - Another process holds the lock ([`StorageError::Locked`])
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::InvalidDirectory(format!(
                    "does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::InvalidDirectory(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of a document inside this directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Opens a typed JSON store for the named document.
    pub fn json_store<T>(&self, name: &str) -> JsonStore<T>
    where
        T: Serialize + DeserializeOwned,
    {
        JsonStore::new(Box::new(FileDocument::new(&self.file_path(name))))
    }
}
