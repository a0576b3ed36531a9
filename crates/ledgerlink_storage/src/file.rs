//! File-based document backend.

use crate::backend::DocumentBackend;
use crate::error::StorageResult;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A file-based document backend.
///
/// The document lives in a single file. Writes go to a sibling temporary
/// file which is synced and then renamed over the target, so a crash
/// mid-write never leaves a truncated document behind.
///
/// # Example
///
/// ```no_run
/// use ledgerlink_storage::{DocumentBackend, FileDocument};
/// use std::path::Path;
///
/// let mut doc = FileDocument::new(Path::new("blocks.json"));
/// doc.write(b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileDocument {
    path: PathBuf,
    temp_path: PathBuf,
}

impl FileDocument {
    /// Creates a backend for the document at `path`.
    ///
    /// Nothing is touched on disk until the first write.
    pub fn new(path: &Path) -> Self {
        let mut temp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        temp_name.push(".tmp");
        Self {
            path: path.to_path_buf(),
            temp_path: path.with_file_name(temp_name),
        }
    }

    /// Creates a backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directories cannot be created.
    pub fn with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self::new(path))
    }

    /// Returns the path to the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentBackend for FileDocument {
    fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        let mut file = File::create(&self.temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
