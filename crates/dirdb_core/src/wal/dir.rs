//! On-disk log directory.
//!
//! ```text
//! <log_dir>/
//! ├─ LOCK          # Advisory lock for single-writer
//! ├─ log_0.log     # Segment 0
//! ├─ log_1.log     # Segment 1, created on rollover
//! └─ ...
//! ```

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::wal::provider::LogFileProvider;
use dirdb_storage::{FileBackend, StorageBackend, StorageError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const SEGMENT_PREFIX: &str = "log_";
const SEGMENT_SUFFIX: &str = ".log";

/// A directory of numbered log segments, held under an exclusive lock.
///
/// Only one `LogDir` can be open per directory at a time; the lock is
/// released when the value is dropped.
#[derive(Debug)]
pub struct LogDir {
    path: PathBuf,
    _lock_file: File,
}

impl LogDir {
    /// Opens or creates a log directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `config.create_if_missing` is false
    /// - Another process holds the lock (returns `LogDirLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_operation(format!(
                    "log directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "path is not a directory: {}",
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
            return Err(CoreError::LogDirLocked);
        }

        debug!(path = %path.display(), "log directory opened");
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

    /// Returns the path of segment `file_number`.
    #[must_use]
    pub fn segment_path(&self, file_number: u64) -> PathBuf {
        self.path
            .join(format!("{SEGMENT_PREFIX}{file_number}{SEGMENT_SUFFIX}"))
    }

    /// Syncs the directory so segment creation and removal are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

impl LogFileProvider for LogDir {
    fn open(&self, file_number: u64) -> CoreResult<Option<Box<dyn StorageBackend>>> {
        match FileBackend::open_existing(&self.segment_path(file_number)) {
            Ok(backend) => Ok(Some(Box::new(backend))),
            Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create(&self, file_number: u64) -> CoreResult<Box<dyn StorageBackend>> {
        let mut backend = FileBackend::open(&self.segment_path(file_number))?;
        if backend.size()? > 0 {
            backend.truncate(0)?;
        }
        self.sync_directory()?;
        debug!(file_number, "log segment created");
        Ok(Box::new(backend))
    }

    fn remove(&self, file_number: u64) -> CoreResult<()> {
        match fs::remove_file(self.segment_path(file_number)) {
            Ok(()) => {
                self.sync_directory()?;
                debug!(file_number, "log segment removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn file_numbers(&self) -> CoreResult<Vec<u64>> {
        let mut numbers = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if let Some(number) = entry.file_name().to_str().and_then(parse_segment_name) {
                numbers.push(number);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }
}
