//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to write at an offset that would leave a hole.
    #[error("write beyond end of storage: offset {offset}, size {size}")]
    WritePastEnd {
        /// The requested write offset.
        offset: u64,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to grow the storage through `truncate`.
    #[error("cannot truncate to size {requested} which is greater than current size {size}")]
    TruncateBeyondEnd {
        /// The requested new size.
        requested: u64,
        /// The current storage size.
        size: u64,
    },
}

impl StorageError {
    /// Returns `true` when the error reports a read that ran past the end of
    /// the store, i.e. the data was never (fully) written.
    #[must_use]
    pub fn is_short_read(&self) -> bool {
        match self {
            Self::ReadPastEnd { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
