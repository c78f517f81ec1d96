//! The byte-store abstraction.

use crate::error::StorageResult;

/// A growable array of bytes with positional reads and writes.
///
/// Offsets are absolute. Writes may overwrite or extend the store but never
/// leave a gap. A read that runs past the end fails as a short read (see
/// [`StorageError::is_short_read`]), which format parsers treat as a torn
/// tail rather than an I/O failure.
///
/// [`StorageError::is_short_read`]: crate::StorageError::is_short_read
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd) if
    /// the range is not fully inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`, extending the store if the write runs past
    /// its end.
    ///
    /// # Errors
    ///
    /// [`StorageError::WritePastEnd`](crate::StorageError::WritePastEnd) if
    /// `offset` is beyond the end, or an I/O error.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Writes `data` at the end and returns the offset it landed at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the size in bytes; the next `append` lands here.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the store back to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// [`StorageError::TruncateBeyondEnd`](crate::StorageError::TruncateBeyondEnd)
    /// if `new_size` exceeds the current size, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
