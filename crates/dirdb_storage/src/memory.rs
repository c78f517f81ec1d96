//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Sharing
///
/// Cloning an `InMemoryBackend` yields a second handle onto the **same**
/// buffer. This lets an in-memory log provider hand a segment to a writer and
/// later to a scanner, the way two handles onto one file would behave.
///
/// # Example
///
/// ```rust
/// use dirdb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let reader = backend.clone();
/// let offset = backend.append(b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(reader.size().unwrap(), 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let offset_usize = offset as usize;
        let end = offset_usize.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset_usize..end].to_vec())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;

        if offset > size {
            return Err(StorageError::WritePastEnd { offset, size });
        }

        let start = offset as usize;
        let end = start + bytes.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // In-memory backend has no pending writes
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let current_size = data.len() as u64;

        if new_size > current_size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: current_size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_report_their_offsets() {
        let mut segment = InMemoryBackend::new();
        assert_eq!(segment.size().unwrap(), 0);

        assert_eq!(segment.append(b"header").unwrap(), 0);
        assert_eq!(segment.append(b"rec").unwrap(), 6);
        assert_eq!(segment.data(), b"headerrec");
    }

    #[test]
    fn short_reads_fail() {
        let segment = InMemoryBackend::with_data(b"torn".to_vec());
        let err = segment.read_at(2, 8).unwrap_err();
        assert!(matches!(err, StorageError::ReadPastEnd { offset: 2, len: 8, size: 4 }));
        assert!(err.is_short_read());
        assert!(segment.read_at(5, 0).is_err());
        assert!(segment.read_at(4, 0).unwrap().is_empty());
    }

    #[test]
    fn write_at_overwrites_and_extends() {
        let mut page = InMemoryBackend::with_data(vec![0u8; 8]);

        page.write_at(2, b"ab").unwrap();
        page.write_at(6, b"cdef").unwrap();
        assert_eq!(page.data(), b"\0\0ab\0\0cdef");
        assert!(matches!(
            page.write_at(11, b"x"),
            Err(StorageError::WritePastEnd { offset: 11, size: 10 })
        ));
    }

    #[test]
    fn clones_share_one_buffer() {
        let mut writer = InMemoryBackend::new();
        let mut corrupter = writer.clone();

        writer.append(b"record").unwrap();
        corrupter.write_at(0, b"R").unwrap();
        assert_eq!(writer.read_at(0, 6).unwrap(), b"Record");
    }

    #[test]
    fn truncate_only_shrinks() {
        let mut segment = InMemoryBackend::with_data(b"good|torn".to_vec());

        segment.truncate(4).unwrap();
        assert_eq!(segment.data(), b"good");
        assert!(matches!(
            segment.truncate(9),
            Err(StorageError::TruncateBeyondEnd { requested: 9, size: 4 })
        ));
    }
}
