//! Where numbered log segments live.

use crate::error::CoreResult;
use dirdb_storage::{InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Opens, creates, and removes numbered log segments.
///
/// Segment numbers increase by one as the writer rolls over; the scanner
/// follows them in order and stops at the first missing number.
pub trait LogFileProvider: Send + Sync {
    /// Opens segment `file_number`, or returns `None` if it does not exist.
    fn open(&self, file_number: u64) -> CoreResult<Option<Box<dyn StorageBackend>>>;

    /// Creates segment `file_number`, replacing any existing segment.
    fn create(&self, file_number: u64) -> CoreResult<Box<dyn StorageBackend>>;

    /// Removes segment `file_number`. Removing a missing segment is a no-op.
    fn remove(&self, file_number: u64) -> CoreResult<()>;

    /// Returns the numbers of all existing segments, ascending.
    fn file_numbers(&self) -> CoreResult<Vec<u64>>;
}

/// In-memory segments, for tests and ephemeral stores.
///
/// Handles returned by [`open`](LogFileProvider::open) share their buffer
/// with the provider, so a writer and a scanner see the same bytes.
#[derive(Debug, Default)]
pub struct MemoryLogFiles {
    files: RwLock<BTreeMap<u64, InMemoryBackend>>,
}

impl MemoryLogFiles {
    /// Creates an empty set of segments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared handle on segment `file_number`'s raw bytes.
    #[must_use]
    pub fn segment(&self, file_number: u64) -> Option<InMemoryBackend> {
        self.files.read().get(&file_number).cloned()
    }
}

impl LogFileProvider for MemoryLogFiles {
    fn open(&self, file_number: u64) -> CoreResult<Option<Box<dyn StorageBackend>>> {
        Ok(self
            .segment(file_number)
            .map(|backend| Box::new(backend) as Box<dyn StorageBackend>))
    }

    fn create(&self, file_number: u64) -> CoreResult<Box<dyn StorageBackend>> {
        let backend = InMemoryBackend::new();
        self.files.write().insert(file_number, backend.clone());
        Ok(Box::new(backend))
    }

    fn remove(&self, file_number: u64) -> CoreResult<()> {
        self.files.write().remove(&file_number);
        Ok(())
    }

    fn file_numbers(&self) -> CoreResult<Vec<u64>> {
        Ok(self.files.read().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_bytes() {
        let files = MemoryLogFiles::new();
        let mut writer = files.create(0).unwrap();
        writer.append(b"hello").unwrap();

        let reader = files.open(0).unwrap().unwrap();
        assert_eq!(reader.read_at(0, 5).unwrap(), b"hello");
    }

    #[test]
    fn missing_segment_opens_as_none() {
        let files = MemoryLogFiles::new();
        assert!(files.open(4).unwrap().is_none());
    }

    #[test]
    fn create_replaces_and_remove_forgets() {
        let files = MemoryLogFiles::new();
        files.create(2).unwrap().append(b"old").unwrap();
        files.create(0).unwrap();
        let replaced = files.create(2).unwrap();
        assert_eq!(replaced.size().unwrap(), 0);
        assert_eq!(files.file_numbers().unwrap(), vec![0, 2]);

        files.remove(0).unwrap();
        files.remove(9).unwrap();
        assert_eq!(files.file_numbers().unwrap(), vec![2]);
    }
}
