//! Block-granular access to a storage backend.

use crate::error::{CoreError, CoreResult};
use crate::types::BlockId;
use dirdb_storage::StorageBackend;
use std::collections::HashSet;
use tracing::trace;

/// An owned copy of one block, handed out by [`RecordFile::get`].
///
/// A page must go back through [`RecordFile::release`]; until then the block
/// counts as in use and cannot be fetched again.
#[derive(Debug)]
pub struct Page {
    block: BlockId,
    data: Vec<u8>,
}

impl Page {
    /// Returns the block this page was read from.
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Returns the page bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the page bytes for modification.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A file of fixed-size blocks on top of a [`StorageBackend`].
///
/// Blocks past the current end of the backend read as zeroes; writing such a
/// page back extends the backend.
pub struct RecordFile {
    backend: Box<dyn StorageBackend>,
    page_size: usize,
    in_use: HashSet<BlockId>,
}

impl RecordFile {
    /// Creates a record file with the given page size.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size is not a whole number of pages.
    pub fn new(backend: Box<dyn StorageBackend>, page_size: usize) -> CoreResult<Self> {
        let size = backend.size()?;
        if size % page_size as u64 != 0 {
            return Err(CoreError::invalid_format(format!(
                "file size {size} is not a multiple of page size {page_size}"
            )));
        }
        Ok(Self {
            backend,
            page_size,
            in_use: HashSet::new(),
        })
    }

    /// Returns the page size in bytes.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of blocks currently stored.
    pub fn block_count(&self) -> CoreResult<u64> {
        Ok(self.backend.size()? / self.page_size as u64)
    }

    /// Fetches a block for exclusive use.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PageInUse`] if the block was fetched and not yet
    /// released, or a storage error if the read fails.
    pub fn get(&mut self, block: BlockId) -> CoreResult<Page> {
        if self.in_use.contains(&block) {
            return Err(CoreError::PageInUse { block });
        }

        let offset = self.offset_of(block);
        let data = if offset < self.backend.size()? {
            self.backend.read_at(offset, self.page_size)?
        } else {
            vec![0u8; self.page_size]
        };

        self.in_use.insert(block);
        trace!(%block, "page fetched");
        Ok(Page { block, data })
    }

    /// Returns a page, writing it back first when `dirty`.
    ///
    /// The block is no longer in use afterwards even if the write fails.
    ///
    /// # Errors
    ///
    /// Returns a storage error if writing the page fails.
    pub fn release(&mut self, page: Page, dirty: bool) -> CoreResult<()> {
        self.in_use.remove(&page.block);
        if !dirty {
            return Ok(());
        }

        let offset = self.offset_of(page.block);
        let size = self.backend.size()?;
        if offset > size {
            // Fill the gap so the backend never holds a hole.
            let gap = (offset - size) as usize;
            self.backend.write_at(size, &vec![0u8; gap])?;
        }
        self.backend.write_at(offset, &page.data)?;
        trace!(block = %page.block, "page written");
        Ok(())
    }

    /// Returns `true` while the block is fetched and not released.
    #[must_use]
    pub fn is_in_use(&self, block: BlockId) -> bool {
        self.in_use.contains(&block)
    }

    /// Flushes and syncs the backend.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }

    fn offset_of(&self, block: BlockId) -> u64 {
        block.as_u64() * self.page_size as u64
    }
}
