//! Typed page lists on top of a record file.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::page::file::{Page, RecordFile};
use crate::page::layout::{FileHeader, PageHeader, PageType, FILE_HEADER_SIZE, PAGE_HEADER_SIZE};
use crate::types::BlockId;
use dirdb_storage::StorageBackend;
use tracing::debug;

/// Allocates and frees pages and keeps one doubly linked list per page type.
///
/// Block 0 holds the [`FileHeader`] with the ends of every list. Freed pages
/// go to the head of the [`PageType::Free`] list and are reused before the
/// file is extended.
pub struct PageManager {
    file: RecordFile,
    header: FileHeader,
}

impl PageManager {
    /// Opens a page file, initialising the file header when the backend is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is too small, the backend is not
    /// page aligned, the header is corrupt, or I/O fails.
    pub fn open(backend: Box<dyn StorageBackend>, config: &Config) -> CoreResult<Self> {
        if config.page_size < Config::MIN_PAGE_SIZE {
            return Err(CoreError::invalid_operation(format!(
                "page size {} is below the minimum of {}",
                config.page_size,
                Config::MIN_PAGE_SIZE
            )));
        }
        if config.page_size > Config::MAX_PAGE_SIZE {
            return Err(CoreError::invalid_operation(format!(
                "page size {} is above the maximum of {}",
                config.page_size,
                Config::MAX_PAGE_SIZE
            )));
        }

        let mut file = RecordFile::new(backend, config.page_size)?;
        let header = if file.block_count()? == 0 {
            let header = FileHeader::default();
            let mut page = file.get(BlockId::HEADER)?;
            header.encode(&mut page.data_mut()[..FILE_HEADER_SIZE]);
            file.release(page, true)?;
            debug!(page_size = config.page_size, "initialised page file");
            header
        } else {
            let page = file.get(BlockId::HEADER)?;
            let decoded = FileHeader::decode(page.data());
            file.release(page, false)?;
            decoded?
        };

        Ok(Self { file, header })
    }

    /// Returns the underlying record file.
    pub fn record_file(&mut self) -> &mut RecordFile {
        &mut self.file
    }

    /// Returns the page size in bytes.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.file.page_size()
    }

    /// Returns the first page of `page_type`'s list, or the null block.
    #[must_use]
    pub fn first(&self, page_type: PageType) -> BlockId {
        self.header.list(page_type).first
    }

    /// Returns the page following `block` in its list, or the null block.
    pub fn next(&mut self, block: BlockId) -> CoreResult<BlockId> {
        Ok(self.read_header(block)?.next)
    }

    /// Returns a cursor over the pages of `page_type`.
    #[must_use]
    pub fn cursor(&self, page_type: PageType) -> PageCursor {
        PageCursor::new(page_type)
    }

    /// Allocates a page of `page_type` and links it at the tail of its list.
    ///
    /// The page body is zeroed. Pages from the free pool are reused before
    /// the file grows.
    ///
    /// # Errors
    ///
    /// Returns an error when asked for a [`PageType::Free`] page or on I/O
    /// failure.
    pub fn allocate(&mut self, page_type: PageType) -> CoreResult<BlockId> {
        if page_type == PageType::Free {
            return Err(CoreError::invalid_operation(
                "free pages are produced by free(), not allocate()",
            ));
        }

        let reused = self.header.list(PageType::Free).first;
        let block = if reused.is_null() {
            BlockId::new(self.file.block_count()?.max(1))
        } else {
            self.unlink(PageType::Free, reused)?;
            reused
        };

        let tail = self.header.list(page_type).last;
        let mut page = self.file.get(block)?;
        page.data_mut().fill(0);
        PageHeader {
            page_type,
            next: BlockId::HEADER,
            prev: tail,
        }
        .encode(page.data_mut());
        self.file.release(page, true)?;

        if tail.is_null() {
            self.header.list_mut(page_type).first = block;
        } else {
            self.update_header(tail, |h| h.next = block)?;
        }
        self.header.list_mut(page_type).last = block;
        self.write_file_header()?;

        debug!(%block, ?page_type, reused = !reused.is_null(), "page allocated");
        Ok(block)
    }

    /// Unlinks `block` from `page_type`'s list and returns it to the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the page is not of `page_type` or on I/O failure.
    pub fn free(&mut self, page_type: PageType, block: BlockId) -> CoreResult<()> {
        if block.is_null() {
            return Err(CoreError::invalid_operation("cannot free the file header"));
        }
        let current = self.read_header(block)?;
        if current.page_type != page_type {
            return Err(CoreError::invalid_format(format!(
                "page {block} is {:?}, not {page_type:?}",
                current.page_type
            )));
        }

        self.unlink(page_type, block)?;

        let head = self.header.list(PageType::Free).first;
        self.update_header(block, |h| {
            *h = PageHeader {
                page_type: PageType::Free,
                next: head,
                prev: BlockId::HEADER,
            };
        })?;
        if head.is_null() {
            self.header.list_mut(PageType::Free).last = block;
        } else {
            self.update_header(head, |h| h.prev = block)?;
        }
        self.header.list_mut(PageType::Free).first = block;
        self.write_file_header()?;

        debug!(%block, ?page_type, "page freed");
        Ok(())
    }

    /// Returns the number of pages in the free pool.
    pub fn free_page_count(&mut self) -> CoreResult<u64> {
        self.count(PageType::Free)
    }

    /// Returns the number of pages in `page_type`'s list.
    pub fn count(&mut self, page_type: PageType) -> CoreResult<u64> {
        let mut cursor = self.cursor(page_type);
        let mut count = 0;
        while cursor.next(self)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Flushes and syncs the page file.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.file.sync()
    }

    fn unlink(&mut self, page_type: PageType, block: BlockId) -> CoreResult<()> {
        let PageHeader { next, prev, .. } = self.read_header(block)?;

        if prev.is_null() {
            self.header.list_mut(page_type).first = next;
        } else {
            self.update_header(prev, |h| h.next = next)?;
        }
        if next.is_null() {
            self.header.list_mut(page_type).last = prev;
        } else {
            self.update_header(next, |h| h.prev = prev)?;
        }
        Ok(())
    }

    fn read_header(&mut self, block: BlockId) -> CoreResult<PageHeader> {
        let page = self.file.get(block)?;
        let header = PageHeader::decode(&page.data()[..PAGE_HEADER_SIZE]);
        self.file.release(page, false)?;
        header
    }

    fn update_header(
        &mut self,
        block: BlockId,
        update: impl FnOnce(&mut PageHeader),
    ) -> CoreResult<()> {
        let mut page = self.file.get(block)?;
        let mut header = match PageHeader::decode(&page.data()[..PAGE_HEADER_SIZE]) {
            Ok(header) => header,
            Err(e) => {
                self.file.release(page, false)?;
                return Err(e);
            }
        };
        update(&mut header);
        header.encode(page.data_mut());
        self.file.release(page, true)
    }

    fn write_file_header(&mut self) -> CoreResult<()> {
        let mut page: Page = self.file.get(BlockId::HEADER)?;
        self.header.encode(&mut page.data_mut()[..FILE_HEADER_SIZE]);
        self.file.release(page, true)
    }
}

/// Walks the pages of one type in list order.
///
/// The cursor holds no borrow of the [`PageManager`], so the caller may fetch
/// and release the current page between steps.
#[derive(Debug, Clone)]
pub struct PageCursor {
    page_type: PageType,
    current: Option<BlockId>,
}

impl PageCursor {
    /// Creates a cursor positioned before the first page of `page_type`.
    #[must_use]
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            current: None,
        }
    }

    /// Advances to the next page, returning `None` at the end of the list.
    pub fn next(&mut self, pages: &mut PageManager) -> CoreResult<Option<BlockId>> {
        let next = match self.current {
            None => pages.first(self.page_type),
            Some(block) => pages.next(block)?,
        };
        if next.is_null() {
            return Ok(None);
        }
        self.current = Some(next);
        Ok(Some(next))
    }

    /// Returns the page the cursor is positioned on.
    #[must_use]
    pub fn current(&self) -> Option<BlockId> {
        self.current
    }
}
