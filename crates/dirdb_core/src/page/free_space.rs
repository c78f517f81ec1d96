//! Free physical record space.
//!
//! Descriptors of freed physical records live in slots of
//! [`PageType::FreeList`] pages. A slot with a stored size of 0 is empty.
//!
//! Allocation is first-fit by page: pages are visited in list order and the
//! first slot in the first page that is large enough wins, even when a
//! tighter slot exists further on.

use crate::error::{CoreError, CoreResult};
use crate::page::file::Page;
use crate::page::layout::{
    slots_per_page, PageType, FREE_LIST_COUNT_OFFSET, FREE_LIST_SLOTS_OFFSET, FREE_SLOT_SIZE,
};
use crate::page::manager::PageManager;
use crate::types::{BlockId, Location};
use bytes::{Buf, BufMut};
use tracing::debug;

/// A free physical record: where it is and how many bytes it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    /// Address of the free record.
    pub location: Location,
    /// Size of the free record in bytes.
    pub size: u32,
}

/// A slot's fields in their on-disk widths.
#[derive(Debug, Clone, Copy)]
struct RawSlot {
    block: i64,
    offset: i32,
    size: i32,
}

impl TryFrom<FreeSlot> for RawSlot {
    type Error = CoreError;

    fn try_from(slot: FreeSlot) -> CoreResult<Self> {
        let block = i64::try_from(slot.location.block.as_u64())
            .map_err(|_| CoreError::invalid_operation("block id does not fit the slot layout"))?;
        let offset = i32::try_from(slot.location.offset)
            .map_err(|_| CoreError::invalid_operation("offset does not fit the slot layout"))?;
        let size = i32::try_from(slot.size)
            .map_err(|_| CoreError::invalid_operation("size does not fit the slot layout"))?;
        Ok(Self {
            block,
            offset,
            size,
        })
    }
}

/// View of a free-list page's slot array.
struct FreeListPage<'p> {
    page: &'p mut Page,
    capacity: usize,
}

impl<'p> FreeListPage<'p> {
    fn new(page: &'p mut Page) -> Self {
        let capacity = slots_per_page(page.data().len());
        Self { page, capacity }
    }

    fn count(&self) -> u16 {
        (&self.page.data()[FREE_LIST_COUNT_OFFSET..]).get_u16()
    }

    fn set_count(&mut self, count: u16) {
        (&mut self.page.data_mut()[FREE_LIST_COUNT_OFFSET..]).put_u16(count);
    }

    fn slot_offset(index: usize) -> usize {
        FREE_LIST_SLOTS_OFFSET + index * FREE_SLOT_SIZE
    }

    fn slot(&self, index: usize) -> CoreResult<FreeSlot> {
        let mut buf = &self.page.data()[Self::slot_offset(index)..];
        let block = buf.get_i64();
        let offset = buf.get_i32();
        let size = buf.get_i32();
        let (Ok(block), Ok(offset), Ok(size)) = (
            u64::try_from(block),
            u32::try_from(offset),
            u32::try_from(size),
        ) else {
            return Err(CoreError::invalid_format(format!(
                "negative field in free slot {index} of page {}",
                self.page.block()
            )));
        };
        Ok(FreeSlot {
            location: Location::new(BlockId::new(block), offset),
            size,
        })
    }

    fn write_slot(&mut self, index: usize, block: i64, offset: i32, size: i32) {
        let mut buf = &mut self.page.data_mut()[Self::slot_offset(index)..];
        buf.put_i64(block);
        buf.put_i32(offset);
        buf.put_i32(size);
    }

    /// Index of the first allocated slot holding at least `size` bytes.
    fn first_fitting(&self, size: u32) -> CoreResult<Option<usize>> {
        for index in 0..self.capacity {
            let slot = self.slot(index)?;
            if slot.size != 0 && slot.size >= size {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Index of the first empty slot.
    fn first_empty(&self) -> CoreResult<Option<usize>> {
        for index in 0..self.capacity {
            if self.slot(index)?.size == 0 {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn fill(&mut self, index: usize, raw: RawSlot) -> CoreResult<()> {
        let Some(count) = self.count().checked_add(1) else {
            return Err(CoreError::invalid_format(format!(
                "free slot count overflows on page {}",
                self.page.block()
            )));
        };
        self.write_slot(index, raw.block, raw.offset, raw.size);
        self.set_count(count);
        Ok(())
    }

    fn clear(&mut self, index: usize) {
        self.write_slot(index, 0, 0, 0);
        self.set_count(self.count().saturating_sub(1));
    }

    fn allocated(&self) -> CoreResult<Vec<FreeSlot>> {
        let mut slots = Vec::new();
        for index in 0..self.capacity {
            let slot = self.slot(index)?;
            if slot.size != 0 {
                slots.push(slot);
            }
        }
        Ok(slots)
    }
}

/// Hands out and takes back free physical record space.
///
/// Obtained from [`PageManager::free_space`]; it borrows the page manager for
/// the duration of the calls and keeps no state of its own.
pub struct FreeSpace<'a> {
    pages: &'a mut PageManager,
}

impl PageManager {
    /// Returns the free-space allocator backed by this page file.
    pub fn free_space(&mut self) -> FreeSpace<'_> {
        FreeSpace { pages: self }
    }
}

impl FreeSpace<'_> {
    /// Takes a free record of at least `size` bytes off the free list.
    ///
    /// Returns `None` when no free-list page holds a fitting slot; the caller
    /// must then extend the store. A free-list page emptied by this call is
    /// returned to the page pool.
    ///
    /// # Errors
    ///
    /// Propagates I/O and page format errors unmodified.
    pub fn get(&mut self, size: u32) -> CoreResult<Option<Location>> {
        let mut cursor = self.pages.cursor(PageType::FreeList);

        while let Some(block) = cursor.next(self.pages)? {
            let file = self.pages.record_file();
            let mut page = file.get(block)?;
            let mut view = FreeListPage::new(&mut page);

            let found = match view.first_fitting(size) {
                Ok(Some(index)) => view.slot(index).map(|slot| (index, slot)),
                Ok(None) => {
                    file.release(page, false)?;
                    continue;
                }
                Err(e) => Err(e),
            };
            let (index, slot) = match found {
                Ok(found) => found,
                Err(e) => {
                    file.release(page, false)?;
                    return Err(e);
                }
            };

            view.clear(index);
            if view.count() == 0 {
                file.release(page, false)?;
                self.pages.free(PageType::FreeList, block)?;
                debug!(%block, "free-list page emptied and released");
            } else {
                file.release(page, true)?;
            }
            debug!(location = %slot.location, stored = slot.size, requested = size, "free record reused");
            return Ok(Some(slot.location));
        }

        Ok(None)
    }

    /// Puts a record of `size` bytes at `location` on the free list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for a zero size (a zero size
    /// marks an empty slot) or for values that do not fit the slot layout;
    /// both are checked before any page is touched. I/O errors propagate.
    pub fn put(&mut self, location: Location, size: u32) -> CoreResult<()> {
        if size == 0 {
            return Err(CoreError::invalid_operation(
                "cannot put a zero-sized record on the free list",
            ));
        }
        let raw = RawSlot::try_from(FreeSlot { location, size })?;

        let mut cursor = self.pages.cursor(PageType::FreeList);
        while let Some(block) = cursor.next(self.pages)? {
            let file = self.pages.record_file();
            let mut page = file.get(block)?;
            let mut view = FreeListPage::new(&mut page);

            match view.first_empty() {
                Ok(Some(index)) => {
                    let filled = view.fill(index, raw);
                    file.release(page, filled.is_ok())?;
                    return filled;
                }
                Ok(None) => file.release(page, false)?,
                Err(e) => {
                    file.release(page, false)?;
                    return Err(e);
                }
            }
        }

        // No room on the free list, add a page.
        let block = self.pages.allocate(PageType::FreeList)?;
        debug!(%block, "free-list page added");
        let file = self.pages.record_file();
        let mut page = file.get(block)?;
        let filled = FreeListPage::new(&mut page).fill(0, raw);
        file.release(page, filled.is_ok())?;
        filled
    }

    /// Returns every free record on the list, in list order.
    pub fn slots(&mut self) -> CoreResult<Vec<FreeSlot>> {
        let mut cursor = self.pages.cursor(PageType::FreeList);
        let mut slots = Vec::new();

        while let Some(block) = cursor.next(self.pages)? {
            let file = self.pages.record_file();
            let mut page = file.get(block)?;
            let found = FreeListPage::new(&mut page).allocated();
            file.release(page, false)?;
            slots.extend(found?);
        }
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use dirdb_storage::InMemoryBackend;

    // 128-byte pages hold (128 - 20) / 16 = 6 slots.
    fn manager() -> PageManager {
        let config = Config::new().page_size(128);
        PageManager::open(Box::new(InMemoryBackend::new()), &config).unwrap()
    }

    fn loc(block: u64, offset: u32) -> Location {
        Location::new(BlockId::new(block), offset)
    }

    #[test]
    fn round_trip_consumes_slot_once() {
        let mut pages = manager();
        pages.free_space().put(loc(5, 40), 100).unwrap();

        assert_eq!(pages.free_space().get(60).unwrap(), Some(loc(5, 40)));
        assert_eq!(pages.free_space().get(60).unwrap(), None);
    }

    #[test]
    fn exact_size_fits() {
        let mut pages = manager();
        pages.free_space().put(loc(1, 0), 64).unwrap();
        assert_eq!(pages.free_space().get(64).unwrap(), Some(loc(1, 0)));
    }

    #[test]
    fn too_large_request_returns_none() {
        let mut pages = manager();
        pages.free_space().put(loc(1, 0), 64).unwrap();
        assert_eq!(pages.free_space().get(65).unwrap(), None);
        assert_eq!(pages.free_space().slots().unwrap().len(), 1);
    }

    #[test]
    fn first_fit_not_best_fit() {
        let mut pages = manager();
        let mut space = pages.free_space();
        space.put(loc(1, 0), 500).unwrap();
        space.put(loc(2, 0), 50).unwrap();

        assert_eq!(space.get(40).unwrap(), Some(loc(1, 0)));
        assert_eq!(space.get(40).unwrap(), Some(loc(2, 0)));
    }

    #[test]
    fn emptied_page_returns_to_pool() {
        let mut pages = manager();
        pages.free_space().put(loc(9, 8), 32).unwrap();
        assert_eq!(pages.count(PageType::FreeList).unwrap(), 1);
        let before = pages.free_page_count().unwrap();

        pages.free_space().get(16).unwrap();

        assert_eq!(pages.free_page_count().unwrap(), before + 1);
        assert_eq!(pages.count(PageType::FreeList).unwrap(), 0);
    }

    #[test]
    fn full_page_spills_to_new_page() {
        let mut pages = manager();
        for i in 0..7u32 {
            pages.free_space().put(loc(1, i * 10), 10 + i).unwrap();
        }
        assert_eq!(pages.count(PageType::FreeList).unwrap(), 2);

        // The seventh slot lives on the second page; fitting 16 skips page one.
        assert_eq!(pages.free_space().get(16).unwrap(), Some(loc(1, 60)));
        assert_eq!(pages.count(PageType::FreeList).unwrap(), 1);
    }

    #[test]
    fn freed_slot_is_reused_by_put() {
        let mut pages = manager();
        let mut space = pages.free_space();
        space.put(loc(1, 0), 10).unwrap();
        space.put(loc(1, 10), 20).unwrap();
        assert_eq!(space.get(5).unwrap(), Some(loc(1, 0)));

        space.put(loc(3, 0), 30).unwrap();
        let slots = space.slots().unwrap();
        assert_eq!(slots[0].location, loc(3, 0));
        assert_eq!(slots[1].location, loc(1, 10));
    }

    #[test]
    fn saturated_count_refuses_another_slot() {
        let mut pages = manager();
        pages.free_space().put(loc(1, 0), 10).unwrap();
        let block = pages.first(PageType::FreeList);

        let file = pages.record_file();
        let mut page = file.get(block).unwrap();
        FreeListPage::new(&mut page).set_count(u16::MAX);
        file.release(page, true).unwrap();

        assert!(matches!(
            pages.free_space().put(loc(1, 10), 10),
            Err(CoreError::InvalidFormat { .. })
        ));
        assert_eq!(pages.free_space().slots().unwrap().len(), 1);
    }

    #[test]
    fn zero_size_put_is_rejected() {
        let mut pages = manager();
        assert!(matches!(
            pages.free_space().put(loc(1, 0), 0),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn oversized_offset_is_rejected_before_touching_pages() {
        let mut pages = manager();
        let result = pages.free_space().put(loc(1, u32::MAX), 10);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
        assert_eq!(pages.count(PageType::FreeList).unwrap(), 0);

        pages.free_space().put(loc(1, 0), 10).unwrap();
        assert_eq!(pages.free_space().slots().unwrap().len(), 1);
    }
}
