//! On-disk layout of the record file.
//!
//! All integers are big-endian.
//!
//! ```text
//! block 0 (file header):
//! | magic u16 = 0x1350 | { first i64, last i64 } x PageType::COUNT |
//!
//! every other block:
//! | magic u16 = 0x1351 + type | next i64 | prev i64 | body ... |
//!
//! free-list page body:
//! | count u16 | { block i64, offset i32, size i32 } x slots_per_page |
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::BlockId;
use bytes::{Buf, BufMut};

/// Magic number at the start of block 0.
pub const FILE_HEADER_MAGIC: u16 = 0x1350;

/// Base magic for page headers; the page type is added to it.
pub const PAGE_MAGIC_BASE: u16 = 0x1351;

/// Size of the file header in bytes.
pub const FILE_HEADER_SIZE: usize = 2 + PageType::COUNT * 16;

/// Size of a page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 18;

/// Offset of the slot count in a free-list page.
pub const FREE_LIST_COUNT_OFFSET: usize = PAGE_HEADER_SIZE;

/// Offset of the first slot in a free-list page.
pub const FREE_LIST_SLOTS_OFFSET: usize = FREE_LIST_COUNT_OFFSET + 2;

/// Size of one free slot in bytes.
pub const FREE_SLOT_SIZE: usize = 16;

/// Type tag of a page; each type has its own linked list of pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PageType {
    /// Page in the pool of unused pages.
    Free = 0,
    /// Page holding physical record data.
    Data = 1,
    /// Page holding free physical record descriptors.
    FreeList = 2,
}

impl PageType {
    /// Number of page types (and of page lists in the file header).
    pub const COUNT: usize = 3;

    /// Converts a stored tag into a page type.
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(Self::Free),
            1 => Some(Self::Data),
            2 => Some(Self::FreeList),
            _ => None,
        }
    }

    /// Returns the page type's list index.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the magic number stored in page headers of this type.
    #[must_use]
    pub const fn magic(self) -> u16 {
        PAGE_MAGIC_BASE + self as u16
    }
}

/// First and last page of one page list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListEnds {
    /// Head of the list, or the null block.
    pub first: BlockId,
    /// Tail of the list, or the null block.
    pub last: BlockId,
}

/// Decoded file header (block 0).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileHeader {
    lists: [ListEnds; PageType::COUNT],
}

impl FileHeader {
    /// Returns the ends of `page_type`'s list.
    #[must_use]
    pub fn list(&self, page_type: PageType) -> ListEnds {
        self.lists[page_type.index()]
    }

    /// Returns a mutable reference to the ends of `page_type`'s list.
    pub fn list_mut(&mut self, page_type: PageType) -> &mut ListEnds {
        &mut self.lists[page_type.index()]
    }

    /// Serializes the header into the front of `buf`.
    pub fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u16(FILE_HEADER_MAGIC);
        for ends in &self.lists {
            buf.put_i64(ends.first.as_u64() as i64);
            buf.put_i64(ends.last.as_u64() as i64);
        }
    }

    /// Deserializes a header from the front of `buf`.
    pub fn decode(mut buf: &[u8]) -> CoreResult<Self> {
        if buf.len() < FILE_HEADER_SIZE {
            return Err(CoreError::invalid_format("file header truncated"));
        }
        let magic = buf.get_u16();
        if magic != FILE_HEADER_MAGIC {
            return Err(CoreError::invalid_format(format!(
                "bad file header magic {magic:#06x}"
            )));
        }
        let mut header = Self::default();
        for ends in &mut header.lists {
            ends.first = decode_block(buf.get_i64())?;
            ends.last = decode_block(buf.get_i64())?;
        }
        Ok(header)
    }
}

/// Decoded page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Type of the page.
    pub page_type: PageType,
    /// Next page in the same list, or the null block.
    pub next: BlockId,
    /// Previous page in the same list, or the null block.
    pub prev: BlockId,
}

impl PageHeader {
    /// Creates an unlinked header for a page of `page_type`.
    #[must_use]
    pub const fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            next: BlockId::HEADER,
            prev: BlockId::HEADER,
        }
    }

    /// Serializes the header into the front of `buf`.
    pub fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u16(self.page_type.magic());
        buf.put_i64(self.next.as_u64() as i64);
        buf.put_i64(self.prev.as_u64() as i64);
    }

    /// Deserializes a header from the front of `buf`.
    pub fn decode(mut buf: &[u8]) -> CoreResult<Self> {
        if buf.len() < PAGE_HEADER_SIZE {
            return Err(CoreError::invalid_format("page header truncated"));
        }
        let magic = buf.get_u16();
        let page_type = magic
            .checked_sub(PAGE_MAGIC_BASE)
            .and_then(PageType::from_tag)
            .ok_or_else(|| CoreError::invalid_format(format!("bad page magic {magic:#06x}")))?;
        let next = decode_block(buf.get_i64())?;
        let prev = decode_block(buf.get_i64())?;
        Ok(Self {
            page_type,
            next,
            prev,
        })
    }
}

fn decode_block(raw: i64) -> CoreResult<BlockId> {
    u64::try_from(raw)
        .map(BlockId::new)
        .map_err(|_| CoreError::invalid_format(format!("negative block link {raw}")))
}

/// Number of free slots that fit in one free-list page.
#[must_use]
pub const fn slots_per_page(page_size: usize) -> usize {
    (page_size - FREE_LIST_SLOTS_OFFSET) / FREE_SLOT_SIZE
}
