//! Paged record file and free physical record space.
//!
//! ## Layers
//!
//! - [`RecordFile`]: fixed-size blocks over a storage backend, handed out
//!   as owned [`Page`]s that must be released
//! - [`PageManager`]: one doubly linked list of pages per [`PageType`],
//!   a pool of freed pages, and the file header in block 0
//! - [`FreeSpace`]: first-fit-by-page allocator over free-list pages
//!
//! ## Invariants
//!
//! - A block is held by at most one [`Page`] at a time
//! - A free slot returned by [`FreeSpace::get`] is removed from its page
//!   before the call returns, and never returned twice
//! - A free-list page emptied by `get` goes back to the page pool
//! - The allocator never compensates on I/O failure; crash safety of these
//!   mutations belongs to the write-ahead log

mod file;
mod free_space;
mod layout;
mod manager;

pub use file::{Page, RecordFile};
pub use free_space::{FreeSlot, FreeSpace};
pub use layout::{
    slots_per_page, FileHeader, ListEnds, PageHeader, PageType, FILE_HEADER_MAGIC,
    FILE_HEADER_SIZE, FREE_SLOT_SIZE, PAGE_HEADER_SIZE,
};
pub use manager::{PageCursor, PageManager};
