//! Core type definitions for DirDB.

use std::fmt;

/// Identifier of a fixed-size block (page) in a record file.
///
/// Block 0 is the file header; data pages start at 1. On disk block ids are
/// stored as signed 64-bit big-endian integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockId(pub u64);

impl BlockId {
    /// The file header block, also used as the "no page" link value.
    pub const HEADER: Self = Self(0);

    /// Creates a new block id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw block number.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` for the null link (block 0).
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk:{}", self.0)
    }
}

/// Address of a physical record: a block and a byte offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    /// Block holding the record.
    pub block: BlockId,
    /// Byte offset of the record within the block.
    pub offset: u32,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub const fn new(block: BlockId, offset: u32) -> Self {
        Self { block, offset }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.block, self.offset)
    }
}

/// Log sequence number.
///
/// LSNs are assigned by the log writer in increasing order and must never
/// decrease along a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    /// Creates a new LSN.
    #[must_use]
    pub const fn new(lsn: u64) -> Self {
        Self(lsn)
    }

    /// Returns the raw LSN value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following LSN.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lsn:{}", self.0)
    }
}

/// Identifier of a directory entry.
///
/// The set of all entry ids known to a store is the domain a negation is
/// complemented against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Creates a new entry id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsn_ordering_and_next() {
        let a = Lsn::new(5);
        assert!(a < a.next());
        assert_eq!(a.next().as_u64(), 6);
    }

    #[test]
    fn block_null_link() {
        assert!(BlockId::HEADER.is_null());
        assert!(!BlockId::new(1).is_null());
    }

    #[test]
    fn location_display() {
        let loc = Location::new(BlockId::new(7), 120);
        assert_eq!(format!("{loc}"), "blk:7+120");
    }
}
