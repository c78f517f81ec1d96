//! Log positions and the records read at them.

use crate::types::Lsn;
use std::fmt;

/// A position in the write-ahead log.
///
/// `lsn` is the sequence number expected of the record starting at this
/// position, or `None` when unknown. A scan started at an anchor with a
/// known LSN fails unless the first record it reads carries that LSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogAnchor {
    /// Segment number.
    pub file_number: u64,
    /// Byte offset within the segment; 0 means "start of segment".
    pub file_offset: u64,
    /// Expected LSN at this position.
    pub lsn: Option<Lsn>,
}

impl LogAnchor {
    /// Creates an anchor.
    #[must_use]
    pub const fn new(file_number: u64, file_offset: u64, lsn: Option<Lsn>) -> Self {
        Self {
            file_number,
            file_offset,
            lsn,
        }
    }

    /// Anchor at the very start of segment `file_number`, LSN unknown.
    #[must_use]
    pub const fn start_of(file_number: u64) -> Self {
        Self::new(file_number, 0, None)
    }
}

impl fmt::Display for LogAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lsn {
            Some(lsn) => write!(f, "log:{}+{}@{}", self.file_number, self.file_offset, lsn),
            None => write!(f, "log:{}+{}", self.file_number, self.file_offset),
        }
    }
}

/// A record read from the log.
///
/// The buffer is reused between reads and grows to fit the largest payload
/// seen; only the first [`len`](Self::len) bytes belong to the current record.
#[derive(Debug, Clone, Default)]
pub struct LogRecord {
    buffer: Vec<u8>,
    len: usize,
    anchor: Option<LogAnchor>,
}

impl LogRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with room for `capacity` payload bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            ..Self::default()
        }
    }

    /// Returns the payload of the current record.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Returns the payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no record has been read into this buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the size of the reusable buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the position the current record starts at.
    #[must_use]
    pub fn anchor(&self) -> Option<LogAnchor> {
        self.anchor
    }

    /// Returns the LSN of the current record.
    #[must_use]
    pub fn lsn(&self) -> Option<Lsn> {
        self.anchor.and_then(|a| a.lsn)
    }

    /// Resizes for a payload of `len` bytes and returns the slice to fill.
    pub(crate) fn prepare(&mut self, len: usize) -> &mut [u8] {
        if self.buffer.len() < len {
            self.buffer.resize(len, 0);
        }
        self.len = len;
        &mut self.buffer[..len]
    }

    pub(crate) fn set_anchor(&mut self, anchor: LogAnchor) {
        self.anchor = Some(anchor);
    }
}
