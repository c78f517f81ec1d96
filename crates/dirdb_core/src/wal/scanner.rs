//! Forward scan over log segments with validation.
//!
//! The scanner walks records in order starting at a [`LogAnchor`], following
//! segment rollover. Every structural check that fails puts it in a sticky
//! invalid state: the failing call and all later calls report
//! [`CoreError::InvalidLog`], and [`LogScanner::last_good_anchor`] keeps
//! pointing just past the last record that validated.

use crate::error::{CoreError, CoreResult};
use crate::types::Lsn;
use crate::wal::anchor::{LogAnchor, LogRecord};
use crate::wal::format::{
    header_checksum, LogFileHeader, RecordFooter, RecordHeader, LOG_FILE_HEADER_MAGIC,
    LOG_FILE_HEADER_SIZE, RECORD_FOOTER_MAGIC, RECORD_FOOTER_SIZE, RECORD_HEADER_MAGIC,
    RECORD_HEADER_SIZE,
};
use crate::wal::provider::LogFileProvider;
use dirdb_storage::StorageBackend;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Where a scanner is in its life cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    /// Nothing read yet; the starting segment's header comes first.
    NeedFileHeader,
    /// Positioned between records.
    Reading,
    /// The end of the log was reached. Further reads return `false`.
    Eof,
    /// Invalid content was found. Further reads fail with the same message.
    Invalid(String),
    /// [`LogScanner::close`] was called.
    Closed,
}

/// An open segment and the read position inside it.
struct SegmentReader {
    backend: Box<dyn StorageBackend>,
    file_number: u64,
    offset: u64,
}

impl SegmentReader {
    fn len(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> CoreResult<()> {
        let data = self.backend.read_at(self.offset, buf.len())?;
        buf.copy_from_slice(&data);
        self.offset += buf.len() as u64;
        Ok(())
    }
}

/// Sequential reader over the write-ahead log.
///
/// # Example
///
/// ```rust,ignore
/// let mut scanner = LogScanner::new(provider, LogAnchor::start_of(0));
/// let mut record = LogRecord::new();
/// while scanner.next_record(&mut record)? {
///     replay(record.payload());
/// }
/// ```
pub struct LogScanner {
    provider: Arc<dyn LogFileProvider>,
    start: LogAnchor,
    segment: Option<SegmentReader>,
    state: ScanState,
    last_good: LogAnchor,
    next_lsn: Option<Lsn>,
}

impl LogScanner {
    /// Creates a scanner that starts at `start`. Nothing is opened until the
    /// first call to [`next_record`](Self::next_record).
    #[must_use]
    pub fn new(provider: Arc<dyn LogFileProvider>, start: LogAnchor) -> Self {
        Self {
            provider,
            start,
            segment: None,
            state: ScanState::NeedFileHeader,
            last_good: LogAnchor::new(start.file_number, start.file_offset, None),
            next_lsn: start.lsn,
        }
    }

    /// Reads the next record into `record`.
    ///
    /// Returns `Ok(true)` when a record was read and `Ok(false)` at the end of
    /// the log.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidLog`] when the log holds a torn, corrupt, or
    ///   out-of-order record, and on every call after that
    /// - [`CoreError::ScannerClosed`] after [`close`](Self::close)
    /// - any other storage error, after which the scanner is closed
    pub fn next_record(&mut self, record: &mut LogRecord) -> CoreResult<bool> {
        match &self.state {
            ScanState::Invalid(message) => return Err(CoreError::invalid_log(message.clone())),
            ScanState::Closed => return Err(CoreError::ScannerClosed),
            ScanState::Eof => return Ok(false),
            ScanState::NeedFileHeader | ScanState::Reading => {}
        }

        match self.read_next(record) {
            Ok(true) => {
                self.state = ScanState::Reading;
                Ok(true)
            }
            Ok(false) => {
                debug!(last_good = %self.last_good, "end of log");
                self.segment = None;
                self.state = ScanState::Eof;
                Ok(false)
            }
            Err(CoreError::InvalidLog { message }) => Err(self.mark_invalid(message)),
            Err(e) if e.is_short_read() => Err(self.mark_invalid(format!("truncated log: {e}"))),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Returns the position just past the last record that validated, with
    /// that record's LSN.
    ///
    /// Before any record is read this is the starting position with an
    /// unknown LSN.
    #[must_use]
    pub fn last_good_anchor(&self) -> LogAnchor {
        self.last_good
    }

    /// Returns the LSN a record appended at the last good position must carry.
    ///
    /// This follows the last record read, or is the starting anchor's LSN
    /// when no record has been read. `None` means the scan started without a
    /// known LSN and read nothing.
    #[must_use]
    pub fn next_lsn(&self) -> Option<Lsn> {
        self.next_lsn
    }

    /// Returns the segment number of the last good position.
    #[must_use]
    pub fn last_good_file_number(&self) -> u64 {
        self.last_good.file_number
    }

    /// Returns the byte offset of the last good position.
    #[must_use]
    pub fn last_good_offset(&self) -> u64 {
        self.last_good.file_offset
    }

    /// Returns the scanner's state.
    #[must_use]
    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Releases the open segment. Idempotent.
    ///
    /// An invalid scanner stays invalid; any other scanner reports
    /// [`CoreError::ScannerClosed`] from then on.
    pub fn close(&mut self) {
        self.segment = None;
        if !matches!(self.state, ScanState::Invalid(_)) {
            self.state = ScanState::Closed;
        }
    }

    fn mark_invalid(&mut self, message: String) -> CoreError {
        warn!(last_good = %self.last_good, reason = %message, "log scan stopped on invalid content");
        self.segment = None;
        self.state = ScanState::Invalid(message.clone());
        CoreError::InvalidLog { message }
    }

    fn read_next(&mut self, record: &mut LogRecord) -> CoreResult<bool> {
        let starting_read = self.segment.is_none();
        let mut segment = match self.segment.take() {
            Some(segment) => segment,
            None => {
                let Some(mut segment) = self.open_segment(self.start.file_number)? else {
                    return Ok(false);
                };
                let offset = self.start.file_offset;
                if offset > 0 {
                    if offset < LOG_FILE_HEADER_SIZE as u64 {
                        return Err(CoreError::invalid_log(format!(
                            "starting offset {offset} lies inside the segment header"
                        )));
                    }
                    segment.offset = offset;
                    self.last_good.file_offset = offset;
                }
                segment
            }
        };

        loop {
            let len = segment.len()?;
            if segment.offset > len {
                return Err(CoreError::invalid_log(format!(
                    "position {} is past the end of segment {} ({len} bytes)",
                    segment.offset, segment.file_number
                )));
            }
            if segment.offset < len {
                break;
            }
            let next = segment.file_number + 1;
            drop(segment);
            match self.open_segment(next)? {
                Some(opened) => segment = opened,
                None => return Ok(false),
            }
        }

        let record_start = segment.offset;
        let (lsn, payload_len) = self.read_record_header(&mut segment)?;
        if starting_read {
            if let Some(expected) = self.start.lsn {
                if expected != lsn {
                    return Err(CoreError::invalid_log(format!(
                        "first record has {lsn}, expected {expected}"
                    )));
                }
            }
        }

        segment.read_exact(record.prepare(payload_len))?;

        let mut footer = [0u8; RECORD_FOOTER_SIZE];
        segment.read_exact(&mut footer)?;
        let footer = RecordFooter::from_bytes(&footer);
        if footer.magic != RECORD_FOOTER_MAGIC {
            return Err(CoreError::invalid_log(format!(
                "bad footer magic {:#010x} for {lsn}",
                footer.magic
            )));
        }

        record.set_anchor(LogAnchor::new(segment.file_number, record_start, Some(lsn)));
        self.last_good = LogAnchor::new(segment.file_number, segment.offset, Some(lsn));
        self.next_lsn = Some(lsn.next());
        trace!(%lsn, file_number = segment.file_number, offset = record_start, "record read");
        self.segment = Some(segment);
        Ok(true)
    }

    fn read_record_header(&self, segment: &mut SegmentReader) -> CoreResult<(Lsn, usize)> {
        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        segment.read_exact(&mut bytes)?;
        let header = RecordHeader::from_bytes(&bytes);

        if header.magic != RECORD_HEADER_MAGIC {
            return Err(CoreError::invalid_log(format!(
                "bad record magic {:#010x} at segment {} offset {}",
                header.magic,
                segment.file_number,
                segment.offset - RECORD_HEADER_SIZE as u64
            )));
        }
        let Some(payload_len) = header.payload_len() else {
            return Err(CoreError::invalid_log(format!(
                "record length {} cannot hold a payload",
                header.length
            )));
        };
        if let Some(prev) = self.last_good.lsn {
            if header.lsn < prev {
                return Err(CoreError::invalid_log(format!(
                    "{} follows {prev}; sequence numbers went backwards",
                    header.lsn
                )));
            }
        }
        if header.checksum != header_checksum(header.lsn, header.length) {
            return Err(CoreError::invalid_log(format!(
                "header checksum mismatch for {}",
                header.lsn
            )));
        }
        Ok((header.lsn, payload_len))
    }

    /// Opens segment `file_number` and validates its header.
    fn open_segment(&mut self, file_number: u64) -> CoreResult<Option<SegmentReader>> {
        let Some(backend) = self.provider.open(file_number)? else {
            return Ok(None);
        };
        self.last_good.file_number = file_number;
        self.last_good.file_offset = 0;

        let mut segment = SegmentReader {
            backend,
            file_number,
            offset: 0,
        };
        let mut bytes = [0u8; LOG_FILE_HEADER_SIZE];
        segment.read_exact(&mut bytes)?;
        let header = LogFileHeader::from_bytes(&bytes);
        if header.file_number != file_number {
            return Err(CoreError::invalid_log(format!(
                "segment {file_number} claims to be segment {}",
                header.file_number
            )));
        }
        if header.magic != LOG_FILE_HEADER_MAGIC {
            return Err(CoreError::invalid_log(format!(
                "bad segment magic {:#010x} in segment {file_number}",
                header.magic
            )));
        }

        self.last_good.file_offset = LOG_FILE_HEADER_SIZE as u64;
        trace!(file_number, "segment opened");
        Ok(Some(segment))
    }
}

impl Iterator for LogScanner {
    type Item = CoreResult<LogRecord>;

    /// Yields owned records until the end of the log or the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, ScanState::Invalid(_) | ScanState::Closed) {
            return None;
        }
        let mut record = LogRecord::new();
        match self.next_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
