//! Appending records to the log.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::types::Lsn;
use crate::wal::anchor::LogAnchor;
use crate::wal::format::{encode_record, LogFileHeader, LOG_FILE_HEADER_SIZE};
use crate::wal::provider::LogFileProvider;
use crate::wal::recovery::recover;
use dirdb_storage::StorageBackend;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// LSN of the first record of a new log.
pub const FIRST_LSN: Lsn = Lsn(1);

/// Appends framed records to the current segment, rolling over to the next
/// numbered segment when the configured size would be exceeded.
///
/// A single writer owns the log; the provider's lock (if any) enforces it.
pub struct LogWriter {
    provider: Arc<dyn LogFileProvider>,
    segment: Box<dyn StorageBackend>,
    file_number: u64,
    next_lsn: Lsn,
    max_file_size: u64,
    sync_on_write: bool,
}

impl LogWriter {
    /// Opens the log for appending.
    ///
    /// An empty provider gets segment 0. Otherwise the log is scanned from
    /// its lowest segment and the writer resumes after the last valid record,
    /// discarding any torn or corrupt tail.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn open(provider: Arc<dyn LogFileProvider>, config: &Config) -> CoreResult<Self> {
        let Some(&first) = provider.file_numbers()?.first() else {
            let segment = start_segment(provider.as_ref(), 0)?;
            info!("log created");
            return Ok(Self::with_segment(provider, config, segment, 0, FIRST_LSN));
        };

        let report = recover(provider.clone(), LogAnchor::start_of(first), |_| Ok(()))?;
        Self::resume_after(provider, config, report.last_good, report.next_lsn)
    }

    /// Opens the log for appending right after `last_good`, with the next
    /// record numbered `next_lsn`. Both come from the same scan:
    /// [`RecoveryReport`](crate::wal::RecoveryReport) or
    /// [`LogScanner::last_good_anchor`](crate::wal::LogScanner::last_good_anchor)
    /// with [`LogScanner::next_lsn`](crate::wal::LogScanner::next_lsn).
    ///
    /// Bytes past the anchor in its segment are truncated and every later
    /// segment is removed. A `next_lsn` of `None` starts at [`FIRST_LSN`] and
    /// is only accepted where no record can precede the anchor.
    ///
    /// # Errors
    ///
    /// Returns an error if the anchor's segment is missing or shorter than
    /// the anchor's offset, if `next_lsn` is `None` after earlier records, or
    /// on I/O failure.
    pub fn resume_after(
        provider: Arc<dyn LogFileProvider>,
        config: &Config,
        last_good: LogAnchor,
        next_lsn: Option<Lsn>,
    ) -> CoreResult<Self> {
        let file_number = last_good.file_number;
        let offset = last_good.file_offset;

        let next_lsn = match next_lsn {
            Some(lsn) => lsn,
            None => {
                let earlier_segment = provider.file_numbers()?.iter().any(|&n| n < file_number);
                if offset > LOG_FILE_HEADER_SIZE as u64 || earlier_segment {
                    return Err(CoreError::invalid_operation(format!(
                        "cannot resume at {last_good} without the next sequence number"
                    )));
                }
                FIRST_LSN
            }
        };

        let segment = if offset < LOG_FILE_HEADER_SIZE as u64 {
            start_segment(provider.as_ref(), file_number)?
        } else {
            let Some(mut segment) = provider.open(file_number)? else {
                return Err(CoreError::invalid_operation(format!(
                    "cannot resume in missing log segment {file_number}"
                )));
            };
            let size = segment.size()?;
            if offset > size {
                return Err(CoreError::invalid_operation(format!(
                    "resume offset {offset} is past the end of segment {file_number} ({size} bytes)"
                )));
            }
            if offset < size {
                segment.truncate(offset)?;
                warn!(file_number, offset, discarded = size - offset, "log tail discarded");
            }
            segment
        };

        for later in provider.file_numbers()? {
            if later > file_number {
                provider.remove(later)?;
                warn!(file_number = later, "log segment past resume point removed");
            }
        }

        info!(%last_good, %next_lsn, "log writer resumed");
        Ok(Self::with_segment(
            provider,
            config,
            segment,
            file_number,
            next_lsn,
        ))
    }

    fn with_segment(
        provider: Arc<dyn LogFileProvider>,
        config: &Config,
        segment: Box<dyn StorageBackend>,
        file_number: u64,
        next_lsn: Lsn,
    ) -> Self {
        Self {
            provider,
            segment,
            file_number,
            next_lsn,
            max_file_size: config.max_log_file_size,
            sync_on_write: config.sync_on_write,
        }
    }

    /// Appends one record and returns the anchor it starts at.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is empty or too large, or on I/O
    /// failure.
    pub fn append(&mut self, payload: &[u8]) -> CoreResult<LogAnchor> {
        let lsn = self.next_lsn;
        let bytes = encode_record(lsn, payload)?;

        let size = self.segment.size()?;
        if size > LOG_FILE_HEADER_SIZE as u64 && size + bytes.len() as u64 > self.max_file_size {
            self.roll_over()?;
        }

        let offset = self.segment.append(&bytes)?;
        if self.sync_on_write {
            self.segment.flush()?;
            self.segment.sync()?;
        }
        self.next_lsn = lsn.next();

        trace!(%lsn, file_number = self.file_number, offset, "record appended");
        Ok(LogAnchor::new(self.file_number, offset, Some(lsn)))
    }

    /// Flushes and syncs the current segment.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.segment.flush()?;
        self.segment.sync()?;
        Ok(())
    }

    /// Returns the LSN the next record will get.
    #[must_use]
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }

    /// Returns the number of the segment being appended to.
    #[must_use]
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Returns the anchor of the next record to be written.
    ///
    /// A scan started here yields exactly the records appended afterwards.
    pub fn end_anchor(&self) -> CoreResult<LogAnchor> {
        Ok(LogAnchor::new(
            self.file_number,
            self.segment.size()?,
            Some(self.next_lsn),
        ))
    }

    fn roll_over(&mut self) -> CoreResult<()> {
        self.sync()?;
        let next = self.file_number + 1;
        self.segment = start_segment(self.provider.as_ref(), next)?;
        self.file_number = next;
        debug!(file_number = next, "log rolled over to new segment");
        Ok(())
    }
}

fn start_segment(
    provider: &dyn LogFileProvider,
    file_number: u64,
) -> CoreResult<Box<dyn StorageBackend>> {
    let mut segment = provider.create(file_number)?;
    segment.append(&LogFileHeader::new(file_number).to_bytes())?;
    segment.flush()?;
    segment.sync()?;
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::anchor::LogRecord;
    use crate::wal::dir::LogDir;
    use crate::wal::format::RECORD_FRAMING_SIZE;
    use crate::wal::provider::MemoryLogFiles;
    use crate::wal::scanner::LogScanner;
    use tempfile::tempdir;

    fn payloads(provider: Arc<dyn LogFileProvider>, start: LogAnchor) -> Vec<(u64, Vec<u8>)> {
        let mut scanner = LogScanner::new(provider, start);
        let mut record = LogRecord::new();
        let mut out = Vec::new();
        while scanner.next_record(&mut record).unwrap() {
            out.push((record.lsn().unwrap().as_u64(), record.payload().to_vec()));
        }
        out
    }

    #[test]
    fn appends_with_increasing_lsns() {
        let files = Arc::new(MemoryLogFiles::new());
        let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();

        let a = writer.append(b"alpha").unwrap();
        let b = writer.append(b"beta").unwrap();
        assert_eq!(a, LogAnchor::new(0, LOG_FILE_HEADER_SIZE as u64, Some(Lsn::new(1))));
        assert_eq!(b.lsn, Some(Lsn::new(2)));
        assert_eq!(b.file_offset, a.file_offset + 5 + RECORD_FRAMING_SIZE as u64);

        assert_eq!(
            payloads(files, LogAnchor::start_of(0)),
            vec![(1, b"alpha".to_vec()), (2, b"beta".to_vec())]
        );
    }

    #[test]
    fn rolls_over_when_segment_is_full() {
        let files = Arc::new(MemoryLogFiles::new());
        let config = Config::new().max_log_file_size(64).sync_on_write(false);
        let mut writer = LogWriter::open(files.clone(), &config).unwrap();

        for i in 0..5u8 {
            writer.append(&[i; 10]).unwrap();
        }
        assert!(writer.file_number() >= 2);
        assert_eq!(files.file_numbers().unwrap().len() as u64, writer.file_number() + 1);

        let read = payloads(files, LogAnchor::start_of(0));
        let lsns: Vec<u64> = read.iter().map(|(lsn, _)| *lsn).collect();
        assert_eq!(lsns, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn oversized_record_still_fits_in_a_fresh_segment() {
        let files = Arc::new(MemoryLogFiles::new());
        let config = Config::new().max_log_file_size(16);
        let mut writer = LogWriter::open(files.clone(), &config).unwrap();
        writer.append(&[7; 100]).unwrap();
        assert_eq!(writer.file_number(), 0);
        assert_eq!(payloads(files, LogAnchor::start_of(0)).len(), 1);
    }

    #[test]
    fn reopen_continues_lsns() {
        let files = Arc::new(MemoryLogFiles::new());
        {
            let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();
            writer.append(b"one").unwrap();
            writer.append(b"two").unwrap();
        }
        let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();
        assert_eq!(writer.next_lsn(), Lsn::new(3));
        writer.append(b"three").unwrap();

        assert_eq!(payloads(files, LogAnchor::start_of(0)).len(), 3);
    }

    #[test]
    fn reopen_discards_torn_tail() {
        let files = Arc::new(MemoryLogFiles::new());
        {
            let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();
            writer.append(b"kept").unwrap();
            writer.append(b"torn").unwrap();
        }
        let mut raw = files.segment(0).unwrap();
        let size = raw.size().unwrap();
        raw.truncate(size - 3).unwrap();

        let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();
        assert_eq!(writer.next_lsn(), Lsn::new(2));
        writer.append(b"replacement").unwrap();

        assert_eq!(
            payloads(files, LogAnchor::start_of(0)),
            vec![(1, b"kept".to_vec()), (2, b"replacement".to_vec())]
        );
    }

    #[test]
    fn resume_after_removes_later_segments() {
        let files = Arc::new(MemoryLogFiles::new());
        let config = Config::new().max_log_file_size(64).sync_on_write(false);
        let mut writer = LogWriter::open(files.clone(), &config).unwrap();
        writer.append(&[1; 10]).unwrap();
        let checkpoint = writer.end_anchor().unwrap();
        for _ in 0..4 {
            writer.append(&[2; 10]).unwrap();
        }
        drop(writer);

        let last_good = LogAnchor::new(
            checkpoint.file_number,
            checkpoint.file_offset,
            Some(Lsn::new(1)),
        );
        let writer =
            LogWriter::resume_after(files.clone(), &config, last_good, checkpoint.lsn).unwrap();
        assert_eq!(writer.next_lsn(), Lsn::new(2));
        assert_eq!(files.file_numbers().unwrap(), vec![0]);
        assert_eq!(payloads(files, LogAnchor::start_of(0)).len(), 1);
    }

    #[test]
    fn end_anchor_starts_a_scan_at_new_records() {
        let files = Arc::new(MemoryLogFiles::new());
        let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();
        writer.append(b"old").unwrap();
        let anchor = writer.end_anchor().unwrap();
        writer.append(b"new").unwrap();

        assert_eq!(payloads(files, anchor), vec![(2, b"new".to_vec())]);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let files = Arc::new(MemoryLogFiles::new());
        let mut writer = LogWriter::open(files, &Config::default()).unwrap();
        assert!(matches!(
            writer.append(b""),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert_eq!(writer.next_lsn(), FIRST_LSN);
    }

    #[test]
    fn resume_in_missing_segment_fails() {
        let files = Arc::new(MemoryLogFiles::new());
        let anchor = LogAnchor::new(3, 40, Some(Lsn::new(9)));
        let next = Some(Lsn::new(10));
        assert!(LogWriter::resume_after(files, &Config::default(), anchor, next).is_err());
    }

    #[test]
    fn resume_without_next_lsn_after_records_fails() {
        let files = Arc::new(MemoryLogFiles::new());
        let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();
        writer.append(b"one").unwrap();
        let end = writer.end_anchor().unwrap();
        drop(writer);

        let at_end = LogAnchor::new(end.file_number, end.file_offset, None);
        assert!(matches!(
            LogWriter::resume_after(files.clone(), &Config::default(), at_end, None),
            Err(CoreError::InvalidOperation { .. })
        ));

        let writer = LogWriter::resume_after(files, &Config::default(), at_end, end.lsn).unwrap();
        assert_eq!(writer.next_lsn(), Lsn::new(2));
    }

    #[test]
    fn log_dir_round_trip() {
        let temp = tempdir().unwrap();
        let config = Config::new().max_log_file_size(80);
        {
            let dir: Arc<dyn LogFileProvider> =
                Arc::new(LogDir::open(temp.path(), &config).unwrap());
            let mut writer = LogWriter::open(dir, &config).unwrap();
            for i in 0..4u8 {
                writer.append(&[i; 20]).unwrap();
            }
        }

        let dir: Arc<dyn LogFileProvider> = Arc::new(LogDir::open(temp.path(), &config).unwrap());
        assert!(dir.file_numbers().unwrap().len() > 1);
        let read = payloads(dir.clone(), LogAnchor::start_of(0));
        assert_eq!(read.len(), 4);
        assert_eq!(read[3], (4, vec![3; 20]));

        let writer = LogWriter::open(dir, &config).unwrap();
        assert_eq!(writer.next_lsn(), Lsn::new(5));
    }
}
