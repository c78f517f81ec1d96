//! Crash recovery: replay the valid prefix of the log.

use crate::error::CoreResult;
use crate::types::Lsn;
use crate::wal::anchor::{LogAnchor, LogRecord};
use crate::wal::provider::LogFileProvider;
use crate::wal::scanner::LogScanner;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a recovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Position just past the last record that validated.
    pub last_good: LogAnchor,
    /// LSN the next record appended at `last_good` must carry. `None` only
    /// when the pass started without a known LSN and read nothing.
    pub next_lsn: Option<Lsn>,
    /// Number of records handed to the caller.
    pub records: u64,
    /// `true` when the scan stopped on invalid content rather than at the
    /// end of the log.
    pub stopped_on_invalid: bool,
}

/// Scans the log from `start` and passes every valid record to `apply`.
///
/// Invalid content ends the pass normally; everything before it has been
/// applied and [`RecoveryReport::last_good`] marks where a writer may resume.
///
/// # Errors
///
/// Returns any non-content error from the scanner, or the first error
/// returned by `apply`.
pub fn recover<F>(
    provider: Arc<dyn LogFileProvider>,
    start: LogAnchor,
    mut apply: F,
) -> CoreResult<RecoveryReport>
where
    F: FnMut(&LogRecord) -> CoreResult<()>,
{
    let mut scanner = LogScanner::new(provider, start);
    let mut record = LogRecord::new();
    let mut records = 0;

    let stopped_on_invalid = loop {
        match scanner.next_record(&mut record) {
            Ok(true) => {
                if let Err(e) = apply(&record) {
                    scanner.close();
                    return Err(e);
                }
                records += 1;
            }
            Ok(false) => break false,
            Err(e) if e.is_invalid_log() => break true,
            Err(e) => return Err(e),
        }
    };

    let last_good = scanner.last_good_anchor();
    let next_lsn = scanner.next_lsn();
    scanner.close();

    if stopped_on_invalid {
        warn!(%start, %last_good, records, "recovery stopped at invalid log content");
    } else {
        info!(%start, %last_good, records, "recovery complete");
    }

    Ok(RecoveryReport {
        last_good,
        next_lsn,
        records,
        stopped_on_invalid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CoreError;
    use crate::wal::provider::MemoryLogFiles;
    use crate::wal::writer::LogWriter;
    use dirdb_storage::StorageBackend;

    fn written(payloads: &[&[u8]]) -> Arc<MemoryLogFiles> {
        let files = Arc::new(MemoryLogFiles::new());
        let mut writer = LogWriter::open(files.clone(), &Config::default()).unwrap();
        for payload in payloads {
            writer.append(payload).unwrap();
        }
        files
    }

    #[test]
    fn replays_every_record() {
        let files = written(&[b"a", b"b", b"c"]);
        let mut seen = Vec::new();
        let report = recover(files, LogAnchor::start_of(0), |record| {
            seen.push(record.payload().to_vec());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(report.records, 3);
        assert!(!report.stopped_on_invalid);
        assert_eq!(report.last_good.lsn, Some(Lsn::new(3)));
        assert_eq!(report.next_lsn, Some(Lsn::new(4)));
    }

    #[test]
    fn stops_at_corruption() {
        let files = written(&[b"first", b"second"]);
        let mut raw = files.segment(0).unwrap();
        let size = raw.size().unwrap();
        raw.truncate(size - 1).unwrap();

        let report = recover(files, LogAnchor::start_of(0), |_| Ok(())).unwrap();
        assert_eq!(report.records, 1);
        assert!(report.stopped_on_invalid);
        assert_eq!(report.last_good.lsn, Some(Lsn::new(1)));
    }

    #[test]
    fn apply_error_aborts() {
        let files = written(&[b"a", b"b"]);
        let result = recover(files, LogAnchor::start_of(0), |_| {
            Err(CoreError::invalid_operation("replay refused"))
        });
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn empty_log_recovers_nothing() {
        let files = Arc::new(MemoryLogFiles::new());
        let report = recover(files, LogAnchor::start_of(0), |_| Ok(())).unwrap();
        assert_eq!(report.records, 0);
        assert_eq!(report.last_good, LogAnchor::start_of(0));
        assert_eq!(report.next_lsn, None);
    }

    #[test]
    fn resuming_from_a_checkpoint_keeps_lsns_increasing() {
        let files = Arc::new(MemoryLogFiles::new());
        let config = Config::default();
        let mut writer = LogWriter::open(files.clone(), &config).unwrap();
        for payload in [b"a", b"b", b"c"] {
            writer.append(payload).unwrap();
        }
        let checkpoint = writer.end_anchor().unwrap();
        drop(writer);

        let report = recover(files.clone(), checkpoint, |_| Ok(())).unwrap();
        assert_eq!(report.records, 0);
        assert_eq!(report.next_lsn, Some(Lsn::new(4)));

        let mut writer =
            LogWriter::resume_after(files.clone(), &config, report.last_good, report.next_lsn)
                .unwrap();
        let appended = writer.append(b"d").unwrap();
        assert_eq!(appended.lsn, Some(Lsn::new(4)));
        drop(writer);

        let full = recover(files, LogAnchor::start_of(0), |_| Ok(())).unwrap();
        assert_eq!(full.records, 4);
        assert!(!full.stopped_on_invalid);
        assert_eq!(full.next_lsn, Some(Lsn::new(5)));
    }
}
