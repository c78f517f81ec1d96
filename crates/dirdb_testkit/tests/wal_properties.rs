//! Ordering, corruption and resumption properties of the write-ahead log.

use dirdb_core::wal::{LogAnchor, LogFileProvider, LogRecord, LogScanner, LogWriter, ScanState};
use dirdb_core::{Config, CoreError, Lsn};
use dirdb_storage::StorageBackend;
use dirdb_testkit::prelude::*;
use proptest::prelude::*;
use std::fs::OpenOptions;
use std::sync::Arc;

/// Small segments, so generated runs span several files.
fn small_segments() -> Config {
    Config::default().max_log_file_size(256).sync_on_write(false)
}

fn payloads_of(records: &[LogRecord]) -> Vec<Vec<u8>> {
    records.iter().map(|r| r.payload().to_vec()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn records_read_back_in_order_then_end(payloads in log_payloads_strategy()) {
        let log = memory_log();
        let anchors = write_log_with(log.clone(), &small_segments(), &payloads);

        let mut scanner = LogScanner::new(log, LogAnchor::start_of(0));
        let mut record = LogRecord::new();
        for (payload, anchor) in payloads.iter().zip(&anchors) {
            prop_assert!(scanner.next_record(&mut record).unwrap());
            prop_assert_eq!(record.payload(), payload.as_slice());
            prop_assert_eq!(record.anchor(), Some(*anchor));
        }
        prop_assert!(!scanner.next_record(&mut record).unwrap());
        prop_assert!(!scanner.next_record(&mut record).unwrap());
        prop_assert_eq!(scanner.state(), &ScanState::Eof);

        let lsns: Vec<_> = anchors.iter().map(|a| a.lsn.unwrap().as_u64()).collect();
        let expected: Vec<_> = (1..=payloads.len() as u64).collect();
        prop_assert_eq!(lsns, expected);
    }

    #[test]
    fn corrupt_checksum_stops_the_scan_for_good(
        payloads in prop::collection::vec(log_payload_strategy(), 1..16),
        pick in any::<prop::sample::Index>(),
    ) {
        let log = memory_log();
        let anchors = write_log_with(log.clone(), &small_segments(), &payloads);
        let bad = pick.index(anchors.len());
        let target = anchors[bad];

        let mut segment = log.segment(target.file_number).unwrap();
        let at = target.file_offset + 23;
        let byte = segment.read_at(at, 1).unwrap()[0];
        segment.write_at(at, &[byte ^ 0x5a]).unwrap();

        let mut scanner = LogScanner::new(log, LogAnchor::start_of(0));
        let mut record = LogRecord::new();
        for payload in &payloads[..bad] {
            prop_assert!(scanner.next_record(&mut record).unwrap());
            prop_assert_eq!(record.payload(), payload.as_slice());
        }
        for _ in 0..3 {
            let err = scanner.next_record(&mut record).unwrap_err();
            prop_assert!(err.is_invalid_log(), "{}", err);
        }
        scanner.close();
        prop_assert!(scanner.next_record(&mut record).unwrap_err().is_invalid_log());

        let previous = bad.checked_sub(1).and_then(|i| anchors[i].lsn);
        prop_assert_eq!(
            scanner.last_good_anchor(),
            LogAnchor::new(target.file_number, target.file_offset, previous)
        );
    }

    #[test]
    fn resuming_at_an_anchor_yields_that_record(
        payloads in prop::collection::vec(log_payload_strategy(), 1..16),
        pick in any::<prop::sample::Index>(),
    ) {
        let log = memory_log();
        let anchors = write_log_with(log.clone(), &small_segments(), &payloads);
        let at = pick.index(anchors.len());

        let (records, scanner) = read_log(log.clone(), anchors[at]);
        prop_assert_eq!(scanner.state(), &ScanState::Eof);
        prop_assert_eq!(payloads_of(&records), payloads[at..].to_vec());
        prop_assert_eq!(records[0].lsn(), anchors[at].lsn);

        let wrong = anchors[at].lsn.map(Lsn::next);
        let mismatched = LogAnchor::new(anchors[at].file_number, anchors[at].file_offset, wrong);
        let mut scanner = LogScanner::new(log, mismatched);
        let mut record = LogRecord::new();
        prop_assert!(scanner.next_record(&mut record).unwrap_err().is_invalid_log());
        prop_assert!(matches!(scanner.state(), ScanState::Invalid(_)));
    }

    #[test]
    fn reopened_writer_continues_the_sequence(
        first in log_payloads_strategy(),
        second in prop::collection::vec(log_payload_strategy(), 1..8),
    ) {
        let log = memory_log();
        write_log_with(log.clone(), &small_segments(), &first);
        let anchors = write_log_with(log.clone(), &small_segments(), &second);
        prop_assert_eq!(anchors[0].lsn, Some(Lsn::new(first.len() as u64 + 1)));

        let (records, _) = read_log(log, LogAnchor::start_of(0));
        let mut all = first.clone();
        all.extend(second);
        prop_assert_eq!(payloads_of(&records), all);
    }
}

#[test]
fn scanner_reads_a_log_directory_across_segments() {
    init_tracing();
    with_temp_log_dir(|log| {
        let payloads: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 100]).collect();
        let anchors = write_log_with(log.provider(), &small_segments(), &payloads);
        assert!(anchors.last().unwrap().file_number > 0);

        let numbers = log.dir.file_numbers().unwrap();
        assert_eq!(numbers.first(), Some(&0));
        assert_eq!(numbers.last(), Some(&anchors.last().unwrap().file_number));

        let (records, scanner) = read_log(log.provider(), LogAnchor::start_of(0));
        assert_eq!(payloads_of(&records), payloads);
        assert_eq!(scanner.state(), &ScanState::Eof);
    });
}

#[test]
fn torn_tail_on_disk_is_dropped_on_reopen() {
    init_tracing();
    with_temp_log_dir(|log| {
        let payloads: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 40]).collect();
        let anchors = write_log(log.provider(), &payloads);
        let last = anchors[3];

        let file = OpenOptions::new()
            .write(true)
            .open(log.dir.segment_path(last.file_number))
            .unwrap();
        file.set_len(last.file_offset + 10).unwrap();
        drop(file);

        let (records, scanner) = read_log(log.provider(), LogAnchor::start_of(0));
        assert_eq!(records.len(), 3);
        assert!(matches!(scanner.state(), ScanState::Invalid(_)));

        let provider: Arc<dyn LogFileProvider> = log.provider();
        let mut writer = LogWriter::open(provider, &Config::default()).unwrap();
        assert_eq!(writer.next_lsn(), Lsn::new(4));
        let anchor = writer.append(b"replacement").unwrap();
        assert_eq!(anchor.file_offset, last.file_offset);

        let (records, scanner) = read_log(log.provider(), LogAnchor::start_of(0));
        assert_eq!(records.len(), 4);
        assert_eq!(records[3].payload(), b"replacement");
        assert_eq!(scanner.state(), &ScanState::Eof);
    });
}

#[test]
fn closed_scanner_refuses_reads() {
    let log = memory_log();
    write_log(log.clone(), &[b"only".to_vec()]);
    let mut scanner = LogScanner::new(log, LogAnchor::start_of(0));
    scanner.close();
    scanner.close();
    assert!(matches!(
        scanner.next_record(&mut LogRecord::new()),
        Err(CoreError::ScannerClosed)
    ));
}
