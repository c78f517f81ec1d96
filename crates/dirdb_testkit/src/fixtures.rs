//! Test fixtures and helpers.
//!
//! Sample directories for query tests, in-memory and temporary on-disk log
//! directories for log tests, and an in-memory page file for allocator
//! tests.

use dirdb_core::page::PageManager;
use dirdb_core::query::{CursorBuilder, Entry, Evaluator, ExprNode, IndexedStore, MemoryStore};
use dirdb_core::wal::{LogAnchor, LogDir, LogFileProvider, LogRecord, LogScanner, LogWriter, MemoryLogFiles};
use dirdb_core::{Config, CoreResult, EntryId};
use dirdb_storage::InMemoryBackend;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// The entry of [`sample_directory`] with `ou=drama`.
pub const ENTRY_A: EntryId = EntryId(1);

/// The entry of [`sample_directory`] without an `ou` value.
pub const ENTRY_B: EntryId = EntryId(2);

/// Installs a test-writer tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a store from `entries`, with user indices on `indices`.
///
/// # Panics
///
/// Panics if an entry is a duplicate or names a missing parent.
pub fn store_with<I, S>(entries: impl IntoIterator<Item = Entry>, indices: I) -> MemoryStore
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut store = MemoryStore::with_indices(indices);
    for entry in entries {
        store.insert(entry).expect("Failed to insert entry");
    }
    store
}

/// Two root entries: [`ENTRY_A`] with `ou=drama` and [`ENTRY_B`] with only
/// a `cn`. `ou` is indexed.
pub fn sample_directory() -> MemoryStore {
    store_with(
        [
            Entry::new(ENTRY_A, None).with("ou", "drama").with("cn", "hamlet"),
            Entry::new(ENTRY_B, None).with("cn", "readme"),
        ],
        ["ou"],
    )
}

/// Drains a cursor into ids, in cursor order.
///
/// # Panics
///
/// Panics if the cursor yields an error.
pub fn collect_ids<I>(cursor: I) -> Vec<EntryId>
where
    I: Iterator<Item = CoreResult<dirdb_core::query::Candidate>>,
{
    cursor
        .map(|candidate| candidate.expect("Cursor failed").id)
        .collect()
}

/// Builds a cursor for `filter` over `store` and drains it.
///
/// # Panics
///
/// Panics if the filter cannot be built or the cursor fails.
pub fn search(store: &dyn IndexedStore, filter: &ExprNode) -> Vec<EntryId> {
    let cursor = CursorBuilder::new(store)
        .build(filter)
        .expect("Failed to build cursor");
    collect_ids(cursor)
}

/// Evaluates `filter` against every entry of `store`, one by one.
///
/// The reference result cursors are checked against.
///
/// # Panics
///
/// Panics if the store or the evaluation fails.
pub fn brute_force(store: &dyn IndexedStore, filter: &ExprNode) -> BTreeSet<EntryId> {
    let evaluator = Evaluator::new(store);
    store
        .full_scan()
        .expect("Failed to scan store")
        .map(|id| id.expect("Failed to scan store"))
        .filter(|id| evaluator.evaluate(filter, *id).expect("Failed to evaluate"))
        .collect()
}

/// Every id of `store`.
///
/// # Panics
///
/// Panics if the scan fails.
pub fn all_ids(store: &dyn IndexedStore) -> BTreeSet<EntryId> {
    store
        .full_scan()
        .expect("Failed to scan store")
        .map(|id| id.expect("Failed to scan store"))
        .collect()
}

/// A log directory in a temporary directory, removed on drop.
pub struct TempLogDir {
    /// The locked log directory.
    pub dir: Arc<LogDir>,
    _temp_dir: TempDir,
}

impl TempLogDir {
    /// Creates and locks a fresh log directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created or locked.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = LogDir::open(&temp_dir.path().join("log"), &Config::default())
            .expect("Failed to open log directory");
        Self {
            dir: Arc::new(dir),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the log directory as a segment provider.
    pub fn provider(&self) -> Arc<dyn LogFileProvider> {
        self.dir.clone()
    }

    /// Returns the path of the log directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TempLogDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a temporary log directory.
///
/// # Example
///
/// ```rust,ignore
/// use dirdb_testkit::with_temp_log_dir;
///
/// #[test]
/// fn my_test() {
///     with_temp_log_dir(|log| {
///         let anchors = write_log(log.provider(), &[b"add".to_vec()]);
///         assert_eq!(anchors.len(), 1);
///     });
/// }
/// ```
pub fn with_temp_log_dir<F, R>(f: F) -> R
where
    F: FnOnce(&TempLogDir) -> R,
{
    let log = TempLogDir::new();
    f(&log)
}

/// Creates an empty in-memory log.
pub fn memory_log() -> Arc<MemoryLogFiles> {
    Arc::new(MemoryLogFiles::new())
}

/// Appends `payloads` through a fresh writer and returns each record's
/// anchor.
///
/// # Panics
///
/// Panics if the writer cannot be opened or an append fails.
pub fn write_log(provider: Arc<dyn LogFileProvider>, payloads: &[Vec<u8>]) -> Vec<LogAnchor> {
    write_log_with(provider, &Config::default(), payloads)
}

/// Like [`write_log`], with an explicit configuration.
///
/// # Panics
///
/// Panics if the writer cannot be opened or an append fails.
pub fn write_log_with(
    provider: Arc<dyn LogFileProvider>,
    config: &Config,
    payloads: &[Vec<u8>],
) -> Vec<LogAnchor> {
    let mut writer = LogWriter::open(provider, config).expect("Failed to open log writer");
    payloads
        .iter()
        .map(|payload| writer.append(payload).expect("Failed to append record"))
        .collect()
}

/// Reads records from `start` until the scanner stops, returning the
/// records read and the scanner, whose state tells why it stopped.
pub fn read_log(provider: Arc<dyn LogFileProvider>, start: LogAnchor) -> (Vec<LogRecord>, LogScanner) {
    let mut scanner = LogScanner::new(provider, start);
    let mut records = Vec::new();
    loop {
        let mut record = LogRecord::new();
        match scanner.next_record(&mut record) {
            Ok(true) => records.push(record),
            Ok(false) | Err(_) => break,
        }
    }
    (records, scanner)
}

/// Opens a page manager over an empty in-memory backend.
///
/// # Panics
///
/// Panics if the page size is below the minimum.
pub fn memory_pages(page_size: usize) -> PageManager {
    PageManager::open(
        Box::new(InMemoryBackend::new()),
        &Config::default().page_size(page_size),
    )
    .expect("Failed to open page manager")
}
