//! Store configuration.

/// Configuration shared by the page file and the write-ahead log.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of a page (block) in the record file, in bytes.
    pub page_size: usize,

    /// Maximum size of a single log segment before the writer rolls over to
    /// the next numbered segment.
    pub max_log_file_size: u64,

    /// Whether to sync the log segment after every append (safer but slower).
    pub sync_on_write: bool,

    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 8192,
            max_log_file_size: 64 * 1024 * 1024, // 64 MB
            sync_on_write: true,
            create_if_missing: true,
        }
    }
}

impl Config {
    /// Smallest page size that still fits the page header and one free slot.
    pub const MIN_PAGE_SIZE: usize = 64;

    /// Largest page size whose free-list slot count still fits the page's
    /// 16-bit counter.
    pub const MAX_PAGE_SIZE: usize = 1 << 20;

    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the maximum log segment size.
    #[must_use]
    pub const fn max_log_file_size(mut self, size: u64) -> Self {
        self.max_log_file_size = size;
        self
    }

    /// Sets whether to sync the log on every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to create the log directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}
