//! Write-ahead log.
//!
//! The log is a sequence of numbered segments. Each segment starts with a
//! header naming its own number; records follow back to back. See [`format`]
//! for the byte layout.
//!
//! - [`LogWriter`] appends records and rolls over to new segments
//! - [`LogScanner`] reads them back in order, validating framing, ordering
//!   and checksums, and stops for good at the first invalid byte
//! - [`recover`] replays the valid prefix and reports where it ends
//! - [`LogDir`] and [`MemoryLogFiles`] supply the segments
//!
//! Every position handed out is a [`LogAnchor`]. A scan started at a record's
//! anchor yields that record first, or fails if the LSN there differs.

mod anchor;
mod dir;
pub mod format;
mod provider;
mod recovery;
mod scanner;
mod writer;

pub use anchor::{LogAnchor, LogRecord};
pub use dir::LogDir;
pub use provider::{LogFileProvider, MemoryLogFiles};
pub use recovery::{recover, RecoveryReport};
pub use scanner::{LogScanner, ScanState};
pub use writer::{LogWriter, FIRST_LSN};
