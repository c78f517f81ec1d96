//! # DirDB Storage
//!
//! Byte-addressed stores underneath DirDB's page files and log segments.
//!
//! A [`StorageBackend`] knows nothing about blocks, free lists or log
//! framing. The core crate lays its formats over these primitives:
//!
//! - `read_at` / `write_at` for fixed-size blocks of a page file
//! - `append` / `truncate` for log segments, which only grow at the tail
//!   and are cut back to the last valid record during recovery
//! - `flush` / `sync` for durability
//!
//! [`InMemoryBackend`] handles share one buffer when cloned, so tests can
//! corrupt bytes under a live scanner. [`FileBackend`] wraps an OS file.
//!
//! ```rust
//! use dirdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut segment = InMemoryBackend::new();
//! let offset = segment.append(b"header|record").unwrap();
//! segment.write_at(offset, b"HEADER").unwrap();
//! segment.truncate(6).unwrap();
//! assert_eq!(segment.read_at(0, 6).unwrap(), b"HEADER");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
