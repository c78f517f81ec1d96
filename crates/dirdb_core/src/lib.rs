//! # DirDB Core
//!
//! Storage and query core for the DirDB directory server.
//!
//! This crate provides:
//! - [`page`]: a block-oriented record file, a typed page manager and the
//!   free-space allocator for variable-length physical records
//! - [`wal`]: the write-ahead log format, writer, crash-recovery scanner and
//!   log segment providers
//! - [`query`]: filter expressions and the cursor builder that turns them
//!   into lazy sequences of matching entry ids
//!
//! The three subsystems are independent of each other. Every handle (record
//! file, log provider, indexed store) is passed explicitly; there is no
//! process-wide state.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod types;

pub mod page;
pub mod query;
pub mod wal;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use types::{BlockId, EntryId, Location, Lsn};
