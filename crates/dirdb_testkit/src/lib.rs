//! # DirDB Testkit
//!
//! Test utilities for DirDB.
//!
//! This crate provides:
//! - Sample directories, temporary log directories and cursor helpers
//! - Property-based test generators using proptest
//!
//! The cross-module property tests live in this crate's `tests/`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dirdb_testkit::prelude::*;
//!
//! #[test]
//! fn negation_keeps_entries_without_the_attribute() {
//!     let store = sample_directory();
//!     let filter = ExprNode::not(ExprNode::equality("ou", "drama"));
//!     assert_eq!(search(&store, &filter), vec![ENTRY_B]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use dirdb_core::query::{Entry, ExprNode, MemoryStore};
    pub use dirdb_core::EntryId;
}

pub use fixtures::*;
pub use generators::*;
