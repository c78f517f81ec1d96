//! Filter expressions and candidate cursors.
//!
//! A filter is an [`ExprNode`] tree. [`annotate`] records a candidate-count
//! estimate on every conjunction child; [`CursorBuilder::build`] then turns
//! the tree into a [`Cursor`] that pulls matching entry ids from an
//! [`IndexedStore`] on demand.
//!
//! ## Planning
//!
//! - An indexed leaf scans its index; any other leaf scans every entry and
//!   re-checks the leaf per candidate
//! - A conjunction scans its cheapest child (the last one on ties) and checks
//!   the remaining children per candidate
//! - A disjunction drains its children in order, dropping ids an earlier
//!   child already covers
//! - A negation scans every entry and keeps those the child rejects
//!
//! ## Invariants
//!
//! - A conjunction yields the intersection of its children whichever child
//!   drives it
//! - A negation yields the complement of its child within all entries,
//!   including entries without the attribute
//! - Every cursor yields each entry id at most once

mod builder;
mod cursor;
mod evaluator;
mod expr;
mod memory;
mod optimizer;
mod store;

pub use builder::CursorBuilder;
pub use cursor::{AssertCursor, Candidate, Cursor, IndexCursor, OrCursor};
pub use evaluator::Evaluator;
pub use expr::{
    Ava, Conjunct, ExprNode, ExtensibleFilter, ScopeNode, SearchScope, SubstringFilter,
};
pub use memory::MemoryStore;
pub use optimizer::annotate;
pub use store::{Entry, IdIter, IndexEntry, IndexIter, IndexSeek, IndexedStore};
