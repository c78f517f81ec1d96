//! The indexed-store capability the cursor builder runs against.

use crate::error::CoreResult;
use crate::query::expr::ScopeNode;
use crate::types::EntryId;
use std::collections::BTreeMap;

/// A directory entry: an id, an optional parent, and multi-valued
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry id.
    pub id: EntryId,
    /// Parent entry; `None` for a partition root.
    pub parent: Option<EntryId>,
    /// Attribute values keyed by attribute name.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(id: EntryId, parent: Option<EntryId>) -> Self {
        Self {
            id,
            parent,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a value to an attribute.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(attribute, value);
        self
    }

    /// Adds a value to an attribute.
    pub fn add(&mut self, attribute: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .entry(attribute.into())
            .or_default()
            .push(value.into());
    }

    /// Returns the values of an attribute; empty when absent.
    #[must_use]
    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes.get(attribute).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if the attribute has at least one value.
    #[must_use]
    pub fn has(&self, attribute: &str) -> bool {
        !self.values(attribute).is_empty()
    }
}

/// Where an index scan starts and which keys it covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexSeek {
    /// Keys equal to the value.
    Equal(String),
    /// Keys ordered at or after the value.
    AtLeast(String),
    /// Keys ordered at or before the value.
    AtMost(String),
    /// Keys starting with the value.
    Prefix(String),
    /// Every key.
    All,
}

/// One `(value, entry id)` pair of an attribute index, in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Indexed attribute value.
    pub value: String,
    /// Entry holding the value.
    pub id: EntryId,
}

/// Lazy sequence of index pairs.
pub type IndexIter<'a> = Box<dyn Iterator<Item = CoreResult<IndexEntry>> + 'a>;

/// Lazy sequence of entry ids.
pub type IdIter<'a> = Box<dyn Iterator<Item = CoreResult<EntryId>> + 'a>;

/// Read access to a partition's entries, indices, and statistics.
///
/// Scans are lazy; errors surface either when a scan is opened or as items
/// of the returned sequence.
pub trait IndexedStore: Send + Sync {
    /// Returns `true` if a user index exists on `attribute`.
    fn has_index_on(&self, attribute: &str) -> bool;

    /// Scans the user index on `attribute`.
    fn index_scan(&self, attribute: &str, seek: &IndexSeek) -> CoreResult<IndexIter<'_>>;

    /// Scans the existence index for entries holding `attribute`.
    fn presence_scan(&self, attribute: &str) -> CoreResult<IdIter<'_>>;

    /// Scans every entry id; the domain a negation is complemented against.
    fn full_scan(&self) -> CoreResult<IdIter<'_>>;

    /// Scans the entries within a scope.
    fn scope_scan(&self, scope: &ScopeNode) -> CoreResult<IdIter<'_>>;

    /// Returns `true` if entry `id` lies within the scope.
    fn in_scope(&self, scope: &ScopeNode, id: EntryId) -> CoreResult<bool>;

    /// Fetches an entry.
    fn lookup(&self, id: EntryId) -> CoreResult<Option<Entry>>;

    /// Returns the number of entries.
    fn entry_count(&self) -> CoreResult<u64>;

    /// Returns the number of pairs an index scan would yield.
    fn index_count(&self, attribute: &str, seek: &IndexSeek) -> CoreResult<u64>;

    /// Returns the number of entries holding `attribute`.
    fn presence_count(&self, attribute: &str) -> CoreResult<u64>;

    /// Returns the number of entries within a scope.
    fn scope_count(&self, scope: &ScopeNode) -> CoreResult<u64>;
}
