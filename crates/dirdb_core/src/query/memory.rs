//! In-memory indexed partition.

use crate::error::{CoreError, CoreResult};
use crate::query::expr::{ScopeNode, SearchScope};
use crate::query::store::{Entry, IdIter, IndexEntry, IndexIter, IndexSeek, IndexedStore};
use crate::types::EntryId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// Ordered `value -> entry ids` index over one attribute.
///
/// Supports equality lookups, half-open ranges and prefix scans in key order.
#[derive(Debug, Default, Clone)]
struct AttributeIndex {
    entries: BTreeMap<String, BTreeSet<EntryId>>,
    count: usize,
}

impl AttributeIndex {
    fn insert(&mut self, key: &str, id: EntryId) {
        if self.entries.entry(key.to_owned()).or_default().insert(id) {
            self.count += 1;
        }
    }

    fn remove(&mut self, key: &str, id: EntryId) {
        if let Some(set) = self.entries.get_mut(key) {
            if set.remove(&id) {
                self.count -= 1;
                if set.is_empty() {
                    self.entries.remove(key);
                }
            }
        }
    }

    /// Returns the pairs covered by `seek`, in key order.
    fn scan(&self, seek: &IndexSeek) -> impl Iterator<Item = (&str, EntryId)> + '_ {
        let (lower, upper, prefix) = match seek {
            IndexSeek::Equal(v) => (Bound::Included(v.clone()), Bound::Included(v.clone()), None),
            IndexSeek::AtLeast(v) => (Bound::Included(v.clone()), Bound::Unbounded, None),
            IndexSeek::AtMost(v) => (Bound::Unbounded, Bound::Included(v.clone()), None),
            IndexSeek::Prefix(p) => (Bound::Included(p.clone()), Bound::Unbounded, Some(p.clone())),
            IndexSeek::All => (Bound::Unbounded, Bound::Unbounded, None),
        };
        self.entries
            .range::<String, _>((lower, upper))
            .take_while(move |(key, _)| prefix.as_deref().map_or(true, |p| key.starts_with(p)))
            .flat_map(|(key, ids)| ids.iter().map(move |id| (key.as_str(), *id)))
    }

    fn len(&self) -> usize {
        self.count
    }
}

/// An in-memory directory partition.
///
/// Keeps entries with parent links, one ordered user index per indexed
/// attribute, and an existence index keyed by attribute name covering every
/// attribute.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<EntryId, Entry>,
    children: HashMap<EntryId, BTreeSet<EntryId>>,
    user_indices: HashMap<String, AttributeIndex>,
    existence: AttributeIndex,
}

impl MemoryStore {
    /// Creates an empty store without user indices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with user indices on `attributes`.
    pub fn with_indices<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::new();
        for attribute in attributes {
            store.add_index(attribute);
        }
        store
    }

    /// Adds a user index on `attribute`, indexing existing entries.
    pub fn add_index(&mut self, attribute: impl Into<String>) {
        let attribute = attribute.into();
        let mut index = AttributeIndex::default();
        for entry in self.entries.values() {
            for value in entry.values(&attribute) {
                index.insert(value, entry.id);
            }
        }
        self.user_indices.insert(attribute, index);
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or the parent does not exist.
    pub fn insert(&mut self, entry: Entry) -> CoreResult<()> {
        if self.entries.contains_key(&entry.id) {
            return Err(CoreError::invalid_operation(format!(
                "{} already exists",
                entry.id
            )));
        }
        if let Some(parent) = entry.parent {
            if !self.entries.contains_key(&parent) {
                return Err(CoreError::invalid_operation(format!(
                    "parent {parent} of {} does not exist",
                    entry.id
                )));
            }
            self.children.entry(parent).or_default().insert(entry.id);
        }

        self.index_entry(&entry, true);
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Removes a leaf entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry still has children.
    pub fn remove(&mut self, id: EntryId) -> CoreResult<Option<Entry>> {
        if self.children.get(&id).is_some_and(|c| !c.is_empty()) {
            return Err(CoreError::invalid_operation(format!(
                "{id} has children and cannot be removed"
            )));
        }
        let Some(entry) = self.entries.remove(&id) else {
            return Ok(None);
        };
        self.children.remove(&id);
        if let Some(parent) = entry.parent {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(&id);
            }
        }
        self.index_entry(&entry, false);
        Ok(Some(entry))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_entry(&mut self, entry: &Entry, add: bool) {
        for (attribute, values) in &entry.attributes {
            if values.is_empty() {
                continue;
            }
            if add {
                self.existence.insert(attribute, entry.id);
            } else {
                self.existence.remove(attribute, entry.id);
            }
            if let Some(index) = self.user_indices.get_mut(attribute) {
                for value in values {
                    if add {
                        index.insert(value, entry.id);
                    } else {
                        index.remove(value, entry.id);
                    }
                }
            }
        }
    }

    fn user_index(&self, attribute: &str) -> CoreResult<&AttributeIndex> {
        self.user_indices
            .get(attribute)
            .ok_or_else(|| CoreError::invalid_operation(format!("no index on {attribute}")))
    }

    fn children_of(&self, id: EntryId) -> impl Iterator<Item = EntryId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    fn subtree(&self, base: EntryId) -> Subtree<'_> {
        let stack = if self.entries.contains_key(&base) {
            vec![base]
        } else {
            Vec::new()
        };
        Subtree { store: self, stack }
    }
}

/// Depth-first walk of a subtree, base first.
struct Subtree<'a> {
    store: &'a MemoryStore,
    stack: Vec<EntryId>,
}

impl Iterator for Subtree<'_> {
    type Item = EntryId;

    fn next(&mut self) -> Option<EntryId> {
        let id = self.stack.pop()?;
        let before = self.stack.len();
        self.stack.extend(self.store.children_of(id));
        self.stack[before..].reverse();
        Some(id)
    }
}

impl IndexedStore for MemoryStore {
    fn has_index_on(&self, attribute: &str) -> bool {
        self.user_indices.contains_key(attribute)
    }

    fn index_scan(&self, attribute: &str, seek: &IndexSeek) -> CoreResult<IndexIter<'_>> {
        let pairs = self.user_index(attribute)?.scan(seek).map(|(value, id)| {
            Ok(IndexEntry {
                value: value.to_owned(),
                id,
            })
        });
        Ok(Box::new(pairs))
    }

    fn presence_scan(&self, attribute: &str) -> CoreResult<IdIter<'_>> {
        let ids = self
            .existence
            .entries
            .get(attribute)
            .into_iter()
            .flatten()
            .map(|id| Ok(*id));
        Ok(Box::new(ids))
    }

    fn full_scan(&self) -> CoreResult<IdIter<'_>> {
        Ok(Box::new(self.entries.keys().map(|id| Ok(*id))))
    }

    fn scope_scan(&self, scope: &ScopeNode) -> CoreResult<IdIter<'_>> {
        let base = scope.base;
        let ids: IdIter<'_> = match scope.scope {
            SearchScope::Base => Box::new(
                self.entries
                    .contains_key(&base)
                    .then_some(Ok(base))
                    .into_iter(),
            ),
            SearchScope::OneLevel => Box::new(self.children_of(base).map(Ok)),
            SearchScope::Subtree => Box::new(self.subtree(base).map(Ok)),
        };
        Ok(ids)
    }

    fn in_scope(&self, scope: &ScopeNode, id: EntryId) -> CoreResult<bool> {
        let Some(entry) = self.entries.get(&id) else {
            return Ok(false);
        };
        Ok(match scope.scope {
            SearchScope::Base => id == scope.base,
            SearchScope::OneLevel => entry.parent == Some(scope.base),
            SearchScope::Subtree => {
                let mut current = Some(id);
                while let Some(at) = current {
                    if at == scope.base {
                        return Ok(true);
                    }
                    current = self.entries.get(&at).and_then(|e| e.parent);
                }
                false
            }
        })
    }

    fn lookup(&self, id: EntryId) -> CoreResult<Option<Entry>> {
        Ok(self.entries.get(&id).cloned())
    }

    fn entry_count(&self) -> CoreResult<u64> {
        Ok(self.entries.len() as u64)
    }

    fn index_count(&self, attribute: &str, seek: &IndexSeek) -> CoreResult<u64> {
        let index = self.user_index(attribute)?;
        if *seek == IndexSeek::All {
            return Ok(index.len() as u64);
        }
        Ok(index.scan(seek).count() as u64)
    }

    fn presence_count(&self, attribute: &str) -> CoreResult<u64> {
        Ok(self
            .existence
            .entries
            .get(attribute)
            .map_or(0, |ids| ids.len() as u64))
    }

    fn scope_count(&self, scope: &ScopeNode) -> CoreResult<u64> {
        Ok(match scope.scope {
            SearchScope::Base => u64::from(self.entries.contains_key(&scope.base)),
            SearchScope::OneLevel => self.children_of(scope.base).count() as u64,
            SearchScope::Subtree => self.subtree(scope.base).count() as u64,
        })
    }
}
