//! Lazy candidate cursors.
//!
//! A [`Cursor`] is a pull-based sequence of [`Candidate`]s. Cursors nest:
//! assertion cursors filter an inner cursor, disjunction cursors chain
//! several. Nothing is read from the store until [`Iterator::next`] is
//! called.

use crate::error::CoreResult;
use crate::query::evaluator::Evaluator;
use crate::query::expr::{Conjunct, ExprNode, SubstringFilter};
use crate::query::store::{IdIter, IndexIter};
use crate::types::EntryId;
use std::collections::HashSet;

/// An entry id produced by a cursor, with the index value it was found
/// under when it came from an attribute index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Matching entry.
    pub id: EntryId,
    /// Index value the entry was found under, if any.
    pub value: Option<String>,
}

impl Candidate {
    fn from_id(id: EntryId) -> Self {
        Self { id, value: None }
    }
}

/// A lazy sequence of candidate entry ids.
pub enum Cursor<'a> {
    /// Pairs from an attribute index.
    Index(IndexCursor<'a>),
    /// Ids from a full, scope or existence scan.
    Scan(IdIter<'a>),
    /// An inner cursor filtered per candidate.
    Assert(AssertCursor<'a>),
    /// The union of several cursors.
    Or(OrCursor<'a>),
}

impl Cursor<'_> {
    /// Returns a short name for the cursor kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Index(_) => "index",
            Self::Scan(_) => "scan",
            Self::Assert(_) => "assert",
            Self::Or(_) => "or",
        }
    }
}

impl Iterator for Cursor<'_> {
    type Item = CoreResult<Candidate>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Index(cursor) => cursor.next(),
            Self::Scan(ids) => ids.next().map(|id| id.map(Candidate::from_id)),
            Self::Assert(cursor) => cursor.next(),
            Self::Or(cursor) => cursor.next(),
        }
    }
}

/// Walks an attribute index, yielding each entry id once even when the
/// entry holds several values in range.
///
/// The ids already yielded are kept in a set that grows with the scan. This
/// is the one cursor that buffers more than the in-flight item; index pairs
/// are ordered by value, so a multi-valued entry's pairs are not adjacent.
pub struct IndexCursor<'a> {
    pairs: IndexIter<'a>,
    pattern: Option<&'a SubstringFilter>,
    seen: HashSet<EntryId>,
}

impl<'a> IndexCursor<'a> {
    pub(crate) fn new(pairs: IndexIter<'a>) -> Self {
        Self {
            pairs,
            pattern: None,
            seen: HashSet::new(),
        }
    }

    /// Keeps only pairs whose value matches `pattern`.
    pub(crate) fn matching(mut self, pattern: &'a SubstringFilter) -> Self {
        self.pattern = Some(pattern);
        self
    }

    fn next(&mut self) -> Option<CoreResult<Candidate>> {
        loop {
            let pair = match self.pairs.next()? {
                Ok(pair) => pair,
                Err(e) => return Some(Err(e)),
            };
            if self.pattern.is_some_and(|p| !p.matches(&pair.value)) {
                continue;
            }
            if self.seen.insert(pair.id) {
                return Some(Ok(Candidate {
                    id: pair.id,
                    value: Some(pair.value),
                }));
            }
        }
    }
}

/// Per-candidate test applied by an [`AssertCursor`].
pub(crate) enum Assertion<'a> {
    /// The candidate matches the node.
    Matches(&'a ExprNode),
    /// The candidate matches every conjunct except the driver, checked in
    /// order and stopping at the first mismatch.
    AllExcept {
        children: &'a [Conjunct],
        driver: usize,
    },
    /// The candidate does not match the node.
    Negates(&'a ExprNode),
}

impl Assertion<'_> {
    fn accepts(&self, evaluator: &Evaluator<'_>, id: EntryId) -> CoreResult<bool> {
        let Some(entry) = evaluator.entry(id)? else {
            return Ok(false);
        };
        match self {
            Self::Matches(node) => evaluator.matches(node, &entry),
            Self::AllExcept { children, driver } => {
                for (i, child) in children.iter().enumerate() {
                    if i != *driver && !evaluator.matches(&child.node, &entry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Negates(node) => Ok(!evaluator.matches(node, &entry)?),
        }
    }
}

/// Filters an inner cursor through an assertion.
pub struct AssertCursor<'a> {
    inner: Box<Cursor<'a>>,
    assertion: Assertion<'a>,
    evaluator: Evaluator<'a>,
}

impl<'a> AssertCursor<'a> {
    pub(crate) fn new(inner: Cursor<'a>, assertion: Assertion<'a>, evaluator: Evaluator<'a>) -> Self {
        Self {
            inner: Box::new(inner),
            assertion,
            evaluator,
        }
    }

    /// Returns the cursor being filtered.
    #[must_use]
    pub fn inner(&self) -> &Cursor<'a> {
        &self.inner
    }

    fn next(&mut self) -> Option<CoreResult<Candidate>> {
        loop {
            let candidate = match self.inner.next()? {
                Ok(candidate) => candidate,
                Err(e) => return Some(Err(e)),
            };
            match self.assertion.accepts(&self.evaluator, candidate.id) {
                Ok(true) => return Some(Ok(candidate)),
                Ok(false) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Union of child cursors, drained in order.
///
/// A candidate from child `i` is dropped when an earlier child's expression
/// also matches it, since that child yields (or yielded) it already.
pub struct OrCursor<'a> {
    children: Vec<Cursor<'a>>,
    nodes: &'a [ExprNode],
    current: usize,
    evaluator: Evaluator<'a>,
}

impl<'a> OrCursor<'a> {
    pub(crate) fn new(children: Vec<Cursor<'a>>, nodes: &'a [ExprNode], evaluator: Evaluator<'a>) -> Self {
        Self {
            children,
            nodes,
            current: 0,
            evaluator,
        }
    }

    /// Returns the child cursors.
    #[must_use]
    pub fn children(&self) -> &[Cursor<'a>] {
        &self.children
    }

    fn next(&mut self) -> Option<CoreResult<Candidate>> {
        loop {
            let child = self.children.get_mut(self.current)?;
            let candidate = match child.next() {
                None => {
                    self.current += 1;
                    continue;
                }
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(candidate)) => candidate,
            };
            match self.seen_earlier(candidate.id) {
                Ok(false) => return Some(Ok(candidate)),
                Ok(true) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn seen_earlier(&self, id: EntryId) -> CoreResult<bool> {
        let earlier = &self.nodes[..self.current];
        if earlier.is_empty() {
            return Ok(false);
        }
        let Some(entry) = self.evaluator.entry(id)? else {
            return Ok(false);
        };
        for node in earlier {
            if self.evaluator.matches(node, &entry)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
