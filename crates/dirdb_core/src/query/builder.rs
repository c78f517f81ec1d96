//! Turns filter expressions into cursors.

use crate::error::{CoreError, CoreResult};
use crate::query::cursor::{AssertCursor, Assertion, Cursor, IndexCursor, OrCursor};
use crate::query::evaluator::Evaluator;
use crate::query::expr::{Conjunct, ExprNode};
use crate::query::store::{IndexSeek, IndexedStore};
use tracing::debug;

/// Builds cursors over one store.
///
/// # Example
///
/// ```rust,ignore
/// let mut filter = ExprNode::and([
///     ExprNode::equality("ou", "drama"),
///     ExprNode::presence("cn"),
/// ]);
/// annotate(&store, &mut filter)?;
/// let ids = CursorBuilder::new(&store)
///     .build(&filter)?
///     .map(|c| c.map(|c| c.id))
///     .collect::<CoreResult<Vec<_>>>()?;
/// ```
#[derive(Clone, Copy)]
pub struct CursorBuilder<'a> {
    store: &'a dyn IndexedStore,
    evaluator: Evaluator<'a>,
}

impl<'a> CursorBuilder<'a> {
    /// Creates a builder over `store`.
    #[must_use]
    pub fn new(store: &'a dyn IndexedStore) -> Self {
        Self {
            store,
            evaluator: Evaluator::new(store),
        }
    }

    /// Builds a cursor over the entries matching `node`.
    ///
    /// The whole tree is checked before any scan is opened.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedFilter`] for an extensible match anywhere
    ///   in the tree
    /// - [`CoreError::InvalidExpression`] for a bare assertion node or an
    ///   empty conjunction or disjunction
    /// - any store error raised while opening a scan
    pub fn build(&self, node: &'a ExprNode) -> CoreResult<Cursor<'a>> {
        validate(node)?;
        self.build_node(node)
    }

    fn build_node(&self, node: &'a ExprNode) -> CoreResult<Cursor<'a>> {
        match node {
            ExprNode::Scope(scope) => Ok(Cursor::Scan(self.store.scope_scan(scope)?)),
            ExprNode::Presence(attribute) => {
                if self.store.has_index_on(attribute) {
                    Ok(Cursor::Scan(self.store.presence_scan(attribute)?))
                } else {
                    self.full_scan(node)
                }
            }
            ExprNode::Equality(ava) | ExprNode::Approximate(ava) => {
                self.leaf(node, &ava.attribute, IndexSeek::Equal(ava.value.clone()))
            }
            ExprNode::GreaterEq(ava) => {
                self.leaf(node, &ava.attribute, IndexSeek::AtLeast(ava.value.clone()))
            }
            ExprNode::LessEq(ava) => {
                self.leaf(node, &ava.attribute, IndexSeek::AtMost(ava.value.clone()))
            }
            ExprNode::Substring(filter) => {
                if !self.store.has_index_on(&filter.attribute) {
                    return self.full_scan(node);
                }
                let seek = filter
                    .prefix
                    .clone()
                    .map_or(IndexSeek::All, IndexSeek::Prefix);
                let pairs = self.store.index_scan(&filter.attribute, &seek)?;
                Ok(Cursor::Index(IndexCursor::new(pairs).matching(filter)))
            }
            ExprNode::Extensible(_) => Err(CoreError::unsupported_filter("extensible")),
            ExprNode::Assertion => Err(bare_assertion()),
            ExprNode::And(children) => self.conjunction(children),
            ExprNode::Or(children) => {
                let cursors = children
                    .iter()
                    .map(|child| self.build_node(child))
                    .collect::<CoreResult<Vec<_>>>()?;
                Ok(Cursor::Or(OrCursor::new(cursors, children, self.evaluator)))
            }
            ExprNode::Not(child) => {
                let all = Cursor::Scan(self.store.full_scan()?);
                Ok(Cursor::Assert(AssertCursor::new(
                    all,
                    Assertion::Negates(child),
                    self.evaluator,
                )))
            }
        }
    }

    fn leaf(&self, node: &'a ExprNode, attribute: &str, seek: IndexSeek) -> CoreResult<Cursor<'a>> {
        if self.store.has_index_on(attribute) {
            let pairs = self.store.index_scan(attribute, &seek)?;
            Ok(Cursor::Index(IndexCursor::new(pairs)))
        } else {
            self.full_scan(node)
        }
    }

    fn full_scan(&self, node: &'a ExprNode) -> CoreResult<Cursor<'a>> {
        debug!(filter = %node, "no index on attribute, falling back to full scan");
        let all = Cursor::Scan(self.store.full_scan()?);
        Ok(Cursor::Assert(AssertCursor::new(
            all,
            Assertion::Matches(node),
            self.evaluator,
        )))
    }

    /// Scans the conjunct with the smallest estimate and checks the others
    /// per candidate.
    fn conjunction(&self, children: &'a [Conjunct]) -> CoreResult<Cursor<'a>> {
        let driver = driver_index(children);
        debug!(
            driver,
            estimate = ?children[driver].count,
            children = children.len(),
            filter = %children[driver].node,
            "conjunction driver chosen"
        );

        let inner = self.build_node(&children[driver].node)?;
        if children.len() == 1 {
            return Ok(inner);
        }
        Ok(Cursor::Assert(AssertCursor::new(
            inner,
            Assertion::AllExcept { children, driver },
            self.evaluator,
        )))
    }
}

/// Index of the conjunct with the smallest estimate; the last one wins ties
/// and unknown estimates rank as `u64::MAX`.
fn driver_index(children: &[Conjunct]) -> usize {
    let mut driver = 0;
    let mut min = u64::MAX;
    for (i, child) in children.iter().enumerate() {
        let count = child.count.unwrap_or(u64::MAX);
        if count <= min {
            min = count;
            driver = i;
        }
    }
    driver
}

fn bare_assertion() -> CoreError {
    CoreError::invalid_expression("cannot build a cursor over a bare assertion node")
}

/// Rejects trees the builder cannot turn into cursors.
fn validate(node: &ExprNode) -> CoreResult<()> {
    match node {
        ExprNode::Extensible(_) => Err(CoreError::unsupported_filter("extensible")),
        ExprNode::Assertion => Err(bare_assertion()),
        ExprNode::And(children) => {
            if children.is_empty() {
                return Err(CoreError::invalid_expression("empty conjunction"));
            }
            children.iter().try_for_each(|child| validate(&child.node))
        }
        ExprNode::Or(children) => {
            if children.is_empty() {
                return Err(CoreError::invalid_expression("empty disjunction"));
            }
            children.iter().try_for_each(validate)
        }
        ExprNode::Not(child) => validate(child),
        _ => Ok(()),
    }
}
