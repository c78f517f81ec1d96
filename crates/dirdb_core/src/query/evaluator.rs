//! Per-entry evaluation of filter expressions.

use crate::error::{CoreError, CoreResult};
use crate::query::expr::{Ava, ExprNode};
use crate::query::store::{Entry, IndexedStore};
use crate::types::EntryId;

/// Decides whether a single entry matches an expression.
///
/// Used by cursors to post-filter candidates that did not come from an
/// index covering the whole expression.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    store: &'a dyn IndexedStore,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over `store`.
    #[must_use]
    pub fn new(store: &'a dyn IndexedStore) -> Self {
        Self { store }
    }

    /// Fetches entry `id` and evaluates `node` against it. A missing entry
    /// matches nothing.
    pub fn evaluate(&self, node: &ExprNode, id: EntryId) -> CoreResult<bool> {
        match self.store.lookup(id)? {
            Some(entry) => self.matches(node, &entry),
            None => Ok(false),
        }
    }

    /// Fetches entry `id`.
    pub fn entry(&self, id: EntryId) -> CoreResult<Option<Entry>> {
        self.store.lookup(id)
    }

    /// Evaluates `node` against an already fetched entry.
    ///
    /// # Errors
    ///
    /// Extensible matches and bare assertions cannot be evaluated. Scope
    /// checks may fail with store errors.
    pub fn matches(&self, node: &ExprNode, entry: &Entry) -> CoreResult<bool> {
        match node {
            ExprNode::Presence(attribute) => Ok(entry.has(attribute)),
            ExprNode::Equality(ava) | ExprNode::Approximate(ava) => {
                Ok(any_value(entry, ava, |value| value == ava.value.as_str()))
            }
            ExprNode::GreaterEq(ava) => Ok(any_value(entry, ava, |value| value >= ava.value.as_str())),
            ExprNode::LessEq(ava) => Ok(any_value(entry, ava, |value| value <= ava.value.as_str())),
            ExprNode::Substring(filter) => Ok(entry
                .values(&filter.attribute)
                .iter()
                .any(|value| filter.matches(value))),
            ExprNode::Extensible(_) => Err(CoreError::unsupported_filter("extensible")),
            ExprNode::Scope(scope) => self.store.in_scope(scope, entry.id),
            ExprNode::Assertion => Err(CoreError::invalid_expression(
                "a bare assertion node cannot be evaluated",
            )),
            ExprNode::And(children) => {
                for child in children {
                    if !self.matches(&child.node, entry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ExprNode::Or(children) => {
                for child in children {
                    if self.matches(child, entry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ExprNode::Not(child) => Ok(!self.matches(child, entry)?),
        }
    }
}

fn any_value(entry: &Entry, ava: &Ava, test: impl Fn(&str) -> bool) -> bool {
    entry.values(&ava.attribute).iter().any(|v| test(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::SearchScope;
    use crate::query::memory::MemoryStore;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .insert(Entry::new(EntryId::new(1), None).with("ou", "system"))
            .unwrap();
        store
            .insert(
                Entry::new(EntryId::new(2), Some(EntryId::new(1)))
                    .with("cn", "jane")
                    .with("age", "34"),
            )
            .unwrap();
        store
    }

    #[test]
    fn leaves() {
        let store = store();
        let eval = Evaluator::new(&store);
        let jane = EntryId::new(2);

        assert!(eval.evaluate(&ExprNode::presence("cn"), jane).unwrap());
        assert!(!eval.evaluate(&ExprNode::presence("ou"), jane).unwrap());
        assert!(eval.evaluate(&ExprNode::equality("cn", "jane"), jane).unwrap());
        assert!(eval.evaluate(&ExprNode::approximate("cn", "jane"), jane).unwrap());
        assert!(!eval.evaluate(&ExprNode::equality("cn", "Jane"), jane).unwrap());
        assert!(eval.evaluate(&ExprNode::greater_eq("age", "30"), jane).unwrap());
        assert!(!eval.evaluate(&ExprNode::less_eq("age", "30"), jane).unwrap());
        assert!(eval
            .evaluate(&ExprNode::substring("cn", Some("j"), ["n"], None), jane)
            .unwrap());
    }

    #[test]
    fn branches() {
        let store = store();
        let eval = Evaluator::new(&store);
        let jane = EntryId::new(2);
        let both = ExprNode::and([ExprNode::presence("cn"), ExprNode::presence("age")]);
        let either = ExprNode::or([ExprNode::presence("ou"), ExprNode::presence("age")]);

        assert!(eval.evaluate(&both, jane).unwrap());
        assert!(eval.evaluate(&either, jane).unwrap());
        assert!(!eval.evaluate(&ExprNode::not(both), jane).unwrap());
    }

    #[test]
    fn scope_delegates_to_store() {
        let store = store();
        let eval = Evaluator::new(&store);
        let under_root = ExprNode::scope(EntryId::new(1), SearchScope::OneLevel);
        assert!(eval.evaluate(&under_root, EntryId::new(2)).unwrap());
        assert!(!eval.evaluate(&under_root, EntryId::new(1)).unwrap());
    }

    #[test]
    fn missing_entry_matches_nothing() {
        let store = store();
        let eval = Evaluator::new(&store);
        let missing = EntryId::new(40);
        assert!(!eval.evaluate(&ExprNode::presence("cn"), missing).unwrap());
        assert!(!eval
            .evaluate(&ExprNode::not(ExprNode::presence("cn")), missing)
            .unwrap());
    }

    #[test]
    fn unevaluable_nodes_fail() {
        let store = store();
        let eval = Evaluator::new(&store);
        let extensible = ExprNode::Extensible(Default::default());
        assert!(matches!(
            eval.evaluate(&extensible, EntryId::new(2)),
            Err(CoreError::UnsupportedFilter { .. })
        ));
        assert!(matches!(
            eval.evaluate(&ExprNode::Assertion, EntryId::new(2)),
            Err(CoreError::InvalidExpression { .. })
        ));
    }
}
