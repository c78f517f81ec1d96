//! Candidate-count estimates for conjunction driver selection.

use crate::error::CoreResult;
use crate::query::expr::ExprNode;
use crate::query::store::{IndexSeek, IndexedStore};

/// Estimates how many candidates `node` yields and records the estimate of
/// every conjunction child in the tree.
///
/// - indexed leaf: the index count for the leaf's seek
/// - unindexed leaf, negation, extensible, assertion: every entry
/// - scope: the store's scope count
/// - disjunction: sum of the children
/// - conjunction: minimum of the children
///
/// # Errors
///
/// Returns any error the store reports while counting.
pub fn annotate(store: &dyn IndexedStore, node: &mut ExprNode) -> CoreResult<u64> {
    match node {
        ExprNode::Presence(attribute) => {
            if store.has_index_on(attribute) {
                store.presence_count(attribute)
            } else {
                store.entry_count()
            }
        }
        ExprNode::Equality(ava) | ExprNode::Approximate(ava) => {
            leaf_count(store, &ava.attribute, &IndexSeek::Equal(ava.value.clone()))
        }
        ExprNode::GreaterEq(ava) => {
            leaf_count(store, &ava.attribute, &IndexSeek::AtLeast(ava.value.clone()))
        }
        ExprNode::LessEq(ava) => {
            leaf_count(store, &ava.attribute, &IndexSeek::AtMost(ava.value.clone()))
        }
        ExprNode::Substring(filter) => {
            let seek = filter
                .prefix
                .clone()
                .map_or(IndexSeek::All, IndexSeek::Prefix);
            leaf_count(store, &filter.attribute, &seek)
        }
        ExprNode::Scope(scope) => store.scope_count(scope),
        ExprNode::Extensible(_) | ExprNode::Assertion | ExprNode::Not(_) => store.entry_count(),
        ExprNode::And(children) => {
            let mut min = u64::MAX;
            for child in children.iter_mut() {
                let count = annotate(store, &mut child.node)?;
                child.count = Some(count);
                min = min.min(count);
            }
            Ok(min)
        }
        ExprNode::Or(children) => {
            let mut sum = 0u64;
            for child in children.iter_mut() {
                sum = sum.saturating_add(annotate(store, child)?);
            }
            Ok(sum)
        }
    }
}

fn leaf_count(store: &dyn IndexedStore, attribute: &str, seek: &IndexSeek) -> CoreResult<u64> {
    if store.has_index_on(attribute) {
        store.index_count(attribute, seek)
    } else {
        store.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{Conjunct, SearchScope};
    use crate::query::memory::MemoryStore;
    use crate::query::store::Entry;
    use crate::types::EntryId;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::with_indices(["ou"]);
        store.insert(Entry::new(EntryId::new(1), None)).unwrap();
        for (id, ou) in [(2, "drama"), (3, "drama"), (4, "comedy")] {
            store
                .insert(Entry::new(EntryId::new(id), Some(EntryId::new(1))).with("ou", ou))
                .unwrap();
        }
        store
    }

    fn counts(node: &ExprNode) -> Vec<Option<u64>> {
        match node {
            ExprNode::And(children) => children.iter().map(|c| c.count).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn leaf_estimates() {
        let store = store();
        let mut drama = ExprNode::equality("ou", "drama");
        let mut unindexed = ExprNode::equality("cn", "x");
        let mut present = ExprNode::presence("ou");
        let mut prefix = ExprNode::substring("ou", Some("co"), Vec::<String>::new(), None);
        let mut scope = ExprNode::scope(EntryId::new(1), SearchScope::OneLevel);

        assert_eq!(annotate(&store, &mut drama).unwrap(), 2);
        assert_eq!(annotate(&store, &mut unindexed).unwrap(), 4);
        assert_eq!(annotate(&store, &mut present).unwrap(), 3);
        assert_eq!(annotate(&store, &mut prefix).unwrap(), 1);
        assert_eq!(annotate(&store, &mut scope).unwrap(), 3);
    }

    #[test]
    fn branch_estimates() {
        let store = store();
        let mut or = ExprNode::or([
            ExprNode::equality("ou", "drama"),
            ExprNode::equality("ou", "comedy"),
        ]);
        assert_eq!(annotate(&store, &mut or).unwrap(), 3);

        let mut not = ExprNode::not(ExprNode::equality("ou", "drama"));
        assert_eq!(annotate(&store, &mut not).unwrap(), 4);
    }

    #[test]
    fn conjunction_children_are_annotated() {
        let store = store();
        let mut and = ExprNode::and([
            ExprNode::equality("ou", "drama"),
            ExprNode::presence("cn"),
            ExprNode::and([ExprNode::equality("ou", "comedy")]),
        ]);
        assert_eq!(annotate(&store, &mut and).unwrap(), 1);
        assert_eq!(counts(&and), vec![Some(2), Some(4), Some(1)]);

        let ExprNode::And(children) = &and else {
            unreachable!()
        };
        let Conjunct { node: nested, .. } = &children[2];
        assert_eq!(counts(nested), vec![Some(1)]);
    }
}
