//! Property-based test generators using proptest.
//!
//! Directories and filters are drawn from a small vocabulary so that
//! generated filters actually hit generated entries.

use dirdb_core::query::{Entry, ExprNode, SearchScope};
use dirdb_core::EntryId;
use proptest::prelude::*;

/// Attribute names generated entries and filters use.
pub const ATTRIBUTES: [&str; 3] = ["ou", "cn", "l"];

/// Attribute values generated entries and filters use.
pub const VALUES: [&str; 5] = ["comedy", "drama", "history", "poetry", "tragedy"];

/// Id of the root entry of every generated directory.
pub const ROOT: EntryId = EntryId(1);

/// Strategy for attribute names.
pub fn attribute_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(ATTRIBUTES.to_vec()).prop_map(str::to_owned)
}

/// Strategy for attribute values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(VALUES.to_vec()).prop_map(str::to_owned)
}

/// Strategy for the attribute values of a single entry. An entry may hold
/// no attributes at all, or several values of one attribute.
pub fn attributes_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((attribute_strategy(), value_strategy()), 0..4)
}

/// Strategy for a directory tree.
///
/// The first entry is [`ROOT`]; entry `n` is a child of some entry with a
/// smaller id. Ids are dense from 1.
pub fn directory_strategy() -> impl Strategy<Value = Vec<Entry>> {
    (
        attributes_strategy(),
        prop::collection::vec((attributes_strategy(), any::<prop::sample::Index>()), 0..24),
    )
        .prop_map(|(root_attributes, children)| {
            let mut entries = Vec::with_capacity(children.len() + 1);
            entries.push(entry_with(ROOT, None, root_attributes));
            for (i, (attributes, parent)) in children.into_iter().enumerate() {
                let parent = EntryId::new(parent.index(i + 1) as u64 + 1);
                let id = EntryId::new(i as u64 + 2);
                entries.push(entry_with(id, Some(parent), attributes));
            }
            entries
        })
}

fn entry_with(id: EntryId, parent: Option<EntryId>, attributes: Vec<(String, String)>) -> Entry {
    let mut entry = Entry::new(id, parent);
    for (attribute, value) in attributes {
        entry.add(attribute, value);
    }
    entry
}

/// Strategy for leaf filters. Scope leaves are based on the first few ids,
/// which may or may not exist in a given directory.
pub fn leaf_filter_strategy() -> impl Strategy<Value = ExprNode> {
    let prefix = value_strategy().prop_flat_map(|value| {
        let len = value.len();
        (0..=len).prop_map(move |end| value[..end].to_owned())
    });
    let scope = prop::sample::select(vec![
        SearchScope::Base,
        SearchScope::OneLevel,
        SearchScope::Subtree,
    ]);

    prop_oneof![
        attribute_strategy().prop_map(ExprNode::presence),
        (attribute_strategy(), value_strategy()).prop_map(|(a, v)| ExprNode::equality(a, v)),
        (attribute_strategy(), value_strategy()).prop_map(|(a, v)| ExprNode::approximate(a, v)),
        (attribute_strategy(), value_strategy()).prop_map(|(a, v)| ExprNode::greater_eq(a, v)),
        (attribute_strategy(), value_strategy()).prop_map(|(a, v)| ExprNode::less_eq(a, v)),
        (attribute_strategy(), prefix, prop::option::of("[a-z]{1,2}"))
            .prop_map(|(a, p, f)| ExprNode::substring(a, Some(p.as_str()), f, None)),
        (attribute_strategy(), "[a-z]{1,2}")
            .prop_map(|(a, s)| ExprNode::substring(a, None, Vec::<String>::new(), Some(s.as_str()))),
        (1u64..4, scope).prop_map(|(base, scope)| ExprNode::scope(EntryId::new(base), scope)),
    ]
}

/// Strategy for filter trees of conjunctions, disjunctions and negations
/// over [`leaf_filter_strategy`] leaves.
///
/// Never produces extensible matches, bare assertions, or empty
/// conjunctions and disjunctions, so every generated filter builds.
pub fn filter_strategy() -> impl Strategy<Value = ExprNode> {
    leaf_filter_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(ExprNode::and),
            prop::collection::vec(inner.clone(), 1..4).prop_map(ExprNode::or),
            inner.prop_map(ExprNode::not),
        ]
    })
}

/// Strategy for a set of user-indexed attributes.
pub fn indices_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(ATTRIBUTES.to_vec(), 0..=ATTRIBUTES.len())
        .prop_map(|picked| picked.into_iter().map(str::to_owned).collect())
}

/// Strategy for a single log record payload. Payloads are never empty.
pub fn log_payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..512)
}

/// Strategy for a run of log record payloads.
pub fn log_payloads_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(log_payload_strategy(), 0..32)
}
