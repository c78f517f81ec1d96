//! Filter expression trees.

use crate::types::EntryId;
use std::fmt;

/// How far below the base entry a scope reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    /// The base entry only.
    Base,
    /// Direct children of the base entry.
    OneLevel,
    /// The base entry and all of its descendants.
    Subtree,
}

/// Restricts candidates to a region of the directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeNode {
    /// Entry the search starts from.
    pub base: EntryId,
    /// Depth of the search.
    pub scope: SearchScope,
}

impl ScopeNode {
    /// Creates a scope node.
    #[must_use]
    pub const fn new(base: EntryId, scope: SearchScope) -> Self {
        Self { base, scope }
    }
}

/// Attribute value assertion: an attribute and a value to compare with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ava {
    /// Attribute name.
    pub attribute: String,
    /// Asserted value.
    pub value: String,
}

impl Ava {
    /// Creates an assertion.
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Substring assertion: `prefix*fragment*...*suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SubstringFilter {
    /// Attribute name.
    pub attribute: String,
    /// Required leading text.
    pub prefix: Option<String>,
    /// Text that must appear, in order, after the prefix.
    pub fragments: Vec<String>,
    /// Required trailing text.
    pub suffix: Option<String>,
}

impl SubstringFilter {
    /// Returns `true` if `value` matches the pattern.
    ///
    /// Fragments are matched left to right without overlapping the prefix,
    /// each other, or the suffix.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let mut rest = value;
        if let Some(prefix) = &self.prefix {
            match rest.strip_prefix(prefix.as_str()) {
                Some(tail) => rest = tail,
                None => return false,
            }
        }
        for fragment in &self.fragments {
            match rest.find(fragment.as_str()) {
                Some(at) => rest = &rest[at + fragment.len()..],
                None => return false,
            }
        }
        match &self.suffix {
            Some(suffix) => rest.ends_with(suffix.as_str()),
            None => true,
        }
    }
}

/// Extensible match assertion. Parsed but never evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ExtensibleFilter {
    /// Attribute name, if given.
    pub attribute: Option<String>,
    /// Matching rule id, if given.
    pub matching_rule: Option<String>,
    /// Asserted value.
    pub value: String,
    /// Whether DN attributes take part in the match.
    pub dn_attributes: bool,
}

/// A child of a conjunction with its estimated candidate count.
///
/// The count is filled in by [`annotate`](crate::query::annotate); `None`
/// means unknown and ranks as the largest possible count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conjunct {
    /// The child expression.
    pub node: ExprNode,
    /// Estimated number of candidates the child matches.
    pub count: Option<u64>,
}

impl Conjunct {
    /// Wraps a node with no estimate.
    #[must_use]
    pub const fn new(node: ExprNode) -> Self {
        Self { node, count: None }
    }

    /// Wraps a node with a known estimate.
    #[must_use]
    pub const fn counted(node: ExprNode, count: u64) -> Self {
        Self {
            node,
            count: Some(count),
        }
    }
}

/// A node of a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprNode {
    /// The attribute has at least one value.
    Presence(String),
    /// The attribute has a value equal to the asserted one.
    Equality(Ava),
    /// Approximate match; evaluated as equality.
    Approximate(Ava),
    /// The attribute has a value ordered at or after the asserted one.
    GreaterEq(Ava),
    /// The attribute has a value ordered at or before the asserted one.
    LessEq(Ava),
    /// The attribute has a value matching a substring pattern.
    Substring(SubstringFilter),
    /// Extensible match. Rejected by the cursor builder.
    Extensible(ExtensibleFilter),
    /// The entry lies within a scope.
    Scope(ScopeNode),
    /// Placeholder for an assertion attached programmatically. Has no
    /// meaning on its own and cannot be scanned.
    Assertion,
    /// All children match.
    And(Vec<Conjunct>),
    /// At least one child matches.
    Or(Vec<ExprNode>),
    /// The child does not match.
    Not(Box<ExprNode>),
}

impl ExprNode {
    /// `(attribute=*)`
    pub fn presence(attribute: impl Into<String>) -> Self {
        Self::Presence(attribute.into())
    }

    /// `(attribute=value)`
    pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equality(Ava::new(attribute, value))
    }

    /// `(attribute~=value)`
    pub fn approximate(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Approximate(Ava::new(attribute, value))
    }

    /// `(attribute>=value)`
    pub fn greater_eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::GreaterEq(Ava::new(attribute, value))
    }

    /// `(attribute<=value)`
    pub fn less_eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::LessEq(Ava::new(attribute, value))
    }

    /// `(attribute=prefix*fragment*...*suffix)`
    pub fn substring<I, S>(
        attribute: impl Into<String>,
        prefix: Option<&str>,
        fragments: I,
        suffix: Option<&str>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Substring(SubstringFilter {
            attribute: attribute.into(),
            prefix: prefix.map(str::to_owned),
            fragments: fragments.into_iter().map(Into::into).collect(),
            suffix: suffix.map(str::to_owned),
        })
    }

    /// Scope restriction.
    #[must_use]
    pub const fn scope(base: EntryId, scope: SearchScope) -> Self {
        Self::Scope(ScopeNode::new(base, scope))
    }

    /// Conjunction with no estimates yet.
    pub fn and(children: impl IntoIterator<Item = ExprNode>) -> Self {
        Self::And(children.into_iter().map(Conjunct::new).collect())
    }

    /// Disjunction.
    pub fn or(children: impl IntoIterator<Item = ExprNode>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    /// Negation.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(child: ExprNode) -> Self {
        Self::Not(Box::new(child))
    }

    /// Returns `true` for nodes without children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::And(_) | Self::Or(_) | Self::Not(_))
    }

    /// Returns a short name for the node kind, as used in log fields and
    /// error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Presence(_) => "presence",
            Self::Equality(_) => "equality",
            Self::Approximate(_) => "approximate",
            Self::GreaterEq(_) => "greaterOrEqual",
            Self::LessEq(_) => "lessOrEqual",
            Self::Substring(_) => "substring",
            Self::Extensible(_) => "extensible",
            Self::Scope(_) => "scope",
            Self::Assertion => "assertion",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Not(_) => "not",
        }
    }
}

impl fmt::Display for ExprNode {
    /// Renders the node in LDAP string filter notation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence(attribute) => write!(f, "({attribute}=*)"),
            Self::Equality(ava) => write!(f, "({}={})", ava.attribute, ava.value),
            Self::Approximate(ava) => write!(f, "({}~={})", ava.attribute, ava.value),
            Self::GreaterEq(ava) => write!(f, "({}>={})", ava.attribute, ava.value),
            Self::LessEq(ava) => write!(f, "({}<={})", ava.attribute, ava.value),
            Self::Substring(s) => {
                write!(f, "({}=", s.attribute)?;
                if let Some(prefix) = &s.prefix {
                    f.write_str(prefix)?;
                }
                f.write_str("*")?;
                for fragment in &s.fragments {
                    write!(f, "{fragment}*")?;
                }
                if let Some(suffix) = &s.suffix {
                    f.write_str(suffix)?;
                }
                f.write_str(")")
            }
            Self::Extensible(e) => {
                f.write_str("(")?;
                if let Some(attribute) = &e.attribute {
                    f.write_str(attribute)?;
                }
                if e.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &e.matching_rule {
                    write!(f, ":{rule}")?;
                }
                write!(f, ":={})", e.value)
            }
            Self::Scope(scope) => write!(f, "(#scope {:?} {})", scope.scope, scope.base),
            Self::Assertion => f.write_str("(#assertion)"),
            Self::And(children) => {
                f.write_str("(&")?;
                for child in children {
                    write!(f, "{}", child.node)?;
                }
                f.write_str(")")
            }
            Self::Or(children) => {
                f.write_str("(|")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Self::Not(child) => write!(f, "(!{child})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(prefix: Option<&str>, fragments: &[&str], suffix: Option<&str>) -> SubstringFilter {
        match ExprNode::substring("cn", prefix, fragments.iter().copied(), suffix) {
            ExprNode::Substring(s) => s,
            _ => unreachable!(),
        }
    }

    #[test]
    fn substring_matching() {
        assert!(pattern(Some("ja"), &[], None).matches("jane"));
        assert!(!pattern(Some("ja"), &[], None).matches("ajax"));
        assert!(pattern(None, &["an"], Some("e")).matches("jane"));
        assert!(pattern(Some("a"), &["b", "c"], Some("d")).matches("a-b-c-d"));
        assert!(!pattern(Some("a"), &["c", "b"], Some("d")).matches("a-b-c-d"));
        assert!(pattern(None, &[], None).matches(""));
    }

    #[test]
    fn substring_parts_do_not_overlap() {
        assert!(!pattern(Some("ab"), &[], Some("bc")).matches("abc"));
        assert!(pattern(Some("ab"), &[], Some("bc")).matches("abbc"));
        assert!(!pattern(None, &["aa", "aa"], None).matches("aaa"));
    }

    #[test]
    fn display_uses_filter_notation() {
        let filter = ExprNode::and([
            ExprNode::equality("ou", "drama"),
            ExprNode::not(ExprNode::presence("cn")),
            ExprNode::or([
                ExprNode::greater_eq("age", "30"),
                ExprNode::substring("sn", Some("sm"), ["i"], Some("h")),
            ]),
        ]);
        assert_eq!(
            filter.to_string(),
            "(&(ou=drama)(!(cn=*))(|(age>=30)(sn=sm*i*h)))"
        );
    }

    #[test]
    fn kinds_and_leaves() {
        assert!(ExprNode::presence("cn").is_leaf());
        assert!(ExprNode::Assertion.is_leaf());
        assert!(!ExprNode::not(ExprNode::presence("cn")).is_leaf());
        assert_eq!(ExprNode::approximate("cn", "x").kind(), "approximate");
        assert_eq!(ExprNode::Or(Vec::new()).kind(), "or");
    }

    #[test]
    fn and_starts_without_estimates() {
        let ExprNode::And(children) = ExprNode::and([ExprNode::presence("a")]) else {
            unreachable!()
        };
        assert_eq!(children[0].count, None);
    }

    proptest::proptest! {
        #[test]
        fn composed_values_match_their_pattern(
            prefix in "[a-c]{0,3}",
            fragment in "[a-c]{1,3}",
            filler in "[a-c]{0,3}",
            suffix in "[a-c]{0,3}",
        ) {
            let value = format!("{prefix}{filler}{fragment}{filler}{suffix}");
            let filter = pattern(Some(&prefix), &[fragment.as_str()], Some(&suffix));
            proptest::prop_assert!(filter.matches(&value), "{} !~ {}", value, ExprNode::Substring(filter.clone()));
        }
    }
}
