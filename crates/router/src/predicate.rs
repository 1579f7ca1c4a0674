//! Branch-key predicates.
//!
//! Branch keys form a tiny language: literal values, numeric comparators
//! (`>=0.90`), closed ranges (`0.75-0.89`) and pipe alternatives
//! (`search|web_search`). Keys are parsed once when the schema is loaded.

use std::fmt;

use crate::packet::Scalar;
use crate::schema::{Branch, SchemaNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    pub fn eval(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Ge => value >= threshold,
            Self::Le => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Only matches the branch key verbatim.
    Exact,
    /// Inclusive on both ends.
    Range { low: f64, high: f64 },
    Comparator { op: CompareOp, threshold: f64 },
    Alternatives(Vec<String>),
}

impl Predicate {
    pub fn parse(key: &str) -> Self {
        let trimmed = key.trim();

        if let Some((low, high)) = parse_range(trimmed) {
            return Self::Range { low, high };
        }
        if let Some((op, threshold)) = parse_comparator(trimmed) {
            return Self::Comparator { op, threshold };
        }
        if key.contains('|') {
            return Self::Alternatives(key.split('|').map(|alt| alt.trim().to_string()).collect());
        }
        Self::Exact
    }

    /// Numeric test; `Exact` and `Alternatives` never match here.
    pub fn matches_number(&self, value: f64) -> bool {
        match self {
            Self::Range { low, high } => *low <= value && value <= *high,
            Self::Comparator { op, threshold } => op.eval(value, *threshold),
            Self::Exact | Self::Alternatives(_) => false,
        }
    }

    /// First alternative contained in `value`.
    ///
    /// Containment is a substring test, so a short alternative such as `ai`
    /// also matches `domain`.
    pub fn matching_alternative(&self, value: &str) -> Option<&str> {
        let Self::Alternatives(alternatives) = self else {
            return None;
        };
        alternatives
            .iter()
            .find(|alt| value.contains(alt.as_str()))
            .map(String::as_str)
    }
}

fn is_unsigned_decimal(raw: &str) -> bool {
    !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn parse_decimal(raw: &str) -> Option<f64> {
    if !is_unsigned_decimal(raw) {
        return None;
    }
    raw.parse().ok()
}

fn parse_range(key: &str) -> Option<(f64, f64)> {
    let (low, high) = key.split_once('-')?;
    Some((parse_decimal(low.trim())?, parse_decimal(high.trim())?))
}

fn parse_comparator(key: &str) -> Option<(CompareOp, f64)> {
    let split = key
        .find(|c: char| !matches!(c, '>' | '<' | '=' | '!'))
        .unwrap_or(key.len());
    if split == 0 {
        return None;
    }
    let (op, rest) = key.split_at(split);
    Some((CompareOp::parse(op)?, parse_decimal(rest.trim())?))
}

/// Result of matching a value against a branch map.
#[derive(Debug, Clone, Copy)]
pub struct BranchMatch<'a> {
    /// Label used for the path segment (before sanitization).
    pub label: &'a str,
    pub child: &'a SchemaNode,
}

fn exact_matches(value: &Scalar, key: &str) -> bool {
    match value {
        Scalar::Text(text) => text == key,
        Scalar::Bool(b) => key == b.to_string(),
        Scalar::Integer(_) | Scalar::Float(_) => {
            value.to_string() == key
                || parse_decimal(key.trim())
                    .zip(value.as_number())
                    .is_some_and(|(k, v)| k == v)
        }
    }
}

/// Resolves `value` against `branches`.
///
/// Priority: exact key, then numeric predicates (numeric values only), then
/// pipe alternatives (string values only). Within each stage the first
/// branch in declaration order wins.
pub fn match_branch<'a>(value: &Scalar, branches: &'a [Branch]) -> Option<BranchMatch<'a>> {
    if let Some(branch) = branches.iter().find(|b| exact_matches(value, &b.label)) {
        return Some(BranchMatch {
            label: &branch.label,
            child: &branch.child,
        });
    }

    if let Some(number) = value.as_number() {
        if let Some(branch) = branches.iter().find(|b| b.predicate.matches_number(number)) {
            return Some(BranchMatch {
                label: &branch.label,
                child: &branch.child,
            });
        }
    }

    if let Scalar::Text(text) = value {
        for branch in branches {
            if let Some(alt) = branch.predicate.matching_alternative(text) {
                return Some(BranchMatch {
                    label: alt,
                    child: &branch.child,
                });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn branches(keys: &[&str]) -> Vec<Branch> {
        keys.iter()
            .map(|key| Branch::new(*key, SchemaNode::Leaf(format!("{key}.json"))))
            .collect()
    }

    fn leaf_of(m: Option<BranchMatch<'_>>) -> Option<String> {
        m.and_then(|m| match m.child {
            SchemaNode::Leaf(t) => Some(t.clone()),
            _ => None,
        })
    }

    #[test]
    fn parses_predicate_forms() {
        assert_eq!(
            Predicate::parse("10-20"),
            Predicate::Range {
                low: 10.0,
                high: 20.0
            }
        );
        assert_eq!(
            Predicate::parse(">= 0.90"),
            Predicate::Comparator {
                op: CompareOp::Ge,
                threshold: 0.9
            }
        );
        assert_eq!(
            Predicate::parse("a | b|c"),
            Predicate::Alternatives(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(Predicate::parse("success"), Predicate::Exact);
        assert_eq!(Predicate::parse("=>5"), Predicate::Exact);
        assert_eq!(Predicate::parse("1.2.3-4"), Predicate::Exact);
        assert_eq!(Predicate::parse(">-5"), Predicate::Exact);
    }

    #[test]
    fn exact_key_beats_range() {
        let map = branches(&["1-10", "5"]);
        let m = match_branch(&Scalar::from(5), &map).expect("match");
        assert_eq!(m.label, "5");
        assert_eq!(leaf_of(Some(m)).as_deref(), Some("5.json"));
    }

    #[test]
    fn range_is_inclusive() {
        let map = branches(&["10-20"]);
        assert!(match_branch(&Scalar::from(10), &map).is_some());
        assert!(match_branch(&Scalar::from(20), &map).is_some());
        assert!(match_branch(&Scalar::from(9), &map).is_none());
        assert!(match_branch(&Scalar::from(21), &map).is_none());
    }

    #[test]
    fn comparators_follow_declaration_order() {
        let map = branches(&[">=0.90", "0.75-0.89", "<0.75"]);
        assert_eq!(match_branch(&Scalar::from(0.95), &map).unwrap().label, ">=0.90");
        assert_eq!(match_branch(&Scalar::from(0.8), &map).unwrap().label, "0.75-0.89");
        assert_eq!(match_branch(&Scalar::from(0.1), &map).unwrap().label, "<0.75");
        // Falls in the gap between the two upper buckets.
        assert!(match_branch(&Scalar::from(0.895), &map).is_none());
    }

    #[test]
    fn numeric_strings_do_not_hit_numeric_predicates() {
        let map = branches(&["1-10"]);
        assert!(match_branch(&Scalar::from("5"), &map).is_none());
    }

    #[test]
    fn alternatives_label_is_first_contained_alternative() {
        let map = branches(&["search|web_search|info_gather"]);
        let m = match_branch(&Scalar::from("web_search"), &map).unwrap();
        assert_eq!(m.label, "search");
        let m = match_branch(&Scalar::from("info_gather"), &map).unwrap();
        assert_eq!(m.label, "info_gather");
    }

    #[test]
    fn alternatives_match_loosely_on_substrings() {
        // Short alternatives are contained in unrelated values; kept as-is.
        let map = branches(&["ai|ml"]);
        let m = match_branch(&Scalar::from("domain"), &map).expect("substring match");
        assert_eq!(m.label, "ai");
    }

    #[test]
    fn alternatives_ignore_numbers() {
        let map = branches(&["1|2"]);
        assert!(match_branch(&Scalar::from(3), &map).is_none());
        assert!(match_branch(&Scalar::from(1), &map).is_none());
    }

    #[test]
    fn integers_match_decimal_keys() {
        let map = branches(&["3.0"]);
        assert_eq!(match_branch(&Scalar::from(3), &map).unwrap().label, "3.0");
    }

    proptest! {
        #[test]
        fn proptest_range_membership(low in 0u32..1000, span in 0u32..1000, value in 0u32..3000) {
            let high = low + span;
            let pred = Predicate::parse(&format!("{low}-{high}"));
            prop_assert_eq!(
                pred.matches_number(f64::from(value)),
                low <= value && value <= high
            );
        }

        #[test]
        fn proptest_comparator_agrees_with_native_ops(threshold in 0u32..100, value in 0u32..100) {
            let (t, v) = (f64::from(threshold), f64::from(value));
            prop_assert_eq!(Predicate::parse(&format!(">{threshold}")).matches_number(v), v > t);
            prop_assert_eq!(Predicate::parse(&format!("<={threshold}")).matches_number(v), v <= t);
            prop_assert_eq!(Predicate::parse(&format!("!={threshold}")).matches_number(v), v != t);
        }
    }
}
