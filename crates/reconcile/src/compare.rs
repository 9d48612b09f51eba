//! State comparator
//!
//! Computes the minimal [`Diff`] between what a query reported and what the
//! caller asked for. Observed attributes the caller did not mention never
//! enter the diff.

use crate::types::{AttrValue, AttributeSet, Diff, DiffEntry, ObservedState, Vocabulary};
use std::collections::BTreeSet;

/// Result of comparing observed and desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub diff: Diff,
    pub object_exists: bool,
}

impl Comparison {
    /// Nothing to do: the object exists and matches
    pub fn is_converged(&self) -> bool {
        self.object_exists && self.diff.is_empty()
    }
}

/// Compare `observed` against `desired`
///
/// An absent object differs in every desired attribute.
pub fn compare(observed: &ObservedState, desired: &AttributeSet, vocabulary: Vocabulary) -> Comparison {
    let mut diff = Diff::new();

    for (name, value) in desired {
        let current = observed.get(name);
        let same = observed.exists() && values_equal(value, current, vocabulary);
        if !same {
            diff.insert(
                name.clone(),
                DiffEntry {
                    desired: value.clone(),
                    observed: current.map(str::to_string),
                },
            );
        }
    }

    Comparison {
        diff,
        object_exists: observed.exists(),
    }
}

/// Whether `observed` already satisfies `desired`
///
/// Booleans are matched in either vocabulary regardless of case, numbers
/// numerically, and lists as unordered sets. A missing observation only
/// satisfies an empty desired value.
pub fn values_equal(desired: &AttrValue, observed: Option<&str>, vocabulary: Vocabulary) -> bool {
    let Some(observed) = observed.map(normalize) else {
        return desired.is_empty();
    };

    match desired {
        AttrValue::Bool(b) => Vocabulary::parse(observed) == Some(*b),
        AttrValue::Int(i) => number(observed).is_some_and(|n| n == *i as f64),
        AttrValue::List(items) => list(observed) == items.iter().map(|s| normalize(s)).collect::<BTreeSet<_>>(),
        AttrValue::Str(s) => {
            let s = normalize(s);
            if let (Some(want), Some(have)) = (Vocabulary::parse(s), Vocabulary::parse(observed)) {
                return want == have;
            }
            if let (Some(want), Some(have)) = (number(s), number(observed)) {
                return want == have;
            }
            if s.contains(',') || observed.contains(',') {
                return list(s) == list(observed);
            }
            s == observed || desired.render(vocabulary) == observed
        }
    }
}

fn normalize(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn list(value: &str) -> BTreeSet<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
