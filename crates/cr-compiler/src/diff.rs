//! Change accounting between two runs of the same output.
//!
//! Both sides are sets, so reordering or reformatting a list never shows up
//! as an addition or removal.

use cr_core::types::{CanonicalRule, RuleSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    /// In the current set but not the previous one, in value order.
    pub added: Vec<CanonicalRule>,
    /// In the previous set but not the current one, in value order.
    pub removed: Vec<CanonicalRule>,
}

impl RuleDiff {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn added_lines(&self) -> Vec<String> {
        self.added.iter().map(ToString::to_string).collect()
    }

    pub fn removed_lines(&self) -> Vec<String> {
        self.removed.iter().map(ToString::to_string).collect()
    }
}

pub fn diff_rules(previous: &RuleSet, current: &RuleSet) -> RuleDiff {
    RuleDiff {
        added: current.difference(previous).into_iter().collect(),
        removed: previous.difference(current).into_iter().collect(),
    }
}

/// Diff against a previous snapshot given as raw rule lines.
pub fn diff_against_lines<'a, I>(previous: I, current: &RuleSet) -> RuleDiff
where
    I: IntoIterator<Item = &'a str>,
{
    diff_rules(&RuleSet::from_lines(previous), current)
}
