use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cr_core::types::{CanonicalRule, RuleSet};

/// How overlapping rules are assigned between groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Earlier groups claim a rule; later groups lose it.
    PriorityChain,
    /// Every group loses any rule another group also has.
    Pairwise,
}

/// Residual rules of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedGroup {
    pub name: String,
    pub rules: RuleSet,
    /// Rule count before cross-group subtraction.
    pub before: usize,
}

impl MergedGroup {
    pub fn removed(&self) -> usize {
        self.before - self.rules.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Groups in input order.
    pub groups: Vec<MergedGroup>,
    pub stats: MergeStats,
}

impl MergeOutcome {
    pub fn get(&self, name: &str) -> Option<&MergedGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    /// Union of every residual. No rule appears in two groups, so this is
    /// also their disjoint sum.
    pub fn total(&self) -> RuleSet {
        let mut total = RuleSet::new();
        for group in &self.groups {
            total.union_with(&group.rules);
        }
        total
    }
}

/// Resolve overlaps between named rule sets. Input order is priority order
/// for [`MergePolicy::PriorityChain`] and irrelevant for
/// [`MergePolicy::Pairwise`].
pub fn merge_sources(policy: MergePolicy, sources: Vec<(String, RuleSet)>) -> MergeOutcome {
    let before: usize = sources.iter().map(|(_, rules)| rules.len()).sum();

    let groups = match policy {
        MergePolicy::PriorityChain => merge_priority_chain(sources),
        MergePolicy::Pairwise => merge_pairwise(sources),
    };

    let after: usize = groups.iter().map(|group| group.rules.len()).sum();

    for group in &groups {
        log::debug!(
            "merge {:?}: '{}' {} -> {} rules",
            policy,
            group.name,
            group.before,
            group.rules.len()
        );
    }

    MergeOutcome {
        groups,
        stats: MergeStats {
            before,
            after,
            deduped: before - after,
        },
    }
}

fn merge_priority_chain(sources: Vec<(String, RuleSet)>) -> Vec<MergedGroup> {
    let mut claimed = RuleSet::new();
    let mut groups = Vec::with_capacity(sources.len());

    for (name, rules) in sources {
        let before = rules.len();
        let residual = rules.difference(&claimed);
        claimed.union_with(&residual);
        groups.push(MergedGroup {
            name,
            rules: residual,
            before,
        });
    }

    groups
}

fn merge_pairwise(sources: Vec<(String, RuleSet)>) -> Vec<MergedGroup> {
    // Counted against the unreduced sets, so the result is order independent
    let mut owners: BTreeMap<&CanonicalRule, usize> = BTreeMap::new();
    for (_, rules) in &sources {
        for rule in rules {
            *owners.entry(rule).or_insert(0) += 1;
        }
    }

    let residuals: Vec<RuleSet> = sources
        .iter()
        .map(|(_, rules)| {
            rules
                .iter()
                .filter(|rule| owners.get(rule).copied() == Some(1))
                .cloned()
                .collect()
        })
        .collect();

    sources
        .into_iter()
        .zip(residuals)
        .map(|((name, rules), residual)| MergedGroup {
            name,
            before: rules.len(),
            rules: residual,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix(v: &str) -> CanonicalRule {
        CanonicalRule::suffix(v).unwrap()
    }

    fn set(values: &[&str]) -> RuleSet {
        values.iter().map(|v| suffix(v)).collect()
    }

    fn input(groups: &[(&str, &[&str])]) -> Vec<(String, RuleSet)> {
        groups
            .iter()
            .map(|(name, values)| (name.to_string(), set(values)))
            .collect()
    }

    #[test]
    fn priority_chain_first_wins() {
        let outcome = merge_sources(
            MergePolicy::PriorityChain,
            input(&[("A", &["x.com", "y.com"]), ("B", &["y.com", "z.com"])]),
        );

        assert_eq!(outcome.get("A").unwrap().rules, set(&["x.com", "y.com"]));
        assert_eq!(outcome.get("B").unwrap().rules, set(&["z.com"]));
        assert_eq!(outcome.get("B").unwrap().removed(), 1);
        assert_eq!(
            outcome.stats,
            MergeStats {
                before: 4,
                after: 3,
                deduped: 1,
            }
        );
    }

    #[test]
    fn priority_chain_residual_of_later_source() {
        let outcome = merge_sources(
            MergePolicy::PriorityChain,
            input(&[("SourceA", &["x.com"]), ("SourceB", &["x.com", "y.com"])]),
        );
        assert_eq!(outcome.get("SourceB").unwrap().rules, set(&["y.com"]));
    }

    #[test]
    fn priority_chain_subtracts_all_earlier_sources() {
        let outcome = merge_sources(
            MergePolicy::PriorityChain,
            input(&[
                ("A", &["a.com"]),
                ("B", &["b.com"]),
                ("C", &["a.com", "b.com", "c.com"]),
            ]),
        );
        assert_eq!(outcome.get("C").unwrap().rules, set(&["c.com"]));
        assert_eq!(outcome.total(), set(&["a.com", "b.com", "c.com"]));
    }

    #[test]
    fn pairwise_everyone_loses_shared_rules() {
        let outcome = merge_sources(
            MergePolicy::Pairwise,
            input(&[("A", &["x.com", "y.com"]), ("B", &["y.com", "z.com"])]),
        );
        assert_eq!(outcome.get("A").unwrap().rules, set(&["x.com"]));
        assert_eq!(outcome.get("B").unwrap().rules, set(&["z.com"]));
        assert_eq!(outcome.total(), set(&["x.com", "z.com"]));
    }

    #[test]
    fn pairwise_is_order_independent() {
        let forward = merge_sources(
            MergePolicy::Pairwise,
            input(&[("A", &["x.com", "y.com"]), ("B", &["y.com"]), ("C", &["x.com", "w.com"])]),
        );
        let backward = merge_sources(
            MergePolicy::Pairwise,
            input(&[("C", &["x.com", "w.com"]), ("B", &["y.com"]), ("A", &["x.com", "y.com"])]),
        );

        for name in ["A", "B", "C"] {
            assert_eq!(forward.get(name).unwrap().rules, backward.get(name).unwrap().rules);
        }
        assert!(forward.get("A").unwrap().rules.is_empty());
        assert!(forward.get("B").unwrap().rules.is_empty());
        assert_eq!(forward.get("C").unwrap().rules, set(&["w.com"]));
    }

    #[test]
    fn residuals_never_overlap() {
        let groups = input(&[
            ("A", &["a.com", "shared.com"]),
            ("B", &["shared.com", "b.com"]),
            ("C", &["b.com", "c.com", "a.com"]),
        ]);

        let outcome = merge_sources(MergePolicy::PriorityChain, groups.clone());
        for (i, left) in outcome.groups.iter().enumerate() {
            for right in &outcome.groups[i + 1..] {
                assert!(left.rules.difference(&right.rules).len() == left.rules.len());
            }
        }

        // Every input rule lands in exactly one residual
        let mut union = RuleSet::new();
        for (_, rules) in &groups {
            union.union_with(rules);
        }
        assert_eq!(outcome.total(), union);
    }

    #[test]
    fn empty_sources_are_valid() {
        let outcome = merge_sources(
            MergePolicy::PriorityChain,
            input(&[("down", &[]), ("B", &["b.com"])]),
        );
        assert!(outcome.get("down").unwrap().rules.is_empty());
        assert_eq!(outcome.get("B").unwrap().rules, set(&["b.com"]));

        let outcome = merge_sources(MergePolicy::Pairwise, Vec::new());
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.stats, MergeStats::default());
    }

    #[test]
    fn merge_is_deterministic() {
        let groups = input(&[("A", &["q.com", "r.com"]), ("B", &["r.com", "s.com"])]);
        assert_eq!(
            merge_sources(MergePolicy::PriorityChain, groups.clone()),
            merge_sources(MergePolicy::PriorityChain, groups)
        );
    }

    #[test]
    fn policy_serde_names() {
        let policy: MergePolicy = serde_json::from_str("\"priority-chain\"").unwrap();
        assert_eq!(policy, MergePolicy::PriorityChain);
        let policy: MergePolicy = serde_json::from_str("\"pairwise\"").unwrap();
        assert_eq!(policy, MergePolicy::Pairwise);
    }
}
