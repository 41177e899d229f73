//! Core type definitions for ClashRule
//!
//! These types map directly to the Clash rule-provider line format
//! (`KIND,value`) and are used throughout the extractor and merger.

use std::cmp::Ordering;
use std::collections::{btree_set, BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

// =============================================================================
// Rule Kinds (matches the Clash rule-provider prefix)
// =============================================================================

/// Kind of a canonical domain rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum RuleKind {
    /// `DOMAIN-SUFFIX` - matches the domain and every subdomain
    #[serde(rename = "DOMAIN-SUFFIX")]
    DomainSuffix = 0,
    /// `DOMAIN` - matches one exact hostname
    #[serde(rename = "DOMAIN")]
    DomainExact = 1,
    /// `DOMAIN-KEYWORD` - matches any hostname containing the keyword
    #[serde(rename = "DOMAIN-KEYWORD")]
    DomainKeyword = 2,
    /// `DOMAIN-REGEX` - matches hostnames against a regex body
    #[serde(rename = "DOMAIN-REGEX")]
    DomainRegex = 3,
}

impl RuleKind {
    /// All kinds, in rendering order.
    pub const ALL: [RuleKind; 4] = [
        RuleKind::DomainSuffix,
        RuleKind::DomainExact,
        RuleKind::DomainKeyword,
        RuleKind::DomainRegex,
    ];

    /// Prefix used on the wire.
    pub const fn wire_name(self) -> &'static str {
        match self {
            RuleKind::DomainSuffix => "DOMAIN-SUFFIX",
            RuleKind::DomainExact => "DOMAIN",
            RuleKind::DomainKeyword => "DOMAIN-KEYWORD",
            RuleKind::DomainRegex => "DOMAIN-REGEX",
        }
    }

    /// Parse a wire prefix. Case-insensitive, surrounding whitespace ignored.
    pub fn from_wire(s: &str) -> Option<Self> {
        let s = s.trim();
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.wire_name().eq_ignore_ascii_case(s))
    }

    /// Single-kind mask.
    pub const fn mask(self) -> KindMask {
        match self {
            RuleKind::DomainSuffix => KindMask::SUFFIX,
            RuleKind::DomainExact => KindMask::EXACT,
            RuleKind::DomainKeyword => KindMask::KEYWORD,
            RuleKind::DomainRegex => KindMask::REGEX,
        }
    }

    /// Whether the value is a hostname (suffix or exact).
    #[inline]
    pub const fn is_hostname(self) -> bool {
        matches!(self, RuleKind::DomainSuffix | RuleKind::DomainExact)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// =============================================================================
// Kind Masks
// =============================================================================

bitflags::bitflags! {
    /// Set of rule kinds a source may contribute or an output may render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KindMask: u8 {
        const SUFFIX = 1 << 0;
        const EXACT = 1 << 1;
        const KEYWORD = 1 << 2;
        const REGEX = 1 << 3;
        /// Hostname kinds only
        const HOSTNAMES = Self::SUFFIX.bits() | Self::EXACT.bits();
        /// Every kind
        const ALL = 0x0F;
    }
}

impl KindMask {
    /// Build a mask from a list of kinds. An empty list yields an empty mask.
    pub fn from_kinds<I: IntoIterator<Item = RuleKind>>(kinds: I) -> Self {
        kinds
            .into_iter()
            .fold(KindMask::empty(), |mask, kind| mask | kind.mask())
    }

    #[inline]
    pub fn allows(self, kind: RuleKind) -> bool {
        self.contains(kind.mask())
    }
}

impl Default for KindMask {
    fn default() -> Self {
        KindMask::ALL
    }
}

// =============================================================================
// Canonical Rule
// =============================================================================

/// One normalized block directive.
///
/// Construction goes through [`CanonicalRule::new`], which lower-cases the
/// value and enforces the invariants every rendered line relies on:
///
/// - the value is never empty and never contains whitespace
/// - hostname kinds contain a `.` and no scheme, path, query or `,`
/// - keyword values contain no `/`, `?` or `,`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CanonicalRule {
    kind: RuleKind,
    value: String,
}

impl CanonicalRule {
    pub fn new(kind: RuleKind, value: &str) -> Result<Self, RuleError> {
        let value = match kind {
            RuleKind::DomainSuffix | RuleKind::DomainExact => {
                value.trim().trim_matches('.').to_ascii_lowercase()
            }
            RuleKind::DomainKeyword => value.trim().to_ascii_lowercase(),
            RuleKind::DomainRegex => fold_regex_case(value.trim()),
        };

        if value.is_empty() {
            return Err(RuleError::EmptyValue);
        }

        let invalid = || RuleError::InvalidValue {
            kind: kind.wire_name(),
            value: value.clone(),
        };

        if value.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        match kind {
            RuleKind::DomainSuffix | RuleKind::DomainExact => {
                if !value.contains('.') || value.contains(['/', '?', '#', ',']) {
                    return Err(invalid());
                }
            }
            RuleKind::DomainKeyword => {
                if value.contains(['/', '?', ',']) {
                    return Err(invalid());
                }
            }
            RuleKind::DomainRegex => {}
        }

        Ok(Self { kind, value })
    }

    /// Shorthand for a `DOMAIN-SUFFIX` rule.
    pub fn suffix(value: &str) -> Result<Self, RuleError> {
        Self::new(RuleKind::DomainSuffix, value)
    }

    /// Shorthand for a `DOMAIN` rule.
    pub fn exact(value: &str) -> Result<Self, RuleError> {
        Self::new(RuleKind::DomainExact, value)
    }

    /// Shorthand for a `DOMAIN-KEYWORD` rule.
    pub fn keyword(value: &str) -> Result<Self, RuleError> {
        Self::new(RuleKind::DomainKeyword, value)
    }

    #[inline]
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Lower-case regex literals while leaving escape sequences alone
/// (`\D` and `\d` are different classes).
fn fold_regex_case(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut escaped = false;
    for ch in body.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            out.push(ch);
            escaped = true;
        } else {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

impl Ord for CanonicalRule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for CanonicalRule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CanonicalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.kind.wire_name(), self.value)
    }
}

impl FromStr for CanonicalRule {
    type Err = RuleError;

    /// Parse a rendered `KIND,value` line.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (kind, value) = line
            .split_once(',')
            .ok_or_else(|| RuleError::MissingSeparator(line.to_string()))?;
        let kind = RuleKind::from_wire(kind).ok_or_else(|| RuleError::UnknownKind(kind.to_string()))?;
        CanonicalRule::new(kind, value)
    }
}

// =============================================================================
// Rule Set
// =============================================================================

/// Deduplicated set of canonical rules, iterated in value order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: BTreeSet<CanonicalRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read rendered rule lines, skipping blanks, `#` comments and anything
    /// that does not parse as a canonical rule.
    pub fn from_lines<'a, I: IntoIterator<Item = &'a str>>(lines: I) -> Self {
        lines
            .into_iter()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.parse::<CanonicalRule>().ok())
            .collect()
    }

    /// Insert a rule. Returns `false` if it was already present.
    pub fn insert(&mut self, rule: CanonicalRule) -> bool {
        self.rules.insert(rule)
    }

    pub fn contains(&self, rule: &CanonicalRule) -> bool {
        self.rules.contains(rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, CanonicalRule> {
        self.rules.iter()
    }

    /// Rules in `self` that are not in `other`.
    pub fn difference(&self, other: &RuleSet) -> RuleSet {
        self.rules.difference(&other.rules).cloned().collect()
    }

    /// Add every rule of `other`.
    pub fn union_with(&mut self, other: &RuleSet) {
        self.rules.extend(other.rules.iter().cloned());
    }

    /// Remove every rule of `other`.
    pub fn subtract(&mut self, other: &RuleSet) {
        if other.is_empty() {
            return;
        }
        self.rules.retain(|rule| !other.rules.contains(rule));
    }

    /// Keep only the kinds allowed by `mask`.
    pub fn retain_kinds(&mut self, mask: KindMask) {
        if mask == KindMask::ALL {
            return;
        }
        self.rules.retain(|rule| mask.allows(rule.kind));
    }

    /// Rules of a single kind, in value order.
    pub fn by_kind(&self, kind: RuleKind) -> impl Iterator<Item = &CanonicalRule> + '_ {
        self.rules.iter().filter(move |rule| rule.kind == kind)
    }

    /// Number of rules per kind. Kinds with no rules are absent.
    pub fn count_by_kind(&self) -> BTreeMap<RuleKind, usize> {
        let mut counts = BTreeMap::new();
        for rule in &self.rules {
            *counts.entry(rule.kind).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<CanonicalRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = CanonicalRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl Extend<CanonicalRule> for RuleSet {
    fn extend<I: IntoIterator<Item = CanonicalRule>>(&mut self, iter: I) {
        self.rules.extend(iter);
    }
}

impl IntoIterator for RuleSet {
    type Item = CanonicalRule;
    type IntoIter = btree_set::IntoIter<CanonicalRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a CanonicalRule;
    type IntoIter = btree_set::Iter<'a, CanonicalRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
