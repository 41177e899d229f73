use std::collections::BTreeMap;

use cr_core::domain::normalize_domain;
use cr_core::types::{CanonicalRule, RuleKind, RuleSet};
use cr_core::url::{extract_host, extract_scheme};

/// Tokens that may be promoted to `DOMAIN-KEYWORD` rules when a complex
/// pattern cannot be reduced to a hostname. Anything else is dropped.
pub const SAFE_KEYWORDS: &[&str] = &[
    "ads",
    "adserver",
    "adservice",
    "adsystem",
    "advert",
    "advertising",
    "analytics",
    "doubleclick",
    "googlesyndication",
    "pagead",
    "scorecardresearch",
    "telemetry",
    "tracker",
    "tracking",
];

/// What a single line contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Empty,
    Comment,
    /// `@@` allow-list exception
    Exception,
    /// Element hiding, scriptlet or CSS selector rule
    Cosmetic,
    /// `/.../` regex rule
    RegexRule,
    Rule(CanonicalRule),
    /// Allow-listed keywords found in a complex pattern
    Keywords(Vec<CanonicalRule>),
    Discarded,
}

/// Per-list counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: usize,
    pub empty: usize,
    pub comments: usize,
    pub exceptions: usize,
    pub cosmetic: usize,
    pub regex: usize,
    pub emitted: usize,
    pub discarded: usize,
}

pub fn parse_filter_list(text: &str) -> RuleSet {
    parse_filter_list_with_stats(text).0
}

/// Decode lossily (undecodable bytes become U+FFFD and the line fails
/// validation) and parse.
pub fn parse_filter_bytes(bytes: &[u8]) -> RuleSet {
    let text = String::from_utf8_lossy(bytes);
    parse_filter_list(&text)
}

pub fn parse_filter_list_with_stats(text: &str) -> (RuleSet, ParseStats) {
    let mut rules = RuleSet::new();
    let mut stats = ParseStats::default();

    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    for raw_line in text.lines() {
        stats.lines += 1;

        match parse_line(raw_line) {
            LineOutcome::Empty => stats.empty += 1,
            LineOutcome::Comment => stats.comments += 1,
            LineOutcome::Exception => stats.exceptions += 1,
            LineOutcome::Cosmetic => stats.cosmetic += 1,
            LineOutcome::RegexRule => stats.regex += 1,
            LineOutcome::Rule(rule) => {
                stats.emitted += 1;
                rules.insert(rule);
            }
            LineOutcome::Keywords(keywords) => {
                stats.emitted += 1;
                rules.extend(keywords);
            }
            LineOutcome::Discarded => stats.discarded += 1,
        }
    }

    log::debug!(
        "parsed {} lines: {} rules ({} comments, {} exceptions, {} cosmetic, {} regex, {} discarded)",
        stats.lines,
        rules.len(),
        stats.comments,
        stats.exceptions,
        stats.cosmetic,
        stats.regex,
        stats.discarded,
    );

    (rules, stats)
}

/// Classify one line. Order matters: earlier checks are more specific.
pub fn parse_line(raw_line: &str) -> LineOutcome {
    let line = unwrap_payload_item(raw_line.trim());
    if line.is_empty() {
        return LineOutcome::Empty;
    }

    if is_comment_line(line) {
        return LineOutcome::Comment;
    }

    if line.starts_with("@@") {
        return LineOutcome::Exception;
    }

    if is_cosmetic_line(line) {
        return LineOutcome::Cosmetic;
    }

    if line.len() > 2 && line.starts_with('/') && line.ends_with('/') {
        return LineOutcome::RegexRule;
    }

    if let Some(outcome) = parse_canonical_rule(line) {
        return outcome;
    }

    if let Some(outcome) = parse_hosts_file_rule(line) {
        return outcome;
    }

    if let Some(domain) = parse_host_anchor_rule(line) {
        return suffix_outcome(&domain);
    }

    if let Some(host) = parse_url_anchor_rule(line) {
        return match CanonicalRule::exact(&host) {
            Ok(rule) => LineOutcome::Rule(rule),
            Err(_) => LineOutcome::Discarded,
        };
    }

    if let Some(domain) = parse_bare_domain(line) {
        return suffix_outcome(&domain);
    }

    if looks_like_foreign_rule(line) {
        return LineOutcome::Discarded;
    }

    let keywords = extract_safe_keywords(line);
    if keywords.is_empty() {
        LineOutcome::Discarded
    } else {
        LineOutcome::Keywords(keywords)
    }
}

fn suffix_outcome(domain: &str) -> LineOutcome {
    match CanonicalRule::suffix(domain) {
        Ok(rule) => LineOutcome::Rule(rule),
        Err(_) => LineOutcome::Discarded,
    }
}

/// Clash YAML providers list rules as `- 'DOMAIN-SUFFIX,x.com'` or `- '+.x.com'`.
fn unwrap_payload_item(line: &str) -> &str {
    match line.strip_prefix("- ") {
        Some(rest) => rest.trim().trim_matches(|c| c == '\'' || c == '"'),
        None => line,
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('!') || line.starts_with('[') || line.starts_with(';')
}

fn is_cosmetic_line(line: &str) -> bool {
    const MARKERS: [&str; 7] = ["##", "#@#", "#?#", "#$#", "::", ":style(", ":has("];
    MARKERS.iter().any(|marker| line.contains(marker))
}

// =============================================================================
// Clash / Surge / Quantumult rule lines
// =============================================================================

fn canonical_kind(prefix: &str) -> Option<RuleKind> {
    if let Some(kind) = RuleKind::from_wire(prefix) {
        return Some(kind);
    }

    // Quantumult X spelling
    let prefix = prefix.trim();
    if prefix.eq_ignore_ascii_case("HOST-SUFFIX") {
        Some(RuleKind::DomainSuffix)
    } else if prefix.eq_ignore_ascii_case("HOST") {
        Some(RuleKind::DomainExact)
    } else if prefix.eq_ignore_ascii_case("HOST-KEYWORD") {
        Some(RuleKind::DomainKeyword)
    } else {
        None
    }
}

/// Upstream rule lines are trusted verbatim apart from the invariant checks
/// in [`CanonicalRule::new`].
fn parse_canonical_rule(line: &str) -> Option<LineOutcome> {
    let (prefix, value) = line.split_once(',')?;
    let kind = canonical_kind(prefix)?;

    // Domain and keyword values never contain a comma, so everything past
    // the second field is policy (`reject`, `AdBlock`, `🛑 全球拦截`).
    let value = match kind {
        RuleKind::DomainRegex => strip_policy(value),
        _ => value.split(',').next().unwrap_or_default().trim(),
    };

    let outcome = match CanonicalRule::new(kind, value) {
        Ok(rule) => LineOutcome::Rule(rule),
        Err(_) => LineOutcome::Discarded,
    };
    Some(outcome)
}

/// Drop trailing policy fields from a regex body: `^ad\d{1,3}\.,REJECT`.
fn strip_policy(value: &str) -> &str {
    let mut value = value.trim();
    while let Some((head, tail)) = value.rsplit_once(',') {
        if !is_policy_token(tail.trim()) {
            break;
        }
        value = head.trim_end();
    }
    value
}

fn is_policy_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    token.eq_ignore_ascii_case("no-resolve")
        || token
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// `IP-CIDR,...`, `USER-AGENT,...` and friends have no domain meaning.
fn looks_like_foreign_rule(line: &str) -> bool {
    match line.split_once(',') {
        Some((prefix, _)) => {
            !prefix.is_empty()
                && prefix
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-')
        }
        None => false,
    }
}

// =============================================================================
// Hosts files
// =============================================================================

fn parse_hosts_file_rule(line: &str) -> Option<LineOutcome> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    if first != "0.0.0.0" && first != "127.0.0.1" {
        return None;
    }

    let outcome = match parts.next() {
        Some(host) if !host.starts_with('#') => match normalize_domain(host) {
            Some(domain) => suffix_outcome(&domain),
            None => LineOutcome::Discarded,
        },
        _ => LineOutcome::Discarded,
    };
    Some(outcome)
}

// =============================================================================
// Adblock anchors
// =============================================================================

/// `||host^` and friends. Options (`$third-party`) are ignored, the host is
/// cut at the first separator.
fn parse_host_anchor_rule(line: &str) -> Option<String> {
    let mut rest = line.strip_prefix("||")?;
    if let Some(stripped) = rest.strip_prefix('.') {
        rest = stripped;
    }

    if let Some(pos) = rest.find('$') {
        rest = &rest[..pos];
    }

    let end = rest
        .find(|ch: char| ch == '^' || ch == '/' || ch == '|')
        .unwrap_or(rest.len());

    normalize_domain(&rest[..end])
}

/// `|https://host/...` matches a single page, so the result is exact.
fn parse_url_anchor_rule(line: &str) -> Option<String> {
    let rest = line.strip_prefix('|')?;
    if rest.starts_with('|') {
        return None;
    }

    extract_scheme(rest)?;
    let host = extract_host(rest)?;
    normalize_domain(host)
}

fn parse_bare_domain(line: &str) -> Option<String> {
    let candidate = line.strip_prefix("+.").unwrap_or(line);
    normalize_domain(candidate)
}

// =============================================================================
// Upstream sections
// =============================================================================

/// Categories named by upstream section headings, in rendering order.
pub const CATEGORIES: &[(&str, &str)] = &[
    ("general", "通用广告"),
    ("tracking", "追踪器"),
    ("social", "社交按钮"),
];

/// Category of rules that appear before any heading.
pub const DEFAULT_CATEGORY: &str = "通用广告";

/// `! General`, `!---- Tracking ----`. Unknown headings yield `None`.
pub fn section_category(line: &str) -> Option<&'static str> {
    let body = line.trim().strip_prefix('!')?;
    let word = body.trim_matches(|ch: char| ch == '-' || ch.is_whitespace());
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    CATEGORIES
        .iter()
        .find(|(heading, _)| heading.eq_ignore_ascii_case(word))
        .map(|(_, category)| *category)
}

/// Category of every rule in a list, following its section headings. A
/// rule keeps the first category it appears under.
pub fn parse_filter_categories(text: &str) -> BTreeMap<CanonicalRule, &'static str> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut categories = BTreeMap::new();
    let mut current = DEFAULT_CATEGORY;

    for raw_line in text.lines() {
        if let Some(category) = section_category(raw_line) {
            current = category;
            continue;
        }

        let rules = match parse_line(raw_line) {
            LineOutcome::Rule(rule) => vec![rule],
            LineOutcome::Keywords(keywords) => keywords,
            _ => continue,
        };
        for rule in rules {
            categories.entry(rule).or_insert(current);
        }
    }

    categories
}

// =============================================================================
// Keyword fallback
// =============================================================================

fn extract_safe_keywords(line: &str) -> Vec<CanonicalRule> {
    // Only the pattern part; `$domain=...` options name unrelated sites
    let pattern = match line.find('$') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let mut keywords: Vec<CanonicalRule> = Vec::new();
    for token in pattern.split(|ch: char| !ch.is_ascii_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        let token = token.to_ascii_lowercase();
        if !SAFE_KEYWORDS.contains(&token.as_str()) {
            continue;
        }
        if let Ok(rule) = CanonicalRule::keyword(&token) {
            if !keywords.contains(&rule) {
                keywords.push(rule);
            }
        }
    }
    keywords
}
