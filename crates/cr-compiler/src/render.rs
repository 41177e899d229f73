use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cr_core::types::{CanonicalRule, RuleKind, RuleSet};

use crate::merger::MergedGroup;
use crate::parser::{CATEGORIES, DEFAULT_CATEGORY};

const UNKNOWN: &str = "未知";

/// Body layout of a rendered list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderLayout {
    /// One `# === KIND 规则 ===` section per rule kind.
    #[default]
    ByKind,
    /// One `# ===== name =====` section per merged group.
    BySource,
    /// One `# ===== category =====` section per upstream category. Groups
    /// come from [`group_by_category`].
    ByCategory,
}

/// Provenance line block for one upstream source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub name: String,
    pub urls: Vec<String>,
    /// Rules extracted before cross-source subtraction.
    pub extracted: usize,
    /// Rules left after subtraction.
    pub kept: usize,
    pub last_modified: Option<String>,
    pub upstream_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListHeader {
    pub title: String,
    pub updated_at: String,
    /// Published version, `7` or `1.0.7`.
    pub version: Option<String>,
    pub added: Option<usize>,
    pub removed: Option<usize>,
    pub sources: Vec<SourceSummary>,
    pub note: Option<String>,
}

/// Render a complete list file: header block, then rules.
///
/// Groups must be disjoint (the output of a merge). Output ends with exactly
/// one newline.
pub fn render_list(header: &ListHeader, groups: &[MergedGroup], layout: RenderLayout) -> String {
    let total: usize = groups.iter().map(|group| group.rules.len()).sum();

    let mut lines = render_header(header, total);
    lines.push(String::new());

    match layout {
        RenderLayout::ByKind => {
            let mut all = RuleSet::new();
            for group in groups {
                all.union_with(&group.rules);
            }
            render_by_kind(&all, &mut lines);
        }
        RenderLayout::BySource | RenderLayout::ByCategory => {
            for group in groups.iter().filter(|group| !group.rules.is_empty()) {
                lines.push(format!("# ===== {} =====", group.name));
                lines.extend(group.rules.iter().map(CanonicalRule::to_string));
                lines.push(String::new());
            }
        }
    }

    let mut out = lines.join("\n").trim_end().to_string();
    out.push('\n');
    out
}

fn render_header(header: &ListHeader, total: usize) -> Vec<String> {
    let mut lines = vec![
        format!("# 内容：{}", header.title),
        format!("# 总数量：{} 条", total),
    ];

    if let Some(added) = header.added {
        lines.push(format!("# 新增：{} 条", added));
    }
    if let Some(removed) = header.removed {
        lines.push(format!("# 删除：{} 条", removed));
    }
    if let Some(version) = &header.version {
        lines.push(format!("# 版本：{}", version));
    }
    lines.push(format!("# 更新时间（北京时间）：{}", header.updated_at));

    if !header.sources.is_empty() {
        lines.push("#".to_string());
        lines.push("# 规则来源：".to_string());
        for source in &header.sources {
            lines.push(format!("# - {}", source.name));
            for url in &source.urls {
                lines.push(format!("#   URL：{}", url));
            }
            lines.push(format!("#   提取规则数：{}", source.extracted));
            lines.push(format!("#   保留规则数：{}", source.kept));
            lines.push(format!(
                "#   原规则更新时间：{}",
                source.last_modified.as_deref().unwrap_or(UNKNOWN)
            ));
            if let Some(version) = &source.upstream_version {
                lines.push(format!("#   原规则版本：{}", version));
            }
        }
    }

    if let Some(note) = &header.note {
        lines.push(format!("# 说明：{}", note));
    }

    lines
}

fn render_by_kind(rules: &RuleSet, lines: &mut Vec<String>) {
    for kind in RuleKind::ALL {
        let mut section = rules.by_kind(kind).peekable();
        if section.peek().is_none() {
            continue;
        }
        lines.push(format!("# === {} 规则 ===", kind.wire_name()));
        lines.extend(section.map(CanonicalRule::to_string));
        lines.push(String::new());
    }
}

/// Regroup merged rules by upstream category, in [`CATEGORIES`] order.
/// Rules with no recorded category land in [`DEFAULT_CATEGORY`].
pub fn group_by_category(
    groups: &[MergedGroup],
    categories: &BTreeMap<CanonicalRule, &'static str>,
) -> Vec<MergedGroup> {
    let mut by_category: Vec<MergedGroup> = CATEGORIES
        .iter()
        .map(|(_, name)| MergedGroup {
            name: name.to_string(),
            rules: RuleSet::new(),
            before: 0,
        })
        .collect();

    for rule in groups.iter().flat_map(|group| group.rules.iter()) {
        let name = categories.get(rule).copied().unwrap_or(DEFAULT_CATEGORY);
        if let Some(group) = by_category.iter_mut().find(|group| group.name == name) {
            group.rules.insert(rule.clone());
        }
    }

    for group in &mut by_category {
        group.before = group.rules.len();
    }
    by_category
}

/// Counts recorded in a previously rendered header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCounts {
    pub total: Option<usize>,
    pub version: Option<String>,
}

pub fn read_header_counts(text: &str) -> HeaderCounts {
    let mut counts = HeaderCounts::default();

    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with('#') {
            break;
        }
        if let Some(rest) = line.strip_prefix("# 总数量：") {
            counts.total = leading_number(rest);
        } else if let Some(rest) = line.strip_prefix("# 版本：") {
            let version = rest.trim();
            if !version.is_empty() {
                counts.version = Some(version.to_string());
            }
        }
    }

    counts
}

fn leading_number(text: &str) -> Option<usize> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
