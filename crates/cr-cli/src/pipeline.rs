use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Utc};

use cr_compiler::diff::{diff_against_lines, RuleDiff};
use cr_compiler::merger::{merge_sources, MergeStats, MergedGroup};
use cr_compiler::metadata::ListMetadata;
use cr_compiler::parser::{parse_filter_categories, parse_filter_list};
use cr_compiler::render::{
    group_by_category, read_header_counts, render_list, ListHeader, RenderLayout, SourceSummary,
};
use cr_compiler::source::SourcePlan;
use cr_core::types::RuleSet;

use crate::config::{OutputConfig, PipelineConfig, PlannedOutput};
use crate::fetch::{FetchedSources, Fetcher};
use crate::state::{self, ListVersion};

const BEIJING_OFFSET_SECS: i32 = 8 * 3600;

/// Everything produced for one output, ready to be written.
#[derive(Debug, Clone)]
pub struct OutputArtifacts {
    pub name: String,
    pub content: String,
    pub rules: RuleSet,
    pub diff: Option<RuleDiff>,
    pub version: Option<ListVersion>,
    pub merge: MergeStats,
}

/// State handed in from the previous run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviousRun<'a> {
    pub content: Option<&'a str>,
    /// Version to publish, already bumped by the caller.
    pub version: Option<&'a ListVersion>,
}

/// `2026年10月17日 08:00` in UTC+8.
pub fn beijing_timestamp(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(BEIJING_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).format("%Y年%m月%d日 %H:%M").to_string(),
        None => now.format("%Y年%m月%d日 %H:%M").to_string(),
    }
}

/// Extract, merge, diff and render one output. Pure: every input is handed
/// in, nothing is read or written.
pub fn assemble_output(
    output: &OutputConfig,
    plan: &SourcePlan,
    fetched: &FetchedSources,
    previous: PreviousRun<'_>,
    updated_at: &str,
) -> OutputArtifacts {
    let mut extracted = Vec::with_capacity(plan.len());
    let mut metadata = Vec::with_capacity(plan.len());
    let mut categories = BTreeMap::new();
    let by_category = output.layout == RenderLayout::ByCategory;

    for source in plan.sources() {
        let mut rules = RuleSet::new();
        let mut meta = ListMetadata::default();

        for url in &source.urls {
            let body = fetched.get(url).map(Vec::as_slice).unwrap_or_default();
            let text = String::from_utf8_lossy(body);
            rules.union_with(&parse_filter_list(&text));
            meta.absorb(ListMetadata::scan(&text));
            if by_category {
                for (rule, category) in parse_filter_categories(&text) {
                    categories.entry(rule).or_insert(category);
                }
            }
        }

        if !source.extra.is_empty() {
            rules.union_with(&parse_filter_list(&source.extra.join("\n")));
        }

        rules.retain_kinds(source.kind_mask());
        log::info!("[{}] source '{}': {} rules", output.name, source.name, rules.len());

        extracted.push((source.name.clone(), rules));
        metadata.push(meta);
    }

    let outcome = merge_sources(output.policy, extracted);
    let mask = output.kind_mask();

    let mut summaries = Vec::with_capacity(outcome.groups.len());
    let mut groups: Vec<MergedGroup> = Vec::with_capacity(outcome.groups.len());

    for ((group, source), meta) in outcome
        .groups
        .iter()
        .zip(plan.sources())
        .zip(metadata)
    {
        let mut rules = group.rules.clone();
        rules.retain_kinds(mask);

        let kept = if source.exclude_only { 0 } else { rules.len() };
        let name = if source.exclude_only {
            format!("{}（去重排除源）", source.name)
        } else {
            source.name.clone()
        };

        summaries.push(SourceSummary {
            name,
            urls: source.urls.clone(),
            extracted: group.before,
            kept,
            last_modified: meta.last_modified,
            upstream_version: meta.version,
        });

        if !source.exclude_only {
            groups.push(MergedGroup {
                name: group.name.clone(),
                before: group.before,
                rules,
            });
        }
    }

    let mut total = RuleSet::new();
    for group in &groups {
        total.union_with(&group.rules);
    }

    let diff = if output.track_changes {
        let previous_lines = previous.content.unwrap_or_default().lines();
        Some(diff_against_lines(previous_lines, &total))
    } else {
        None
    };

    let header = ListHeader {
        title: output.title().to_string(),
        updated_at: updated_at.to_string(),
        version: previous.version.map(ToString::to_string),
        added: diff.as_ref().map(RuleDiff::added_count),
        removed: diff.as_ref().map(RuleDiff::removed_count),
        sources: summaries,
        note: output.note.clone(),
    };

    let content = if by_category {
        render_list(&header, &group_by_category(&groups, &categories), output.layout)
    } else {
        render_list(&header, &groups, output.layout)
    };

    OutputArtifacts {
        name: output.name.clone(),
        content,
        rules: total,
        diff,
        version: previous.version.cloned(),
        merge: outcome.stats,
    }
}

pub struct BuildOptions {
    pub only: Vec<String>,
    pub dry_run: bool,
}

/// One line of the build report.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub name: String,
    pub path: PathBuf,
    pub total: usize,
    pub previous_total: Option<usize>,
    pub added: Option<usize>,
    pub removed: Option<usize>,
    pub deduped: usize,
}

pub fn run_build(config: &PipelineConfig, opts: &BuildOptions) -> Result<Vec<BuildSummary>, String> {
    let planned: Vec<PlannedOutput> = config
        .plan()
        .map_err(|e| format!("Invalid configuration: {}", e))?
        .into_iter()
        .filter(|p| opts.only.is_empty() || opts.only.contains(&p.output.name))
        .collect();

    if planned.is_empty() {
        return Err(format!("No configured output matches {:?}", opts.only));
    }

    let start = Instant::now();
    let fetcher = Fetcher::new(
        Duration::from_secs(config.timeout_secs),
        &config.user_agent,
        &config.base_dir,
    )?;

    let urls: Vec<String> = planned
        .iter()
        .flat_map(|p| p.plan.sources().iter().flat_map(|s| s.urls.iter().cloned()))
        .collect();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    let fetched = runtime.block_on(fetcher.fetch_all(urls));
    log::info!("fetched {} upstream lists in {:.1}s", fetched.len(), start.elapsed().as_secs_f64());

    let updated_at = beijing_timestamp(Utc::now());
    let mut summaries = Vec::with_capacity(planned.len());

    for PlannedOutput { output, plan } in &planned {
        let path = config.resolve(&output.path);
        let previous_content = state::read_previous(&path)?;

        let version_path = output.version_file.as_ref().map(|p| config.resolve(p));
        let version = match &version_path {
            Some(p) => Some(state::next_version(state::read_version(p)?)),
            None => None,
        };

        let artifacts = assemble_output(
            output,
            plan,
            &fetched,
            PreviousRun {
                content: previous_content.as_deref(),
                version: version.as_ref(),
            },
            &updated_at,
        );

        if !opts.dry_run {
            state::write_text(&path, &artifacts.content)?;
            if let (Some(p), Some(v)) = (&version_path, &artifacts.version) {
                state::write_text(p, &v.to_string())?;
            }
            if let Some(diff) = &artifacts.diff {
                let (added_path, removed_path) = state::change_list_paths(&path);
                state::write_lines(&added_path, &diff.added_lines())?;
                state::write_lines(&removed_path, &diff.removed_lines())?;
            }
        }

        summaries.push(BuildSummary {
            name: artifacts.name.clone(),
            path,
            total: artifacts.rules.len(),
            previous_total: previous_content
                .as_deref()
                .and_then(|text| read_header_counts(text).total),
            added: artifacts.diff.as_ref().map(RuleDiff::added_count),
            removed: artifacts.diff.as_ref().map(RuleDiff::removed_count),
            deduped: artifacts.merge.deduped,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use cr_compiler::merger::MergePolicy;
    use cr_compiler::source::SourceDescriptor;
    use cr_core::types::{CanonicalRule, RuleKind};

    fn output(sources: Vec<SourceDescriptor>, policy: MergePolicy) -> OutputConfig {
        OutputConfig {
            name: "Test".to_string(),
            title: None,
            path: PathBuf::from("Test.list"),
            policy,
            layout: RenderLayout::ByKind,
            sources,
            kinds: None,
            track_changes: false,
            version_file: None,
            note: None,
        }
    }

    fn fetched(entries: &[(&str, &str)]) -> FetchedSources {
        entries
            .iter()
            .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
            .collect()
    }

    fn src(name: &str, url: &str) -> SourceDescriptor {
        SourceDescriptor::new(name, vec![url.to_string()])
    }

    fn suffix(v: &str) -> CanonicalRule {
        CanonicalRule::suffix(v).unwrap()
    }

    #[test]
    fn formats_beijing_time() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 30, 0).unwrap();
        assert_eq!(beijing_timestamp(now), "2026年10月17日 08:30");
    }

    #[test]
    fn exclude_only_sources_claim_but_do_not_render() {
        let out = output(
            vec![
                src("Advertising", "adv").exclude_only(),
                src("EasyList", "easy"),
            ],
            MergePolicy::PriorityChain,
        );
        let plan = SourcePlan::new(out.sources.clone()).unwrap();
        let fetched = fetched(&[
            ("adv", "DOMAIN-SUFFIX,x.com\n"),
            ("easy", "! Last modified: 01 Jan 2025 10:00 UTC\n||x.com^\n||y.com^\n"),
        ]);

        let artifacts = assemble_output(&out, &plan, &fetched, PreviousRun::default(), "now");

        assert_eq!(artifacts.rules, vec![suffix("y.com")].into_iter().collect());
        assert!(artifacts.content.contains("# - Advertising（去重排除源）"));
        assert!(artifacts.content.contains("#   原规则更新时间：01 Jan 2025 10:00 UTC"));
        assert!(!artifacts.content.contains("DOMAIN-SUFFIX,x.com"));
        assert!(artifacts.content.ends_with("# === DOMAIN-SUFFIX 规则 ===\nDOMAIN-SUFFIX,y.com\n"));
    }

    #[test]
    fn failed_sources_do_not_block_the_rest() {
        let out = output(
            vec![src("down", "https://unreachable.invalid/list"), src("up", "up")],
            MergePolicy::PriorityChain,
        );
        let plan = SourcePlan::new(out.sources.clone()).unwrap();
        let fetched = fetched(&[("up", "0.0.0.0 ads.example.com\n")]);

        let artifacts = assemble_output(&out, &plan, &fetched, PreviousRun::default(), "now");
        assert_eq!(artifacts.rules.len(), 1);
        assert!(artifacts.content.contains("# - down\n#   URL：https://unreachable.invalid/list\n#   提取规则数：0"));
    }

    #[test]
    fn pairwise_outputs_group_by_source() {
        let mut out = output(
            vec![src("A", "a"), src("B", "b")],
            MergePolicy::Pairwise,
        );
        out.layout = RenderLayout::BySource;
        let plan = SourcePlan::new(out.sources.clone()).unwrap();
        let fetched = fetched(&[("a", "x.com\ny.com\n"), ("b", "y.com\nz.com\n")]);

        let artifacts = assemble_output(&out, &plan, &fetched, PreviousRun::default(), "now");
        assert!(artifacts.content.contains("# ===== A =====\nDOMAIN-SUFFIX,x.com\n"));
        assert!(artifacts.content.contains("# ===== B =====\nDOMAIN-SUFFIX,z.com\n"));
        assert!(!artifacts.content.contains("y.com"));
        assert_eq!(artifacts.merge.deduped, 2);
    }

    #[test]
    fn category_layout_follows_upstream_sections() {
        let mut out = output(vec![src("EasyList", "easy"), src("Privacy", "privacy")], MergePolicy::PriorityChain);
        out.layout = RenderLayout::ByCategory;
        let plan = SourcePlan::new(out.sources.clone()).unwrap();
        let fetched = fetched(&[
            ("easy", "! General\n||ads.com^\n! Social\n||share.com^\n"),
            ("privacy", "! Tracking\n||pixel.com^\n||share.com^\n"),
        ]);

        let artifacts = assemble_output(&out, &plan, &fetched, PreviousRun::default(), "now");
        assert_eq!(artifacts.rules.len(), 3);
        assert!(artifacts.content.contains(
            "# ===== 通用广告 =====\nDOMAIN-SUFFIX,ads.com\n\n# ===== 追踪器 =====\nDOMAIN-SUFFIX,pixel.com\n\n# ===== 社交按钮 =====\nDOMAIN-SUFFIX,share.com\n"
        ));
    }

    #[test]
    fn tracks_changes_against_previous_run() {
        let mut out = output(vec![src("A", "a")], MergePolicy::PriorityChain);
        out.track_changes = true;
        let plan = SourcePlan::new(out.sources.clone()).unwrap();
        let fetched = fetched(&[("a", "||b.com^\n||c.com^\n")]);

        let previous = "# 内容：Test\n# 总数量：2 条\n\nDOMAIN-SUFFIX,c.com\nDOMAIN-SUFFIX,a.com\n";
        let version: ListVersion = "1.0.3".parse().unwrap();
        let artifacts = assemble_output(
            &out,
            &plan,
            &fetched,
            PreviousRun {
                content: Some(previous),
                version: Some(&version),
            },
            "now",
        );

        let diff = artifacts.diff.unwrap();
        assert_eq!(diff.added_lines(), vec!["DOMAIN-SUFFIX,b.com"]);
        assert_eq!(diff.removed_lines(), vec!["DOMAIN-SUFFIX,a.com"]);
        assert!(artifacts.content.contains("# 新增：1 条\n# 删除：1 条\n# 版本：1.0.3\n"));
        assert_eq!(artifacts.version, Some(version));
    }

    #[test]
    fn source_and_output_kind_filters() {
        let mut a = src("A", "a");
        a.kinds = Some(vec![RuleKind::DomainSuffix, RuleKind::DomainKeyword]);
        a.extra = vec!["DOMAIN-SUFFIX,manual.lan".to_string()];
        let mut out = output(vec![a], MergePolicy::PriorityChain);
        out.kinds = Some(vec![RuleKind::DomainSuffix]);
        let plan = SourcePlan::new(out.sources.clone()).unwrap();
        let fetched = fetched(&[("a", "DOMAIN,exact.com\nDOMAIN-KEYWORD,ads\n||s.com^\n")]);

        let artifacts = assemble_output(&out, &plan, &fetched, PreviousRun::default(), "now");
        assert_eq!(
            artifacts.rules,
            vec![suffix("manual.lan"), suffix("s.com")].into_iter().collect()
        );
    }

    #[test]
    fn run_build_writes_outputs_offline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("easy.txt"), "||ads.example.com^\n@@||ok.example.com^\n").unwrap();
        std::fs::write(dir.path().join("hosts.txt"), "0.0.0.0 ads.example.com\n0.0.0.0 t.example.net\n").unwrap();

        let json = r#"{
            "outputs": [{
                "name": "AD",
                "path": "out/AD.list",
                "policy": "priority-chain",
                "track_changes": true,
                "version_file": "out/AD.version",
                "sources": [
                    { "name": "easy", "urls": ["easy.txt"] },
                    { "name": "hosts", "urls": ["hosts.txt", "missing.txt"] }
                ]
            }]
        }"#;
        let mut config = PipelineConfig::from_json(json).unwrap();
        config.base_dir = dir.path().to_path_buf();

        let opts = BuildOptions {
            only: Vec::new(),
            dry_run: false,
        };
        let summaries = run_build(&config, &opts).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total, 2);
        assert_eq!(summaries[0].deduped, 1);
        assert_eq!(summaries[0].added, Some(2));

        let content = std::fs::read_to_string(dir.path().join("out/AD.list")).unwrap();
        assert!(content.contains("DOMAIN-SUFFIX,ads.example.com\nDOMAIN-SUFFIX,t.example.net\n"));
        assert!(content.contains("# 版本：1\n"));
        assert_eq!(std::fs::read_to_string(dir.path().join("out/AD.version")).unwrap(), "1");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/AD_added.txt")).unwrap(),
            "DOMAIN-SUFFIX,ads.example.com\nDOMAIN-SUFFIX,t.example.net\n"
        );

        // Second run: nothing changed, version advances
        let summaries = run_build(&config, &opts).unwrap();
        assert_eq!(summaries[0].added, Some(0));
        assert_eq!(summaries[0].removed, Some(0));
        assert_eq!(summaries[0].previous_total, Some(2));
        assert_eq!(std::fs::read_to_string(dir.path().join("out/AD.version")).unwrap(), "2");

        // Dotted counters carried over from older runs keep their shape
        std::fs::write(dir.path().join("out/AD.version"), "1.0.7\n").unwrap();
        run_build(&config, &opts).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("out/AD.version")).unwrap(), "1.0.8");
        let content = std::fs::read_to_string(dir.path().join("out/AD.list")).unwrap();
        assert!(content.contains("# 版本：1.0.8\n"));
    }

    #[test]
    fn run_build_rejects_unknown_output_filter() {
        let json = r#"{"outputs": [{"name": "AD", "path": "AD.list", "policy": "pairwise",
            "sources": [{"name": "a", "urls": ["a.txt"]}]}]}"#;
        let config = PipelineConfig::from_json(json).unwrap();
        let opts = BuildOptions {
            only: vec!["nope".to_string()],
            dry_run: true,
        };
        assert!(run_build(&config, &opts).is_err());
    }
}
