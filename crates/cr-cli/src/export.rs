use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use cr_compiler::parser::parse_filter_list_with_stats;
use cr_core::types::{CanonicalRule, RuleKind, RuleSet};

pub struct ExportOptions {
    pub inputs: Vec<String>,
    pub output: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ExportedRule<'a> {
    kind: RuleKind,
    value: &'a str,
}

impl<'a> From<&'a CanonicalRule> for ExportedRule<'a> {
    fn from(rule: &'a CanonicalRule) -> Self {
        Self {
            kind: rule.kind(),
            value: rule.value(),
        }
    }
}

/// Parse filter lists and dump the extracted rules as a JSON array of
/// `{ "kind": ..., "value": ... }` objects.
pub fn run_export(opts: ExportOptions) -> Result<(), String> {
    if opts.inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let mut rules = RuleSet::new();
    let mut total_lines = 0usize;

    for input in &opts.inputs {
        let bytes = fs::read(input).map_err(|e| format!("Failed to read '{}': {}", input, e))?;
        let (parsed, stats) = parse_filter_list_with_stats(&String::from_utf8_lossy(&bytes));
        total_lines += stats.lines;
        rules.union_with(&parsed);
    }

    let json = export_json(&rules)?;

    let output_path = PathBuf::from(&opts.output);
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
        }
    }
    fs::write(&output_path, json)
        .map_err(|e| format!("Failed to write '{}': {}", output_path.display(), e))?;

    println!("Exported {}", output_path.display());
    println!("Source files: {}", opts.inputs.len());
    println!("Source lines: {}", total_lines);
    println!("Unique rules: {}", rules.len());

    Ok(())
}

fn export_json(rules: &RuleSet) -> Result<String, String> {
    let out: Vec<ExportedRule<'_>> = rules.iter().map(ExportedRule::from).collect();
    serde_json::to_string_pretty(&out).map_err(|e| format!("Failed to serialize JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_kind_and_value() {
        let rules: RuleSet = vec![
            CanonicalRule::suffix("ads.example.com").unwrap(),
            CanonicalRule::keyword("adservice").unwrap(),
        ]
        .into_iter()
        .collect();

        let json = export_json(&rules).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                { "kind": "DOMAIN-SUFFIX", "value": "ads.example.com" },
                { "kind": "DOMAIN-KEYWORD", "value": "adservice" }
            ])
        );
    }

    #[test]
    fn run_export_merges_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "||ads.example.com^\n##.banner\n").unwrap();
        fs::write(&b, "0.0.0.0 ads.example.com\n").unwrap();

        let output = dir.path().join("out/rules.json");
        run_export(ExportOptions {
            inputs: vec![a.display().to_string(), b.display().to_string()],
            output: output.display().to_string(),
        })
        .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn run_export_requires_inputs() {
        let err = run_export(ExportOptions {
            inputs: Vec::new(),
            output: "rules.json".to_string(),
        })
        .unwrap_err();
        assert_eq!(err, "No input files specified");
    }
}
