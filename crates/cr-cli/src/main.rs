//! ClashRule CLI
//!
//! Converts upstream filter lists into deduplicated Clash domain rule lists.

mod config;
mod export;
mod fetch;
mod pipeline;
mod state;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

use cr_compiler::diff::diff_rules;
use cr_compiler::parser::parse_filter_list_with_stats;
use cr_core::types::{RuleKind, RuleSet};

use crate::config::PipelineConfig;
use crate::export::{run_export, ExportOptions};
use crate::pipeline::{run_build, BuildOptions};

#[derive(Parser)]
#[command(name = "cr-cli")]
#[command(about = "Filter list to Clash rule converter")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, merge and write every configured output
    Build {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Only build the named outputs
        #[arg(long)]
        only: Vec<String>,

        /// Report without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a pipeline configuration without fetching
    Check {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Extract rules from local filter lists into one canonical list
    Extract {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Compare the rules of two list files
    Diff {
        /// Previous list
        #[arg(long)]
        old: String,

        /// Current list
        #[arg(long)]
        new: String,
    },

    /// Export extracted rules as a JSON array
    Export {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output JSON file
        #[arg(short, long, default_value = "rules.json")]
        output: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Build {
            config,
            only,
            dry_run,
        } => cmd_build(&config, only, dry_run),
        Commands::Check { config } => cmd_check(&config),
        Commands::Extract { input, output } => cmd_extract(&input, output.as_deref()),
        Commands::Diff { old, new } => cmd_diff(&old, &new),
        Commands::Export { input, output } => run_export(ExportOptions { inputs: input, output }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_build(config_path: &Path, only: Vec<String>, dry_run: bool) -> Result<(), String> {
    let start = Instant::now();
    let config = PipelineConfig::load(config_path)?;
    let summaries = run_build(&config, &BuildOptions { only, dry_run })?;

    for summary in &summaries {
        let previous = summary
            .previous_total
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!("{} -> '{}'", summary.name, summary.path.display());
        println!("  Rules:    {} (previous {}, dedupe removed {})", summary.total, previous, summary.deduped);
        if let (Some(added), Some(removed)) = (summary.added, summary.removed) {
            println!("  Changes:  +{} -{}", added, removed);
        }
    }

    println!(
        "{} {} outputs in {:.1}s",
        if dry_run { "Checked" } else { "Built" },
        summaries.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn cmd_check(config_path: &Path) -> Result<(), String> {
    let config = PipelineConfig::load(config_path)?;
    let planned = config
        .plan()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    println!("Configuration OK: {} outputs", planned.len());
    for entry in &planned {
        println!(
            "  {} ({:?}, {} sources) -> '{}'",
            entry.output.name,
            entry.output.policy,
            entry.plan.len(),
            config.resolve(&entry.output.path).display()
        );
        for source in entry.plan.sources() {
            let role = if source.exclude_only { " [exclude-only]" } else { "" };
            println!("    - {}{}: {} urls", source.name, role, source.urls.len());
        }
    }

    Ok(())
}

fn cmd_extract(inputs: &[String], output: Option<&str>) -> Result<(), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let mut rules = RuleSet::new();
    for path in inputs {
        let bytes = fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let (parsed, stats) = parse_filter_list_with_stats(&String::from_utf8_lossy(&bytes));
        eprintln!(
            "  {} - {} lines, {} rules ({} discarded)",
            Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
            stats.lines,
            parsed.len(),
            stats.discarded
        );
        rules.union_with(&parsed);
    }

    let mut text = String::new();
    for kind in RuleKind::ALL {
        for rule in rules.by_kind(kind) {
            text.push_str(&rule.to_string());
            text.push('\n');
        }
    }

    match output {
        Some(path) => {
            state::write_text(Path::new(path), &text)?;
            eprintln!("Extracted {} rules to '{}'", rules.len(), path);
        }
        None => print!("{}", text),
    }

    Ok(())
}

fn cmd_diff(old: &str, new: &str) -> Result<(), String> {
    let read = |path: &str| -> Result<RuleSet, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        Ok(RuleSet::from_lines(text.lines()))
    };

    let diff = diff_rules(&read(old)?, &read(new)?);
    for line in diff.added_lines() {
        println!("+ {}", line);
    }
    for line in diff.removed_lines() {
        println!("- {}", line);
    }
    println!("Added: {}, removed: {}", diff.added_count(), diff.removed_count());

    Ok(())
}
