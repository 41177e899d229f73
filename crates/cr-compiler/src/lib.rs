//! ClashRule Filter List Compiler
//!
//! This crate turns Adblock Plus, hosts-file and Clash rule lists into
//! canonical domain rules and resolves overlaps between sources.

pub mod diff;
pub mod merger;
pub mod metadata;
pub mod parser;
pub mod render;
pub mod source;

pub use diff::{diff_rules, RuleDiff};
pub use merger::{merge_sources, MergeOutcome, MergePolicy, MergedGroup};
pub use metadata::ListMetadata;
pub use parser::{parse_filter_bytes, parse_filter_categories, parse_filter_list, parse_line, LineOutcome};
pub use render::{group_by_category, render_list, ListHeader, RenderLayout, SourceSummary};
pub use source::{ConfigError, SourceDescriptor, SourcePlan};
