//! ClashRule Core Library
//!
//! This crate provides the canonical rule model shared by the ClashRule
//! extractor, merger and CLI.
//!
//! # Architecture
//!
//! Every upstream dialect (Adblock Plus, hosts files, Clash rule lists) is
//! reduced to a [`CanonicalRule`]: a `(kind, value)` pair that renders as a
//! single `KIND,value` line. Rule sets are ordered by value so that rendered
//! output is deterministic and diffs cleanly between runs.
//!
//! # Modules
//!
//! - `types`: Rule kinds, kind masks, canonical rules and rule sets
//! - `domain`: Domain validity predicate and normalization
//! - `url`: Fast scheme/host extraction without allocations
//! - `error`: Error type for rule construction

pub mod domain;
pub mod error;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use domain::{is_valid_domain, normalize_domain};
pub use error::RuleError;
pub use types::{CanonicalRule, KindMask, RuleKind, RuleSet};
