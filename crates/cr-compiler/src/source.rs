//! Source descriptors and priority planning
//!
//! A [`SourcePlan`] is the validated, priority-ordered list of upstream
//! sources feeding one output. Validation happens once at setup time so that
//! a misconfigured run fails before anything is fetched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use cr_core::types::{KindMask, RuleKind};

/// Configuration error. The only error class that aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("No sources configured")]
    NoSources,
    #[error("Source #{0} has an empty name")]
    EmptyName(usize),
    #[error("Duplicate source name: {0}")]
    DuplicateName(String),
    #[error("Source '{0}' has no URLs and no extra rules")]
    NoInputs(String),
    #[error("Sources '{first}' and '{second}' share priority {priority}")]
    DuplicatePriority {
        first: String,
        second: String,
        priority: u32,
    },
    #[error("Source '{0}' accepts no rule kinds")]
    NoKinds(String),
    #[error("Output '{output}': {message}")]
    Output { output: String, message: String },
}

/// One upstream source. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    #[serde(default)]
    pub urls: Vec<String>,
    /// Lower rank wins. Defaults to the declaration index.
    #[serde(default)]
    pub priority: Option<u32>,
    /// Claims rules in a priority chain but produces no output section.
    #[serde(default)]
    pub exclude_only: bool,
    /// Kinds this source may contribute. Defaults to all.
    #[serde(default)]
    pub kinds: Option<Vec<RuleKind>>,
    /// Hand-maintained rule lines merged into this source.
    #[serde(default)]
    pub extra: Vec<String>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            name: name.into(),
            urls,
            priority: None,
            exclude_only: false,
            kinds: None,
            extra: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn exclude_only(mut self) -> Self {
        self.exclude_only = true;
        self
    }

    pub fn kind_mask(&self) -> KindMask {
        match &self.kinds {
            Some(kinds) => KindMask::from_kinds(kinds.iter().copied()),
            None => KindMask::ALL,
        }
    }
}

/// Validated sources in merge order (highest priority first).
#[derive(Debug, Clone)]
pub struct SourcePlan {
    sources: Vec<SourceDescriptor>,
}

impl SourcePlan {
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut names: HashSet<&str> = HashSet::new();
        for (index, source) in sources.iter().enumerate() {
            let name = source.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyName(index));
            }
            if !names.insert(name) {
                return Err(ConfigError::DuplicateName(name.to_string()));
            }
            if source.urls.is_empty() && source.extra.is_empty() {
                return Err(ConfigError::NoInputs(name.to_string()));
            }
            if source.kind_mask().is_empty() {
                return Err(ConfigError::NoKinds(name.to_string()));
            }
        }

        let mut ranked: Vec<(u32, SourceDescriptor)> = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| (source.priority.unwrap_or(index as u32), source))
            .collect();

        // Stable: equal ranks are rejected below, so declaration order never decides
        ranked.sort_by_key(|(rank, _)| *rank);

        for pair in ranked.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(ConfigError::DuplicatePriority {
                    first: pair[0].1.name.clone(),
                    second: pair[1].1.name.clone(),
                    priority: pair[0].0,
                });
            }
        }

        Ok(Self {
            sources: ranked.into_iter().map(|(_, source)| source).collect(),
        })
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|source| source.name == name)
    }
}
