use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cr_compiler::merger::MergePolicy;
use cr_compiler::render::RenderLayout;
use cr_compiler::source::{ConfigError, SourceDescriptor, SourcePlan};
use cr_core::types::{KindMask, RuleKind};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (ClashRule Converter)";

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Top-level pipeline configuration (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub outputs: Vec<OutputConfig>,
    /// Directory relative paths are resolved against (the config file's).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// One rendered list file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub path: PathBuf,
    /// Always explicit; never inferred from the source list.
    pub policy: MergePolicy,
    #[serde(default)]
    pub layout: RenderLayout,
    pub sources: Vec<SourceDescriptor>,
    /// Kinds rendered into the file. Defaults to all.
    #[serde(default)]
    pub kinds: Option<Vec<RuleKind>>,
    #[serde(default)]
    pub track_changes: bool,
    #[serde(default)]
    pub version_file: Option<PathBuf>,
    #[serde(default)]
    pub note: Option<String>,
}

impl OutputConfig {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn kind_mask(&self) -> KindMask {
        match &self.kinds {
            Some(kinds) => KindMask::from_kinds(kinds.iter().copied()),
            None => KindMask::ALL,
        }
    }
}

/// An output paired with its validated source plan.
#[derive(Debug, Clone)]
pub struct PlannedOutput {
    pub output: OutputConfig,
    pub plan: SourcePlan,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        let mut config = Self::from_json(&content)
            .map_err(|e| format!("Invalid config '{}': {}", path.display(), e))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Validate every output and plan its sources. Runs before any fetch.
    pub fn plan(&self) -> Result<Vec<PlannedOutput>, ConfigError> {
        if self.outputs.is_empty() {
            return Err(ConfigError::Output {
                output: "*".to_string(),
                message: "no outputs configured".to_string(),
            });
        }

        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        let mut planned = Vec::with_capacity(self.outputs.len());

        for output in &self.outputs {
            let fail = |message: String| ConfigError::Output {
                output: output.name.clone(),
                message,
            };

            if output.name.trim().is_empty() {
                return Err(fail("empty output name".to_string()));
            }
            if !names.insert(output.name.as_str()) {
                return Err(fail("duplicate output name".to_string()));
            }
            if !paths.insert(self.resolve(&output.path)) {
                return Err(fail(format!("duplicate output path '{}'", output.path.display())));
            }
            if output.kind_mask().is_empty() {
                return Err(fail("no rule kinds selected".to_string()));
            }
            if output.sources.iter().all(|source| source.exclude_only) {
                return Err(fail("every source is exclude-only".to_string()));
            }
            // Claiming rules without rendering them only means something in a chain
            if output.policy != MergePolicy::PriorityChain {
                if let Some(source) = output.sources.iter().find(|source| source.exclude_only) {
                    return Err(fail(format!(
                        "exclude-only source '{}' requires the priority-chain policy",
                        source.name
                    )));
                }
            }

            let plan = SourcePlan::new(output.sources.clone()).map_err(|e| fail(e.to_string()))?;
            planned.push(PlannedOutput {
                output: output.clone(),
                plan,
            });
        }

        Ok(planned)
    }
}
