//! Session configuration and workspace files.
//!
//! A workspace file is JSON: an optional `config` object and the list of
//! modules to check.
//!
//! ```json
//! {
//!   "config": { "parallel": true, "resolution": { "maxEvaluationDepth": 64 } },
//!   "modules": [{ "name": "shapes", "aliases": [], "queries": [] }]
//! }
//! ```

use crate::session::ModuleSource;
use anyhow::{Context, Result, bail};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tsr_solver::ResolutionOptions;

/// Limits and scheduling for one `CheckSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Limits handed to every resolution context.
    pub resolution: ResolutionOptions,
    /// One worker thread per module; `false` checks modules in dependency
    /// order on the calling thread.
    pub parallel: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            resolution: ResolutionOptions::default(),
            parallel: true,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_json::from_str(source).context("failed to parse session config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session config: {}", path.display()))?;
        Self::from_json_str(&source)
            .with_context(|| format!("failed to load session config: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let options = &self.resolution;
        if options.max_evaluation_depth == 0 {
            bail!("resolution.maxEvaluationDepth must be at least 1");
        }
        if options.max_subtype_depth == 0 {
            bail!("resolution.maxSubtypeDepth must be at least 1");
        }
        if options.max_iterations == 0 {
            bail!("resolution.maxIterations must be at least 1");
        }
        Ok(())
    }
}

/// A session config plus the modules it checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub modules: Vec<ModuleSource>,
}

impl Workspace {
    pub fn from_json_str(source: &str) -> Result<Self> {
        let workspace: Workspace =
            serde_json::from_str(source).context("failed to parse workspace JSON")?;
        workspace.config.validate()?;
        let mut seen = FxHashSet::default();
        for module in &workspace.modules {
            if !seen.insert(module.name.as_str()) {
                bail!("module '{}' is declared more than once", module.name);
            }
        }
        Ok(workspace)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read workspace: {}", path.display()))?;
        Self::from_json_str(&source)
            .with_context(|| format!("failed to load workspace: {}", path.display()))
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
