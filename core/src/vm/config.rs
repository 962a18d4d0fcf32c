use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine tuning knobs. Every field has a default, so a TOML file only needs
/// the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum number of guarded entries in a call site's dispatch chain
    /// before the site goes megamorphic.
    pub inline_cache_size: usize,
    /// Activations nested deeper than this fail with a stack overflow error.
    pub max_call_depth: usize,
    /// Activations taking at least this many back edges are reported on the
    /// `sprig::vm::osr` target.
    pub back_edge_report_threshold: u64,
    /// Quicken sends to fixed-arity eager specializations when possible.
    pub eager_specialization: bool,
    /// Inline literal blocks of control-flow messages at compile time.
    pub inline_blocks: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            inline_cache_size: 6,
            max_call_depth: 10_000,
            back_edge_report_threshold: 10_000,
            eager_specialization: true,
            inline_blocks: true,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid VM configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        Self::from_toml_str(&src)
    }
}
