//! Configuration schema for autobuild
//!
//! Configuration is stored at `~/.config/autobuild/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Build directory and cache settings
    pub build: BuildConfig,

    /// Toolchain programs
    pub toolchain: ToolchainConfig,

    /// Additional runtimes, keyed by runtime id
    pub runtimes: BTreeMap<String, RuntimeSpec>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Root of out-of-tree build directories (defaults to the user cache dir)
    pub root_build_dir: Option<PathBuf>,

    /// Lifetime of cached build metadata in seconds
    pub makecache_ttl_secs: u64,

    /// Parallel make jobs (0 = number of CPUs)
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root_build_dir: None,
            makecache_ttl_secs: 300,
            jobs: 0,
        }
    }
}

impl BuildConfig {
    /// Effective number of make jobs
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Toolchain programs used by the autotools pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Make program
    pub make: String,

    /// Bootstrap script looked up in the project root
    pub autogen: String,

    /// Fallback bootstrap command when the script is absent
    pub autoreconf: Vec<String>,

    /// Arguments appended to every configure invocation
    pub configure_args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            make: "make".to_string(),
            autogen: "autogen.sh".to_string(),
            autoreconf: vec!["autoreconf".to_string(), "-fiv".to_string()],
            configure_args: vec![],
        }
    }
}

/// Kinds of configurable runtimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Podman,
}

/// A runtime declared in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Runtime implementation
    pub kind: RuntimeKind,

    /// Container image
    pub image: String,
}
