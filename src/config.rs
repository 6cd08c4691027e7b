//! Harness configuration (`driftcheck.toml`)
//!
//! # Example driftcheck.toml
//!
//! ```toml
//! results_dir = "results"
//! log_dir = "logs"
//! plot_dir = "plots"
//!
//! [library]
//! path = "../pints"
//! name = "Pints"
//! branch = "master"
//!
//! [trend]
//! significance_level = 0.01
//!
//! [[command_test]]
//! name = "mcmc_normal_AdaptiveCovarianceMCMC_4"
//! command = ["python", "functional/mcmc_normal.py", "AdaptiveCovarianceMCMC", "4"]
//! field = "distance"
//! expected = 1.0
//! threshold = 1.0
//! ```
//!
//! Relative directories are resolved against the directory of the file.

use crate::analysis::TrendConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "driftcheck.toml";

/// Root configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub results_dir: PathBuf,
    pub log_dir: PathBuf,
    pub plot_dir: PathBuf,
    /// Git checkout of the library under test; absent means offline runs only
    pub library: Option<LibraryConfig>,
    pub trend: TrendConfig,
    pub command_test: Vec<CommandTestConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            log_dir: PathBuf::from("logs"),
            plot_dir: PathBuf::from("plots"),
            library: None,
            trend: TrendConfig::default(),
            command_test: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LibraryConfig {
    pub path: PathBuf,
    #[serde(default = "default_library_name")]
    pub name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Check out `branch` and pull before resolving the revision
    #[serde(default = "default_true")]
    pub pull: bool,
}

fn default_library_name() -> String {
    "library".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

/// An external command test
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommandTestConfig {
    pub name: String,
    /// Program and arguments, run in the library checkout
    pub command: Vec<String>,
    /// Field judged by the deviation check
    pub field: String,
    #[serde(default)]
    pub expected: f64,
    pub threshold: f64,
    /// Judge per-commit means of the last N revisions against 3 * threshold
    #[serde(default)]
    pub per_commit: Option<usize>,
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config
            .trend
            .validate()
            .map_err(|e| anyhow::anyhow!("[trend]: {}", e))?;
        Ok(config)
    }

    /// `path` if given, else `driftcheck.toml` when present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }

    fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.results_dir);
        resolve(&mut self.log_dir);
        resolve(&mut self.plot_dir);
        if let Some(library) = &mut self.library {
            resolve(&mut library.path);
        }
    }
}
