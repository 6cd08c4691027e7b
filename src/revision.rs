//! Revision of the library under test
//!
//! A [`Revision`] is resolved at most once per harness invocation through a
//! [`RevisionProvider`] and then frozen in a [`RevisionCell`], so every test
//! of a batch sees the same commit.

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Commit hash plus human-readable version of the library under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub hash: String,
    pub version: String,
}

impl Revision {
    pub fn new(hash: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            version: version.into(),
        }
    }
}

/// Source of the current revision (the git layer)
pub trait RevisionProvider {
    /// Bring the local checkout up to date
    fn refresh(&mut self) -> Result<()>;

    fn current_hash(&self) -> Result<String>;

    /// Library version; `formatted` prefixes the library name
    fn current_version(&self, formatted: bool) -> Result<String>;

    /// Directory the library under test is checked out in, if any
    fn checkout_dir(&self) -> Option<&Path> {
        None
    }
}

/// Init-once holder for the revision of this invocation
#[derive(Debug, Default)]
pub struct RevisionCell {
    cell: OnceLock<Revision>,
}

impl RevisionCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cell that is already resolved
    pub fn frozen(revision: Revision) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(revision);
        Self { cell }
    }

    pub fn get(&self) -> Option<&Revision> {
        self.cell.get()
    }

    /// Return the frozen revision, resolving it through `provider` on first use
    ///
    /// A failed resolution leaves the cell empty so a later call may retry.
    pub fn get_or_resolve(&self, provider: &mut dyn RevisionProvider) -> Result<&Revision> {
        if let Some(revision) = self.cell.get() {
            return Ok(revision);
        }

        provider.refresh()?;
        let hash = provider.current_hash()?;
        let version = provider.current_version(true)?;
        tracing::info!(%hash, %version, "Resolved revision");

        let _ = self.cell.set(Revision { hash, version });
        self.cell
            .get()
            .ok_or_else(|| HarnessError::Sync("revision cell left empty".to_string()))
    }
}

/// Revision known up front (offline runs, tests)
#[derive(Debug, Clone)]
pub struct FixedRevision {
    revision: Revision,
    library_name: String,
}

impl FixedRevision {
    pub fn new(hash: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            revision: Revision::new(hash, version),
            library_name: "library".to_string(),
        }
    }

    pub fn with_library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = name.into();
        self
    }
}

impl RevisionProvider for FixedRevision {
    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    fn current_hash(&self) -> Result<String> {
        Ok(self.revision.hash.clone())
    }

    fn current_version(&self, formatted: bool) -> Result<String> {
        if formatted {
            Ok(format!("{} {}", self.library_name, self.revision.version))
        } else {
            Ok(self.revision.version.clone())
        }
    }
}

/// Revision provider backed by a local git checkout of the library
#[derive(Debug, Clone)]
pub struct GitRevisionProvider {
    repo: PathBuf,
    branch: String,
    library_name: String,
    pull: bool,
}

impl GitRevisionProvider {
    pub fn new(repo: impl Into<PathBuf>, branch: impl Into<String>, library_name: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            library_name: library_name.into(),
            pull: true,
        }
    }

    /// Skip `git pull` on refresh (use whatever is checked out)
    pub fn without_pull(mut self) -> Self {
        self.pull = false;
        self
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        tracing::debug!(repo = %self.repo.display(), ?args, "Running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|e| HarnessError::Sync(format!("failed to run git {}: {}", args.join(" "), e)))?;

        if !output.status.success() {
            return Err(HarnessError::Sync(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl RevisionProvider for GitRevisionProvider {
    fn refresh(&mut self) -> Result<()> {
        if !self.pull {
            return Ok(());
        }
        tracing::info!(branch = %self.branch, "Checking out branch");
        self.git(&["checkout", &self.branch])?;
        tracing::info!("Performing git pull");
        let out = self.git(&["pull", "--ff-only"])?;
        tracing::info!("{}", out);
        Ok(())
    }

    fn current_hash(&self) -> Result<String> {
        self.git(&["rev-parse", "HEAD"])
    }

    fn current_version(&self, formatted: bool) -> Result<String> {
        let describe = self.git(&["describe", "--tags", "--always"])?;
        if formatted {
            Ok(format!("{} {}", self.library_name, describe))
        } else {
            Ok(describe)
        }
    }

    fn checkout_dir(&self) -> Option<&Path> {
        Some(&self.repo)
    }
}
