//! Lifecycle contract of a functional test
//!
//! ```text
//! CREATED --run--> RUNNING --+--> DONE     (test sets status)
//!                            +--> FAILED   (test sets status)
//!                            +--> ERRORED  (run returned Err / panicked /
//!                                           never set a terminal status)
//! ```
//!
//! Terminal results are appended once, then `analyze` judges the whole
//! history.

use crate::error::Result;
use crate::naming::TestName;
use crate::plot::Figure;
use crate::result::{ResultHistory, TestResult};
use crate::revision::Revision;
use std::path::{Path, PathBuf};

/// Everything a running test may know about its execution
#[derive(Debug, Clone)]
pub struct RunContext {
    pub revision: Revision,
    pub run_date: String,
    pub seed: u64,
    pub log_path: PathBuf,
    /// Checkout of the library under test, when a git provider is used
    pub library_dir: Option<PathBuf>,
}

impl RunContext {
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// A stochastic experiment tracked across revisions
pub trait TestCase {
    fn name(&self) -> &TestName;

    /// Run the experiment, populating `result`
    ///
    /// Must finish by setting status `done` or `failed`. Diagnostic output
    /// emitted through `tracing` ends up in the per-run log file.
    fn run(&self, result: &mut TestResult, ctx: &RunContext) -> anyhow::Result<()>;

    /// Whether the test currently passes, judged on the whole history
    fn analyze(&self, history: &ResultHistory) -> Result<bool>;

    /// Scalar fields worth a trend assessment in reports
    fn tracked_fields(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Figures describing the history; must not depend on anything else
    fn plot(&self, _history: &ResultHistory) -> Result<Vec<Figure>> {
        Ok(Vec::new())
    }
}
