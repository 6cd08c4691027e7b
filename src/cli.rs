//! CLI argument parsing for driftcheck

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "driftcheck")]
#[command(version)]
#[command(
    about = "Functional regression testing for stochastic inference libraries",
    long_about = None
)]
pub struct Cli {
    /// Tests to run (or to analyze / plot with --analyze / --plot)
    #[arg(value_name = "TEST")]
    pub tests: Vec<String>,

    /// Run the test that was run least recently
    #[arg(short, long, conflicts_with = "tests")]
    pub next: bool,

    /// List registered tests with the date they were last run
    #[arg(short, long)]
    pub list: bool,

    /// Analyze stored results instead of running (all tests when none are named)
    #[arg(short, long)]
    pub analyze: bool,

    /// Write figures for the selected tests (all tests when none are named or run)
    #[arg(short, long)]
    pub plot: bool,

    /// Write a markdown status report to PATH
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Configuration file (default: ./driftcheck.toml when present)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Record results against this revision instead of querying git
    #[arg(long, value_name = "HASH")]
    pub offline_revision: Option<String>,

    /// Override the results directory
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Override the log directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Override the plot directory
    #[arg(long, value_name = "DIR")]
    pub plot_dir: Option<PathBuf>,

    /// Enable debug tracing output (to stderr)
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Whether any action beyond listing was requested
    pub fn has_action(&self) -> bool {
        !self.tests.is_empty() || self.next || self.analyze || self.plot || self.report.is_some()
    }
}
