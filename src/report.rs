//! Markdown status report across every registered test

use crate::analysis::{assess_trend, TrendAssessment, TrendConfig, TrendVerdict};
use crate::error::{HarnessError, Result};
use crate::naming::TestName;
use crate::registry::TestRegistry;
use crate::result::{run_date_now, Status};
use crate::store::ResultStore;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Analysis state of one test
#[derive(Debug, Clone, PartialEq)]
pub enum TestState {
    NotRun,
    Ok,
    Failed,
    /// Analysis could not reach a verdict (counts as failed)
    AnalysisError(String),
}

impl TestState {
    pub fn is_ok(&self) -> bool {
        matches!(self, TestState::Ok)
    }
}

/// What the report says about one test
#[derive(Debug, Clone)]
pub struct TestSummary {
    pub name: TestName,
    pub runs: usize,
    pub last_run: Option<String>,
    pub last_status: Option<Status>,
    /// Short hash and version of the latest run
    pub last_revision: Option<(String, String)>,
    pub state: TestState,
    pub trends: Vec<TrendAssessment>,
    /// Figures from the most recent plot run
    pub plots: Vec<PathBuf>,
}

/// Analyze every registered test against the store
///
/// Plots are looked up in `plot_dir` when given.
pub fn summarize(
    registry: &TestRegistry,
    store: &ResultStore,
    trend: &TrendConfig,
    plot_dir: Option<&Path>,
) -> Result<Vec<TestSummary>> {
    let mut summaries = Vec::with_capacity(registry.len());

    for test in registry.iter() {
        let history = store.history(test.name())?;
        let latest = history.latest();

        let state = if history.is_empty() {
            TestState::NotRun
        } else {
            match test.analyze(&history) {
                Ok(true) => TestState::Ok,
                Ok(false) => TestState::Failed,
                Err(e) => TestState::AnalysisError(e.to_string()),
            }
        };

        let mut trends = Vec::new();
        for field in test.tracked_fields() {
            trends.push(assess_trend(&history, field, trend)?);
        }

        summaries.push(TestSummary {
            name: test.name().clone(),
            runs: history.len(),
            last_run: latest.map(|r| r.run_date.clone()),
            last_status: latest.map(|r| r.status),
            last_revision: latest.map(|r| (r.short_hash().to_string(), r.version.clone())),
            state,
            trends,
            plots: match plot_dir {
                Some(dir) => latest_plots(dir, test.name())?,
                None => Vec::new(),
            },
        });
    }

    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(summaries)
}

/// Files of the most recent plot run of `name` in `dir`
///
/// Figure files are named `<name>-<run_date>[-<i>].json`.
fn latest_plots(dir: &Path, name: &TestName) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(HarnessError::StoreRead {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let prefix = format!("{}-", name);
    let mut dated: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let file_name = entry.file_name().into_string().ok()?;
            let rest = file_name.strip_prefix(&prefix)?;
            let date = rest.get(..19)?.to_string();
            Some((date, entry.path()))
        })
        .collect();

    let Some(newest) = dated.iter().map(|(d, _)| d.clone()).max() else {
        return Ok(Vec::new());
    };
    dated.retain(|(d, _)| *d == newest);
    let mut paths: Vec<PathBuf> = dated.into_iter().map(|(_, p)| p).collect();
    paths.sort();
    Ok(paths)
}

fn trend_line(assessment: &TrendAssessment) -> String {
    match &assessment.verdict {
        TrendVerdict::NoTrendBreak => "no trend break".to_string(),
        TrendVerdict::TrendBreak {
            baseline_mean,
            recent_mean,
        } => format!(
            "TREND BREAK (baseline mean {:.4}, recent mean {:.4})",
            baseline_mean, recent_mean
        ),
        TrendVerdict::Noisy {
            coefficient_of_variation,
        } => format!("noisy baseline (cv {:.3})", coefficient_of_variation),
        TrendVerdict::InsufficientData { .. } => "insufficient data".to_string(),
    }
}

/// Render summaries as markdown; plot links are made relative to `base` when possible
pub fn render_markdown(title: &str, summaries: &[TestSummary], base: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", title);
    let _ = writeln!(out, "Generated on: {}\n", run_date_now());

    for summary in summaries {
        let _ = writeln!(out, "## {}\n", summary.name);

        match &summary.last_run {
            Some(date) => {
                let _ = writeln!(out, "- Last run on: {}", date);
            }
            None => {
                let _ = writeln!(out, "- Last run on: never");
            }
        }
        if let Some((hash, version)) = &summary.last_revision {
            let _ = writeln!(out, "- Revision: {} ({})", hash, version);
        }
        if let Some(status) = summary.last_status {
            let _ = writeln!(out, "- Last result: {} ({} runs)", status, summary.runs);
        }

        let status = match &summary.state {
            TestState::NotRun => "not run".to_string(),
            TestState::Ok => "ok".to_string(),
            TestState::Failed => "FAILED".to_string(),
            TestState::AnalysisError(e) => format!("FAILED ({})", e),
        };
        let _ = writeln!(out, "- Status: {}", status);

        for trend in &summary.trends {
            let _ = writeln!(out, "- Trend of {}: {}", trend.field, trend_line(trend));
        }

        for plot in &summary.plots {
            let shown = plot.strip_prefix(base).unwrap_or(plot);
            let label = plot
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let _ = write!(out, "\n![{}]({})\n", label, shown.display());
        }
        out.push('\n');
    }
    out
}

/// Write the report to `path`
pub fn write_report(path: &Path, title: &str, summaries: &[TestSummary]) -> Result<()> {
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let markdown = render_markdown(title, summaries, base);
    fs::write(path, markdown).map_err(|source| HarnessError::StoreWrite {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), tests = summaries.len(), "Wrote report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::TestResult;
    use crate::revision::Revision;
    use crate::suite::UniformNoise;

    fn store_y(store: &ResultStore, hash: &str, date: &str, y: f64) {
        let mut r = TestResult::new(TestName::new("uniform_noise").unwrap(), &Revision::new(hash, "lib 1.0"), date, 0);
        r.set("y", y).unwrap();
        r.set_status(Status::Done);
        store.append(&r).unwrap();
    }

    fn registry() -> TestRegistry {
        let mut registry = TestRegistry::new();
        registry.add(Box::new(UniformNoise::builtin().unwrap())).unwrap();
        registry
    }

    #[test]
    fn test_never_run_test_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("results")).unwrap();
        let summaries = summarize(&registry(), &store, &TrendConfig::default(), None).unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].state, TestState::NotRun);
        let markdown = render_markdown("Report", &summaries, dir.path());
        assert!(markdown.contains("## uniform_noise"));
        assert!(markdown.contains("- Last run on: never"));
        assert!(markdown.contains("- Status: not run"));
    }

    #[test]
    fn test_failed_latest_result() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("results")).unwrap();
        store_y(&store, "aaaaaaaaaa", "2024-01-01-00:00:00", 1.1);
        store_y(&store, "bbbbbbbbbb", "2024-01-02-00:00:00", 3.0);

        let summaries = summarize(&registry(), &store, &TrendConfig::default(), None).unwrap();
        let summary = &summaries[0];
        assert_eq!(summary.state, TestState::Failed);
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.last_revision, Some(("bbbbbbb".to_string(), "lib 1.0".to_string())));

        let markdown = render_markdown("Report", &summaries, dir.path());
        assert!(markdown.contains("- Status: FAILED"));
        assert!(markdown.contains("- Trend of y: insufficient data"));
    }

    #[test]
    fn test_latest_plots_only() {
        let dir = tempfile::tempdir().unwrap();
        let plots = dir.path().join("plots");
        fs::create_dir_all(&plots).unwrap();
        for file in [
            "uniform_noise-2024-01-01-00:00:00.json",
            "uniform_noise-2024-02-01-00:00:00.json",
            "uniform_noise-2024-02-01-00:00:00-2.json",
            "uniform_noise_other-2024-03-01-00:00:00.json",
        ] {
            fs::write(plots.join(file), "{}").unwrap();
        }

        let found = latest_plots(&plots, &TestName::new("uniform_noise").unwrap()).unwrap();
        assert_eq!(
            found,
            vec![
                plots.join("uniform_noise-2024-02-01-00:00:00-2.json"),
                plots.join("uniform_noise-2024-02-01-00:00:00.json"),
            ]
        );
    }

    #[test]
    fn test_write_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path().join("results")).unwrap();
        store_y(&store, "aaaaaaaaaa", "2024-01-01-00:00:00", 1.0);

        let summaries = summarize(&registry(), &store, &TrendConfig::default(), None).unwrap();
        let path = dir.path().join("report.md");
        write_report(&path, "Library functional testing report", &summaries).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Library functional testing report"));
        assert!(content.contains("- Status: ok"));
    }
}
