//! Figures describing result histories
//!
//! Rendering is left to an external backend. The harness builds
//! backend-independent [`Figure`] values from a history and hands them to a
//! [`PlotReporter`]; the bundled [`JsonPlotReporter`] stores them as JSON
//! documents next to the results.

use crate::analysis::per_commit;
use crate::error::{HarnessError, Result};
use crate::naming::PlotName;
use crate::result::{run_date_now, ResultHistory};
use crate::store::unique_path;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// How a series is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    /// Markers joined by lines, with symmetric error bars
    ErrorBar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub kind: SeriesKind,
    pub points: Vec<Point>,
}

/// A renderable chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Categorical tick labels for x = 0, 1, 2, ... (commit hashes)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x_ticks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_limits: Option<(f64, f64)>,
    /// Horizontal reference lines (e.g. a failure threshold)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_lines: Vec<f64>,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<String>, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            x_ticks: Vec::new(),
            y_limits: None,
            reference_lines: Vec::new(),
            series: Vec::new(),
        }
    }
}

/// Per-commit mean and standard deviation of `field`
///
/// `threshold`, when given, is drawn as a reference line.
pub fn variable(
    history: &ResultHistory,
    field: &str,
    title: &str,
    y_label: &str,
    threshold: Option<f64>,
) -> Result<Figure> {
    let stats = per_commit(history, field).map_err(|e| HarnessError::Statistics(e.to_string()))?;

    let mut figure = Figure::new(title, "Commit", format!("{} (mean & std)", y_label));
    figure.x_ticks = stats
        .iter()
        .map(|s| s.revision_hash.chars().take(7).collect())
        .collect();
    figure.reference_lines = threshold.into_iter().collect();
    figure.series.push(Series {
        label: field.to_string(),
        kind: SeriesKind::ErrorBar,
        points: stats
            .iter()
            .enumerate()
            .map(|(i, s)| Point {
                x: i as f64,
                y: s.mean,
                err: Some(s.std),
            })
            .collect(),
    });
    Ok(figure)
}

/// Convergence curves: one line per run from the array fields `x_field` / `y_field`
///
/// Only the `last` most recent runs that carry both arrays are drawn.
#[allow(clippy::too_many_arguments)]
pub fn convergence(
    history: &ResultHistory,
    x_field: &str,
    y_field: &str,
    title: &str,
    x_label: &str,
    y_label: &str,
    y_limits: Option<(f64, f64)>,
    last: usize,
) -> Figure {
    let mut figure = Figure::new(title, x_label, y_label);
    figure.y_limits = y_limits;

    let runs: Vec<_> = history
        .iter()
        .filter_map(|r| {
            let xs = r.get(x_field)?.as_f64_array()?;
            let ys = r.get(y_field)?.as_f64_array()?;
            Some((r, xs, ys))
        })
        .collect();

    let skip = runs.len().saturating_sub(last);
    for (record, xs, ys) in runs.into_iter().skip(skip) {
        figure.series.push(Series {
            label: format!("{} {}", record.short_hash(), record.run_date),
            kind: SeriesKind::Line,
            points: xs
                .into_iter()
                .zip(ys)
                .map(|(x, y)| Point { x, y, err: None })
                .collect(),
        });
    }
    figure
}

/// Destination for rendered figures
pub trait PlotReporter {
    /// Store `figures` under `plot_name`, returning the written paths
    fn write(&mut self, plot_name: &PlotName, figures: &[Figure]) -> Result<Vec<PathBuf>>;
}

/// Writes each figure as `<dir>/<plot>-<run_date>.json` (suffixed when taken)
#[derive(Debug, Clone)]
pub struct JsonPlotReporter {
    dir: PathBuf,
}

impl JsonPlotReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PlotReporter for JsonPlotReporter {
    fn write(&mut self, plot_name: &PlotName, figures: &[Figure]) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| HarnessError::Plot(format!("{}: {}", self.dir.display(), e)))?;

        let date = run_date_now();
        let mut paths = Vec::with_capacity(figures.len());
        for figure in figures {
            let path = unique_path(&self.dir.join(format!("{}-{}.json", plot_name, date)));
            let json = serde_json::to_vec_pretty(figure).map_err(|e| HarnessError::Plot(e.to_string()))?;
            fs::write(&path, json).map_err(|e| HarnessError::Plot(format!("{}: {}", path.display(), e)))?;
            tracing::info!(path = %path.display(), "Wrote figure");
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::TestName;
    use crate::result::{Status, TestResult};
    use crate::revision::Revision;

    fn history() -> ResultHistory {
        let runs = [("aaaaaaaaa", 0.1, vec![1.0, 2.0], vec![0.5, 0.2]), ("bbbbbbbbb", 0.3, vec![1.0, 2.0], vec![0.6, 0.3])];
        let records = runs
            .iter()
            .enumerate()
            .map(|(i, (hash, kld, iters, klds))| {
                let mut r = TestResult::new(
                    TestName::new("t1").unwrap(),
                    &Revision::new(*hash, "v"),
                    format!("2024-03-0{}-00:00:00", i + 1),
                    0,
                );
                r.sequence = i as u64 + 1;
                r.set("kld", *kld).unwrap();
                r.set("iters", iters.clone()).unwrap();
                r.set("klds", klds.clone()).unwrap();
                r.set_status(Status::Done);
                r
            })
            .collect();
        ResultHistory::new(records)
    }

    #[test]
    fn test_variable_figure_one_point_per_commit() {
        let figure = variable(&history(), "kld", "Normal", "KL divergence", Some(0.3)).unwrap();
        assert_eq!(figure.x_ticks, vec!["aaaaaaa", "bbbbbbb"]);
        assert_eq!(figure.reference_lines, vec![0.3]);
        assert_eq!(figure.series.len(), 1);
        assert_eq!(figure.series[0].points.len(), 2);
        assert!((figure.series[0].points[1].y - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_convergence_keeps_last_runs() {
        let figure = convergence(&history(), "iters", "klds", "Normal", "Iteration", "KL", Some((0.0, 10.0)), 1);
        assert_eq!(figure.series.len(), 1);
        assert!(figure.series[0].label.starts_with("bbbbbbb"));
        assert_eq!(figure.series[0].points[0], Point { x: 1.0, y: 0.6, err: None });
    }

    #[test]
    fn test_json_reporter_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = JsonPlotReporter::new(dir.path().join("plots"));
        let figures = vec![Figure::new("a", "x", "y"), Figure::new("b", "x", "y")];
        let paths = reporter
            .write(&PlotName::new("t1").unwrap(), &figures)
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);

        let back: Figure = serde_json::from_str(&fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert_eq!(back.title, "b");
    }
}
