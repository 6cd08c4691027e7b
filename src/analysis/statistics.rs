// Statistical functions for regression detection using aprender
//
// - Welch's t-test (aprender) compares a baseline window of runs against a
//   recent window without assuming equal variances
// - trueno::Vector provides SIMD mean / variance / standard deviation
// - aprender::stats::DescriptiveStats provides the median

use crate::result::ResultHistory;
use anyhow::{Context, Result};
use aprender::stats::DescriptiveStats;
use trueno::Vector;

/// Result of statistical comparison between baseline and recent runs
#[derive(Debug, Clone)]
pub struct StatisticalTest {
    /// t-statistic value
    pub statistic: f32,

    /// p-value (two-tailed) - probability that the difference is due to chance
    pub pvalue: f32,

    /// Degrees of freedom
    pub df: f32,

    pub baseline_median: f32,
    pub current_median: f32,
    pub baseline_variance: f32,
    pub current_variance: f32,
}

/// Compare two distributions using Welch's independent t-test
///
/// # Example
/// ```ignore
/// use driftcheck::analysis::compare_distributions;
///
/// let baseline = vec![0.10, 0.12, 0.11, 0.13, 0.10];
/// let current = vec![0.25, 0.27, 0.26, 0.28, 0.25];
///
/// let result = compare_distributions(&baseline, &current).unwrap();
/// assert!(result.pvalue < 0.05);
/// ```
pub fn compare_distributions(baseline: &[f32], current: &[f32]) -> Result<StatisticalTest> {
    if baseline.is_empty() || current.is_empty() {
        anyhow::bail!("Cannot compare empty distributions");
    }

    if baseline.len() < 2 || current.len() < 2 {
        anyhow::bail!("Need at least 2 samples per distribution for t-test");
    }

    let ttest_result = aprender::stats::hypothesis::ttest_ind(baseline, current, false)
        .context("Failed to compute t-test")?;

    let baseline_vec = Vector::from_slice(baseline);
    let current_vec = Vector::from_slice(current);

    let baseline_median = median(&baseline_vec)?;
    let current_median = median(&current_vec)?;

    let baseline_variance = baseline_vec
        .variance()
        .context("Failed to compute baseline variance")?;
    let current_variance = current_vec
        .variance()
        .context("Failed to compute current variance")?;

    Ok(StatisticalTest {
        statistic: ttest_result.statistic,
        pvalue: ttest_result.pvalue,
        df: ttest_result.df,
        baseline_median,
        current_median,
        baseline_variance,
        current_variance,
    })
}

/// Calculate median using aprender's DescriptiveStats (R-7 quantile)
pub fn median(vector: &Vector<f32>) -> Result<f32> {
    let stats = DescriptiveStats::new(vector);
    stats
        .quantile(0.5)
        .map_err(|e| anyhow::anyhow!("Failed to compute median: {}", e))
}

/// Mean and population standard deviation of a metric for one revision
#[derive(Debug, Clone, PartialEq)]
pub struct CommitStats {
    pub revision_hash: String,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

/// Group the values of `field` per revision, in order of first appearance
///
/// Repeated runs of the same revision are averaged so that plots and the
/// per-commit deviation check see one point per commit.
pub fn per_commit(history: &ResultHistory, field: &str) -> Result<Vec<CommitStats>> {
    let mut groups: Vec<(String, Vec<f32>)> = Vec::new();
    for (hash, value) in history.commit_values(field) {
        match groups.iter_mut().find(|(h, _)| h == hash) {
            Some((_, values)) => values.push(value as f32),
            None => groups.push((hash.to_string(), vec![value as f32])),
        }
    }

    let mut stats = Vec::with_capacity(groups.len());
    for (revision_hash, values) in groups {
        let vec = Vector::from_slice(&values);
        let mean = vec
            .mean()
            .with_context(|| format!("Failed to compute mean of {} for {}", field, revision_hash))?;
        let std = if values.len() > 1 {
            vec.stddev()
                .with_context(|| format!("Failed to compute std of {} for {}", field, revision_hash))?
        } else {
            0.0
        };
        stats.push(CommitStats {
            revision_hash,
            mean: mean as f64,
            std: std as f64,
            count: values.len(),
        });
    }
    Ok(stats)
}
