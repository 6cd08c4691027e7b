//! Bounded-deviation checks
//!
//! The baseline (`expected`) and tolerance are chosen by the test author:
//! many metrics have a known theoretical optimum (a KL divergence of zero),
//! so nothing is inferred from the data.

use crate::analysis::statistics::per_commit;
use crate::error::{HarnessError, Result};
use crate::result::{require_field, ResultHistory};

/// Outcome of a bounded-deviation check on the latest result
#[derive(Debug, Clone, PartialEq)]
pub enum DeviationVerdict {
    /// `|value - expected| <= threshold`
    Within { value: f64, deviation: f64 },

    /// `|value - expected| > threshold` (or the value is NaN)
    Deviated { value: f64, deviation: f64 },

    /// Nothing has been stored yet
    InsufficientData,
}

impl DeviationVerdict {
    /// Empty histories pass by default
    pub fn passed(&self) -> bool {
        !matches!(self, DeviationVerdict::Deviated { .. })
    }
}

fn check_tolerance(expected: f64, threshold: f64) -> Result<()> {
    if !expected.is_finite() {
        return Err(HarnessError::Config(format!(
            "expected value must be finite, got {}",
            expected
        )));
    }
    if !(threshold.is_finite() && threshold >= 0.0) {
        return Err(HarnessError::Config(format!(
            "threshold must be finite and non-negative, got {}",
            threshold
        )));
    }
    Ok(())
}

/// Judge the latest value of `field` against `expected ± threshold`
pub fn assess_deviation(
    expected: f64,
    threshold: f64,
    history: &ResultHistory,
    field: &str,
) -> Result<DeviationVerdict> {
    check_tolerance(expected, threshold)?;

    let Some(value) = require_field(history, field)? else {
        return Ok(DeviationVerdict::InsufficientData);
    };
    let value = value.as_f64().ok_or_else(|| HarnessError::FieldType {
        test: history
            .latest()
            .map(|r| r.name.to_string())
            .unwrap_or_default(),
        field: field.to_string(),
    })?;

    let deviation = (value - expected).abs();
    if deviation <= threshold {
        Ok(DeviationVerdict::Within { value, deviation })
    } else {
        Ok(DeviationVerdict::Deviated { value, deviation })
    }
}

/// Whether the latest value of `field` lies within `threshold` of `expected`
///
/// Fails with [`HarnessError::MissingField`] when the latest result lacks the
/// field. An empty history passes.
///
/// # Example
/// ```
/// use driftcheck::analysis::not_deviated;
/// use driftcheck::result::ResultHistory;
///
/// assert!(not_deviated(0.0, 0.1, &ResultHistory::default(), "kld").unwrap());
/// ```
pub fn not_deviated(
    expected: f64,
    threshold: f64,
    history: &ResultHistory,
    field: &str,
) -> Result<bool> {
    let verdict = assess_deviation(expected, threshold, history, field)?;
    match &verdict {
        DeviationVerdict::InsufficientData => {
            tracing::warn!(field, "No results yet, passing by default");
        }
        DeviationVerdict::Within { value, deviation } | DeviationVerdict::Deviated { value, deviation } => {
            tracing::debug!(field, value, deviation, threshold, passed = verdict.passed(), "Deviation check");
        }
    }
    Ok(verdict.passed())
}

/// Whether the per-commit means of the last `commits` revisions all lie
/// within `3 * sigma` of `expected`
///
/// Repeated runs of one revision are averaged first, so a single unlucky
/// run is diluted by its siblings.
pub fn not_deviated_per_commit(
    expected: f64,
    sigma: f64,
    history: &ResultHistory,
    field: &str,
    commits: usize,
) -> Result<bool> {
    check_tolerance(expected, sigma)?;
    if require_field(history, field)?.is_none() {
        tracing::warn!(field, "No results yet, passing by default");
        return Ok(true);
    }

    let stats = per_commit(history, field).map_err(|e| HarnessError::Statistics(e.to_string()))?;
    let start = stats.len().saturating_sub(commits.max(1));
    let tolerance = 3.0 * sigma;

    let passed = stats[start..]
        .iter()
        .all(|s| (s.mean - expected).abs() <= tolerance);
    tracing::debug!(field, commits = stats.len() - start, passed, "Per-commit deviation check");
    Ok(passed)
}
