// Trend-break assessment over a result history
//
// Splits the per-run values of one metric into a baseline (older runs) and
// a recent window, filters noisy baselines, then applies Welch's t-test.

use crate::analysis::config::TrendConfig;
use crate::analysis::noise_filter::MetricDistribution;
use crate::analysis::statistics::{compare_distributions, StatisticalTest};
use crate::error::{HarnessError, Result};
use crate::result::ResultHistory;
use trueno::Vector;

/// Final trend verdict for one metric
#[derive(Debug, Clone, PartialEq)]
pub enum TrendVerdict {
    /// Recent runs are consistent with the baseline
    NoTrendBreak,

    /// Recent runs differ significantly from the baseline
    TrendBreak { baseline_mean: f64, recent_mean: f64 },

    /// Baseline too variable to judge
    Noisy { coefficient_of_variation: f64 },

    /// Not enough runs to make a statistical determination
    InsufficientData { reason: String },
}

/// Detailed trend assessment
#[derive(Debug, Clone)]
pub struct TrendAssessment {
    pub field: String,
    pub verdict: TrendVerdict,
    pub baseline_runs: usize,
    pub recent_runs: usize,
    /// Absent when both windows are constant or the test could not run
    pub test: Option<StatisticalTest>,
    pub config: TrendConfig,
}

impl TrendAssessment {
    /// Only a detected trend break fails
    pub fn passed(&self) -> bool {
        !matches!(self.verdict, TrendVerdict::TrendBreak { .. })
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        match &self.verdict {
            TrendVerdict::NoTrendBreak => {
                report.push_str(&format!("✅ NO TREND BREAK ({})\n\n", self.field));
                report.push_str(&format!(
                    "Significance level: {} ({}% confidence)\n",
                    self.config.significance_level,
                    (1.0 - self.config.significance_level) * 100.0
                ));
            }
            TrendVerdict::TrendBreak {
                baseline_mean,
                recent_mean,
            } => {
                report.push_str(&format!("❌ TREND BREAK DETECTED ({})\n\n", self.field));
                report.push_str(&format!(
                    "Baseline mean: {:.4}, recent mean: {:.4}\n",
                    baseline_mean, recent_mean
                ));
            }
            TrendVerdict::Noisy {
                coefficient_of_variation,
            } => {
                report.push_str(&format!("🔇 NOISY BASELINE ({})\n\n", self.field));
                report.push_str(&format!(
                    "Coefficient of variation {:.3} exceeds {}\n",
                    coefficient_of_variation, self.config.noise_threshold
                ));
            }
            TrendVerdict::InsufficientData { reason } => {
                report.push_str(&format!("⚠️  INSUFFICIENT DATA ({})\n\n", self.field));
                report.push_str(&format!("Reason: {}\n", reason));
            }
        }

        report.push_str(&format!(
            "Runs: {} baseline, {} recent\n",
            self.baseline_runs, self.recent_runs
        ));

        if let Some(test) = &self.test {
            report.push_str("\n📊 Statistical Test:\n");
            report.push_str(&format!(
                "  t={:.3} (p={:.4}, df={:.1}, baseline_median={:.4}, recent_median={:.4})\n",
                test.statistic, test.pvalue, test.df, test.baseline_median, test.current_median
            ));
        }

        report
    }
}

fn mean_of(values: &[f32]) -> f64 {
    Vector::from_slice(values).mean().unwrap_or(0.0) as f64
}

fn variance_of(values: &[f32]) -> f32 {
    Vector::from_slice(values).variance().unwrap_or(0.0)
}

/// Assess whether the most recent runs of `field` break from the older runs
///
/// # Example
/// ```
/// use driftcheck::analysis::{assess_trend, TrendConfig, TrendVerdict};
/// use driftcheck::result::ResultHistory;
///
/// let assessment = assess_trend(&ResultHistory::default(), "kld", &TrendConfig::default()).unwrap();
/// assert!(matches!(assessment.verdict, TrendVerdict::InsufficientData { .. }));
/// ```
pub fn assess_trend(
    history: &ResultHistory,
    field: &str,
    config: &TrendConfig,
) -> Result<TrendAssessment> {
    config.validate().map_err(HarnessError::Config)?;

    let values: Vec<f32> = history.values(field).into_iter().map(|v| v as f32).collect();
    let window = config.recent_window;

    let mut assessment = TrendAssessment {
        field: field.to_string(),
        verdict: TrendVerdict::NoTrendBreak,
        baseline_runs: 0,
        recent_runs: 0,
        test: None,
        config: config.clone(),
    };

    if values.len() < window + config.min_sample_size {
        assessment.verdict = TrendVerdict::InsufficientData {
            reason: format!(
                "{} runs with {:?}, need {} baseline + {} recent",
                values.len(),
                field,
                config.min_sample_size,
                window
            ),
        };
        return Ok(assessment);
    }

    let (baseline, recent) = values.split_at(values.len() - window);
    assessment.baseline_runs = baseline.len();
    assessment.recent_runs = recent.len();

    if values.iter().any(|v| !v.is_finite()) {
        assessment.verdict = TrendVerdict::InsufficientData {
            reason: format!("non-finite values of {:?} in history", field),
        };
        return Ok(assessment);
    }

    if config.enable_noise_filtering {
        let dist = MetricDistribution::new(field, baseline.to_vec());
        if dist.is_noisy(config.noise_threshold) {
            assessment.verdict = TrendVerdict::Noisy {
                coefficient_of_variation: dist.coefficient_of_variation() as f64,
            };
            return Ok(assessment);
        }
    }

    let baseline_mean = mean_of(baseline);
    let recent_mean = mean_of(recent);

    // Constant windows have no variance to test against
    if variance_of(baseline) == 0.0 && variance_of(recent) == 0.0 {
        if (baseline_mean - recent_mean).abs() > f64::EPSILON {
            assessment.verdict = TrendVerdict::TrendBreak {
                baseline_mean,
                recent_mean,
            };
        }
        return Ok(assessment);
    }

    match compare_distributions(baseline, recent) {
        Ok(test) => {
            if test.pvalue < config.significance_level as f32 {
                assessment.verdict = TrendVerdict::TrendBreak {
                    baseline_mean,
                    recent_mean,
                };
            }
            assessment.test = Some(test);
        }
        Err(e) => {
            tracing::warn!("Failed to compare distributions for {}: {}", field, e);
            assessment.verdict = TrendVerdict::InsufficientData {
                reason: e.to_string(),
            };
        }
    }

    Ok(assessment)
}
