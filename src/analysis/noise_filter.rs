// Noise filtering for metric baselines
//
// Some metrics are inherently noisy across runs (short chains, heavy-tailed
// targets). Judging a trend on such a baseline produces false alarms, so a
// baseline whose coefficient of variation exceeds the configured threshold
// is reported as noisy instead of tested.

use trueno::Vector;

/// Baseline measurements of one metric
#[derive(Debug, Clone)]
pub struct MetricDistribution {
    pub field: String,
    pub measurements: Vec<f32>,
}

impl MetricDistribution {
    pub fn new(field: impl Into<String>, measurements: Vec<f32>) -> Self {
        Self {
            field: field.into(),
            measurements,
        }
    }

    /// Coefficient of variation (CV = std_dev / |mean|)
    ///
    /// - CV near 0: very stable
    /// - CV near 1: std equals mean
    /// - Metrics centred on zero (e.g. a KL divergence at its minimum) report 0
    pub fn coefficient_of_variation(&self) -> f32 {
        if self.measurements.is_empty() {
            return 0.0;
        }

        let vec = Vector::from_slice(&self.measurements);

        let Ok(mean) = vec.mean() else {
            return 0.0;
        };
        let Ok(std) = vec.stddev() else {
            return 0.0;
        };

        if mean.abs() < 1e-6 {
            return 0.0;
        }

        std / mean.abs()
    }

    pub fn is_noisy(&self, threshold: f64) -> bool {
        self.coefficient_of_variation() as f64 > threshold
    }
}
