// Regression detection over result histories
//
// Two complementary judgements are available to tests:
//
// - Bounded deviation: the latest value of a metric must lie within a
//   tolerance band around a baseline chosen by the test author. Metrics
//   such as KL divergence already aggregate a large chain, so a plain band
//   is robust, auditable and deterministic for a fixed history.
//
// - Trend break: the most recent runs are compared against the older runs
//   with Welch's t-test (aprender), after filtering metrics whose baseline
//   is too noisy to judge (coefficient of variation, trueno).
//
// Scientific Foundation:
// [9] Heger, C., Happe, J., & Farahbod, R. (2013). Automated root cause isolation
//     of performance regressions. ICPE. Fixed % thresholds yield high false positives.

mod config;
mod deviation;
mod noise_filter;
mod statistics;
mod trend;

pub use config::TrendConfig;
pub use deviation::{assess_deviation, not_deviated, not_deviated_per_commit, DeviationVerdict};
pub use noise_filter::MetricDistribution;
pub use statistics::{compare_distributions, median, per_commit, CommitStats, StatisticalTest};
pub use trend::{assess_trend, TrendAssessment, TrendVerdict};

#[cfg(test)]
mod tests;
