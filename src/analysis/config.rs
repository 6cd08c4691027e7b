// Configuration for trend-break detection
//
// Thresholds come from the project's own history: a recent window of runs
// is compared against everything before it.

use serde::{Deserialize, Serialize};

/// Configuration for trend-break detection
///
/// # Example
/// ```
/// use driftcheck::analysis::TrendConfig;
///
/// let config = TrendConfig::default();
/// assert_eq!(config.significance_level, 0.05); // 95% confidence
/// assert_eq!(config.recent_window, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Statistical significance level (alpha) for Welch's t-test
    ///
    /// - 0.05 (default): 95% confidence level
    /// - 0.01: stricter, fewer false alarms
    /// - 0.10: looser, catches drifts earlier
    pub significance_level: f64,

    /// Minimum number of baseline runs before a trend can be judged
    ///
    /// Default: 5 runs
    pub min_sample_size: usize,

    /// Number of most recent runs compared against the baseline
    ///
    /// Default: 3, matching the "last three commits" window used by the
    /// per-commit deviation check.
    pub recent_window: usize,

    /// Skip judging metrics whose baseline is too noisy
    pub enable_noise_filtering: bool,

    /// Coefficient of variation (std / |mean|) above which a baseline is noisy
    ///
    /// Default: 0.5
    pub noise_threshold: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            min_sample_size: 5,
            recent_window: 3,
            enable_noise_filtering: true,
            noise_threshold: 0.5,
        }
    }
}

impl TrendConfig {
    /// Create a strict configuration (fewer false alarms, more missed drifts)
    pub fn strict() -> Self {
        Self {
            significance_level: 0.01,
            min_sample_size: 10,
            recent_window: 5,
            enable_noise_filtering: true,
            noise_threshold: 0.3,
        }
    }

    /// Create a permissive configuration (more false alarms, fewer missed drifts)
    pub fn permissive() -> Self {
        Self {
            significance_level: 0.10,
            min_sample_size: 3,
            recent_window: 2,
            enable_noise_filtering: true,
            noise_threshold: 1.0,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.significance_level) {
            return Err(format!(
                "significance_level must be in [0, 1], got {}",
                self.significance_level
            ));
        }

        if self.min_sample_size < 2 {
            return Err(format!(
                "min_sample_size must be >= 2 for t-test, got {}",
                self.min_sample_size
            ));
        }

        if self.recent_window < 2 {
            return Err(format!(
                "recent_window must be >= 2 for t-test, got {}",
                self.recent_window
            ));
        }

        if self.noise_threshold < 0.0 {
            return Err(format!(
                "noise_threshold must be non-negative, got {}",
                self.noise_threshold
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrendConfig::default();
        assert_eq!(config.significance_level, 0.05);
        assert_eq!(config.min_sample_size, 5);
        assert_eq!(config.recent_window, 3);
        assert!(config.enable_noise_filtering);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strict_and_permissive_are_valid() {
        assert!(TrendConfig::strict().validate().is_ok());
        assert!(TrendConfig::permissive().validate().is_ok());
        assert!(TrendConfig::strict().significance_level < TrendConfig::permissive().significance_level);
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_values() {
        let mut config = TrendConfig::default();
        config.significance_level = 1.5;
        assert!(config.validate().is_err());

        let mut config = TrendConfig::default();
        config.min_sample_size = 1;
        assert!(config.validate().is_err());

        let mut config = TrendConfig::default();
        config.recent_window = 1;
        assert!(config.validate().is_err());

        let mut config = TrendConfig::default();
        config.noise_threshold = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TrendConfig = toml::from_str("significance_level = 0.01").unwrap();
        assert_eq!(config.significance_level, 0.01);
        assert_eq!(config.recent_window, 3);
    }
}
