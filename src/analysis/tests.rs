// Scenario tests for regression detection
//
// Histories are built the way the runner stores them: one terminal record
// per run, revision hashes repeating when a revision was run more than once.

use super::*;
use crate::error::HarnessError;
use crate::naming::TestName;
use crate::result::{ResultHistory, Status, TestResult};
use crate::revision::Revision;

fn history_of(field: &str, runs: &[(&str, f64)]) -> ResultHistory {
    let records = runs
        .iter()
        .enumerate()
        .map(|(i, (hash, value))| {
            let mut r = TestResult::new(
                TestName::new("mcmc_normal").unwrap(),
                &Revision::new(*hash, "lib"),
                format!("2024-02-{:02}-12:00:00", i + 1),
                0,
            );
            r.sequence = i as u64 + 1;
            r.set(field, *value).unwrap();
            r.set_status(Status::Done);
            r
        })
        .collect();
    ResultHistory::new(records)
}

fn history_with_latest_kld(kld: f64) -> ResultHistory {
    history_of("kld", &[("aaa", 0.01), ("bbb", kld)])
}

#[test]
fn test_latest_within_tolerance_passes() {
    assert!(not_deviated(0.0, 0.1, &history_with_latest_kld(0.05), "kld").unwrap());
}

#[test]
fn test_latest_outside_tolerance_fails() {
    assert!(!not_deviated(0.0, 0.1, &history_with_latest_kld(0.2), "kld").unwrap());
}

#[test]
fn test_only_latest_value_counts() {
    // An old excursion does not fail the check once the metric recovered
    let history = history_of("kld", &[("aaa", 5.0), ("bbb", 0.02)]);
    assert!(not_deviated(0.0, 0.1, &history, "kld").unwrap());
}

#[test]
fn test_boundary_is_inclusive() {
    assert!(not_deviated(1.0, 0.5, &history_of("distance", &[("a", 1.5)]), "distance").unwrap());
    assert!(not_deviated(1.0, 0.5, &history_of("distance", &[("a", 0.5)]), "distance").unwrap());
}

#[test]
fn test_missing_field_is_an_error() {
    let history = history_of("ess", &[("aaa", 120.0)]);
    match not_deviated(0.0, 0.1, &history, "kld") {
        Err(HarnessError::MissingField { test, field }) => {
            assert_eq!(test, "mcmc_normal");
            assert_eq!(field, "kld");
        }
        other => panic!("Expected MissingField, got {:?}", other),
    }
}

#[test]
fn test_nan_value_is_deviated() {
    let history = history_of("kld", &[("aaa", f64::NAN)]);
    assert!(!not_deviated(0.0, 0.1, &history, "kld").unwrap());
}

#[test]
fn test_empty_history_passes_by_default() {
    let verdict = assess_deviation(0.0, 0.1, &ResultHistory::default(), "kld").unwrap();
    assert_eq!(verdict, DeviationVerdict::InsufficientData);
    assert!(verdict.passed());
}

#[test]
fn test_negative_threshold_rejected() {
    assert!(matches!(
        not_deviated(0.0, -0.1, &history_with_latest_kld(0.0), "kld"),
        Err(HarnessError::Config(_))
    ));
}

#[test]
fn test_deviation_is_deterministic() {
    let history = history_with_latest_kld(0.07);
    let first = assess_deviation(0.0, 0.1, &history, "kld").unwrap();
    let second = assess_deviation(0.0, 0.1, &history, "kld").unwrap();
    assert_eq!(first, second);
}

/// Per-commit check: repeated runs of one revision are averaged
///
/// Scenario: the latest revision has one unlucky run (3.5) and one good run
/// (1.1); their mean stays within 3 sigma of the expected distance.
#[test]
fn test_per_commit_averages_repeated_runs() {
    let history = history_of(
        "distance",
        &[
            ("c1", 1.0),
            ("c2", 1.2),
            ("c3", 0.9),
            ("c3", 1.1),
            ("c4", 3.5),
            ("c4", 1.1),
        ],
    );
    assert!(not_deviated_per_commit(1.0, 0.5, &history, "distance", 3).unwrap());
}

#[test]
fn test_per_commit_detects_drift_in_window() {
    let history = history_of("distance", &[("c1", 1.0), ("c2", 1.0), ("c3", 4.0)]);
    assert!(!not_deviated_per_commit(1.0, 0.5, &history, "distance", 3).unwrap());
}

#[test]
fn test_per_commit_ignores_commits_outside_window() {
    let history = history_of(
        "distance",
        &[("c1", 9.0), ("c2", 1.0), ("c3", 1.0), ("c4", 1.0)],
    );
    assert!(not_deviated_per_commit(1.0, 0.5, &history, "distance", 3).unwrap());
    assert!(!not_deviated_per_commit(1.0, 0.5, &history, "distance", 4).unwrap());
}

/// Trend break: a sampler change doubles the KL divergence
#[test]
fn test_trend_break_detected() {
    let history = history_of(
        "kld",
        &[
            ("c1", 0.10),
            ("c2", 0.12),
            ("c3", 0.11),
            ("c4", 0.13),
            ("c5", 0.10),
            ("c6", 0.25),
            ("c7", 0.27),
            ("c8", 0.26),
        ],
    );
    let assessment = assess_trend(&history, "kld", &TrendConfig::default()).unwrap();
    match assessment.verdict {
        TrendVerdict::TrendBreak {
            baseline_mean,
            recent_mean,
        } => assert!(recent_mean > baseline_mean),
        ref other => panic!("Expected TrendBreak, got {:?}", other),
    }
    assert!(!assessment.passed());
    assert_eq!(assessment.baseline_runs, 5);
    assert_eq!(assessment.recent_runs, 3);
}

/// Natural run-to-run variance does not trigger a trend break
#[test]
fn test_no_false_positive_natural_variance() {
    let history = history_of(
        "ess",
        &[
            ("c1", 100.0),
            ("c2", 105.0),
            ("c3", 98.0),
            ("c4", 102.0),
            ("c5", 101.0),
            ("c6", 102.0),
            ("c7", 99.0),
            ("c8", 103.0),
        ],
    );
    let assessment = assess_trend(&history, "ess", &TrendConfig::default()).unwrap();
    assert_eq!(assessment.verdict, TrendVerdict::NoTrendBreak);
    assert!(assessment.passed());
}

#[test]
fn test_noisy_baseline_is_not_judged() {
    let history = history_of(
        "distance",
        &[
            ("c1", 5.0),
            ("c2", 50.0),
            ("c3", 3.0),
            ("c4", 45.0),
            ("c5", 2.0),
            ("c6", 100.0),
            ("c7", 100.0),
            ("c8", 100.0),
        ],
    );
    let assessment = assess_trend(&history, "distance", &TrendConfig::default()).unwrap();
    assert!(matches!(assessment.verdict, TrendVerdict::Noisy { .. }));
    assert!(assessment.passed());
}

#[test]
fn test_constant_windows() {
    let same = history_of("kld", &[("c", 0.0); 8]);
    let assessment = assess_trend(&same, "kld", &TrendConfig::default()).unwrap();
    assert_eq!(assessment.verdict, TrendVerdict::NoTrendBreak);

    let mut runs = vec![("c", 1.0); 5];
    runs.extend([("d", 2.0); 3]);
    let shifted = history_of("kld", &runs);
    let assessment = assess_trend(&shifted, "kld", &TrendConfig::default()).unwrap();
    assert!(matches!(assessment.verdict, TrendVerdict::TrendBreak { .. }));
}

#[test]
fn test_trend_insufficient_data() {
    let history = history_of("kld", &[("c1", 0.1), ("c2", 0.1), ("c3", 0.2)]);
    let assessment = assess_trend(&history, "kld", &TrendConfig::default()).unwrap();
    assert!(matches!(
        assessment.verdict,
        TrendVerdict::InsufficientData { .. }
    ));
    assert!(assessment.passed());
}

#[test]
fn test_trend_rejects_invalid_config() {
    let config = TrendConfig {
        recent_window: 1,
        ..TrendConfig::default()
    };
    assert!(matches!(
        assess_trend(&ResultHistory::default(), "kld", &config),
        Err(HarnessError::Config(_))
    ));
}

#[test]
fn test_trend_report_generation() {
    let history = history_of(
        "kld",
        &[
            ("c1", 0.10),
            ("c2", 0.12),
            ("c3", 0.11),
            ("c4", 0.13),
            ("c5", 0.10),
            ("c6", 0.50),
            ("c7", 0.52),
            ("c8", 0.51),
        ],
    );
    let assessment = assess_trend(&history, "kld", &TrendConfig::default()).unwrap();
    let report = assessment.to_report_string();
    assert!(report.contains("TREND BREAK DETECTED"));
    assert!(report.contains("kld"));
    assert!(report.contains("Statistical Test"));
}
