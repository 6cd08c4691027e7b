//! Tests that run an external command against the library checkout
//!
//! The command gets the run seed, log path and revision hash through the
//! environment and reports results on stdout, one `key: value` per line:
//!
//! ```text
//! kld: 0.0123
//! ess: 412
//! method: "AdaptiveCovarianceMCMC"
//! iters: [1000, 2000, 3000]
//! status: done
//! ```
//!
//! Quoted values are text, bracketed values are arrays (float arrays when
//! any element has a `.`), values containing a `.` or an exponent are
//! floats, everything else must be an integer. Malformed lines are logged
//! and skipped.

use crate::analysis::{not_deviated, not_deviated_per_commit};
use crate::config::CommandTestConfig;
use crate::error::{HarnessError, Result};
use crate::naming::{validate_name, TestName};
use crate::plot::{self, Figure};
use crate::result::{FieldValue, ResultHistory, Status, TestResult};
use crate::test_case::{RunContext, TestCase};
use anyhow::Context;
use std::process::{Command, Stdio};
use thiserror::Error;

pub const ENV_SEED: &str = "DRIFTCHECK_SEED";
pub const ENV_LOG: &str = "DRIFTCHECK_LOG";
pub const ENV_REVISION: &str = "DRIFTCHECK_REVISION";

/// Why a result line was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("missing ':' separator")]
    MissingSeparator,

    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("unable to parse value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Parse one stdout line into a field; blank lines yield `None`
///
/// # Example
/// ```
/// use driftcheck::result::FieldValue;
/// use driftcheck::suite::command::parse_result_line;
///
/// let (key, value) = parse_result_line("ess: 412").unwrap().unwrap();
/// assert_eq!(key, "ess");
/// assert_eq!(value, FieldValue::Int(412));
/// ```
pub fn parse_result_line(line: &str) -> std::result::Result<Option<(&str, FieldValue)>, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (key, raw) = line.split_once(':').ok_or(LineError::MissingSeparator)?;
    let key = key.trim();
    validate_name(key).map_err(|_| LineError::InvalidKey(key.to_string()))?;

    let raw = raw.trim();
    let invalid = || LineError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    };

    let value = if let Some(inner) = raw.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(invalid)?;
        let items: Vec<&str> = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if items.iter().any(|s| looks_like_float(s)) {
            let values = items
                .iter()
                .map(|s| s.parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            FieldValue::from(values)
        } else {
            let values = items
                .iter()
                .map(|s| s.parse::<i64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| invalid())?;
            FieldValue::IntArray(values)
        }
    } else if let Some(inner) = raw.strip_prefix('"') {
        FieldValue::Text(inner.strip_suffix('"').ok_or_else(invalid)?.to_string())
    } else if looks_like_float(raw) {
        FieldValue::from(raw.parse::<f64>().map_err(|_| invalid())?)
    } else {
        FieldValue::Int(raw.parse::<i64>().map_err(|_| invalid())?)
    };

    Ok(Some((key, value)))
}

fn looks_like_float(s: &str) -> bool {
    s.contains(['.', 'e', 'E']) || matches!(s.to_ascii_lowercase().trim_start_matches(['+', '-']), "inf" | "nan")
}

/// An external command tracked like any other test
#[derive(Debug, Clone)]
pub struct CommandTest {
    name: TestName,
    command: Vec<String>,
    field: String,
    expected: f64,
    threshold: f64,
    per_commit: Option<usize>,
}

impl CommandTest {
    pub fn from_config(config: &CommandTestConfig) -> Result<Self> {
        let name = TestName::new(config.name.clone())?;
        validate_name(&config.field)?;
        if config.command.is_empty() {
            return Err(HarnessError::Config(format!("test {} has an empty command", name)));
        }
        if !(config.threshold.is_finite() && config.threshold >= 0.0) {
            return Err(HarnessError::Config(format!(
                "test {} has an invalid threshold {}",
                name, config.threshold
            )));
        }
        Ok(Self {
            name,
            command: config.command.clone(),
            field: config.field.clone(),
            expected: config.expected,
            threshold: config.threshold,
            per_commit: config.per_commit,
        })
    }
}

impl TestCase for CommandTest {
    fn name(&self) -> &TestName {
        &self.name
    }

    fn run(&self, result: &mut TestResult, ctx: &RunContext) -> anyhow::Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .context("empty command")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(ENV_SEED, ctx.seed.to_string())
            .env(ENV_LOG, ctx.log_path())
            .env(ENV_REVISION, &ctx.revision.hash)
            .stdin(Stdio::null());
        if let Some(dir) = &ctx.library_dir {
            cmd.current_dir(dir);
        }

        tracing::info!(command = ?self.command, "Spawning test command");
        let output = cmd
            .output()
            .with_context(|| format!("failed to spawn {}", program))?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            tracing::debug!(target: "driftcheck::command", "{}", line);
        }

        let mut reported = 0usize;
        let mut status = None;
        for (i, line) in String::from_utf8_lossy(&output.stdout).lines().enumerate() {
            // A bare `status: done` is not a valid value, so look at it first
            if let Some((key, raw)) = line.split_once(':') {
                if key.trim() == "status" {
                    status = Some(raw.trim().trim_matches('"').to_string());
                    continue;
                }
            }
            match parse_result_line(line) {
                Ok(Some((key, value))) => {
                    result.set(key, value)?;
                    reported += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::error!("Unable to parse line {} of command output: {}", i + 1, e),
            }
        }

        if !output.status.success() {
            anyhow::bail!("{} exited with {}", program, output.status);
        }

        match status.as_deref() {
            Some("done") => result.set_status(Status::Done),
            Some("failed") => result.set_status(Status::Failed),
            Some(other) => anyhow::bail!("command reported unknown status {:?}", other),
            None if reported > 0 => result.set_status(Status::Done),
            None => tracing::warn!("Command reported no results"),
        }
        Ok(())
    }

    fn analyze(&self, history: &ResultHistory) -> Result<bool> {
        match self.per_commit {
            Some(commits) => not_deviated_per_commit(self.expected, self.threshold, history, &self.field, commits),
            None => not_deviated(self.expected, self.threshold, history, &self.field),
        }
    }

    fn tracked_fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }

    fn plot(&self, history: &ResultHistory) -> Result<Vec<Figure>> {
        let bound = match self.per_commit {
            Some(_) => self.expected + 3.0 * self.threshold,
            None => self.expected + self.threshold,
        };
        Ok(vec![plot::variable(
            history,
            &self.field,
            self.name.as_str(),
            &self.field,
            Some(bound),
        )?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_result_line("n: -3").unwrap(), Some(("n", FieldValue::Int(-3))));
        assert_eq!(
            parse_result_line("kld:  1.50000000000000000e-02").unwrap(),
            Some(("kld", FieldValue::Float(0.015)))
        );
        assert_eq!(parse_result_line("x: 1e3").unwrap(), Some(("x", FieldValue::Float(1000.0))));
        assert_eq!(
            parse_result_line("method: \"AdaptiveCovarianceMCMC\"").unwrap(),
            Some(("method", FieldValue::Text("AdaptiveCovarianceMCMC".to_string())))
        );
    }

    #[test]
    fn test_parse_arrays() {
        assert_eq!(
            parse_result_line("iters: [1, 2, 3]").unwrap(),
            Some(("iters", FieldValue::IntArray(vec![1, 2, 3])))
        );
        assert_eq!(
            parse_result_line("klds: [1, 0.5]").unwrap(),
            Some(("klds", FieldValue::FloatArray(vec![1.0, 0.5])))
        );
        assert_eq!(
            parse_result_line("none: []").unwrap(),
            Some(("none", FieldValue::IntArray(vec![])))
        );
    }

    #[test]
    fn test_parse_blank_and_malformed() {
        assert_eq!(parse_result_line("   ").unwrap(), None);
        assert_eq!(parse_result_line("no separator"), Err(LineError::MissingSeparator));
        assert!(matches!(parse_result_line("1bad: 3"), Err(LineError::InvalidKey(_))));
        assert!(matches!(parse_result_line("x: abc"), Err(LineError::InvalidValue { .. })));
        assert!(matches!(parse_result_line("x: [1, 2"), Err(LineError::InvalidValue { .. })));
        assert!(matches!(parse_result_line("x: \"open"), Err(LineError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_non_finite() {
        let (_, value) = parse_result_line("kld: nan").unwrap().unwrap();
        assert!(value.as_f64().unwrap().is_nan());
        let (_, value) = parse_result_line("kld: -inf").unwrap().unwrap();
        assert_eq!(value.as_f64(), Some(f64::NEG_INFINITY));
    }

    #[test]
    fn test_config_validation() {
        let config = CommandTestConfig {
            name: "ext".to_string(),
            command: vec![],
            field: "kld".to_string(),
            expected: 0.0,
            threshold: 0.1,
            per_commit: None,
        };
        assert!(matches!(CommandTest::from_config(&config), Err(HarnessError::Config(_))));

        let config = CommandTestConfig {
            command: vec!["true".to_string()],
            field: "not valid".to_string(),
            ..config
        };
        assert!(matches!(CommandTest::from_config(&config), Err(HarnessError::InvalidName(_))));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::revision::Revision;

        fn sh(script: &str) -> CommandTest {
            CommandTest::from_config(&CommandTestConfig {
                name: "ext".to_string(),
                command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
                field: "kld".to_string(),
                expected: 0.0,
                threshold: 0.1,
                per_commit: None,
            })
            .unwrap()
        }

        fn run(test: &CommandTest) -> (anyhow::Result<()>, TestResult) {
            let dir = tempfile::tempdir().unwrap();
            let ctx = RunContext {
                revision: Revision::new("abc123", "lib 1.0"),
                run_date: "2024-01-01-00:00:00".to_string(),
                seed: 42,
                log_path: dir.path().join("ext.log"),
                library_dir: None,
            };
            let mut result = TestResult::new(test.name().clone(), &ctx.revision, &ctx.run_date, 42);
            let outcome = test.run(&mut result, &ctx);
            (outcome, result)
        }

        #[test]
        fn test_fields_and_status_from_stdout() {
            let (outcome, result) = run(&sh("echo 'kld: 0.05'; echo 'status: \"failed\"'"));
            outcome.unwrap();
            assert_eq!(result.scalar("kld"), Some(0.05));
            assert_eq!(result.status, Status::Failed);
        }

        #[test]
        fn test_environment_is_passed() {
            let (outcome, result) = run(&sh("echo \"seed: $DRIFTCHECK_SEED\"; echo \"rev: \\\"$DRIFTCHECK_REVISION\\\"\""));
            outcome.unwrap();
            assert_eq!(result.get("seed"), Some(&FieldValue::Int(42)));
            assert_eq!(result.get("rev").and_then(FieldValue::as_str), Some("abc123"));
            assert_eq!(result.status, Status::Done);
        }

        #[test]
        fn test_non_zero_exit_is_an_error() {
            let (outcome, result) = run(&sh("echo 'kld: 0.05'; exit 3"));
            assert!(outcome.is_err());
            // Fields reported before the failure are kept
            assert_eq!(result.scalar("kld"), Some(0.05));
        }

        #[test]
        fn test_silent_command_leaves_status_running() {
            let (outcome, result) = run(&sh("true"));
            outcome.unwrap();
            assert_eq!(result.status, Status::Running);
        }
    }
}
