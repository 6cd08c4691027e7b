//! Error taxonomy for the harness
//!
//! Per-test failures (`Run`, `MissingField`) are isolated to the test that
//! produced them. `Sync` and `StoreWrite` abort a whole batch.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the harness core
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Invalid name: {0:?} (expected a letter followed by word characters)")]
    InvalidName(String),

    #[error("Failed to resolve revision: {0}")]
    Sync(String),

    #[error("Test {test} failed to run: {source}")]
    Run {
        test: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Field {field:?} missing from latest result of {test}")]
    MissingField { test: String, field: String },

    #[error("Failed to write result to {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Field {field:?} of {test} is not a scalar")]
    FieldType { test: String, field: String },

    #[error("Statistics failed: {0}")]
    Statistics(String),

    #[error("Refusing to store non-terminal result for {0}")]
    NonTerminal(String),

    #[error("Failed to read results from {path}: {source}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to write plot: {0}")]
    Plot(String),

    #[error("Unknown test: {0}")]
    UnknownTest(String),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// Whether this error must stop the remaining tests of a batch
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Sync(_) | HarnessError::StoreWrite { .. } | HarnessError::NonTerminal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_fatal_classification() {
        assert!(HarnessError::Sync("offline".into()).is_batch_fatal());
        assert!(HarnessError::StoreWrite {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .is_batch_fatal());
        assert!(!HarnessError::MissingField {
            test: "t1".into(),
            field: "kld".into()
        }
        .is_batch_fatal());
        assert!(!HarnessError::InvalidName("1x".into()).is_batch_fatal());
    }

    #[test]
    fn test_missing_field_message() {
        let err = HarnessError::MissingField {
            test: "t1".into(),
            field: "kld".into(),
        };
        assert_eq!(
            err.to_string(),
            "Field \"kld\" missing from latest result of t1"
        );
    }
}
