//! Identifier rules for test names, plot names and result field keys
//!
//! Names double as file-name stems in the results, log and plot
//! directories, so they are restricted to an ASCII letter followed by
//! ASCII word characters (`[A-Za-z0-9_]`).

use crate::error::{HarnessError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid name regex"))
}

/// Check that `name` is a valid identifier and hand it back unchanged
///
/// # Example
/// ```
/// use driftcheck::naming::validate_name;
///
/// assert!(validate_name("geweke_mcmc1").is_ok());
/// assert!(validate_name("1geweke").is_err());
/// assert!(validate_name("geweke-mcmc").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<&str> {
    if name_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(HarnessError::InvalidName(name.to_string()))
    }
}

/// A validated test name
///
/// Two tests with the same name are the same logical experiment, so
/// constructors of concrete tests bake their parameters into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestName(String);

impl TestName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TestName {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TestName> for String {
    fn from(value: TestName) -> Self {
        value.0
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TestName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated plot name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlotName(String);

impl PlotName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
