//! Result records and result histories
//!
//! A [`TestResult`] is one execution of one test against one revision. It
//! starts out `running`, is finalised exactly once by the runner and is
//! then appended to the store, after which it is never modified.

use crate::error::{HarnessError, Result};
use crate::naming::{validate_name, TestName};
use crate::revision::Revision;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Run date format used in records and file names
pub const DATE_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// Current local time formatted as a run date
pub fn run_date_now() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

/// Parse a run date produced by [`run_date_now`]
pub fn parse_run_date(date: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(date, DATE_FORMAT).ok()
}

/// Lifecycle state of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Done,
    Failed,
    Errored,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Done => "done",
            Status::Failed => "failed",
            Status::Errored => "errored",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test-defined result field
///
/// Stored externally tagged (`{"float": 0.5}`, `{"int_array": []}`) so every
/// kind reads back as itself, empty arrays included. JSON cannot carry NaN or
/// infinities, so non-finite floats are written as tagged strings
/// (`{"float": "inf"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Int(i64),
    Float(#[serde(with = "json_float")] f64),
    Text(String),
    IntArray(Vec<i64>),
    FloatArray(#[serde(with = "json_float::seq")] Vec<f64>),
}

/// f64 encoding that keeps NaN and infinities representable in JSON
mod json_float {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    impl From<f64> for Repr {
        fn from(v: f64) -> Self {
            if v.is_finite() {
                Repr::Number(v)
            } else {
                Repr::Text(v.to_string())
            }
        }
    }

    impl Repr {
        fn into_f64<E: Error>(self) -> Result<f64, E> {
            match self {
                Repr::Number(v) => Ok(v),
                Repr::Text(s) => s
                    .parse::<f64>()
                    .ok()
                    .filter(|v| !v.is_finite())
                    .ok_or_else(|| E::custom(format!("invalid non-finite float {:?}", s))),
            }
        }
    }

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Repr::from(*v).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Repr::deserialize(deserializer)?.into_f64()
    }

    pub mod seq {
        use super::Repr;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(v.iter().map(|x| Repr::from(*x)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
            Vec::<Repr>::deserialize(deserializer)?
                .into_iter()
                .map(Repr::into_f64)
                .collect()
        }
    }
}

impl FieldValue {
    /// Scalar view of this value (integers are widened)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) | FieldValue::IntArray(_) | FieldValue::FloatArray(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64_array(&self) -> Option<Vec<f64>> {
        match self {
            FieldValue::IntArray(v) => Some(v.iter().map(|x| *x as f64).collect()),
            FieldValue::FloatArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:e}", v),
            FieldValue::Text(s) => write!(f, "\"{}\"", s),
            FieldValue::IntArray(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            FieldValue::FloatArray(v) => {
                let parts: Vec<String> = v.iter().map(|x| format!("{:e}", x)).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(v: Vec<i64>) -> Self {
        FieldValue::IntArray(v)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(v: Vec<f64>) -> Self {
        FieldValue::FloatArray(v)
    }
}

/// One execution of one test against one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: TestName,
    pub status: Status,
    pub revision_hash: String,
    pub version: String,
    pub run_date: String,
    /// Per-test append position, assigned by the store
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub harness_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

impl TestResult {
    /// Create a fresh `running` result for `name` at `revision`
    pub fn new(name: TestName, revision: &Revision, run_date: impl Into<String>, seed: u64) -> Self {
        Self {
            name,
            status: Status::Running,
            revision_hash: revision.hash.clone(),
            version: revision.version.clone(),
            run_date: run_date.into(),
            sequence: 0,
            duration_secs: 0.0,
            log_path: None,
            seed,
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            error: None,
            fields: BTreeMap::new(),
        }
    }

    /// Store a test-defined field; keys follow the name rules
    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) -> Result<()> {
        validate_name(key)?;
        self.fields.insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Scalar value of a field, if present and numeric
    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_f64)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Short hash used on plot axes and in reports
    pub fn short_hash(&self) -> &str {
        let end = self
            .revision_hash
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.revision_hash.len());
        &self.revision_hash[..end]
    }
}

/// Terminal results of one test in append order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultHistory {
    records: Vec<TestResult>,
}

impl ResultHistory {
    /// Build a history, dropping non-terminal records and ordering by append sequence
    pub fn new(mut records: Vec<TestResult>) -> Self {
        records.retain(TestResult::is_terminal);
        records.sort_by(|a, b| a.sequence.cmp(&b.sequence).then(a.run_date.cmp(&b.run_date)));
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<&TestResult> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestResult> {
        self.records.iter()
    }

    pub fn records(&self) -> &[TestResult] {
        &self.records
    }

    /// Scalar values of `field` from every record that has it
    pub fn values(&self, field: &str) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.scalar(field)).collect()
    }

    /// `(revision_hash, value)` pairs for every record that has `field`
    pub fn commit_values(&self, field: &str) -> Vec<(&str, f64)> {
        self.records
            .iter()
            .filter_map(|r| r.scalar(field).map(|v| (r.revision_hash.as_str(), v)))
            .collect()
    }

    /// Rows of the requested fields, skipping records missing any of them
    pub fn columns(&self, fields: &[&str]) -> Vec<Vec<&FieldValue>> {
        self.records
            .iter()
            .filter_map(|r| fields.iter().map(|f| r.get(f)).collect::<Option<Vec<_>>>())
            .collect()
    }
}

impl<'a> IntoIterator for &'a ResultHistory {
    type Item = &'a TestResult;
    type IntoIter = std::slice::Iter<'a, TestResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Fail unless the latest record of `history` carries `field`
pub fn require_field<'a>(history: &'a ResultHistory, field: &str) -> Result<Option<&'a FieldValue>> {
    match history.latest() {
        None => Ok(None),
        Some(latest) => latest
            .get(field)
            .map(Some)
            .ok_or_else(|| HarnessError::MissingField {
                test: latest.name.to_string(),
                field: field.to_string(),
            }),
    }
}
