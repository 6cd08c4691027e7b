//! Named set of tests known to the harness

use crate::error::{HarnessError, Result};
use crate::naming::TestName;
use crate::store::ResultStore;
use crate::test_case::TestCase;

/// Tests in registration order, unique by name
#[derive(Default)]
pub struct TestRegistry {
    tests: Vec<Box<dyn TestCase>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `test`; names must be unique
    pub fn add(&mut self, test: Box<dyn TestCase>) -> Result<()> {
        if self.tests.iter().any(|t| t.name() == test.name()) {
            return Err(HarnessError::Config(format!(
                "duplicate test name {}",
                test.name()
            )));
        }
        tracing::debug!(test = %test.name(), "Registered test");
        self.tests.push(test);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn names(&self) -> Vec<&TestName> {
        self.tests.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TestCase> {
        self.tests.iter().map(|t| t.as_ref())
    }

    pub fn get(&self, name: &str) -> Result<&dyn TestCase> {
        self.iter()
            .find(|t| t.name().as_str() == name)
            .ok_or_else(|| HarnessError::UnknownTest(name.to_string()))
    }

    /// Every registered test with the run date of its latest stored result
    pub fn last_run_dates(&self, store: &ResultStore) -> Result<Vec<(&TestName, Option<String>)>> {
        self.iter()
            .map(|t| -> Result<_> { Ok((t.name(), store.last_run_date(t.name())?)) })
            .collect()
    }

    /// The test that was run least recently; never-run tests come first,
    /// ties go to the earliest registered
    pub fn next_test(&self, store: &ResultStore) -> Result<Option<&dyn TestCase>> {
        let dates = self.last_run_dates(store)?;
        // Run dates sort chronologically as strings; `None` sorts first
        let oldest = dates
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.1.cmp(&b.1))
            .map(|(i, _)| i);
        Ok(oldest.map(|i| self.tests[i].as_ref()))
    }
}
