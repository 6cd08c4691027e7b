// Integration test utilities
//
// Test cases with scripted behaviour and stores seeded with known histories.

#![allow(dead_code)]

use driftcheck::analysis::not_deviated;
use driftcheck::naming::TestName;
use driftcheck::result::{ResultHistory, Status, TestResult};
use driftcheck::revision::Revision;
use driftcheck::store::ResultStore;
use driftcheck::test_case::{RunContext, TestCase};
use driftcheck::Result;

/// What a [`ScriptedTest`] does when run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    /// Report `distance` and finish with `done`
    Report(f64),
    /// Report `distance`, then finish with `failed`
    ReportFailed(f64),
    /// Report a partial field, then return an error
    Error,
    /// Report a partial field, then panic
    Panic,
    /// Report `distance` but never set a terminal status
    Forget(f64),
}

/// Test judged by `not_deviated(1.0, 0.5, distance)`
pub struct ScriptedTest {
    name: TestName,
    behaviour: Behaviour,
}

impl ScriptedTest {
    pub fn new(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: TestName::new(name).unwrap(),
            behaviour,
        }
    }
}

impl TestCase for ScriptedTest {
    fn name(&self) -> &TestName {
        &self.name
    }

    fn run(&self, result: &mut TestResult, _ctx: &RunContext) -> anyhow::Result<()> {
        tracing::info!(behaviour = ?self.behaviour, "Scripted run");
        tracing::trace!("Scripted detail");
        match self.behaviour {
            Behaviour::Report(d) => {
                result.set("distance", d)?;
                result.set_status(Status::Done);
            }
            Behaviour::ReportFailed(d) => {
                result.set("distance", d)?;
                result.set_status(Status::Failed);
            }
            Behaviour::Error => {
                result.set("iterations", 10i64)?;
                anyhow::bail!("sampler diverged");
            }
            Behaviour::Panic => {
                result.set("iterations", 10i64)?;
                panic!("index out of bounds in sampler");
            }
            Behaviour::Forget(d) => {
                result.set("distance", d)?;
            }
        }
        Ok(())
    }

    fn analyze(&self, history: &ResultHistory) -> Result<bool> {
        not_deviated(1.0, 0.5, history, "distance")
    }

    fn tracked_fields(&self) -> Vec<&str> {
        vec!["distance"]
    }
}

/// A terminal result of `name` at `hash` with the given fields
pub fn done_result(name: &str, hash: &str, run_date: &str, fields: &[(&str, f64)]) -> TestResult {
    let mut result = TestResult::new(
        TestName::new(name).unwrap(),
        &Revision::new(hash, "lib 1.0"),
        run_date,
        0,
    );
    for (key, value) in fields {
        result.set(key, *value).unwrap();
    }
    result.set_status(Status::Done);
    result
}

/// Store with one `done` record per `(hash, distance)` pair, dated one day apart
pub fn seeded_store(dir: &std::path::Path, name: &str, runs: &[(&str, f64)]) -> ResultStore {
    let store = ResultStore::open(dir).unwrap();
    for (i, (hash, distance)) in runs.iter().enumerate() {
        let date = format!("2024-01-{:02}-12:00:00", i + 1);
        store
            .append(&done_result(name, hash, &date, &[("distance", *distance)]))
            .unwrap();
    }
    store
}
