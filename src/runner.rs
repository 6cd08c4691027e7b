//! Drives tests through their lifecycle for the current revision
//!
//! One runner serves one harness invocation: the revision is resolved on
//! first use and frozen, every test gets a fresh `running` result, runs
//! under a per-run log subscriber, and is appended exactly once whatever
//! the outcome of its run.

use crate::error::{HarnessError, Result};
use crate::naming::PlotName;
use crate::plot::PlotReporter;
use crate::result::{run_date_now, Status, TestResult};
use crate::revision::{Revision, RevisionCell, RevisionProvider};
use crate::store::{unique_path, ResultStore};
use crate::test_case::{RunContext, TestCase};
use rand::Rng;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, Layer, Registry};

/// Outcome of one test run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The finalised result (the stored copy also carries its sequence number)
    pub result: TestResult,
    pub record_path: PathBuf,
    /// Verdict of `analyze` on the updated history (false for errored runs)
    pub passed: bool,
    /// Why analysis could not reach a verdict, if it failed
    pub analysis_error: Option<String>,
}

impl RunOutcome {
    /// One-line verdict, with the stored status when it disagrees
    ///
    /// A test can report `failed` itself while its metric still passes
    /// analysis; both are shown so neither is hidden.
    pub fn verdict(&self) -> String {
        let status = self.result.status;
        if status == Status::Errored {
            return format!(
                "ERRORED ({})",
                self.result.error.as_deref().unwrap_or("unknown error")
            );
        }
        let mut verdict = match (&self.analysis_error, self.passed) {
            (_, true) => "ok".to_string(),
            (Some(e), false) => format!("FAILED ({})", e),
            (None, false) => "FAILED".to_string(),
        };
        if status == Status::Failed {
            verdict.push_str(" (status: failed)");
        }
        verdict
    }
}

/// Outcomes of a sequential batch
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<RunOutcome>,
}

impl BatchSummary {
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

/// Runs tests against one frozen revision and records their results
pub struct TestRunner {
    store: ResultStore,
    log_dir: PathBuf,
    provider: Box<dyn RevisionProvider>,
    revision: RevisionCell,
    run_date: Option<String>,
    echo_to_stderr: bool,
    log_level: LevelFilter,
}

impl TestRunner {
    pub fn new(store: ResultStore, log_dir: impl Into<PathBuf>, provider: Box<dyn RevisionProvider>) -> Self {
        Self {
            store,
            log_dir: log_dir.into(),
            provider,
            revision: RevisionCell::new(),
            run_date: None,
            echo_to_stderr: true,
            log_level: LevelFilter::INFO,
        }
    }

    /// Verbosity of run diagnostics on stderr
    ///
    /// The run log file records DEBUG and above, or everything `level`
    /// lets through when that is more verbose.
    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    /// Use a fixed run date instead of the clock
    pub fn with_run_date(mut self, run_date: impl Into<String>) -> Self {
        self.run_date = Some(run_date.into());
        self
    }

    /// Keep run diagnostics in the log file only
    pub fn quiet(mut self) -> Self {
        self.echo_to_stderr = false;
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// The revision of this invocation, resolved on first call
    pub fn revision(&mut self) -> Result<Revision> {
        Ok(self
            .revision
            .get_or_resolve(self.provider.as_mut())?
            .clone())
    }

    /// Run `test`, store its result and analyze the updated history
    ///
    /// Failures inside the test become an `errored` record. Only revision
    /// resolution (`Sync`) and persistence (`StoreWrite`) errors propagate.
    pub fn run_test(&mut self, test: &dyn TestCase) -> Result<RunOutcome> {
        let revision = self.revision()?;
        let name = test.name().clone();
        let run_date = self.run_date.clone().unwrap_or_else(run_date_now);
        let seed = rand::thread_rng().gen_range(0..1u64 << 32);

        fs::create_dir_all(&self.log_dir).map_err(|source| HarnessError::StoreWrite {
            path: self.log_dir.clone(),
            source,
        })?;
        let log_path = unique_path(&self.log_dir.join(format!("{}-{}.log", name, run_date)));

        let mut result = TestResult::new(name.clone(), &revision, run_date.clone(), seed);
        result.log_path = Some(log_path.clone());

        let ctx = RunContext {
            revision,
            run_date,
            seed,
            log_path,
            library_dir: self.provider.checkout_dir().map(Path::to_path_buf),
        };

        tracing::info!(test = %name, revision = %ctx.revision.hash, seed, "Running test");
        let started = Instant::now();
        let outcome = self.run_scoped(test, &mut result, &ctx)?;
        result.duration_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) if result.status.is_terminal() => {}
            Ok(()) => {
                tracing::error!(test = %name, "Run finished without a terminal status");
                result.set_status(Status::Errored);
                result.error = Some("missing status: run did not set done or failed".to_string());
            }
            Err(source) => {
                let summary = format!("{:#}", source);
                let err = HarnessError::Run {
                    test: name.to_string(),
                    source,
                };
                tracing::error!("{}", err);
                result.set_status(Status::Errored);
                result.error = Some(summary);
            }
        }

        let record_path = self.store.append(&result)?;

        let (passed, analysis_error) = if result.status == Status::Errored {
            (false, None)
        } else {
            match analyze_test(&self.store, test) {
                Ok(passed) => (passed, None),
                Err(e) => {
                    tracing::warn!(test = %name, "Analysis failed: {}", e);
                    (false, Some(e.to_string()))
                }
            }
        };

        tracing::info!(
            test = %name,
            status = %result.status,
            passed,
            duration_secs = result.duration_secs,
            "Finished test"
        );

        Ok(RunOutcome {
            result,
            record_path,
            passed,
            analysis_error,
        })
    }

    /// Run `test.run` with diagnostics captured in the per-run log file
    ///
    /// The outer error is a log-file failure; the inner one is the test's.
    fn run_scoped(
        &self,
        test: &dyn TestCase,
        result: &mut TestResult,
        ctx: &RunContext,
    ) -> Result<anyhow::Result<()>> {
        let file = fs::File::create(&ctx.log_path).map_err(|source| HarnessError::StoreWrite {
            path: ctx.log_path.clone(),
            source,
        })?;

        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_filter(self.log_level.max(LevelFilter::DEBUG));
        let stderr_layer = self.echo_to_stderr.then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(self.log_level)
        });
        let subscriber = Registry::default().with(file_layer).with(stderr_layer);

        // The subscriber owns the file and is dropped on every path out of here
        let outcome = tracing::subscriber::with_default(subscriber, || {
            let _span = tracing::info_span!("run", test = %test.name(), revision = %ctx.revision.hash)
                .entered();
            panic::catch_unwind(AssertUnwindSafe(|| test.run(result, ctx)))
        });

        Ok(match outcome {
            Ok(run) => run,
            Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
        })
    }

    /// Run tests one after another
    ///
    /// A test that errors does not stop the batch; revision and store
    /// failures do.
    pub fn run_batch(&mut self, tests: &[&dyn TestCase]) -> Result<BatchSummary> {
        self.run_batch_with(tests, |_| {})
    }

    /// [`run_batch`](Self::run_batch), handing each outcome to `on_outcome`
    /// as soon as its record is stored
    ///
    /// On a batch-fatal error the outcomes already handed out stay valid:
    /// their records were written before the failure.
    pub fn run_batch_with(
        &mut self,
        tests: &[&dyn TestCase],
        mut on_outcome: impl FnMut(&RunOutcome),
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        for test in tests {
            let outcome = self.run_test(*test)?;
            on_outcome(&outcome);
            summary.outcomes.push(outcome);
        }
        Ok(summary)
    }
}

/// Analyze `test` against its stored history
pub fn analyze_test(store: &ResultStore, test: &dyn TestCase) -> Result<bool> {
    let history = store.history(test.name())?;
    tracing::info!(test = %test.name(), runs = history.len(), "Running analysis");
    test.analyze(&history)
}

/// Render the figures of `test` through `reporter`
pub fn plot_test(store: &ResultStore, test: &dyn TestCase, reporter: &mut dyn PlotReporter) -> Result<Vec<PathBuf>> {
    let history = store.history(test.name())?;
    tracing::info!(test = %test.name(), "Running plot");
    let figures = test.plot(&history)?;
    if figures.is_empty() {
        return Ok(Vec::new());
    }
    reporter.write(&PlotName::new(test.name().as_str())?, &figures)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
