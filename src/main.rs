use anyhow::{Context, Result};
use clap::Parser;
use driftcheck::analysis::{assess_trend, TrendConfig};
use driftcheck::cli::Cli;
use driftcheck::config::{HarnessConfig, DEFAULT_CONFIG_FILE};
use driftcheck::plot::JsonPlotReporter;
use driftcheck::registry::TestRegistry;
use driftcheck::revision::{FixedRevision, GitRevisionProvider, RevisionProvider};
use driftcheck::runner::{analyze_test, plot_test, RunOutcome, TestRunner};
use driftcheck::store::ResultStore;
use driftcheck::test_case::TestCase;
use driftcheck::{report, suite};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber (`--debug` raises the level to TRACE)
///
/// Returns the most verbose level enabled, for the per-run subscribers.
fn init_tracing(debug: bool) -> LevelFilter {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let max_level = filter.max_level_hint().unwrap_or(LevelFilter::from_level(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    max_level
}

/// Revision source for this invocation
fn build_provider(args: &Cli, config: &HarnessConfig) -> Result<Box<dyn RevisionProvider>> {
    let library_name = config
        .library
        .as_ref()
        .map(|l| l.name.clone())
        .unwrap_or_else(|| "library".to_string());

    if let Some(hash) = &args.offline_revision {
        tracing::info!(%hash, "Using offline revision");
        return Ok(Box::new(
            FixedRevision::new(hash.clone(), "offline").with_library_name(library_name),
        ));
    }

    let library = config.library.as_ref().with_context(|| {
        format!(
            "No [library] configured in {}; pass --offline-revision to run without git",
            DEFAULT_CONFIG_FILE
        )
    })?;
    let provider = GitRevisionProvider::new(&library.path, &library.branch, &library.name);
    Ok(Box::new(if library.pull {
        provider
    } else {
        provider.without_pull()
    }))
}

/// Tests named on the command line, the least recently run one, or all
fn select<'a>(args: &Cli, registry: &'a TestRegistry, store: &ResultStore) -> Result<Vec<&'a dyn TestCase>> {
    if args.next {
        let next = registry
            .next_test(store)?
            .context("No tests registered")?;
        return Ok(vec![next]);
    }
    if args.tests.is_empty() {
        return Ok(registry.iter().collect());
    }
    args.tests
        .iter()
        .map(|name| {
            registry.get(name).with_context(|| {
                let known: Vec<String> = registry.names().iter().map(|n| n.to_string()).collect();
                format!("Known tests: {}", known.join(", "))
            })
        })
        .collect()
}

fn print_list(registry: &TestRegistry, store: &ResultStore) -> Result<()> {
    for (name, date) in registry.last_run_dates(store)? {
        println!("{} {}", name, date.as_deref().unwrap_or("never"));
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    let result = &outcome.result;
    println!("{}: {}", result.name, outcome.verdict());
    println!("  result: {}", outcome.record_path.display());
    if let Some(log) = &result.log_path {
        println!("  log: {}", log.display());
    }
}

/// Analyze stored results without running; returns whether the test passes
fn analyze_and_print(test: &dyn TestCase, store: &ResultStore, trend: &TrendConfig) -> Result<bool> {
    let history = store.history(test.name())?;
    if history.is_empty() {
        println!("{}: not run", test.name());
        return Ok(true);
    }

    let passed = match analyze_test(store, test) {
        Ok(true) => {
            println!("{}: ok", test.name());
            true
        }
        Ok(false) => {
            println!("{}: FAILED", test.name());
            false
        }
        Err(e) => {
            println!("{}: FAILED ({})", test.name(), e);
            false
        }
    };

    for field in test.tracked_fields() {
        let assessment = assess_trend(&history, field, trend)?;
        for line in assessment.to_report_string().lines() {
            println!("  {}", line);
        }
    }
    Ok(passed)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = init_tracing(args.debug);

    let mut config = HarnessConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.results_dir {
        config.results_dir = dir.clone();
    }
    if let Some(dir) = &args.log_dir {
        config.log_dir = dir.clone();
    }
    if let Some(dir) = &args.plot_dir {
        config.plot_dir = dir.clone();
    }

    let store = ResultStore::open(&config.results_dir)?;
    let registry = suite::registry(&config)?;

    if args.list {
        print_list(&registry, &store)?;
    }
    if !args.has_action() {
        if !args.list {
            anyhow::bail!("Nothing to do: name tests to run, or use --next, --list, --analyze, --plot or --report");
        }
        return Ok(());
    }

    let selected = select(&args, &registry, &store)?;
    let mut all_passed = true;

    if args.analyze {
        for test in &selected {
            all_passed &= analyze_and_print(*test, &store, &config.trend)?;
        }
    } else if args.next || !args.tests.is_empty() {
        let provider = build_provider(&args, &config)?;
        let mut runner = TestRunner::new(store.clone(), &config.log_dir, provider).with_log_level(log_level);
        let summary = runner.run_batch_with(&selected, print_outcome)?;
        all_passed &= summary.all_passed();
    }

    if args.plot {
        let mut reporter = JsonPlotReporter::new(&config.plot_dir);
        for test in &selected {
            for path in plot_test(&store, *test, &mut reporter)? {
                println!("Figure written to {}", path.display());
            }
        }
    }

    if let Some(path) = &args.report {
        let title = match &config.library {
            Some(library) => format!("{} functional testing report", library.name),
            None => "Functional testing report".to_string(),
        };
        let summaries = report::summarize(&registry, &store, &config.trend, Some(&config.plot_dir))?;
        report::write_report(path, &title, &summaries)?;
        println!("Report written to {}", path.display());
    }

    if !all_passed {
        std::process::exit(1);
    }
    Ok(())
}
