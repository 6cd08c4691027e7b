//! Sampler convergence test: KL divergence of a chain from a known target
//!
//! The sampler is driven through its ask/tell protocol on a toy log-density.
//! The first `burn_in` iterations are discarded (they include the sampler's
//! own initial phase, which is never recorded either), the KL
//! divergence is tracked every `check_every` iterations and the final value
//! must stay within `pass_threshold` of zero.

use crate::analysis::not_deviated;
use crate::capability::{LogPdf, Method, Metrics, SamplerSetup};
use crate::error::Result;
use crate::naming::TestName;
use crate::plot::{self, Figure};
use crate::result::{ResultHistory, Status, TestResult};
use crate::test_case::{RunContext, TestCase};
use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Iteration budget of a sampler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub max_iterations: usize,
    /// Iterations discarded from the start of the run, initial phase included
    pub burn_in: usize,
    pub check_every: usize,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            max_iterations: 6000,
            burn_in: 2000,
            check_every: 500,
        }
    }
}

pub struct SamplerKld {
    name: TestName,
    method: Method,
    problem: Arc<dyn LogPdf>,
    metrics: Arc<dyn Metrics>,
    start: Vec<f64>,
    n_chains: usize,
    schedule: Schedule,
    pass_threshold: f64,
}

impl SamplerKld {
    /// Test named `<problem>_<method>_<n_chains>`
    ///
    /// Chains start at `start` perturbed uniformly by up to one unit per
    /// coordinate, drawn from the run seed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        problem_label: &str,
        method: Method,
        problem: Arc<dyn LogPdf>,
        metrics: Arc<dyn Metrics>,
        start: Vec<f64>,
        n_chains: usize,
        schedule: Schedule,
        pass_threshold: f64,
    ) -> Result<Self> {
        let name = TestName::new(format!("{}_{}_{}", problem_label, method.label(), n_chains))?;
        Ok(Self {
            name,
            method,
            problem,
            metrics,
            start,
            n_chains: n_chains.max(1),
            schedule,
            pass_threshold,
        })
    }

    fn initial_points(&self, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..self.n_chains)
            .map(|_| {
                self.start
                    .iter()
                    .map(|x| *x + rng.gen_range(-1.0..=1.0))
                    .collect()
            })
            .collect()
    }
}

impl TestCase for SamplerKld {
    fn name(&self) -> &TestName {
        &self.name
    }

    fn run(&self, result: &mut TestResult, ctx: &RunContext) -> anyhow::Result<()> {
        if self.start.len() != self.problem.n_parameters() {
            anyhow::bail!(
                "start point has {} coordinates, problem has {} parameters",
                self.start.len(),
                self.problem.n_parameters()
            );
        }

        result.set("method", self.method.label())?;
        result.set("n_chains", self.n_chains)?;
        tracing::info!(method = self.method.label(), n_chains = self.n_chains, "Using method");

        let setup = SamplerSetup {
            n_chains: self.n_chains,
            initial_points: self.initial_points(ctx.seed),
        };
        let mut sampler = self
            .method
            .instantiate(&setup)
            .with_context(|| format!("failed to create sampler {}", self.method.label()))?;

        let Schedule {
            max_iterations,
            burn_in,
            check_every,
        } = self.schedule;

        let mut chain: Vec<Vec<f64>> = Vec::new();
        let mut iters: Vec<i64> = Vec::new();
        let mut klds: Vec<f64> = Vec::new();

        for i in 1..=max_iterations {
            let proposals = sampler.ask()?;
            let densities = proposals
                .iter()
                .map(|x| self.problem.evaluate(x))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let states = sampler.tell(&densities)?;

            if i <= burn_in || sampler.in_initial_phase() {
                continue;
            }

            // First chain only
            let state = states.into_iter().next().context("sampler returned no states")?;
            chain.push(state);

            if check_every > 0 && i % check_every == 0 && chain.len() > 1 {
                let kld = self.metrics.kl_divergence(&chain)?;
                tracing::debug!(iteration = i, kld, "Convergence check");
                iters.push(i as i64);
                klds.push(kld);
            }
        }

        if chain.len() < 2 {
            anyhow::bail!("only {} samples left after warm-up", chain.len());
        }

        let kld = self.metrics.kl_divergence(&chain)?;
        let ess = self.metrics.effective_sample_size(&chain)?;
        tracing::info!(samples = chain.len(), kld, ess, "Sampling finished");

        result.set("n_samples", chain.len())?;
        result.set("kld", kld)?;
        result.set("ess", ess)?;
        result.set("iters", iters)?;
        result.set("klds", klds)?;
        result.set_status(Status::Done);
        Ok(())
    }

    fn analyze(&self, history: &ResultHistory) -> Result<bool> {
        not_deviated(0.0, self.pass_threshold, history, "kld")
    }

    fn tracked_fields(&self) -> Vec<&str> {
        vec!["kld", "ess"]
    }

    fn plot(&self, history: &ResultHistory) -> Result<Vec<Figure>> {
        let title = format!("{} w. {}", self.name, self.method.label());
        Ok(vec![
            plot::variable(history, "kld", &title, "KL divergence", Some(self.pass_threshold))?,
            plot::variable(history, "ess", &title, "Effective sample size", None)?,
            plot::convergence(
                history,
                "iters",
                "klds",
                &title,
                "Iteration",
                "KL divergence",
                None,
                10,
            ),
        ])
    }
}
