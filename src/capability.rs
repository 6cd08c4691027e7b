//! Late-bound interfaces to the algorithm library under test
//!
//! The library is only usable after the revision under test has been
//! checked out, so tests never hold a library object directly. They hold a
//! [`Method`]: a validated label (used in test names) plus a factory that
//! is only called from inside `TestCase::run`.

use crate::error::{HarnessError, Result};
use crate::naming::validate_name;
use std::fmt;
use std::sync::Arc;

/// A forward model of a toy problem
pub trait Model {
    fn n_parameters(&self) -> usize;

    fn simulate(&self, parameters: &[f64], times: &[f64]) -> anyhow::Result<Vec<f64>>;
}

/// Unnormalised log-density a sampler explores
pub trait LogPdf {
    fn n_parameters(&self) -> usize;

    fn evaluate(&self, x: &[f64]) -> anyhow::Result<f64>;
}

/// Gaussian log-likelihood of a [`Model`] given noisy observations
pub struct ModelProblem {
    model: Box<dyn Model>,
    times: Vec<f64>,
    values: Vec<f64>,
    sigma: f64,
}

impl ModelProblem {
    pub fn new(model: Box<dyn Model>, times: Vec<f64>, values: Vec<f64>, sigma: f64) -> Result<Self> {
        if times.len() != values.len() {
            return Err(HarnessError::Config(format!(
                "{} times but {} values",
                times.len(),
                values.len()
            )));
        }
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(HarnessError::Config(format!(
                "noise level must be positive, got {}",
                sigma
            )));
        }
        Ok(Self {
            model,
            times,
            values,
            sigma,
        })
    }
}

impl LogPdf for ModelProblem {
    fn n_parameters(&self) -> usize {
        self.model.n_parameters()
    }

    fn evaluate(&self, x: &[f64]) -> anyhow::Result<f64> {
        if x.len() != self.n_parameters() {
            anyhow::bail!("expected {} parameters, got {}", self.n_parameters(), x.len());
        }
        let simulated = self.model.simulate(x, &self.times)?;
        if simulated.len() != self.values.len() {
            anyhow::bail!(
                "model returned {} values for {} times",
                simulated.len(),
                self.times.len()
            );
        }

        let n = self.values.len() as f64;
        let sse: f64 = simulated
            .iter()
            .zip(&self.values)
            .map(|(s, v)| (s - v).powi(2))
            .sum();
        let norm = n * (self.sigma * (2.0 * std::f64::consts::PI).sqrt()).ln();
        Ok(-norm - sse / (2.0 * self.sigma * self.sigma))
    }
}

/// Two-phase (ask/tell) sampler protocol
pub trait Sampler {
    /// Propose one point per chain
    fn ask(&mut self) -> anyhow::Result<Vec<Vec<f64>>>;

    /// Report the log-density of the last proposals; returns the current
    /// chain states once the proposals have been accepted or rejected
    fn tell(&mut self, log_densities: &[f64]) -> anyhow::Result<Vec<Vec<f64>>>;

    /// Whether the sampler is still in its warm-up / adaptation phase
    fn in_initial_phase(&self) -> bool {
        false
    }
}

/// Divergence and efficiency metrics of a sample set
pub trait Metrics {
    fn kl_divergence(&self, samples: &[Vec<f64>]) -> anyhow::Result<f64>;

    fn effective_sample_size(&self, samples: &[Vec<f64>]) -> anyhow::Result<f64>;
}

/// What a sampler factory needs to know to build a sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSetup {
    pub n_chains: usize,
    pub initial_points: Vec<Vec<f64>>,
}

type SamplerFactory = dyn Fn(&SamplerSetup) -> anyhow::Result<Box<dyn Sampler>> + Send + Sync;

/// Lazily resolved handle to a sampling method of the library
#[derive(Clone)]
pub struct Method {
    label: String,
    factory: Arc<SamplerFactory>,
}

impl Method {
    /// Create a handle; `label` must be a valid name because it becomes part of test names
    pub fn new<F>(label: impl Into<String>, factory: F) -> Result<Self>
    where
        F: Fn(&SamplerSetup) -> anyhow::Result<Box<dyn Sampler>> + Send + Sync + 'static,
    {
        let label = label.into();
        validate_name(&label)?;
        Ok(Self {
            label,
            factory: Arc::new(factory),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Build a sampler; only call this inside a test run
    pub fn instantiate(&self, setup: &SamplerSetup) -> anyhow::Result<Box<dyn Sampler>> {
        (self.factory)(setup)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("label", &self.label).finish()
    }
}
