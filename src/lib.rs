//! driftcheck - functional regression testing for stochastic inference libraries
//!
//! Long-running stochastic experiments (MCMC samplers, optimisers on toy
//! problems with known answers) are run against successive revisions of a
//! library. Each run is stored as an immutable record keyed by test name
//! and revision, and a test passes when its divergence metrics have not
//! drifted from the baseline its author chose.

pub mod analysis;
pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod naming;
pub mod plot;
pub mod registry;
pub mod report;
pub mod result;
pub mod revision;
pub mod runner;
pub mod store;
pub mod suite;
pub mod test_case;

pub use error::{HarnessError, Result};
