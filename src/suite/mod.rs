//! Built-in functional tests
//!
//! - [`UniformNoise`]: synthetic metric with a known answer
//! - [`CommandTest`]: external command declared in `driftcheck.toml`
//! - [`SamplerKld`]: sampler convergence against a toy log-density, for
//!   embedders that link the library under test

pub mod command;
pub mod sampler_kld;
pub mod uniform_noise;

pub use command::{parse_result_line, CommandTest, LineError};
pub use sampler_kld::{SamplerKld, Schedule};
pub use uniform_noise::UniformNoise;

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::registry::TestRegistry;

/// Registry of the built-in synthetic test plus every configured command test
pub fn registry(config: &HarnessConfig) -> Result<TestRegistry> {
    let mut registry = TestRegistry::new();
    registry.add(Box::new(UniformNoise::builtin()?))?;
    for test in &config.command_test {
        registry.add(Box::new(CommandTest::from_config(test)?))?;
    }
    Ok(registry)
}
