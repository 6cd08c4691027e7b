//! Synthetic test with a known answer
//!
//! Draws `y = center + U(-half_width, half_width)` from the run seed. It
//! exercises the whole harness without a library checkout.

use crate::analysis::not_deviated;
use crate::error::Result;
use crate::naming::TestName;
use crate::plot::{self, Figure};
use crate::result::{ResultHistory, Status, TestResult};
use crate::test_case::{RunContext, TestCase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct UniformNoise {
    name: TestName,
    center: f64,
    half_width: f64,
}

impl UniformNoise {
    pub fn new(name: TestName, center: f64, half_width: f64) -> Self {
        Self {
            name,
            center,
            half_width: half_width.abs(),
        }
    }

    /// `uniform_noise`: y = 1 ± 0.25
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(TestName::new("uniform_noise")?, 1.0, 0.25))
    }
}

impl TestCase for UniformNoise {
    fn name(&self) -> &TestName {
        &self.name
    }

    fn run(&self, result: &mut TestResult, ctx: &RunContext) -> anyhow::Result<()> {
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let y = self.center + rng.gen_range(-self.half_width..=self.half_width);
        tracing::debug!(y, "Drew sample");

        result.set("y", y)?;
        result.set_status(Status::Done);
        Ok(())
    }

    fn analyze(&self, history: &ResultHistory) -> Result<bool> {
        not_deviated(self.center, self.half_width, history, "y")
    }

    fn tracked_fields(&self) -> Vec<&str> {
        vec!["y"]
    }

    fn plot(&self, history: &ResultHistory) -> Result<Vec<Figure>> {
        Ok(vec![plot::variable(
            history,
            "y",
            "Uniform noise",
            "y",
            Some(self.center + self.half_width),
        )?])
    }
}
