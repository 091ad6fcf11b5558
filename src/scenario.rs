use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::driver::Driver;
use crate::model::{Model, Observation};
use crate::scoreboard::Scoreboard;
use crate::TbResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Bit(bool),
    /// Reset pulse of the given number of cycles in the middle of the stream.
    Reset(u32),
}

/// A named, ordered stimulus stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: &str, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            steps,
        }
    }

    /// Any non-zero entry is a 1.
    pub fn from_bits(name: &str, bits: &[u8]) -> Self {
        Self::new(name, bits.iter().map(|b| Step::Bit(*b != 0)).collect())
    }

    /// `len` uniformly random bits; the same seed gives the same stream.
    pub fn random(name: &str, len: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(name, (0..len).map(|_| Step::Bit(rng.gen())).collect())
    }

    pub fn then_reset(mut self, cycles: u32) -> Self {
        self.steps.push(Step::Reset(cycles));
        self
    }

    pub fn then_bits(mut self, bits: &[u8]) -> Self {
        self.steps.extend(bits.iter().map(|b| Step::Bit(*b != 0)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Model prediction, one observation per step, starting from the post-reset state.
    pub fn expected(&self) -> Vec<Observation> {
        let mut model = Model::new();
        self.steps
            .iter()
            .map(|step| match step {
                Step::Bit(bit) => model.step(*bit),
                Step::Reset(_) => model.reset(),
            })
            .collect()
    }
}

/// Feeds `scenario` through `driver` and checks every observation against the model.
///
/// Protocol and setup errors abort at once. Mismatches are collected over all steps and
/// returned together.
pub async fn run_scenario(driver: &Driver, scenario: &Scenario) -> TbResult<Vec<Observation>> {
    info!(scenario = %scenario.name, steps = scenario.len(), "running scenario");
    let mut scoreboard = Scoreboard::new();
    for obs in scenario.expected() {
        scoreboard.add_exp(obs);
    }
    for (index, step) in scenario.steps.iter().enumerate() {
        let obs = match *step {
            Step::Bit(bit) => driver.apply_and_sample(bit).await?,
            Step::Reset(cycles) => driver.reset(cycles).await?,
        };
        debug!(index, ?step, output = obs.output, code = obs.code, "step observed");
        scoreboard.add_recv(obs);
    }
    debug!(scenario = %scenario.name, "{}", scoreboard.result_str());
    Ok(scoreboard.finish(&scenario.name)?)
}
