//! Sample generation.
//!
//! Epistemic foundation:
//! - K_i: Vertex enumeration is exhaustive (2^k points)
//! - K_i: Random samples are reproducible under a fixed seed
//! - I^R: Sample count comes from config or from the PAC bound

mod pac;
mod random;
mod vertex;

pub use pac::*;
pub use random::*;
pub use vertex::*;

use rand::Rng;
use serde::Serialize;

use crate::models::{PacError, Parameter, Result, Sample, ScenarioConfig, VertexMode};

/// How many samples of each kind a scenario run draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplePlan {
    /// Samples requested: explicit, or the PAC bound
    pub requested: usize,
    /// Vertex and boundary samples
    pub vertices: usize,
    /// Uniform random samples
    pub random: usize,
}

impl SamplePlan {
    /// `coefficients` is the number of LP decision variables, λ included.
    pub fn new(
        config: &ScenarioConfig,
        parameters: usize,
        coefficients: usize,
    ) -> Result<Self> {
        let requested = config
            .samples
            .unwrap_or_else(|| minimum_number_samples(config.epsilon, config.eta, coefficients));

        let vertices = match config.vertices {
            VertexMode::None => 0,
            VertexMode::Replace | VertexMode::Additive => {
                vertex_count(parameters, config.boundary_points).ok_or_else(|| {
                    PacError::InvalidInput(format!("too many vertices for {parameters} parameters"))
                })?
            }
        };

        let random = match config.vertices {
            VertexMode::Replace => requested.saturating_sub(vertices),
            VertexMode::None | VertexMode::Additive => requested,
        };

        Ok(Self {
            requested,
            vertices,
            random,
        })
    }

    pub fn total(&self) -> usize {
        self.vertices + self.random
    }

    /// Vertices first, then random samples.
    pub fn generate<R: Rng>(
        &self,
        rng: &mut R,
        parameters: &[Parameter],
        boundary_points: usize,
    ) -> Result<Vec<Sample>> {
        let mut samples = Vec::with_capacity(self.total());
        if self.vertices > 0 {
            samples.extend(vertex_samples(parameters, boundary_points)?);
        }
        samples.extend(random_samples(rng, parameters, self.random)?);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn params() -> Vec<Parameter> {
        vec![
            Parameter::new("p", dec!(0), dec!(1)).unwrap(),
            Parameter::new("q", dec!(0), dec!(1)).unwrap(),
        ]
    }

    #[test]
    fn pac_bound_when_samples_unset() {
        let plan = SamplePlan::new(&ScenarioConfig::default(), 2, 0).unwrap();
        assert_eq!(plan.requested, 120);
        assert_eq!(plan.total(), 120);
    }

    #[test]
    fn replace_mode_counts_vertices_against_budget() {
        let config = ScenarioConfig {
            samples: Some(10),
            vertices: VertexMode::Replace,
            ..ScenarioConfig::default()
        };
        let plan = SamplePlan::new(&config, 2, 7).unwrap();
        assert_eq!((plan.vertices, plan.random, plan.total()), (4, 6, 10));

        let samples = plan
            .generate(&mut StdRng::seed_from_u64(1), &params(), 0)
            .unwrap();
        assert_eq!(samples.len(), 10);
        assert_eq!(samples[0].point(), vec![dec!(0), dec!(0)]);
    }

    #[test]
    fn additive_mode_adds_vertices() {
        let config = ScenarioConfig {
            samples: Some(10),
            vertices: VertexMode::Additive,
            ..ScenarioConfig::default()
        };
        let plan = SamplePlan::new(&config, 2, 7).unwrap();
        assert_eq!(plan.total(), 14);
    }
}
