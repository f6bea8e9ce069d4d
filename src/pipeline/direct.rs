//! Direct optimisation pipeline.
//!
//! Pipeline flow:
//! Interactive Oracle (start) → AdaptLIPO → Interactive Oracle (stop)

use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

use crate::models::{Config, Direction, Result};
use crate::oracle::InteractiveOracle;
use crate::search::{AdaptLipo, SearchOutcome};

/// Search outcome plus timing.
#[derive(Debug, Clone, Serialize)]
pub struct DirectReport {
    pub direction: Direction,
    pub outcome: SearchOutcome,
    pub runtime_secs: f64,
}

impl fmt::Display for DirectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SearchOutcome::Optimum {
                value,
                point,
                iteration,
                ..
            } => {
                let point: Vec<String> = point.iter().map(|c| c.to_string()).collect();
                writeln!(f, "Optimal value: {}", value.normalize())?;
                writeln!(f, "Coordinates of optimal value: [{}]", point.join(", "))?;
                write!(f, "Iteration of optimal value: {iteration}")
            }
            SearchOutcome::Infinite { point } => {
                let point: Vec<String> = point.iter().map(|c| c.to_string()).collect();
                write!(f, "Optimal value: infinity (at [{}])", point.join(", "))
            }
        }
    }
}

/// AdaptLIPO against one interactive oracle.
pub struct DirectPipeline {
    config: Config,
}

impl DirectPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the oracle, search, and stop it again even when the search fails.
    pub async fn run(&self, oracle: &dyn InteractiveOracle) -> Result<DirectReport> {
        let start = Instant::now();
        let mut search = AdaptLipo::new(self.config.parameter_space()?, &self.config.search)?;
        info!(
            direction = ?self.config.search.direction,
            iteration_limit = search.stopping().iteration_limit,
            "Starting direct search"
        );

        oracle.start().await?;
        let searched = search.run(oracle).await;
        let stopped = oracle.stop().await;

        let outcome = match (searched, stopped) {
            (Ok(outcome), Ok(())) => outcome,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), stopped) => {
                if let Err(stop_error) = stopped {
                    warn!(error = %stop_error, "Stopping the model checker also failed");
                }
                return Err(e);
            }
        };

        Ok(DirectReport {
            direction: self.config.search.direction,
            outcome,
            runtime_secs: start.elapsed().as_secs_f64(),
        })
    }
}
