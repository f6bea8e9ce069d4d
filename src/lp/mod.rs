//! Linear programming for the scenario fit.
//!
//! Epistemic foundation:
//! - K_i: Stage order is variables → objective → constraints → solve,
//!   enforced by the type of `LinearProgram`
//! - K_i: Variable "lambda" is always first and bounded below by zero
//! - B_i: The backend may find no solution → `Ok(None)`, not an error
//! - I^R: Backend, precision and scaling come from `[lp]`

mod octave;
mod problem;
mod simplex;

pub use octave::*;
pub use problem::*;
pub use simplex::*;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Direction, LpBackend, LpConfig, Result};

/// Reserved name of the margin variable.
pub const LAMBDA: &str = "lambda";

/// Comparison of a constraint row against its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    /// `row ≥ bound`
    Ge,
    /// `row ≤ bound`
    Le,
}

/// Box bounds of one LP variable; `None` is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VariableBounds {
    pub lower: Option<Decimal>,
    pub upper: Option<Decimal>,
}

impl VariableBounds {
    pub fn free() -> Self {
        Self::default()
    }
}

/// One dense constraint row, aligned with `LpProblem::variables`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub coefficients: Vec<Decimal>,
    pub sense: Sense,
    pub bound: Decimal,
}

/// Fully built problem as handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LpProblem {
    pub variables: Vec<String>,
    pub bounds: Vec<VariableBounds>,
    pub direction: Direction,
    pub objective: Vec<Decimal>,
    pub rows: Vec<Row>,
}

/// LP backend contract.
///
/// Returns one value per variable in `problem.variables` order, or `None`
/// when the problem is infeasible, unbounded or the backend gave up.
#[async_trait]
pub trait LpSolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn solve(&self, problem: &LpProblem) -> Result<Option<Vec<Decimal>>>;
}

/// Build the configured backend.
pub fn lp_solver(config: &LpConfig) -> Box<dyn LpSolver> {
    match config.solver {
        LpBackend::Simplex => Box::new(SimplexSolver::default()),
        LpBackend::Octave => Box::new(OctaveSolver::new(config.octave_path.clone())),
    }
}

/// Snap solver noise to zero.
pub fn zero_by_precision(value: Decimal, precision: Decimal) -> Decimal {
    if value.abs() <= precision {
        Decimal::ZERO
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapping() {
        let precision = dec!(0.000000001);
        assert_eq!(zero_by_precision(dec!(0.0000000004), precision), Decimal::ZERO);
        assert_eq!(zero_by_precision(dec!(-0.000000001), precision), Decimal::ZERO);
        assert_eq!(zero_by_precision(dec!(0.25), precision), dec!(0.25));
    }

    #[test]
    fn configured_backend() {
        let mut config = LpConfig::default();
        assert_eq!(lp_solver(&config).name(), "simplex");
        config.solver = LpBackend::Octave;
        assert_eq!(lp_solver(&config).name(), "octave");
    }
}
