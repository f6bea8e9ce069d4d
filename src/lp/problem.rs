//! Typed-state LP builder.

use rust_decimal::{Decimal, MathematicalOps};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tracing::{debug, info};

use super::{zero_by_precision, LpProblem, LpSolver, Row, Sense, VariableBounds, LAMBDA};
use crate::models::{Direction, PacError, Result};

/// Stage marker: nothing set yet.
#[derive(Debug)]
pub struct Empty;

/// Stage marker: variables registered.
#[derive(Debug)]
pub struct WithVariables;

/// Stage marker: objective fixed, constraints may be added.
#[derive(Debug)]
pub struct Constraining;

/// LP under construction; the stage parameter only permits legal calls.
#[derive(Debug)]
pub struct LinearProgram<S> {
    problem: LpProblem,
    index: BTreeMap<String, usize>,
    factor: Decimal,
    precision: Decimal,
    _stage: PhantomData<S>,
}

/// Values of a solved LP, snapped by precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: BTreeMap<String, Decimal>,
}

impl Solution {
    pub fn lambda(&self) -> Decimal {
        self.values.get(LAMBDA).copied().unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.values.get(name).copied()
    }

    /// Every variable except lambda.
    pub fn coefficients(&self) -> BTreeMap<String, Decimal> {
        self.values
            .iter()
            .filter(|(name, _)| name.as_str() != LAMBDA)
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }
}

impl LinearProgram<Empty> {
    /// `scaling` k multiplies every constraint row by 10^k.
    pub fn new(scaling: u32, precision: Decimal) -> Result<Self> {
        let factor = Decimal::TEN
            .checked_powu(u64::from(scaling))
            .ok_or_else(|| PacError::InvalidInput(format!("scaling 10^{scaling} is too large")))?;
        Ok(Self {
            problem: LpProblem {
                variables: Vec::new(),
                bounds: Vec::new(),
                direction: Direction::Min,
                objective: Vec::new(),
                rows: Vec::new(),
            },
            index: BTreeMap::new(),
            factor,
            precision,
            _stage: PhantomData,
        })
    }

    /// Register lambda (bounded `[0, lambda_bound]`) then one free variable per coefficient.
    pub fn set_variables(
        mut self,
        lambda_bound: Option<Decimal>,
        coefficients: &[String],
    ) -> Result<LinearProgram<WithVariables>> {
        info!(coefficients = coefficients.len(), "Setting LP variables");
        self.push_variable(
            LAMBDA,
            VariableBounds {
                lower: Some(Decimal::ZERO),
                upper: lambda_bound,
            },
        )?;
        for name in coefficients {
            self.push_variable(name, VariableBounds::free())?;
        }
        Ok(self.advance())
    }

    fn push_variable(&mut self, name: &str, bounds: VariableBounds) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(PacError::InvalidInput(format!(
                "LP variable '{name}' registered twice"
            )));
        }
        self.index.insert(name.to_string(), self.problem.variables.len());
        self.problem.variables.push(name.to_string());
        self.problem.bounds.push(bounds);
        Ok(())
    }
}

impl LinearProgram<WithVariables> {
    /// Variables missing from `weights` get weight zero.
    pub fn set_objective(
        mut self,
        direction: Direction,
        weights: &BTreeMap<String, Decimal>,
    ) -> Result<LinearProgram<Constraining>> {
        self.problem.direction = direction;
        self.problem.objective = self.dense(weights, Decimal::ONE)?;
        Ok(self.advance())
    }

    /// The scenario objective: minimise lambda alone.
    pub fn minimize_lambda(self) -> Result<LinearProgram<Constraining>> {
        let weights = BTreeMap::from([(LAMBDA.to_string(), Decimal::ONE)]);
        self.set_objective(Direction::Min, &weights)
    }
}

impl LinearProgram<Constraining> {
    pub fn add_constraint(
        &mut self,
        terms: &BTreeMap<String, Decimal>,
        sense: Sense,
        bound: Decimal,
    ) -> Result<()> {
        let coefficients = self.dense(terms, self.factor)?;
        let bound = bound
            .checked_mul(self.factor)
            .ok_or_else(|| PacError::Arithmetic(format!("scaling bound {bound} overflows")))?;
        self.problem.rows.push(Row {
            coefficients,
            sense,
            bound,
        });
        Ok(())
    }

    pub fn constraints(&self) -> usize {
        self.problem.rows.len()
    }

    pub fn problem(&self) -> &LpProblem {
        &self.problem
    }

    /// Run the backend; `Ok(None)` when it found no solution.
    pub async fn solve(self, solver: &dyn LpSolver) -> Result<Option<Solution>> {
        info!(
            solver = solver.name(),
            variables = self.problem.variables.len(),
            constraints = self.problem.rows.len(),
            "Solving LP"
        );
        let Some(values) = solver.solve(&self.problem).await? else {
            info!("LP has no solution");
            return Ok(None);
        };
        if values.len() != self.problem.variables.len() {
            return Err(PacError::Lp(format!(
                "{} returned {} values for {} variables",
                solver.name(),
                values.len(),
                self.problem.variables.len()
            )));
        }

        let values: BTreeMap<String, Decimal> = self
            .problem
            .variables
            .into_iter()
            .zip(values)
            .map(|(name, value)| (name, zero_by_precision(value, self.precision)))
            .collect();
        debug!(values = ?values, "LP solution");
        Ok(Some(Solution { values }))
    }
}

impl<S> LinearProgram<S> {
    fn advance<T>(self) -> LinearProgram<T> {
        LinearProgram {
            problem: self.problem,
            index: self.index,
            factor: self.factor,
            precision: self.precision,
            _stage: PhantomData,
        }
    }

    /// Dense vector over the registered variables, every entry multiplied by `factor`.
    fn dense(&self, terms: &BTreeMap<String, Decimal>, factor: Decimal) -> Result<Vec<Decimal>> {
        let mut dense = vec![Decimal::ZERO; self.problem.variables.len()];
        for (name, value) in terms {
            let &i = self
                .index
                .get(name)
                .ok_or_else(|| PacError::InvalidInput(format!("unknown LP variable '{name}'")))?;
            dense[i] = value
                .checked_mul(factor)
                .ok_or_else(|| PacError::Arithmetic(format!("scaling {value} overflows")))?;
        }
        Ok(dense)
    }
}
