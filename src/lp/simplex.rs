//! Built-in simplex solver.
//!
//! Scenario LPs have a few variables and thousands of rows, so the solver
//! works on the dual: one tableau row per variable and one column per
//! constraint row or finite bound. Primal values are the simplex multipliers
//! of the dual, read off the reduced costs of its artificial columns, and are
//! checked against every input row before they are returned.

use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::debug;

use super::{LpProblem, LpSolver, Sense};
use crate::models::{Direction, PacError, Result};

/// Reduced costs above `-OPTIMALITY_TOL` count as optimal.
const OPTIMALITY_TOL: f64 = 1e-9;
/// Pivot entries must exceed this share of the column's largest entry.
const PIVOT_TOL: f64 = 1e-9;
/// Slack granted by the ratio test in favour of larger pivots.
const HARRIS_TOL: f64 = 1e-11;
/// Relative violation tolerated when re-checking the solution.
const RESIDUAL_TOL: f64 = 1e-6;
/// Consecutive degenerate pivots before switching to Bland's rule.
const DEGENERATE_STREAK: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct SimplexSolver {
    /// Pivot budget per phase
    pub max_pivots: usize,
}

impl Default for SimplexSolver {
    fn default() -> Self {
        Self { max_pivots: 100_000 }
    }
}

/// `coefficients · x ≥ bound` over the problem variables.
#[derive(Debug, Clone)]
struct Inequality {
    coefficients: Vec<f64>,
    bound: f64,
}

enum Phase {
    Optimal,
    Unbounded,
}

struct Tableau {
    /// One row per equality, `columns + 1` entries; the last is the right-hand side
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    columns: usize,
}

impl Tableau {
    fn pivot(&mut self, r: usize, c: usize, cost: &mut [f64]) {
        let p = self.rows[r][c];
        for v in self.rows[r].iter_mut() {
            *v /= p;
        }
        let pivot_row = self.rows[r].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if i == r {
                continue;
            }
            let f = row[c];
            if f != 0.0 {
                for (v, pv) in row.iter_mut().zip(&pivot_row) {
                    *v -= f * pv;
                }
            }
        }
        let f = cost[c];
        if f != 0.0 {
            for (v, pv) in cost.iter_mut().zip(&pivot_row) {
                *v -= f * pv;
            }
        }
        self.basis[r] = c;
    }

    /// Most negative reduced cost, or the lowest index one under Bland's rule.
    fn entering(&self, cost: &[f64], allowed: &impl Fn(usize) -> bool, bland: bool) -> Option<usize> {
        let mut candidates = (0..self.columns).filter(|&j| allowed(j) && cost[j] < -OPTIMALITY_TOL);
        if bland {
            candidates.next()
        } else {
            candidates.min_by(|&a, &b| cost[a].total_cmp(&cost[b]))
        }
    }

    /// Harris ratio test: among rows within `HARRIS_TOL` of the minimum
    /// ratio take the largest pivot. Bland's rule takes the exact minimum
    /// with ties broken by the lowest basic index.
    fn leaving(&self, entering: usize, bland: bool) -> Option<usize> {
        let rhs = self.columns;
        let scale = self
            .rows
            .iter()
            .map(|row| row[entering].abs())
            .fold(0.0, f64::max);
        let threshold = PIVOT_TOL * scale.max(1.0);
        let eligible = || {
            self.rows
                .iter()
                .enumerate()
                .filter(move |(_, row)| row[entering] > threshold)
        };

        if bland {
            let min = eligible()
                .map(|(_, row)| row[rhs].max(0.0) / row[entering])
                .fold(f64::INFINITY, f64::min);
            return eligible()
                .filter(|(_, row)| row[rhs].max(0.0) / row[entering] <= min + HARRIS_TOL)
                .min_by_key(|&(i, _)| self.basis[i])
                .map(|(i, _)| i);
        }

        let bound = eligible()
            .map(|(_, row)| (row[rhs].max(0.0) + HARRIS_TOL) / row[entering])
            .fold(f64::INFINITY, f64::min);
        eligible()
            .filter(|(_, row)| row[rhs].max(0.0) / row[entering] <= bound)
            .max_by(|(_, a), (_, b)| a[entering].total_cmp(&b[entering]))
            .map(|(i, _)| i)
    }

    /// Minimise the reduced-cost row `cost` over the columns `allowed` admits.
    fn optimize(
        &mut self,
        cost: &mut [f64],
        allowed: impl Fn(usize) -> bool,
        max_pivots: usize,
    ) -> Result<Phase> {
        let rhs = self.columns;
        let mut degenerate = 0;
        for _ in 0..max_pivots {
            let bland = degenerate >= DEGENERATE_STREAK;
            let Some(entering) = self.entering(cost, &allowed, bland) else {
                return Ok(Phase::Optimal);
            };
            let Some(r) = self.leaving(entering, bland) else {
                return Ok(Phase::Unbounded);
            };

            if self.rows[r][rhs] <= HARRIS_TOL {
                degenerate += 1;
            } else {
                degenerate = 0;
            }
            self.pivot(r, entering, cost);
            // The ratio test may overshoot by at most HARRIS_TOL.
            for row in &mut self.rows {
                if row[rhs] < 0.0 {
                    row[rhs] = 0.0;
                }
            }
        }
        Err(PacError::Lp(format!(
            "simplex exceeded {max_pivots} pivots"
        )))
    }
}

fn to_f64(value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| PacError::Lp(format!("{value} is not representable as a float")))
}

/// Every row and finite bound as a `≥` inequality.
fn inequalities(problem: &LpProblem) -> Result<Vec<Inequality>> {
    let n = problem.variables.len();
    let mut out = Vec::with_capacity(problem.rows.len() + n);
    for row in &problem.rows {
        let sign = match row.sense {
            Sense::Ge => 1.0,
            Sense::Le => -1.0,
        };
        out.push(Inequality {
            coefficients: row
                .coefficients
                .iter()
                .map(|a| Ok(sign * to_f64(*a)?))
                .collect::<Result<_>>()?,
            bound: sign * to_f64(row.bound)?,
        });
    }
    for (j, bounds) in problem.bounds.iter().enumerate() {
        let unit = |sign: f64| {
            let mut coefficients = vec![0.0; n];
            coefficients[j] = sign;
            coefficients
        };
        if let Some(lower) = bounds.lower {
            out.push(Inequality {
                coefficients: unit(1.0),
                bound: to_f64(lower)?,
            });
        }
        if let Some(upper) = bounds.upper {
            out.push(Inequality {
                coefficients: unit(-1.0),
                bound: -to_f64(upper)?,
            });
        }
    }
    Ok(out)
}

/// Re-evaluate every inequality at `x`.
fn check_residuals(inequalities: &[Inequality], x: &[f64]) -> Result<()> {
    for (k, inequality) in inequalities.iter().enumerate() {
        let mut lhs = 0.0;
        let mut magnitude = 1.0 + inequality.bound.abs();
        for (a, v) in inequality.coefficients.iter().zip(x) {
            lhs += a * v;
            magnitude += (a * v).abs();
        }
        let violation = inequality.bound - lhs;
        if violation > RESIDUAL_TOL * magnitude {
            return Err(PacError::Lp(format!(
                "simplex solution violates constraint {k} by {violation:e}"
            )));
        }
    }
    Ok(())
}

impl SimplexSolver {
    fn solve_dense(&self, problem: &LpProblem) -> Result<Option<Vec<Decimal>>> {
        let n = problem.variables.len();
        // Work on `min c·x`.
        let sign = match problem.direction {
            Direction::Min => 1.0,
            Direction::Max => -1.0,
        };
        let objective: Vec<f64> = problem
            .objective
            .iter()
            .map(|c| Ok(sign * to_f64(*c)?))
            .collect::<Result<_>>()?;
        let inequalities = inequalities(problem)?;

        // Dual: min -b·y s.t. Aᵀy = c, y ≥ 0. Row j is scaled so its
        // right-hand side is non-negative and starts with an artificial basic.
        let m = inequalities.len();
        let art0 = m;
        let columns = m + n;
        let signs: Vec<f64> = objective
            .iter()
            .map(|c| if *c < 0.0 { -1.0 } else { 1.0 })
            .collect();
        let mut tableau = Tableau {
            rows: Vec::with_capacity(n),
            basis: (art0..columns).collect(),
            columns,
        };
        for j in 0..n {
            let mut row = vec![0.0; columns + 1];
            for (k, inequality) in inequalities.iter().enumerate() {
                row[k] = signs[j] * inequality.coefficients[j];
            }
            row[art0 + j] = 1.0;
            row[columns] = signs[j] * objective[j];
            tableau.rows.push(row);
        }

        // Phase 1: minimise the sum of artificials.
        let mut cost = vec![0.0; columns + 1];
        for c in &mut cost[art0..columns] {
            *c = 1.0;
        }
        for row in &tableau.rows {
            for (c, v) in cost.iter_mut().zip(row) {
                *c -= v;
            }
        }
        tableau.optimize(&mut cost, |_| true, self.max_pivots)?;
        let infeasibility = -cost[columns];
        let scale = 1.0 + objective.iter().map(|c| c.abs()).sum::<f64>();
        if infeasibility > RESIDUAL_TOL * scale {
            debug!(infeasibility, "LP is unbounded or infeasible");
            return Ok(None);
        }

        // Drive artificials out of the basis where a real pivot exists;
        // the rest belong to redundant equalities.
        let mut scratch = vec![0.0; columns + 1];
        for r in 0..n {
            if tableau.basis[r] < art0 {
                continue;
            }
            let best = (0..art0)
                .filter(|&k| tableau.rows[r][k].abs() > PIVOT_TOL)
                .max_by(|&a, &b| tableau.rows[r][a].abs().total_cmp(&tableau.rows[r][b].abs()));
            if let Some(k) = best {
                tableau.pivot(r, k, &mut scratch);
            }
        }

        // Phase 2 on the dual objective.
        let mut cost = vec![0.0; columns + 1];
        for (c, inequality) in cost.iter_mut().zip(&inequalities) {
            *c = -inequality.bound;
        }
        for (i, row) in tableau.rows.iter().enumerate() {
            let cb = cost[tableau.basis[i]];
            if cb != 0.0 {
                for (c, v) in cost.iter_mut().zip(row) {
                    *c -= cb * v;
                }
            }
        }
        if let Phase::Unbounded = tableau.optimize(&mut cost, |j| j < art0, self.max_pivots)? {
            debug!("LP is infeasible");
            return Ok(None);
        }

        // Multipliers of the dual rows are the primal values.
        let x: Vec<f64> = (0..n).map(|j| signs[j] * cost[art0 + j]).collect();
        check_residuals(&inequalities, &x)?;
        let primal: f64 = objective.iter().zip(&x).map(|(c, v)| c * v).sum();
        let dual = cost[columns];
        if (primal - dual).abs() > RESIDUAL_TOL * (1.0 + dual.abs()) {
            return Err(PacError::Lp(format!(
                "simplex duality gap {:e} between {primal} and {dual}",
                primal - dual
            )));
        }
        debug!(rows = problem.rows.len(), variables = n, objective = primal, "Simplex solved");

        x.into_iter()
            .map(|v| {
                Decimal::from_f64(v)
                    .ok_or_else(|| PacError::Lp(format!("solution value {v} is not a decimal")))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[async_trait]
impl LpSolver for SimplexSolver {
    fn name(&self) -> &'static str {
        "simplex"
    }

    async fn solve(&self, problem: &LpProblem) -> Result<Option<Vec<Decimal>>> {
        self.solve_dense(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{Row, VariableBounds};
    use rust_decimal_macros::dec;

    fn close(value: Decimal, expected: f64) -> bool {
        (value.to_f64().unwrap() - expected).abs() < 1e-7
    }

    fn problem(bounds: Vec<VariableBounds>, objective: Vec<Decimal>, rows: Vec<Row>) -> LpProblem {
        LpProblem {
            variables: (0..bounds.len()).map(|i| format!("x{i}")).collect(),
            bounds,
            direction: Direction::Min,
            objective,
            rows,
        }
    }

    fn row(coefficients: Vec<Decimal>, sense: Sense, bound: Decimal) -> Row {
        Row {
            coefficients,
            sense,
            bound,
        }
    }

    #[tokio::test]
    async fn free_variables_two_ge_rows() {
        let lp = problem(
            vec![VariableBounds::free(), VariableBounds::free()],
            vec![dec!(1), dec!(1)],
            vec![
                row(vec![dec!(1), dec!(2)], Sense::Ge, dec!(4)),
                row(vec![dec!(3), dec!(1)], Sense::Ge, dec!(6)),
            ],
        );
        let x = SimplexSolver::default().solve(&lp).await.unwrap().unwrap();
        assert!(close(x[0], 1.6), "x = {}", x[0]);
        assert!(close(x[1], 1.2), "y = {}", x[1]);
    }

    #[tokio::test]
    async fn maximise_with_upper_bound() {
        let mut lp = problem(
            vec![VariableBounds {
                lower: Some(dec!(0)),
                upper: Some(dec!(3)),
            }],
            vec![dec!(2)],
            vec![row(vec![dec!(1)], Sense::Le, dec!(10))],
        );
        lp.direction = Direction::Max;
        let x = SimplexSolver::default().solve(&lp).await.unwrap().unwrap();
        assert!(close(x[0], 3.0));
    }

    #[tokio::test]
    async fn infeasible_is_none() {
        let lp = problem(
            vec![VariableBounds {
                lower: Some(dec!(0)),
                upper: Some(dec!(1)),
            }],
            vec![dec!(1)],
            vec![row(vec![dec!(1)], Sense::Ge, dec!(2))],
        );
        assert!(SimplexSolver::default().solve(&lp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unbounded_is_none() {
        let lp = problem(
            vec![VariableBounds::free()],
            vec![dec!(1)],
            vec![row(vec![dec!(1)], Sense::Le, dec!(5))],
        );
        assert!(SimplexSolver::default().solve(&lp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chebyshev_fit_of_a_line() {
        // min λ s.t. |a + b·t - y| ≤ λ over (0,0), (1,1), (2,4):
        // best line is y = -0.5 + 2t with λ = 0.5.
        let points = [(dec!(0), dec!(0)), (dec!(1), dec!(1)), (dec!(2), dec!(4))];
        let mut rows = Vec::new();
        for (t, y) in points {
            rows.push(row(vec![dec!(1), dec!(1), t], Sense::Ge, y));
            rows.push(row(vec![dec!(-1), dec!(1), t], Sense::Le, y));
        }
        let lp = problem(
            vec![
                VariableBounds {
                    lower: Some(dec!(0)),
                    upper: None,
                },
                VariableBounds::free(),
                VariableBounds::free(),
            ],
            vec![dec!(1), dec!(0), dec!(0)],
            rows,
        );
        let x = SimplexSolver::default().solve(&lp).await.unwrap().unwrap();
        assert!(close(x[0], 0.5), "lambda = {}", x[0]);
        assert!(close(x[1], -0.5));
        assert!(close(x[2], 2.0));
    }

    #[tokio::test]
    async fn thousands_of_rows_fit_to_the_residual() {
        // Degree-5 minimax fit of sqrt(t) on 1500 points: 3000 rows.
        let points: Vec<(f64, f64)> = (0..1500)
            .map(|i| {
                let t = f64::from(i) / 1499.0;
                (t, t.sqrt())
            })
            .collect();
        let mut rows = Vec::new();
        for &(t, y) in &points {
            let mut terms = vec![Decimal::ONE];
            terms.extend((0..=5).map(|k| Decimal::from_f64(t.powi(k)).unwrap()));
            let y = Decimal::from_f64(y).unwrap();
            rows.push(row(terms.clone(), Sense::Ge, y));
            terms[0] = dec!(-1);
            rows.push(row(terms, Sense::Le, y));
        }
        let mut bounds = vec![VariableBounds {
            lower: Some(dec!(0)),
            upper: None,
        }];
        bounds.extend((0..=5).map(|_| VariableBounds::free()));
        let mut objective = vec![dec!(1)];
        objective.extend((0..=5).map(|_| dec!(0)));
        let lp = problem(bounds, objective, rows);

        let x = SimplexSolver::default().solve(&lp).await.unwrap().unwrap();
        let x: Vec<f64> = x.iter().map(|v| v.to_f64().unwrap()).collect();
        let worst = points
            .iter()
            .map(|&(t, y)| {
                let fitted: f64 = (0..=5).map(|k| x[k as usize + 1] * t.powi(k)).sum();
                (fitted - y).abs()
            })
            .fold(0.0, f64::max);
        assert!(x[0] > 0.0);
        assert!((worst - x[0]).abs() < 1e-6, "worst = {worst}, lambda = {}", x[0]);
    }

    #[test]
    fn residual_check_rejects_violations() {
        let inequalities = vec![Inequality {
            coefficients: vec![1.0, 1.0],
            bound: 2.0,
        }];
        assert!(check_residuals(&inequalities, &[1.0, 1.0]).is_ok());
        let err = check_residuals(&inequalities, &[1.0, 0.5]).unwrap_err();
        assert!(matches!(err, PacError::Lp(m) if m.contains("constraint 0")));
    }
}
