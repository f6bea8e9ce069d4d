//! AdaptLIPO: Lipschitz global search with an adaptive constant.
//!
//! Each iteration draws a uniform candidate; with probability `1 - p` the
//! candidate is re-drawn (up to a limit) while the Lipschitz envelope says it
//! cannot beat the incumbent. The constant estimate is the largest observed
//! slope rounded up to a power of `1 + α`, α = 0.01 / d.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::SearchOutcome;
use crate::models::{Direction, PacError, Parameter, Result, Sample, SearchConfig};
use crate::oracle::InteractiveOracle;
use crate::sampling::uniform_sample;

/// Iteration cap used when none is configured.
pub const DEFAULT_ITERATION_LIMIT: usize = 1000;

/// Best-value tolerance used when no criterion is configured at all.
pub const DEFAULT_VALUE_ABSOLUTE: f64 = 1e-8;

/// Convergence thresholds. The search continues while every configured
/// criterion still shows progress and stops as soon as one does not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingRule {
    pub iteration_limit: usize,
    pub value_absolute: Option<f64>,
    pub value_relative: Option<f64>,
    pub parameters_absolute: Option<f64>,
    pub parameters_relative: Option<f64>,
}

impl StoppingRule {
    pub fn from_config(config: &SearchConfig) -> Self {
        let value_absolute = if config.has_stopping_criterion() {
            config.value_absolute
        } else {
            Some(DEFAULT_VALUE_ABSOLUTE)
        };
        Self {
            iteration_limit: config.iteration_limit.unwrap_or(DEFAULT_ITERATION_LIMIT),
            value_absolute,
            value_relative: config.value_relative,
            parameters_absolute: config.parameters_absolute,
            parameters_relative: config.parameters_relative,
        }
    }

    fn can_improve(&self, iteration: usize, best: &Incumbent, second: Option<&Incumbent>) -> bool {
        if iteration >= self.iteration_limit {
            return false;
        }
        // Change-based criteria need a previous incumbent.
        let Some(second) = second else {
            return true;
        };

        let value_change = (best.value - second.value).abs();
        if self.value_absolute.is_some_and(|t| value_change < t) {
            return false;
        }
        if best.value != 0.0 && self.value_relative.is_some_and(|t| (value_change / best.value).abs() < t) {
            return false;
        }

        let point_change = distance(&best.point, &second.point);
        if self.parameters_absolute.is_some_and(|t| point_change < t) {
            return false;
        }
        let norm = best.point.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm != 0.0 && self.parameters_relative.is_some_and(|t| point_change / norm < t) {
            return false;
        }
        true
    }
}

/// Best (or second-best) point seen so far.
#[derive(Debug, Clone)]
struct Incumbent {
    /// Value in maximisation sign
    value: f64,
    /// Oracle value as reported
    raw: Decimal,
    point: Vec<f64>,
    sample: Sample,
    iteration: usize,
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Pointwise Lipschitz upper envelope `min_i (v_i + k·‖x − x_i‖)`.
fn upper_bound(seen: &[(Vec<f64>, f64)], x: &[f64], k: f64) -> f64 {
    seen.iter()
        .map(|(xi, vi)| vi + k * distance(xi, x))
        .fold(f64::INFINITY, f64::min)
}

fn coordinates(sample: &Sample) -> Result<Vec<f64>> {
    sample
        .point()
        .into_iter()
        .map(|v| {
            v.to_f64()
                .ok_or_else(|| PacError::Arithmetic(format!("{v} is not representable as a float")))
        })
        .collect()
}

/// AdaptLIPO searcher over a fixed parameter box.
pub struct AdaptLipo {
    parameters: Vec<Parameter>,
    direction: Direction,
    exploration: f64,
    exploitation_limit: usize,
    stopping: StoppingRule,
    rng: StdRng,
}

impl AdaptLipo {
    pub fn new(parameters: Vec<Parameter>, config: &SearchConfig) -> Result<Self> {
        if parameters.is_empty() {
            return Err(PacError::InvalidInput(
                "direct search needs at least one parameter".to_string(),
            ));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            parameters,
            direction: config.direction,
            exploration: config.exploration,
            exploitation_limit: config.exploitation_limit,
            stopping: StoppingRule::from_config(config),
            rng,
        })
    }

    pub fn stopping(&self) -> &StoppingRule {
        &self.stopping
    }

    /// Query one sample; `None` for an infinite value.
    async fn evaluate(
        &self,
        oracle: &dyn InteractiveOracle,
        sample: &Sample,
    ) -> Result<Option<(f64, Decimal)>> {
        let Some(raw) = oracle.check(&sample.to_constants()).await?.finite() else {
            return Ok(None);
        };
        let value = raw
            .to_f64()
            .ok_or_else(|| PacError::Arithmetic(format!("{raw} is not representable as a float")))?;
        let value = match self.direction {
            Direction::Max => value,
            Direction::Min => -value,
        };
        Ok(Some((value, raw)))
    }

    /// Run the search against a started oracle.
    pub async fn run(&mut self, oracle: &dyn InteractiveOracle) -> Result<SearchOutcome> {
        let alpha = 0.01 / self.parameters.len() as f64;
        let mut seen: Vec<(Vec<f64>, f64)> = Vec::new();
        let mut k = 0.0_f64;
        let mut k_est = 0.0_f64;

        let sample = uniform_sample(&mut self.rng, &self.parameters)?;
        let Some((value, raw)) = self.evaluate(oracle, &sample).await? else {
            info!(sample = %sample, "Infinite value; search aborted");
            return Ok(SearchOutcome::Infinite {
                point: sample.to_constants(),
            });
        };
        let point = coordinates(&sample)?;
        seen.push((point.clone(), value));
        let mut best = Incumbent {
            value,
            raw,
            point,
            sample,
            iteration: 0,
        };
        let mut second: Option<Incumbent> = None;

        let mut iteration = 1;
        while self.stopping.can_improve(iteration, &best, second.as_ref()) {
            let mut sample = uniform_sample(&mut self.rng, &self.parameters)?;
            let mut point = coordinates(&sample)?;

            if self.rng.gen::<f64>() > self.exploration {
                let mut redraws = 0;
                while redraws < self.exploitation_limit && upper_bound(&seen, &point, k) < best.value {
                    sample = uniform_sample(&mut self.rng, &self.parameters)?;
                    point = coordinates(&sample)?;
                    redraws += 1;
                }
                debug!(iteration, redraws, "Exploiting");
            } else {
                debug!(iteration, "Exploring");
            }

            let Some((value, raw)) = self.evaluate(oracle, &sample).await? else {
                info!(iteration, sample = %sample, "Infinite value; search aborted");
                return Ok(SearchOutcome::Infinite {
                    point: sample.to_constants(),
                });
            };

            for (xi, vi) in &seen {
                let d = distance(xi, &point);
                if d > 0.0 {
                    k_est = k_est.max((vi - value).abs() / d);
                }
            }
            if k_est > 0.0 {
                let base = 1.0 + alpha;
                k = base.powf((k_est.ln() / base.ln()).ceil());
            }
            debug!(iteration, value, k, "Lipschitz estimate");

            seen.push((point.clone(), value));
            if best.value < value {
                let previous = std::mem::replace(
                    &mut best,
                    Incumbent {
                        value,
                        raw,
                        point,
                        sample,
                        iteration,
                    },
                );
                second = Some(previous);
                info!(iteration, value = %raw, "New incumbent");
            }
            iteration += 1;
        }

        info!(
            value = %best.raw,
            point = %best.sample,
            iteration = best.iteration,
            evaluations = seen.len(),
            "Direct search complete"
        );
        Ok(SearchOutcome::Optimum {
            value: best.raw,
            point: best.sample.to_constants(),
            iteration: best.iteration,
            evaluations: seen.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_decimal, Constant, OracleResult};
    use async_trait::async_trait;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Evaluates `f(p)` and records every query.
    struct Recording {
        f: fn(f64) -> Option<f64>,
        calls: Mutex<Vec<Vec<Constant>>>,
    }

    impl Recording {
        fn new(f: fn(f64) -> Option<f64>) -> Self {
            Self {
                f,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<Constant>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InteractiveOracle for Recording {
        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn check(&self, sample: &[Constant]) -> Result<OracleResult> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(sample.to_vec());
                calls.len()
            };
            let p = parse_decimal(&sample[0].value)?.to_f64().unwrap();
            // The third query is infinite when `f` says so.
            Ok(match (self.f)(p) {
                None if n >= 3 => OracleResult::Infinite,
                None => OracleResult::Finite(Decimal::ZERO),
                Some(v) => OracleResult::Finite(Decimal::from_f64(v).unwrap()),
            })
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    fn params() -> Vec<Parameter> {
        vec![Parameter::new("p", dec!(0), dec!(1)).unwrap()]
    }

    fn config(direction: Direction, limit: usize) -> SearchConfig {
        SearchConfig {
            direction,
            iteration_limit: Some(limit),
            seed: Some(7),
            ..SearchConfig::default()
        }
    }

    #[tokio::test]
    async fn same_seed_same_queries() {
        let f = |p: f64| Some((p * 6.0).sin());
        let a = Recording::new(f);
        let b = Recording::new(f);
        let cfg = config(Direction::Max, 30);

        let first = AdaptLipo::new(params(), &cfg).unwrap().run(&a).await.unwrap();
        let second = AdaptLipo::new(params(), &cfg).unwrap().run(&b).await.unwrap();

        assert_eq!(a.calls(), b.calls());
        assert_eq!(a.calls().len(), 30);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn finds_interior_maximum() {
        let oracle = Recording::new(|p| Some(-(p - 0.3).powi(2)));
        let outcome = AdaptLipo::new(params(), &config(Direction::Max, 200))
            .unwrap()
            .run(&oracle)
            .await
            .unwrap();
        let SearchOutcome::Optimum { value, point, evaluations, .. } = outcome else {
            panic!("expected an optimum");
        };
        let p = parse_decimal(&point[0].value).unwrap().to_f64().unwrap();
        assert!((p - 0.3).abs() < 0.05, "p = {p}");
        assert!(value <= Decimal::ZERO);
        assert_eq!(evaluations, 200);
    }

    #[tokio::test]
    async fn minimisation_reports_value_with_its_sign() {
        let oracle = Recording::new(|p| Some((p - 0.7).powi(2) + 1.0));
        let outcome = AdaptLipo::new(params(), &config(Direction::Min, 200))
            .unwrap()
            .run(&oracle)
            .await
            .unwrap();
        let SearchOutcome::Optimum { value, .. } = outcome else {
            panic!("expected an optimum");
        };
        assert!(value >= dec!(1) && value < dec!(1.01), "value = {value}");
    }

    #[tokio::test]
    async fn infinite_value_aborts() {
        let oracle = Recording::new(|_| None);
        let outcome = AdaptLipo::new(params(), &config(Direction::Max, 100))
            .unwrap()
            .run(&oracle)
            .await
            .unwrap();
        assert!(matches!(outcome, SearchOutcome::Infinite { .. }));
        assert_eq!(oracle.calls().len(), 3);
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let rule = StoppingRule::from_config(&SearchConfig::default());
        assert_eq!(rule.iteration_limit, DEFAULT_ITERATION_LIMIT);
        assert_eq!(rule.value_absolute, Some(DEFAULT_VALUE_ABSOLUTE));

        let rule = StoppingRule::from_config(&SearchConfig {
            parameters_absolute: Some(0.1),
            ..SearchConfig::default()
        });
        assert_eq!(rule.value_absolute, None);
        assert_eq!(rule.iteration_limit, DEFAULT_ITERATION_LIMIT);
    }

    #[test]
    fn any_converged_criterion_stops() {
        let incumbent = |value: f64, x: f64| Incumbent {
            value,
            raw: Decimal::ZERO,
            point: vec![x],
            sample: Sample::from_values(&params(), vec![Decimal::ZERO]).unwrap(),
            iteration: 0,
        };
        let rule = StoppingRule {
            iteration_limit: 100,
            value_absolute: Some(0.01),
            value_relative: None,
            parameters_absolute: Some(0.5),
            parameters_relative: None,
        };
        let best = incumbent(1.0, 0.0);

        assert!(rule.can_improve(5, &best, None));
        assert!(!rule.can_improve(100, &best, None));
        // Value moved a lot, point moved a lot.
        assert!(rule.can_improve(5, &best, Some(&incumbent(0.5, 0.9))));
        // Value still moving, point settled.
        assert!(!rule.can_improve(5, &best, Some(&incumbent(0.5, 0.1))));
        // Point still moving, value settled.
        assert!(!rule.can_improve(5, &best, Some(&incumbent(0.999, 0.9))));
    }
}
