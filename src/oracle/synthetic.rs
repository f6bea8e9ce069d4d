//! In-process oracle evaluating a closed-form expression.
//!
//! Stands in for the model checker when benchmarking the pipeline or
//! testing it without external tools. Speaks both contracts.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Answers, BatchOracle, InteractiveOracle, Requests, Stage};
use crate::algebra::Expr;
use crate::models::{parse_decimal, Config, Constant, OracleResult, PacError, Result};

pub struct SyntheticOracle {
    expression: Expr,
    constants: BTreeMap<String, Decimal>,
    stage: Mutex<Stage>,
}

impl SyntheticOracle {
    /// `parameters` are the names samples will assign; every other
    /// identifier must be a numeric constant.
    pub fn new(expression: &str, parameters: &[String], constants: &[Constant]) -> Result<Self> {
        let expression = Expr::parse(expression)?;
        let constants: BTreeMap<String, Decimal> = constants
            .iter()
            .filter_map(|c| parse_decimal(&c.value).ok().map(|v| (c.name.clone(), v)))
            .collect();

        for ident in expression.identifiers() {
            if !parameters.iter().any(|p| p == ident) && !constants.contains_key(ident) {
                return Err(PacError::UndefinedIdentifier(ident.to_string()));
            }
        }

        Ok(Self {
            expression,
            constants,
            stage: Mutex::new(Stage::Initialize),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let expression = config.oracle.expression.as_deref().ok_or_else(|| {
            PacError::OracleState("the synthetic oracle needs an expression".to_string())
        })?;
        let parameters: Vec<String> = config.parameters.iter().map(|p| p.name.clone()).collect();
        Self::new(expression, &parameters, &config.constants())
    }

    fn evaluate(&self, sample: &[Constant]) -> Result<OracleResult> {
        let mut values = self.constants.clone();
        for constant in sample {
            values.insert(constant.name.clone(), parse_decimal(&constant.value)?);
        }
        let value = self.expression.evaluate(&|name| values.get(name).copied())?;
        Ok(OracleResult::Finite(value))
    }
}

#[async_trait]
impl BatchOracle for SyntheticOracle {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn check(&self, requests: &Requests) -> Result<Answers> {
        requests
            .iter()
            .map(|(&id, sample)| {
                let result = self.evaluate(sample)?;
                debug!(id, result = %result, "Synthetic result");
                Ok((id, result))
            })
            .collect()
    }
}

#[async_trait]
impl InteractiveOracle for SyntheticOracle {
    async fn start(&self) -> Result<()> {
        let mut stage = self.stage.lock().await;
        if *stage != Stage::Initialize {
            return Err(PacError::OracleState(
                "the model checker is not in the initialize stage".to_string(),
            ));
        }
        *stage = Stage::Started;
        Ok(())
    }

    async fn check(&self, sample: &[Constant]) -> Result<OracleResult> {
        if *self.stage.lock().await != Stage::Started {
            return Err(PacError::OracleState(
                "the model checker is not started".to_string(),
            ));
        }
        self.evaluate(sample)
    }

    async fn stop(&self) -> Result<()> {
        let mut stage = self.stage.lock().await;
        if *stage != Stage::Started {
            return Err(PacError::OracleState(
                "the model checker is not started".to_string(),
            ));
        }
        *stage = Stage::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn oracle() -> SyntheticOracle {
        SyntheticOracle::new(
            "k * p * (1 - p)",
            &["p".to_string()],
            &[Constant::new("k", "4"), Constant::new("label", "fast")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn batch_evaluates_every_request() {
        let requests: Requests = [
            (3, vec![Constant::new("p", "0.5")]),
            (8, vec![Constant::new("p", "0.25")]),
        ]
        .into_iter()
        .collect();
        let answers = BatchOracle::check(&oracle(), &requests).await.unwrap();
        assert_eq!(answers[&3], OracleResult::Finite(dec!(1)));
        assert_eq!(answers[&8], OracleResult::Finite(dec!(0.75)));
    }

    #[tokio::test]
    async fn interactive_requires_start() {
        let oracle = oracle();
        let sample = [Constant::new("p", "0.5")];
        assert!(InteractiveOracle::check(&oracle, &sample).await.is_err());
        oracle.start().await.unwrap();
        assert_eq!(
            InteractiveOracle::check(&oracle, &sample).await.unwrap(),
            OracleResult::Finite(dec!(1))
        );
        oracle.stop().await.unwrap();
        assert!(oracle.stop().await.is_err());
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = SyntheticOracle::new("p + r", &["p".to_string()], &[]).err().unwrap();
        assert!(matches!(err, PacError::UndefinedIdentifier(name) if name == "r"));
    }
}
