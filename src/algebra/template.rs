//! Template functions: the coefficient-bearing families being fitted.
//!
//! Epistemic foundation:
//! - K_i: `evaluate` returns exactly the identifiers of `coefficients`
//! - K_i: the pipeline only talks to `dyn TemplateFunction`
//! - I^R: polynomial degree or user term list come from config

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Expr, Polynomial, VariableRegistry};
use crate::models::{
    parse_decimal, Constant, ExpressionFormat, PacError, Result, Sample, ScenarioConfig,
};

/// A linear family `Σ coeff_i · term_i(θ)`.
pub trait TemplateFunction: Send + Sync {
    /// Coefficient identifiers, in printing order.
    fn coefficients(&self) -> Vec<String>;

    /// `{coefficient id → term value at sample}`.
    fn evaluate(&self, sample: &Sample) -> Result<BTreeMap<String, Decimal>>;

    /// Pretty-print the fitted function given solved coefficient values.
    fn render(&self, values: &BTreeMap<String, Decimal>, format: ExpressionFormat)
        -> Result<String>;

    fn latex(&self, values: &BTreeMap<String, Decimal>) -> Result<String> {
        self.render(values, ExpressionFormat::Latex)
    }

    fn math(&self, values: &BTreeMap<String, Decimal>) -> Result<String> {
        self.render(values, ExpressionFormat::Math)
    }

    fn matlab(&self, values: &BTreeMap<String, Decimal>) -> Result<String> {
        self.render(values, ExpressionFormat::Matlab)
    }

    /// Value of the fitted function at `sample`.
    fn value_at(&self, sample: &Sample, values: &BTreeMap<String, Decimal>) -> Result<Decimal> {
        let terms = self.evaluate(sample)?;
        let mut total = Decimal::ZERO;
        for (id, term) in terms {
            let coeff = coefficient(values, &id)?;
            total = coeff
                .checked_mul(term)
                .and_then(|p| total.checked_add(p))
                .ok_or_else(|| PacError::Arithmetic("overflow evaluating template".to_string()))?;
        }
        Ok(total)
    }
}

/// Look up a solved coefficient; a missing one is a bug in the caller.
pub(crate) fn coefficient(values: &BTreeMap<String, Decimal>, id: &str) -> Result<Decimal> {
    values
        .get(id)
        .copied()
        .ok_or_else(|| PacError::Internal(format!("no value for coefficient '{id}'")))
}

/// Append `value · term` with the sign folded into the separator.
pub(crate) fn push_signed(out: &mut String, value: Decimal, term: &str, times: &str) {
    if value.is_sign_negative() && !value.is_zero() {
        out.push_str(" - ");
    } else {
        out.push_str(" + ");
    }
    out.push_str(&value.abs().normalize().to_string());
    out.push_str(times);
    out.push_str(term);
}

pub(crate) fn times_symbol(format: ExpressionFormat) -> &'static str {
    match format {
        ExpressionFormat::Latex => " \\cdot ",
        ExpressionFormat::Math => " * ",
        ExpressionFormat::Matlab => " .* ",
    }
}

/// User-defined template: one coefficient `term_<i>` per expression.
#[derive(Debug, Clone)]
pub struct ExpressionFunction {
    registry: VariableRegistry,
    constants: BTreeMap<String, Decimal>,
    terms: Vec<Expr>,
}

impl ExpressionFunction {
    /// Parse `terms` (comma-separated) and check every identifier resolves.
    pub fn new(
        terms: &str,
        registry: VariableRegistry,
        constants: &[Constant],
    ) -> Result<Self> {
        let terms = Expr::parse_terms(terms)?;
        let mut numeric = BTreeMap::new();
        for constant in constants {
            // Non-numeric constants are only usable by the model checker.
            if let Ok(value) = parse_decimal(&constant.value) {
                numeric.insert(constant.name.clone(), value);
            }
        }

        for term in &terms {
            for ident in term.identifiers() {
                if registry.index_of(ident).is_none() && !numeric.contains_key(ident) {
                    return Err(PacError::UndefinedIdentifier(ident.to_string()));
                }
            }
        }

        Ok(Self {
            registry,
            constants: numeric,
            terms,
        })
    }

    pub fn terms(&self) -> &[Expr] {
        &self.terms
    }

    fn id(index: usize) -> String {
        format!("term_{index}")
    }
}

impl TemplateFunction for ExpressionFunction {
    fn coefficients(&self) -> Vec<String> {
        (0..self.terms.len()).map(Self::id).collect()
    }

    fn evaluate(&self, sample: &Sample) -> Result<BTreeMap<String, Decimal>> {
        let lookup = |name: &str| -> Option<Decimal> {
            if self.registry.index_of(name).is_some() {
                sample.get(name)
            } else {
                self.constants.get(name).copied()
            }
        };
        self.terms
            .iter()
            .enumerate()
            .map(|(i, term)| Ok((Self::id(i), term.evaluate(&lookup)?)))
            .collect()
    }

    fn render(
        &self,
        values: &BTreeMap<String, Decimal>,
        format: ExpressionFormat,
    ) -> Result<String> {
        let times = times_symbol(format);
        let mut out = String::new();
        for (i, term) in self.terms.iter().enumerate() {
            let value = coefficient(values, &Self::id(i))?;
            let text = if term.is_additive() {
                match format {
                    ExpressionFormat::Latex => format!("\\left({}\\right)", term.render(format)),
                    _ => format!("({})", term.render(format)),
                }
            } else {
                term.render(format)
            };
            if i == 0 {
                out.push_str(&value.normalize().to_string());
                out.push_str(times);
                out.push_str(&text);
            } else {
                push_signed(&mut out, value, &text, times);
            }
        }
        Ok(out)
    }
}

/// Build the configured template: user terms when given, else a polynomial.
pub fn build_template(
    scenario: &ScenarioConfig,
    registry: VariableRegistry,
    constants: &[Constant],
) -> Result<Arc<dyn TemplateFunction>> {
    match &scenario.template {
        Some(terms) => Ok(Arc::new(ExpressionFunction::new(terms, registry, constants)?)),
        None => Ok(Arc::new(Polynomial::new(registry, scenario.degree))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Parameter;
    use rust_decimal_macros::dec;

    fn space() -> (Vec<Parameter>, VariableRegistry) {
        let params = vec![
            Parameter::new("p", dec!(0), dec!(1)).unwrap(),
            Parameter::new("q", dec!(0), dec!(1)).unwrap(),
        ];
        let registry = VariableRegistry::from_parameters(&params).unwrap();
        (params, registry)
    }

    #[test]
    fn expression_template_evaluates_each_term() {
        let (params, registry) = space();
        let f = ExpressionFunction::new(
            "1, p * q, ceil(N * p)",
            registry,
            &[Constant::new("N", "10")],
        )
        .unwrap();
        assert_eq!(f.coefficients(), vec!["term_0", "term_1", "term_2"]);

        let sample = Sample::from_values(&params, vec![dec!(0.25), dec!(0.5)]).unwrap();
        let values = f.evaluate(&sample).unwrap();
        assert_eq!(values.keys().cloned().collect::<Vec<_>>(), f.coefficients());
        assert_eq!(values["term_0"], dec!(1));
        assert_eq!(values["term_1"], dec!(0.125));
        assert_eq!(values["term_2"], dec!(3));
    }

    #[test]
    fn unknown_identifier_fails_before_sampling() {
        let (_, registry) = space();
        let err = ExpressionFunction::new("p, r", registry, &[]).unwrap_err();
        assert!(matches!(err, PacError::UndefinedIdentifier(name) if name == "r"));
    }

    #[test]
    fn expression_template_renders_signed_terms() {
        let (_, registry) = space();
        let f = ExpressionFunction::new("1, p + q, p^2", registry, &[]).unwrap();
        let values = BTreeMap::from([
            ("term_0".to_string(), dec!(0.5)),
            ("term_1".to_string(), dec!(-2)),
            ("term_2".to_string(), dec!(3)),
        ]);
        assert_eq!(f.math(&values).unwrap(), "0.5 * 1 - 2 * (p + q) + 3 * p^2");
        assert_eq!(
            f.matlab(&values).unwrap(),
            "0.5 .* 1 - 2 .* (p + q) + 3 .* p .^ 2"
        );
    }

    #[test]
    fn value_at_sums_weighted_terms() {
        let (params, registry) = space();
        let f = ExpressionFunction::new("1, p", registry, &[]).unwrap();
        let values = BTreeMap::from([
            ("term_0".to_string(), dec!(0.5)),
            ("term_1".to_string(), dec!(2)),
        ]);
        let sample = Sample::from_values(&params, vec![dec!(0.25), dec!(0)]).unwrap();
        assert_eq!(f.value_at(&sample, &values).unwrap(), dec!(1));
    }
}
