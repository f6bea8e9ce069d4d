//! Bounded-degree multivariate polynomial template.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::template::{coefficient, push_signed, times_symbol};
use super::{monomial_basis, Monomial, TemplateFunction, VariableRegistry};
use crate::models::{ExpressionFormat, PacError, Result, Sample};

/// Every monomial of degree ≤ `max_degree`, one coefficient each.
#[derive(Debug, Clone)]
pub struct Polynomial {
    registry: VariableRegistry,
    max_degree: u32,
    /// Grouped by degree; index 0 holds only the constant monomial.
    monomials: Vec<Vec<Monomial>>,
    /// Coefficient names, parallel to `monomials.iter().flatten()`.
    names: Vec<String>,
}

impl Polynomial {
    pub fn new(registry: VariableRegistry, max_degree: u32) -> Self {
        let monomials = monomial_basis(registry.len(), max_degree);
        let names = monomials
            .iter()
            .flatten()
            .map(|m| m.coefficient_name(&registry))
            .collect();
        Self {
            registry,
            max_degree,
            monomials,
            names,
        }
    }

    pub fn max_degree(&self) -> u32 {
        self.max_degree
    }

    pub fn monomials(&self) -> impl Iterator<Item = &Monomial> {
        self.monomials.iter().flatten()
    }

    fn point(&self, sample: &Sample) -> Result<Vec<Decimal>> {
        self.registry
            .names()
            .iter()
            .map(|name| {
                sample
                    .get(name)
                    .ok_or_else(|| PacError::UndefinedIdentifier(name.clone()))
            })
            .collect()
    }
}

impl TemplateFunction for Polynomial {
    fn coefficients(&self) -> Vec<String> {
        self.names.clone()
    }

    fn evaluate(&self, sample: &Sample) -> Result<BTreeMap<String, Decimal>> {
        let point = self.point(sample)?;
        self.monomials()
            .zip(&self.names)
            .map(|(m, name)| Ok((name.clone(), m.evaluate(&point)?)))
            .collect()
    }

    /// Constant first and bare, then one signed term per monomial,
    /// zero coefficients included.
    fn render(
        &self,
        values: &BTreeMap<String, Decimal>,
        format: ExpressionFormat,
    ) -> Result<String> {
        let times = times_symbol(format);
        let mut out = coefficient(values, &self.names[0])?
            .normalize()
            .to_string();

        for (monomial, name) in self.monomials().zip(&self.names).skip(1) {
            let value = coefficient(values, name)?;
            push_signed(&mut out, value, &monomial.render(&self.registry, format), times);
        }
        Ok(out)
    }
}
