//! Monomials over the registry's variables.
//!
//! K_i: a monomial *is* its exponent vector; equality, hashing and
//! ordering all go through it, so one coefficient name maps to one term.

use rust_decimal::{Decimal, MathematicalOps};
use std::collections::BTreeSet;
use std::cmp::Reverse;

use super::VariableRegistry;
use crate::models::{ExpressionFormat, PacError, Result};

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Monomial {
    exponents: Vec<u32>,
}

impl Monomial {
    /// The constant monomial `1`.
    pub fn zero_degree(variables: usize) -> Self {
        Self {
            exponents: vec![0; variables],
        }
    }

    /// `self * x_index`.
    pub fn times(&self, index: usize) -> Self {
        let mut exponents = self.exponents.clone();
        exponents[index] += 1;
        Self { exponents }
    }

    pub fn degree(&self) -> u32 {
        self.exponents.iter().sum()
    }

    pub fn exponents(&self) -> &[u32] {
        &self.exponents
    }

    /// `coeff_<var>_<exp>...` over every registry variable.
    pub fn coefficient_name(&self, registry: &VariableRegistry) -> String {
        let mut name = String::from("coeff");
        for (index, exp) in self.exponents.iter().enumerate() {
            name.push('_');
            name.push_str(registry.name(index));
            name.push('_');
            name.push_str(&exp.to_string());
        }
        name
    }

    /// Value at `point` (coordinates in registry order).
    pub fn evaluate(&self, point: &[Decimal]) -> Result<Decimal> {
        let mut result = Decimal::ONE;
        for (&base, &exp) in point.iter().zip(&self.exponents) {
            let factor = match exp {
                0 => continue,
                1 => base,
                _ => base.checked_powu(u64::from(exp)).ok_or_else(|| {
                    PacError::Arithmetic(format!("overflow computing {base}^{exp}"))
                })?,
            };
            result = result
                .checked_mul(factor)
                .ok_or_else(|| PacError::Arithmetic("overflow evaluating monomial".to_string()))?;
        }
        Ok(result)
    }

    /// Pretty-print; the zero-degree monomial prints as `1`.
    pub fn render(&self, registry: &VariableRegistry, format: ExpressionFormat) -> String {
        let factors: Vec<String> = self
            .exponents
            .iter()
            .enumerate()
            .filter(|(_, &exp)| exp > 0)
            .map(|(index, &exp)| {
                let name = registry.name(index);
                match (format, exp) {
                    (ExpressionFormat::Latex, 1) => name.to_string(),
                    (ExpressionFormat::Latex, _) => format!("{name}^{{{exp}}}"),
                    (ExpressionFormat::Math, 1) => name.to_string(),
                    (ExpressionFormat::Math, _) => format!("{name}{}", superscript(exp)),
                    (ExpressionFormat::Matlab, 1) => name.to_string(),
                    (ExpressionFormat::Matlab, _) => format!("({name} .^ {exp})"),
                }
            })
            .collect();

        if factors.is_empty() {
            return "1".to_string();
        }
        let separator = match format {
            ExpressionFormat::Latex => " \\cdot ",
            ExpressionFormat::Math => " * ",
            ExpressionFormat::Matlab => " .* ",
        };
        factors.join(separator)
    }
}

fn superscript(exp: u32) -> String {
    exp.to_string()
        .bytes()
        .map(|d| SUPERSCRIPT_DIGITS[usize::from(d - b'0')])
        .collect()
}

/// Every monomial of degree `0..=max_degree`, grouped by degree.
///
/// Each degree is built from the previous one times every variable,
/// deduplicated through a set. Within a degree, monomials with larger
/// exponents on earlier variables come first (x², xy, y²).
pub fn monomial_basis(variables: usize, max_degree: u32) -> Vec<Vec<Monomial>> {
    let mut basis = vec![vec![Monomial::zero_degree(variables)]];
    for _ in 1..=max_degree {
        let mut next: BTreeSet<Reverse<Monomial>> = BTreeSet::new();
        for monomial in &basis[basis.len() - 1] {
            for index in 0..variables {
                next.insert(Reverse(monomial.times(index)));
            }
        }
        basis.push(next.into_iter().map(|Reverse(m)| m).collect());
    }
    basis
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn xy() -> VariableRegistry {
        VariableRegistry::new(["x", "y"]).unwrap()
    }

    #[test]
    fn two_variables_degree_two_gives_six_monomials() {
        let registry = xy();
        let basis = monomial_basis(2, 2);
        let all: Vec<&Monomial> = basis.iter().flatten().collect();
        assert_eq!(all.len(), 6);

        let rendered: Vec<String> = all
            .iter()
            .map(|m| m.render(&registry, ExpressionFormat::Math))
            .collect();
        assert_eq!(rendered, vec!["1", "x", "y", "x²", "x * y", "y²"]);
    }

    #[test]
    fn zero_degree_evaluates_to_one() {
        let m = Monomial::zero_degree(2);
        assert_eq!(m.evaluate(&[dec!(0.3), dec!(-7)]).unwrap(), Decimal::ONE);
        assert_eq!(m.evaluate(&[dec!(0), dec!(0)]).unwrap(), Decimal::ONE);
    }

    #[test]
    fn evaluates_products_of_powers() {
        let m = Monomial::zero_degree(2).times(0).times(0).times(1);
        assert_eq!(m.evaluate(&[dec!(0.5), dec!(3)]).unwrap(), dec!(0.75));
    }

    #[test]
    fn coefficient_names_list_every_variable() {
        let m = Monomial::zero_degree(2).times(1);
        assert_eq!(m.coefficient_name(&xy()), "coeff_x_0_y_1");
    }

    #[test]
    fn renders_each_syntax() {
        let registry = xy();
        let m = Monomial::zero_degree(2).times(0).times(0).times(1);
        assert_eq!(m.render(&registry, ExpressionFormat::Latex), "x^{2} \\cdot y");
        assert_eq!(m.render(&registry, ExpressionFormat::Matlab), "(x .^ 2) .* y");
        let tenth = (0..10).fold(Monomial::zero_degree(2), |m, _| m.times(0));
        assert_eq!(tenth.render(&registry, ExpressionFormat::Math), "x¹⁰");
    }
}
