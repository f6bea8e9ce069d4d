//! Parameter space, sample and oracle result types.
//!
//! K_i: These types represent the core data flow through the pipeline.
//! Everything here is immutable once built; only `Range` grows.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::{PacError, Result};

/// A bounded, optimised model parameter.
///
/// K_i: name is non-empty and `lower < upper` (checked by `Parameter::new`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub lower: Decimal,
    pub upper: Decimal,
}

impl Parameter {
    pub fn new(name: impl Into<String>, lower: Decimal, upper: Decimal) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PacError::InvalidInput(
                "parameter name must not be empty".to_string(),
            ));
        }
        if lower >= upper {
            return Err(PacError::InvalidInput(format!(
                "parameter '{name}': lower bound {lower} must be below upper bound {upper}"
            )));
        }
        Ok(Self { name, lower, upper })
    }

    /// Width of the interval.
    pub fn span(&self) -> Decimal {
        self.upper - self.lower
    }

    pub fn contains(&self, value: Decimal) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Name/value pair forwarded verbatim to the model checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub value: String,
}

impl Constant {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Point assignment: one value per declared parameter, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    values: Vec<(String, Decimal)>,
}

impl Sample {
    /// Build a sample from per-parameter values. `values[i]` belongs to `parameters[i]`.
    pub fn from_values(parameters: &[Parameter], values: Vec<Decimal>) -> Result<Self> {
        if parameters.len() != values.len() {
            return Err(PacError::Internal(format!(
                "sample has {} values for {} parameters",
                values.len(),
                parameters.len()
            )));
        }
        let mut pairs = Vec::with_capacity(values.len());
        for (parameter, value) in parameters.iter().zip(values) {
            if !parameter.contains(value) {
                return Err(PacError::InvalidInput(format!(
                    "value {value} outside [{}, {}] for '{}'",
                    parameter.lower, parameter.upper, parameter.name
                )));
            }
            pairs.push((parameter.name.clone(), value));
        }
        Ok(Self { values: pairs })
    }

    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Coordinates in declaration order.
    pub fn point(&self) -> Vec<Decimal> {
        self.values.iter().map(|(_, v)| *v).collect()
    }

    /// The sample as model-checker constants.
    pub fn to_constants(&self) -> Vec<Constant> {
        self.values
            .iter()
            .map(|(n, v)| Constant::new(n.clone(), v.normalize().to_string()))
            .collect()
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(n, v)| format!("{n}={}", v.normalize()))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Value computed by the model checker.
///
/// K_i: `Infinite` orders above every finite value (variant order matters for the derive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleResult {
    Finite(Decimal),
    Infinite,
}

impl OracleResult {
    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    pub fn finite(&self) -> Option<Decimal> {
        match self {
            Self::Finite(v) => Some(*v),
            Self::Infinite => None,
        }
    }

    /// Negation for sign-flipped searches. Infinity stays infinite.
    pub fn negate(self) -> Self {
        match self {
            Self::Finite(v) => Self::Finite(-v),
            Self::Infinite => Self::Infinite,
        }
    }
}

impl FromStr for OracleResult {
    type Err = PacError;

    /// Accepts `inf`/`infinity`, plain decimals, scientific notation and `p/q` fractions.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let lowered = s.to_ascii_lowercase();
        if matches!(lowered.as_str(), "inf" | "+inf" | "infinity" | "+infinity") {
            return Ok(Self::Infinite);
        }
        parse_decimal(s).map(Self::Finite)
    }
}

impl fmt::Display for OracleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(v) => write!(f, "{}", v.normalize()),
            Self::Infinite => write!(f, "infinity"),
        }
    }
}

/// Parse a decimal as printed by external tools.
pub fn parse_decimal(s: &str) -> Result<Decimal> {
    let s = s.trim();
    let invalid = || PacError::OracleProtocol(format!("not a number: '{s}'"));

    if let Some((num, den)) = s.split_once('/') {
        let num = parse_decimal(num)?;
        let den = parse_decimal(den)?;
        return num.checked_div(den).ok_or_else(invalid);
    }
    if s.contains(['e', 'E']) {
        return Decimal::from_scientific(s).map_err(|_| invalid());
    }
    Decimal::from_str(s).map_err(|_| invalid())
}

/// One end of a `Range` together with the constants that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    pub value: OracleResult,
    pub witness: Vec<Constant>,
}

/// Running [min, max] over observed oracle results.
///
/// K_i: `merge` is commutative and associative, the range never shrinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub lower: Bound,
    pub upper: Bound,
}

impl Range {
    /// Degenerate range holding a single observation.
    pub fn single(value: OracleResult, witness: Vec<Constant>) -> Self {
        let bound = Bound { value, witness };
        Self {
            lower: bound.clone(),
            upper: bound,
        }
    }

    /// Widen to include another observation.
    pub fn observe(&mut self, value: OracleResult, witness: &[Constant]) {
        if value < self.lower.value {
            self.lower = Bound {
                value,
                witness: witness.to_vec(),
            };
        }
        if value > self.upper.value {
            self.upper = Bound {
                value,
                witness: witness.to_vec(),
            };
        }
    }

    /// Component-wise min of lower bounds, max of upper bounds.
    ///
    /// Ties keep the witness that sorts first so the result does not
    /// depend on merge order.
    pub fn merge(mut self, other: Range) -> Range {
        self.lower = pick(self.lower, other.lower, Ordering::Less);
        self.upper = pick(self.upper, other.upper, Ordering::Greater);
        self
    }

    /// Fold any number of partial ranges; `None` when there are none.
    pub fn merge_all(ranges: impl IntoIterator<Item = Range>) -> Option<Range> {
        ranges.into_iter().reduce(Range::merge)
    }
}

fn pick(a: Bound, b: Bound, prefer: Ordering) -> Bound {
    match a.value.cmp(&b.value) {
        Ordering::Equal => {
            if witness_key(&b.witness) < witness_key(&a.witness) {
                b
            } else {
                a
            }
        }
        ord if ord == prefer => a,
        _ => b,
    }
}

fn witness_key(witness: &[Constant]) -> Vec<(&str, &str)> {
    witness
        .iter()
        .map(|c| (c.name.as_str(), c.value.as_str()))
        .collect()
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |b: &Bound| {
            b.witness
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "[{}, {}] (lower at {}; upper at {})",
            self.lower.value,
            self.upper.value,
            show(&self.lower),
            show(&self.upper)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn range_of(v: i64) -> Range {
        Range::single(
            OracleResult::Finite(Decimal::from(v)),
            vec![Constant::new("p", v.to_string())],
        )
    }

    #[test]
    fn infinite_orders_above_finite() {
        assert!(OracleResult::Infinite > OracleResult::Finite(dec!(1000000)));
        assert!(OracleResult::Finite(dec!(0.2)) < OracleResult::Finite(dec!(0.3)));
    }

    #[test]
    fn parses_tool_output() {
        assert_eq!("inf".parse::<OracleResult>().unwrap(), OracleResult::Infinite);
        assert_eq!(
            "0.25".parse::<OracleResult>().unwrap(),
            OracleResult::Finite(dec!(0.25))
        );
        assert_eq!(
            "2.5e-1".parse::<OracleResult>().unwrap(),
            OracleResult::Finite(dec!(0.25))
        );
        assert_eq!(
            "1/4".parse::<OracleResult>().unwrap(),
            OracleResult::Finite(dec!(0.25))
        );
        assert!("garbage".parse::<OracleResult>().is_err());
    }

    #[test]
    fn range_merge_is_order_independent() {
        let mut wide = range_of(3);
        wide.observe(OracleResult::Finite(Decimal::from(7)), &[Constant::new("p", "7")]);
        let mut outer = range_of(1);
        outer.observe(OracleResult::Finite(Decimal::from(9)), &[Constant::new("p", "9")]);
        let point = range_of(5);

        let parts = [wide, outer, point];
        let orders = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in orders {
            let merged = Range::merge_all(order.iter().map(|&i| parts[i].clone())).unwrap();
            assert_eq!(merged.lower.value, OracleResult::Finite(Decimal::from(1)));
            assert_eq!(merged.upper.value, OracleResult::Finite(Decimal::from(9)));
            assert_eq!(merged.lower.witness, vec![Constant::new("p", "1")]);
            assert_eq!(merged.upper.witness, vec![Constant::new("p", "9")]);
        }
    }

    #[test]
    fn sample_rejects_out_of_bounds_values() {
        let p = Parameter::new("p", dec!(0), dec!(1)).unwrap();
        assert!(Sample::from_values(&[p.clone()], vec![dec!(0.5)]).is_ok());
        assert!(Sample::from_values(&[p], vec![dec!(1.5)]).is_err());
    }

    #[test]
    fn parameter_requires_ordered_bounds() {
        assert!(Parameter::new("p", dec!(1), dec!(1)).is_err());
        assert!(Parameter::new("", dec!(0), dec!(1)).is_err());
    }
}
