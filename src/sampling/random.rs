//! Uniform random sampling over the parameter box.

use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::models::{Parameter, Result, Sample};

/// Draw one coordinate uniformly from `[lower, upper]`.
pub fn uniform_value<R: Rng>(rng: &mut R, parameter: &Parameter) -> Decimal {
    let unit: f64 = rng.gen_range(0.0..1.0);
    let unit = Decimal::from_f64(unit).unwrap_or(Decimal::ZERO);
    (parameter.lower + parameter.span() * unit).min(parameter.upper)
}

/// Draw one point, coordinates independent.
pub fn uniform_sample<R: Rng>(rng: &mut R, parameters: &[Parameter]) -> Result<Sample> {
    let values = parameters.iter().map(|p| uniform_value(rng, p)).collect();
    Sample::from_values(parameters, values)
}

/// Draw `count` points.
pub fn random_samples<R: Rng>(
    rng: &mut R,
    parameters: &[Parameter],
    count: usize,
) -> Result<Vec<Sample>> {
    (0..count).map(|_| uniform_sample(rng, parameters)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn params() -> Vec<Parameter> {
        vec![
            Parameter::new("p", dec!(0.1), dec!(0.2)).unwrap(),
            Parameter::new("q", dec!(-5), dec!(5)).unwrap(),
        ]
    }

    #[test]
    fn stays_inside_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = params();
        for sample in random_samples(&mut rng, &params, 500).unwrap() {
            for (p, v) in params.iter().zip(sample.point()) {
                assert!(p.contains(v), "{v} outside {:?}", p);
            }
        }
    }

    #[test]
    fn same_seed_same_samples() {
        let params = params();
        let a = random_samples(&mut StdRng::seed_from_u64(42), &params, 20).unwrap();
        let b = random_samples(&mut StdRng::seed_from_u64(42), &params, 20).unwrap();
        let c = random_samples(&mut StdRng::seed_from_u64(43), &params, 20).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
