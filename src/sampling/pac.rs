//! PAC sample-count bound.

/// `N = ceil((2/ε) · (ln(1/η) + c))`.
///
/// Monotone: grows with `c`, grows as ε or η shrink.
pub fn minimum_number_samples(epsilon: f64, eta: f64, coefficients: usize) -> usize {
    debug_assert!(epsilon > 0.0 && epsilon < 1.0);
    debug_assert!(eta > 0.0 && eta < 1.0);

    ((2.0 / epsilon) * ((1.0 / eta).ln() + coefficients as f64)).ceil() as usize
}

/// Number of monomials of degree ≤ `degree` over `variables` variables,
/// i.e. `C(variables + degree, degree)`. `None` on overflow.
pub fn number_coefficients(variables: usize, degree: u32) -> Option<u64> {
    let n = variables as u128 + u128::from(degree);
    let k = u128::from(degree).min(variables as u128);
    let mut binomial: u128 = 1;
    for i in 0..k {
        // Exact: the running product is always C(n, i + 1).
        binomial = binomial.checked_mul(n - i)? / (i + 1);
    }
    u64::try_from(binomial).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_value() {
        assert_eq!(minimum_number_samples(0.05, 0.05, 0), 120);
    }

    #[test]
    fn monotone_in_each_argument() {
        let base = minimum_number_samples(0.05, 0.05, 0);
        assert!(minimum_number_samples(0.05, 0.05, 10) > base);
        assert!(minimum_number_samples(0.01, 0.05, 0) > base);
        assert!(minimum_number_samples(0.05, 0.01, 0) > base);

        let mut previous = 0;
        for c in 0..50 {
            let n = minimum_number_samples(0.1, 0.2, c);
            assert!(n >= previous);
            previous = n;
        }
    }

    #[test]
    fn coefficient_counts() {
        assert_eq!(number_coefficients(1, 3), Some(4));
        assert_eq!(number_coefficients(2, 2), Some(6));
        assert_eq!(number_coefficients(3, 1), Some(4));
        assert_eq!(number_coefficients(4, 3), Some(35));
        assert_eq!(number_coefficients(5, 0), Some(1));
    }
}
