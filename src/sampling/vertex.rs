//! Hyper-rectangle vertices, optionally with evenly spaced boundary points.

use rust_decimal::Decimal;

use crate::models::{PacError, Parameter, Result, Sample};

/// Number of samples `vertex_samples` produces, or `None` on overflow.
///
/// Every vertex contributes itself plus `boundary_points` per axis sitting
/// at its lower bound: `2^k + b · k · 2^(k-1)`.
pub fn vertex_count(dimensions: usize, boundary_points: usize) -> Option<usize> {
    let vertices = 1usize.checked_shl(u32::try_from(dimensions).ok()?)?;
    let extra = boundary_points
        .checked_mul(dimensions)?
        .checked_mul(vertices / 2)?;
    vertices.checked_add(extra)
}

/// Enumerate all `2^k` vertices (lower bound first on every axis).
///
/// Each vertex is followed by its boundary points: for every axis at its
/// lower bound, `boundary_points` values spaced `(upper - lower) / (b + 1)`
/// apart, strictly between the bounds.
pub fn vertex_samples(parameters: &[Parameter], boundary_points: usize) -> Result<Vec<Sample>> {
    let capacity = vertex_count(parameters.len(), boundary_points).ok_or_else(|| {
        PacError::InvalidInput(format!(
            "too many vertices for {} parameters",
            parameters.len()
        ))
    })?;

    let mut out = Vec::with_capacity(capacity);
    let mut current = Vec::with_capacity(parameters.len());
    enumerate(parameters, boundary_points, &mut current, &mut out)?;
    Ok(out)
}

fn enumerate(
    parameters: &[Parameter],
    boundary_points: usize,
    current: &mut Vec<Decimal>,
    out: &mut Vec<Sample>,
) -> Result<()> {
    let index = current.len();
    if index == parameters.len() {
        out.push(Sample::from_values(parameters, current.clone())?);
        for (axis, parameter) in parameters.iter().enumerate() {
            if current[axis] != parameter.lower || boundary_points == 0 {
                continue;
            }
            let step = parameter.span() / Decimal::from(boundary_points + 1);
            for i in 1..=boundary_points {
                let mut point = current.clone();
                point[axis] = parameter.lower + step * Decimal::from(i);
                out.push(Sample::from_values(parameters, point)?);
            }
        }
        return Ok(());
    }

    let parameter = &parameters[index];
    for bound in [parameter.lower, parameter.upper] {
        current.push(bound);
        enumerate(parameters, boundary_points, current, out)?;
        current.pop();
    }
    Ok(())
}
