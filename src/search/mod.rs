//! Direct optimisation over the parameter box.
//!
//! Epistemic foundation:
//! - K_i: One interactive oracle, queried sequentially
//! - B_i: No completeness guarantee; the result is the best point seen
//! - I^B: An infinite oracle value ends the search without an optimum

mod lipo;

pub use lipo::*;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::Constant;

/// Result of a direct search, already in the requested direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchOutcome {
    Optimum {
        value: Decimal,
        point: Vec<Constant>,
        /// Iteration at which the optimum was found (0 = initial draw)
        iteration: usize,
        evaluations: usize,
    },
    /// The oracle reported infinity at `point`.
    Infinite { point: Vec<Constant> },
}
