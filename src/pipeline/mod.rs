//! Pipelines - scenario fitting and direct optimisation.

mod direct;
mod report;
mod scenario;

pub use direct::*;
pub use report::*;
pub use scenario::*;
