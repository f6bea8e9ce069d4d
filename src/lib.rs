//! pacfit - PAC-guaranteed function fitting for parametric model checking.
//!
//! ## Architecture
//!
//! pacfit treats the probabilistic model checker as an expensive oracle:
//! - **Sampler**: Hyper-rectangle vertices and seeded uniform points, sized by a PAC bound
//! - **Oracle Pool**: Round-robin dispatch of samples to parallel batch oracles
//! - **Scenario LP**: Minimises the worst-case deviation λ of a template function
//!
//! ## Strategies
//!
//! - **Scenario**: Sample → Check → Fit (polynomial or user template) → Print
//! - **Direct**: AdaptLIPO search for the optimum over one interactive oracle
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, LP stage markers)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Oracle uncertainties (fail fast, optional timeout)

pub mod algebra;
pub mod lp;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod pool;
pub mod sampling;
pub mod search;

// Re-exports for convenience
pub use algebra::{build_template, TemplateFunction};
pub use lp::{lp_solver, LpSolver};
pub use models::{Config, OracleResult, PacError, Range, Result, Sample};
pub use oracle::{batch_oracle, interactive_oracle, BatchOracle, InteractiveOracle};
pub use pipeline::{DirectPipeline, RunReport, ScenarioOutcome, ScenarioPipeline};
pub use pool::OraclePool;
pub use search::{AdaptLipo, SearchOutcome};
