//! Core data models for pacfit.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Parameters, samples and ranges with checked invariants
//! - B_i (Beliefs): Oracle answers wrapped in Result
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants for oracle and solver failures

mod config;
mod error;
mod sample;

pub use config::*;
pub use error::*;
pub use sample::*;
