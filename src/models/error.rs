//! Error types for pacfit.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad configuration, unreadable model file)
//! - I^B materialized: Oracle failures (crashed process, garbled output, timeout)
//! - K_i violated: Internal invariant violations (bugs)
//!
//! Infinite oracle values and LP infeasibility are *outcomes*, not errors.
//! They live in `ScenarioOutcome` / `SearchOutcome`.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for pacfit.
#[derive(Debug, Error)]
pub enum PacError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid template: {0}")]
    Template(String),

    #[error("Identifier '{0}' is neither a parameter nor a constant")]
    UndefinedIdentifier(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: The external oracle misbehaved
    // ═══════════════════════════════════════════════════════════════════

    #[error("Oracle state error: {0}")]
    OracleState(String),

    #[error("Oracle protocol error: {0}")]
    OracleProtocol(String),

    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("LP backend error: {0}")]
    Lp(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PacError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for pacfit.
pub type Result<T> = std::result::Result<T, PacError>;
