//! Errors raised by the policy improvement engine

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ImprovementError>;

/// Failure modes of the engine and its setup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImprovementError {
    /// An operation was invoked before a successful `initialize`.
    #[error("policy improvement used before initialization")]
    NotInitialized,

    /// A caller-supplied vector or matrix has the wrong size.
    #[error("{what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A matrix that has to be inverted at setup time is singular.
    #[error("{matrix} matrix of dimension {dimension} is not invertible")]
    SingularMatrix {
        dimension: usize,
        matrix: &'static str,
    },

    /// The policy or cost evaluator failed to provide a value.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// A configuration value was rejected.
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// Weighting needs at least one active rollout.
    #[error("no active rollouts")]
    NoRollouts,
}

impl ImprovementError {
    /// Check a size, producing `DimensionMismatch` on disagreement
    pub fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
        if expected == found {
            Ok(())
        } else {
            Err(ImprovementError::DimensionMismatch {
                what,
                expected,
                found,
            })
        }
    }
}
