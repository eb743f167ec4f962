//! Error types for impact handling.

use crate::BodyId;
use thiserror::Error;

/// Errors surfaced by the solvers and the impact handler.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImpactError {
    /// Every regularization level failed; body velocities were left
    /// unchanged.
    #[error("impact solve failed for a {size}-variable problem (residual {residual:.3e})")]
    SolveFailed {
        /// Number of complementarity variables in the failed problem.
        size: usize,
        /// Worst constraint-velocity residual observed.
        residual: f64,
    },

    /// A constraint referenced a body that is not in the body set.
    #[error("constraint references unknown body {0:?}")]
    InvalidBody(BodyId),

    /// A constraint referenced a degree of freedom the body does not have.
    #[error("body {body:?} has {num_coords} coordinates, constraint wants dof {dof}")]
    InvalidDof {
        /// The offending body.
        body: BodyId,
        /// Coordinates the body exposes.
        num_coords: usize,
        /// The requested degree of freedom.
        dof: usize,
    },

    /// A basis matrix became singular and no fallback was enabled.
    #[error("basis matrix became singular during pivoting")]
    SingularBasis,

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl ImpactError {
    /// Create an invalid-configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this is a solver failure (as opposed to bad input).
    #[must_use]
    pub fn is_solve_failure(&self) -> bool {
        matches!(self, Self::SolveFailed { .. } | Self::SingularBasis)
    }
}
