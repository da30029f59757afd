//! Error types for cuboid refinement.

use thiserror::Error;

/// Failures reported by a nonlinear program solve.
///
/// None of these is fatal: the caller keeps the pre-solve decision vector
/// and carries on according to its failure policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("problem is infeasible (constraint violation {violation:.3e})")]
    Infeasible { violation: f64 },

    #[error("iteration limit reached after {iterations} iterations")]
    IterationLimitReached { iterations: usize },

    #[error("numerical error: {0}")]
    NumericalError(String),
}

/// Input validation errors raised at the `optimize` boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefineError {
    #[error("{group} references cuboid {cuboid}, but only {num_cuboids} cuboids were given")]
    MemberOutOfRange {
        group: String,
        cuboid: usize,
        num_cuboids: usize,
    },

    #[error("fixed cuboid index {index} out of range ({num_cuboids} cuboids)")]
    FixedIndexOutOfRange { index: usize, num_cuboids: usize },

    #[error("rotation symmetry group needs at least 2 members, got {0}")]
    RotationGroupTooSmall(usize),

    #[error("reflection axis index {0} out of range (expected 0..3)")]
    InvalidAxis(usize),

    #[error("quadratic form for {what} has dimension {actual}, expected {expected}")]
    FormDimension {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("cuboid {0} has non-finite geometry")]
    NonFiniteGeometry(usize),
}

pub type Result<T, E = RefineError> = std::result::Result<T, E>;
