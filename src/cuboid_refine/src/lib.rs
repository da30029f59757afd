//! Symmetry-aware refinement of cuboid shape parts.
//!
//! Given a set of oriented boxes and hypothesised reflection and rotation
//! symmetry groups over them, this library adjusts the boxes (and the
//! group parameters) so that symmetric parts become exactly symmetric
//! while staying close to a data prior.
//!
//! # Architecture
//!
//! Each outer iteration has two phases:
//! - Solving: a constrained nonlinear program over corners, axes and group
//!   parameters is solved by SQP, once per group or jointly
//! - Updating: solved values are written back, surfaces are resampled and
//!   symmetric sample correspondences are rebuilt with KD-trees
//!
//! The controller tracks the best total energy and restores it on exit.
//!
//! # Usage
//!
//! ```ignore
//! use cuboid_refine::{CuboidRefiner, GridSurfaceSampler, RefinementConfig};
//!
//! let config = RefinementConfig::builder()
//!     .max_iterations(5)
//!     .fixed_cuboids([0])
//!     .build();
//!
//! let outcome = CuboidRefiner::new(config).refine(
//!     &mut cuboids,
//!     &mut reflections,
//!     &mut rotations,
//!     &prior,
//!     &GridSurfaceSampler::default(),
//! )?;
//! println!("{:?}: {} -> {}", outcome.status, outcome.initial_energy.total, outcome.best_energy);
//! ```

pub mod constraints;
pub mod correspondence;
pub mod energy;
pub mod error;
pub mod expression;
pub mod geometry;
pub mod layout;
pub mod optimization;
pub mod refine;
pub mod symmetry;
pub mod test_utils;
pub mod timing;

pub use correspondence::{
    CorrespondenceConfig, GroupCorrespondences, SampleIndex, SamplePair, SampleSearch,
};
pub use energy::{DataEnergy, EnergyBreakdown, QuadraticForm, RelationPrior};
pub use error::{RefineError, Result, SolverError};
pub use expression::{Polynomial, VectorExpression};
pub use geometry::{Cuboid, GridSurfaceSampler, SamplePoint, SurfaceSampler, NUM_CORNERS};
pub use layout::VariableLayout;
pub use optimization::{
    NonlinearProgram, NonlinearSolver, SolveReport, SolveTermination, SolverConfig, SqpSolver,
};
pub use symmetry::{ReflectionMember, ReflectionSymmetryGroup, RotationSymmetryGroup};
pub use timing::{IterationTiming, Phase, PhaseTimes, RefineTiming};

// High-level API
pub use refine::{
    optimize, CuboidRefiner, CuboidizeMode, FailurePolicy, IterationRecord, RefineOutcome,
    RefineState, RefinementConfig, RefinementConfigBuilder, SolveFailure, SolveStrategy,
    SolveTarget,
};
