//! Nonlinear program driver.
//!
//! This module implements the inner solve of the refinement loop:
//! 1. Evaluate the objective terms and equality constraints
//! 2. Solve the damped Newton–KKT system for a step
//! 3. Backtrack on the ℓ₁ merit function
//! 4. Update the decision vector and check stationarity and feasibility

pub mod line_search;
pub mod newton;
pub mod solver;
pub mod types;

pub use line_search::{LineSearchConfig, LineSearchResult};
pub use newton::{kkt_step, KktStep};
pub use solver::{NonlinearSolver, SqpSolver};
pub use types::{NonlinearProgram, SolveReport, SolveTermination, SolverConfig};
