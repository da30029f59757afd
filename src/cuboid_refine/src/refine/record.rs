//! Outcome and per-iteration records of a refinement run.

use serde::Serialize;

use crate::energy::EnergyBreakdown;
use crate::error::SolverError;
use crate::timing::RefineTiming;

/// State of the outer iteration controller.
///
/// Every terminal state leaves the best recorded geometry in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefineState {
    /// Baseline energy being computed.
    Initial,
    /// Nonlinear solves in progress.
    Solving,
    /// Solved values being written back and evaluated.
    Updating,
    /// Energy rose past the divergence ratio.
    Diverged,
    /// Iteration cap reached.
    MaxIter,
    /// A solve failed under the abort policy.
    Aborted,
}

impl RefineState {
    /// Check if this state ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefineState::Diverged | RefineState::MaxIter | RefineState::Aborted
        )
    }
}

/// Which groups a solve covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveTarget {
    /// Every active group at once.
    Joint,
    /// No symmetry groups.
    Unconstrained,
    Reflection(usize),
    Rotation(usize),
}

/// A solve that failed and was rolled back.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveFailure {
    pub iteration: usize,
    pub target: SolveTarget,
    pub error: SolverError,
}

/// Summary of one outer iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    /// Iteration number (1-indexed; 0 is the initial evaluation).
    pub iteration: usize,

    /// Energy of the geometry after this iteration's update.
    pub energy: EnergyBreakdown,

    /// Best total energy after this iteration.
    pub best_energy: f64,

    /// Whether this iteration improved on the best.
    pub improved: bool,

    pub solves_attempted: usize,
    pub solves_succeeded: usize,

    /// Total SQP iterations over all successful solves.
    pub solver_iterations: usize,

    /// Accepted matches per reflection group after the update.
    pub reflection_pairs: Vec<usize>,

    /// Accepted matches per rotation group after the update.
    pub rotation_pairs: Vec<usize>,

    /// Controller state after this iteration.
    pub state: RefineState,
}

/// Result of a refinement run.
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    /// Terminal state.
    pub status: RefineState,

    /// Number of outer iterations performed.
    pub iterations: usize,

    pub initial_energy: EnergyBreakdown,

    /// Best total energy; the geometry left in place has this energy.
    pub best_energy: f64,

    /// Iteration that produced the best energy (0 for the input).
    pub best_iteration: usize,

    pub history: Vec<IterationRecord>,

    pub solver_failures: Vec<SolveFailure>,

    /// Phase timings (populated when profiling feature is enabled).
    pub timing: RefineTiming,
}

impl RefineOutcome {
    /// Whether the refinement improved on the input geometry.
    pub fn improved(&self) -> bool {
        self.best_iteration > 0
    }

    /// Iteration history as a JSON array.
    pub fn history_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.history)
    }

    /// Iteration history as pretty-printed JSON.
    pub fn history_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.history)
    }
}
