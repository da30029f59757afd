//! Type definitions for the nonlinear program driver.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::line_search::LineSearchConfig;
use crate::energy::ObjectiveTerm;
use crate::expression::Polynomial;

/// Configuration for the SQP driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of SQP iterations.
    pub max_iterations: usize,

    /// Stationarity tolerance, relative to `max(1, ‖∇f‖∞)`.
    pub optimality_tolerance: f64,

    /// Maximum absolute constraint residual at a solution.
    pub feasibility_tolerance: f64,

    /// Steps with `‖αd‖∞ ≤ step_tolerance · (1 + ‖x‖∞)` count as stalled.
    pub step_tolerance: f64,

    /// δ in the lower-right KKT block.
    pub constraint_regularization: f64,

    /// First Levenberg damping tried when the undamped step is rejected.
    pub initial_damping: f64,

    /// Damping at which the driver gives up.
    pub max_damping: f64,

    /// Factor applied to the damping on each escalation.
    pub damping_increase: f64,

    /// Relative singular value cutoff for the KKT solve.
    pub svd_tolerance: f64,

    pub line_search: LineSearchConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            optimality_tolerance: 1e-8,
            feasibility_tolerance: 1e-9,
            step_tolerance: 1e-12,
            constraint_regularization: 1e-10,
            initial_damping: 1e-8,
            max_damping: 1e10,
            damping_increase: 10.0,
            svd_tolerance: 1e-15,
            line_search: LineSearchConfig::default(),
        }
    }
}

/// How a successful solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveTermination {
    /// Stationarity and feasibility tolerances met.
    Optimal,

    /// Feasible, and no further step could be taken.
    Stalled,
}

/// Result of a successful solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Solved decision vector.
    pub x: DVector<f64>,

    /// Objective value at `x`.
    pub objective: f64,

    /// Largest absolute constraint residual at `x`.
    pub max_violation: f64,

    /// Number of SQP iterations performed.
    pub iterations: usize,

    pub termination: SolveTermination,
}

/// An equality-constrained nonlinear program:
/// minimise `Σ objective_k(x)` subject to `constraints_i(x) = 0`.
pub struct NonlinearProgram {
    pub initial: DVector<f64>,
    pub objective: Vec<Box<dyn ObjectiveTerm>>,
    pub constraints: Vec<Polynomial>,
}

impl std::fmt::Debug for NonlinearProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonlinearProgram")
            .field("num_variables", &self.num_variables())
            .field("num_objective_terms", &self.objective.len())
            .field("num_constraints", &self.constraints.len())
            .finish()
    }
}

impl NonlinearProgram {
    pub fn new(initial: DVector<f64>) -> Self {
        Self {
            initial,
            objective: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn num_variables(&self) -> usize {
        self.initial.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn add_objective(&mut self, term: impl ObjectiveTerm + 'static) {
        self.objective.push(Box::new(term));
    }

    pub fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Polynomial>) {
        self.constraints.extend(constraints);
    }

    pub fn objective_value(&self, x: &DVector<f64>) -> f64 {
        self.objective.iter().map(|t| t.value(x)).sum()
    }

    pub fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut grad = DVector::zeros(x.len());
        for term in &self.objective {
            term.add_gradient(x, &mut grad);
        }
        grad
    }

    /// Hessian of the Lagrangian `f + λᵀc`.
    pub fn lagrangian_hessian(&self, x: &DVector<f64>, multipliers: &DVector<f64>) -> DMatrix<f64> {
        let n = x.len();
        let mut hessian = DMatrix::zeros(n, n);
        for term in &self.objective {
            term.add_hessian(x, &mut hessian);
        }
        for (c, lambda) in self.constraints.iter().zip(multipliers.iter()) {
            if *lambda != 0.0 && c.degree() >= 2 {
                c.add_hessian(x, *lambda, &mut hessian);
            }
        }
        hessian
    }

    pub fn constraint_values(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.constraints.len(),
            self.constraints.iter().map(|c| c.evaluate(x)),
        )
    }

    /// Dense constraint Jacobian, one row per constraint.
    pub fn constraint_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jacobian = DMatrix::zeros(self.constraints.len(), x.len());
        for (row, c) in self.constraints.iter().enumerate() {
            for (col, value) in c.gradient(x) {
                jacobian[(row, col)] = value;
            }
        }
        jacobian
    }
}
