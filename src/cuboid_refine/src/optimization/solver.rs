//! Equality-constrained SQP driver.
//!
//! Each iteration linearises the constraints, solves the damped KKT system
//! for a step, and backtracks along it on the ℓ₁ merit
//! `φ(x) = f(x) + ρ‖c(x)‖₁`. The damping is raised whenever the step is
//! not a descent direction for φ or the line search fails, and reset
//! after every accepted step.

use nalgebra::DVector;
use tracing::debug;

use super::line_search::backtracking_line_search;
use super::newton::kkt_step;
use super::types::{NonlinearProgram, SolveReport, SolveTermination, SolverConfig};
use crate::error::SolverError;

/// Contract for solving a [`NonlinearProgram`].
///
/// On failure no partially updated vector is returned; callers keep their
/// pre-solve state.
pub trait NonlinearSolver {
    fn solve(&self, program: &NonlinearProgram) -> Result<SolveReport, SolverError>;
}

/// Sequential quadratic programming solver.
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    config: SolverConfig,
}

impl SqpSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

fn l1_norm(v: &DVector<f64>) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

impl NonlinearSolver for SqpSolver {
    fn solve(&self, program: &NonlinearProgram) -> Result<SolveReport, SolverError> {
        let config = &self.config;
        let m = program.num_constraints();

        let mut x = program.initial.clone();
        if x.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::NumericalError(
                "initial point is not finite".to_string(),
            ));
        }

        let mut multipliers = DVector::zeros(m);
        let mut penalty = 1.0_f64;
        let mut damping = 0.0_f64;

        for iteration in 0..config.max_iterations {
            let objective = program.objective_value(&x);
            let gradient = program.objective_gradient(&x);
            let constraints = program.constraint_values(&x);
            let jacobian = program.constraint_jacobian(&x);
            let violation = inf_norm(&constraints);

            if !objective.is_finite() || gradient.iter().any(|g| !g.is_finite()) {
                return Err(SolverError::NumericalError(format!(
                    "objective not finite at iteration {iteration}"
                )));
            }

            // Stationarity of the Lagrangian with the current estimate.
            let stationarity = inf_norm(&(&gradient + jacobian.transpose() * &multipliers));
            let scale = inf_norm(&gradient).max(1.0);
            if iteration > 0
                && stationarity <= config.optimality_tolerance * scale
                && violation <= config.feasibility_tolerance
            {
                debug!(iteration, objective, violation, "SQP converged");
                return Ok(SolveReport {
                    x,
                    objective,
                    max_violation: violation,
                    iterations: iteration,
                    termination: SolveTermination::Optimal,
                });
            }

            let hessian = program.lagrangian_hessian(&x, &multipliers);

            // Find a damped step along which the merit decreases.
            let accepted = loop {
                let Some(step) = kkt_step(
                    &hessian,
                    &gradient,
                    &jacobian,
                    &constraints,
                    damping,
                    config.constraint_regularization,
                    config.svd_tolerance,
                ) else {
                    if damping >= config.max_damping {
                        return Err(SolverError::NumericalError(format!(
                            "KKT system singular at iteration {iteration}"
                        )));
                    }
                    damping = (damping * config.damping_increase).max(config.initial_damping);
                    continue;
                };

                let step_norm = inf_norm(&step.direction);
                if step_norm <= config.step_tolerance * (1.0 + inf_norm(&x)) {
                    break None;
                }

                let rho = penalty.max(1.1 * inf_norm(&step.multipliers) + 1e-6);
                let merit = objective + rho * l1_norm(&constraints);
                let derivative = gradient.dot(&step.direction) - rho * l1_norm(&constraints);

                let search = backtracking_line_search(
                    |alpha| {
                        let trial = &x + &step.direction * alpha;
                        program.objective_value(&trial)
                            + rho * l1_norm(&program.constraint_values(&trial))
                    },
                    merit,
                    derivative,
                    &config.line_search,
                );

                if search.converged {
                    penalty = rho;
                    break Some((step, search.alpha));
                }

                if damping >= config.max_damping {
                    break None;
                }
                damping = (damping * config.damping_increase).max(config.initial_damping);
            };

            match accepted {
                Some((step, alpha)) => {
                    debug!(
                        iteration,
                        objective,
                        violation,
                        alpha,
                        damping,
                        "SQP step accepted"
                    );
                    x += &step.direction * alpha;
                    multipliers = step.multipliers;
                    damping = 0.0;
                }
                None => {
                    // No further progress possible from here.
                    if violation <= config.feasibility_tolerance {
                        debug!(iteration, objective, violation, "SQP stalled at feasible point");
                        return Ok(SolveReport {
                            x,
                            objective,
                            max_violation: violation,
                            iterations: iteration,
                            termination: SolveTermination::Stalled,
                        });
                    }
                    return Err(SolverError::Infeasible { violation });
                }
            }
        }

        Err(SolverError::IterationLimitReached {
            iterations: config.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::{QuadraticForm, QuadraticTerm, SumOfSquaresTerm};
    use crate::expression::Polynomial;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn anchor_program(target: &[f64], start: &[f64]) -> NonlinearProgram {
        let target = DVector::from_column_slice(target);
        let mut program = NonlinearProgram::new(DVector::from_column_slice(start));
        program.add_objective(QuadraticTerm::new(
            (0..target.len()).collect(),
            QuadraticForm::anchor(&target, 1.0),
            1.0,
        ));
        program
    }

    #[test]
    fn test_unconstrained_quadratic() {
        let program = anchor_program(&[1.0, -2.0, 0.5], &[0.0, 0.0, 0.0]);
        let report = SqpSolver::default().solve(&program).unwrap();
        assert_relative_eq!(
            report.x,
            DVector::from_column_slice(&[1.0, -2.0, 0.5]),
            epsilon = 1e-8
        );
        assert_relative_eq!(report.objective, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_projection_onto_circle() {
        // Closest point to (2, 0) on the unit circle is (1, 0).
        let mut program = anchor_program(&[2.0, 0.0], &[0.6, 0.6]);
        let x0 = Polynomial::variable(0);
        let x1 = Polynomial::variable(1);
        program.add_constraints([&(&(&x0 * &x0) + &(&x1 * &x1)) - &Polynomial::constant(1.0)]);

        let report = SqpSolver::default().solve(&program).unwrap();
        assert_relative_eq!(report.x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(report.x[1], 0.0, epsilon = 1e-6);
        assert!(report.max_violation <= 1e-9);
    }

    #[test]
    fn test_redundant_linear_constraints() {
        let mut program = anchor_program(&[0.0, 0.0, 3.0], &[0.0, 0.0, 0.0]);
        let x0 = Polynomial::variable(0);
        let x1 = Polynomial::variable(1);
        let sum = &(&x0 + &x1) - &Polynomial::constant(2.0);
        program.add_constraints([sum.clone(), sum.scale(2.0)]);

        let report = SqpSolver::default().solve(&program).unwrap();
        assert_relative_eq!(report.x[0], 1.0, epsilon = 1e-7);
        assert_relative_eq!(report.x[1], 1.0, epsilon = 1e-7);
        assert_relative_eq!(report.x[2], 3.0, epsilon = 1e-7);
    }

    #[test]
    fn test_sum_of_squares_with_unit_normal() {
        // Fit a unit normal n to n ≈ (3, 4, 0) direction via r = n - (0.6, 0.8, 0).
        let mut program = NonlinearProgram::new(DVector::from_column_slice(&[1.0, 0.0, 0.0]));
        let residuals: Vec<Polynomial> = [0.6, 0.8, 0.0]
            .iter()
            .enumerate()
            .map(|(k, v)| &Polynomial::variable(k) - &Polynomial::constant(*v))
            .collect();
        program.add_objective(SumOfSquaresTerm::new(residuals, 1e3));
        let n: Vec<Polynomial> = (0..3).map(Polynomial::variable).collect();
        let norm = n.iter().fold(Polynomial::zero(), |acc, c| &acc + &(c * c));
        program.add_constraints([&norm - &Polynomial::constant(1.0)]);

        let report = SqpSolver::default().solve(&program).unwrap();
        assert_relative_eq!(report.x[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(report.x[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_infeasible_constraints() {
        // x = 1 and x = 2 cannot both hold.
        let mut program = anchor_program(&[0.0], &[0.0]);
        let x = Polynomial::variable(0);
        program.add_constraints([
            &x - &Polynomial::constant(1.0),
            &x - &Polynomial::constant(2.0),
        ]);

        let result = SqpSolver::default().solve(&program);
        assert!(matches!(result, Err(SolverError::Infeasible { .. })));
    }

    #[test]
    fn test_iteration_limit() {
        let mut program = anchor_program(&[2.0, 0.0], &[0.6, 0.6]);
        let x0 = Polynomial::variable(0);
        let x1 = Polynomial::variable(1);
        program.add_constraints([&(&(&x0 * &x0) + &(&x1 * &x1)) - &Polynomial::constant(1.0)]);

        let solver = SqpSolver::new(SolverConfig {
            max_iterations: 1,
            ..Default::default()
        });
        assert_eq!(
            solver.solve(&program).unwrap_err(),
            SolverError::IterationLimitReached { iterations: 1 }
        );
    }

    #[test]
    fn test_non_finite_start() {
        let program = anchor_program(&[0.0], &[f64::NAN]);
        assert!(matches!(
            SqpSolver::default().solve(&program),
            Err(SolverError::NumericalError(_))
        ));
    }

    #[test]
    fn test_jacobian_rows() {
        let mut program = NonlinearProgram::new(DVector::zeros(3));
        let x0 = Polynomial::variable(0);
        let x2 = Polynomial::variable(2);
        program.add_constraints([&x0 * &x2]);
        let x = DVector::from_column_slice(&[2.0, 5.0, -1.0]);
        let jacobian = program.constraint_jacobian(&x);
        assert_eq!(jacobian, DMatrix::from_row_slice(1, 3, &[-1.0, 0.0, 2.0]));
    }
}
