//! Newton–KKT step for equality-constrained problems.
//!
//! The step solves
//!
//! ```text
//! [ W + μI   Jᵀ ] [ d ]   [ -g ]
//! [ J       -δI ] [ λ ] = [ -c ]
//! ```
//!
//! where `W` is the Hessian of the Lagrangian, `J` the constraint Jacobian,
//! `μ` a Levenberg damping and `δ` a small regularisation that keeps the
//! system solvable when constraints are redundant.
//!
//! We use SVD for numerical stability: the KKT matrix is indefinite and,
//! with redundant constraints, close to singular.

use nalgebra::{DMatrix, DVector};

/// Primal direction and multiplier estimate from one KKT solve.
#[derive(Debug, Clone)]
pub struct KktStep {
    pub direction: DVector<f64>,
    pub multipliers: DVector<f64>,
}

/// Assemble the regularised KKT matrix.
pub fn kkt_matrix(
    hessian: &DMatrix<f64>,
    jacobian: &DMatrix<f64>,
    damping: f64,
    regularization: f64,
) -> DMatrix<f64> {
    let n = hessian.nrows();
    let m = jacobian.nrows();
    let mut kkt = DMatrix::zeros(n + m, n + m);

    kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
    for i in 0..n {
        kkt[(i, i)] += damping;
    }
    if m > 0 {
        kkt.view_mut((n, 0), (m, n)).copy_from(jacobian);
        kkt.view_mut((0, n), (n, m)).copy_from(&jacobian.transpose());
        for i in 0..m {
            kkt[(n + i, n + i)] = -regularization;
        }
    }
    kkt
}

/// Solve the damped KKT system.
///
/// # Arguments
/// * `tolerance` - Singular values below `tolerance × σ_max` are dropped
///
/// # Returns
/// The step, or None if the system is zero or the solve is not finite.
pub fn kkt_step(
    hessian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    jacobian: &DMatrix<f64>,
    constraints: &DVector<f64>,
    damping: f64,
    regularization: f64,
    tolerance: f64,
) -> Option<KktStep> {
    let n = gradient.len();
    let m = constraints.len();

    let kkt = kkt_matrix(hessian, jacobian, damping, regularization);
    let mut rhs = DVector::zeros(n + m);
    rhs.rows_mut(0, n).copy_from(&(-gradient));
    rhs.rows_mut(n, m).copy_from(&(-constraints));

    let svd = kkt.svd(true, true);
    let max_sv = svd.singular_values.max();
    if !(max_sv > 0.0) || !max_sv.is_finite() {
        return None;
    }

    let solution = svd.solve(&rhs, tolerance * max_sv).ok()?;
    if solution.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(KktStep {
        direction: solution.rows(0, n).into_owned(),
        multipliers: solution.rows(n, m).into_owned(),
    })
}

/// Condition number of a matrix (ratio of extreme singular values).
///
/// Returns f64::INFINITY if the smallest singular value is zero.
pub fn condition_number(matrix: &DMatrix<f64>) -> f64 {
    let svd = matrix.clone().svd(false, false);
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();

    if min_sv < 1e-15 {
        f64::INFINITY
    } else {
        max_sv / min_sv
    }
}
