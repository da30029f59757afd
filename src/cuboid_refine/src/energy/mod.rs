//! Objective terms over the decision vector.
//!
//! The solver sees the objective as a list of [`ObjectiveTerm`]s, each able
//! to report its value, gradient and (approximate) Hessian at a point.
//! Data energies become [`QuadraticTerm`]s; symmetry alignment becomes a
//! [`SumOfSquaresTerm`] over polynomial residuals.

pub mod data;
pub mod symmetry;

use nalgebra::{DMatrix, DVector};

use crate::expression::Polynomial;

pub use data::{corner_vector, DataEnergy, QuadraticForm, RelationPrior};
pub use symmetry::{
    reflection_residuals, rotation_residuals, sample_expression, symmetry_energy,
    EnergyBreakdown,
};

/// One smooth summand of the objective.
pub trait ObjectiveTerm {
    fn value(&self, x: &DVector<f64>) -> f64;

    /// `grad += ∇f(x)`.
    fn add_gradient(&self, x: &DVector<f64>, grad: &mut DVector<f64>);

    /// `hessian += ∇²f(x)`, or a positive semi-definite approximation of it.
    fn add_hessian(&self, x: &DVector<f64>, hessian: &mut DMatrix<f64>);
}

/// A [`QuadraticForm`] applied to a gathered subset of variables and scaled
/// by `weight`.
#[derive(Debug, Clone)]
pub struct QuadraticTerm {
    indices: Vec<usize>,
    form: QuadraticForm,
    weight: f64,
    /// `A + Aᵀ`, cached.
    symmetric: DMatrix<f64>,
}

impl QuadraticTerm {
    /// `indices[k]` is the decision variable feeding coordinate `k` of the form.
    pub fn new(indices: Vec<usize>, form: QuadraticForm, weight: f64) -> Self {
        let symmetric = &form.matrix + form.matrix.transpose();
        Self {
            indices,
            form,
            weight,
            symmetric,
        }
    }

    fn gather(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.indices.len(), self.indices.iter().map(|i| x[*i]))
    }
}

impl ObjectiveTerm for QuadraticTerm {
    fn value(&self, x: &DVector<f64>) -> f64 {
        self.weight * self.form.evaluate(&self.gather(x))
    }

    fn add_gradient(&self, x: &DVector<f64>, grad: &mut DVector<f64>) {
        let local = &self.symmetric * self.gather(x) + &self.form.linear * 2.0;
        for (k, i) in self.indices.iter().enumerate() {
            grad[*i] += self.weight * local[k];
        }
    }

    fn add_hessian(&self, _x: &DVector<f64>, hessian: &mut DMatrix<f64>) {
        for (a, i) in self.indices.iter().enumerate() {
            for (b, j) in self.indices.iter().enumerate() {
                hessian[(*i, *j)] += self.weight * self.symmetric[(a, b)];
            }
        }
    }
}

/// `scale · Σ r_k(x)²` with a Gauss–Newton Hessian `2·scale·Σ ∇r_k ∇r_kᵀ`.
#[derive(Debug, Clone)]
pub struct SumOfSquaresTerm {
    residuals: Vec<Polynomial>,
    scale: f64,
}

impl SumOfSquaresTerm {
    pub fn new(residuals: Vec<Polynomial>, scale: f64) -> Self {
        Self { residuals, scale }
    }

    pub fn residuals(&self) -> &[Polynomial] {
        &self.residuals
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl ObjectiveTerm for SumOfSquaresTerm {
    fn value(&self, x: &DVector<f64>) -> f64 {
        self.scale
            * self
                .residuals
                .iter()
                .map(|r| r.evaluate(x).powi(2))
                .sum::<f64>()
    }

    fn add_gradient(&self, x: &DVector<f64>, grad: &mut DVector<f64>) {
        for r in &self.residuals {
            let value = r.evaluate(x);
            if value != 0.0 {
                r.add_gradient(x, 2.0 * self.scale * value, grad);
            }
        }
    }

    fn add_hessian(&self, x: &DVector<f64>, hessian: &mut DMatrix<f64>) {
        for r in &self.residuals {
            let jacobian = r.gradient(x);
            for (i, gi) in &jacobian {
                for (j, gj) in &jacobian {
                    hessian[(*i, *j)] += 2.0 * self.scale * gi * gj;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn finite_difference_gradient(term: &dyn ObjectiveTerm, x: &DVector<f64>) -> DVector<f64> {
        let h = 1e-6;
        DVector::from_fn(x.len(), |i, _| {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[i] += h;
            xm[i] -= h;
            (term.value(&xp) - term.value(&xm)) / (2.0 * h)
        })
    }

    #[test]
    fn test_quadratic_term_gradient() {
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 3.0]);
        let linear = DVector::from_column_slice(&[0.5, -1.0]);
        let term = QuadraticTerm::new(vec![3, 1], QuadraticForm::new(matrix, linear, 4.0), 2.0);
        let x = DVector::from_column_slice(&[0.0, -0.7, 9.0, 1.3]);

        let mut grad = DVector::zeros(4);
        term.add_gradient(&x, &mut grad);
        let fd = finite_difference_gradient(&term, &x);
        assert_relative_eq!(grad, fd, epsilon = 1e-6);
        assert_relative_eq!(grad[0], 0.0);
        assert_relative_eq!(grad[2], 0.0);

        let mut hessian = DMatrix::zeros(4, 4);
        term.add_hessian(&x, &mut hessian);
        // (A + Aᵀ) = [[4, 1], [1, 6]] gathered at (3, 1), times weight 2.
        assert_relative_eq!(hessian[(3, 3)], 8.0);
        assert_relative_eq!(hessian[(1, 1)], 12.0);
        assert_relative_eq!(hessian[(3, 1)], 2.0);
        assert_relative_eq!(hessian[(1, 3)], 2.0);
    }

    #[test]
    fn test_sum_of_squares_value_and_gradient() {
        // r0 = x0·x1 - 1, r1 = x2
        let x0 = Polynomial::variable(0);
        let x1 = Polynomial::variable(1);
        let r0 = &(&x0 * &x1) - &Polynomial::constant(1.0);
        let r1 = Polynomial::variable(2);
        let term = SumOfSquaresTerm::new(vec![r0, r1], 0.5);
        let x = DVector::from_column_slice(&[2.0, 1.5, -0.5]);

        assert_relative_eq!(term.value(&x), 0.5 * (4.0 + 0.25));

        let mut grad = DVector::zeros(3);
        term.add_gradient(&x, &mut grad);
        assert_relative_eq!(grad, finite_difference_gradient(&term, &x), epsilon = 1e-6);
    }

    #[test]
    fn test_gauss_newton_hessian_is_psd() {
        let x0 = Polynomial::variable(0);
        let x1 = Polynomial::variable(1);
        let term = SumOfSquaresTerm::new(vec![&x0 * &x1, &x0 - &x1], 1.0);
        let x = DVector::from_column_slice(&[0.3, -2.0]);

        let mut hessian = DMatrix::zeros(2, 2);
        term.add_hessian(&x, &mut hessian);
        assert_relative_eq!(hessian, hessian.transpose());
        let eigen = hessian.symmetric_eigenvalues();
        assert!(eigen.iter().all(|e| *e > -1e-12));
    }
}
