//! Sparse polynomial expressions over the decision vector.
//!
//! Every energy residual and equality constraint in this crate is a low
//! degree polynomial in the decision variables (corner coordinates, axis
//! components and symmetry parameters), so a sum of monomials gives exact
//! values, gradients and Hessians without any automatic differentiation.

use std::collections::BTreeMap;
use std::ops::{Add, Mul, Neg, Sub};

use nalgebra::{DMatrix, DVector, Vector3};

use crate::layout::VarRange;

/// `coefficient · Π x[variables[j]]`; repeated indices encode powers.
#[derive(Debug, Clone, PartialEq)]
pub struct Monomial {
    pub coefficient: f64,
    /// Sorted variable indices.
    pub variables: Vec<usize>,
}

impl Monomial {
    fn product_except(&self, x: &DVector<f64>, skip: &[usize]) -> f64 {
        self.variables
            .iter()
            .enumerate()
            .filter(|(j, _)| !skip.contains(j))
            .fold(self.coefficient, |acc, (_, v)| acc * x[*v])
    }
}

/// A polynomial in the decision variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polynomial {
    terms: Vec<Monomial>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        if value == 0.0 {
            return Self::zero();
        }
        Self {
            terms: vec![Monomial {
                coefficient: value,
                variables: Vec::new(),
            }],
        }
    }

    /// The single variable `x[index]`.
    pub fn variable(index: usize) -> Self {
        Self {
            terms: vec![Monomial {
                coefficient: 1.0,
                variables: vec![index],
            }],
        }
    }

    pub fn terms(&self) -> &[Monomial] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn degree(&self) -> usize {
        self.terms
            .iter()
            .map(|m| m.variables.len())
            .max()
            .unwrap_or(0)
    }

    /// Distinct variable indices appearing in the polynomial.
    pub fn variables(&self) -> Vec<usize> {
        let mut vars: Vec<usize> = self
            .terms
            .iter()
            .flat_map(|m| m.variables.iter().copied())
            .collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    pub fn scale(&self, factor: f64) -> Self {
        if factor == 0.0 {
            return Self::zero();
        }
        Self {
            terms: self
                .terms
                .iter()
                .map(|m| Monomial {
                    coefficient: m.coefficient * factor,
                    variables: m.variables.clone(),
                })
                .collect(),
        }
    }

    /// Merge like terms and drop zero coefficients.
    fn simplified(terms: Vec<Monomial>) -> Self {
        let mut merged: BTreeMap<Vec<usize>, f64> = BTreeMap::new();
        for m in terms {
            *merged.entry(m.variables).or_insert(0.0) += m.coefficient;
        }
        Self {
            terms: merged
                .into_iter()
                .filter(|(_, c)| *c != 0.0)
                .map(|(variables, coefficient)| Monomial {
                    coefficient,
                    variables,
                })
                .collect(),
        }
    }

    pub fn evaluate(&self, x: &DVector<f64>) -> f64 {
        self.terms.iter().map(|m| m.product_except(x, &[])).sum()
    }

    /// Sparse gradient as (index, value) pairs, one entry per distinct
    /// variable.
    pub fn gradient(&self, x: &DVector<f64>) -> Vec<(usize, f64)> {
        let mut entries: BTreeMap<usize, f64> = BTreeMap::new();
        for m in &self.terms {
            for (j, v) in m.variables.iter().enumerate() {
                *entries.entry(*v).or_insert(0.0) += m.product_except(x, &[j]);
            }
        }
        entries.into_iter().collect()
    }

    /// `grad += scale · ∇p(x)`.
    pub fn add_gradient(&self, x: &DVector<f64>, scale: f64, grad: &mut DVector<f64>) {
        for m in &self.terms {
            for (j, v) in m.variables.iter().enumerate() {
                grad[*v] += scale * m.product_except(x, &[j]);
            }
        }
    }

    /// `hessian += scale · ∇²p(x)`.
    pub fn add_hessian(&self, x: &DVector<f64>, scale: f64, hessian: &mut DMatrix<f64>) {
        for m in self.terms.iter().filter(|m| m.variables.len() >= 2) {
            let vars = &m.variables;
            for a in 0..vars.len() {
                for b in 0..vars.len() {
                    if a != b {
                        hessian[(vars[a], vars[b])] += scale * m.product_except(x, &[a, b]);
                    }
                }
            }
        }
    }
}

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        Polynomial::simplified(self.terms.iter().chain(rhs.terms.iter()).cloned().collect())
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        self + &(-rhs)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &Polynomial) -> Polynomial {
        let mut terms = Vec::with_capacity(self.terms.len() * rhs.terms.len());
        for a in &self.terms {
            for b in &rhs.terms {
                let mut variables = Vec::with_capacity(a.variables.len() + b.variables.len());
                variables.extend_from_slice(&a.variables);
                variables.extend_from_slice(&b.variables);
                variables.sort_unstable();
                terms.push(Monomial {
                    coefficient: a.coefficient * b.coefficient,
                    variables,
                });
            }
        }
        Polynomial::simplified(terms)
    }
}

macro_rules! forward_owned_binop {
    ($trait:ident, $method:ident) => {
        impl $trait for Polynomial {
            type Output = Polynomial;

            fn $method(self, rhs: Polynomial) -> Polynomial {
                (&self).$method(&rhs)
            }
        }
    };
}

forward_owned_binop!(Add, add);
forward_owned_binop!(Sub, sub);
forward_owned_binop!(Mul, mul);

/// A 3-vector of polynomials.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorExpression {
    pub components: [Polynomial; 3],
}

impl VectorExpression {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Three consecutive decision variables.
    pub fn variable(range: VarRange) -> Self {
        assert_eq!(range.size, 3, "vector variable needs 3 components");
        Self {
            components: [
                Polynomial::variable(range.at(0)),
                Polynomial::variable(range.at(1)),
                Polynomial::variable(range.at(2)),
            ],
        }
    }

    pub fn constant(value: &Vector3<f64>) -> Self {
        Self {
            components: [
                Polynomial::constant(value.x),
                Polynomial::constant(value.y),
                Polynomial::constant(value.z),
            ],
        }
    }

    /// `Σ w_i · v_i`, skipping zero weights.
    pub fn weighted_sum(weights: &[f64], vectors: &[VectorExpression]) -> Self {
        weights
            .iter()
            .zip(vectors)
            .filter(|(w, _)| **w != 0.0)
            .fold(Self::zero(), |acc, (w, v)| &acc + &v.scale(*w))
    }

    pub fn component(&self, k: usize) -> &Polynomial {
        &self.components[k]
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            components: [
                self.components[0].scale(factor),
                self.components[1].scale(factor),
                self.components[2].scale(factor),
            ],
        }
    }

    /// Multiply every component by a scalar polynomial.
    pub fn scale_by(&self, factor: &Polynomial) -> Self {
        Self {
            components: [
                &self.components[0] * factor,
                &self.components[1] * factor,
                &self.components[2] * factor,
            ],
        }
    }

    pub fn dot(&self, rhs: &VectorExpression) -> Polynomial {
        let xx = &self.components[0] * &rhs.components[0];
        let yy = &self.components[1] * &rhs.components[1];
        let zz = &self.components[2] * &rhs.components[2];
        &(&xx + &yy) + &zz
    }

    pub fn cross(&self, rhs: &VectorExpression) -> Self {
        let [ax, ay, az] = &self.components;
        let [bx, by, bz] = &rhs.components;
        Self {
            components: [
                &(ay * bz) - &(az * by),
                &(az * bx) - &(ax * bz),
                &(ax * by) - &(ay * bx),
            ],
        }
    }

    pub fn squared_norm(&self) -> Polynomial {
        self.dot(self)
    }

    pub fn evaluate(&self, x: &DVector<f64>) -> Vector3<f64> {
        Vector3::new(
            self.components[0].evaluate(x),
            self.components[1].evaluate(x),
            self.components[2].evaluate(x),
        )
    }

    pub fn into_components(self) -> [Polynomial; 3] {
        self.components
    }
}

impl Add for &VectorExpression {
    type Output = VectorExpression;

    fn add(self, rhs: &VectorExpression) -> VectorExpression {
        VectorExpression {
            components: [
                &self.components[0] + &rhs.components[0],
                &self.components[1] + &rhs.components[1],
                &self.components[2] + &rhs.components[2],
            ],
        }
    }
}

impl Sub for &VectorExpression {
    type Output = VectorExpression;

    fn sub(self, rhs: &VectorExpression) -> VectorExpression {
        VectorExpression {
            components: [
                &self.components[0] - &rhs.components[0],
                &self.components[1] - &rhs.components[1],
                &self.components[2] - &rhs.components[2],
            ],
        }
    }
}
