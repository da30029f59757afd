//! Quadratic data energies supplied by a relation prior.
//!
//! A form acts on stacked corner coordinates: 24 values for one cuboid
//! (corner 0 xyz, corner 1 xyz, ...) or 48 for an ordered pair of cuboids.

use nalgebra::{DMatrix, DVector};

use crate::error::{RefineError, Result};
use crate::geometry::Cuboid;
use crate::layout::CORNER_VARIABLES;

/// Energy `xᵀAx + 2bᵀx + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticForm {
    pub matrix: DMatrix<f64>,
    pub linear: DVector<f64>,
    pub constant: f64,
}

impl QuadraticForm {
    pub fn new(matrix: DMatrix<f64>, linear: DVector<f64>, constant: f64) -> Self {
        Self {
            matrix,
            linear,
            constant,
        }
    }

    /// The zero form of dimension `dim`.
    pub fn zeros(dim: usize) -> Self {
        Self::new(DMatrix::zeros(dim, dim), DVector::zeros(dim), 0.0)
    }

    /// `stiffness · ‖x − target‖²`.
    pub fn anchor(target: &DVector<f64>, stiffness: f64) -> Self {
        let dim = target.len();
        Self {
            matrix: DMatrix::identity(dim, dim) * stiffness,
            linear: -target * stiffness,
            constant: stiffness * target.norm_squared(),
        }
    }

    pub fn dim(&self) -> usize {
        self.linear.len()
    }

    pub fn evaluate(&self, x: &DVector<f64>) -> f64 {
        (x.transpose() * &self.matrix * x)[(0, 0)] + 2.0 * self.linear.dot(x) + self.constant
    }

    pub(crate) fn check_dim(&self, what: impl FnOnce() -> String, expected: usize) -> Result<()> {
        let actual = [self.linear.len(), self.matrix.nrows(), self.matrix.ncols()]
            .into_iter()
            .find(|d| *d != expected);
        match actual {
            None => Ok(()),
            Some(actual) => Err(RefineError::FormDimension {
                what: what(),
                expected,
                actual,
            }),
        }
    }
}

/// Stacked corner coordinates of one cuboid.
pub fn corner_vector(cuboid: &Cuboid) -> DVector<f64> {
    DVector::from_iterator(
        CORNER_VARIABLES,
        cuboid.corners().iter().flat_map(|c| c.iter().copied()),
    )
}

/// Data energy terms for the current geometry.
#[derive(Debug, Clone, Default)]
pub struct DataEnergy {
    /// Per-cuboid forms over 24 corner coordinates.
    pub unary: Vec<(usize, QuadraticForm)>,
    /// Pair forms over the 48 corner coordinates of `(first, second)`.
    pub pairwise: Vec<((usize, usize), QuadraticForm)>,
}

impl DataEnergy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unary(mut self, cuboid: usize, form: QuadraticForm) -> Self {
        self.unary.push((cuboid, form));
        self
    }

    pub fn with_pairwise(mut self, first: usize, second: usize, form: QuadraticForm) -> Self {
        self.pairwise.push(((first, second), form));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.unary.is_empty() && self.pairwise.is_empty()
    }

    /// Check cuboid indices and form dimensions.
    pub fn validate(&self, num_cuboids: usize) -> Result<()> {
        let in_range = |cuboid: usize| {
            if cuboid < num_cuboids {
                Ok(())
            } else {
                Err(RefineError::MemberOutOfRange {
                    group: "data energy".to_string(),
                    cuboid,
                    num_cuboids,
                })
            }
        };

        for (cuboid, form) in &self.unary {
            in_range(*cuboid)?;
            form.check_dim(|| format!("cuboid {cuboid}"), CORNER_VARIABLES)?;
        }
        for ((first, second), form) in &self.pairwise {
            in_range(*first)?;
            in_range(*second)?;
            form.check_dim(
                || format!("cuboid pair ({first}, {second})"),
                2 * CORNER_VARIABLES,
            )?;
        }
        Ok(())
    }

    /// `data_weight · Σ unary + Σ pairwise` on the current corners.
    pub fn evaluate(&self, cuboids: &[Cuboid], data_weight: f64) -> f64 {
        let unary: f64 = self
            .unary
            .iter()
            .map(|(cuboid, form)| form.evaluate(&corner_vector(&cuboids[*cuboid])))
            .sum();

        let pairwise: f64 = self
            .pairwise
            .iter()
            .map(|((first, second), form)| {
                let a = corner_vector(&cuboids[*first]);
                let b = corner_vector(&cuboids[*second]);
                let stacked = DVector::from_iterator(
                    2 * CORNER_VARIABLES,
                    a.iter().chain(b.iter()).copied(),
                );
                form.evaluate(&stacked)
            })
            .sum();

        data_weight * unary + pairwise
    }
}

/// Source of data energy for the current geometry.
///
/// Queried again before every solve and every energy evaluation, so a
/// prior whose forms depend on the geometry sees the latest state.
pub trait RelationPrior {
    fn data_energy(&self, cuboids: &[Cuboid]) -> DataEnergy;
}

impl RelationPrior for DataEnergy {
    fn data_energy(&self, _cuboids: &[Cuboid]) -> DataEnergy {
        self.clone()
    }
}
