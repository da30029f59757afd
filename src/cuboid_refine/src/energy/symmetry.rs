//! Symmetry alignment energy.
//!
//! A sample's position is `Σ w_i · corner_i` with weights fixed at sampling
//! time, so each matched pair yields a residual
//! `T(p_source) − p_target` that is polynomial in the corner variables and
//! the group parameters. A group contributes `weight × mean ‖residual‖²`
//! over its accepted pairs, or nothing when too few pairs were accepted.

use crate::correspondence::{GroupCorrespondences, SamplePair};
use crate::expression::{Polynomial, VectorExpression};
use crate::geometry::{Cuboid, NUM_CORNERS};
use crate::layout::VariableLayout;
use crate::symmetry::{reflect_expression, rotate_expression};

/// Total energy of the current geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnergyBreakdown {
    /// Weighted data energy.
    pub data: f64,
    /// Weighted symmetry energy summed over groups.
    pub symmetry: f64,
    pub total: f64,
}

impl EnergyBreakdown {
    pub fn new(data: f64, symmetry: f64) -> Self {
        Self {
            data,
            symmetry,
            total: data + symmetry,
        }
    }
}

/// Numeric symmetry energy of one group at the geometry it was matched on.
pub fn symmetry_energy(correspondences: &GroupCorrespondences, weight: f64) -> f64 {
    if correspondences.sufficient {
        weight * correspondences.mean_squared_distance()
    } else {
        0.0
    }
}

/// Position of a sample as an affine expression of its cuboid's corners.
pub fn sample_expression(
    layout: &VariableLayout,
    cuboid: usize,
    weights: &[f64; NUM_CORNERS],
) -> VectorExpression {
    let corners: Vec<VectorExpression> = (0..NUM_CORNERS)
        .map(|i| VectorExpression::variable(layout.corner(cuboid, i)))
        .collect();
    VectorExpression::weighted_sum(weights, &corners)
}

fn pair_expressions(
    layout: &VariableLayout,
    cuboids: &[Cuboid],
    pair: &SamplePair,
) -> (VectorExpression, VectorExpression) {
    let source = &cuboids[pair.source_cuboid].samples()[pair.source_sample];
    let target = &cuboids[pair.target_cuboid].samples()[pair.target_sample];
    (
        sample_expression(layout, pair.source_cuboid, &source.corner_weights),
        sample_expression(layout, pair.target_cuboid, &target.corner_weights),
    )
}

/// Residual components for reflection group `group` (a layout index).
pub fn reflection_residuals(
    layout: &VariableLayout,
    group: usize,
    cuboids: &[Cuboid],
    correspondences: &GroupCorrespondences,
) -> Vec<Polynomial> {
    let normal = VectorExpression::variable(layout.reflection_normal(group));
    let offset = Polynomial::variable(layout.reflection_offset(group).at(0));

    correspondences
        .pairs
        .iter()
        .flat_map(|pair| {
            let (source, target) = pair_expressions(layout, cuboids, pair);
            let image = reflect_expression(&source, &normal, &offset);
            (&image - &target).into_components()
        })
        .collect()
}

/// Residual components for rotation group `group` (a layout index) with
/// step angle `angle`.
pub fn rotation_residuals(
    layout: &VariableLayout,
    group: usize,
    angle: f64,
    cuboids: &[Cuboid],
    correspondences: &GroupCorrespondences,
) -> Vec<Polynomial> {
    let axis = VectorExpression::variable(layout.rotation_normal(group));
    let point = VectorExpression::variable(layout.rotation_point(group));

    correspondences
        .pairs
        .iter()
        .flat_map(|pair| {
            let (source, target) = pair_expressions(layout, cuboids, pair);
            let image = rotate_expression(&source, &axis, &point, angle);
            (&image - &target).into_components()
        })
        .collect()
}
