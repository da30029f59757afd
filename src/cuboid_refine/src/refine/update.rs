//! Write-back of solved values and best-state snapshots.
//!
//! These are the only places where caller-owned cuboids and groups are
//! mutated during a refinement.

use nalgebra::{DVector, Vector3};

use crate::geometry::{Cuboid, NUM_CORNERS};
use crate::layout::VarRange;
use crate::symmetry::{ReflectionSymmetryGroup, RotationSymmetryGroup};

use super::assembly::AssembledProgram;
use super::config::{CuboidizeMode, RefinementConfig};

fn read_vector(x: &DVector<f64>, range: VarRange) -> Vector3<f64> {
    Vector3::new(x[range.at(0)], x[range.at(1)], x[range.at(2)])
}

/// Copy a solved vector into the cuboids and the solved groups.
///
/// Fixed cuboids are skipped. Every other cuboid gets its corners and axes
/// overwritten, is refit according to the cuboidize mode, and has its
/// sample positions refreshed so correspondences stay valid until the
/// next resampling.
pub fn write_back(
    x: &DVector<f64>,
    assembled: &AssembledProgram,
    cuboids: &mut [Cuboid],
    reflections: &mut [ReflectionSymmetryGroup],
    rotations: &mut [RotationSymmetryGroup],
    config: &RefinementConfig,
) {
    let layout = &assembled.layout;

    for (c, cuboid) in cuboids.iter_mut().enumerate() {
        if config.is_fixed(c) {
            continue;
        }
        let corners: [Vector3<f64>; NUM_CORNERS] =
            std::array::from_fn(|i| read_vector(x, layout.corner(c, i)));
        let axes: [Vector3<f64>; 3] = std::array::from_fn(|a| read_vector(x, layout.axis(c, a)));

        cuboid.set_corners_and_axes(corners, axes);
        match config.cuboidize {
            CuboidizeMode::FromSolvedAxes => cuboid.update_center_extents_corners(),
            CuboidizeMode::FromCorners => cuboid.update_axes_center_extents_corners(),
        }
        cuboid.refresh_sample_positions();
    }

    for (local, global) in assembled.groups.reflections.iter().enumerate() {
        let normal = read_vector(x, layout.reflection_normal(local));
        let offset = x[layout.reflection_offset(local).at(0)];
        reflections[*global].set_plane(normal, offset);
    }
    for (local, global) in assembled.groups.rotations.iter().enumerate() {
        let axis = read_vector(x, layout.rotation_normal(local));
        let point = read_vector(x, layout.rotation_point(local));
        rotations[*global].set_axis(axis, point);
    }
}

/// Copy of all mutable refinement state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    cuboids: Vec<Cuboid>,
    reflections: Vec<ReflectionSymmetryGroup>,
    rotations: Vec<RotationSymmetryGroup>,
}

impl Snapshot {
    pub fn capture(
        cuboids: &[Cuboid],
        reflections: &[ReflectionSymmetryGroup],
        rotations: &[RotationSymmetryGroup],
    ) -> Self {
        Self {
            cuboids: cuboids.to_vec(),
            reflections: reflections.to_vec(),
            rotations: rotations.to_vec(),
        }
    }

    pub fn restore(
        &self,
        cuboids: &mut [Cuboid],
        reflections: &mut [ReflectionSymmetryGroup],
        rotations: &mut [RotationSymmetryGroup],
    ) {
        cuboids.clone_from_slice(&self.cuboids);
        reflections.clone_from_slice(&self.reflections);
        rotations.clone_from_slice(&self.rotations);
    }
}

/// Best total energy seen so far and the state that produced it.
#[derive(Debug, Clone)]
pub struct BestState {
    energy: f64,
    iteration: usize,
    snapshot: Snapshot,
}

impl BestState {
    pub fn new(energy: f64, snapshot: Snapshot) -> Self {
        Self {
            energy,
            iteration: 0,
            snapshot,
        }
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Whether `energy` rose above the best by more than `(ratio - 1)`
    /// times its magnitude. For a non-negative best this is
    /// `energy > ratio × best`; a negative best keeps the same margin
    /// instead of flipping the inequality.
    pub fn is_diverged(&self, energy: f64, ratio: f64) -> bool {
        !energy.is_finite() || energy > self.energy + (ratio - 1.0) * self.energy.abs()
    }

    /// Record `energy` if it improves on the best. The snapshot is taken
    /// lazily, only on improvement.
    pub fn offer(&mut self, energy: f64, iteration: usize, capture: impl FnOnce() -> Snapshot) -> bool {
        if energy < self.energy {
            self.energy = energy;
            self.iteration = iteration;
            self.snapshot = capture();
            true
        } else {
            false
        }
    }
}
