//! Synthetic scenes with known symmetric ground truth.
//!
//! Each scene carries data anchors at the ideal corners, so a refinement
//! that restores the symmetry should also drive the data energy to zero.

use std::f64::consts::PI;

use nalgebra::{Rotation3, Vector3};

use crate::energy::{corner_vector, DataEnergy, QuadraticForm};
use crate::geometry::{Cuboid, GridSurfaceSampler, SurfaceSampler};
use crate::symmetry::{ReflectionMember, ReflectionSymmetryGroup, RotationSymmetryGroup};

/// Sample spacing used by the scene builders.
pub const SCENE_SPACING: f64 = 0.1;

/// Cuboids, groups and data anchors for one test.
#[derive(Debug, Clone)]
pub struct Scene {
    pub cuboids: Vec<Cuboid>,
    pub reflections: Vec<ReflectionSymmetryGroup>,
    pub rotations: Vec<RotationSymmetryGroup>,
    /// Unit-stiffness anchors at the unperturbed corners.
    pub data: DataEnergy,
}

impl Scene {
    /// Sampler matching the one used to build the scene.
    pub fn sampler(&self) -> GridSurfaceSampler {
        GridSurfaceSampler::with_spacing(SCENE_SPACING)
    }
}

/// Sample every cuboid with the scene sampler.
pub fn sample_all(cuboids: &mut [Cuboid]) {
    let sampler = GridSurfaceSampler::with_spacing(SCENE_SPACING);
    for cuboid in cuboids {
        let samples = sampler.sample(cuboid);
        cuboid.set_samples(samples);
    }
}

fn anchors(ideal: &[Cuboid]) -> DataEnergy {
    ideal.iter().enumerate().fold(DataEnergy::new(), |data, (c, cuboid)| {
        data.with_unary(c, QuadraticForm::anchor(&corner_vector(cuboid), 1.0))
    })
}

/// Center offset applied to cuboid `c` for a given perturbation size.
///
/// Offsets alternate in sign and direction so perturbed scenes are never
/// symmetric by accident.
pub fn center_offset(c: usize, perturbation: f64) -> Vector3<f64> {
    let sign = if c % 2 == 0 { 1.0 } else { -1.0 };
    perturbation * Vector3::new(0.5 * sign, 1.0, -0.7 * sign) * (1.0 + 0.3 * c as f64)
}

/// Two boxes mirrored across the plane `x = 0`.
///
/// Cuboid 0 is centred at `x = 1`, cuboid 1 at `x = -1`, both with side
/// lengths `(0.4, 0.6, 0.8)`. The boxes are translated by
/// [`center_offset`] before sampling.
pub fn mirrored_pair_scene(perturbation: f64) -> Scene {
    let extents = Vector3::new(0.4, 0.6, 0.8);
    let ideal = vec![
        Cuboid::axis_aligned(Vector3::new(1.0, 0.0, 0.0), extents),
        Cuboid::axis_aligned(Vector3::new(-1.0, 0.0, 0.0), extents),
    ];
    let data = anchors(&ideal);

    let mut cuboids: Vec<Cuboid> = ideal
        .iter()
        .enumerate()
        .map(|(c, cuboid)| {
            Cuboid::axis_aligned(cuboid.center() + center_offset(c, perturbation), extents)
        })
        .collect();
    sample_all(&mut cuboids);

    let member = ReflectionMember::Pair {
        first: 0,
        second: 1,
        corner_map: std::array::from_fn(|i| crate::geometry::opposite_corner(i, 0)),
    };

    Scene {
        cuboids,
        reflections: vec![ReflectionSymmetryGroup::new(Vector3::x(), 0.0, vec![member])],
        rotations: Vec::new(),
        data,
    }
}

/// `m` boxes evenly spaced around the z axis at radius 1.5.
///
/// Box `k` is the image of box 0 under a rotation by `2πk/m`, so corner
/// `i` of each box rotates onto corner `i` of the next.
pub fn rotational_ring_scene(m: usize, perturbation: f64) -> Scene {
    let extents = Vector3::new(0.3, 0.5, 0.4);
    let frame = |k: usize| Rotation3::from_axis_angle(&Vector3::z_axis(), 2.0 * PI * k as f64 / m as f64);

    let ideal: Vec<Cuboid> = (0..m)
        .map(|k| {
            let r = frame(k);
            Cuboid::new(
                r * Vector3::new(1.5, 0.0, 0.0),
                [r * Vector3::x(), r * Vector3::y(), Vector3::z()],
                extents,
            )
        })
        .collect();
    let data = anchors(&ideal);

    let mut cuboids: Vec<Cuboid> = ideal
        .iter()
        .enumerate()
        .map(|(k, cuboid)| {
            Cuboid::new(
                cuboid.center() + center_offset(k, perturbation),
                *cuboid.axes(),
                extents,
            )
        })
        .collect();
    sample_all(&mut cuboids);

    let rotations = match RotationSymmetryGroup::new(Vector3::z(), Vector3::zeros(), (0..m).collect()) {
        Ok(group) => vec![group],
        Err(_) => Vec::new(),
    };

    Scene {
        cuboids,
        reflections: Vec::new(),
        rotations,
        data,
    }
}
