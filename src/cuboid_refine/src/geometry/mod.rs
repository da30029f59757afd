//! Cuboid parts and their surface samples.
//!
//! A cuboid is stored redundantly as (center, axes, extents) and as its 8
//! corners. The solver writes corners and axes directly; the remaining
//! fields are refit afterwards by one of the `update_*` methods.
//!
//! Corner `i` lies at `center + Σ_k s_k(i) · extent_k / 2 · axis_k` where
//! `s_k(i)` is `+1` when bit `k` of `i` is set and `-1` otherwise.

pub mod sampling;

use nalgebra::Vector3;

pub use sampling::{GridSurfaceSampler, SamplePoint, SurfaceSampler};

/// Number of corners of a cuboid.
pub const NUM_CORNERS: usize = 8;

/// Sign of corner `corner` along axis `axis`.
#[inline]
pub fn corner_sign(corner: usize, axis: usize) -> f64 {
    if (corner >> axis) & 1 == 1 {
        1.0
    } else {
        -1.0
    }
}

/// Corner index that differs from `corner` only along `axis`.
#[inline]
pub fn opposite_corner(corner: usize, axis: usize) -> usize {
    corner ^ (1 << axis)
}

/// An oriented box representing one shape part.
#[derive(Debug, Clone, PartialEq)]
pub struct Cuboid {
    center: Vector3<f64>,
    axes: [Vector3<f64>; 3],
    extents: Vector3<f64>,
    corners: [Vector3<f64>; NUM_CORNERS],
    samples: Vec<SamplePoint>,
}

impl Cuboid {
    /// Create a cuboid from center, orthonormal axes and full side lengths.
    pub fn new(center: Vector3<f64>, axes: [Vector3<f64>; 3], extents: Vector3<f64>) -> Self {
        let mut cuboid = Self {
            center,
            axes,
            extents,
            corners: [Vector3::zeros(); NUM_CORNERS],
            samples: Vec::new(),
        };
        cuboid.update_corners();
        cuboid
    }

    /// Axis-aligned cuboid.
    pub fn axis_aligned(center: Vector3<f64>, extents: Vector3<f64>) -> Self {
        Self::new(center, [Vector3::x(), Vector3::y(), Vector3::z()], extents)
    }

    /// Build a cuboid from 8 corners, estimating axes from the corner edges.
    pub fn from_corners(corners: [Vector3<f64>; NUM_CORNERS]) -> Self {
        let mut cuboid = Self {
            center: Vector3::zeros(),
            axes: [Vector3::x(), Vector3::y(), Vector3::z()],
            extents: Vector3::zeros(),
            corners,
            samples: Vec::new(),
        };
        cuboid.update_axes_center_extents_corners();
        cuboid
    }

    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    pub fn axes(&self) -> &[Vector3<f64>; 3] {
        &self.axes
    }

    pub fn axis(&self, axis: usize) -> &Vector3<f64> {
        &self.axes[axis]
    }

    /// Full side lengths along each axis.
    pub fn extents(&self) -> &Vector3<f64> {
        &self.extents
    }

    pub fn corners(&self) -> &[Vector3<f64>; NUM_CORNERS] {
        &self.corners
    }

    pub fn corner(&self, corner: usize) -> &Vector3<f64> {
        &self.corners[corner]
    }

    pub fn samples(&self) -> &[SamplePoint] {
        &self.samples
    }

    pub fn set_samples(&mut self, samples: Vec<SamplePoint>) {
        self.samples = samples;
    }

    /// Overwrite corners and axes with solved values.
    ///
    /// Center and extents are left stale until one of the `update_*`
    /// methods runs.
    pub fn set_corners_and_axes(
        &mut self,
        corners: [Vector3<f64>; NUM_CORNERS],
        axes: [Vector3<f64>; 3],
    ) {
        self.corners = corners;
        self.axes = axes;
    }

    /// Whether every stored quantity is finite.
    pub fn is_finite(&self) -> bool {
        let finite = |v: &Vector3<f64>| v.iter().all(|c| c.is_finite());
        finite(&self.center)
            && finite(&self.extents)
            && self.axes.iter().all(finite)
            && self.corners.iter().all(finite)
    }

    /// Recompute corners from (center, axes, extents).
    pub fn update_corners(&mut self) {
        for (i, corner) in self.corners.iter_mut().enumerate() {
            let mut p = self.center;
            for k in 0..3 {
                p += corner_sign(i, k) * 0.5 * self.extents[k] * self.axes[k];
            }
            *corner = p;
        }
    }

    /// Keep the axes, refit center and extents to the corners, then
    /// recompute the corners.
    pub fn update_center_extents_corners(&mut self) {
        let mut center = Vector3::zeros();
        for k in 0..3 {
            let axis = self.axes[k];
            let (min, max) = self
                .corners
                .iter()
                .map(|c| c.dot(&axis))
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            self.extents[k] = max - min;
            center += 0.5 * (min + max) * axis;
        }
        self.center = center;
        self.update_corners();
    }

    /// Re-estimate orthonormal axes from the corner edges, then refit
    /// center, extents and corners.
    pub fn update_axes_center_extents_corners(&mut self) {
        let mut directions = [Vector3::zeros(); 3];
        for (k, direction) in directions.iter_mut().enumerate() {
            for i in (0..NUM_CORNERS).filter(|i| corner_sign(*i, k) > 0.0) {
                *direction += self.corners[i] - self.corners[opposite_corner(i, k)];
            }
        }

        if let Some(axes) = orthonormalize(directions) {
            self.axes = axes;
        }
        self.update_center_extents_corners();
    }

    /// Trilinear corner weights of `point` in the cuboid frame.
    ///
    /// Points inside or on the box get non-negative weights summing to one;
    /// `Σ w_i · corner_i` reproduces the point.
    pub fn corner_weights(&self, point: &Vector3<f64>) -> [f64; NUM_CORNERS] {
        let offset = point - self.center;
        let mut local = [0.5; 3];
        for (k, l) in local.iter_mut().enumerate() {
            if self.extents[k] > f64::EPSILON {
                *l = offset.dot(&self.axes[k]) / self.extents[k] + 0.5;
            }
        }
        trilinear_weights(&local)
    }

    /// Evaluate a weighted combination of the current corners.
    pub fn interpolate(&self, weights: &[f64; NUM_CORNERS]) -> Vector3<f64> {
        self.corners
            .iter()
            .zip(weights.iter())
            .fold(Vector3::zeros(), |acc, (c, w)| acc + c * *w)
    }

    /// Recompute cached sample positions and normals from the current
    /// corners and axes without resampling.
    pub fn refresh_sample_positions(&mut self) {
        let corners = self.corners;
        let axes = self.axes;
        for sample in &mut self.samples {
            let position = corners
                .iter()
                .zip(sample.corner_weights.iter())
                .fold(Vector3::zeros(), |acc, (c, w)| acc + c * *w);
            sample.position = position;
            if let Some(face) = sample.face {
                sample.normal = face_normal(&axes, face);
            }
        }
    }

    /// Volume of the box.
    pub fn volume(&self) -> f64 {
        self.extents.x * self.extents.y * self.extents.z
    }
}

/// Trilinear weights for local coordinates in `[0, 1]^3`.
pub fn trilinear_weights(local: &[f64; 3]) -> [f64; NUM_CORNERS] {
    let mut weights = [1.0; NUM_CORNERS];
    for (i, w) in weights.iter_mut().enumerate() {
        for (k, l) in local.iter().enumerate() {
            *w *= if corner_sign(i, k) > 0.0 { *l } else { 1.0 - *l };
        }
    }
    weights
}

/// Outward normal of face `face` (0..6): faces `0..3` point along
/// `+axis_k`, faces `3..6` along `-axis_{k-3}`.
pub fn face_normal(axes: &[Vector3<f64>; 3], face: usize) -> Vector3<f64> {
    if face < 3 {
        axes[face]
    } else {
        -axes[face - 3]
    }
}

/// Gram–Schmidt orthonormalisation keeping the first direction fixed.
///
/// Returns `None` when the directions are degenerate.
pub fn orthonormalize(directions: [Vector3<f64>; 3]) -> Option<[Vector3<f64>; 3]> {
    let x = directions[0].try_normalize(f64::EPSILON)?;
    let y = (directions[1] - directions[1].dot(&x) * x).try_normalize(f64::EPSILON)?;
    let mut z = x.cross(&y);
    if z.dot(&directions[2]) < 0.0 {
        z = -z;
    }
    Some([x, y, z])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn rotated_cuboid() -> Cuboid {
        let rotation = Rotation3::from_euler_angles(0.2, -0.4, 0.7);
        Cuboid::new(
            Vector3::new(1.0, -2.0, 0.5),
            [
                rotation * Vector3::x(),
                rotation * Vector3::y(),
                rotation * Vector3::z(),
            ],
            Vector3::new(2.0, 1.0, 0.5),
        )
    }

    #[test]
    fn test_axis_aligned_corners() {
        let cuboid = Cuboid::axis_aligned(Vector3::zeros(), Vector3::new(2.0, 4.0, 6.0));

        assert_eq!(cuboid.corner(0), &Vector3::new(-1.0, -2.0, -3.0));
        assert_eq!(cuboid.corner(1), &Vector3::new(1.0, -2.0, -3.0));
        assert_eq!(cuboid.corner(6), &Vector3::new(-1.0, 2.0, 3.0));
        assert_eq!(cuboid.corner(7), &Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(cuboid.volume(), 48.0);
    }

    #[test]
    fn test_opposite_corner() {
        assert_eq!(opposite_corner(0, 0), 1);
        assert_eq!(opposite_corner(5, 2), 1);
        assert_eq!(opposite_corner(3, 1), 1);
    }

    #[test]
    fn test_refit_center_extents_is_identity_on_box() {
        let mut cuboid = rotated_cuboid();
        let before = cuboid.clone();
        cuboid.update_center_extents_corners();

        assert_relative_eq!(cuboid.center(), before.center(), epsilon = 1e-12);
        assert_relative_eq!(cuboid.extents(), before.extents(), epsilon = 1e-12);
        for i in 0..NUM_CORNERS {
            assert_relative_eq!(cuboid.corner(i), before.corner(i), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_from_corners_recovers_box() {
        let original = rotated_cuboid();
        let rebuilt = Cuboid::from_corners(*original.corners());

        assert_relative_eq!(rebuilt.center(), original.center(), epsilon = 1e-10);
        assert_relative_eq!(rebuilt.extents(), original.extents(), epsilon = 1e-10);
        for k in 0..3 {
            assert_relative_eq!(rebuilt.axis(k), original.axis(k), epsilon = 1e-10);
        }
    }

    #[test]
    fn test_update_axes_orthonormalizes_skewed_corners() {
        let mut corners = *Cuboid::axis_aligned(Vector3::zeros(), Vector3::new(2.0, 2.0, 2.0))
            .corners();
        corners[7] += Vector3::new(0.05, -0.03, 0.02);

        let cuboid = Cuboid::from_corners(corners);
        let axes = cuboid.axes();
        for k in 0..3 {
            assert_relative_eq!(axes[k].norm(), 1.0, epsilon = 1e-12);
        }
        assert!(axes[0].dot(&axes[1]).abs() < 1e-12);
        assert!(axes[0].dot(&axes[2]).abs() < 1e-12);
        assert!(axes[1].dot(&axes[2]).abs() < 1e-12);
    }

    #[test]
    fn test_corner_weights_reproduce_point() {
        let cuboid = rotated_cuboid();
        let point = cuboid.center() + cuboid.axis(0) * 0.3 - cuboid.axis(2) * 0.1;
        let weights = cuboid.corner_weights(&point);

        assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(cuboid.interpolate(&weights), point, epsilon = 1e-12);
    }

    #[test]
    fn test_corner_weights_at_corner() {
        let cuboid = rotated_cuboid();
        let weights = cuboid.corner_weights(cuboid.corner(5));
        for (i, w) in weights.iter().enumerate() {
            let expected = if i == 5 { 1.0 } else { 0.0 };
            assert_relative_eq!(*w, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_orthonormalize_degenerate() {
        let d = Vector3::new(1.0, 0.0, 0.0);
        assert!(orthonormalize([d, d, Vector3::z()]).is_none());
    }

    #[test]
    fn test_non_finite_detection() {
        let mut cuboid = rotated_cuboid();
        assert!(cuboid.is_finite());
        let mut corners = *cuboid.corners();
        corners[2].x = f64::NAN;
        let axes = *cuboid.axes();
        cuboid.set_corners_and_axes(corners, axes);
        assert!(!cuboid.is_finite());
    }
}
