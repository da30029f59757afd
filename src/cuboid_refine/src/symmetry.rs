//! Reflection and rotation symmetry groups between cuboids.
//!
//! A reflection group is a plane `{p : p·n = t}`; a point maps to
//! `p - 2(p·n - t)n`. A rotation group is an axis through `t` with
//! direction `n`; the `m` member cuboids form a cycle and member `k`
//! maps onto member `k + 1` under a rotation of `2π/m`.
//!
//! Each transform exists twice: numerically on `Vector3` for energy
//! evaluation and correspondence search, and symbolically on
//! `VectorExpression` for the solver.

use std::f64::consts::PI;

use nalgebra::{Rotation3, Unit, Vector3};

use crate::error::{RefineError, Result};
use crate::expression::{Polynomial, VectorExpression};
use crate::geometry::{opposite_corner, Cuboid, NUM_CORNERS};

/// Mirror `point` across the plane `p·n = t`.
pub fn reflect_point(point: &Vector3<f64>, normal: &Vector3<f64>, offset: f64) -> Vector3<f64> {
    point - normal * (2.0 * (point.dot(normal) - offset))
}

/// Symbolic form of [`reflect_point`].
pub fn reflect_expression(
    point: &VectorExpression,
    normal: &VectorExpression,
    offset: &Polynomial,
) -> VectorExpression {
    let signed_distance = &point.dot(normal) - offset;
    point - &normal.scale_by(&signed_distance.scale(2.0))
}

/// Rotate `point` by `angle` about the axis through `center` along `axis`.
pub fn rotate_point(
    point: &Vector3<f64>,
    axis: &Vector3<f64>,
    center: &Vector3<f64>,
    angle: f64,
) -> Vector3<f64> {
    match Unit::try_new(*axis, f64::EPSILON) {
        Some(unit) => Rotation3::from_axis_angle(&unit, angle) * (point - center) + center,
        None => *point,
    }
}

/// Symbolic Rodrigues rotation, valid when `axis` has unit length:
/// `R v = cos θ · v + sin θ · (n × v) + (1 - cos θ)(n·v) n` with
/// `v = p - t`.
pub fn rotate_expression(
    point: &VectorExpression,
    axis: &VectorExpression,
    center: &VectorExpression,
    angle: f64,
) -> VectorExpression {
    let (sin, cos) = angle.sin_cos();
    let v = point - center;
    let along = axis.scale_by(&v.dot(axis).scale(1.0 - cos));
    let rotated = &(&v.scale(cos) + &axis.cross(&v).scale(sin)) + &along;
    &rotated + center
}

/// How a reflection group relates its member cuboids.
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectionMember {
    /// One cuboid mirrored onto itself; its `axis` is the one crossing the
    /// plane, so corner `i` mirrors corner `i ^ (1 << axis)`.
    SelfSymmetric { cuboid: usize, axis: usize },
    /// Two cuboids mirrored onto each other; corner `i` of `first` mirrors
    /// corner `corner_map[i]` of `second`.
    Pair {
        first: usize,
        second: usize,
        corner_map: [usize; NUM_CORNERS],
    },
}

impl ReflectionMember {
    pub fn self_symmetric(cuboid: usize, axis: usize) -> Result<Self> {
        if axis >= 3 {
            return Err(RefineError::InvalidAxis(axis));
        }
        Ok(Self::SelfSymmetric { cuboid, axis })
    }

    /// Pair whose corners mirror along `axis` in both cuboid frames.
    pub fn pair_along_axis(first: usize, second: usize, axis: usize) -> Result<Self> {
        if axis >= 3 {
            return Err(RefineError::InvalidAxis(axis));
        }
        let corner_map = std::array::from_fn(|i| opposite_corner(i, axis));
        Ok(Self::Pair {
            first,
            second,
            corner_map,
        })
    }

    /// Pair whose corner map is read off the current geometry: each corner
    /// of `first` is mirrored and matched to the nearest corner of `second`.
    pub fn pair_from_geometry(
        first: usize,
        second: usize,
        cuboids: &[Cuboid],
        normal: &Vector3<f64>,
        offset: f64,
    ) -> Self {
        let corner_map = nearest_corner_map(&cuboids[first], &cuboids[second], |p| {
            reflect_point(p, normal, offset)
        });
        Self::Pair {
            first,
            second,
            corner_map,
        }
    }

    /// Cuboids referenced by this member.
    pub fn cuboids(&self) -> Vec<usize> {
        match self {
            Self::SelfSymmetric { cuboid, .. } => vec![*cuboid],
            Self::Pair { first, second, .. } => vec![*first, *second],
        }
    }

    /// Mirrored corner pairs `((cuboid, corner), (cuboid, corner))`, each
    /// unordered pair listed once.
    pub fn corner_pairs(&self) -> Vec<((usize, usize), (usize, usize))> {
        match self {
            Self::SelfSymmetric { cuboid, axis } => (0..NUM_CORNERS)
                .filter(|i| (i >> axis) & 1 == 0)
                .map(|i| ((*cuboid, i), (*cuboid, opposite_corner(i, *axis))))
                .collect(),
            Self::Pair {
                first,
                second,
                corner_map,
            } => (0..NUM_CORNERS)
                .map(|i| ((*first, i), (*second, corner_map[i])))
                .collect(),
        }
    }

    /// Cuboid whose samples are transformed, and the cuboid searched for
    /// their mirror images.
    pub fn sample_direction(&self) -> (usize, usize) {
        match self {
            Self::SelfSymmetric { cuboid, .. } => (*cuboid, *cuboid),
            Self::Pair { first, second, .. } => (*first, *second),
        }
    }
}

/// Cuboids related by mirroring across one plane.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionSymmetryGroup {
    normal: Vector3<f64>,
    offset: f64,
    members: Vec<ReflectionMember>,
}

impl ReflectionSymmetryGroup {
    /// Plane `p·n = t`; the normal is normalised.
    pub fn new(normal: Vector3<f64>, offset: f64, members: Vec<ReflectionMember>) -> Self {
        let norm = normal.norm();
        let (normal, offset) = if norm > f64::EPSILON {
            (normal / norm, offset / norm)
        } else {
            (normal, offset)
        };
        Self {
            normal,
            offset,
            members,
        }
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn members(&self) -> &[ReflectionMember] {
        &self.members
    }

    /// Overwrite the plane parameters with solved values.
    pub fn set_plane(&mut self, normal: Vector3<f64>, offset: f64) {
        self.normal = normal;
        self.offset = offset;
    }

    pub fn reflect(&self, point: &Vector3<f64>) -> Vector3<f64> {
        reflect_point(point, &self.normal, self.offset)
    }

    pub(crate) fn validate(&self, num_cuboids: usize, index: usize) -> Result<()> {
        for member in &self.members {
            if let ReflectionMember::SelfSymmetric { axis, .. } = member {
                if *axis >= 3 {
                    return Err(RefineError::InvalidAxis(*axis));
                }
            }
            for cuboid in member.cuboids() {
                if cuboid >= num_cuboids {
                    return Err(RefineError::MemberOutOfRange {
                        group: format!("reflection group {index}"),
                        cuboid,
                        num_cuboids,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Cuboids related by a fixed-order rotation about one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationSymmetryGroup {
    axis: Vector3<f64>,
    point: Vector3<f64>,
    cuboids: Vec<usize>,
    /// `corner_maps[k][i]`: corner of member `k + 1` that corner `i` of
    /// member `k` rotates onto.
    corner_maps: Vec<[usize; NUM_CORNERS]>,
}

impl RotationSymmetryGroup {
    /// Group with identity corner maps between consecutive members.
    pub fn new(axis: Vector3<f64>, point: Vector3<f64>, cuboids: Vec<usize>) -> Result<Self> {
        if cuboids.len() < 2 {
            return Err(RefineError::RotationGroupTooSmall(cuboids.len()));
        }
        let corner_maps = vec![std::array::from_fn(|i| i); cuboids.len()];
        Ok(Self {
            axis: axis.try_normalize(f64::EPSILON).unwrap_or(axis),
            point,
            cuboids,
            corner_maps,
        })
    }

    /// Group whose corner maps are read off the current geometry.
    pub fn from_geometry(
        axis: Vector3<f64>,
        point: Vector3<f64>,
        members: Vec<usize>,
        cuboids: &[Cuboid],
    ) -> Result<Self> {
        let mut group = Self::new(axis, point, members)?;
        group.validate(cuboids.len(), 0)?;
        let angle = group.angle();
        let m = group.cuboids.len();
        for k in 0..m {
            let from = &cuboids[group.cuboids[k]];
            let to = &cuboids[group.cuboids[(k + 1) % m]];
            group.corner_maps[k] = nearest_corner_map(from, to, |p| {
                rotate_point(p, &group.axis, &group.point, angle)
            });
        }
        Ok(group)
    }

    pub fn axis(&self) -> &Vector3<f64> {
        &self.axis
    }

    pub fn point(&self) -> &Vector3<f64> {
        &self.point
    }

    pub fn cuboids(&self) -> &[usize] {
        &self.cuboids
    }

    pub fn corner_maps(&self) -> &[[usize; NUM_CORNERS]] {
        &self.corner_maps
    }

    /// Rotation order.
    pub fn order(&self) -> usize {
        self.cuboids.len()
    }

    /// Angle between consecutive members.
    pub fn angle(&self) -> f64 {
        2.0 * PI / self.order() as f64
    }

    /// Overwrite the axis parameters with solved values.
    pub fn set_axis(&mut self, axis: Vector3<f64>, point: Vector3<f64>) {
        self.axis = axis;
        self.point = point;
    }

    /// Rotate `point` one step along the cycle.
    pub fn rotate(&self, point: &Vector3<f64>) -> Vector3<f64> {
        rotate_point(point, &self.axis, &self.point, self.angle())
    }

    /// Consecutive member pairs `(k, from cuboid, to cuboid)`. A group of
    /// two is a half turn, where the back step repeats the forward one.
    pub fn adjacent_pairs(&self) -> Vec<(usize, usize, usize)> {
        let m = self.order();
        let steps = if m == 2 { 1 } else { m };
        (0..steps)
            .map(|k| (k, self.cuboids[k], self.cuboids[(k + 1) % m]))
            .collect()
    }

    pub(crate) fn validate(&self, num_cuboids: usize, index: usize) -> Result<()> {
        if self.cuboids.len() < 2 {
            return Err(RefineError::RotationGroupTooSmall(self.cuboids.len()));
        }
        for &cuboid in &self.cuboids {
            if cuboid >= num_cuboids {
                return Err(RefineError::MemberOutOfRange {
                    group: format!("rotation group {index}"),
                    cuboid,
                    num_cuboids,
                });
            }
        }
        Ok(())
    }
}

/// For each corner of `from`, the nearest corner of `to` after `transform`.
fn nearest_corner_map<F>(from: &Cuboid, to: &Cuboid, transform: F) -> [usize; NUM_CORNERS]
where
    F: Fn(&Vector3<f64>) -> Vector3<f64>,
{
    std::array::from_fn(|i| {
        let image = transform(from.corner(i));
        (0..NUM_CORNERS)
            .min_by(|a, b| {
                let da = (to.corner(*a) - image).norm_squared();
                let db = (to.corner(*b) - image).norm_squared();
                da.total_cmp(&db)
            })
            .unwrap_or(i)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::VarRange;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_reflect_point_across_yz_plane() {
        let p = Vector3::new(2.0, 1.0, -1.0);
        let r = reflect_point(&p, &Vector3::x(), 0.0);
        assert_relative_eq!(r, Vector3::new(-2.0, 1.0, -1.0));

        let r = reflect_point(&p, &Vector3::x(), 1.0);
        assert_relative_eq!(r, Vector3::new(0.0, 1.0, -1.0));
    }

    #[test]
    fn test_reflect_expression_matches_numeric() {
        let point = VectorExpression::variable(VarRange::new(0, 3));
        let normal = VectorExpression::variable(VarRange::new(3, 3));
        let offset = Polynomial::variable(6);
        let expr = reflect_expression(&point, &normal, &offset);

        let n = Vector3::new(1.0, 2.0, -0.5).normalize();
        let p = Vector3::new(0.3, -1.2, 2.0);
        let x = DVector::from_column_slice(&[p.x, p.y, p.z, n.x, n.y, n.z, 0.7]);

        assert_relative_eq!(expr.evaluate(&x), reflect_point(&p, &n, 0.7), epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_expression_matches_numeric() {
        let point = VectorExpression::variable(VarRange::new(0, 3));
        let axis = VectorExpression::variable(VarRange::new(3, 3));
        let center = VectorExpression::variable(VarRange::new(6, 3));
        let angle = 2.0 * PI / 3.0;
        let expr = rotate_expression(&point, &axis, &center, angle);

        let n = Vector3::new(0.2, 1.0, 0.1).normalize();
        let t = Vector3::new(0.5, 0.0, -0.3);
        let p = Vector3::new(1.0, 2.0, 3.0);
        let x = DVector::from_column_slice(&[p.x, p.y, p.z, n.x, n.y, n.z, t.x, t.y, t.z]);

        assert_relative_eq!(
            expr.evaluate(&x),
            rotate_point(&p, &n, &t, angle),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_self_symmetric_corner_pairs() {
        let member = ReflectionMember::self_symmetric(0, 1).unwrap();
        let pairs = member.corner_pairs();
        assert_eq!(pairs.len(), 4);
        for ((_, a), (_, b)) in pairs {
            assert_eq!(a ^ b, 0b010);
            assert_eq!(a & 0b010, 0);
        }
    }

    #[test]
    fn test_invalid_axis_rejected() {
        assert_eq!(
            ReflectionMember::self_symmetric(0, 3),
            Err(RefineError::InvalidAxis(3))
        );
    }

    #[test]
    fn test_pair_from_geometry_matches_mirrored_corners() {
        let a = Cuboid::axis_aligned(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.5, 1.0, 1.0));
        let b = Cuboid::axis_aligned(Vector3::new(-1.0, 0.0, 0.0), Vector3::new(0.5, 1.0, 1.0));
        let cuboids = vec![a, b];

        let member = ReflectionMember::pair_from_geometry(0, 1, &cuboids, &Vector3::x(), 0.0);
        let expected = ReflectionMember::pair_along_axis(0, 1, 0).unwrap();
        assert_eq!(member, expected);
    }

    #[test]
    fn test_group_normalizes_plane() {
        let group = ReflectionSymmetryGroup::new(Vector3::new(2.0, 0.0, 0.0), 1.0, vec![]);
        assert_relative_eq!(group.normal(), &Vector3::x());
        assert_relative_eq!(group.offset(), 0.5);
    }

    #[test]
    fn test_rotation_group_validation() {
        assert_eq!(
            RotationSymmetryGroup::new(Vector3::z(), Vector3::zeros(), vec![0]),
            Err(RefineError::RotationGroupTooSmall(1))
        );

        let group = RotationSymmetryGroup::new(Vector3::z(), Vector3::zeros(), vec![0, 3]).unwrap();
        assert!(matches!(
            group.validate(2, 0),
            Err(RefineError::MemberOutOfRange { cuboid: 3, .. })
        ));
    }

    #[test]
    fn test_rotation_group_from_geometry() {
        let size = Vector3::new(0.4, 0.4, 0.2);
        let cuboids: Vec<Cuboid> = (0..4)
            .map(|k| {
                let angle = k as f64 * PI / 2.0;
                let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
                Cuboid::new(
                    rotation * Vector3::new(1.0, 0.0, 0.0),
                    [
                        rotation * Vector3::x(),
                        rotation * Vector3::y(),
                        Vector3::z(),
                    ],
                    size,
                )
            })
            .collect();

        let group =
            RotationSymmetryGroup::from_geometry(Vector3::z(), Vector3::zeros(), vec![0, 1, 2, 3], &cuboids)
                .unwrap();

        assert_eq!(group.order(), 4);
        assert_eq!(group.adjacent_pairs().len(), 4);
        for (k, from, to) in group.adjacent_pairs() {
            for i in 0..NUM_CORNERS {
                let image = group.rotate(cuboids[from].corner(i));
                let target = cuboids[to].corner(group.corner_maps()[k][i]);
                assert_relative_eq!(image, *target, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_half_turn_has_single_step() {
        let group = RotationSymmetryGroup::new(Vector3::z(), Vector3::zeros(), vec![4, 7]).unwrap();
        assert_eq!(group.adjacent_pairs(), vec![(0, 4, 7)]);
    }
}
