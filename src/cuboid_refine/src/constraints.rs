//! Equality constraints of one solve.
//!
//! Every constraint is a polynomial that must vanish at the solution:
//! box validity ties corners to axes, fixed cuboids are pinned to their
//! input values, and symmetry groups relate corners across members.

use nalgebra::DVector;

use crate::expression::{Polynomial, VectorExpression};
use crate::geometry::{opposite_corner, NUM_CORNERS};
use crate::layout::VariableLayout;
use crate::symmetry::{
    reflect_expression, rotate_expression, ReflectionSymmetryGroup, RotationSymmetryGroup,
};

fn corner(layout: &VariableLayout, cuboid: usize, corner: usize) -> VectorExpression {
    VectorExpression::variable(layout.corner(cuboid, corner))
}

/// Box validity for one cuboid.
///
/// - `a_k · a_k − 1 = 0` for each axis,
/// - `a_j · a_k = 0` for each axis pair,
/// - every edge along axis `a` is orthogonal to the two other axes.
pub fn box_constraints(layout: &VariableLayout, cuboid: usize) -> Vec<Polynomial> {
    let axes: Vec<VectorExpression> = (0..3)
        .map(|k| VectorExpression::variable(layout.axis(cuboid, k)))
        .collect();
    let mut constraints = Vec::with_capacity(30);

    for axis in &axes {
        constraints.push(&axis.squared_norm() - &Polynomial::constant(1.0));
    }
    for (j, k) in [(0, 1), (0, 2), (1, 2)] {
        constraints.push(axes[j].dot(&axes[k]));
    }

    for a in 0..3 {
        for i in (0..NUM_CORNERS).filter(|i| (i >> a) & 1 == 0) {
            let edge = &corner(layout, cuboid, opposite_corner(i, a)) - &corner(layout, cuboid, i);
            for (_, axis) in axes.iter().enumerate().filter(|(k, _)| *k != a) {
                constraints.push(edge.dot(axis));
            }
        }
    }

    constraints
}

/// Pin every corner and axis variable of `cuboid` to its value in `x0`.
pub fn fixed_constraints(
    layout: &VariableLayout,
    cuboid: usize,
    x0: &DVector<f64>,
) -> Vec<Polynomial> {
    layout
        .cuboid_corners(cuboid)
        .indices()
        .chain(layout.cuboid_axes(cuboid).indices())
        .map(|v| &Polynomial::variable(v) - &Polynomial::constant(x0[v]))
        .collect()
}

/// Mirrored corner relations and the unit normal of reflection group
/// `index` (a layout index).
pub fn reflection_constraints(
    layout: &VariableLayout,
    index: usize,
    group: &ReflectionSymmetryGroup,
) -> Vec<Polynomial> {
    let normal = VectorExpression::variable(layout.reflection_normal(index));
    let offset = Polynomial::variable(layout.reflection_offset(index).at(0));

    let mut constraints = vec![&normal.squared_norm() - &Polynomial::constant(1.0)];
    for member in group.members() {
        for ((a, i), (b, j)) in member.corner_pairs() {
            let x = corner(layout, a, i);
            let mirrored = reflect_expression(&corner(layout, b, j), &normal, &offset);
            constraints.extend((&x - &mirrored).into_components());
        }
    }
    constraints
}

/// Rotated corner relations between consecutive members and the unit
/// axis of rotation group `index` (a layout index).
pub fn rotation_constraints(
    layout: &VariableLayout,
    index: usize,
    group: &RotationSymmetryGroup,
) -> Vec<Polynomial> {
    let axis = VectorExpression::variable(layout.rotation_normal(index));
    let point = VectorExpression::variable(layout.rotation_point(index));
    let angle = group.angle();

    let mut constraints = vec![&axis.squared_norm() - &Polynomial::constant(1.0)];
    for (k, from, to) in group.adjacent_pairs() {
        let map = &group.corner_maps()[k];
        for (i, j) in map.iter().enumerate() {
            let image = rotate_expression(&corner(layout, from, i), &axis, &point, angle);
            constraints.extend((&image - &corner(layout, to, *j)).into_components());
        }
    }
    constraints
}

/// Largest absolute constraint residual at `x`.
pub fn max_violation(constraints: &[Polynomial], x: &DVector<f64>) -> f64 {
    constraints
        .iter()
        .map(|c| c.evaluate(x).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cuboid;
    use crate::symmetry::ReflectionMember;
    use nalgebra::{Rotation3, Vector3};

    fn write_cuboid(layout: &VariableLayout, c: usize, cuboid: &Cuboid, x: &mut DVector<f64>) {
        for i in 0..NUM_CORNERS {
            let r = layout.corner(c, i);
            for k in 0..3 {
                x[r.at(k)] = cuboid.corner(i)[k];
            }
        }
        for a in 0..3 {
            let r = layout.axis(c, a);
            for k in 0..3 {
                x[r.at(k)] = cuboid.axis(a)[k];
            }
        }
    }

    fn rotated_cuboid() -> Cuboid {
        let rotation = Rotation3::from_euler_angles(0.3, 0.1, -0.8);
        Cuboid::new(
            Vector3::new(0.2, 1.0, -0.4),
            [
                rotation * Vector3::x(),
                rotation * Vector3::y(),
                rotation * Vector3::z(),
            ],
            Vector3::new(1.0, 0.4, 0.7),
        )
    }

    #[test]
    fn test_valid_box_satisfies_constraints() {
        let layout = VariableLayout::new(1, 0, 0);
        let mut x = DVector::zeros(layout.num_variables());
        write_cuboid(&layout, 0, &rotated_cuboid(), &mut x);

        let constraints = box_constraints(&layout, 0);
        assert_eq!(constraints.len(), 30);
        assert!(max_violation(&constraints, &x) < 1e-12);
    }

    #[test]
    fn test_sheared_box_violates_constraints() {
        let layout = VariableLayout::new(1, 0, 0);
        let mut x = DVector::zeros(layout.num_variables());
        write_cuboid(&layout, 0, &rotated_cuboid(), &mut x);
        // Move corner 7 off its edges.
        x[layout.corner(0, 7).at(0)] += 0.1;

        assert!(max_violation(&box_constraints(&layout, 0), &x) > 1e-3);
    }

    #[test]
    fn test_fixed_constraints_vanish_at_input() {
        let layout = VariableLayout::new(2, 0, 0);
        let mut x = DVector::zeros(layout.num_variables());
        write_cuboid(&layout, 1, &rotated_cuboid(), &mut x);

        let pins = fixed_constraints(&layout, 1, &x);
        assert_eq!(pins.len(), 33);
        assert!(max_violation(&pins, &x) < 1e-15);

        let mut moved = x.clone();
        moved[layout.axis(1, 2).at(1)] += 0.25;
        assert!((max_violation(&pins, &moved) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_reflection_constraints_on_mirrored_pair() {
        let layout = VariableLayout::new(2, 1, 0);
        let mut x = DVector::zeros(layout.num_variables());
        let a = Cuboid::axis_aligned(Vector3::new(1.0, 0.5, 0.0), Vector3::new(0.4, 0.6, 0.8));
        let b = Cuboid::axis_aligned(Vector3::new(-1.0, 0.5, 0.0), Vector3::new(0.4, 0.6, 0.8));
        write_cuboid(&layout, 0, &a, &mut x);
        write_cuboid(&layout, 1, &b, &mut x);
        x[layout.reflection_normal(0).at(0)] = 1.0;

        let group = ReflectionSymmetryGroup::new(
            Vector3::x(),
            0.0,
            vec![ReflectionMember::pair_along_axis(0, 1, 0).unwrap()],
        );
        let constraints = reflection_constraints(&layout, 0, &group);
        assert_eq!(constraints.len(), 1 + 24);
        assert!(max_violation(&constraints, &x) < 1e-12);

        x[layout.reflection_offset(0).at(0)] = 0.1;
        assert!(max_violation(&constraints, &x) > 0.1);
    }

    #[test]
    fn test_rotation_constraints_on_ring() {
        use std::f64::consts::PI;
        let cuboids: Vec<Cuboid> = (0..3)
            .map(|k| {
                let r = Rotation3::from_axis_angle(&Vector3::z_axis(), k as f64 * 2.0 * PI / 3.0);
                Cuboid::new(
                    r * Vector3::new(1.0, 0.0, 0.5),
                    [r * Vector3::x(), r * Vector3::y(), Vector3::z()],
                    Vector3::new(0.3, 0.2, 0.2),
                )
            })
            .collect();
        let group = RotationSymmetryGroup::from_geometry(
            Vector3::z(),
            Vector3::zeros(),
            vec![0, 1, 2],
            &cuboids,
        )
        .unwrap();

        let layout = VariableLayout::new(3, 0, 1);
        let mut x = DVector::zeros(layout.num_variables());
        for (c, cuboid) in cuboids.iter().enumerate() {
            write_cuboid(&layout, c, cuboid, &mut x);
        }
        x[layout.rotation_normal(0).at(2)] = 1.0;

        let constraints = rotation_constraints(&layout, 0, &group);
        assert_eq!(constraints.len(), 1 + 3 * 24);
        assert!(max_violation(&constraints, &x) < 1e-9);
    }
}
