//! Assembly of one nonlinear program from the current geometry.

use nalgebra::DVector;

use crate::constraints::{
    box_constraints, fixed_constraints, reflection_constraints, rotation_constraints,
};
use crate::correspondence::GroupCorrespondences;
use crate::energy::{
    reflection_residuals, rotation_residuals, DataEnergy, QuadraticTerm, SumOfSquaresTerm,
};
use crate::geometry::{Cuboid, NUM_CORNERS};
use crate::layout::VariableLayout;
use crate::optimization::NonlinearProgram;
use crate::symmetry::{ReflectionSymmetryGroup, RotationSymmetryGroup};

use super::config::RefinementConfig;

/// Correspondences of every group for the current outer iteration.
#[derive(Debug, Clone, Default)]
pub struct SymmetryCorrespondences {
    pub reflections: Vec<GroupCorrespondences>,
    pub rotations: Vec<GroupCorrespondences>,
}

/// Groups taking part in one solve, by index into the caller's slices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveGroups {
    pub reflections: Vec<usize>,
    pub rotations: Vec<usize>,
}

impl ActiveGroups {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all(num_reflections: usize, num_rotations: usize) -> Self {
        Self {
            reflections: (0..num_reflections).collect(),
            rotations: (0..num_rotations).collect(),
        }
    }

    pub fn reflection(group: usize) -> Self {
        Self {
            reflections: vec![group],
            rotations: Vec::new(),
        }
    }

    pub fn rotation(group: usize) -> Self {
        Self {
            reflections: Vec::new(),
            rotations: vec![group],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reflections.is_empty() && self.rotations.is_empty()
    }
}

/// A program together with the layout and groups it was built for.
#[derive(Debug)]
pub struct AssembledProgram {
    pub layout: VariableLayout,
    pub groups: ActiveGroups,
    pub program: NonlinearProgram,
}

/// Decision vector holding the current geometry and group parameters.
pub fn initial_vector(
    layout: &VariableLayout,
    cuboids: &[Cuboid],
    reflections: &[&ReflectionSymmetryGroup],
    rotations: &[&RotationSymmetryGroup],
) -> DVector<f64> {
    let mut x = DVector::zeros(layout.num_variables());
    let mut write = |range: crate::layout::VarRange, values: &[f64]| {
        for (k, v) in values.iter().enumerate() {
            x[range.at(k)] = *v;
        }
    };

    for (c, cuboid) in cuboids.iter().enumerate() {
        for i in 0..NUM_CORNERS {
            write(layout.corner(c, i), cuboid.corner(i).as_slice());
        }
        for a in 0..3 {
            write(layout.axis(c, a), cuboid.axis(a).as_slice());
        }
    }
    for (g, group) in reflections.iter().enumerate() {
        write(layout.reflection_normal(g), group.normal().as_slice());
        write(layout.reflection_offset(g), &[group.offset()]);
    }
    for (g, group) in rotations.iter().enumerate() {
        write(layout.rotation_normal(g), group.axis().as_slice());
        write(layout.rotation_point(g), group.point().as_slice());
    }
    x
}

/// Build the program for one solve over all cuboids and the `active`
/// groups.
pub fn assemble(
    cuboids: &[Cuboid],
    reflections: &[ReflectionSymmetryGroup],
    rotations: &[RotationSymmetryGroup],
    correspondences: &SymmetryCorrespondences,
    data: &DataEnergy,
    config: &RefinementConfig,
    active: ActiveGroups,
) -> AssembledProgram {
    let layout = VariableLayout::new(
        cuboids.len(),
        active.reflections.len(),
        active.rotations.len(),
    );
    let active_reflections: Vec<&ReflectionSymmetryGroup> =
        active.reflections.iter().map(|g| &reflections[*g]).collect();
    let active_rotations: Vec<&RotationSymmetryGroup> =
        active.rotations.iter().map(|g| &rotations[*g]).collect();

    let x0 = initial_vector(&layout, cuboids, &active_reflections, &active_rotations);
    let mut program = NonlinearProgram::new(x0.clone());

    // Data energy.
    for (cuboid, form) in &data.unary {
        program.add_objective(QuadraticTerm::new(
            layout.cuboid_corners(*cuboid).indices().collect(),
            form.clone(),
            config.data_weight,
        ));
    }
    for ((first, second), form) in &data.pairwise {
        let indices = layout
            .cuboid_corners(*first)
            .indices()
            .chain(layout.cuboid_corners(*second).indices())
            .collect();
        program.add_objective(QuadraticTerm::new(indices, form.clone(), 1.0));
    }

    // Box validity, or pins for fixed cuboids.
    for c in 0..cuboids.len() {
        if config.is_fixed(c) {
            program.add_constraints(fixed_constraints(&layout, c, &x0));
        } else {
            program.add_constraints(box_constraints(&layout, c));
        }
    }

    // Symmetry energy and constraints.
    for (local, (global, group)) in active
        .reflections
        .iter()
        .zip(&active_reflections)
        .enumerate()
    {
        if let Some(matches) = correspondences.reflections.get(*global) {
            if matches.sufficient {
                let residuals = reflection_residuals(&layout, local, cuboids, matches);
                program.add_objective(SumOfSquaresTerm::new(
                    residuals,
                    config.symmetry_weight / matches.len() as f64,
                ));
            }
        }
        program.add_constraints(reflection_constraints(&layout, local, group));
    }
    for (local, (global, group)) in active.rotations.iter().zip(&active_rotations).enumerate() {
        if let Some(matches) = correspondences.rotations.get(*global) {
            if matches.sufficient {
                let residuals =
                    rotation_residuals(&layout, local, group.angle(), cuboids, matches);
                program.add_objective(SumOfSquaresTerm::new(
                    residuals,
                    config.symmetry_weight / matches.len() as f64,
                ));
            }
        }
        program.add_constraints(rotation_constraints(&layout, local, group));
    }

    AssembledProgram {
        layout,
        groups: active,
        program,
    }
}
