//! Decision-vector layout.
//!
//! The solver works on one flat vector made of four consecutive sections:
//!
//! | section    | size per entity | contents                      |
//! |------------|-----------------|-------------------------------|
//! | corners    | 24              | 8 corners × (x, y, z)         |
//! | axes       | 9               | 3 axes × (x, y, z)            |
//! | reflection | 4               | plane normal n, offset t      |
//! | rotation   | 6               | axis direction n, axis point t |
//!
//! The table is computed from entity counts for every solve and is never
//! mutated afterwards.

/// Number of corner variables per cuboid.
pub const CORNER_VARIABLES: usize = 24;

/// Number of axis variables per cuboid.
pub const AXIS_VARIABLES: usize = 9;

/// Number of variables per reflection symmetry group.
pub const REFLECTION_VARIABLES: usize = 4;

/// Number of variables per rotation symmetry group.
pub const ROTATION_VARIABLES: usize = 6;

/// A contiguous slice of the decision vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRange {
    pub offset: usize,
    pub size: usize,
}

impl VarRange {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Index of the `i`-th variable in this range.
    #[inline]
    pub fn at(&self, i: usize) -> usize {
        assert!(i < self.size, "component {i} out of range {}", self.size);
        self.offset + i
    }

    /// One past the last index.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

/// Immutable offset table for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableLayout {
    num_cuboids: usize,
    num_reflection_groups: usize,
    num_rotation_groups: usize,
    corner_start: usize,
    axis_start: usize,
    reflection_start: usize,
    rotation_start: usize,
    num_variables: usize,
}

impl VariableLayout {
    /// Compute the section offsets for the given entity counts.
    pub fn new(num_cuboids: usize, num_reflection_groups: usize, num_rotation_groups: usize) -> Self {
        let corner_start = 0;
        let axis_start = corner_start + num_cuboids * CORNER_VARIABLES;
        let reflection_start = axis_start + num_cuboids * AXIS_VARIABLES;
        let rotation_start = reflection_start + num_reflection_groups * REFLECTION_VARIABLES;
        let num_variables = rotation_start + num_rotation_groups * ROTATION_VARIABLES;

        Self {
            num_cuboids,
            num_reflection_groups,
            num_rotation_groups,
            corner_start,
            axis_start,
            reflection_start,
            rotation_start,
            num_variables,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn num_cuboids(&self) -> usize {
        self.num_cuboids
    }

    pub fn num_reflection_groups(&self) -> usize {
        self.num_reflection_groups
    }

    pub fn num_rotation_groups(&self) -> usize {
        self.num_rotation_groups
    }

    pub fn corner_section(&self) -> VarRange {
        VarRange::new(self.corner_start, self.axis_start - self.corner_start)
    }

    pub fn axis_section(&self) -> VarRange {
        VarRange::new(self.axis_start, self.reflection_start - self.axis_start)
    }

    pub fn reflection_section(&self) -> VarRange {
        VarRange::new(
            self.reflection_start,
            self.rotation_start - self.reflection_start,
        )
    }

    pub fn rotation_section(&self) -> VarRange {
        VarRange::new(self.rotation_start, self.num_variables - self.rotation_start)
    }

    /// The 3 coordinates of corner `corner` of cuboid `cuboid`.
    pub fn corner(&self, cuboid: usize, corner: usize) -> VarRange {
        self.check_cuboid(cuboid);
        assert!(corner < 8, "corner index {corner} out of range");
        VarRange::new(self.corner_start + cuboid * CORNER_VARIABLES + corner * 3, 3)
    }

    /// All 24 corner coordinates of cuboid `cuboid`.
    pub fn cuboid_corners(&self, cuboid: usize) -> VarRange {
        self.check_cuboid(cuboid);
        VarRange::new(self.corner_start + cuboid * CORNER_VARIABLES, CORNER_VARIABLES)
    }

    /// The 3 components of axis `axis` of cuboid `cuboid`.
    pub fn axis(&self, cuboid: usize, axis: usize) -> VarRange {
        self.check_cuboid(cuboid);
        assert!(axis < 3, "axis index {axis} out of range");
        VarRange::new(self.axis_start + cuboid * AXIS_VARIABLES + axis * 3, 3)
    }

    /// All 9 axis components of cuboid `cuboid`.
    pub fn cuboid_axes(&self, cuboid: usize) -> VarRange {
        self.check_cuboid(cuboid);
        VarRange::new(self.axis_start + cuboid * AXIS_VARIABLES, AXIS_VARIABLES)
    }

    /// Plane normal `n` of reflection group `group`.
    pub fn reflection_normal(&self, group: usize) -> VarRange {
        assert!(
            group < self.num_reflection_groups,
            "reflection group {group} out of range {}",
            self.num_reflection_groups
        );
        VarRange::new(self.reflection_start + group * REFLECTION_VARIABLES, 3)
    }

    /// Plane offset `t` of reflection group `group`.
    pub fn reflection_offset(&self, group: usize) -> VarRange {
        let n = self.reflection_normal(group);
        VarRange::new(n.end(), 1)
    }

    /// Axis direction `n` of rotation group `group`.
    pub fn rotation_normal(&self, group: usize) -> VarRange {
        assert!(
            group < self.num_rotation_groups,
            "rotation group {group} out of range {}",
            self.num_rotation_groups
        );
        VarRange::new(self.rotation_start + group * ROTATION_VARIABLES, 3)
    }

    /// Point `t` on the axis of rotation group `group`.
    pub fn rotation_point(&self, group: usize) -> VarRange {
        let n = self.rotation_normal(group);
        VarRange::new(n.end(), 3)
    }

    fn check_cuboid(&self, cuboid: usize) {
        assert!(
            cuboid < self.num_cuboids,
            "cuboid {cuboid} out of range {}",
            self.num_cuboids
        );
    }
}
