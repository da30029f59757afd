//! Surface sample points on cuboids.
//!
//! Every sample remembers the trilinear weights of the 8 corners that
//! produced it, so its position stays an affine function of the corner
//! variables while the solver moves them.

use nalgebra::Vector3;

use super::{face_normal, trilinear_weights, Cuboid, NUM_CORNERS};

/// A point on a cuboid surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoint {
    pub position: Vector3<f64>,
    pub normal: Vector3<f64>,
    /// Weights such that `position = Σ w_i · corner_i`.
    pub corner_weights: [f64; NUM_CORNERS],
    /// Face the sample lies on (0..6), if known.
    pub face: Option<usize>,
}

impl SamplePoint {
    /// Sample at `position` on `cuboid`, with weights derived from the
    /// cuboid frame.
    pub fn on_cuboid(cuboid: &Cuboid, position: Vector3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            corner_weights: cuboid.corner_weights(&position),
            position,
            normal,
            face: None,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.position.z]
    }
}

/// Regenerates surface samples from a cuboid's current geometry.
pub trait SurfaceSampler {
    fn sample(&self, cuboid: &Cuboid) -> Vec<SamplePoint>;
}

/// Cell-centred grid sampler over the 6 faces.
///
/// Cell centres avoid duplicate points along shared edges, which keeps the
/// nearest-neighbour queries unambiguous.
#[derive(Debug, Clone)]
pub struct GridSurfaceSampler {
    /// Target distance between neighbouring samples.
    pub spacing: f64,
    /// Lower bound on samples along each face edge.
    pub min_points_per_edge: usize,
    /// Upper bound on samples along each face edge.
    pub max_points_per_edge: usize,
}

impl Default for GridSurfaceSampler {
    fn default() -> Self {
        Self {
            spacing: 0.05,
            min_points_per_edge: 2,
            max_points_per_edge: 64,
        }
    }
}

impl GridSurfaceSampler {
    pub fn with_spacing(spacing: f64) -> Self {
        Self {
            spacing,
            ..Default::default()
        }
    }

    fn points_along(&self, length: f64) -> usize {
        let n = if self.spacing > 0.0 && length.is_finite() {
            (length / self.spacing).ceil() as usize
        } else {
            self.min_points_per_edge
        };
        n.clamp(self.min_points_per_edge.max(1), self.max_points_per_edge.max(1))
    }
}

impl SurfaceSampler for GridSurfaceSampler {
    fn sample(&self, cuboid: &Cuboid) -> Vec<SamplePoint> {
        let extents = cuboid.extents();
        let mut samples = Vec::new();

        for face in 0..6 {
            let k = face % 3;
            let side = if face < 3 { 1.0 } else { 0.0 };
            let u_axis = (k + 1) % 3;
            let v_axis = (k + 2) % 3;
            let nu = self.points_along(extents[u_axis]);
            let nv = self.points_along(extents[v_axis]);
            let normal = face_normal(cuboid.axes(), face);

            for i in 0..nu {
                for j in 0..nv {
                    let mut local = [0.0; 3];
                    local[k] = side;
                    local[u_axis] = (i as f64 + 0.5) / nu as f64;
                    local[v_axis] = (j as f64 + 0.5) / nv as f64;

                    let corner_weights = trilinear_weights(&local);
                    samples.push(SamplePoint {
                        position: cuboid.interpolate(&corner_weights),
                        normal,
                        corner_weights,
                        face: Some(face),
                    });
                }
            }
        }

        samples
    }
}
