//! KD-tree nearest-neighbour search over cuboid surface samples.
//!
//! # Usage
//!
//! ```ignore
//! let search = SampleSearch::from_samples(cuboid.samples()).unwrap();
//! let (index, squared_distance) = search.nearest(&[0.0, 1.0, 0.5]);
//! let sample = &cuboid.samples()[index];
//! ```

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use nalgebra::Vector3;
use rayon::prelude::*;

use crate::geometry::{Cuboid, SamplePoint};

/// Bucket size for the KD-tree.
///
/// Samples lie on 6 planes, so many share one coordinate exactly; the
/// default bucket of 32 is too small for that.
const BUCKET_SIZE: usize = 256;

/// KD-tree over the sample positions of one cuboid.
#[derive(Debug)]
pub struct SampleSearch {
    /// Generic args: A=f64 (coordinate), T=u64 (sample index), K=3, B=bucket size
    kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE>,
}

impl SampleSearch {
    /// Build a search index over sample positions.
    ///
    /// Returns `None` when there are no samples.
    pub fn from_samples(samples: &[SamplePoint]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let positions: Vec<[f64; 3]> = samples.iter().map(SamplePoint::as_array).collect();
        let kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE> = (&*positions).into();

        Some(Self { kdtree })
    }

    /// Nearest sample to `point`: (sample index, squared distance).
    pub fn nearest(&self, point: &[f64; 3]) -> (usize, f64) {
        let nn = self.kdtree.nearest_one::<SquaredEuclidean>(point);
        (nn.item as usize, nn.distance)
    }

    /// Nearest sample to a `Vector3` query.
    pub fn nearest_to(&self, point: &Vector3<f64>) -> (usize, f64) {
        self.nearest(&[point.x, point.y, point.z])
    }

    pub fn len(&self) -> usize {
        self.kdtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.kdtree.size() == 0
    }
}

/// Per-iteration search structures, one slot per cuboid.
///
/// Built at the start of a correspondence pass and dropped at its end, so
/// every tree reflects the geometry of exactly one outer iteration.
#[derive(Debug)]
pub struct SampleIndex {
    searches: Vec<Option<SampleSearch>>,
}

impl SampleIndex {
    /// Build trees for the cuboids flagged in `needed`, in parallel.
    ///
    /// The call returns only after every tree is built.
    pub fn build(cuboids: &[Cuboid], needed: &[bool]) -> Self {
        let searches = cuboids
            .par_iter()
            .enumerate()
            .map(|(i, cuboid)| {
                if needed.get(i).copied().unwrap_or(false) {
                    SampleSearch::from_samples(cuboid.samples())
                } else {
                    None
                }
            })
            .collect();

        Self { searches }
    }

    /// Build trees for every cuboid.
    pub fn build_all(cuboids: &[Cuboid]) -> Self {
        Self::build(cuboids, &vec![true; cuboids.len()])
    }

    pub fn get(&self, cuboid: usize) -> Option<&SampleSearch> {
        self.searches.get(cuboid).and_then(Option::as_ref)
    }

    /// Number of cuboids with a tree.
    pub fn num_built(&self) -> usize {
        self.searches.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GridSurfaceSampler, SurfaceSampler};

    fn sample_at(p: [f64; 3]) -> SamplePoint {
        SamplePoint {
            position: Vector3::new(p[0], p[1], p[2]),
            normal: Vector3::z(),
            corner_weights: [0.125; 8],
            face: None,
        }
    }

    #[test]
    fn test_empty_samples() {
        assert!(SampleSearch::from_samples(&[]).is_none());
    }

    #[test]
    fn test_nearest() {
        let samples = vec![
            sample_at([0.0, 0.0, 0.0]),
            sample_at([1.0, 0.0, 0.0]),
            sample_at([2.0, 0.0, 0.0]),
        ];
        let search = SampleSearch::from_samples(&samples).unwrap();
        assert_eq!(search.len(), 3);

        let (index, dist_sq) = search.nearest(&[1.2, 0.1, 0.0]);
        assert_eq!(index, 1);
        assert!((dist_sq - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_planar_samples() {
        let cuboid = Cuboid::axis_aligned(Vector3::zeros(), Vector3::new(2.0, 2.0, 0.2));
        let samples = GridSurfaceSampler::with_spacing(0.1).sample(&cuboid);
        let search = SampleSearch::from_samples(&samples).unwrap();

        for (i, s) in samples.iter().enumerate().step_by(17) {
            let (index, dist_sq) = search.nearest_to(&s.position);
            assert!(dist_sq < 1e-20);
            assert_eq!(samples[index].position, samples[i].position);
        }
    }

    #[test]
    fn test_matches_brute_force() {
        use rand::prelude::*;
        use rand_distr::Normal;

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let dist = Normal::new(0.0, 1.0).unwrap();
        let mut point = || [dist.sample(&mut rng), dist.sample(&mut rng), dist.sample(&mut rng)];

        let samples: Vec<SamplePoint> = (0..300).map(|_| sample_at(point())).collect();
        let search = SampleSearch::from_samples(&samples).unwrap();

        for _ in 0..50 {
            let query = point();
            let q = Vector3::new(query[0], query[1], query[2]);
            let expected = samples
                .iter()
                .map(|s| (s.position - q).norm_squared())
                .fold(f64::INFINITY, f64::min);
            let (index, dist_sq) = search.nearest(&query);
            assert!((dist_sq - expected).abs() < 1e-12);
            assert!(((samples[index].position - q).norm_squared() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_index_builds_only_needed() {
        let sampler = GridSurfaceSampler::with_spacing(0.5);
        let mut cuboids = vec![
            Cuboid::axis_aligned(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0)),
            Cuboid::axis_aligned(Vector3::x() * 3.0, Vector3::new(1.0, 1.0, 1.0)),
            Cuboid::axis_aligned(Vector3::x() * 6.0, Vector3::new(1.0, 1.0, 1.0)),
        ];
        for c in &mut cuboids {
            let samples = sampler.sample(c);
            c.set_samples(samples);
        }

        let index = SampleIndex::build(&cuboids, &[true, false, true]);
        assert_eq!(index.num_built(), 2);
        assert!(index.get(0).is_some());
        assert!(index.get(1).is_none());
        assert!(index.get(5).is_none());

        assert_eq!(SampleIndex::build_all(&cuboids).num_built(), 3);
    }
}
