//! Symmetric sample-point correspondences.
//!
//! For each symmetry group, samples of one member are pushed through the
//! group's current transform and matched to the nearest sample of the
//! counterpart member. Matches further than the configured squared
//! distance are dropped. Correspondences stay frozen for one inner solve;
//! the outer loop rebuilds them after every geometry update.

pub mod search;

use tracing::debug;

use crate::geometry::Cuboid;
use crate::symmetry::{ReflectionSymmetryGroup, RotationSymmetryGroup};

pub use search::{SampleIndex, SampleSearch};

/// Thresholds used when accepting correspondences.
#[derive(Debug, Clone, Copy)]
pub struct CorrespondenceConfig {
    /// Maximum squared distance between a transformed sample and its match.
    pub squared_neighbor_distance: f64,
    /// Minimum accepted pairs for a group to contribute energy.
    pub min_pairs: usize,
}

/// One accepted sample match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePair {
    /// Cuboid whose sample is transformed.
    pub source_cuboid: usize,
    pub source_sample: usize,
    /// Cuboid holding the matched sample.
    pub target_cuboid: usize,
    pub target_sample: usize,
    /// Squared distance at the time of matching.
    pub squared_distance: f64,
    /// Rotation step (`k` in member `k` → `k + 1`); zero for reflections.
    pub step: usize,
}

/// Correspondences collected for one group.
#[derive(Debug, Clone, Default)]
pub struct GroupCorrespondences {
    pub pairs: Vec<SamplePair>,
    /// Whether the group reached the minimum pair count.
    pub sufficient: bool,
}

impl GroupCorrespondences {
    fn finish(pairs: Vec<SamplePair>, min_pairs: usize) -> Self {
        let sufficient = !pairs.is_empty() && pairs.len() >= min_pairs;
        Self { pairs, sufficient }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Mean squared distance over accepted pairs at matching time.
    pub fn mean_squared_distance(&self) -> f64 {
        if self.pairs.is_empty() {
            return 0.0;
        }
        self.pairs.iter().map(|p| p.squared_distance).sum::<f64>() / self.pairs.len() as f64
    }
}

/// Cuboids that need a search tree for the given groups.
pub fn required_cuboids<'a>(
    num_cuboids: usize,
    reflections: impl IntoIterator<Item = &'a ReflectionSymmetryGroup>,
    rotations: impl IntoIterator<Item = &'a RotationSymmetryGroup>,
) -> Vec<bool> {
    let mut needed = vec![false; num_cuboids];
    for group in reflections {
        for member in group.members() {
            let (_, target) = member.sample_direction();
            if let Some(slot) = needed.get_mut(target) {
                *slot = true;
            }
        }
    }
    for group in rotations {
        for (_, _, to) in group.adjacent_pairs() {
            if let Some(slot) = needed.get_mut(to) {
                *slot = true;
            }
        }
    }
    needed
}

fn match_samples<F>(
    cuboids: &[Cuboid],
    index: &SampleIndex,
    source: usize,
    target: usize,
    step: usize,
    threshold: f64,
    transform: F,
    pairs: &mut Vec<SamplePair>,
) where
    F: Fn(&nalgebra::Vector3<f64>) -> nalgebra::Vector3<f64>,
{
    let Some(search) = index.get(target) else {
        return;
    };
    for (source_sample, sample) in cuboids[source].samples().iter().enumerate() {
        let image = transform(&sample.position);
        let (target_sample, squared_distance) = search.nearest_to(&image);
        if squared_distance <= threshold {
            pairs.push(SamplePair {
                source_cuboid: source,
                source_sample,
                target_cuboid: target,
                target_sample,
                squared_distance,
                step,
            });
        }
    }
}

/// Correspondences for a reflection group under its current plane.
pub fn reflection_correspondences(
    group: &ReflectionSymmetryGroup,
    cuboids: &[Cuboid],
    index: &SampleIndex,
    config: &CorrespondenceConfig,
) -> GroupCorrespondences {
    let mut pairs = Vec::new();
    for member in group.members() {
        let (source, target) = member.sample_direction();
        match_samples(
            cuboids,
            index,
            source,
            target,
            0,
            config.squared_neighbor_distance,
            |p| group.reflect(p),
            &mut pairs,
        );
    }

    let result = GroupCorrespondences::finish(pairs, config.min_pairs);
    debug!(
        pairs = result.len(),
        sufficient = result.sufficient,
        "reflection correspondences"
    );
    result
}

/// Correspondences for a rotation group under its current axis.
pub fn rotation_correspondences(
    group: &RotationSymmetryGroup,
    cuboids: &[Cuboid],
    index: &SampleIndex,
    config: &CorrespondenceConfig,
) -> GroupCorrespondences {
    let mut pairs = Vec::new();
    for (step, from, to) in group.adjacent_pairs() {
        match_samples(
            cuboids,
            index,
            from,
            to,
            step,
            config.squared_neighbor_distance,
            |p| group.rotate(p),
            &mut pairs,
        );
    }

    let result = GroupCorrespondences::finish(pairs, config.min_pairs);
    debug!(
        pairs = result.len(),
        sufficient = result.sufficient,
        "rotation correspondences"
    );
    result
}
