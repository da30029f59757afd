//! Refinement configuration.

use serde::{Deserialize, Serialize};

use crate::optimization::SolverConfig;

/// Energy ratio over the best total above which an iteration is treated
/// as diverged.
pub const DIVERGENCE_RATIO: f64 = 1.5;

/// How symmetry groups are distributed over solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStrategy {
    /// One solve with every group.
    Joint,
    /// One solve per group, each with all cuboids and that group only.
    /// Avoids coupling near-orthogonal symmetry planes in one system.
    PerGroup,
}

/// How (center, axes, extents) are refit after a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CuboidizeMode {
    /// Keep the solved axes; refit center and extents from the corners.
    FromSolvedAxes,
    /// Re-estimate the axes from the corners too.
    FromCorners,
}

/// What to do when a solve fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Keep the pre-solve geometry and carry on with the next solve.
    Continue,
    /// Stop refining and restore the best geometry.
    Abort,
}

/// Configuration for cuboid refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Maximum squared distance for a symmetric sample match.
    pub squared_neighbor_distance: f64,

    /// Minimum accepted matches for a group to contribute energy.
    pub min_symmetry_pairs: usize,

    /// Weight on each group's mean squared alignment residual.
    pub symmetry_weight: f64,

    /// Weight on the per-cuboid data energy.
    pub data_weight: f64,

    /// Maximum number of outer iterations.
    pub max_iterations: usize,

    pub strategy: SolveStrategy,

    /// Cuboids whose geometry must not change.
    pub fixed_cuboids: Vec<usize>,

    /// When false, symmetry groups are ignored entirely.
    pub use_symmetry: bool,

    pub cuboidize: CuboidizeMode,

    pub failure_policy: FailurePolicy,

    pub solver: SolverConfig,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            squared_neighbor_distance: 0.0025,
            min_symmetry_pairs: 50,
            symmetry_weight: 1e6,
            data_weight: 1.0,
            max_iterations: 10,
            strategy: SolveStrategy::PerGroup,
            fixed_cuboids: Vec::new(),
            use_symmetry: true,
            cuboidize: CuboidizeMode::FromSolvedAxes,
            failure_policy: FailurePolicy::Continue,
            solver: SolverConfig::default(),
        }
    }
}

impl RefinementConfig {
    pub fn builder() -> RefinementConfigBuilder {
        RefinementConfigBuilder::new()
    }

    pub fn is_fixed(&self, cuboid: usize) -> bool {
        self.fixed_cuboids.contains(&cuboid)
    }
}

/// Builder for [`RefinementConfig`].
#[derive(Debug, Clone)]
pub struct RefinementConfigBuilder {
    config: RefinementConfig,
}

impl RefinementConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RefinementConfig::default(),
        }
    }

    /// Set the squared neighbour distance threshold.
    pub fn squared_neighbor_distance(mut self, distance: f64) -> Self {
        self.config.squared_neighbor_distance = distance;
        self
    }

    /// Set the minimum number of symmetric matches per group.
    pub fn min_symmetry_pairs(mut self, min_pairs: usize) -> Self {
        self.config.min_symmetry_pairs = min_pairs;
        self
    }

    pub fn symmetry_weight(mut self, weight: f64) -> Self {
        self.config.symmetry_weight = weight;
        self
    }

    pub fn data_weight(mut self, weight: f64) -> Self {
        self.config.data_weight = weight;
        self
    }

    /// Set maximum outer iterations.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn strategy(mut self, strategy: SolveStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Mark cuboids as fixed.
    pub fn fixed_cuboids(mut self, fixed: impl IntoIterator<Item = usize>) -> Self {
        self.config.fixed_cuboids = fixed.into_iter().collect();
        self
    }

    /// Enable or disable symmetry groups.
    pub fn use_symmetry(mut self, use_symmetry: bool) -> Self {
        self.config.use_symmetry = use_symmetry;
        self
    }

    pub fn cuboidize(mut self, mode: CuboidizeMode) -> Self {
        self.config.cuboidize = mode;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Set the inner solver configuration.
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.config.solver = solver;
        self
    }

    pub fn build(self) -> RefinementConfig {
        self.config
    }
}

impl Default for RefinementConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
