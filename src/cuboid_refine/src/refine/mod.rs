//! Outer iteration controller.
//!
//! Each outer iteration:
//! 1. Run one nonlinear solve per symmetry group, or one joint solve
//! 2. Write solved values back into the cuboids and groups
//! 3. Resample surfaces and rebuild symmetric correspondences
//! 4. Evaluate total energy and track the best state
//!
//! The run stops on divergence (energy above 1.5× the best), on the
//! iteration cap, when an iteration makes no successful solve, or when a
//! solve fails under the abort policy. The best recorded geometry is left
//! in place in every case.

pub mod assembly;
pub mod config;
pub mod record;
pub mod update;

use tracing::{debug, info, warn};

use crate::correspondence::{
    reflection_correspondences, required_cuboids, rotation_correspondences, CorrespondenceConfig,
    SampleIndex,
};
use crate::energy::{symmetry_energy, DataEnergy, EnergyBreakdown, RelationPrior};
use crate::error::{RefineError, Result};
use crate::geometry::{Cuboid, SurfaceSampler};
use crate::optimization::{NonlinearSolver, SqpSolver};
use crate::symmetry::{ReflectionSymmetryGroup, RotationSymmetryGroup};
use crate::time_phase;
use crate::timing::{Phase, TimingCollector};

pub use assembly::{assemble, ActiveGroups, AssembledProgram, SymmetryCorrespondences};
pub use config::{
    CuboidizeMode, FailurePolicy, RefinementConfig, RefinementConfigBuilder, SolveStrategy,
    DIVERGENCE_RATIO,
};
pub use record::{IterationRecord, RefineOutcome, RefineState, SolveFailure, SolveTarget};
pub use update::{write_back, BestState, Snapshot};

/// Symmetry-aware cuboid refiner.
///
/// Cuboids and groups are borrowed for the duration of one
/// [`refine`](Self::refine) call and never retained.
#[derive(Debug, Clone)]
pub struct CuboidRefiner<S: NonlinearSolver = SqpSolver> {
    config: RefinementConfig,
    solver: S,
}

impl CuboidRefiner<SqpSolver> {
    /// Refiner using the SQP driver configured by `config.solver`.
    pub fn new(config: RefinementConfig) -> Self {
        let solver = SqpSolver::new(config.solver.clone());
        Self { config, solver }
    }
}

impl Default for CuboidRefiner<SqpSolver> {
    fn default() -> Self {
        Self::new(RefinementConfig::default())
    }
}

/// Refine `cuboids` in place with the default SQP driver.
pub fn optimize<P, Sm>(
    cuboids: &mut [Cuboid],
    reflections: &mut [ReflectionSymmetryGroup],
    rotations: &mut [RotationSymmetryGroup],
    prior: &P,
    sampler: &Sm,
    config: &RefinementConfig,
) -> Result<RefineOutcome>
where
    P: RelationPrior + ?Sized,
    Sm: SurfaceSampler + ?Sized,
{
    CuboidRefiner::new(config.clone()).refine(cuboids, reflections, rotations, prior, sampler)
}

/// Mutable state shared by the phases of one run.
struct RefineScene<'a> {
    cuboids: &'a mut [Cuboid],
    reflections: &'a mut [ReflectionSymmetryGroup],
    rotations: &'a mut [RotationSymmetryGroup],
}

impl RefineScene<'_> {
    fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self.cuboids, self.reflections, self.rotations)
    }

    fn restore(&mut self, snapshot: &Snapshot) {
        snapshot.restore(self.cuboids, self.reflections, self.rotations);
    }
}

impl<S: NonlinearSolver> CuboidRefiner<S> {
    /// Refiner with a custom nonlinear solver.
    pub fn with_solver(config: RefinementConfig, solver: S) -> Self {
        Self { config, solver }
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Refine the cuboids and symmetry groups in place.
    ///
    /// Returns an error only for invalid input; solver failures, divergence
    /// and the iteration cap are reported in the outcome.
    pub fn refine<P, Sm>(
        &self,
        cuboids: &mut [Cuboid],
        reflections: &mut [ReflectionSymmetryGroup],
        rotations: &mut [RotationSymmetryGroup],
        prior: &P,
        sampler: &Sm,
    ) -> Result<RefineOutcome>
    where
        P: RelationPrior + ?Sized,
        Sm: SurfaceSampler + ?Sized,
    {
        self.validate(cuboids, reflections, rotations)?;

        let mut scene = RefineScene {
            cuboids,
            reflections,
            rotations,
        };
        let mut collector = TimingCollector::new();
        collector.start_run();

        // Initial: baseline energy from the input geometry.
        let mut correspondences = time_phase!(collector, Phase::Correspondence, {
            self.resample_and_match(&mut scene, sampler)
        });
        let initial_energy = time_phase!(collector, Phase::Update, {
            self.evaluate(&scene, prior, &correspondences)
        })?;
        collector.end_iteration();
        info!(
            state = ?RefineState::Initial,
            data = initial_energy.data,
            symmetry = initial_energy.symmetry,
            total = initial_energy.total,
            "refinement started"
        );

        let mut best = BestState::new(initial_energy.total, scene.snapshot());
        let mut history = Vec::new();
        let mut solver_failures = Vec::new();
        let mut status = RefineState::MaxIter;
        let mut iterations = 0;

        for iteration in 1..=self.config.max_iterations {
            iterations = iteration;
            collector.start_iteration(iteration);

            // Solving.
            let mut attempted = 0;
            let mut succeeded = 0;
            let mut solver_iterations = 0;
            let mut aborted = false;

            for (target, active) in self.solve_plan(&scene) {
                attempted += 1;
                let data = match self.data_energy(&scene, prior) {
                    Ok(data) => data,
                    Err(error) => {
                        scene.restore(best.snapshot());
                        return Err(error);
                    }
                };
                let assembled = time_phase!(collector, Phase::Assembly, {
                    assemble(
                        scene.cuboids,
                        scene.reflections,
                        scene.rotations,
                        &correspondences,
                        &data,
                        &self.config,
                        active,
                    )
                });
                debug!(
                    state = ?RefineState::Solving,
                    iteration,
                    ?target,
                    variables = assembled.program.num_variables(),
                    constraints = assembled.program.num_constraints(),
                    "solving"
                );

                match time_phase!(collector, Phase::Solve, { self.solver.solve(&assembled.program) }) {
                    Ok(report) => {
                        succeeded += 1;
                        solver_iterations += report.iterations;
                        time_phase!(collector, Phase::Update, {
                            write_back(
                                &report.x,
                                &assembled,
                                scene.cuboids,
                                scene.reflections,
                                scene.rotations,
                                &self.config,
                            )
                        });
                    }
                    Err(error) => {
                        warn!(iteration, ?target, %error, "solve failed, keeping previous geometry");
                        solver_failures.push(SolveFailure {
                            iteration,
                            target,
                            error,
                        });
                        if self.config.failure_policy == FailurePolicy::Abort {
                            aborted = true;
                            break;
                        }
                    }
                }
            }

            if aborted {
                status = RefineState::Aborted;
                collector.end_iteration();
                break;
            }

            // Updating.
            correspondences = time_phase!(collector, Phase::Correspondence, {
                self.resample_and_match(&mut scene, sampler)
            });
            let energy = time_phase!(collector, Phase::Update, {
                self.evaluate(&scene, prior, &correspondences)
            });
            let energy = match energy {
                Ok(energy) => energy,
                Err(error) => {
                    scene.restore(best.snapshot());
                    return Err(error);
                }
            };

            let improved = best.offer(energy.total, iteration, || scene.snapshot());
            let state = if !improved && best.is_diverged(energy.total, DIVERGENCE_RATIO) {
                warn!(
                    iteration,
                    total = energy.total,
                    best = best.energy(),
                    "energy diverged, restoring best state"
                );
                RefineState::Diverged
            } else if iteration == self.config.max_iterations {
                RefineState::MaxIter
            } else {
                RefineState::Updating
            };

            info!(
                iteration,
                data = energy.data,
                symmetry = energy.symmetry,
                total = energy.total,
                best = best.energy(),
                improved,
                ?state,
                "outer iteration"
            );

            history.push(IterationRecord {
                iteration,
                energy,
                best_energy: best.energy(),
                improved,
                solves_attempted: attempted,
                solves_succeeded: succeeded,
                solver_iterations,
                reflection_pairs: correspondences.reflections.iter().map(|c| c.len()).collect(),
                rotation_pairs: correspondences.rotations.iter().map(|c| c.len()).collect(),
                state,
            });
            collector.end_iteration();

            if state.is_terminal() {
                status = state;
                break;
            }
        }

        scene.restore(best.snapshot());
        info!(
            ?status,
            iterations,
            initial = initial_energy.total,
            best = best.energy(),
            best_iteration = best.iteration(),
            "refinement finished"
        );

        Ok(RefineOutcome {
            status,
            iterations,
            initial_energy,
            best_energy: best.energy(),
            best_iteration: best.iteration(),
            history,
            solver_failures,
            timing: collector.finish(),
        })
    }

    fn validate(
        &self,
        cuboids: &[Cuboid],
        reflections: &[ReflectionSymmetryGroup],
        rotations: &[RotationSymmetryGroup],
    ) -> Result<()> {
        let num_cuboids = cuboids.len();
        for &index in &self.config.fixed_cuboids {
            if index >= num_cuboids {
                return Err(RefineError::FixedIndexOutOfRange { index, num_cuboids });
            }
        }
        if let Some(index) = cuboids.iter().position(|c| !c.is_finite()) {
            return Err(RefineError::NonFiniteGeometry(index));
        }
        for (index, group) in reflections.iter().enumerate() {
            group.validate(num_cuboids, index)?;
        }
        for (index, group) in rotations.iter().enumerate() {
            group.validate(num_cuboids, index)?;
        }
        Ok(())
    }

    fn data_energy<P: RelationPrior + ?Sized>(
        &self,
        scene: &RefineScene<'_>,
        prior: &P,
    ) -> Result<DataEnergy> {
        let data = prior.data_energy(scene.cuboids);
        data.validate(scene.cuboids.len())?;
        Ok(data)
    }

    /// Solves of one outer iteration, in order.
    fn solve_plan(&self, scene: &RefineScene<'_>) -> Vec<(SolveTarget, ActiveGroups)> {
        let (num_reflections, num_rotations) = if self.config.use_symmetry {
            (scene.reflections.len(), scene.rotations.len())
        } else {
            (0, 0)
        };

        if num_reflections + num_rotations == 0 {
            return vec![(SolveTarget::Unconstrained, ActiveGroups::none())];
        }

        match self.config.strategy {
            SolveStrategy::Joint => vec![(
                SolveTarget::Joint,
                ActiveGroups::all(num_reflections, num_rotations),
            )],
            SolveStrategy::PerGroup => (0..num_reflections)
                .map(|g| (SolveTarget::Reflection(g), ActiveGroups::reflection(g)))
                .chain(
                    (0..num_rotations)
                        .map(|g| (SolveTarget::Rotation(g), ActiveGroups::rotation(g))),
                )
                .collect(),
        }
    }

    /// Regenerate samples on every cuboid and match them across groups.
    fn resample_and_match<Sm: SurfaceSampler + ?Sized>(
        &self,
        scene: &mut RefineScene<'_>,
        sampler: &Sm,
    ) -> SymmetryCorrespondences {
        for cuboid in scene.cuboids.iter_mut() {
            let samples = sampler.sample(cuboid);
            cuboid.set_samples(samples);
        }

        if !self.config.use_symmetry {
            return SymmetryCorrespondences::default();
        }

        let config = CorrespondenceConfig {
            squared_neighbor_distance: self.config.squared_neighbor_distance,
            min_pairs: self.config.min_symmetry_pairs,
        };
        let cuboids: &[Cuboid] = scene.cuboids;
        let needed = required_cuboids(cuboids.len(), scene.reflections.iter(), scene.rotations.iter());
        // Trees live only for this pass.
        let index = SampleIndex::build(cuboids, &needed);

        let matches = SymmetryCorrespondences {
            reflections: scene
                .reflections
                .iter()
                .map(|g| reflection_correspondences(g, cuboids, &index, &config))
                .collect(),
            rotations: scene
                .rotations
                .iter()
                .map(|g| rotation_correspondences(g, cuboids, &index, &config))
                .collect(),
        };

        for (g, m) in matches.reflections.iter().enumerate() {
            if !m.sufficient {
                warn!(group = g, pairs = m.len(), "reflection group has too few matches, energy suppressed");
            }
        }
        for (g, m) in matches.rotations.iter().enumerate() {
            if !m.sufficient {
                warn!(group = g, pairs = m.len(), "rotation group has too few matches, energy suppressed");
            }
        }
        matches
    }

    /// Weighted data plus symmetry energy of the current geometry.
    fn evaluate<P: RelationPrior + ?Sized>(
        &self,
        scene: &RefineScene<'_>,
        prior: &P,
        correspondences: &SymmetryCorrespondences,
    ) -> Result<EnergyBreakdown> {
        let data = self
            .data_energy(scene, prior)?
            .evaluate(scene.cuboids, self.config.data_weight);
        let symmetry = correspondences
            .reflections
            .iter()
            .chain(&correspondences.rotations)
            .map(|c| symmetry_energy(c, self.config.symmetry_weight))
            .sum();
        Ok(EnergyBreakdown::new(data, symmetry))
    }
}
