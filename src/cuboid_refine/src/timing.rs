//! Phase timings of a refinement run.
//!
//! Populated only with the `profiling` feature; otherwise the collector
//! and [`time_phase!`](crate::time_phase) compile to nothing and
//! [`RefineOutcome::timing`](crate::RefineOutcome::timing) stays zeroed.

use serde::{Deserialize, Serialize};
#[cfg(feature = "profiling")]
use std::time::Instant;

/// Timed part of an outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Resampling, search trees and matching.
    Correspondence,
    /// Objective terms and constraints.
    Assembly,
    Solve,
    /// Write-back and energy evaluation.
    Update,
}

/// Milliseconds spent in each phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimes {
    pub correspondence_ms: f64,
    pub assembly_ms: f64,
    pub solve_ms: f64,
    pub update_ms: f64,
}

impl PhaseTimes {
    pub fn add(&mut self, phase: Phase, ms: f64) {
        let slot = match phase {
            Phase::Correspondence => &mut self.correspondence_ms,
            Phase::Assembly => &mut self.assembly_ms,
            Phase::Solve => &mut self.solve_ms,
            Phase::Update => &mut self.update_ms,
        };
        *slot += ms;
    }

    pub fn sum(&self) -> f64 {
        self.correspondence_ms + self.assembly_ms + self.solve_ms + self.update_ms
    }
}

/// Timing of one outer iteration (0 is the baseline evaluation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationTiming {
    pub iteration: usize,
    pub total_ms: f64,
    pub phases: PhaseTimes,
}

/// Timing of a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefineTiming {
    pub total_ms: f64,
    /// Phase totals over all iterations, baseline included.
    pub phases: PhaseTimes,
    pub iterations: Vec<IterationTiming>,
}

#[cfg(feature = "profiling")]
fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Start instant of a timed block.
#[cfg(feature = "profiling")]
pub struct PhaseTimer(Instant);

#[cfg(feature = "profiling")]
impl PhaseTimer {
    #[inline]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        ms_since(self.0)
    }
}

#[cfg(feature = "profiling")]
#[derive(Debug, Default)]
pub struct TimingCollector {
    run_start: Option<Instant>,
    iteration_start: Option<Instant>,
    current: IterationTiming,
    timing: RefineTiming,
}

#[cfg(feature = "profiling")]
impl TimingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_run(&mut self) {
        *self = Self::default();
        self.run_start = Some(Instant::now());
        self.start_iteration(0);
    }

    pub fn start_iteration(&mut self, iteration: usize) {
        self.iteration_start = Some(Instant::now());
        self.current = IterationTiming {
            iteration,
            ..Default::default()
        };
    }

    pub fn record_phase(&mut self, phase: Phase, ms: f64) {
        self.current.phases.add(phase, ms);
        self.timing.phases.add(phase, ms);
    }

    pub fn end_iteration(&mut self) {
        if let Some(start) = self.iteration_start.take() {
            self.current.total_ms = ms_since(start);
            self.timing.iterations.push(std::mem::take(&mut self.current));
        }
    }

    pub fn finish(&mut self) -> RefineTiming {
        self.end_iteration();
        self.timing.total_ms = self.run_start.map(ms_since).unwrap_or(0.0);
        std::mem::take(&mut self.timing)
    }
}

#[cfg(not(feature = "profiling"))]
#[derive(Debug, Default)]
pub struct TimingCollector;

#[cfg(not(feature = "profiling"))]
impl TimingCollector {
    #[inline(always)]
    pub fn new() -> Self {
        Self
    }

    #[inline(always)]
    pub fn start_run(&mut self) {}

    #[inline(always)]
    pub fn start_iteration(&mut self, _iteration: usize) {}

    #[inline(always)]
    pub fn record_phase(&mut self, _phase: Phase, _ms: f64) {}

    #[inline(always)]
    pub fn end_iteration(&mut self) {}

    #[inline(always)]
    pub fn finish(&mut self) -> RefineTiming {
        RefineTiming::default()
    }
}

/// Time `$block` as `$phase` on `$collector`, yielding the block's value.
///
/// ```ignore
/// let assembled = time_phase!(collector, Phase::Assembly, { assemble(...) });
/// ```
#[macro_export]
macro_rules! time_phase {
    ($collector:expr, $phase:expr, $block:expr) => {{
        #[cfg(feature = "profiling")]
        let timer = $crate::timing::PhaseTimer::start();

        let result = $block;

        #[cfg(feature = "profiling")]
        $collector.record_phase($phase, timer.elapsed_ms());
        #[cfg(not(feature = "profiling"))]
        let _ = $phase;

        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_times_accumulate() {
        let mut times = PhaseTimes::default();
        times.add(Phase::Solve, 2.0);
        times.add(Phase::Solve, 1.5);
        times.add(Phase::Correspondence, 0.5);
        assert_eq!(times.solve_ms, 3.5);
        assert_eq!(times.assembly_ms, 0.0);
        assert_eq!(times.sum(), 4.0);
    }

    #[test]
    fn test_collector_records_iterations() {
        let mut collector = TimingCollector::new();
        collector.start_run();
        collector.end_iteration();
        collector.start_iteration(1);
        let value = time_phase!(collector, Phase::Solve, { 21 * 2 });
        collector.end_iteration();
        let timing = collector.finish();

        assert_eq!(value, 42);
        #[cfg(feature = "profiling")]
        {
            let numbers: Vec<usize> = timing.iterations.iter().map(|t| t.iteration).collect();
            assert_eq!(numbers, vec![0, 1]);
            assert!(timing.phases.solve_ms >= 0.0);
            assert!(timing.total_ms >= timing.iterations[1].total_ms);
        }
        #[cfg(not(feature = "profiling"))]
        assert!(timing.iterations.is_empty());
    }
}
