//! Backtracking line search on a merit function.
//!
//! Finds a step length α satisfying the Armijo sufficient decrease
//! condition `φ(x + αd) ≤ φ(x) + c₁·α·D` where `D < 0` is the directional
//! derivative of the merit along `d`.

use serde::{Deserialize, Serialize};

/// Configuration for backtracking line search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSearchConfig {
    /// Sufficient decrease parameter (c₁). Typically 1e-4.
    pub c1: f64,

    /// Factor applied to α after each rejected trial.
    pub shrink: f64,

    /// Minimum step length before giving up.
    pub alpha_min: f64,

    /// Maximum number of merit evaluations.
    pub max_iterations: usize,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            c1: 1e-4,
            shrink: 0.5,
            alpha_min: 1e-10,
            max_iterations: 40,
        }
    }
}

/// Result of line search.
#[derive(Debug, Clone)]
pub struct LineSearchResult {
    /// Accepted step length.
    pub alpha: f64,

    /// Merit at the accepted step.
    pub merit: f64,

    /// Whether a step satisfying the Armijo condition was found.
    pub converged: bool,

    /// Number of merit evaluations.
    pub evaluations: usize,
}

impl LineSearchResult {
    /// Create a result indicating search failure.
    pub fn failed(evaluations: usize) -> Self {
        Self {
            alpha: 0.0,
            merit: f64::INFINITY,
            converged: false,
            evaluations,
        }
    }
}

/// Check the Armijo condition for a minimisation problem.
pub fn armijo_condition(
    new_merit: f64,
    old_merit: f64,
    alpha: f64,
    initial_derivative: f64,
    c1: f64,
) -> bool {
    new_merit <= old_merit + c1 * alpha * initial_derivative
}

/// Backtracking line search starting from α = 1.
///
/// Rejects immediately when `initial_derivative` is not negative. Non-finite
/// merit values count as rejected trials.
pub fn backtracking_line_search<F>(
    mut merit_fn: F,
    initial_merit: f64,
    initial_derivative: f64,
    config: &LineSearchConfig,
) -> LineSearchResult
where
    F: FnMut(f64) -> f64,
{
    if initial_derivative >= 0.0 || !initial_derivative.is_finite() {
        return LineSearchResult::failed(0);
    }

    let mut alpha = 1.0;
    let mut evaluations = 0;

    while evaluations < config.max_iterations && alpha >= config.alpha_min {
        let merit = merit_fn(alpha);
        evaluations += 1;

        if merit.is_finite()
            && armijo_condition(merit, initial_merit, alpha, initial_derivative, config.c1)
        {
            return LineSearchResult {
                alpha,
                merit,
                converged: true,
                evaluations,
            };
        }

        alpha *= config.shrink;
    }

    LineSearchResult::failed(evaluations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_config_default() {
        let config = LineSearchConfig::default();
        assert!(config.c1 > 0.0 && config.c1 < 1.0);
        assert!(config.shrink > 0.0 && config.shrink < 1.0);
        assert!(config.alpha_min > 0.0);
    }

    #[test]
    fn test_armijo_condition() {
        assert!(armijo_condition(0.5, 1.0, 1.0, -1.0, 0.1));
        assert!(!armijo_condition(0.95, 1.0, 1.0, -1.0, 0.1));
        assert!(!armijo_condition(1.1, 1.0, 1.0, -1.0, 0.1));
    }

    #[test]
    fn test_full_step_accepted_on_quadratic() {
        // φ(α) = (1 - α)², D = -2
        let result = backtracking_line_search(
            |a| (1.0 - a).powi(2),
            1.0,
            -2.0,
            &LineSearchConfig::default(),
        );
        assert!(result.converged);
        assert_relative_eq!(result.alpha, 1.0);
        assert_eq!(result.evaluations, 1);
    }

    #[test]
    fn test_overshoot_is_shortened() {
        // Minimum at α = 0.1; the full step overshoots.
        let result = backtracking_line_search(
            |a| (a - 0.1).powi(2),
            0.01,
            -0.2,
            &LineSearchConfig::default(),
        );
        assert!(result.converged);
        assert!(result.alpha < 0.2);
        assert!(result.merit < 0.01);
    }

    #[test]
    fn test_ascent_direction_rejected() {
        let result = backtracking_line_search(|a| a, 0.0, 1.0, &LineSearchConfig::default());
        assert!(!result.converged);
        assert_eq!(result.evaluations, 0);
    }

    #[test]
    fn test_non_finite_merit_is_rejected() {
        let result = backtracking_line_search(
            |a| if a > 0.3 { f64::NAN } else { -a },
            0.0,
            -1.0,
            &LineSearchConfig::default(),
        );
        assert!(result.converged);
        assert!(result.alpha <= 0.3);
    }
}
