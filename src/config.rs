//! Run-wide solver configuration: search budget policy and the
//! carb-downscaling feature toggle.

use serde::{Deserialize, Serialize};

/// `K`/`sigma` for the carb-downscaling variant step. `k * sigma` must stay
/// below `1.0` so every `q_i` stays positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownscalingConfig {
    pub enabled: bool,
    pub k: u32,
    pub sigma: f64,
}

impl Default for DownscalingConfig {
    fn default() -> Self {
        DownscalingConfig {
            enabled: false,
            k: 3,
            sigma: 0.15,
        }
    }
}

impl DownscalingConfig {
    pub fn is_valid(&self) -> bool {
        !self.enabled || (self.k as f64) * self.sigma < 1.0
    }
}

/// Caps the search's exploration effort so a pathologically constrained
/// profile fails with FM-5 rather than running forever. Spec §9 leaves the
/// exact policy to configuration; this implementation exposes all three
/// knobs the teacher's own rotation/backtracking code reaches for
/// (attempt count, backtrack count, wall clock), any of which alone is
/// sufficient to bound the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBudget {
    pub max_assignment_attempts: Option<u64>,
    pub max_backtracks: Option<u64>,
    pub max_wall_time_ms: Option<u64>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        SearchBudget {
            max_assignment_attempts: Some(200_000),
            max_backtracks: Some(50_000),
            max_wall_time_ms: None,
        }
    }
}

/// All per-run solver configuration that is not part of the user profile or
/// recipe pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SolverConfig {
    pub downscaling: DownscalingConfig,
    pub budget: SearchBudget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_downscaling_is_disabled_and_valid() {
        let config = DownscalingConfig::default();
        assert!(!config.enabled);
        assert!(config.is_valid());
    }

    #[test]
    fn invalid_when_k_times_sigma_reaches_one() {
        let config = DownscalingConfig {
            enabled: true,
            k: 5,
            sigma: 0.2,
        };
        assert!(!config.is_valid());
    }
}
