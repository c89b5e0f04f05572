pub mod candidates;
pub mod config;
pub mod constraints;
pub mod error;
pub mod feasibility;
pub mod instrumentation;
pub mod model;
pub mod scoring;
pub mod search;
pub mod slots;
pub mod ul;

pub use config::{DownscalingConfig, SearchBudget, SolverConfig};
pub use error::SolveError;
pub use instrumentation::{InstrumentationSink, NullSink, RecordingSink, RunStats, SearchEvent};
pub use model::{
    ActivityContext, Assignment, CandidateRecipe, Day, DailyTracker, DayActivity, DecisionPoint,
    FatRange, Ingredient, Nutrition, NutrientMap, PinnedAssignment, PrimaryCarbContribution,
    Recipe, ResolvedUls, SatietyRequirement, Schedule, Slot, SlotContext, UserProfile,
    WeeklyTracker, WorkoutEntry,
};
pub use search::{
    BudgetExhaustionReport, DailyInfeasibilityReport, DeficientNutrient, FailureMode,
    MicronutrientDeficitClassification, PinnedConflictClassification, PinnedConflictReport,
    PoolInsufficiencyReport, WeeklyInfeasibilityReport,
};

use std::collections::HashSet;

/// Everything a caller supplies to [`solve`]: the week being planned, the
/// candidate recipe pool it is allowed to draw from, and the run-wide
/// configuration knobs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SolveRequest {
    pub profile: UserProfile,
    pub days: usize,
    pub recipe_pool: Vec<Recipe>,
    #[serde(default)]
    pub config: SolverConfig,
}

/// The result of one deterministic solve attempt: either a
/// complete plan or the single failure mode that ended the search.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Success {
        assignments: Vec<Assignment>,
        sodium_advisory: Option<String>,
        stats: RunStats,
    },
    Failure {
        mode: FailureMode,
        stats: RunStats,
    },
}

/// Runs the solver with no external instrumentation sink (the default
/// entry point). Equivalent to `solve_with_sink(request, &mut NullSink)`.
pub fn solve(request: &SolveRequest) -> Result<SolveOutcome, SolveError> {
    let mut sink = NullSink;
    solve_with_sink(request, &mut sink)
}

/// Runs the solver, forwarding every [`SearchEvent`] the search orchestrator
/// emits to `sink` as it happens. Validates the request shape
/// and pool before any search state is constructed; a validation failure
/// returns `Err` rather than a [`SolveOutcome::Failure`], since it signals a
/// malformed request rather than a legitimately infeasible one.
pub fn solve_with_sink(
    request: &SolveRequest,
    sink: &mut dyn InstrumentationSink,
) -> Result<SolveOutcome, SolveError> {
    let SolveRequest { profile, days, recipe_pool, config } = request;

    profile.validate_shape(*days)?;
    validate_pool(recipe_pool)?;
    validate_pinned_recipes_exist(profile, recipe_pool)?;
    if !config.downscaling.is_valid() {
        return Err(SolveError::InvalidDownscalingConfig(format!(
            "k={} * sigma={} must stay below 1.0",
            config.downscaling.k, config.downscaling.sigma
        )));
    }

    let resolved_uls = ul::resolve_uls(&profile.demographic, &profile.upper_limits_overrides);
    let result = search::run(profile, recipe_pool, *days, &resolved_uls, config, sink);

    Ok(if result.success {
        SolveOutcome::Success {
            assignments: result.assignments,
            sodium_advisory: result.sodium_advisory,
            stats: result.stats,
        }
    } else {
        SolveOutcome::Failure {
            mode: result.failure.expect("a failed run always carries a failure mode"),
            stats: result.stats,
        }
    })
}

fn validate_pool(pool: &[Recipe]) -> Result<(), SolveError> {
    if pool.is_empty() {
        return Err(SolveError::EmptyPool);
    }
    let mut seen = HashSet::with_capacity(pool.len());
    for recipe in pool {
        if !seen.insert(recipe.id.as_str()) {
            return Err(SolveError::DuplicateRecipeId(recipe.id.clone()));
        }
    }
    Ok(())
}

fn validate_pinned_recipes_exist(profile: &UserProfile, pool: &[Recipe]) -> Result<(), SolveError> {
    let pool_ids: HashSet<&str> = pool.iter().map(|r| r.id.as_str()).collect();
    for pin in &profile.pinned_assignments {
        if !pool_ids.contains(pin.recipe_id.as_str()) {
            return Err(SolveError::UnknownPinnedRecipe {
                day_index: pin.day_index,
                slot_index: pin.slot_index,
                recipe_id: pin.recipe_id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use model::{Day, FatRange, Schedule};

    fn recipe(id: &str, calories: f64) -> Recipe {
        Recipe {
            id: id.to_string(),
            name: id.to_string(),
            ingredients: vec![Ingredient { normalized_name: "rice".to_string(), to_taste: false }],
            cooking_time_minutes: 10,
            nutrition: Nutrition {
                calories,
                protein_g: 50.0,
                fat_g: 32.0,
                carbs_g: 125.0,
                micronutrients: Default::default(),
            },
            primary_carb_contribution: None,
        }
    }

    fn slot(hour: u32) -> Slot {
        Slot {
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            busyness: 2,
            meal_type: "meal".to_string(),
        }
    }

    fn base_profile() -> UserProfile {
        UserProfile {
            daily_calories: 2000,
            daily_protein_g: 100.0,
            daily_fat_g: FatRange { min_g: 50.0, max_g: 80.0 },
            daily_carbs_g: 250.0,
            max_daily_calories: None,
            schedule: Schedule { days: vec![Day { slots: vec![slot(12), slot(18)] }] },
            excluded_ingredients: HashSet::new(),
            liked_foods: HashSet::new(),
            demographic: "adult_male".to_string(),
            upper_limits_overrides: Default::default(),
            pinned_assignments: vec![],
            micronutrient_targets: Default::default(),
            activity_schedule: vec![],
        }
    }

    #[test]
    fn solve_succeeds_on_trivial_two_slot_request() {
        let request = SolveRequest {
            profile: base_profile(),
            days: 1,
            recipe_pool: vec![recipe("A", 1000.0), recipe("B", 1000.0)],
            config: SolverConfig::default(),
        };
        match solve(&request).unwrap() {
            SolveOutcome::Success { assignments, .. } => assert_eq!(assignments.len(), 2),
            SolveOutcome::Failure { mode, .. } => panic!("expected success, got {mode:?}"),
        }
    }

    #[test]
    fn solve_rejects_empty_pool() {
        let request = SolveRequest {
            profile: base_profile(),
            days: 1,
            recipe_pool: vec![],
            config: SolverConfig::default(),
        };
        assert_eq!(solve(&request).unwrap_err(), SolveError::EmptyPool);
    }

    #[test]
    fn solve_rejects_duplicate_recipe_ids() {
        let request = SolveRequest {
            profile: base_profile(),
            days: 1,
            recipe_pool: vec![recipe("A", 1000.0), recipe("A", 900.0)],
            config: SolverConfig::default(),
        };
        assert_eq!(solve(&request).unwrap_err(), SolveError::DuplicateRecipeId("A".to_string()));
    }

    #[test]
    fn solve_rejects_pinned_recipe_missing_from_pool() {
        let mut profile = base_profile();
        profile.pinned_assignments.push(PinnedAssignment {
            day_index: 0,
            slot_index: 0,
            recipe_id: "GHOST".to_string(),
        });
        let request = SolveRequest {
            profile,
            days: 1,
            recipe_pool: vec![recipe("A", 1000.0), recipe("B", 1000.0)],
            config: SolverConfig::default(),
        };
        match solve(&request) {
            Err(SolveError::UnknownPinnedRecipe { recipe_id, .. }) => assert_eq!(recipe_id, "GHOST"),
            other => panic!("expected UnknownPinnedRecipe, got {other:?}"),
        }
    }

    #[test]
    fn solve_rejects_invalid_downscaling_config() {
        let request = SolveRequest {
            profile: base_profile(),
            days: 1,
            recipe_pool: vec![recipe("A", 1000.0), recipe("B", 1000.0)],
            config: SolverConfig {
                downscaling: DownscalingConfig { enabled: true, k: 10, sigma: 0.5 },
                budget: SearchBudget::default(),
            },
        };
        assert!(matches!(solve(&request), Err(SolveError::InvalidDownscalingConfig(_))));
    }

    #[test]
    fn solve_with_sink_forwards_assignment_attempts() {
        let request = SolveRequest {
            profile: base_profile(),
            days: 1,
            recipe_pool: vec![recipe("A", 1000.0), recipe("B", 1000.0)],
            config: SolverConfig::default(),
        };
        let mut sink = RecordingSink::new();
        let outcome = solve_with_sink(&request, &mut sink).unwrap();
        assert!(matches!(outcome, SolveOutcome::Success { .. }));
        assert!(!sink.events.is_empty());
    }
}
