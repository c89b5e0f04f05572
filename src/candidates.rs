//! Candidate generation: composes [`crate::constraints`] and
//! [`crate::feasibility`] into the ordered candidate set for one non-pinned
//! decision point, then optionally synthesizes carb-downscaled variants.
//! Never touches [`crate::scoring`].

use crate::config::DownscalingConfig;
use crate::constraints::{self, HardConstraintViolation};
use crate::feasibility::{self, FeasibilityViolation, PoolMacroBounds};
use crate::model::{CandidateRecipe, DailyTracker, FatRange, Recipe, ResolvedUls, Slot, UserProfile};
use std::collections::HashSet;

/// Why candidate generation concluded the decision point must backtrack,
/// rather than simply returning an empty list — distinguishes "no recipe
/// fits" from "a later same-day slot would have nothing left to try",
/// which matters for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Candidates(Vec<CandidateRecipe>),
    EmptyAfterFiltering,
    FutureSlotUnreachable { slot_index: usize },
}

/// Everything candidate generation needs beyond the pool and the decision
/// point itself.
pub struct GenerationContext<'a> {
    pub profile: &'a UserProfile,
    pub daily: &'a DailyTracker,
    pub resolved_uls: &'a ResolvedUls,
    pub bounds: &'a PoolMacroBounds,
    pub target_daily_calories: f64,
    pub target_protein: f64,
    pub target_carbs: f64,
    pub fat_range: FatRange,
    pub is_workout_slot: bool,
    pub is_sedentary_slot: bool,
    pub previous_day_non_workout: Option<&'a HashSet<String>>,
    pub slots_remaining_after: usize,
    pub remaining_same_day_slots: &'a [(usize, Slot)],
    pub downscaling: DownscalingConfig,
}

fn passes_hc_and_fc(
    candidate: &CandidateRecipe,
    slot: &Slot,
    ctx: &GenerationContext,
) -> Result<(), ()> {
    constraints::evaluate_all(
        candidate,
        slot,
        ctx.daily,
        ctx.profile,
        ctx.resolved_uls,
        ctx.is_workout_slot,
        ctx.previous_day_non_workout,
    )
    .map_err(|_| ())?;
    feasibility::check_calorie_feasibility(
        candidate,
        ctx.daily,
        ctx.slots_remaining_after,
        ctx.target_daily_calories,
        ctx.profile.max_daily_calories,
        ctx.bounds,
    )
    .map_err(|_| ())?;
    feasibility::check_macro_feasibility(
        candidate,
        ctx.daily,
        ctx.slots_remaining_after,
        ctx.target_protein,
        ctx.target_carbs,
        ctx.fat_range,
        ctx.bounds,
    )
    .map_err(|_| ())?;
    feasibility::check_upper_limit_feasibility(candidate, ctx.daily, ctx.resolved_uls).map_err(|_| ())?;
    Ok(())
}

/// Whether a candidate was dropped *solely* for calorie excess (HC-5 or
/// FC-1), as opposed to any other HC/FC reason — the only recipes eligible
/// to feed the downscaling step.
fn dropped_solely_for_calorie_excess(candidate: &CandidateRecipe, slot: &Slot, ctx: &GenerationContext) -> bool {
    let hc_others = constraints::check_excluded_ingredient(candidate, &ctx.profile.excluded_ingredients).is_err()
        || constraints::check_uniqueness_per_day(candidate, ctx.daily).is_err()
        || constraints::check_cooking_time(candidate, slot).is_err()
        || constraints::check_daily_upper_limits(candidate, ctx.daily, ctx.resolved_uls).is_err()
        || constraints::check_consecutive_non_workout_repetition(
            candidate,
            ctx.is_workout_slot,
            ctx.previous_day_non_workout,
        )
        .is_err();
    if hc_others {
        return false;
    }
    let calorie_hc_violation =
        constraints::check_calorie_ceiling(candidate, ctx.daily, ctx.profile.max_daily_calories).is_err();
    let calorie_fc_violation = feasibility::check_calorie_feasibility(
        candidate,
        ctx.daily,
        ctx.slots_remaining_after,
        ctx.target_daily_calories,
        ctx.profile.max_daily_calories,
        ctx.bounds,
    )
    .is_err();
    let other_fc_violation = feasibility::check_macro_feasibility(
        candidate,
        ctx.daily,
        ctx.slots_remaining_after,
        ctx.target_protein,
        ctx.target_carbs,
        ctx.fat_range,
        ctx.bounds,
    )
    .is_err()
        || feasibility::check_upper_limit_feasibility(candidate, ctx.daily, ctx.resolved_uls).is_err();
    (calorie_hc_violation || calorie_fc_violation) && !other_fc_violation
}

fn synthesize_variants(recipe: &Recipe, downscaling: &DownscalingConfig) -> Vec<CandidateRecipe> {
    let Some(contribution) = &recipe.primary_carb_contribution else {
        return Vec::new();
    };
    if contribution.quantity_g <= 0.0 {
        return Vec::new();
    }
    (1..=downscaling.k)
        .filter_map(|i| {
            let fraction = 1.0 - (i as f64) * downscaling.sigma;
            if fraction <= 0.0 {
                return None;
            }
            let q_i = contribution.quantity_g * fraction;
            let scale = q_i / contribution.quantity_g;
            let nutrition = recipe
                .nutrition
                .subtract(&contribution.contribution)
                .add(&contribution.contribution.scaled(scale));
            Some(CandidateRecipe::Variant {
                parent: recipe.clone(),
                variant_index: i,
                scaled_quantity_g: q_i,
                nutrition,
            })
        })
        .collect()
}

/// Runs the full non-pinned candidate generation pipeline for
/// one decision point, including the optional downscaling step.
pub fn generate_candidates(pool: &[Recipe], slot: &Slot, ctx: &GenerationContext) -> GenerationOutcome {
    let mut calorie_dropped: Vec<&Recipe> = Vec::new();
    let mut survivors: Vec<CandidateRecipe> = Vec::new();

    for recipe in pool {
        let candidate = CandidateRecipe::Base(recipe.clone());
        match passes_hc_and_fc(&candidate, slot, ctx) {
            Ok(()) => survivors.push(candidate),
            Err(()) => {
                if dropped_solely_for_calorie_excess(&candidate, slot, ctx) {
                    calorie_dropped.push(recipe);
                }
            }
        }
    }

    if ctx.downscaling.enabled && ctx.is_sedentary_slot {
        for recipe in calorie_dropped {
            for variant in synthesize_variants(recipe, &ctx.downscaling) {
                if passes_hc_and_fc(&variant, slot, ctx).is_ok() {
                    survivors.push(variant);
                }
            }
        }
    }

    if survivors.is_empty() {
        return GenerationOutcome::EmptyAfterFiltering;
    }

    for (slot_index, future_slot) in ctx.remaining_same_day_slots {
        let eligible = feasibility::future_slot_has_eligible_candidate(
            pool,
            future_slot,
            ctx.daily,
            &ctx.profile.excluded_ingredients,
            ctx.profile.max_daily_calories,
            ctx.resolved_uls,
            ctx.is_workout_slot,
            ctx.previous_day_non_workout,
        );
        if !eligible {
            return GenerationOutcome::FutureSlotUnreachable {
                slot_index: *slot_index,
            };
        }
    }

    GenerationOutcome::Candidates(survivors)
}

/// Exposed for the search orchestrator's pinned-decision pre-validation
/// pass, which needs the raw HC verdict (not the whole candidate pipeline)
/// against a single pinned recipe.
pub fn check_pinned_hc(
    candidate: &CandidateRecipe,
    slot: &Slot,
    daily: &DailyTracker,
    profile: &UserProfile,
    resolved_uls: &ResolvedUls,
    is_workout_slot: bool,
    previous_day_non_workout: Option<&HashSet<String>>,
) -> Result<(), HardConstraintViolation> {
    constraints::evaluate_all(
        candidate,
        slot,
        daily,
        profile,
        resolved_uls,
        is_workout_slot,
        previous_day_non_workout,
    )
}

/// Exposed for the same pre-validation pass to report feasibility-only
/// failures distinctly from hard-constraint failures.
pub fn check_pinned_feasibility(
    candidate: &CandidateRecipe,
    ctx: &GenerationContext,
) -> Result<(), FeasibilityViolation> {
    feasibility::check_calorie_feasibility(
        candidate,
        ctx.daily,
        ctx.slots_remaining_after,
        ctx.target_daily_calories,
        ctx.profile.max_daily_calories,
        ctx.bounds,
    )?;
    feasibility::check_macro_feasibility(
        candidate,
        ctx.daily,
        ctx.slots_remaining_after,
        ctx.target_protein,
        ctx.target_carbs,
        ctx.fat_range,
        ctx.bounds,
    )?;
    feasibility::check_upper_limit_feasibility(candidate, ctx.daily, ctx.resolved_uls)?;
    Ok(())
}
