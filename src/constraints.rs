//! Hard constraints HC-1..HC-8: pure predicates over `(recipe_or_variant,
//! slot, day, state, profile, resolved_ul)`. No mutation, no scoring.
//!
//! Mirrors the `Constraint` trait this codebase already uses in
//! `meal_planning::constraints`, except a hard constraint returns allow/deny
//! rather than a continuous fit score (scoring is [`crate::scoring`]'s job,
//! never this module's).

use crate::model::{CandidateRecipe, DailyTracker, ResolvedUls, Slot, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which hard constraint rejected a candidate, and why — used both to prune
/// candidates silently and to build FM-1/FM-3 diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HardConstraintViolation {
    /// HC-1
    ExcludedIngredient { ingredient: String },
    /// HC-2
    DuplicateRecipeInDay,
    /// HC-3
    CookingTimeExceeded { max_minutes: u32, actual_minutes: u32 },
    /// HC-4
    DailyUpperLimitExceeded {
        nutrient: String,
        limit: f64,
        would_be: f64,
    },
    /// HC-5
    CalorieCeilingExceeded { ceiling: u32, would_be: f64 },
    /// HC-8
    ConsecutiveNonWorkoutRepetition,
}

/// HC-1: the recipe must contain no excluded ingredient.
pub fn check_excluded_ingredient(
    candidate: &CandidateRecipe,
    excluded: &HashSet<String>,
) -> Result<(), HardConstraintViolation> {
    for ingredient in candidate.ingredients() {
        if excluded.contains(&ingredient.normalized_name) {
            return Err(HardConstraintViolation::ExcludedIngredient {
                ingredient: ingredient.normalized_name.clone(),
            });
        }
    }
    Ok(())
}

/// HC-2: `recipe.id` must not already be used in this day.
pub fn check_uniqueness_per_day(
    candidate: &CandidateRecipe,
    daily: &DailyTracker,
) -> Result<(), HardConstraintViolation> {
    if daily.used_recipe_ids.contains(candidate.id()) {
        Err(HardConstraintViolation::DuplicateRecipeInDay)
    } else {
        Ok(())
    }
}

/// HC-3: `recipe.cooking_time_minutes <= slot.cooking_time_max` (unbounded
/// for busyness 4).
pub fn check_cooking_time(
    candidate: &CandidateRecipe,
    slot: &Slot,
) -> Result<(), HardConstraintViolation> {
    match slot.cooking_time_max() {
        Some(max) if candidate.cooking_time_minutes() > max => {
            Err(HardConstraintViolation::CookingTimeExceeded {
                max_minutes: max,
                actual_minutes: candidate.cooking_time_minutes(),
            })
        }
        _ => Ok(()),
    }
}

/// HC-4: for every nutrient with a resolved UL, the running daily total plus
/// this candidate's contribution must not strictly exceed it (equality is
/// allowed).
pub fn check_daily_upper_limits(
    candidate: &CandidateRecipe,
    daily: &DailyTracker,
    resolved_uls: &ResolvedUls,
) -> Result<(), HardConstraintViolation> {
    for (nutrient, limit) in resolved_uls {
        let current = daily.micronutrients_consumed.get(nutrient).copied().unwrap_or(0.0);
        let added = candidate.nutrition().micronutrients.get(nutrient).copied().unwrap_or(0.0);
        let would_be = current + added;
        if would_be > *limit {
            return Err(HardConstraintViolation::DailyUpperLimitExceeded {
                nutrient: nutrient.clone(),
                limit: *limit,
                would_be,
            });
        }
    }
    Ok(())
}

/// HC-5: if `max_daily_calories` is set, the running total must not exceed
/// it after this candidate is added.
pub fn check_calorie_ceiling(
    candidate: &CandidateRecipe,
    daily: &DailyTracker,
    max_daily_calories: Option<u32>,
) -> Result<(), HardConstraintViolation> {
    if let Some(ceiling) = max_daily_calories {
        let would_be = daily.calories_consumed + candidate.nutrition().calories;
        if would_be > ceiling as f64 {
            return Err(HardConstraintViolation::CalorieCeilingExceeded { ceiling, would_be });
        }
    }
    Ok(())
}

/// HC-8: for `d >= 2`, a non-workout slot must not repeat a recipe id used
/// in a non-workout slot of the previous day. Never restricts workout slots
/// or day 1 (caller is expected to pass `None` for `previous_day_non_workout`
/// on day 1).
pub fn check_consecutive_non_workout_repetition(
    candidate: &CandidateRecipe,
    is_workout_slot: bool,
    previous_day_non_workout: Option<&HashSet<String>>,
) -> Result<(), HardConstraintViolation> {
    if is_workout_slot {
        return Ok(());
    }
    if let Some(previous) = previous_day_non_workout {
        if previous.contains(candidate.id()) {
            return Err(HardConstraintViolation::ConsecutiveNonWorkoutRepetition);
        }
    }
    Ok(())
}

/// HC-6: pinned slots assign their pinned recipe verbatim — enforced by the
/// search orchestrator bypassing candidate generation entirely for pinned
/// decision points, not by a predicate here. See [`crate::search`].
///
/// HC-7 (feasibility precedence) is likewise not a predicate: it is enforced
/// structurally by composing constraints before feasibility before scoring,
/// and scoring never reordering past either filter stage. See
/// [`crate::candidates::generate_candidates`].

/// Runs every applicable non-pinned HC against a single candidate at a given
/// slot, short-circuiting on the first violation (used by candidate
/// generation; order here is cosmetic, every HC is independent).
pub fn evaluate_all(
    candidate: &CandidateRecipe,
    slot: &Slot,
    daily: &DailyTracker,
    profile: &UserProfile,
    resolved_uls: &ResolvedUls,
    is_workout_slot: bool,
    previous_day_non_workout: Option<&HashSet<String>>,
) -> Result<(), HardConstraintViolation> {
    check_excluded_ingredient(candidate, &profile.excluded_ingredients)?;
    check_uniqueness_per_day(candidate, daily)?;
    check_cooking_time(candidate, slot)?;
    check_calorie_ceiling(candidate, daily, profile.max_daily_calories)?;
    check_daily_upper_limits(candidate, daily, resolved_uls)?;
    check_consecutive_non_workout_repetition(candidate, is_workout_slot, previous_day_non_workout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ingredient, Nutrition, Recipe};

    fn recipe(id: &str, calories: f64, cooking_time: u32) -> CandidateRecipe {
        CandidateRecipe::Base(Recipe {
            id: id.to_string(),
            name: id.to_string(),
            ingredients: vec![Ingredient {
                normalized_name: "chicken".to_string(),
                to_taste: false,
            }],
            cooking_time_minutes: cooking_time,
            nutrition: Nutrition {
                calories,
                protein_g: 10.0,
                fat_g: 5.0,
                carbs_g: 20.0,
                micronutrients: Default::default(),
            },
            primary_carb_contribution: None,
        })
    }

    #[test]
    fn hc1_rejects_excluded_ingredient() {
        let mut excluded = HashSet::new();
        excluded.insert("chicken".to_string());
        let r = recipe("r1", 100.0, 10);
        assert!(check_excluded_ingredient(&r, &excluded).is_err());
    }

    #[test]
    fn hc1_allows_non_excluded() {
        let excluded = HashSet::new();
        let r = recipe("r1", 100.0, 10);
        assert!(check_excluded_ingredient(&r, &excluded).is_ok());
    }

    #[test]
    fn hc2_rejects_duplicate() {
        let mut daily = DailyTracker::new(3);
        daily.used_recipe_ids.insert("r1".to_string());
        let r = recipe("r1", 100.0, 10);
        assert!(check_uniqueness_per_day(&r, &daily).is_err());
    }

    #[test]
    fn hc3_rejects_too_slow_for_busyness() {
        let slot = Slot {
            time: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            busyness: 1,
            meal_type: "breakfast".to_string(),
        };
        let r = recipe("r1", 100.0, 20);
        assert!(check_cooking_time(&r, &slot).is_err());
    }

    #[test]
    fn hc3_unbounded_for_busyness_four() {
        let slot = Slot {
            time: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            busyness: 4,
            meal_type: "breakfast".to_string(),
        };
        let r = recipe("r1", 100.0, 600);
        assert!(check_cooking_time(&r, &slot).is_ok());
    }

    #[test]
    fn hc4_allows_equality_but_not_excess() {
        let mut uls = ResolvedUls::new();
        uls.insert("sodium".to_string(), 100.0);
        let mut daily = DailyTracker::new(3);
        daily.micronutrients_consumed.insert("sodium".to_string(), 90.0);
        let mut r = recipe("r1", 100.0, 10);
        if let CandidateRecipe::Base(recipe) = &mut r {
            recipe.nutrition.micronutrients.insert("sodium".to_string(), 10.0);
        }
        assert!(check_daily_upper_limits(&r, &daily, &uls).is_ok());
        if let CandidateRecipe::Base(recipe) = &mut r {
            recipe.nutrition.micronutrients.insert("sodium".to_string(), 10.01);
        }
        assert!(check_daily_upper_limits(&r, &daily, &uls).is_err());
    }

    #[test]
    fn hc5_respects_ceiling() {
        let daily = DailyTracker::new(3);
        let r = recipe("r1", 2000.0, 10);
        assert!(check_calorie_ceiling(&r, &daily, Some(1800)).is_err());
        assert!(check_calorie_ceiling(&r, &daily, Some(2000)).is_ok());
        assert!(check_calorie_ceiling(&r, &daily, None).is_ok());
    }

    #[test]
    fn hc8_blocks_non_workout_repeat_from_previous_day() {
        let mut previous = HashSet::new();
        previous.insert("r1".to_string());
        let r = recipe("r1", 100.0, 10);
        assert!(check_consecutive_non_workout_repetition(&r, false, Some(&previous)).is_err());
    }

    #[test]
    fn hc8_never_restricts_workout_slots() {
        let mut previous = HashSet::new();
        previous.insert("r1".to_string());
        let r = recipe("r1", 100.0, 10);
        assert!(check_consecutive_non_workout_repetition(&r, true, Some(&previous)).is_ok());
    }

    #[test]
    fn hc8_never_restricts_day_one() {
        let r = recipe("r1", 100.0, 10);
        assert!(check_consecutive_non_workout_repetition(&r, false, None).is_ok());
    }
}
