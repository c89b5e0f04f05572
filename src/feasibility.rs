//! Forward-looking feasibility checks FC-1..FC-5: conservative pruning that
//! may let through candidates that later backtrack, but must never prune a
//! candidate capable of leading to a valid plan.

use crate::constraints;
use crate::model::{CandidateRecipe, DailyTracker, FatRange, Recipe, ResolvedUls, WeeklyTracker};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeasibilityViolation {
    /// FC-1
    CalorieCeilingExceeded,
    /// FC-1
    CalorieTargetUnreachable { projected_min: f64, projected_max: f64 },
    /// FC-2 (protein/carbs)
    MacroTargetUnreachable {
        macro_name: &'static str,
        projected_min: f64,
        projected_max: f64,
    },
    /// FC-2 (fat)
    FatRangeUnreachable { projected_min: f64, projected_max: f64 },
    /// FC-3
    UpperLimitUnreachable { nutrient: String },
}

/// Conservative (never tighter than truly achievable) min/max per-candidate
/// macro bounds across the recipe pool, precomputed once per search and
/// reused by FC-1/FC-2's interval-arithmetic checks.
#[derive(Debug, Clone, Copy)]
pub struct PoolMacroBounds {
    pub min_calories: f64,
    pub max_calories: f64,
    pub min_protein: f64,
    pub max_protein: f64,
    pub min_carbs: f64,
    pub max_carbs: f64,
    pub min_fat: f64,
    pub max_fat: f64,
}

impl PoolMacroBounds {
    pub fn compute(pool: &[Recipe]) -> Self {
        let mut bounds = PoolMacroBounds {
            min_calories: f64::MAX,
            max_calories: f64::MIN,
            min_protein: f64::MAX,
            max_protein: f64::MIN,
            min_carbs: f64::MAX,
            max_carbs: f64::MIN,
            min_fat: f64::MAX,
            max_fat: f64::MIN,
        };
        for recipe in pool {
            let n = &recipe.nutrition;
            bounds.min_calories = bounds.min_calories.min(n.calories);
            bounds.max_calories = bounds.max_calories.max(n.calories);
            bounds.min_protein = bounds.min_protein.min(n.protein_g);
            bounds.max_protein = bounds.max_protein.max(n.protein_g);
            bounds.min_carbs = bounds.min_carbs.min(n.carbs_g);
            bounds.max_carbs = bounds.max_carbs.max(n.carbs_g);
            bounds.min_fat = bounds.min_fat.min(n.fat_g);
            bounds.max_fat = bounds.max_fat.max(n.fat_g);
        }
        if pool.is_empty() {
            return PoolMacroBounds {
                min_calories: 0.0,
                max_calories: 0.0,
                min_protein: 0.0,
                max_protein: 0.0,
                min_carbs: 0.0,
                max_carbs: 0.0,
                min_fat: 0.0,
                max_fat: 0.0,
            };
        }
        bounds
    }
}

fn intervals_overlap(a_lo: f64, a_hi: f64, b_lo: f64, b_hi: f64) -> bool {
    a_lo <= b_hi && b_lo <= a_hi
}

/// FC-1: daily calorie feasibility.
pub fn check_calorie_feasibility(
    candidate: &CandidateRecipe,
    daily: &DailyTracker,
    slots_remaining_after: usize,
    target_daily_calories: f64,
    max_daily_calories: Option<u32>,
    bounds: &PoolMacroBounds,
) -> Result<(), FeasibilityViolation> {
    let would_be = daily.calories_consumed + candidate.nutrition().calories;
    if let Some(ceiling) = max_daily_calories {
        if would_be > ceiling as f64 {
            return Err(FeasibilityViolation::CalorieCeilingExceeded);
        }
    }
    let m = slots_remaining_after as f64;
    let projected_min = would_be + bounds.min_calories * m;
    let projected_max = would_be + bounds.max_calories * m;
    let target_lo = target_daily_calories * 0.90;
    let target_hi = target_daily_calories * 1.10;
    if intervals_overlap(projected_min, projected_max, target_lo, target_hi) {
        Ok(())
    } else {
        Err(FeasibilityViolation::CalorieTargetUnreachable {
            projected_min,
            projected_max,
        })
    }
}

/// FC-2: per-macro feasibility for protein and carbs (±10%), and fat
/// reachability into `[fat_min, fat_max]`.
pub fn check_macro_feasibility(
    candidate: &CandidateRecipe,
    daily: &DailyTracker,
    slots_remaining_after: usize,
    target_protein: f64,
    target_carbs: f64,
    fat_range: FatRange,
    bounds: &PoolMacroBounds,
) -> Result<(), FeasibilityViolation> {
    let m = slots_remaining_after as f64;

    let would_be_protein = daily.protein_consumed + candidate.nutrition().protein_g;
    let protein_lo = would_be_protein + bounds.min_protein * m;
    let protein_hi = would_be_protein + bounds.max_protein * m;
    if !intervals_overlap(
        protein_lo,
        protein_hi,
        target_protein * 0.90,
        target_protein * 1.10,
    ) {
        return Err(FeasibilityViolation::MacroTargetUnreachable {
            macro_name: "protein",
            projected_min: protein_lo,
            projected_max: protein_hi,
        });
    }

    let would_be_carbs = daily.carbs_consumed + candidate.nutrition().carbs_g;
    let carbs_lo = would_be_carbs + bounds.min_carbs * m;
    let carbs_hi = would_be_carbs + bounds.max_carbs * m;
    if !intervals_overlap(
        carbs_lo,
        carbs_hi,
        target_carbs * 0.90,
        target_carbs * 1.10,
    ) {
        return Err(FeasibilityViolation::MacroTargetUnreachable {
            macro_name: "carbs",
            projected_min: carbs_lo,
            projected_max: carbs_hi,
        });
    }

    let would_be_fat = daily.fat_consumed + candidate.nutrition().fat_g;
    let fat_lo = would_be_fat + bounds.min_fat * m;
    let fat_hi = would_be_fat + bounds.max_fat * m;
    if !intervals_overlap(fat_lo, fat_hi, fat_range.min_g, fat_range.max_g) {
        return Err(FeasibilityViolation::FatRangeUnreachable {
            projected_min: fat_lo,
            projected_max: fat_hi,
        });
    }

    Ok(())
}

/// FC-3: for every nutrient with a UL, the running total plus this
/// candidate's contribution must not exceed it. Identical in substance to
/// HC-4; kept as a distinct check rather than collapsed into HC-4, since
/// candidate generation applies it at a separate stage from the HC filter
/// pass.
pub fn check_upper_limit_feasibility(
    candidate: &CandidateRecipe,
    daily: &DailyTracker,
    resolved_uls: &ResolvedUls,
) -> Result<(), FeasibilityViolation> {
    for (nutrient, limit) in resolved_uls {
        let current = daily
            .micronutrients_consumed
            .get(nutrient)
            .copied()
            .unwrap_or(0.0);
        let added = candidate
            .nutrition()
            .micronutrients
            .get(nutrient)
            .copied()
            .unwrap_or(0.0);
        if current + added > *limit {
            return Err(FeasibilityViolation::UpperLimitUnreachable {
                nutrient: nutrient.clone(),
            });
        }
    }
    Ok(())
}

/// Precomputed `max_daily_achievable(n, M)`: the sum of the `M` largest
/// values of nutrient `n` across distinct recipes in the pool, indexed by
/// `(nutrient, M)` for each `M` that appears in the schedule. Computed once
/// per search (FC-4).
#[derive(Debug, Clone, Default)]
pub struct MaxAchievableTable {
    table: HashMap<(String, usize), f64>,
}

impl MaxAchievableTable {
    pub fn compute(pool: &[Recipe], nutrients: &HashSet<String>, slot_counts: &HashSet<usize>) -> Self {
        let mut table = HashMap::new();
        for nutrient in nutrients {
            let mut values: Vec<f64> = pool
                .iter()
                .map(|r| r.nutrition.micronutrients.get(nutrient).copied().unwrap_or(0.0))
                .collect();
            values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            for &m in slot_counts {
                let sum: f64 = values.iter().take(m).sum();
                table.insert((nutrient.clone(), m), sum);
            }
        }
        MaxAchievableTable { table }
    }

    pub fn get(&self, nutrient: &str, m: usize) -> f64 {
        self.table.get(&(nutrient.to_string(), m)).copied().unwrap_or(0.0)
    }
}

/// FC-4: evaluated at the start of day `d > 1`, before any assignment on
/// `d`. Returns the set of nutrients whose weekly deficit cannot possibly be
/// closed by the remaining days, given the optimistic per-day ceiling in
/// `max_achievable`.
pub fn check_weekly_micronutrient_feasibility(
    weekly: &WeeklyTracker,
    micronutrient_targets: &HashMap<String, f64>,
    total_days: usize,
    slots_on_day_d: usize,
    max_achievable: &MaxAchievableTable,
) -> Vec<String> {
    let days_left = weekly.days_remaining;
    micronutrient_targets
        .iter()
        .filter_map(|(nutrient, rdi)| {
            let achieved = weekly.weekly_totals.get(nutrient).copied().unwrap_or(0.0);
            let deficit = rdi * total_days as f64 - achieved;
            let ceiling = max_achievable.get(nutrient, slots_on_day_d);
            if deficit > days_left as f64 * ceiling {
                Some(nutrient.clone())
            } else {
                None
            }
        })
        .collect()
}

/// FC-5 (empty-candidate-set half): whether any recipe at all survives the
/// HC filters for a future same-day slot, under the optimistic assumption
/// that no same-day exclusions beyond the current tentative assignment
/// apply. The caller supplies the *tentative* daily tracker (this candidate
/// already applied) so HC-2/HC-4/HC-5 reflect state as of right after the
/// current pick.
#[allow(clippy::too_many_arguments)]
pub fn future_slot_has_eligible_candidate(
    pool: &[Recipe],
    future_slot: &crate::model::Slot,
    tentative_daily: &DailyTracker,
    excluded_ingredients: &HashSet<String>,
    max_daily_calories: Option<u32>,
    resolved_uls: &ResolvedUls,
    is_workout_slot: bool,
    previous_day_non_workout: Option<&HashSet<String>>,
) -> bool {
    pool.iter().any(|recipe| {
        let candidate = CandidateRecipe::Base(recipe.clone());
        constraints::check_excluded_ingredient(&candidate, excluded_ingredients).is_ok()
            && constraints::check_uniqueness_per_day(&candidate, tentative_daily).is_ok()
            && constraints::check_cooking_time(&candidate, future_slot).is_ok()
            && constraints::check_calorie_ceiling(&candidate, tentative_daily, max_daily_calories).is_ok()
            && constraints::check_daily_upper_limits(&candidate, tentative_daily, resolved_uls).is_ok()
            && constraints::check_consecutive_non_workout_repetition(
                &candidate,
                is_workout_slot,
                previous_day_non_workout,
            )
            .is_ok()
    })
}
