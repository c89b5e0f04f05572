//! The composite scoring function and tie-break cascade.
//! Pure: reads state, never mutates it, and contains no constraint logic —
//! a candidate reaching this module has already survived every HC/FC check.

use crate::feasibility::PoolMacroBounds;
use crate::model::{
    ActivityContext, CandidateRecipe, DailyTracker, FatRange, NutrientMap, Recipe,
    SatietyRequirement,
};
use std::collections::{HashMap, HashSet};

/// Nudges on a per-meal macro target driven by activity context. Exact
/// magnitudes are this implementation's normative constants, named and
/// regression-tested, not re-derived from anywhere external.
pub const PRE_WORKOUT_PROTEIN_SHIFT: f64 = 0.85;
pub const PRE_WORKOUT_CARB_SHIFT: f64 = 1.20;
pub const POST_WORKOUT_PROTEIN_SHIFT: f64 = 1.25;
pub const POST_WORKOUT_CARB_SHIFT: f64 = 1.30;
pub const HIGH_SATIETY_CALORIE_SHIFT: f64 = 1.15;
pub const HIGH_SATIETY_PROTEIN_SHIFT: f64 = 1.15;
pub const HIGH_SATIETY_FAT_SHIFT: f64 = 1.10;
pub const REASONABLE_COOKING_TIME_MINUTES: f64 = 45.0;

const WEIGHT_NUTRITION: f64 = 40.0 / 110.0;
const WEIGHT_MICRONUTRIENT: f64 = 30.0 / 110.0;
const WEIGHT_SATIETY: f64 = 15.0 / 110.0;
const WEIGHT_BALANCE: f64 = 15.0 / 110.0;
const WEIGHT_SCHEDULE: f64 = 10.0 / 110.0;

/// The per-meal target at a decision point, derived from remaining daily
/// budget divided across remaining slots, then shifted by activity context.
#[derive(Debug, Clone, Copy)]
pub struct PerMealTarget {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_range: FatRange,
}

#[allow(clippy::too_many_arguments)]
pub fn per_meal_target(
    daily_target_calories: f64,
    daily_target_protein: f64,
    daily_target_carbs: f64,
    daily_fat_range: FatRange,
    daily: &DailyTracker,
    slots_left: usize,
    activity: &ActivityContext,
    satiety: SatietyRequirement,
) -> PerMealTarget {
    let divisor = slots_left.max(1) as f64;
    let mut calories = (daily_target_calories - daily.calories_consumed).max(0.0) / divisor;
    let mut protein = (daily_target_protein - daily.protein_consumed).max(0.0) / divisor;
    let carbs_base =
        (daily_target_carbs - daily.carbs_consumed).max(0.0) / divisor;
    let mut carbs = carbs_base;
    let mut fat_min = (daily_fat_range.min_g - daily.fat_consumed).max(0.0) / divisor;
    let mut fat_max = (daily_fat_range.max_g - daily.fat_consumed).max(0.0) / divisor;

    if activity.pre_workout {
        protein *= PRE_WORKOUT_PROTEIN_SHIFT;
        carbs *= PRE_WORKOUT_CARB_SHIFT;
    }
    if activity.post_workout {
        protein *= POST_WORKOUT_PROTEIN_SHIFT;
        carbs *= POST_WORKOUT_CARB_SHIFT;
    }
    if satiety == SatietyRequirement::High {
        calories *= HIGH_SATIETY_CALORIE_SHIFT;
        protein *= HIGH_SATIETY_PROTEIN_SHIFT;
        fat_min *= HIGH_SATIETY_FAT_SHIFT;
        fat_max *= HIGH_SATIETY_FAT_SHIFT;
    }

    PerMealTarget {
        calories,
        protein_g: protein,
        carbs_g: carbs,
        fat_range: FatRange {
            min_g: fat_min,
            max_g: fat_max,
        },
    }
}

/// Pool-wide stats needed by scoring, precomputed once per search and
/// distinct from [`PoolMacroBounds`] (feasibility's interval-arithmetic
/// bounds) because scoring additionally normalizes fiber and calorie
/// density, which feasibility never looks at.
#[derive(Debug, Clone, Copy)]
pub struct ScoringPoolStats {
    pub macro_bounds: PoolMacroBounds,
    pub min_fiber: f64,
    pub max_fiber: f64,
    pub min_density: f64,
    pub max_density: f64,
}

impl ScoringPoolStats {
    pub fn compute(pool: &[Recipe]) -> Self {
        let macro_bounds = PoolMacroBounds::compute(pool);
        let mut min_fiber = f64::MAX;
        let mut max_fiber = f64::MIN;
        let mut min_density = f64::MAX;
        let mut max_density = f64::MIN;
        for recipe in pool {
            let fiber = recipe.nutrition.micronutrients.get("fiber").copied().unwrap_or(0.0);
            min_fiber = min_fiber.min(fiber);
            max_fiber = max_fiber.max(fiber);
            let mass = (recipe.nutrition.protein_g + recipe.nutrition.carbs_g + recipe.nutrition.fat_g).max(1.0);
            let density = recipe.nutrition.calories / mass;
            min_density = min_density.min(density);
            max_density = max_density.max(density);
        }
        if pool.is_empty() {
            min_fiber = 0.0;
            max_fiber = 0.0;
            min_density = 0.0;
            max_density = 0.0;
        }
        ScoringPoolStats {
            macro_bounds,
            min_fiber,
            max_fiber,
            min_density,
            max_density,
        }
    }
}

/// Everything `score_candidate` needs that isn't the candidate itself.
pub struct ScoringContext<'a> {
    pub daily: &'a DailyTracker,
    pub slot_context: &'a crate::model::SlotContext,
    pub target: PerMealTarget,
    pub adjusted_daily_targets: &'a NutrientMap,
    pub carryover_needs: &'a NutrientMap,
    pub micronutrient_targets: &'a HashMap<String, f64>,
    pub liked_foods: &'a HashSet<String>,
    pub pool_stats: &'a ScoringPoolStats,
    pub daily_target_protein: f64,
    pub daily_target_carbs: f64,
    pub daily_target_fat_mid: f64,
    pub slots_total: usize,
}

fn pct_sub_score(actual: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return if actual <= 0.0 { 100.0 } else { 0.0 };
    }
    let deviation = (actual - target).abs() / (0.10 * target);
    (100.0 * (1.0 - deviation)).max(0.0)
}

/// Nutrient names in a fixed, platform-independent order. Float addition is
/// not associative, and `HashMap` iteration order depends on the per-process
/// hasher seed, so summing per-nutrient contributions in `.keys()` order can
/// change the accumulated total by a ULP across runs. Every place that sums
/// across `micronutrient_targets` must walk this order instead.
fn sorted_nutrient_keys(targets: &HashMap<String, f64>) -> Vec<&String> {
    let mut keys: Vec<&String> = targets.keys().collect();
    keys.sort();
    keys
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        return 50.0;
    }
    (100.0 * (value - min) / (max - min)).clamp(0.0, 100.0)
}

fn normalize_to_midrange(value: f64, min: f64, max: f64) -> f64 {
    if (max - min).abs() < f64::EPSILON {
        return 100.0;
    }
    let mid = (min + max) / 2.0;
    let half_range = (max - min) / 2.0;
    (100.0 * (1.0 - (value - mid).abs() / half_range)).clamp(0.0, 100.0)
}

fn nutrition_match(candidate: &CandidateRecipe, target: &PerMealTarget) -> f64 {
    let n = candidate.nutrition();
    let calorie_score = pct_sub_score(n.calories, target.calories);
    let protein_score = pct_sub_score(n.protein_g, target.protein_g);
    let carbs_score = pct_sub_score(n.carbs_g, target.carbs_g);
    let fat_score = pct_sub_score(n.fat_g, target.fat_range.midpoint());
    (calorie_score + protein_score + carbs_score + fat_score) / 4.0
}

fn micronutrient_match(candidate: &CandidateRecipe, ctx: &ScoringContext) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for nutrient in sorted_nutrient_keys(ctx.micronutrient_targets) {
        let adjusted_target = ctx.adjusted_daily_targets.get(nutrient).copied().unwrap_or(0.0);
        let consumed = ctx.daily.micronutrients_consumed.get(nutrient).copied().unwrap_or(0.0);
        let remaining_gap = (adjusted_target - consumed).max(0.0);
        if remaining_gap <= 0.0 {
            continue;
        }
        let contribution = candidate.nutrition().micronutrients.get(nutrient).copied().unwrap_or(0.0);
        let fill_score = (100.0 * contribution / remaining_gap).min(100.0);
        let carryover = ctx.carryover_needs.get(nutrient).copied().unwrap_or(0.0);
        let weight = remaining_gap + carryover;
        weighted_sum += weight * fill_score;
        weight_total += weight;
    }
    if weight_total <= 0.0 {
        100.0
    } else {
        weighted_sum / weight_total
    }
}

fn satiety_match(candidate: &CandidateRecipe, ctx: &ScoringContext) -> f64 {
    let n = candidate.nutrition();
    let stats = ctx.pool_stats;
    match ctx.slot_context.satiety_requirement {
        SatietyRequirement::High => {
            let fiber = n.micronutrients.get("fiber").copied().unwrap_or(0.0);
            let mass = (n.protein_g + n.carbs_g + n.fat_g).max(1.0);
            let density = n.calories / mass;
            let fiber_score = normalize(fiber, stats.min_fiber, stats.max_fiber);
            let protein_score = normalize(n.protein_g, stats.macro_bounds.min_protein, stats.macro_bounds.max_protein);
            let density_score = 100.0 - normalize(density, stats.min_density, stats.max_density);
            let calorie_score = normalize(n.calories, stats.macro_bounds.min_calories, stats.macro_bounds.max_calories);
            (fiber_score + protein_score + density_score + calorie_score) / 4.0
        }
        SatietyRequirement::Moderate => {
            let protein_score = normalize_to_midrange(
                n.protein_g,
                stats.macro_bounds.min_protein,
                stats.macro_bounds.max_protein,
            );
            let fat_score =
                normalize_to_midrange(n.fat_g, stats.macro_bounds.min_fat, stats.macro_bounds.max_fat);
            let carbs_score = normalize_to_midrange(
                n.carbs_g,
                stats.macro_bounds.min_carbs,
                stats.macro_bounds.max_carbs,
            );
            (protein_score + fat_score + carbs_score) / 3.0
        }
    }
}

fn trajectory_correction(candidate: &CandidateRecipe, ctx: &ScoringContext) -> f64 {
    let progress = if ctx.slots_total == 0 {
        0.0
    } else {
        ctx.daily.slots_assigned as f64 / ctx.slots_total as f64
    };
    let n = candidate.nutrition();
    let bounds = &ctx.pool_stats.macro_bounds;

    let score_macro = |consumed: f64, daily_target: f64, value: f64, min: f64, max: f64| -> f64 {
        let expected_so_far = daily_target * progress;
        if expected_so_far <= 0.0 {
            return 50.0;
        }
        let ratio = consumed / expected_so_far;
        let normalized = normalize(value, min, max);
        if ratio < 1.0 {
            normalized
        } else if ratio > 1.0 {
            100.0 - normalized
        } else {
            50.0
        }
    };

    let protein_corr = score_macro(
        ctx.daily.protein_consumed,
        ctx.daily_target_protein,
        n.protein_g,
        bounds.min_protein,
        bounds.max_protein,
    );
    let carbs_corr = score_macro(
        ctx.daily.carbs_consumed,
        ctx.daily_target_carbs,
        n.carbs_g,
        bounds.min_carbs,
        bounds.max_carbs,
    );
    let fat_corr = score_macro(
        ctx.daily.fat_consumed,
        ctx.daily_target_fat_mid,
        n.fat_g,
        bounds.min_fat,
        bounds.max_fat,
    );
    (protein_corr + carbs_corr + fat_corr) / 3.0
}

fn balance_match(candidate: &CandidateRecipe, ctx: &ScoringContext) -> f64 {
    let micro_diversity = {
        let tracked: Vec<&String> = ctx.micronutrient_targets.keys().collect();
        if tracked.is_empty() {
            100.0
        } else {
            let covering_under_represented = tracked
                .iter()
                .filter(|nutrient| {
                    let target = ctx.micronutrient_targets[**nutrient];
                    let consumed = ctx.daily.micronutrients_consumed.get(**nutrient).copied().unwrap_or(0.0);
                    let under_represented = target <= 0.0 || consumed / target < 0.5;
                    let contributes = candidate
                        .nutrition()
                        .micronutrients
                        .get(**nutrient)
                        .copied()
                        .unwrap_or(0.0)
                        > 0.0;
                    under_represented && contributes
                })
                .count();
            100.0 * covering_under_represented as f64 / tracked.len() as f64
        }
    };

    let new_ingredients = candidate
        .ingredients()
        .iter()
        .filter(|i| !i.to_taste)
        .filter(|i| !ctx.daily.ingredient_usage_counts.contains_key(&i.normalized_name))
        .count();
    let total_ingredients = candidate.ingredients().iter().filter(|i| !i.to_taste).count().max(1);
    let novelty = 100.0 * new_ingredients as f64 / total_ingredients as f64;

    let correction = trajectory_correction(candidate, ctx);

    (micro_diversity + novelty + correction) / 3.0
}

fn schedule_match(candidate: &CandidateRecipe, ctx: &ScoringContext) -> f64 {
    let t = candidate.cooking_time_minutes() as f64;
    match ctx.slot_context.cooking_time_max {
        Some(max) if max > 0 => (100.0 - 10.0 * (t / max as f64)).clamp(0.0, 100.0),
        Some(_) => 100.0,
        None => {
            let deviation = (t - REASONABLE_COOKING_TIME_MINUTES).abs() / REASONABLE_COOKING_TIME_MINUTES;
            (100.0 - deviation * 50.0).clamp(0.0, 100.0)
        }
    }
}

/// The composite score in `[0, 100]`.
pub fn score_candidate(candidate: &CandidateRecipe, ctx: &ScoringContext) -> f64 {
    let nutrition = nutrition_match(candidate, &ctx.target);
    let micronutrient = micronutrient_match(candidate, ctx);
    let satiety = satiety_match(candidate, ctx);
    let balance = balance_match(candidate, ctx);
    let schedule = schedule_match(candidate, ctx);

    (WEIGHT_NUTRITION * nutrition
        + WEIGHT_MICRONUTRIENT * micronutrient
        + WEIGHT_SATIETY * satiety
        + WEIGHT_BALANCE * balance
        + WEIGHT_SCHEDULE * schedule)
        .clamp(0.0, 100.0)
}

/// Tie-break inputs for one candidate, computed once per candidate so the
/// cascade never recomputes them during sorting.
#[derive(Debug, Clone)]
struct TieBreak {
    deficient_covered: i64,
    reduction_share: f64,
    liked_matches: i64,
    recipe_id: String,
}

fn tie_break_for(candidate: &CandidateRecipe, ctx: &ScoringContext) -> TieBreak {
    let mut deficient_covered = 0i64;
    let mut reduction_share = 0.0;
    for nutrient in sorted_nutrient_keys(ctx.micronutrient_targets) {
        let adjusted_target = ctx.adjusted_daily_targets.get(nutrient).copied().unwrap_or(0.0);
        let consumed = ctx.daily.micronutrients_consumed.get(nutrient).copied().unwrap_or(0.0);
        let remaining_gap = adjusted_target - consumed;
        if remaining_gap <= 0.0 {
            continue;
        }
        let contribution = candidate.nutrition().micronutrients.get(nutrient).copied().unwrap_or(0.0);
        if contribution > 0.0 {
            deficient_covered += 1;
            reduction_share += contribution / remaining_gap;
        }
    }
    let liked_matches = candidate
        .ingredients()
        .iter()
        .filter(|i| ctx.liked_foods.contains(&i.normalized_name))
        .count() as i64;

    TieBreak {
        deficient_covered,
        reduction_share,
        liked_matches,
        recipe_id: candidate.id().to_string(),
    }
}

fn tie_break_cmp(a: &TieBreak, b: &TieBreak) -> std::cmp::Ordering {
    b.deficient_covered
        .cmp(&a.deficient_covered)
        .then_with(|| b.reduction_share.partial_cmp(&a.reduction_share).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| b.liked_matches.cmp(&a.liked_matches))
        .then_with(|| a.recipe_id.cmp(&b.recipe_id))
}

/// A candidate paired with its composite score, ready for the search's
/// cursor to walk in order.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub candidate: CandidateRecipe,
    pub score: f64,
}

/// Scores every candidate, stable-sorts descending by score, then resolves
/// ties within each exact-score group using the tie-break cascade, without
/// re-sorting the overall order.
pub fn rank_candidates(candidates: Vec<CandidateRecipe>, ctx: &ScoringContext) -> Vec<RankedCandidate> {
    let mut scored: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let score = score_candidate(&candidate, ctx);
            RankedCandidate { candidate, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut start = 0;
    while start < scored.len() {
        let mut end = start + 1;
        while end < scored.len() && scored[end].score == scored[start].score {
            end += 1;
        }
        if end - start > 1 {
            let mut group: Vec<(TieBreak, RankedCandidate)> = scored
                .drain(start..end)
                .map(|rc| (tie_break_for(&rc.candidate, ctx), rc))
                .collect();
            group.sort_by(|a, b| tie_break_cmp(&a.0, &b.0));
            for (i, (_, rc)) in group.into_iter().enumerate() {
                scored.insert(start + i, rc);
            }
        }
        start = end;
    }

    scored
}
