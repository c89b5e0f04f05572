//! The search orchestrator: the only module allowed to
//! compose [`crate::constraints`], [`crate::feasibility`], [`crate::candidates`]
//! and [`crate::scoring`] together and to mutate run state. Everything here
//! is single-threaded, side-effect-free beyond the trackers it owns, and
//! deterministic given identical inputs.

use crate::candidates::{self, GenerationContext, GenerationOutcome};
use crate::config::SolverConfig;
use crate::feasibility::{self, MaxAchievableTable, PoolMacroBounds};
use crate::instrumentation::{InstrumentationSink, RunStats, SearchEvent, StatsCollector};
use crate::model::{
    Assignment, CandidateRecipe, DailyTracker, FatRange, Recipe, ResolvedUls, Slot, UserProfile,
    WeeklyTracker,
};
use crate::scoring::{self, PerMealTarget, ScoringContext, ScoringPoolStats};
use crate::slots;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq)]
pub enum PinnedConflictClassification {
    DirectViolation,
    DownstreamInfeasibility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PinnedConflictReport {
    pub day_index: usize,
    pub slot_index: usize,
    pub recipe_id: String,
    pub classification: PinnedConflictClassification,
    pub remaining_budget_calories_after_pins: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolInsufficiencyReport {
    pub day_index: usize,
    pub slot_index: usize,
    pub eligible_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyInfeasibilityReport {
    pub day_index: usize,
    pub violations: Vec<String>,
    pub closest_plan: Vec<Assignment>,
    pub closest_deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MicronutrientDeficitClassification {
    Marginal,
    Structural,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeficientNutrient {
    pub nutrient: String,
    pub achieved: f64,
    pub target: f64,
    pub classification: MicronutrientDeficitClassification,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyInfeasibilityReport {
    pub deficient_nutrients: Vec<DeficientNutrient>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetExhaustionReport {
    pub attempts: u64,
    pub backtracks: u64,
    pub best_plan: Vec<Assignment>,
    pub best_plan_violations: Vec<String>,
    pub exhaustive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureMode {
    PoolInsufficiency(PoolInsufficiencyReport),
    DailyInfeasibility(DailyInfeasibilityReport),
    PinnedConflict(PinnedConflictReport),
    WeeklyMicronutrientInfeasibility(WeeklyInfeasibilityReport),
    SearchBudgetExhaustion(BudgetExhaustionReport),
}

pub struct SearchResult {
    pub success: bool,
    pub assignments: Vec<Assignment>,
    pub daily_trackers: Vec<DailyTracker>,
    pub weekly_tracker: WeeklyTracker,
    pub sodium_advisory: Option<String>,
    pub failure: Option<FailureMode>,
    pub stats: RunStats,
}

struct CommittedSlot {
    candidate: CandidateRecipe,
    is_workout: bool,
}

struct CachedDecision {
    ranked: Vec<scoring::RankedCandidate>,
    cursor: usize,
}

#[derive(Debug, Clone)]
enum LastTrigger {
    PoolInsufficiency { day_index: usize, slot_index: usize, eligible_count: usize },
    DailyValidationFailure { day_index: usize, violations: Vec<String> },
    WeeklyValidationFailure,
    SelectExhaustion,
}

/// Pre-validation pass (t=0): catches pinned conflicts detectable in
/// isolation, before any search state exists. Pinned pre-validation is
/// fatal before the search starts.
fn prevalidate_pinned(
    profile: &UserProfile,
    pool_by_id: &HashMap<&str, &Recipe>,
    resolved_uls: &ResolvedUls,
    slot_contexts: &[Vec<crate::model::SlotContext>],
) -> Option<PinnedConflictReport> {
    let empty_daily = |slots_total: usize| DailyTracker::new(slots_total);

    for pin in &profile.pinned_assignments {
        let recipe = pool_by_id[pin.recipe_id.as_str()];
        let candidate = CandidateRecipe::Base(recipe.clone());
        let slot = &profile.schedule.days[pin.day_index].slots[pin.slot_index];
        let daily = empty_daily(profile.schedule.days[pin.day_index].slots.len());

        if let Err(v) = candidates::check_pinned_hc(
            &candidate,
            slot,
            &daily,
            profile,
            resolved_uls,
            false,
            None,
        ) {
            use crate::constraints::HardConstraintViolation::*;
            let is_structural = matches!(
                v,
                ExcludedIngredient { .. }
                    | CookingTimeExceeded { .. }
                    | CalorieCeilingExceeded { .. }
                    | DailyUpperLimitExceeded { .. }
            );
            if is_structural {
                return Some(PinnedConflictReport {
                    day_index: pin.day_index,
                    slot_index: pin.slot_index,
                    recipe_id: pin.recipe_id.clone(),
                    classification: PinnedConflictClassification::DirectViolation,
                    remaining_budget_calories_after_pins: profile.daily_calories as f64
                        - recipe.nutrition.calories,
                    reason: format!("{v:?}"),
                });
            }
        }
    }

    for day_index in 0..profile.schedule.days.len() {
        let mut seen: HashSet<&str> = HashSet::new();
        for pin in profile
            .pinned_assignments
            .iter()
            .filter(|p| p.day_index == day_index)
        {
            if !seen.insert(pin.recipe_id.as_str()) {
                let recipe = pool_by_id[pin.recipe_id.as_str()];
                return Some(PinnedConflictReport {
                    day_index,
                    slot_index: pin.slot_index,
                    recipe_id: pin.recipe_id.clone(),
                    classification: PinnedConflictClassification::DirectViolation,
                    remaining_budget_calories_after_pins: profile.daily_calories as f64
                        - recipe.nutrition.calories,
                    reason: "duplicate pinned recipe id within the same day (HC-2)".to_string(),
                });
            }
        }
    }

    for pin in &profile.pinned_assignments {
        let Some(next_day_pins): Option<Vec<_>> = profile
            .schedule
            .days
            .get(pin.day_index + 1)
            .map(|_| {
                profile
                    .pinned_assignments
                    .iter()
                    .filter(|p| p.day_index == pin.day_index + 1)
                    .collect()
            })
        else {
            continue;
        };
        let this_is_workout = slot_contexts[pin.day_index][pin.slot_index].is_workout_slot();
        if this_is_workout {
            continue;
        }
        for next_pin in next_day_pins {
            let next_is_workout = slot_contexts[next_pin.day_index][next_pin.slot_index].is_workout_slot();
            if !next_is_workout && next_pin.recipe_id == pin.recipe_id {
                return Some(PinnedConflictReport {
                    day_index: next_pin.day_index,
                    slot_index: next_pin.slot_index,
                    recipe_id: next_pin.recipe_id.clone(),
                    classification: PinnedConflictClassification::DirectViolation,
                    remaining_budget_calories_after_pins: 0.0,
                    reason: "pinned recipe repeats in a non-workout slot on the following day (HC-8)"
                        .to_string(),
                });
            }
        }
    }

    None
}

fn total_normalized_deviation(
    daily: &DailyTracker,
    target_calories: f64,
    target_protein: f64,
    target_carbs: f64,
    fat_range: FatRange,
) -> f64 {
    let dev = |actual: f64, target: f64| if target > 0.0 { (actual - target).abs() / target } else { 0.0 };
    let fat_dev = if daily.fat_consumed < fat_range.min_g {
        (fat_range.min_g - daily.fat_consumed) / fat_range.min_g.max(1.0)
    } else if daily.fat_consumed > fat_range.max_g {
        (daily.fat_consumed - fat_range.max_g) / fat_range.max_g.max(1.0)
    } else {
        0.0
    };
    dev(daily.calories_consumed, target_calories)
        + dev(daily.protein_consumed, target_protein)
        + dev(daily.carbs_consumed, target_carbs)
        + fat_dev
}

fn validate_day(
    daily: &DailyTracker,
    profile: &UserProfile,
    resolved_uls: &ResolvedUls,
) -> Vec<String> {
    let mut violations = Vec::new();
    let target_calories = profile.daily_calories as f64;
    let within_10pct = |actual: f64, target: f64| target <= 0.0 || (actual - target).abs() <= 0.10 * target;

    if !within_10pct(daily.calories_consumed, target_calories) {
        violations.push(format!(
            "calories {} not within +/-10% of {target_calories}",
            daily.calories_consumed
        ));
    }
    if !within_10pct(daily.protein_consumed, profile.daily_protein_g) {
        violations.push(format!(
            "protein {} not within +/-10% of {}",
            daily.protein_consumed, profile.daily_protein_g
        ));
    }
    if !within_10pct(daily.carbs_consumed, profile.daily_carbs_g) {
        violations.push(format!(
            "carbs {} not within +/-10% of {}",
            daily.carbs_consumed, profile.daily_carbs_g
        ));
    }
    if daily.fat_consumed < profile.daily_fat_g.min_g || daily.fat_consumed > profile.daily_fat_g.max_g {
        violations.push(format!(
            "fat {} outside range [{}, {}]",
            daily.fat_consumed, profile.daily_fat_g.min_g, profile.daily_fat_g.max_g
        ));
    }
    if let Some(ceiling) = profile.max_daily_calories {
        if daily.calories_consumed > ceiling as f64 {
            violations.push(format!("calories {} exceed max_daily_calories {ceiling}", daily.calories_consumed));
        }
    }
    for (nutrient, limit) in resolved_uls {
        let consumed = daily.micronutrients_consumed.get(nutrient).copied().unwrap_or(0.0);
        if consumed > *limit {
            violations.push(format!("{nutrient} {consumed} exceeds UL {limit}"));
        }
    }
    violations
}

fn classify_weekly_deficit(
    nutrient: &str,
    achieved: f64,
    target_total: f64,
    schedule: &crate::model::Schedule,
    max_achievable: &MaxAchievableTable,
) -> MicronutrientDeficitClassification {
    let best_possible: f64 = schedule
        .days
        .iter()
        .map(|day| max_achievable.get(nutrient, day.slots.len()))
        .sum();
    if best_possible < target_total {
        MicronutrientDeficitClassification::Structural
    } else {
        let gap_ratio = if target_total > 0.0 {
            (target_total - achieved) / target_total
        } else {
            0.0
        };
        if gap_ratio <= 0.10 {
            MicronutrientDeficitClassification::Marginal
        } else {
            MicronutrientDeficitClassification::Structural
        }
    }
}

/// Runs the full search over `profile`/`pool`/`days`.
pub fn run(
    profile: &UserProfile,
    pool: &[Recipe],
    days: usize,
    resolved_uls: &ResolvedUls,
    config: &SolverConfig,
    sink: &mut dyn InstrumentationSink,
) -> SearchResult {
    let pool_by_id: HashMap<&str, &Recipe> = pool.iter().map(|r| (r.id.as_str(), r)).collect();
    let slot_contexts = slots::derive_slot_contexts(&profile.schedule, &profile.activity_schedule);

    if let Some(report) = prevalidate_pinned(profile, &pool_by_id, resolved_uls, &slot_contexts) {
        return SearchResult {
            success: false,
            assignments: vec![],
            daily_trackers: profile
                .schedule
                .days
                .iter()
                .map(|d| DailyTracker::new(d.slots.len()))
                .collect(),
            weekly_tracker: WeeklyTracker::new(days),
            sodium_advisory: None,
            failure: Some(FailureMode::PinnedConflict(report)),
            stats: RunStats::default(),
        };
    }

    let bounds = PoolMacroBounds::compute(pool);
    let pool_stats = ScoringPoolStats::compute(pool);
    let nutrient_names: HashSet<String> = profile.micronutrient_targets.keys().cloned().collect();
    let slot_counts: HashSet<usize> = profile.schedule.days.iter().map(|d| d.slots.len()).collect();
    let max_achievable = MaxAchievableTable::compute(pool, &nutrient_names, &slot_counts);

    let decision_points: Vec<(usize, usize)> = profile
        .schedule
        .days
        .iter()
        .enumerate()
        .flat_map(|(d, day)| (0..day.slots.len()).map(move |s| (d, s)))
        .collect();
    let mut day_end = vec![0usize; days];
    {
        let mut idx = 0;
        for (d, day) in profile.schedule.days.iter().enumerate() {
            idx += day.slots.len();
            day_end[d] = idx;
        }
    }

    let mut daily_trackers: Vec<DailyTracker> = profile
        .schedule
        .days
        .iter()
        .map(|d| DailyTracker::new(d.slots.len()))
        .collect();
    let mut weekly = WeeklyTracker::new(days);
    let mut caches: Vec<Option<CachedDecision>> = (0..decision_points.len()).map(|_| None).collect();
    let mut committed: Vec<Option<CommittedSlot>> = (0..decision_points.len()).map(|_| None).collect();

    let mut collector = StatsCollector::default();
    let start = Instant::now();
    let mut last_trigger = LastTrigger::SelectExhaustion;
    let mut best_snapshot: Option<(Vec<Assignment>, f64, Vec<String>)> = None;

    let build_assignments = |committed: &[Option<CommittedSlot>]| -> Vec<Assignment> {
        committed
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| {
                let (d, s) = decision_points[idx];
                if let Some(pin) = profile.pinned_at(d, s) {
                    return Some(Assignment {
                        day_index: d,
                        slot_index: s,
                        recipe_id: pin.to_string(),
                        variant_index: None,
                    });
                }
                c.as_ref().map(|c| Assignment {
                    day_index: d,
                    slot_index: s,
                    recipe_id: c.candidate.id().to_string(),
                    variant_index: c.candidate.variant_index(),
                })
            })
            .collect()
    };

    let mut i = 0usize;

    loop {
        let budget_hit = config
            .budget
            .max_assignment_attempts
            .is_some_and(|m| collector.stats.total_attempts >= m)
            || config.budget.max_backtracks.is_some_and(|m| collector.stats.total_backtracks >= m)
            || config
                .budget
                .max_wall_time_ms
                .is_some_and(|m| start.elapsed() >= Duration::from_millis(m));

        if budget_hit {
            let (best_plan, violations) = best_snapshot
                .clone()
                .map(|(plan, _, v)| (plan, v))
                .unwrap_or_else(|| (build_assignments(&committed), vec![]));
            return SearchResult {
                success: false,
                assignments: vec![],
                daily_trackers,
                weekly_tracker: weekly,
                sodium_advisory: None,
                failure: Some(FailureMode::SearchBudgetExhaustion(BudgetExhaustionReport {
                    attempts: collector.stats.total_attempts,
                    backtracks: collector.stats.total_backtracks,
                    best_plan,
                    best_plan_violations: violations,
                    exhaustive: false,
                })),
                stats: collector.stats,
            };
        }

        let (d, s) = decision_points[i];
        let day = &profile.schedule.days[d];
        let slot: &Slot = &day.slots[s];
        let sc = slot_contexts[d][s];
        let is_workout = sc.is_workout_slot();
        let is_last_slot_of_day = i + 1 == day_end[d];
        trace!(day_index = d, slot_index = s, depth = i, "entering decision point");

        if let Some(pinned_id) = profile.pinned_at(d, s) {
            let recipe = pool_by_id[pinned_id];
            let candidate = CandidateRecipe::Base(recipe.clone());
            let prev_non_workout = if d > 0 {
                Some(&daily_trackers[d - 1].non_workout_recipe_ids)
            } else {
                None
            };
            if let Err(v) = crate::constraints::evaluate_all(
                &candidate,
                slot,
                &daily_trackers[d],
                profile,
                resolved_uls,
                is_workout,
                prev_non_workout,
            ) {
                return SearchResult {
                    success: false,
                    assignments: vec![],
                    daily_trackers,
                    weekly_tracker: weekly,
                    sodium_advisory: None,
                    failure: Some(FailureMode::PinnedConflict(PinnedConflictReport {
                        day_index: d,
                        slot_index: s,
                        recipe_id: pinned_id.to_string(),
                        classification: PinnedConflictClassification::DownstreamInfeasibility,
                        remaining_budget_calories_after_pins: profile.daily_calories as f64
                            - daily_trackers[d].calories_consumed,
                        reason: format!("{v:?}"),
                    })),
                    stats: collector.stats,
                };
            }
            debug!(day_index = d, slot_index = s, recipe_id = pinned_id, "assigning pinned slot");
            daily_trackers[d].apply(&candidate, is_workout);
            committed[i] = Some(CommittedSlot { candidate, is_workout });
            let event = SearchEvent::AssignmentAttempt { day_index: d, slot_index: s, depth: i };
            collector.record(event);
            sink.record(event);
        } else {
            if caches[i].is_none() {
                let prev_non_workout = if d > 0 {
                    Some(&daily_trackers[d - 1].non_workout_recipe_ids)
                } else {
                    None
                };
                let slots_remaining_after = day.slots.len() - daily_trackers[d].slots_assigned - 1;
                let remaining_same_day: Vec<(usize, Slot)> =
                    ((s + 1)..day.slots.len()).map(|s2| (s2, day.slots[s2].clone())).collect();

                let gen_ctx = GenerationContext {
                    profile,
                    daily: &daily_trackers[d],
                    resolved_uls,
                    bounds: &bounds,
                    target_daily_calories: profile.daily_calories as f64,
                    target_protein: profile.daily_protein_g,
                    target_carbs: profile.daily_carbs_g,
                    fat_range: profile.daily_fat_g,
                    is_workout_slot: is_workout,
                    is_sedentary_slot: sc.activity_context.sedentary,
                    previous_day_non_workout: prev_non_workout,
                    slots_remaining_after,
                    remaining_same_day_slots: &remaining_same_day,
                    downscaling: config.downscaling,
                };

                let outcome = candidates::generate_candidates(pool, slot, &gen_ctx);
                match outcome {
                    GenerationOutcome::Candidates(cands) => {
                        let slots_left = day.slots.len() - daily_trackers[d].slots_assigned;
                        let target: PerMealTarget = scoring::per_meal_target(
                            profile.daily_calories as f64,
                            profile.daily_protein_g,
                            profile.daily_carbs_g,
                            profile.daily_fat_g,
                            &daily_trackers[d],
                            slots_left,
                            &sc.activity_context,
                            sc.satiety_requirement,
                        );
                        let adjusted = weekly.adjusted_daily_targets(&profile.micronutrient_targets, days - d);
                        let carryover = weekly.carryover_needs(&profile.micronutrient_targets);
                        let scoring_ctx = ScoringContext {
                            daily: &daily_trackers[d],
                            slot_context: &sc,
                            target,
                            adjusted_daily_targets: &adjusted,
                            carryover_needs: &carryover,
                            micronutrient_targets: &profile.micronutrient_targets,
                            liked_foods: &profile.liked_foods,
                            pool_stats: &pool_stats,
                            daily_target_protein: profile.daily_protein_g,
                            daily_target_carbs: profile.daily_carbs_g,
                            daily_target_fat_mid: profile.daily_fat_g.midpoint(),
                            slots_total: day.slots.len(),
                        };
                        let ranked = scoring::rank_candidates(cands, &scoring_ctx);
                        caches[i] = Some(CachedDecision { ranked, cursor: 0 });
                    }
                    GenerationOutcome::EmptyAfterFiltering => {
                        last_trigger = LastTrigger::PoolInsufficiency {
                            day_index: d,
                            slot_index: s,
                            eligible_count: 0,
                        };
                        caches[i] = Some(CachedDecision { ranked: vec![], cursor: 0 });
                    }
                    GenerationOutcome::FutureSlotUnreachable { slot_index } => {
                        last_trigger = LastTrigger::PoolInsufficiency {
                            day_index: d,
                            slot_index,
                            eligible_count: 0,
                        };
                        caches[i] = Some(CachedDecision { ranked: vec![], cursor: 0 });
                    }
                }
            }

            let cache = caches[i].as_ref().unwrap();
            if cache.cursor < cache.ranked.len() {
                let chosen = cache.ranked[cache.cursor].candidate.clone();
                debug!(
                    day_index = d,
                    slot_index = s,
                    recipe_id = chosen.id(),
                    cursor = cache.cursor,
                    "selected candidate"
                );
                daily_trackers[d].apply(&chosen, is_workout);
                committed[i] = Some(CommittedSlot { candidate: chosen, is_workout });
                let event = SearchEvent::AssignmentAttempt { day_index: d, slot_index: s, depth: i };
                collector.record(event);
                sink.record(event);
            } else {
                trace!(day_index = d, slot_index = s, "candidate cursor exhausted");
                last_trigger = LastTrigger::SelectExhaustion;
                match backtrack(
                    i,
                    &decision_points,
                    &mut caches,
                    &mut committed,
                    &mut daily_trackers,
                    &mut weekly,
                    profile,
                    &mut collector,
                    sink,
                ) {
                    Some(target) => {
                        i = target;
                        continue;
                    }
                    None => {
                        return build_final_failure(
                            profile,
                            pool,
                            days,
                            resolved_uls,
                            &last_trigger,
                            daily_trackers,
                            weekly,
                            collector,
                            best_snapshot,
                            &max_achievable,
                        );
                    }
                }
            }
        }

        if !is_last_slot_of_day {
            i += 1;
            continue;
        }

        let violations = validate_day(&daily_trackers[d], profile, resolved_uls);
        if !violations.is_empty() {
            debug!(day_index = d, violations = ?violations, "daily validation failed");
            let deviation = total_normalized_deviation(
                &daily_trackers[d],
                profile.daily_calories as f64,
                profile.daily_protein_g,
                profile.daily_carbs_g,
                profile.daily_fat_g,
            );
            if best_snapshot
                .as_ref()
                .map_or(true, |(_, best_dev, _)| deviation < *best_dev)
            {
                best_snapshot = Some((build_assignments(&committed), deviation, violations.clone()));
            }
            last_trigger = LastTrigger::DailyValidationFailure { day_index: d, violations };
            match backtrack(
                i,
                &decision_points,
                &mut caches,
                &mut committed,
                &mut daily_trackers,
                &mut weekly,
                profile,
                &mut collector,
                sink,
            ) {
                Some(target) => {
                    i = target;
                    continue;
                }
                None => {
                    return build_final_failure(
                        profile,
                        pool,
                        days,
                        resolved_uls,
                        &last_trigger,
                        daily_trackers,
                        weekly,
                        collector,
                        best_snapshot,
                        &max_achievable,
                    );
                }
            }
        }

        weekly.commit_day(&daily_trackers[d]);
        let day_event = SearchEvent::DayCompleted { day_index: d, elapsed: start.elapsed() };
        collector.record(day_event);
        sink.record(day_event);
        debug!(day_index = d, days_completed = weekly.days_completed, "daily validation passed");

        if d + 1 == days {
            // TC-4: a single-day run skips weekly micronutrient validation entirely.
            let deficient: Vec<(String, f64, f64)> = if days > 1 {
                profile
                    .micronutrient_targets
                    .iter()
                    .filter_map(|(n, rdi)| {
                        let achieved = weekly.weekly_totals.get(n).copied().unwrap_or(0.0);
                        let target_total = rdi * days as f64;
                        if achieved + 1e-9 < target_total {
                            Some((n.clone(), achieved, target_total))
                        } else {
                            None
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            };

            if deficient.is_empty() {
                debug!("weekly validation passed");
                let sodium_advisory = profile.micronutrient_targets.get("sodium").and_then(|rdi| {
                    let total = weekly.weekly_totals.get("sodium").copied().unwrap_or(0.0);
                    if total > 2.0 * rdi * days as f64 {
                        Some(format!(
                            "sodium total {total} exceeds twice the prorated weekly RDI {}",
                            2.0 * rdi * days as f64
                        ))
                    } else {
                        None
                    }
                });
                return SearchResult {
                    success: true,
                    assignments: build_assignments(&committed),
                    daily_trackers,
                    weekly_tracker: weekly,
                    sodium_advisory,
                    failure: None,
                    stats: collector.stats,
                };
            }

            debug!(deficient = ?deficient.iter().map(|(n, ..)| n.clone()).collect::<Vec<_>>(), "weekly validation failed");
            last_trigger = LastTrigger::WeeklyValidationFailure;
            match backtrack(
                i,
                &decision_points,
                &mut caches,
                &mut committed,
                &mut daily_trackers,
                &mut weekly,
                profile,
                &mut collector,
                sink,
            ) {
                Some(target) => {
                    i = target;
                    continue;
                }
                None => {
                    return build_final_failure(
                        profile,
                        pool,
                        days,
                        resolved_uls,
                        &last_trigger,
                        daily_trackers,
                        weekly,
                        collector,
                        best_snapshot,
                        &max_achievable,
                    );
                }
            }
        } else {
            let slots_on_next_day = profile.schedule.days[d + 1].slots.len();
            let deficient = feasibility::check_weekly_micronutrient_feasibility(
                &weekly,
                &profile.micronutrient_targets,
                days,
                slots_on_next_day,
                &max_achievable,
            );
            if deficient.is_empty() {
                trace!(day_index = d, "fc4 check passed");
                i += 1;
                continue;
            }

            debug!(day_index = d, deficient = ?deficient, "fc4 check failed");
            last_trigger = LastTrigger::WeeklyValidationFailure;
            match backtrack(
                i,
                &decision_points,
                &mut caches,
                &mut committed,
                &mut daily_trackers,
                &mut weekly,
                profile,
                &mut collector,
                sink,
            ) {
                Some(target) => {
                    i = target;
                    continue;
                }
                None => {
                    return build_final_failure(
                        profile,
                        pool,
                        days,
                        resolved_uls,
                        &last_trigger,
                        daily_trackers,
                        weekly,
                        collector,
                        best_snapshot,
                        &max_achievable,
                    );
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn backtrack(
    originating: usize,
    decision_points: &[(usize, usize)],
    caches: &mut [Option<CachedDecision>],
    committed: &mut [Option<CommittedSlot>],
    daily_trackers: &mut [DailyTracker],
    weekly: &mut WeeklyTracker,
    profile: &UserProfile,
    collector: &mut StatsCollector,
    sink: &mut dyn InstrumentationSink,
) -> Option<usize> {
    let mut target = None;
    let mut probe = originating as isize;
    while probe >= 0 {
        let p = probe as usize;
        let (d, s) = decision_points[p];
        if profile.pinned_at(d, s).is_none() {
            if let (Some(committed_slot), Some(cache)) = (&committed[p], &caches[p]) {
                let _ = committed_slot;
                if cache.cursor + 1 < cache.ranked.len() {
                    target = Some(p);
                    break;
                }
            }
        }
        probe -= 1;
    }

    let target = target?;
    let (target_day, _) = decision_points[target];

    while weekly.days_completed > target_day {
        let completed_day = weekly.days_completed - 1;
        weekly.decommit_day(&daily_trackers[completed_day]);
    }

    for idx in (target + 1..=originating).rev() {
        let (d, s) = decision_points[idx];
        if profile.pinned_at(d, s).is_some() {
            continue;
        }
        if let Some(info) = committed[idx].take() {
            daily_trackers[d].undo(&info.candidate, info.is_workout);
        }
        caches[idx] = None;
    }

    let (d, s) = decision_points[target];
    let info = committed[target].take().expect("target must be committed");
    daily_trackers[d].undo(&info.candidate, info.is_workout);
    if let Some(cache) = caches[target].as_mut() {
        cache.cursor += 1;
    }

    let backtrack_event = SearchEvent::Backtrack {
        from_day: decision_points[originating].0,
        from_slot: decision_points[originating].1,
        to_day: d,
        to_slot: s,
    };
    collector.record(backtrack_event);
    sink.record(backtrack_event);

    Some(target)
}

#[allow(clippy::too_many_arguments)]
fn build_final_failure(
    profile: &UserProfile,
    _pool: &[Recipe],
    days: usize,
    _resolved_uls: &ResolvedUls,
    last_trigger: &LastTrigger,
    daily_trackers: Vec<DailyTracker>,
    weekly: WeeklyTracker,
    collector: StatsCollector,
    best_snapshot: Option<(Vec<Assignment>, f64, Vec<String>)>,
    max_achievable: &MaxAchievableTable,
) -> SearchResult {
    let failure = match last_trigger {
        LastTrigger::PoolInsufficiency { day_index, slot_index, eligible_count } => {
            FailureMode::PoolInsufficiency(PoolInsufficiencyReport {
                day_index: *day_index,
                slot_index: *slot_index,
                eligible_count: *eligible_count,
            })
        }
        LastTrigger::DailyValidationFailure { day_index, violations } => {
            let (plan, deviation, _) = best_snapshot.clone().unwrap_or((vec![], 0.0, violations.clone()));
            FailureMode::DailyInfeasibility(DailyInfeasibilityReport {
                day_index: *day_index,
                violations: violations.clone(),
                closest_plan: plan,
                closest_deviation: deviation,
            })
        }
        LastTrigger::WeeklyValidationFailure => {
            let deficient_nutrients = profile
                .micronutrient_targets
                .iter()
                .filter_map(|(n, rdi)| {
                    let achieved = weekly.weekly_totals.get(n).copied().unwrap_or(0.0);
                    let target_total = rdi * days as f64;
                    if achieved + 1e-9 < target_total {
                        Some(DeficientNutrient {
                            nutrient: n.clone(),
                            achieved,
                            target: target_total,
                            classification: classify_weekly_deficit(
                                n,
                                achieved,
                                target_total,
                                &profile.schedule,
                                max_achievable,
                            ),
                        })
                    } else {
                        None
                    }
                })
                .collect();
            FailureMode::WeeklyMicronutrientInfeasibility(WeeklyInfeasibilityReport { deficient_nutrients })
        }
        LastTrigger::SelectExhaustion => FailureMode::PoolInsufficiency(PoolInsufficiencyReport {
            day_index: 0,
            slot_index: 0,
            eligible_count: 0,
        }),
    };

    SearchResult {
        success: false,
        assignments: vec![],
        daily_trackers,
        weekly_tracker: weekly,
        sodium_advisory: None,
        failure: Some(failure),
        stats: collector.stats,
    }
}
