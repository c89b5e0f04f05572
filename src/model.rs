//! Data model: immutable inputs (recipe pool, user profile, schedule) and the
//! mutable state the search orchestrator carries across a run (daily
//! trackers, the weekly tracker, the assignment sequence).
//!
//! Mirrors the split this codebase draws elsewhere between long-lived
//! reference data (`RecipeForPlanning`, `UserPreferences` in the teacher
//! crate) and short-lived run state (`RotationState`): everything in this
//! module that is `Clone` but never mutated in place is an input; everything
//! with `apply_*`/`undo_*` methods is run state.

use crate::error::SolveError;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A nutrient name (e.g. `"sodium"`, `"vitamin_d"`) to a per-unit quantity.
/// Free-form rather than an enum so a collaborator can track whatever
/// micronutrients its ingredient database supports without a crate release.
pub type NutrientMap = HashMap<String, f64>;

/// Precomputed nutrition for a recipe, a scaled variant, or a running total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    #[serde(default)]
    pub micronutrients: NutrientMap,
}

impl Nutrition {
    pub fn zero() -> Self {
        Nutrition {
            calories: 0.0,
            protein_g: 0.0,
            fat_g: 0.0,
            carbs_g: 0.0,
            micronutrients: NutrientMap::new(),
        }
    }

    pub fn add(&self, other: &Nutrition) -> Nutrition {
        let mut micronutrients = self.micronutrients.clone();
        for (k, v) in &other.micronutrients {
            *micronutrients.entry(k.clone()).or_insert(0.0) += v;
        }
        Nutrition {
            calories: self.calories + other.calories,
            protein_g: self.protein_g + other.protein_g,
            fat_g: self.fat_g + other.fat_g,
            carbs_g: self.carbs_g + other.carbs_g,
            micronutrients,
        }
    }

    pub fn subtract(&self, other: &Nutrition) -> Nutrition {
        let mut micronutrients = self.micronutrients.clone();
        for (k, v) in &other.micronutrients {
            *micronutrients.entry(k.clone()).or_insert(0.0) -= v;
        }
        Nutrition {
            calories: self.calories - other.calories,
            protein_g: self.protein_g - other.protein_g,
            fat_g: self.fat_g - other.fat_g,
            carbs_g: self.carbs_g - other.carbs_g,
            micronutrients,
        }
    }

    pub fn scaled(&self, factor: f64) -> Nutrition {
        Nutrition {
            calories: self.calories * factor,
            protein_g: self.protein_g * factor,
            fat_g: self.fat_g * factor,
            carbs_g: self.carbs_g * factor,
            micronutrients: self
                .micronutrients
                .iter()
                .map(|(k, v)| (k.clone(), v * factor))
                .collect(),
        }
    }
}

/// One ingredient line on a recipe. "To taste" items carry zero nutritional
/// weight but still participate in `excluded_ingredients` matching (HC-1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub normalized_name: String,
    #[serde(default)]
    pub to_taste: bool,
}

/// The ingredient a carb-downscaling variant scales down, and what it
/// contributes to the recipe's base nutrition at `quantity_g`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryCarbContribution {
    pub quantity_g: f64,
    pub contribution: Nutrition,
}

/// An immutable recipe with precomputed nutrition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub ingredients: Vec<Ingredient>,
    pub cooking_time_minutes: u32,
    pub nutrition: Nutrition,
    #[serde(default)]
    pub primary_carb_contribution: Option<PrimaryCarbContribution>,
}

impl Recipe {
    pub fn contains_excluded(&self, excluded: &HashSet<String>) -> bool {
        self.ingredients
            .iter()
            .any(|i| excluded.contains(&i.normalized_name))
    }
}

/// A recipe as considered by a decision point: either the recipe itself, or
/// a carb-downscaled variant of it. Both share the parent recipe's id for
/// HC-2/HC-8 exclusion purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateRecipe {
    Base(Recipe),
    Variant {
        parent: Recipe,
        variant_index: u32,
        scaled_quantity_g: f64,
        nutrition: Nutrition,
    },
}

impl CandidateRecipe {
    pub fn id(&self) -> &str {
        match self {
            CandidateRecipe::Base(r) => &r.id,
            CandidateRecipe::Variant { parent, .. } => &parent.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CandidateRecipe::Base(r) => &r.name,
            CandidateRecipe::Variant { parent, .. } => &parent.name,
        }
    }

    pub fn nutrition(&self) -> &Nutrition {
        match self {
            CandidateRecipe::Base(r) => &r.nutrition,
            CandidateRecipe::Variant { nutrition, .. } => nutrition,
        }
    }

    pub fn cooking_time_minutes(&self) -> u32 {
        match self {
            CandidateRecipe::Base(r) => r.cooking_time_minutes,
            CandidateRecipe::Variant { parent, .. } => parent.cooking_time_minutes,
        }
    }

    pub fn ingredients(&self) -> &[Ingredient] {
        match self {
            CandidateRecipe::Base(r) => &r.ingredients,
            CandidateRecipe::Variant { parent, .. } => &parent.ingredients,
        }
    }

    pub fn variant_index(&self) -> Option<u32> {
        match self {
            CandidateRecipe::Base(_) => None,
            CandidateRecipe::Variant { variant_index, .. } => Some(*variant_index),
        }
    }

    pub fn parent_recipe(&self) -> &Recipe {
        match self {
            CandidateRecipe::Base(r) => r,
            CandidateRecipe::Variant { parent, .. } => parent,
        }
    }
}

/// A single meal slot within a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub time: NaiveTime,
    /// 1 (most constrained) .. 4 (unbounded cooking time).
    pub busyness: u8,
    pub meal_type: String,
}

impl Slot {
    pub fn cooking_time_max(&self) -> Option<u32> {
        match self.busyness {
            1 => Some(5),
            2 => Some(15),
            3 => Some(30),
            _ => None,
        }
    }
}

/// One day's ordered slots (1..=8 entries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub slots: Vec<Slot>,
}

/// The full multi-day schedule, 1..=7 days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub days: Vec<Day>,
}

impl Schedule {
    pub fn day_count(&self) -> usize {
        self.days.len()
    }
}

/// A single workout within a day's activity schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutEntry {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// One day's worth of activity entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayActivity {
    pub workouts: Vec<WorkoutEntry>,
}

/// Which activity-context flags apply to a slot. Multiple flags may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityContext {
    pub pre_workout: bool,
    pub post_workout: bool,
    pub sedentary: bool,
    pub overnight_fast_ahead: bool,
}

impl ActivityContext {
    pub fn is_workout_slot(&self) -> bool {
        self.pre_workout || self.post_workout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SatietyRequirement {
    High,
    Moderate,
}

/// Derived, once-per-slot attributes computed at plan start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotContext {
    pub activity_context: ActivityContext,
    pub cooking_time_max: Option<u32>,
    pub satiety_requirement: SatietyRequirement,
}

impl SlotContext {
    pub fn is_workout_slot(&self) -> bool {
        self.activity_context.is_workout_slot()
    }
}

/// Inclusive fat range in grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatRange {
    pub min_g: f64,
    pub max_g: f64,
}

impl FatRange {
    pub fn midpoint(&self) -> f64 {
        (self.min_g + self.max_g) / 2.0
    }
}

/// A user-specified mandatory assignment, immune to backtracking (HC-6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedAssignment {
    pub day_index: usize,
    pub slot_index: usize,
    pub recipe_id: String,
}

/// Immutable per-run user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub daily_calories: u32,
    pub daily_protein_g: f64,
    pub daily_fat_g: FatRange,
    pub daily_carbs_g: f64,
    #[serde(default)]
    pub max_daily_calories: Option<u32>,
    pub schedule: Schedule,
    #[serde(default)]
    pub excluded_ingredients: HashSet<String>,
    #[serde(default)]
    pub liked_foods: HashSet<String>,
    pub demographic: String,
    #[serde(default)]
    pub upper_limits_overrides: HashMap<String, f64>,
    #[serde(default)]
    pub pinned_assignments: Vec<PinnedAssignment>,
    #[serde(default)]
    pub micronutrient_targets: HashMap<String, f64>,
    #[serde(default)]
    pub activity_schedule: Vec<DayActivity>,
}

impl UserProfile {
    pub fn pinned_at(&self, day_index: usize, slot_index: usize) -> Option<&str> {
        self.pinned_assignments
            .iter()
            .find(|p| p.day_index == day_index && p.slot_index == slot_index)
            .map(|p| p.recipe_id.as_str())
    }

    pub fn validate_shape(&self, days: usize) -> Result<(), SolveError> {
        if !(1..=7).contains(&days) {
            return Err(SolveError::InvalidDayCount(days));
        }
        if self.schedule.day_count() != days {
            return Err(SolveError::ScheduleDayMismatch {
                schedule_days: self.schedule.day_count(),
                days,
            });
        }
        for (day_index, day) in self.schedule.days.iter().enumerate() {
            if !(1..=8).contains(&day.slots.len()) {
                return Err(SolveError::InvalidSlotCount {
                    day_index,
                    slot_count: day.slots.len(),
                });
            }
            for slot in &day.slots {
                if !(1..=4).contains(&slot.busyness) {
                    return Err(SolveError::InvalidBusyness(slot.busyness));
                }
            }
        }
        for pin in &self.pinned_assignments {
            let Some(day) = self.schedule.days.get(pin.day_index) else {
                return Err(SolveError::PinnedOutOfRange {
                    day_index: pin.day_index,
                    slot_index: pin.slot_index,
                });
            };
            if day.slots.get(pin.slot_index).is_none() {
                return Err(SolveError::PinnedOutOfRange {
                    day_index: pin.day_index,
                    slot_index: pin.slot_index,
                });
            }
        }
        Ok(())
    }
}

/// nutrient -> daily upper limit; a nutrient absent from this map has no UL
/// (modeled here as key absence rather than an explicit `Option` so JSON
/// transport stays a plain object).
pub type ResolvedUls = HashMap<String, f64>;

/// One committed `(day, slot) -> recipe` decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub day_index: usize,
    pub slot_index: usize,
    pub recipe_id: String,
    #[serde(default)]
    pub variant_index: Option<u32>,
}

/// Running totals for one day's worth of committed assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTracker {
    pub calories_consumed: f64,
    pub protein_consumed: f64,
    pub fat_consumed: f64,
    pub carbs_consumed: f64,
    pub micronutrients_consumed: NutrientMap,
    pub used_recipe_ids: HashSet<String>,
    pub non_workout_recipe_ids: HashSet<String>,
    /// How many of today's committed recipes (so far) use each ingredient,
    /// by normalized name. Feeds [`crate::scoring`]'s balance component
    /// ("diverse fat sources"); a count rather than a set so an ingredient
    /// shared by two recipes in the same day survives a single undo.
    pub ingredient_usage_counts: HashMap<String, u32>,
    pub slots_assigned: usize,
    pub slots_total: usize,
}

impl DailyTracker {
    pub fn new(slots_total: usize) -> Self {
        DailyTracker {
            slots_total,
            ..Default::default()
        }
    }

    /// Apply a candidate's nutrition and bookkeeping (forward step).
    pub fn apply(&mut self, candidate: &CandidateRecipe, is_workout_slot: bool) {
        let n = candidate.nutrition();
        self.calories_consumed += n.calories;
        self.protein_consumed += n.protein_g;
        self.fat_consumed += n.fat_g;
        self.carbs_consumed += n.carbs_g;
        for (k, v) in &n.micronutrients {
            *self.micronutrients_consumed.entry(k.clone()).or_insert(0.0) += v;
        }
        self.used_recipe_ids.insert(candidate.id().to_string());
        if !is_workout_slot {
            self.non_workout_recipe_ids
                .insert(candidate.id().to_string());
        }
        for ingredient in candidate.ingredients() {
            if !ingredient.to_taste {
                *self
                    .ingredient_usage_counts
                    .entry(ingredient.normalized_name.clone())
                    .or_insert(0) += 1;
            }
        }
        self.slots_assigned += 1;
    }

    /// Undo a previously applied candidate (backtrack step). Must be called
    /// with the exact candidate/flag pair passed to the matching `apply`.
    pub fn undo(&mut self, candidate: &CandidateRecipe, is_workout_slot: bool) {
        let n = candidate.nutrition();
        self.calories_consumed -= n.calories;
        self.protein_consumed -= n.protein_g;
        self.fat_consumed -= n.fat_g;
        self.carbs_consumed -= n.carbs_g;
        for (k, v) in &n.micronutrients {
            if let Some(entry) = self.micronutrients_consumed.get_mut(k) {
                *entry -= v;
            }
        }
        self.used_recipe_ids.remove(candidate.id());
        if !is_workout_slot {
            self.non_workout_recipe_ids.remove(candidate.id());
        }
        for ingredient in candidate.ingredients() {
            if !ingredient.to_taste {
                if let Some(count) = self.ingredient_usage_counts.get_mut(&ingredient.normalized_name) {
                    *count -= 1;
                    if *count == 0 {
                        self.ingredient_usage_counts.remove(&ingredient.normalized_name);
                    }
                }
            }
        }
        self.slots_assigned -= 1;
    }

    pub fn is_complete(&self) -> bool {
        self.slots_assigned == self.slots_total
    }
}

/// Sums over fully completed days only; partial days never contribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTracker {
    pub weekly_totals: NutrientMap,
    pub days_completed: usize,
    pub days_remaining: usize,
}

impl WeeklyTracker {
    pub fn new(total_days: usize) -> Self {
        WeeklyTracker {
            weekly_totals: NutrientMap::new(),
            days_completed: 0,
            days_remaining: total_days,
        }
    }

    /// Commit a fully-validated day's micronutrient totals (DailyValidate-pass
    /// transition).
    pub fn commit_day(&mut self, daily: &DailyTracker) {
        for (k, v) in &daily.micronutrients_consumed {
            *self.weekly_totals.entry(k.clone()).or_insert(0.0) += v;
        }
        self.days_completed += 1;
        self.days_remaining = self.days_remaining.saturating_sub(1);
    }

    /// Reverse `commit_day` for the most recently completed day (day-boundary
    /// backtrack).
    pub fn decommit_day(&mut self, daily: &DailyTracker) {
        for (k, v) in &daily.micronutrients_consumed {
            if let Some(entry) = self.weekly_totals.get_mut(k) {
                *entry -= v;
            }
        }
        self.days_completed -= 1;
        self.days_remaining += 1;
    }

    /// `carryover_needs[n] = max(0, daily_RDI(n) * days_completed - weekly_totals[n])`.
    pub fn carryover_needs(&self, rdi: &HashMap<String, f64>) -> NutrientMap {
        rdi.iter()
            .map(|(n, target)| {
                let achieved = self.weekly_totals.get(n).copied().unwrap_or(0.0);
                let need = target * self.days_completed as f64 - achieved;
                (n.clone(), need.max(0.0))
            })
            .collect()
    }

    /// `adjusted_daily_target(n) = daily_RDI(n) + carryover_needs(n) / days_remaining_including_d`.
    pub fn adjusted_daily_targets(
        &self,
        rdi: &HashMap<String, f64>,
        days_remaining_including_d: usize,
    ) -> NutrientMap {
        let carryover = self.carryover_needs(rdi);
        let divisor = days_remaining_including_d.max(1) as f64;
        rdi.iter()
            .map(|(n, target)| {
                let need = carryover.get(n).copied().unwrap_or(0.0);
                (n.clone(), target + need / divisor)
            })
            .collect()
    }
}

/// A single decision point in the fixed total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPoint {
    pub day_index: usize,
    pub slot_index: usize,
}
