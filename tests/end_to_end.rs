use chrono::NaiveTime;
use meal_planning_solver::{
    solve, solve_with_sink, Assignment, Day, FailureMode, FatRange, Ingredient,
    MicronutrientDeficitClassification, NullSink, Nutrition, PinnedAssignment,
    PinnedConflictClassification, RecordingSink, Recipe, Schedule, SearchEvent, Slot,
    SolveOutcome, SolveRequest, SolverConfig, UserProfile,
};
use std::collections::{HashMap, HashSet};

fn slot(hour: u32, busyness: u8) -> Slot {
    Slot {
        time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        busyness,
        meal_type: "meal".to_string(),
    }
}

fn recipe(id: &str, calories: f64, protein: f64, fat: f64, carbs: f64) -> Recipe {
    Recipe {
        id: id.to_string(),
        name: id.to_string(),
        ingredients: vec![Ingredient { normalized_name: format!("{id}-base"), to_taste: false }],
        cooking_time_minutes: 10,
        nutrition: Nutrition {
            calories,
            protein_g: protein,
            fat_g: fat,
            carbs_g: carbs,
            micronutrients: HashMap::new(),
        },
        primary_carb_contribution: None,
    }
}

fn base_profile(days: Vec<Day>) -> UserProfile {
    UserProfile {
        daily_calories: 2000,
        daily_protein_g: 100.0,
        daily_fat_g: FatRange { min_g: 50.0, max_g: 80.0 },
        daily_carbs_g: 250.0,
        max_daily_calories: None,
        schedule: Schedule { days },
        excluded_ingredients: HashSet::new(),
        liked_foods: HashSet::new(),
        demographic: "adult_male".to_string(),
        upper_limits_overrides: HashMap::new(),
        pinned_assignments: vec![],
        micronutrient_targets: HashMap::new(),
        activity_schedule: vec![],
    }
}

fn assignment_for(assignments: &[Assignment], day: usize, slot: usize) -> String {
    assignments
        .iter()
        .find(|a| a.day_index == day && a.slot_index == slot)
        .map(|a| a.recipe_id.clone())
        .unwrap_or_else(|| panic!("no assignment for day {day} slot {slot}"))
}

/// Scenario 1: D=1, 2 slots, trivial pool of four identical recipes.
#[test]
fn trivial_two_slot_picks_lexicographically_smallest_ids() {
    let profile = base_profile(vec![Day { slots: vec![slot(12, 2), slot(18, 2)] }]);
    let pool = vec![
        recipe("A", 1000.0, 50.0, 32.0, 125.0),
        recipe("B", 1000.0, 50.0, 32.0, 125.0),
        recipe("C", 1000.0, 50.0, 32.0, 125.0),
        recipe("D", 1000.0, 50.0, 32.0, 125.0),
    ];
    let request = SolveRequest { profile, days: 1, recipe_pool: pool, config: SolverConfig::default() };

    let outcome = solve(&request).unwrap();
    match outcome {
        SolveOutcome::Success { assignments, .. } => {
            assert_eq!(assignment_for(&assignments, 0, 0), "A");
            assert_eq!(assignment_for(&assignments, 0, 1), "B");
        }
        SolveOutcome::Failure { mode, .. } => panic!("expected success, got {mode:?}"),
    }
}

/// Scenario 2: D=7, two slots/day, 14 distinct recipes with identical macros.
#[test]
fn week_long_run_succeeds_with_deterministic_distinct_assignments() {
    let days: Vec<Day> = (0..7).map(|_| Day { slots: vec![slot(12, 2), slot(18, 2)] }).collect();
    let profile = base_profile(days);
    let pool: Vec<Recipe> = (0..14)
        .map(|i| recipe(&format!("R{i:02}"), 1000.0, 50.0, 32.0, 125.0))
        .collect();
    let request = SolveRequest { profile, days: 7, recipe_pool: pool, config: SolverConfig::default() };

    let first = solve(&request).unwrap();
    let second = solve(&request).unwrap();

    match (first, second) {
        (
            SolveOutcome::Success { assignments: a, .. },
            SolveOutcome::Success { assignments: b, .. },
        ) => {
            assert_eq!(a.len(), 14);
            for day in 0..7 {
                let ids_today: Vec<&str> = a
                    .iter()
                    .filter(|x| x.day_index == day)
                    .map(|x| x.recipe_id.as_str())
                    .collect();
                let distinct_today: HashSet<&str> = ids_today.iter().copied().collect();
                assert_eq!(distinct_today.len(), ids_today.len(), "HC-2: day {day} must not repeat a recipe id");
            }
            for day in 1..7 {
                let today: HashSet<&str> =
                    a.iter().filter(|x| x.day_index == day).map(|x| x.recipe_id.as_str()).collect();
                let yesterday: HashSet<&str> =
                    a.iter().filter(|x| x.day_index == day - 1).map(|x| x.recipe_id.as_str()).collect();
                assert!(today.is_disjoint(&yesterday), "HC-8: day {day} must not repeat day {}'s recipes", day - 1);
            }
            assert_eq!(
                a.iter().map(|x| x.recipe_id.clone()).collect::<Vec<_>>(),
                b.iter().map(|x| x.recipe_id.clone()).collect::<Vec<_>>(),
                "two runs over identical inputs must produce identical assignment sequences"
            );
        }
        (a, b) => panic!("expected two successes, got {a:?} / {b:?}"),
    }
}

/// Scenario 3: pinned breakfast over the daily calorie ceiling fails before search starts.
#[test]
fn pinned_breakfast_over_budget_fails_as_direct_violation() {
    let mut profile = base_profile(vec![Day { slots: vec![slot(8, 2), slot(12, 2), slot(18, 2)] }]);
    profile.max_daily_calories = Some(1800);
    profile.pinned_assignments.push(PinnedAssignment {
        day_index: 0,
        slot_index: 0,
        recipe_id: "BREAKFAST".to_string(),
    });
    let pool = vec![
        recipe("BREAKFAST", 2000.0, 50.0, 32.0, 125.0),
        recipe("FILLER", 100.0, 10.0, 5.0, 15.0),
    ];
    let request = SolveRequest { profile, days: 1, recipe_pool: pool, config: SolverConfig::default() };

    match solve(&request).unwrap() {
        SolveOutcome::Failure { mode: FailureMode::PinnedConflict(report), .. } => {
            assert_eq!(report.classification, PinnedConflictClassification::DirectViolation);
        }
        other => panic!("expected a direct-violation pinned conflict, got {other:?}"),
    }
}

/// Scenario 4: weekly micronutrient deficit that is structurally unreachable.
#[test]
fn weekly_micronutrient_deficit_is_reported_as_structural() {
    let days: Vec<Day> = (0..3).map(|_| Day { slots: vec![slot(12, 2)] }).collect();
    let mut profile = base_profile(days);
    profile.micronutrient_targets.insert("nutrient_x".to_string(), 100.0);
    profile.daily_calories = 1000;
    profile.daily_protein_g = 50.0;
    profile.daily_fat_g = FatRange { min_g: 20.0, max_g: 40.0 };
    profile.daily_carbs_g = 125.0;

    let pool: Vec<Recipe> = (0..6)
        .map(|i| {
            let mut r = recipe(&format!("R{i}"), 1000.0, 50.0, 32.0, 125.0);
            r.nutrition.micronutrients.insert("nutrient_x".to_string(), 30.0);
            r
        })
        .collect();
    let request = SolveRequest { profile, days: 3, recipe_pool: pool, config: SolverConfig::default() };

    match solve(&request).unwrap() {
        SolveOutcome::Failure {
            mode: FailureMode::WeeklyMicronutrientInfeasibility(report),
            ..
        } => {
            let deficient = report
                .deficient_nutrients
                .iter()
                .find(|d| d.nutrient == "nutrient_x")
                .expect("nutrient_x must be reported deficient");
            assert_eq!(deficient.classification, MicronutrientDeficitClassification::Structural);
            assert!((deficient.target - 300.0).abs() < 1e-6);
        }
        other => panic!("expected a structural weekly micronutrient infeasibility, got {other:?}"),
    }
}

/// TC-4: a single-day request with an unreachable micronutrient target must
/// still succeed — weekly validation does not run when `days == 1`.
#[test]
fn single_day_request_skips_weekly_micronutrient_validation() {
    let mut profile = base_profile(vec![Day { slots: vec![slot(12, 2)] }]);
    profile.micronutrient_targets.insert("nutrient_x".to_string(), 100.0);
    profile.daily_calories = 1000;
    profile.daily_protein_g = 50.0;
    profile.daily_fat_g = FatRange { min_g: 20.0, max_g: 40.0 };
    profile.daily_carbs_g = 125.0;

    let pool: Vec<Recipe> = (0..2)
        .map(|i| {
            let mut r = recipe(&format!("R{i}"), 1000.0, 50.0, 32.0, 125.0);
            r.nutrition.micronutrients.insert("nutrient_x".to_string(), 30.0);
            r
        })
        .collect();
    let request = SolveRequest { profile, days: 1, recipe_pool: pool, config: SolverConfig::default() };

    match solve(&request).unwrap() {
        SolveOutcome::Success { .. } => {}
        other => panic!("expected TC-4 success despite an unreachable micronutrient target, got {other:?}"),
    }
}

/// Scenario 5: HC-8 forces day 2 off day 1's recipe when only two options exist.
#[test]
fn hc8_forces_second_day_off_first_days_recipe() {
    let days = vec![Day { slots: vec![slot(12, 2)] }, Day { slots: vec![slot(12, 2)] }];
    let mut profile = base_profile(days);
    profile.daily_calories = 2000;
    profile.daily_protein_g = 50.0;
    profile.daily_fat_g = FatRange { min_g: 20.0, max_g: 40.0 };
    profile.daily_carbs_g = 125.0;
    let pool = vec![recipe("R1", 2000.0, 50.0, 32.0, 125.0), recipe("R2", 2000.0, 50.0, 32.0, 125.0)];
    let request = SolveRequest { profile, days: 2, recipe_pool: pool, config: SolverConfig::default() };

    match solve(&request).unwrap() {
        SolveOutcome::Success { assignments, .. } => {
            assert_eq!(assignment_for(&assignments, 0, 0), "R1");
            assert_eq!(assignment_for(&assignments, 1, 0), "R2");
        }
        SolveOutcome::Failure { mode, .. } => panic!("expected success, got {mode:?}"),
    }
}

/// Scenario 6: greedy's first pick fails daily validation and the search backtracks
/// to a combination that lands within the ±10% calorie band.
#[test]
fn backtracks_past_a_daily_validation_failure_to_a_feasible_combination() {
    let profile = base_profile(vec![Day { slots: vec![slot(8, 2), slot(12, 2), slot(18, 2)] }]);
    let mut pool = vec![recipe("BIG", 1500.0, 75.0, 50.0, 180.0)];
    for i in 0..6 {
        pool.push(recipe(&format!("SMALL{i}"), 667.0, 33.0, 21.0, 83.0));
    }
    let request = SolveRequest { profile, days: 1, recipe_pool: pool, config: SolverConfig::default() };

    match solve(&request).unwrap() {
        SolveOutcome::Success { assignments, .. } => {
            let total: f64 = assignments
                .iter()
                .map(|a| if a.recipe_id == "BIG" { 1500.0 } else { 667.0 })
                .sum();
            assert!((total - 2000.0).abs() <= 200.0, "total {total} must land within +/-10% of 2000");
        }
        SolveOutcome::Failure { mode, .. } => panic!("expected a backtracked success, got {mode:?}"),
    }
}

/// Enabling the instrumentation sink must not change which assignments come out.
#[test]
fn instrumentation_sink_does_not_change_the_assignment_sequence() {
    let profile = base_profile(vec![Day { slots: vec![slot(12, 2), slot(18, 2)] }]);
    let pool = vec![
        recipe("A", 1000.0, 50.0, 32.0, 125.0),
        recipe("B", 1000.0, 50.0, 32.0, 125.0),
        recipe("C", 1000.0, 50.0, 32.0, 125.0),
    ];
    let request = SolveRequest { profile, days: 1, recipe_pool: pool, config: SolverConfig::default() };

    let mut null_sink = NullSink;
    let without_sink = solve_with_sink(&request, &mut null_sink).unwrap();

    let mut recording_sink = RecordingSink::new();
    let with_sink = solve_with_sink(&request, &mut recording_sink).unwrap();

    match (without_sink, with_sink) {
        (SolveOutcome::Success { assignments: a, .. }, SolveOutcome::Success { assignments: b, .. }) => {
            assert_eq!(
                a.iter().map(|x| x.recipe_id.clone()).collect::<Vec<_>>(),
                b.iter().map(|x| x.recipe_id.clone()).collect::<Vec<_>>()
            );
        }
        (a, b) => panic!("expected two successes, got {a:?} / {b:?}"),
    }
    assert!(recording_sink.events.iter().any(|e| matches!(e, SearchEvent::AssignmentAttempt { .. })));
}

/// A malformed request (days outside 1..=7) is rejected before any search runs.
#[test]
fn rejects_day_count_outside_supported_range() {
    let profile = base_profile(vec![Day { slots: vec![slot(12, 2)] }; 8]);
    let pool = vec![recipe("A", 1000.0, 50.0, 32.0, 125.0)];
    let request = SolveRequest { profile, days: 8, recipe_pool: pool, config: SolverConfig::default() };

    assert!(solve(&request).is_err());
}
