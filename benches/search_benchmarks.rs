use chrono::NaiveTime;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use meal_planning_solver::{
    search, Day, FatRange, Ingredient, NullSink, Nutrition, Recipe, ResolvedUls, Schedule, Slot,
    SolverConfig, UserProfile,
};
use std::collections::{HashMap, HashSet};

fn slot(hour: u32) -> Slot {
    Slot { time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(), busyness: 2, meal_type: "meal".to_string() }
}

fn recipe(id: &str, calories: f64) -> Recipe {
    Recipe {
        id: id.to_string(),
        name: id.to_string(),
        ingredients: vec![Ingredient { normalized_name: format!("{id}-base"), to_taste: false }],
        cooking_time_minutes: 10,
        nutrition: Nutrition {
            calories,
            protein_g: 50.0,
            fat_g: 32.0,
            carbs_g: 125.0,
            micronutrients: HashMap::new(),
        },
        primary_carb_contribution: None,
    }
}

/// A pool engineered to force repeated backtracking: one recipe whose
/// calories satisfy the daily target in isolation but whose macros fall
/// outside the ±10% band once combined with any other recipe in the pool,
/// so greedy selection at every slot after the first must be undone and
/// retried against the filler recipes.
fn worst_case_profile_and_pool(days: usize, slots_per_day: usize) -> (UserProfile, Vec<Recipe>) {
    let schedule_days: Vec<Day> =
        (0..days).map(|_| Day { slots: (0..slots_per_day).map(|i| slot(7 + 2 * i as u32)).collect() }).collect();

    let profile = UserProfile {
        daily_calories: 2000,
        daily_protein_g: 100.0,
        daily_fat_g: FatRange { min_g: 50.0, max_g: 80.0 },
        daily_carbs_g: 250.0,
        max_daily_calories: None,
        schedule: Schedule { days: schedule_days },
        excluded_ingredients: HashSet::new(),
        liked_foods: HashSet::new(),
        demographic: "adult_male".to_string(),
        upper_limits_overrides: HashMap::new(),
        pinned_assignments: vec![],
        micronutrient_targets: HashMap::new(),
        activity_schedule: vec![],
    };

    let per_slot_target = 2000.0 / slots_per_day as f64;
    let mut pool = vec![recipe("DECOY", per_slot_target * 1.6)];
    for i in 0..20 {
        pool.push(recipe(&format!("FILLER{i}"), per_slot_target));
    }
    (profile, pool)
}

fn bench_worst_case_backtracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_worst_case_backtracking");
    for &(days, slots_per_day) in &[(1usize, 3usize), (3, 3), (7, 3)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{days}d_{slots_per_day}s")),
            &(days, slots_per_day),
            |b, &(days, slots_per_day)| {
                let (profile, pool) = worst_case_profile_and_pool(days, slots_per_day);
                let resolved_uls = ResolvedUls::new();
                let config = SolverConfig::default();
                b.iter(|| {
                    let mut sink = NullSink;
                    search::run(&profile, &pool, days, &resolved_uls, &config, &mut sink)
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_worst_case_backtracking);
criterion_main!(benches);
