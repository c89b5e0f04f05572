//! Derives the once-per-slot [`SlotContext`] values from a [`Schedule`] and
//! its paired `activity_schedule`.
//!
//! Computed exactly once at plan start and held read-only for the rest of
//! the run — nothing here is part of search state.

use crate::model::{ActivityContext, DayActivity, SatietyRequirement, Schedule, SlotContext};
use chrono::{NaiveTime, Timelike};

const PRE_WORKOUT_WINDOW_HOURS: i64 = 2;
const POST_WORKOUT_WINDOW_HOURS: i64 = 3;
const NEXT_MEAL_FAST_THRESHOLD_HOURS: f64 = 4.0;
const OVERNIGHT_FAST_THRESHOLD_HOURS: f64 = 12.0;

fn seconds_from_midnight(t: NaiveTime) -> i64 {
    t.num_seconds_from_midnight() as i64
}

/// Hours from `next` to `later`, assuming `later` falls on the day after
/// `earlier`'s day (used only for the last slot of a day).
fn hours_until_next_day(earlier: NaiveTime, later: NaiveTime) -> f64 {
    let delta = (seconds_from_midnight(later) + 24 * 3600) - seconds_from_midnight(earlier);
    delta as f64 / 3600.0
}

fn hours_between_same_day(earlier: NaiveTime, later: NaiveTime) -> f64 {
    (seconds_from_midnight(later) - seconds_from_midnight(earlier)) as f64 / 3600.0
}

fn activity_context_for(
    slot_time: NaiveTime,
    day_activity: Option<&DayActivity>,
    time_to_next_meal_hours: Option<f64>,
    overnight_gap_hours: Option<f64>,
) -> ActivityContext {
    let mut pre_workout = false;
    let mut post_workout = false;
    if let Some(activity) = day_activity {
        for workout in &activity.workouts {
            let to_start = hours_between_same_day(slot_time, workout.start);
            if (0.0..=PRE_WORKOUT_WINDOW_HOURS as f64).contains(&to_start) {
                pre_workout = true;
            }
            let since_end = hours_between_same_day(workout.end, slot_time);
            if (0.0..=POST_WORKOUT_WINDOW_HOURS as f64).contains(&since_end) {
                post_workout = true;
            }
        }
    }

    let overnight_fast_ahead = match (time_to_next_meal_hours, overnight_gap_hours) {
        (Some(h), _) if h > NEXT_MEAL_FAST_THRESHOLD_HOURS => true,
        (_, Some(gap)) if gap >= OVERNIGHT_FAST_THRESHOLD_HOURS => true,
        _ => false,
    };

    ActivityContext {
        pre_workout,
        post_workout,
        sedentary: !(pre_workout || post_workout),
        overnight_fast_ahead,
    }
}

fn satiety_for(
    time_to_next_meal_hours: Option<f64>,
    overnight_gap_hours: Option<f64>,
) -> SatietyRequirement {
    let high = matches!(time_to_next_meal_hours, Some(h) if h > NEXT_MEAL_FAST_THRESHOLD_HOURS)
        || matches!(overnight_gap_hours, Some(g) if g >= OVERNIGHT_FAST_THRESHOLD_HOURS);
    if high {
        SatietyRequirement::High
    } else {
        SatietyRequirement::Moderate
    }
}

/// Computes a [`SlotContext`] for every slot in `schedule`, indexed
/// `[day_index][slot_index]`, using `activity_schedule` (one [`DayActivity`]
/// per day; a day past the end of `activity_schedule` is treated as having
/// no workouts).
pub fn derive_slot_contexts(
    schedule: &Schedule,
    activity_schedule: &[DayActivity],
) -> Vec<Vec<SlotContext>> {
    schedule
        .days
        .iter()
        .enumerate()
        .map(|(day_index, day)| {
            let day_activity = activity_schedule.get(day_index);
            day.slots
                .iter()
                .enumerate()
                .map(|(slot_index, slot)| {
                    let is_last_of_day = slot_index + 1 == day.slots.len();

                    let (time_to_next_meal_hours, overnight_gap_hours) = if !is_last_of_day {
                        let next = &day.slots[slot_index + 1];
                        (
                            Some(hours_between_same_day(slot.time, next.time)),
                            None,
                        )
                    } else if let Some(next_day) = schedule.days.get(day_index + 1) {
                        match next_day.slots.first() {
                            Some(next_slot) => (
                                None,
                                Some(hours_until_next_day(slot.time, next_slot.time)),
                            ),
                            None => (None, None),
                        }
                    } else {
                        (None, None)
                    };

                    SlotContext {
                        activity_context: activity_context_for(
                            slot.time,
                            day_activity,
                            time_to_next_meal_hours,
                            overnight_gap_hours,
                        ),
                        cooking_time_max: slot.cooking_time_max(),
                        satiety_requirement: satiety_for(
                            time_to_next_meal_hours,
                            overnight_gap_hours,
                        ),
                    }
                })
                .collect()
        })
        .collect()
}
