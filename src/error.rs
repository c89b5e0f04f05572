//! Error taxonomy for the solver.
//!
//! [`SolveError`] covers contract violations a caller should never actually hit
//! in production (malformed input the collaborator is responsible for
//! validating before calling in). Domain-level infeasibility — the five
//! failure modes a well-formed request can still legitimately produce — is
//! not modeled as an `Error` at all; it is data, carried in
//! [`crate::SolveOutcome::Failure`], because it is an expected outcome
//! of a deterministic search, not an exceptional one.

use thiserror::Error;

/// Programmer-contract violations: malformed requests that never reach the
/// search loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("days must be between 1 and 7, got {0}")]
    InvalidDayCount(usize),

    #[error("day {day_index} has {slot_count} slots, must have between 1 and 8")]
    InvalidSlotCount { day_index: usize, slot_count: usize },

    #[error("schedule declares {schedule_days} days but profile.days is {days}")]
    ScheduleDayMismatch { schedule_days: usize, days: usize },

    #[error("pinned assignment at day {day_index} slot {slot_index} references unknown recipe id {recipe_id}")]
    UnknownPinnedRecipe {
        day_index: usize,
        slot_index: usize,
        recipe_id: String,
    },

    #[error("pinned assignment references out-of-range day {day_index} or slot {slot_index}")]
    PinnedOutOfRange { day_index: usize, slot_index: usize },

    #[error("recipe pool is empty")]
    EmptyPool,

    #[error("duplicate recipe id in pool: {0}")]
    DuplicateRecipeId(String),

    #[error("busyness level {0} out of range 1..=4")]
    InvalidBusyness(u8),

    #[error("carb downscaling parameters invalid: {0}")]
    InvalidDownscalingConfig(String),
}
