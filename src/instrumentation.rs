//! The optional, write-only instrumentation sink: attempt counters and
//! timing that the search reports to but never reads back — enabling or
//! disabling it must never change an assignment or a score.

use std::collections::HashMap;
use std::time::Duration;

/// One decision-point commit or backtrack step, as seen by a sink.
#[derive(Debug, Clone, Copy)]
pub enum SearchEvent {
    AssignmentAttempt { day_index: usize, slot_index: usize, depth: usize },
    Backtrack { from_day: usize, from_slot: usize, to_day: usize, to_slot: usize },
    DayCompleted { day_index: usize, elapsed: Duration },
}

/// Write-only observer of search progress. The default [`NullSink`] does
/// nothing; [`RecordingSink`] is the test double that lets property tests
/// assert instrumentation never influences outcomes.
pub trait InstrumentationSink {
    fn record(&mut self, event: SearchEvent);
}

/// Discards every event; the zero-cost default used when a caller doesn't
/// pass a sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl InstrumentationSink for NullSink {
    fn record(&mut self, _event: SearchEvent) {}
}

/// Captures every event verbatim, for tests asserting instrumentation never
/// alters search decisions and for collaborators who want raw event access
/// rather than the aggregated [`RunStats`].
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SearchEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink::default()
    }
}

impl InstrumentationSink for RecordingSink {
    fn record(&mut self, event: SearchEvent) {
        self.events.push(event);
    }
}

/// Aggregated run statistics surfaced in [`crate::SolveOutcome`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RunStats {
    pub total_attempts: u64,
    pub total_backtracks: u64,
    pub max_depth: usize,
    pub day_runtimes_ms: HashMap<usize, u128>,
    pub average_backtrack_depth: f64,
}

/// Accumulates [`RunStats`] from raw events; kept separate from the public
/// sink trait so the search can always compute stats internally even when
/// the caller supplied no sink at all.
#[derive(Debug, Default)]
pub struct StatsCollector {
    pub stats: RunStats,
    backtrack_depth_sum: u64,
}

impl StatsCollector {
    pub fn record(&mut self, event: SearchEvent) {
        match event {
            SearchEvent::AssignmentAttempt { depth, .. } => {
                self.stats.total_attempts += 1;
                self.stats.max_depth = self.stats.max_depth.max(depth);
            }
            SearchEvent::Backtrack { from_day, from_slot, to_day, to_slot } => {
                self.stats.total_backtracks += 1;
                let depth = (from_day.saturating_sub(to_day)) * 8 + from_slot.saturating_sub(to_slot);
                self.backtrack_depth_sum += depth as u64;
                self.stats.average_backtrack_depth =
                    self.backtrack_depth_sum as f64 / self.stats.total_backtracks as f64;
            }
            SearchEvent::DayCompleted { day_index, elapsed } => {
                self.stats.day_runtimes_ms.insert(day_index, elapsed.as_millis());
            }
        }
    }
}
