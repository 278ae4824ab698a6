// Trigger plans: the pre-authored interval sequences that drive the scheduler

mod practice;
mod stimulus;

pub use practice::PracticePlan;
pub use stimulus::{Emphasis, Stimulus, StimulusKind, StimulusPlan};

use serde::{Deserialize, Serialize};

/// Errors from plan construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("Plan has no entries")]
    Empty,
    #[error("Entry at position {position} has index {index} (indices must be dense and 0-based)")]
    SparseIndex { position: usize, index: usize },
    #[error("Entry {index} has invalid interval {interval_secs}s (must be positive and finite)")]
    InvalidInterval { index: usize, interval_secs: f64 },
}

/// One scheduled trigger: fire `interval_secs` after the previous one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPlanEntry {
    pub index: usize,
    pub interval_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
}

impl TriggerPlanEntry {
    pub fn new(index: usize, interval_secs: f64, prompt_id: Option<&str>) -> Self {
        Self {
            index,
            interval_secs,
            prompt_id: prompt_id.map(str::to_string),
        }
    }

    /// Interval in whole milliseconds
    pub fn interval_ms(&self) -> u64 {
        (self.interval_secs * 1000.0).round() as u64
    }
}

/// Validated, immutable trigger plan
///
/// Intervals are relative: entry `i` fires `interval_secs` after entry `i-1`
/// fired (entry 0 counts from trial start).
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerPlan {
    entries: Vec<TriggerPlanEntry>,
}

impl TriggerPlan {
    /// Build a plan, rejecting empty plans, sparse indices and bad intervals
    pub fn new(entries: Vec<TriggerPlanEntry>) -> Result<Self, PlanError> {
        if entries.is_empty() {
            return Err(PlanError::Empty);
        }
        for (position, entry) in entries.iter().enumerate() {
            if entry.index != position {
                return Err(PlanError::SparseIndex {
                    position,
                    index: entry.index,
                });
            }
            if !entry.interval_secs.is_finite() || entry.interval_secs <= 0.0 {
                return Err(PlanError::InvalidInterval {
                    index: entry.index,
                    interval_secs: entry.interval_secs,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Build a plan from bare intervals (no prompts)
    pub fn from_intervals(intervals_secs: &[f64]) -> Result<Self, PlanError> {
        Self::new(
            intervals_secs
                .iter()
                .enumerate()
                .map(|(index, &secs)| TriggerPlanEntry::new(index, secs, None))
                .collect(),
        )
    }

    /// The session plan used by the experiment
    pub fn session_default() -> Self {
        let entries = SESSION_PLAN
            .iter()
            .enumerate()
            .map(|(index, &(secs, prompt))| TriggerPlanEntry::new(index, secs, Some(prompt)))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TriggerPlanEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TriggerPlanEntry] {
        &self.entries
    }

    /// Cumulative fire offsets from start, e.g. `[6, 9, 5]` → `[6000, 15000, 20000]`
    pub fn cumulative_schedule_ms(&self) -> Vec<u64> {
        self.entries
            .iter()
            .scan(0u64, |acc, entry| {
                *acc += entry.interval_ms();
                Some(*acc)
            })
            .collect()
    }

    /// Index of the last trigger that has fired after `elapsed_ms`, if any
    pub fn fired_index(&self, elapsed_ms: u64) -> Option<usize> {
        self.cumulative_schedule_ms()
            .iter()
            .take_while(|&&at| elapsed_ms >= at)
            .count()
            .checked_sub(1)
    }

    /// Next index to fire given elapsed time and the last index already
    /// handled; `None` once the plan is exhausted
    pub fn next_index(&self, elapsed_ms: u64, last_fired: Option<usize>) -> Option<usize> {
        // None orders below Some, so max picks the furthest known index
        let next = self
            .fired_index(elapsed_ms)
            .max(last_fired)
            .map_or(0, |i| i + 1);
        (next < self.len()).then_some(next)
    }
}

/// (interval seconds, prompt id) for the default session plan
const SESSION_PLAN: [(f64, &str); 50] = [
    (28.0, "question"),
    (32.0, "27-8"),
    (26.0, "question"),
    (35.0, "ank1"),
    (29.0, "question"),
    (31.0, "question"),
    (27.0, "18+17"),
    (34.0, "question"),
    (30.0, "ank2"),
    (33.0, "question"),
    (25.0, "32-9"),
    (29.0, "question"),
    (35.0, "question"),
    (28.0, "ank3"),
    (32.0, "question"),
    (26.0, "16+19"),
    (34.0, "question"),
    (30.0, "ank1"),
    (31.0, "question"),
    (27.0, "question"),
    (33.0, "29-14"),
    (29.0, "question"),
    (35.0, "ank2"),
    (28.0, "question"),
    (30.0, "24+18"),
    (26.0, "question"),
    (34.0, "question"),
    (31.0, "ank3"),
    (27.0, "question"),
    (32.0, "31-16"),
    (29.0, "question"),
    (35.0, "ank1"),
    (28.0, "question"),
    (30.0, "question"),
    (26.0, "17+26"),
    (33.0, "question"),
    (27.0, "ank2"),
    (34.0, "question"),
    (31.0, "28-13"),
    (29.0, "question"),
    (35.0, "question"),
    (28.0, "ank3"),
    (32.0, "19+24"),
    (26.0, "question"),
    (30.0, "34-17"),
    (33.0, "question"),
    (27.0, "23+19"),
    (34.0, "question"),
    (29.0, "26-18"),
    (31.0, "21+27"),
];

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
