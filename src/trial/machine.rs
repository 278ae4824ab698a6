// Trial state machine for the number-tapping task

use serde::Serialize;
use tokio::time::Instant;

use super::layout::GridPosition;

/// Lifecycle of a single trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrialPhase {
    /// Waiting for the operator to press Start
    #[default]
    NotStarted,
    /// Participant is tapping
    Running,
    /// All numbers pressed in order
    Completed,
    /// Left before completion (return to menu, page unload)
    Aborted,
}

/// Errors that can occur during trial transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrialError {
    #[error("Invalid trial transition from {from:?} to {to:?}")]
    InvalidTransition { from: TrialPhase, to: TrialPhase },
}

/// Result of handling one tap
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Tap arrived before Start or after the trial ended
    Ignored,
    /// Pressed the expected number; `next_expected` is the new target
    Correct {
        pressed: u32,
        expected: u32,
        position: Option<GridPosition>,
        next_expected: u32,
    },
    /// Pressed some other number
    Wrong {
        pressed: u32,
        expected: u32,
        position: Option<GridPosition>,
        miss_count: u32,
    },
    /// Pressed the final number; the trial is over
    Completed {
        pressed: u32,
        position: Option<GridPosition>,
        elapsed_ms: u64,
        miss_count: u32,
    },
}

impl ClickOutcome {
    /// (pressed, expected, is_correct) for logging; None when ignored
    pub fn click_fields(&self) -> Option<(u32, u32, bool, Option<GridPosition>)> {
        match *self {
            ClickOutcome::Ignored => None,
            ClickOutcome::Correct {
                pressed,
                expected,
                position,
                ..
            } => Some((pressed, expected, true, position)),
            ClickOutcome::Wrong {
                pressed,
                expected,
                position,
                ..
            } => Some((pressed, expected, false, position)),
            ClickOutcome::Completed {
                pressed, position, ..
            } => Some((pressed, pressed, true, position)),
        }
    }
}

/// Read-only view of a trial
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialState {
    pub trial_index: u32,
    pub total: u32,
    pub next_expected: u32,
    pub phase: TrialPhase,
    pub miss_count: u32,
    pub elapsed_ms: Option<u64>,
}

impl TrialState {
    pub fn is_started(&self) -> bool {
        self.phase != TrialPhase::NotStarted
    }

    pub fn is_completed(&self) -> bool {
        self.phase == TrialPhase::Completed
    }
}

/// Click-sequence state machine
///
/// Valid transitions:
/// - NotStarted -> Running (operator presses Start)
/// - Running -> Running (correct or wrong tap)
/// - Running -> Completed (correct tap on the final number)
/// - Running | Completed -> Aborted (leave before the next trial)
pub struct TrialMachine {
    total: u32,
    trial_index: u32,
    next_expected: u32,
    phase: TrialPhase,
    miss_count: u32,
    started_at: Option<Instant>,
    elapsed_ms: Option<u64>,
}

impl TrialMachine {
    /// Create a machine for trial `trial_index` (0-based) of `total` numbers
    pub fn new(total: u32, trial_index: u32) -> Self {
        Self {
            total: total.max(1),
            trial_index,
            next_expected: 1,
            phase: TrialPhase::NotStarted,
            miss_count: 0,
            started_at: None,
            elapsed_ms: None,
        }
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn trial_index(&self) -> u32 {
        self.trial_index
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        self.elapsed_ms
    }

    /// Numbers correctly pressed so far
    pub fn progress(&self) -> u32 {
        match self.phase {
            TrialPhase::Completed => self.total,
            _ => self.next_expected - 1,
        }
    }

    pub fn state(&self) -> TrialState {
        TrialState {
            trial_index: self.trial_index,
            total: self.total,
            next_expected: self.next_expected,
            phase: self.phase,
            miss_count: self.miss_count,
            elapsed_ms: self.elapsed_ms,
        }
    }

    /// NotStarted -> Running; captures the trial start instant
    #[must_use = "this returns a Result that should be handled"]
    pub fn start(&mut self, now: Instant) -> Result<(), TrialError> {
        if self.phase != TrialPhase::NotStarted {
            return Err(TrialError::InvalidTransition {
                from: self.phase,
                to: TrialPhase::Running,
            });
        }
        self.next_expected = 1;
        self.miss_count = 0;
        self.elapsed_ms = None;
        self.started_at = Some(now);
        self.phase = TrialPhase::Running;
        Ok(())
    }

    /// Handle a tap on `pressed`
    pub fn click(
        &mut self,
        pressed: u32,
        position: Option<GridPosition>,
        now: Instant,
    ) -> ClickOutcome {
        if self.phase != TrialPhase::Running {
            return ClickOutcome::Ignored;
        }

        let expected = self.next_expected;
        if pressed != expected {
            self.miss_count += 1;
            return ClickOutcome::Wrong {
                pressed,
                expected,
                position,
                miss_count: self.miss_count,
            };
        }

        if expected >= self.total {
            let start = self.started_at.unwrap_or(now);
            let elapsed_ms = now.saturating_duration_since(start).as_millis() as u64;
            self.elapsed_ms = Some(elapsed_ms);
            self.phase = TrialPhase::Completed;
            return ClickOutcome::Completed {
                pressed,
                position,
                elapsed_ms,
                miss_count: self.miss_count,
            };
        }

        self.next_expected += 1;
        ClickOutcome::Correct {
            pressed,
            expected,
            position,
            next_expected: self.next_expected,
        }
    }

    /// Running | Completed -> Aborted; returns the progress marker
    #[must_use = "this returns a Result that should be handled"]
    pub fn abort(&mut self) -> Result<u32, TrialError> {
        match self.phase {
            TrialPhase::Running | TrialPhase::Completed => {
                let progress = self.progress();
                self.phase = TrialPhase::Aborted;
                Ok(progress)
            }
            from => Err(TrialError::InvalidTransition {
                from,
                to: TrialPhase::Aborted,
            }),
        }
    }
}

/// Format milliseconds as seconds with one decimal, e.g. `12345` -> `"12.3"`
pub fn format_seconds(ms: Option<u64>) -> String {
    match ms {
        Some(ms) => format!("{:.1}", ms as f64 / 1000.0),
        None => "--.-".to_string(),
    }
}
