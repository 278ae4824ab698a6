// Practice run: the click task with no triggers, audio or uploads

use tokio::time::Instant;

use crate::config::TaskConfig;
use crate::plan::PracticePlan;
use crate::trial::{ClickOutcome, GridLayout, TrialError, TrialMachine, TrialPhase, TrialState};
use crate::{debug, info};

/// Repeatable practice trial on a fresh grid each time
///
/// Beep timing comes from a looping [`PracticePlan`]; callers that want
/// audible practice beeps ask [`beeps_due`](Self::beeps_due) on their own tick.
pub struct PracticeSession {
    total: u32,
    cols: u32,
    machine: TrialMachine,
    layout: GridLayout,
    plan: PracticePlan,
    beeps_played: u64,
    rounds: u32,
}

impl PracticeSession {
    pub fn new(task: &TaskConfig, plan: PracticePlan) -> Self {
        Self {
            total: task.total,
            cols: task.cols,
            machine: TrialMachine::new(task.total, 0),
            layout: GridLayout::shuffled(task.total, task.cols),
            plan,
            beeps_played: 0,
            rounds: 0,
        }
    }

    pub fn state(&self) -> TrialState {
        self.machine.state()
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Practice rounds completed so far
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    #[must_use = "this returns a Result that should be handled"]
    pub fn start(&mut self, now: Instant) -> Result<(), TrialError> {
        self.machine.start(now)?;
        self.beeps_played = 0;
        debug!("[practice] round {} started", self.rounds + 1);
        Ok(())
    }

    pub fn click(&mut self, pressed: u32, now: Instant) -> ClickOutcome {
        let position = self.layout.position_of(pressed);
        let outcome = self.machine.click(pressed, position, now);
        if let ClickOutcome::Completed { elapsed_ms, .. } = outcome {
            self.rounds += 1;
            info!(
                "[practice] round {} completed in {} ms",
                self.rounds, elapsed_ms
            );
        }
        outcome
    }

    /// Back to NotStarted on a reshuffled grid
    pub fn reset(&mut self) {
        self.machine = TrialMachine::new(self.total, 0);
        self.layout = GridLayout::shuffled(self.total, self.cols);
        self.beeps_played = 0;
    }

    fn elapsed_ms(&self, now: Instant) -> Option<u64> {
        if self.machine.phase() != TrialPhase::Running {
            return None;
        }
        let started = self.machine.started_at()?;
        Some(now.saturating_duration_since(started).as_millis() as u64)
    }

    /// Beeps that came due since the last call; 0 when not running
    pub fn beeps_due(&mut self, now: Instant) -> u64 {
        let Some(elapsed) = self.elapsed_ms(now) else {
            return 0;
        };
        let fired = self.plan.next_index(elapsed);
        let due = fired.saturating_sub(self.beeps_played);
        self.beeps_played = fired;
        due
    }

    /// Milliseconds until the next practice beep while running
    pub fn time_until_next_beep_ms(&self, now: Instant) -> Option<u64> {
        self.elapsed_ms(now)
            .map(|elapsed| self.plan.time_until_next_ms(elapsed))
    }
}
