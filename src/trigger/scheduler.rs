// Trigger scheduler: walks the plan during running trials and fires triggers
//
// The pointer is session-scoped: it survives trial boundaries and only
// `rewind` moves it back. The interval base is re-set at every trial start and
// at every fire, so intervals are relative to the most recent of the two.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::timers::{TimerKind, TimerRegistry};
use crate::audio::{AudioCaptureManager, ClipRequest};
use crate::config::{SchedulerConfig, TaskConfig};
use crate::events::{
    current_timestamp, epoch_ms, CuePlayedPayload, EndUnlockedPayload, SessionEventEmitter,
    TriggerFiredPayload,
};
use crate::plan::{TriggerPlan, TriggerPlanEntry};
use crate::relay::{EventRelay, TriggerMessage};
use crate::session_log::{LogEntry, SessionLogAggregator};
use crate::{debug, info, warn};

/// Collaborators a fired trigger touches
#[derive(Clone)]
pub struct SchedulerContext {
    pub participant: String,
    pub relay: Arc<dyn EventRelay>,
    pub audio: Arc<AudioCaptureManager>,
    pub log: Arc<SessionLogAggregator>,
    pub emitter: Arc<dyn SessionEventEmitter>,
}

/// Result of one scheduler evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No trial running, plan exhausted, or a carry already pending
    Idle,
    NotDue,
    /// Due, but deferred to the next trial
    Carried,
    Fired { trigger_index: usize },
}

#[derive(Debug, Default)]
struct SchedulerState {
    pointer: usize,
    trigger_base: Option<Instant>,
    carry_pending: bool,
    trial_index: u32,
}

pub struct TriggerScheduler {
    plan: TriggerPlan,
    config: SchedulerConfig,
    total: u32,
    carry_margin: u32,
    ctx: SchedulerContext,
    timers: TimerRegistry,
    state: Mutex<SchedulerState>,
    cue_count: Arc<AtomicU32>,
    end_unlocked: Arc<AtomicBool>,
}

impl TriggerScheduler {
    pub fn new(
        plan: TriggerPlan,
        config: &SchedulerConfig,
        task: &TaskConfig,
        ctx: SchedulerContext,
    ) -> Self {
        Self {
            plan,
            config: config.clone(),
            total: task.total,
            carry_margin: task.carry_margin,
            ctx,
            timers: TimerRegistry::new(),
            state: Mutex::new(SchedulerState::default()),
            cue_count: Arc::new(AtomicU32::new(0)),
            end_unlocked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn plan(&self) -> &TriggerPlan {
        &self.plan
    }

    /// Next plan index to fire
    pub fn pointer(&self) -> usize {
        self.state.lock().pointer
    }

    pub fn cue_count(&self) -> u32 {
        self.cue_count.load(Ordering::SeqCst)
    }

    pub fn is_carry_pending(&self) -> bool {
        self.state.lock().carry_pending
    }

    pub fn is_exhausted(&self) -> bool {
        self.pointer() >= self.plan.len()
    }

    /// True once the grace period after the final trigger has passed
    pub fn can_finish(&self) -> bool {
        self.end_unlocked.load(Ordering::SeqCst)
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Start measuring the current interval from the trial's Start
    pub fn begin_trial(&self, trial_index: u32, now: Instant) {
        let mut state = self.state.lock();
        state.trial_index = trial_index;
        state.trigger_base = Some(now);
        state.carry_pending = false;
    }

    /// True while a trigger fired in this trial still has a cue, clip or
    /// prompt to deliver
    pub fn has_trial_effects_pending(&self) -> bool {
        self.timers.has_trial_pending() || self.ctx.audio.has_clip_in_flight()
    }

    /// Wait until a pending cue has played or been cancelled
    pub async fn settle_cue(&self) {
        if self.timers.is_pending(TimerKind::Cue) {
            debug!("[scheduler] waiting for pending cue");
        }
        while self.timers.is_pending(TimerKind::Cue) {
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Stop evaluating and cancel every timer this trial's triggers armed
    ///
    /// A clip still recording is finalized and uploaded.
    pub fn end_trial(&self) {
        self.state.lock().trigger_base = None;
        self.timers.sweep_trial();
        self.ctx.audio.cancel_clip();
    }

    /// Restart the plan from the first entry for a new session plan
    pub fn rewind(&self) {
        {
            let mut state = self.state.lock();
            state.pointer = 0;
            state.trigger_base = None;
            state.carry_pending = false;
        }
        self.timers.sweep_all();
        self.cue_count.store(0, Ordering::SeqCst);
        self.end_unlocked.store(false, Ordering::SeqCst);
        info!("[scheduler] plan rewound");
    }

    /// Cancel every timer, the end unlock included
    pub fn shutdown(&self) {
        self.state.lock().trigger_base = None;
        self.timers.sweep_all();
    }

    /// Evaluate the plan at `now` with the trial at `next_expected`
    pub fn poll(&self, next_expected: u32, now: Instant) -> PollOutcome {
        let mut state = self.state.lock();
        let Some(base) = state.trigger_base else {
            return PollOutcome::Idle;
        };
        if state.carry_pending {
            return PollOutcome::Idle;
        }
        let Some(entry) = self.plan.get(state.pointer).cloned() else {
            return PollOutcome::Idle;
        };

        let elapsed_ms = now.saturating_duration_since(base).as_millis() as u64;
        if elapsed_ms < entry.interval_ms() {
            return PollOutcome::NotDue;
        }

        if next_expected > self.total.saturating_sub(self.carry_margin) {
            state.carry_pending = true;
            info!(
                "[scheduler] trigger {} due at {}/{}; carried to next trial",
                entry.index, next_expected, self.total
            );
            return PollOutcome::Carried;
        }

        state.pointer += 1;
        state.trigger_base = Some(now);
        let trial_index = state.trial_index;
        drop(state);

        let trigger_index = entry.index;
        self.fire(entry, trial_index, next_expected.saturating_sub(1), now);
        PollOutcome::Fired { trigger_index }
    }

    fn fire(&self, entry: TriggerPlanEntry, trial_index: u32, count: u32, now: Instant) {
        let trigger_index = entry.index;
        info!(
            "[scheduler] trigger {}/{} fired in trial {} (progress {})",
            trigger_index + 1,
            self.plan.len(),
            trial_index + 1,
            count
        );

        self.ctx
            .log
            .record(LogEntry::TriggerSent { trigger_index, count }, now);
        self.ctx.emitter.emit_trigger_fired(TriggerFiredPayload {
            trial_index,
            trigger_index,
            count,
        });

        let message = TriggerMessage {
            trial_index,
            trigger_index,
            count,
            trial_no: trial_index + 1,
            trigger_no: trigger_index + 1,
            client_ts: epoch_ms(),
        };
        let relay = self.ctx.relay.clone();
        tokio::spawn(async move {
            match relay.post_trigger(&message).await {
                Ok(ack) => debug!(
                    "[scheduler] trigger {} relayed as id {}",
                    message.trigger_index, ack.id
                ),
                Err(e) => warn!(
                    "[scheduler] trigger {} not relayed: {}",
                    message.trigger_index, e
                ),
            }
        });

        self.arm_cue();

        if let Some(prompt_id) = entry.prompt_id {
            self.arm_prompt(trigger_index, prompt_id);
        }

        if trigger_index + 1 == self.plan.len() {
            self.arm_end_unlock();
        }
    }

    fn arm_cue(&self) {
        let audio = self.ctx.audio.clone();
        let log = self.ctx.log.clone();
        let emitter = self.ctx.emitter.clone();
        let cues = self.cue_count.clone();
        self.timers
            .schedule(TimerKind::Cue, self.config.cue_delay(), async move {
                audio.play_cue();
                let count = cues.fetch_add(1, Ordering::SeqCst) + 1;
                log.record(LogEntry::Beep { count }, Instant::now());
                emitter.emit_cue_played(CuePlayedPayload { count });
            });
    }

    /// Clip starts `clip_lead` before the prompt and runs for the window
    fn arm_prompt(&self, trigger_index: usize, prompt_id: String) {
        let cue_delay = self.config.cue_delay();

        let request = ClipRequest {
            participant: self.ctx.participant.clone(),
            index: trigger_index,
            prompt_id: Some(prompt_id.clone()),
            window: self.config.clip_window(),
        };
        let audio = self.ctx.audio.clone();
        self.timers.schedule(
            TimerKind::ClipStart,
            cue_delay + self.config.clip_start_after_cue(),
            async move {
                if !audio.record_clip(request) {
                    debug!("[scheduler] clip for trigger {} not started", trigger_index);
                }
            },
        );

        let audio = self.ctx.audio.clone();
        self.timers.schedule(
            TimerKind::Prompt,
            cue_delay + self.config.prompt_delay(),
            async move {
                if let Err(e) = audio.play_prompt(&prompt_id) {
                    warn!("[scheduler] prompt '{}' not played: {}", prompt_id, e);
                }
            },
        );
    }

    fn arm_end_unlock(&self) {
        let unlocked = self.end_unlocked.clone();
        let emitter = self.ctx.emitter.clone();
        info!(
            "[scheduler] final trigger fired; finish unlocks in {:?}",
            self.config.end_unlock_delay()
        );
        self.timers.schedule(
            TimerKind::EndUnlock,
            self.config.end_unlock_delay(),
            async move {
                unlocked.store(true, Ordering::SeqCst);
                info!("[scheduler] session may now finish");
                emitter.emit_end_unlocked(EndUnlockedPayload {
                    timestamp: current_timestamp(),
                });
            },
        );
    }

    /// Poll every `poll_interval` while `next_expected` reports a running trial
    ///
    /// Returns when the closure yields None or `cancel` fires.
    pub async fn run<F>(&self, next_expected: F, cancel: CancellationToken)
    where
        F: Fn() -> Option<u32> + Send,
    {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(next) = next_expected() else {
                        break;
                    };
                    self.poll(next, Instant::now());
                }
            }
        }
        debug!("[scheduler] poll loop stopped");
    }
}
