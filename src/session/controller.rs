// Task session: owns the trial, scheduler, audio, speech and log for one participant
//
// Lock order is trial slot -> log buffer. Nothing that holds the log or
// scheduler lock reaches back into the trial slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::services::SessionServices;
use crate::audio::{AudioCaptureManager, AudioStatus};
use crate::config::{AppConfig, TaskConfig};
use crate::events::{
    current_timestamp, epoch_ms, ClickFeedbackPayload, SessionEventEmitter, TrialAbortedPayload,
    TrialCompletedPayload, TrialStartedPayload,
};
use crate::history::{HistoryRecord, HistoryTracker};
use crate::plan::TriggerPlan;
use crate::relay::EventRelay;
use crate::session_log::{LogEntry, SessionLogAggregator};
use crate::speech::{SpeechCaptureAdapter, SpeechStatus};
use crate::trial::{ClickOutcome, GridLayout, TrialError, TrialMachine, TrialPhase, TrialState};
use crate::trigger::{SchedulerContext, TriggerScheduler};
use crate::upload::{LogUploadMeta, TrialStatus};
use crate::{debug, info, warn};

/// Errors returned to the operator surface
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Trial(#[from] TrialError),
    #[error("Trial {trial_no} is {phase:?}; finish it before moving on")]
    TrialNotCompleted { trial_no: u32, phase: TrialPhase },
    #[error("Trial {trial_no} still has a cue, prompt or clip in flight")]
    TrialSettling { trial_no: u32 },
    #[error("Session already started; the plan can only be reset before the first trial")]
    AlreadyStarted,
    #[error("Session cannot finish until the grace period after the final trigger")]
    FinishLocked,
    #[error("Session already closed")]
    Closed,
}

struct TrialSlot {
    machine: TrialMachine,
    layout: GridLayout,
}

struct PollLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One participant's run through the task
///
/// Operator actions map onto methods: [`press_start`](Self::press_start),
/// [`click`](Self::click), [`next_trial`](Self::next_trial),
/// [`return_to_menu`](Self::return_to_menu) and
/// [`finish_session`](Self::finish_session). Leaving by any route flushes the
/// current trial's log at most once and releases the microphone.
pub struct TaskSession {
    participant: String,
    session_id: String,
    task: TaskConfig,
    trial: Arc<Mutex<TrialSlot>>,
    history: Mutex<HistoryTracker>,
    scheduler: Arc<TriggerScheduler>,
    audio: Arc<AudioCaptureManager>,
    log: Arc<SessionLogAggregator>,
    speech: SpeechCaptureAdapter,
    relay: Arc<dyn EventRelay>,
    emitter: Arc<dyn SessionEventEmitter>,
    poll: Mutex<Option<PollLoop>>,
    /// Set while a completed trial is still stopping and uploading
    settling: AtomicBool,
    leaving: AtomicBool,
}

/// Clears the settling flag however the completion path exits
struct SettlingGuard<'a>(&'a AtomicBool);

impl Drop for SettlingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TaskSession {
    pub fn new(
        participant: &str,
        config: &AppConfig,
        plan: TriggerPlan,
        services: SessionServices,
    ) -> Self {
        let log = Arc::new(SessionLogAggregator::new(services.uploader.clone()));
        let audio = Arc::new(AudioCaptureManager::new(
            services.microphone,
            services.output,
            services.uploader,
            &config.audio,
        ));
        let scheduler = Arc::new(TriggerScheduler::new(
            plan,
            &config.scheduler,
            &config.task,
            SchedulerContext {
                participant: participant.to_string(),
                relay: services.relay.clone(),
                audio: audio.clone(),
                log: log.clone(),
                emitter: services.emitter.clone(),
            },
        ));
        let speech = SpeechCaptureAdapter::new(services.recognizer, log.clone());
        let session_id = uuid::Uuid::new_v4().to_string();
        info!(
            "[session] session {} created for participant '{}' ({} triggers)",
            session_id,
            participant,
            scheduler.plan().len()
        );

        Self {
            participant: participant.to_string(),
            session_id,
            task: config.task.clone(),
            trial: Arc::new(Mutex::new(TrialSlot {
                machine: TrialMachine::new(config.task.total, 0),
                layout: GridLayout::shuffled(config.task.total, config.task.cols),
            })),
            history: Mutex::new(HistoryTracker::new(config.task.history_size)),
            scheduler,
            audio,
            log,
            speech,
            relay: services.relay,
            emitter: services.emitter,
            poll: Mutex::new(None),
            settling: AtomicBool::new(false),
            leaving: AtomicBool::new(false),
        }
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn trial_state(&self) -> TrialState {
        self.trial.lock().machine.state()
    }

    pub fn layout(&self) -> GridLayout {
        self.trial.lock().layout.clone()
    }

    /// Completed trials, newest first
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history.lock().records().to_vec()
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    pub fn audio_status(&self) -> AudioStatus {
        self.audio.status()
    }

    pub fn speech_status(&self) -> SpeechStatus {
        self.speech.status()
    }

    pub fn can_finish(&self) -> bool {
        self.scheduler.can_finish()
    }

    pub fn is_closed(&self) -> bool {
        self.leaving.load(Ordering::SeqCst)
    }

    /// Open the session: clear the relay room and rewind the plan
    ///
    /// Only valid before the first trial starts. A relay that cannot be reset
    /// is logged and the session still opens.
    #[must_use = "this returns a Result that should be handled"]
    pub async fn begin_session(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        {
            let slot = self.trial.lock();
            if slot.machine.trial_index() != 0 || slot.machine.phase() != TrialPhase::NotStarted {
                return Err(SessionError::AlreadyStarted);
            }
        }
        match self.relay.reset().await {
            Ok(()) => info!("[session] relay room reset"),
            Err(e) => warn!("[session] relay room not reset: {}", e),
        }
        self.scheduler.rewind();
        Ok(())
    }

    /// Start the current trial: trial zero, recording, speech and the poll loop
    #[must_use = "this returns a Result that should be handled"]
    pub fn press_start(&self) -> Result<TrialState, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let now = Instant::now();
        let state = {
            let mut slot = self.trial.lock();
            slot.machine.start(now)?;
            slot.machine.state()
        };
        let trial_index = state.trial_index;

        self.log.begin_trial(now);
        self.scheduler.begin_trial(trial_index, now);
        self.audio
            .start_continuous_recording(&self.participant, trial_index);
        self.speech.start();
        self.spawn_poll_loop();

        info!("[session] trial {} started", trial_index + 1);
        self.emitter.emit_trial_started(TrialStartedPayload {
            trial_index,
            timestamp: current_timestamp(),
        });
        Ok(state)
    }

    fn spawn_poll_loop(&self) {
        let scheduler = self.scheduler.clone();
        let trial = self.trial.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            scheduler
                .run(
                    move || {
                        let slot = trial.lock();
                        (slot.machine.phase() == TrialPhase::Running)
                            .then(|| slot.machine.next_expected())
                    },
                    token,
                )
                .await;
        });

        if let Some(previous) = self.poll.lock().replace(PollLoop { cancel, task }) {
            previous.cancel.cancel();
        }
    }

    async fn stop_poll_loop(&self) {
        let poll = self.poll.lock().take();
        if let Some(poll) = poll {
            poll.cancel.cancel();
            if let Err(e) = poll.task.await {
                warn!("[session] poll loop failed: {}", e);
            }
        }
    }

    /// Handle a tap on the number `pressed`
    pub async fn click(&self, pressed: u32) -> ClickOutcome {
        let now = Instant::now();
        let (outcome, state) = {
            let mut slot = self.trial.lock();
            let position = slot.layout.position_of(pressed);
            let outcome = slot.machine.click(pressed, position, now);
            if let Some((pressed, expected, is_correct, position)) = outcome.click_fields() {
                self.log.record(
                    LogEntry::Click {
                        pressed,
                        expected,
                        is_correct,
                        position,
                    },
                    now,
                );
            }
            (outcome, slot.machine.state())
        };

        let Some((pressed, _, correct, _)) = outcome.click_fields() else {
            debug!("[session] ignoring tap on {} while {:?}", pressed, state.phase);
            return outcome;
        };
        self.emitter.emit_click_feedback(ClickFeedbackPayload {
            pressed,
            correct,
            next_expected: state.next_expected,
            miss_count: state.miss_count,
        });

        if let ClickOutcome::Completed {
            elapsed_ms,
            miss_count,
            ..
        } = outcome
        {
            self.complete_trial(state.trial_index, elapsed_ms, miss_count)
                .await;
        }
        outcome
    }

    /// Completion path; claims the log flush before its first await
    ///
    /// Waits for a pending cue so its beep lands in this trial's log, stops
    /// speech and the trial recorder, then uploads.
    async fn complete_trial(&self, trial_index: u32, elapsed_ms: u64, miss_count: u32) {
        let current = HistoryRecord {
            time_ms: elapsed_ms,
            miss: miss_count,
        };
        let best = self.history.lock().best(Some(current));
        info!(
            "[session] trial {} completed in {} ms ({} misses)",
            trial_index + 1,
            elapsed_ms,
            miss_count
        );
        self.emitter.emit_trial_completed(TrialCompletedPayload {
            trial_index,
            elapsed_ms,
            miss_count,
            best_ms: best.map(|b| b.time_ms),
        });

        let (claim, mut meta) = {
            let slot = self.trial.lock();
            if slot.machine.phase() != TrialPhase::Completed {
                // Left the session between the tap and here; teardown flushes
                return;
            }
            let Some(claim) = self.log.claim() else {
                debug!("[session] trial {} log already claimed", trial_index + 1);
                return;
            };
            self.settling.store(true, Ordering::SeqCst);
            (
                claim,
                self.log_meta(&slot.machine, TrialStatus::Completed, self.task.total),
            )
        };
        let _settling = SettlingGuard(&self.settling);

        self.scheduler.settle_cue().await;
        self.stop_poll_loop().await;
        self.speech.stop().await;
        self.audio
            .stop_continuous_recording(TrialStatus::Completed, false)
            .await;

        meta.end_ts = epoch_ms();
        claim.upload(meta).await;
    }

    /// Move to the next trial once the current one is complete
    ///
    /// Refused while the completed trial is still uploading or a trigger it
    /// fired still has a cue, prompt or clip to deliver. Records the
    /// completed trial in the history, reshuffles the grid and clears the
    /// log. Returns the new 0-based trial index.
    #[must_use = "this returns a Result that should be handled"]
    pub fn next_trial(&self) -> Result<u32, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let next_index = {
            let mut slot = self.trial.lock();
            let phase = slot.machine.phase();
            if phase != TrialPhase::Completed {
                return Err(SessionError::TrialNotCompleted {
                    trial_no: slot.machine.trial_index() + 1,
                    phase,
                });
            }
            if self.settling.load(Ordering::SeqCst) || self.scheduler.has_trial_effects_pending() {
                return Err(SessionError::TrialSettling {
                    trial_no: slot.machine.trial_index() + 1,
                });
            }
            if let Some(time_ms) = slot.machine.elapsed_ms() {
                self.history.lock().push(HistoryRecord {
                    time_ms,
                    miss: slot.machine.miss_count(),
                });
            }
            let next_index = slot.machine.trial_index() + 1;
            *slot = TrialSlot {
                machine: TrialMachine::new(self.task.total, next_index),
                layout: GridLayout::shuffled(self.task.total, self.task.cols),
            };
            next_index
        };

        self.scheduler.end_trial();
        self.log.reset();
        info!("[session] ready for trial {}", next_index + 1);
        Ok(next_index)
    }

    /// Abandon the session from the operator menu
    ///
    /// Returns false if the session had already been left.
    pub async fn return_to_menu(&self) -> bool {
        info!("[session] returning to menu");
        self.teardown().await
    }

    /// End the session after the final trigger's grace period
    #[must_use = "this returns a Result that should be handled"]
    pub async fn finish_session(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if !self.scheduler.can_finish() {
            return Err(SessionError::FinishLocked);
        }
        info!("[session] finishing session {}", self.session_id);
        if self.teardown().await {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    /// Process shutdown; same cleanup as leaving
    pub async fn shutdown(&self) {
        if !self.teardown().await {
            debug!("[session] shutdown: session already closed");
        }
    }

    /// Shared leave path, run at most once
    ///
    /// Stops timers, then speech and the recorders, then uploads the log,
    /// then releases the microphone.
    async fn teardown(&self) -> bool {
        if self
            .leaving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.scheduler.shutdown();

        let (recording_status, aborted) = {
            let mut slot = self.trial.lock();
            let trial_index = slot.machine.trial_index();
            let phase = slot.machine.phase();
            let recording_status = if phase == TrialPhase::Completed {
                TrialStatus::Completed
            } else {
                TrialStatus::Aborted
            };
            let aborted = match slot.machine.abort() {
                Ok(progress) => Some((
                    trial_index,
                    phase == TrialPhase::Running,
                    progress,
                    self.log.claim(),
                    self.log_meta(&slot.machine, TrialStatus::Aborted, progress),
                )),
                Err(_) => None,
            };
            (recording_status, aborted)
        };

        let mut pending_upload = None;
        if let Some((trial_index, was_running, progress, claim, meta)) = aborted {
            if was_running {
                info!(
                    "[session] trial {} abandoned at progress {}",
                    trial_index + 1,
                    progress
                );
                self.emitter.emit_trial_aborted(TrialAbortedPayload {
                    trial_index,
                    progress,
                });
            }
            match claim {
                Some(claim) => pending_upload = Some((claim, meta)),
                None => debug!("[session] trial {} log already uploaded", trial_index + 1),
            }
        }

        self.stop_poll_loop().await;
        self.speech.stop().await;
        self.audio
            .stop_continuous_recording(recording_status, false)
            .await;
        self.audio.cancel_clip();

        if let Some((claim, mut meta)) = pending_upload {
            meta.end_ts = epoch_ms();
            claim.upload(meta).await;
        }

        self.audio.release().await;
        info!("[session] session {} closed", self.session_id);
        true
    }

    fn log_meta(&self, machine: &TrialMachine, status: TrialStatus, progress: u32) -> LogUploadMeta {
        build_log_meta(
            &self.participant,
            &self.session_id,
            &self.log,
            machine,
            status,
            progress,
        )
    }
}

fn build_log_meta(
    participant: &str,
    session_id: &str,
    log: &SessionLogAggregator,
    machine: &TrialMachine,
    status: TrialStatus,
    progress: u32,
) -> LogUploadMeta {
    LogUploadMeta {
        participant: participant.to_string(),
        trial_no: machine.trial_index() + 1,
        status,
        progress,
        total: machine.total(),
        miss_count: machine.miss_count(),
        elapsed_ms: machine.elapsed_ms(),
        start_ts: log.start_ts(),
        end_ts: epoch_ms(),
        session_id: session_id.to_string(),
    }
}

impl Drop for TaskSession {
    /// Dropped without leaving: stop timers and flush what we can in the background
    fn drop(&mut self) {
        if self.leaving.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.shutdown();
        if let Some(poll) = self.poll.get_mut().take() {
            poll.cancel.cancel();
        }

        let meta = {
            let mut slot = self.trial.lock();
            match slot.machine.abort() {
                Ok(progress) => Some(build_log_meta(
                    &self.participant,
                    &self.session_id,
                    &self.log,
                    &slot.machine,
                    TrialStatus::Aborted,
                    progress,
                )),
                Err(_) => None,
            }
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("[session] dropped outside a runtime; trial log not flushed");
            return;
        };
        let log = self.log.clone();
        let audio = self.audio.clone();
        handle.spawn(async move {
            if let Some(meta) = meta {
                log.flush(meta).await;
            }
            audio
                .stop_continuous_recording(TrialStatus::Aborted, true)
                .await;
        });
    }
}
