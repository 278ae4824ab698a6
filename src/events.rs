// Session events for operator/display notification
// Defines event payloads and emission traits for testability

use serde::Serialize;

use crate::plan::Stimulus;
use crate::{debug, info};

/// Event names as constants for consistency
pub mod event_names {
    pub const TRIAL_STARTED: &str = "trial_started";
    pub const CLICK_FEEDBACK: &str = "click_feedback";
    pub const TRIAL_COMPLETED: &str = "trial_completed";
    pub const TRIAL_ABORTED: &str = "trial_aborted";
    pub const TRIGGER_FIRED: &str = "trigger_fired";
    pub const CUE_PLAYED: &str = "cue_played";
    pub const END_UNLOCKED: &str = "end_unlocked";
    pub const STIMULUS_SHOWN: &str = "stimulus_shown";
}

/// Payload for trial_started event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialStartedPayload {
    /// 0-based trial index within the session
    pub trial_index: u32,
    /// ISO 8601 timestamp when the operator pressed Start
    pub timestamp: String,
}

/// Payload for click_feedback event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClickFeedbackPayload {
    pub pressed: u32,
    pub correct: bool,
    pub next_expected: u32,
    pub miss_count: u32,
}

/// Payload for trial_completed event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialCompletedPayload {
    pub trial_index: u32,
    pub elapsed_ms: u64,
    pub miss_count: u32,
    /// Best time over history plus this trial
    pub best_ms: Option<u64>,
}

/// Payload for trial_aborted event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrialAbortedPayload {
    pub trial_index: u32,
    /// Numbers correctly pressed before leaving
    pub progress: u32,
}

/// Payload for trigger_fired event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFiredPayload {
    pub trial_index: u32,
    pub trigger_index: usize,
    /// Trial progress when the trigger fired
    pub count: u32,
}

/// Payload for cue_played event
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CuePlayedPayload {
    /// Running cue counter
    pub count: u32,
}

/// Payload for end_unlocked event
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndUnlockedPayload {
    /// ISO 8601 timestamp when finishing became allowed
    pub timestamp: String,
}

/// Payload for stimulus_shown event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StimulusShownPayload {
    /// Relay id of the trigger that caused this stimulus
    pub relay_id: u64,
    pub stimulus: Stimulus,
}

/// Trait for emitting task-side session events
/// Allows mocking in tests while logging in the CLI
pub trait SessionEventEmitter: Send + Sync {
    /// Emit trial_started event
    fn emit_trial_started(&self, payload: TrialStartedPayload);

    /// Emit click_feedback event
    fn emit_click_feedback(&self, payload: ClickFeedbackPayload);

    /// Emit trial_completed event
    fn emit_trial_completed(&self, payload: TrialCompletedPayload);

    /// Emit trial_aborted event
    fn emit_trial_aborted(&self, payload: TrialAbortedPayload);

    /// Emit trigger_fired event
    fn emit_trigger_fired(&self, payload: TriggerFiredPayload);

    /// Emit cue_played event
    fn emit_cue_played(&self, payload: CuePlayedPayload);

    /// Emit end_unlocked event
    fn emit_end_unlocked(&self, payload: EndUnlockedPayload);
}

/// Trait for emitting display-side events
pub trait ScreenEventEmitter: Send + Sync {
    /// Emit stimulus_shown event
    fn emit_stimulus_shown(&self, payload: StimulusShownPayload);
}

/// Emitter that writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEmitter;

impl SessionEventEmitter for LoggingEmitter {
    fn emit_trial_started(&self, payload: TrialStartedPayload) {
        info!("{}: {:?}", event_names::TRIAL_STARTED, payload);
    }

    fn emit_click_feedback(&self, payload: ClickFeedbackPayload) {
        debug!("{}: {:?}", event_names::CLICK_FEEDBACK, payload);
    }

    fn emit_trial_completed(&self, payload: TrialCompletedPayload) {
        info!("{}: {:?}", event_names::TRIAL_COMPLETED, payload);
    }

    fn emit_trial_aborted(&self, payload: TrialAbortedPayload) {
        info!("{}: {:?}", event_names::TRIAL_ABORTED, payload);
    }

    fn emit_trigger_fired(&self, payload: TriggerFiredPayload) {
        info!("{}: {:?}", event_names::TRIGGER_FIRED, payload);
    }

    fn emit_cue_played(&self, payload: CuePlayedPayload) {
        debug!("{}: {:?}", event_names::CUE_PLAYED, payload);
    }

    fn emit_end_unlocked(&self, payload: EndUnlockedPayload) {
        info!("{}: {:?}", event_names::END_UNLOCKED, payload);
    }
}

impl ScreenEventEmitter for LoggingEmitter {
    fn emit_stimulus_shown(&self, payload: StimulusShownPayload) {
        info!(
            "{}: #{} {} | {} ({:?}, emphasize {:?})",
            event_names::STIMULUS_SHOWN,
            payload.stimulus.index,
            payload.stimulus.left,
            payload.stimulus.right,
            payload.stimulus.kind,
            payload.stimulus.emphasize
        );
    }
}

/// Get the current timestamp in ISO 8601 format
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Milliseconds since the Unix epoch
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
#[path = "events_test.rs"]
pub(crate) mod tests;
