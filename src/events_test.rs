use super::*;
use crate::plan::StimulusPlan;
use std::sync::{Arc, Mutex};

/// Mock emitter that records all emitted events for testing
#[derive(Default, Clone)]
pub struct MockEventEmitter {
    pub started_events: Arc<Mutex<Vec<TrialStartedPayload>>>,
    pub click_events: Arc<Mutex<Vec<ClickFeedbackPayload>>>,
    pub completed_events: Arc<Mutex<Vec<TrialCompletedPayload>>>,
    pub aborted_events: Arc<Mutex<Vec<TrialAbortedPayload>>>,
    pub trigger_events: Arc<Mutex<Vec<TriggerFiredPayload>>>,
    pub cue_events: Arc<Mutex<Vec<CuePlayedPayload>>>,
    pub end_unlocked_events: Arc<Mutex<Vec<EndUnlockedPayload>>>,
    pub stimulus_events: Arc<Mutex<Vec<StimulusShownPayload>>>,
}

impl MockEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionEventEmitter for MockEventEmitter {
    fn emit_trial_started(&self, payload: TrialStartedPayload) {
        self.started_events.lock().unwrap().push(payload);
    }

    fn emit_click_feedback(&self, payload: ClickFeedbackPayload) {
        self.click_events.lock().unwrap().push(payload);
    }

    fn emit_trial_completed(&self, payload: TrialCompletedPayload) {
        self.completed_events.lock().unwrap().push(payload);
    }

    fn emit_trial_aborted(&self, payload: TrialAbortedPayload) {
        self.aborted_events.lock().unwrap().push(payload);
    }

    fn emit_trigger_fired(&self, payload: TriggerFiredPayload) {
        self.trigger_events.lock().unwrap().push(payload);
    }

    fn emit_cue_played(&self, payload: CuePlayedPayload) {
        self.cue_events.lock().unwrap().push(payload);
    }

    fn emit_end_unlocked(&self, payload: EndUnlockedPayload) {
        self.end_unlocked_events.lock().unwrap().push(payload);
    }
}

impl ScreenEventEmitter for MockEventEmitter {
    fn emit_stimulus_shown(&self, payload: StimulusShownPayload) {
        self.stimulus_events.lock().unwrap().push(payload);
    }
}

#[test]
fn test_current_timestamp_is_iso8601() {
    let timestamp = current_timestamp();
    assert!(timestamp.contains("T"));
    assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
}

#[test]
fn test_epoch_ms_is_recent() {
    // 2023-11-14 in epoch ms; any sane clock is past this
    assert!(epoch_ms() > 1_700_000_000_000);
}

// Verify serde camelCase rename works (smoke test for payloads)
#[test]
fn test_serde_camel_case_rename() {
    let payload = TriggerFiredPayload {
        trial_index: 1,
        trigger_index: 4,
        count: 5,
    };
    let json = serde_json::to_string(&payload).unwrap();
    assert!(json.contains("trialIndex"));
    assert!(json.contains("triggerIndex"));
    assert!(!json.contains("trigger_index"));

    let payload = TrialCompletedPayload {
        trial_index: 0,
        elapsed_ms: 9_000,
        miss_count: 1,
        best_ms: Some(8_000),
    };
    let json = serde_json::to_string(&payload).unwrap();
    assert!(json.contains("elapsedMs"));
    assert!(json.contains("bestMs"));
}

#[test]
fn test_stimulus_payload_embeds_stimulus() {
    let stimulus = StimulusPlan::default().get(0).cloned().unwrap();
    let payload = StimulusShownPayload {
        relay_id: 12,
        stimulus,
    };
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["relayId"], 12);
    assert_eq!(json["stimulus"]["left"], "GH");
}

// MockEmitter tests - verify the mock infrastructure works correctly
#[test]
fn test_mock_emitter_records_session_events() {
    let emitter = MockEventEmitter::new();

    emitter.emit_trial_started(TrialStartedPayload {
        trial_index: 0,
        timestamp: "2025-01-01T12:00:00Z".to_string(),
    });
    emitter.emit_cue_played(CuePlayedPayload { count: 1 });
    emitter.emit_end_unlocked(EndUnlockedPayload {
        timestamp: "2025-01-01T12:10:00Z".to_string(),
    });

    assert_eq!(emitter.started_events.lock().unwrap().len(), 1);
    assert_eq!(emitter.cue_events.lock().unwrap()[0].count, 1);
    assert_eq!(emitter.end_unlocked_events.lock().unwrap().len(), 1);
}

#[test]
fn test_logging_emitter_accepts_all_events() {
    let emitter = LoggingEmitter;
    emitter.emit_click_feedback(ClickFeedbackPayload {
        pressed: 2,
        correct: false,
        next_expected: 1,
        miss_count: 1,
    });
    emitter.emit_stimulus_shown(StimulusShownPayload {
        relay_id: 1,
        stimulus: StimulusPlan::default().get(1).cloned().unwrap(),
    });
}
