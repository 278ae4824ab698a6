use super::*;
use crate::trial::GridPosition;
use crate::upload::tests::{sample_log_meta, MockUploader};
use crate::upload::TrialStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn aggregator() -> (Arc<SessionLogAggregator>, MockUploader) {
    let mock = MockUploader::new();
    let log = Arc::new(SessionLogAggregator::new(Arc::new(mock.clone())));
    (log, mock)
}

fn click(pressed: u32, expected: u32) -> LogEntry {
    LogEntry::Click {
        pressed,
        expected,
        is_correct: pressed == expected,
        position: Some(GridPosition { x: 0, y: 1 }),
    }
}

#[test]
fn test_events_before_trial_zero_are_dropped() {
    let (log, _) = aggregator();
    assert!(log.record(click(1, 1), Instant::now()).is_none());
    assert!(log.events().is_empty());
}

#[test]
fn test_events_are_stamped_relative_to_trial_zero() {
    let (log, _) = aggregator();
    let t0 = Instant::now();
    log.begin_trial(t0);

    log.record(click(1, 1), t0 + Duration::from_millis(250));
    log.record(LogEntry::Beep { count: 1 }, t0 + Duration::from_millis(1_250));

    let times: Vec<u64> = log.events().iter().map(|e| e.relative_time_ms()).collect();
    assert_eq!(times, vec![250, 1_250]);
}

#[test]
fn test_event_earlier_than_zero_clamps_to_zero() {
    let (log, _) = aggregator();
    let t0 = Instant::now() + Duration::from_secs(1);
    log.begin_trial(t0);
    let event = log.record(LogEntry::Beep { count: 1 }, Instant::now()).unwrap();
    assert_eq!(event.relative_time_ms(), 0);
}

#[test]
fn test_text_events_go_to_separate_stream_with_sequence_ids() {
    let (log, _) = aggregator();
    let t0 = Instant::now();
    log.begin_trial(t0);

    log.record(click(2, 1), t0);
    for text in ["twenty-seven", "nineteen"] {
        log.record(
            LogEntry::Text {
                transcript: text.to_string(),
            },
            t0,
        );
    }

    assert_eq!(log.events().len(), 1);
    let ids: Vec<u32> = log
        .texts()
        .iter()
        .map(|e| match e {
            LogEvent::Text { sequence_id, .. } => *sequence_id,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_log_event_wire_shape() {
    let event = LogEvent::TriggerSent {
        trigger_index: 4,
        count: 5,
        relative_time_ms: 28_000,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "triggerSent");
    assert_eq!(json["triggerIndex"], 4);
    assert_eq!(json["relativeTimeMs"], 28_000);

    let event = LogEvent::Click {
        pressed: 3,
        expected: 2,
        is_correct: false,
        relative_time_ms: 10,
        position: Some(GridPosition { x: 2, y: 0 }),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "click");
    assert_eq!(json["isCorrect"], false);
    assert_eq!(json["position"]["x"], 2);
}

#[tokio::test]
async fn test_flush_uploads_task_and_text_logs_once() {
    let (log, mock) = aggregator();
    let t0 = Instant::now();
    log.begin_trial(t0);
    log.record(click(1, 1), t0);
    log.record(
        LogEntry::Text {
            transcript: "eight".to_string(),
        },
        t0,
    );

    let outcome = log.flush(sample_log_meta()).await;
    assert_eq!(
        outcome,
        FlushOutcome::Flushed {
            task_log: true,
            text_log: true
        }
    );
    assert_eq!(log.flush(sample_log_meta()).await, FlushOutcome::AlreadyFlushed);

    let task_logs = mock.task_logs();
    assert_eq!(task_logs.len(), 1);
    assert_eq!(task_logs[0].1["events"].as_array().unwrap().len(), 1);
    assert_eq!(task_logs[0].1["meta"]["status"], "aborted");
    assert_eq!(task_logs[0].1["meta"]["progress"], 3);

    let text_logs = mock.text_logs();
    assert_eq!(text_logs.len(), 1);
    assert_eq!(text_logs[0].1["texts"][0]["transcript"], "eight");
}

/// Completion and abandonment racing for the same trial upload once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_flushes_upload_once() {
    let mock = MockUploader::with_delay(Duration::from_millis(20));
    let log = Arc::new(SessionLogAggregator::new(Arc::new(mock.clone())));
    log.begin_trial(Instant::now());

    let mut handles = Vec::new();
    for status in [TrialStatus::Completed, TrialStatus::Aborted, TrialStatus::Aborted] {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            let mut meta = sample_log_meta();
            meta.status = status;
            log.flush(meta).await
        }));
    }

    let mut flushed = 0;
    for handle in handles {
        if let FlushOutcome::Flushed { .. } = handle.await.unwrap() {
            flushed += 1;
        }
    }
    assert_eq!(flushed, 1);
    assert_eq!(mock.task_logs().len(), 1);
    assert_eq!(mock.text_logs().len(), 1);
}

#[tokio::test]
async fn test_failed_upload_still_consumes_guard() {
    let mock = MockUploader::failing();
    let log = SessionLogAggregator::new(Arc::new(mock.clone()));
    log.begin_trial(Instant::now());

    let outcome = log.flush(sample_log_meta()).await;
    assert_eq!(
        outcome,
        FlushOutcome::Flushed {
            task_log: false,
            text_log: false
        }
    );
    assert!(log.is_flushed());
    assert_eq!(log.flush(sample_log_meta()).await, FlushOutcome::AlreadyFlushed);
    assert_eq!(mock.task_logs().len(), 1);
}

#[tokio::test]
async fn test_reset_clears_state_and_rearms_flush() {
    let (log, mock) = aggregator();
    let t0 = Instant::now();
    log.begin_trial(t0);
    log.record(click(1, 1), t0);
    log.record(
        LogEntry::Text {
            transcript: "x".to_string(),
        },
        t0,
    );
    log.flush(sample_log_meta()).await;

    log.reset();
    assert!(!log.is_flushed());
    assert!(log.events().is_empty());
    assert!(log.texts().is_empty());
    assert!(log.trial_zero().is_none());
    assert!(log.record(click(1, 1), t0).is_none());

    log.begin_trial(t0);
    let event = log
        .record(
            LogEntry::Text {
                transcript: "y".to_string(),
            },
            t0,
        )
        .unwrap();
    assert!(matches!(event, LogEvent::Text { sequence_id: 1, .. }));

    log.flush(sample_log_meta()).await;
    assert_eq!(mock.task_logs().len(), 2);
}

#[tokio::test]
async fn test_records_after_upload_are_refused() {
    let (log, mock) = aggregator();
    let t0 = Instant::now();
    log.begin_trial(t0);
    log.record(click(1, 1), t0);
    log.flush(sample_log_meta()).await;

    assert!(log.record(LogEntry::Beep { count: 1 }, t0).is_none());
    assert!(log
        .record(
            LogEntry::Text {
                transcript: "late".to_string(),
            },
            t0,
        )
        .is_none());
    assert_eq!(log.events().len(), 1);
    assert!(log.texts().is_empty());
    assert_eq!(mock.task_logs()[0].1["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_claim_keeps_recording_until_upload() {
    let (log, mock) = aggregator();
    let t0 = Instant::now();
    log.begin_trial(t0);
    log.record(click(1, 1), t0);

    let claim = log.claim().unwrap();
    assert!(log.is_flushed());
    // A second claimant loses even before the first uploads
    assert!(log.claim().is_none());
    assert_eq!(log.flush(sample_log_meta()).await, FlushOutcome::AlreadyFlushed);

    log.record(LogEntry::Beep { count: 1 }, t0 + Duration::from_millis(900));
    claim.upload(sample_log_meta()).await;

    let task_logs = mock.task_logs();
    assert_eq!(task_logs.len(), 1);
    let kinds: Vec<&str> = task_logs[0].1["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["click", "beep"]);
}
