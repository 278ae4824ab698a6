// Log event types recorded during a trial

use serde::Serialize;

use crate::trial::GridPosition;
use crate::upload::LogUploadMeta;

/// Event as handed to the aggregator, before it is stamped
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    Click {
        pressed: u32,
        expected: u32,
        is_correct: bool,
        position: Option<GridPosition>,
    },
    /// Audible cue played; `count` is the running cue counter
    Beep { count: u32 },
    TriggerSent { trigger_index: usize, count: u32 },
    /// Final speech utterance
    Text { transcript: String },
}

/// Stamped event, relative to the trial's Start instant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogEvent {
    #[serde(rename_all = "camelCase")]
    Click {
        pressed: u32,
        expected: u32,
        is_correct: bool,
        relative_time_ms: u64,
        position: Option<GridPosition>,
    },
    #[serde(rename_all = "camelCase")]
    Beep { relative_time_ms: u64, count: u32 },
    #[serde(rename_all = "camelCase")]
    TriggerSent {
        trigger_index: usize,
        count: u32,
        relative_time_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        transcript: String,
        relative_time_ms: u64,
        sequence_id: u32,
    },
}

impl LogEvent {
    pub fn relative_time_ms(&self) -> u64 {
        match self {
            LogEvent::Click {
                relative_time_ms, ..
            }
            | LogEvent::Beep {
                relative_time_ms, ..
            }
            | LogEvent::TriggerSent {
                relative_time_ms, ..
            }
            | LogEvent::Text {
                relative_time_ms, ..
            } => *relative_time_ms,
        }
    }

    pub(super) fn stamp(entry: LogEntry, relative_time_ms: u64, sequence_id: u32) -> Self {
        match entry {
            LogEntry::Click {
                pressed,
                expected,
                is_correct,
                position,
            } => LogEvent::Click {
                pressed,
                expected,
                is_correct,
                relative_time_ms,
                position,
            },
            LogEntry::Beep { count } => LogEvent::Beep {
                relative_time_ms,
                count,
            },
            LogEntry::TriggerSent {
                trigger_index,
                count,
            } => LogEvent::TriggerSent {
                trigger_index,
                count,
                relative_time_ms,
            },
            LogEntry::Text { transcript } => LogEvent::Text {
                transcript,
                relative_time_ms,
                sequence_id,
            },
        }
    }
}

/// Body of the task log artifact
#[derive(Debug, Serialize)]
pub struct TaskLogEnvelope<'a> {
    pub meta: &'a LogUploadMeta,
    pub events: &'a [LogEvent],
}

/// Body of the speech log artifact
#[derive(Debug, Serialize)]
pub struct TextLogEnvelope<'a> {
    pub meta: &'a LogUploadMeta,
    pub texts: &'a [LogEvent],
}
