// Recorder attached to the mix graph

use std::sync::Arc;

use tokio::time::Instant;

use super::graph::{MixGraph, TapId};
use super::wav::encode_wav;
use super::AudioError;
use crate::audio_constants::MIX_SAMPLE_RATE;
use crate::events::epoch_ms;

/// Captured audio plus wall-clock bounds
#[derive(Debug, Clone)]
pub struct RecordedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Epoch ms
    pub start_ts: i64,
    pub end_ts: i64,
    pub duration_ms: u64,
}

impl RecordedAudio {
    /// Encode as 16-bit mono WAV
    pub fn to_wav(&self) -> Result<Vec<u8>, AudioError> {
        encode_wav(&self.samples, self.sample_rate)
    }
}

/// Records everything the graph mixes until finished
pub struct Recorder {
    graph: Arc<MixGraph>,
    tap: TapId,
    started: Instant,
    start_ts: i64,
}

impl Recorder {
    pub fn start(graph: Arc<MixGraph>) -> Self {
        let tap = graph.open_tap();
        Self {
            graph,
            tap,
            started: Instant::now(),
            start_ts: epoch_ms(),
        }
    }

    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    /// Samples captured so far
    pub fn captured(&self) -> usize {
        self.graph.tap_len(self.tap).unwrap_or(0)
    }

    /// Detach from the graph and return the recording
    pub fn finish(self) -> RecordedAudio {
        let samples = self.graph.close_tap(self.tap);
        let duration_ms = self.started.elapsed().as_millis() as u64;
        RecordedAudio {
            samples,
            sample_rate: MIX_SAMPLE_RATE,
            start_ts: self.start_ts,
            end_ts: self.start_ts + duration_ms as i64,
            duration_ms,
        }
    }
}
