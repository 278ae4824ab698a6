// Persistent mixing graph: microphone + synthesized sounds -> recorder taps

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::audio_constants::{MAX_RECORDING_SAMPLES, MIC_GAIN, SYNTH_GAIN};
use crate::warn;

/// Handle to one recorder attached to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapId(u64);

struct Tap {
    id: TapId,
    samples: Vec<f32>,
    overflow_warned: bool,
}

#[derive(Default)]
struct GraphInner {
    /// Synthesized samples waiting to be mixed into the next mic chunks
    synth: VecDeque<f32>,
    taps: Vec<Tap>,
    next_tap: u64,
}

/// Mix destination shared by the continuous and clip recorders
///
/// The microphone drives the clock: every pushed mic chunk is mixed with the
/// same number of pending synth samples and appended to every open tap. Synth
/// audio queued while no mic is running is simply held until it is.
#[derive(Default)]
pub struct MixGraph {
    inner: Mutex<GraphInner>,
}

impl MixGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mix one mic chunk with pending synth audio and feed every tap
    pub fn push_mic(&self, mic: &[f32]) {
        let mut inner = self.inner.lock();
        let mixed: Vec<f32> = mic
            .iter()
            .map(|&m| {
                let synth = inner.synth.pop_front().unwrap_or(0.0);
                (m * MIC_GAIN + synth * SYNTH_GAIN).clamp(-1.0, 1.0)
            })
            .collect();

        for tap in inner.taps.iter_mut() {
            let room = MAX_RECORDING_SAMPLES.saturating_sub(tap.samples.len());
            if room < mixed.len() && !tap.overflow_warned {
                warn!("Recording {:?} reached its size limit; dropping samples", tap.id);
                tap.overflow_warned = true;
            }
            tap.samples
                .extend_from_slice(&mixed[..room.min(mixed.len())]);
        }
    }

    /// Queue synthesized audio; overlaps with still-pending audio are summed
    pub fn queue_synth(&self, samples: &[f32]) {
        let mut inner = self.inner.lock();
        let overlap = inner.synth.len().min(samples.len());
        for (pending, &s) in inner.synth.iter_mut().zip(samples.iter()) {
            *pending += s;
        }
        inner.synth.extend(samples[overlap..].iter().copied());
    }

    /// Synth samples not yet mixed
    pub fn pending_synth(&self) -> usize {
        self.inner.lock().synth.len()
    }

    /// Attach a new recorder
    pub fn open_tap(&self) -> TapId {
        let mut inner = self.inner.lock();
        inner.next_tap += 1;
        let id = TapId(inner.next_tap);
        inner.taps.push(Tap {
            id,
            samples: Vec::new(),
            overflow_warned: false,
        });
        id
    }

    /// Detach a recorder and return everything it captured
    pub fn close_tap(&self, id: TapId) -> Vec<f32> {
        let mut inner = self.inner.lock();
        match inner.taps.iter().position(|t| t.id == id) {
            Some(pos) => inner.taps.swap_remove(pos).samples,
            None => Vec::new(),
        }
    }

    pub fn tap_len(&self, id: TapId) -> Option<usize> {
        self.inner
            .lock()
            .taps
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.samples.len())
    }

    pub fn open_taps(&self) -> usize {
        self.inner.lock().taps.len()
    }
}

/// Linear resampling to bring device or file audio to the mix rate
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Average interleaved channels down to mono
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
