// Audio capture: mixing graph, recorders, cue synthesis and the capture manager

use serde::Serialize;

mod graph;
pub use graph::{downmix, resample_linear, MixGraph, TapId};

mod manager;
pub use manager::{AudioCaptureManager, ClipRequest};

mod recorder;
pub use recorder::{RecordedAudio, Recorder};

mod source;
pub use source::{AudioOutput, MicrophoneSource, MicrophoneStream, NoMicrophone, NullOutput};

pub mod tone;
pub use tone::synthesize_cue;

pub mod wav;
pub use wav::{decode_wav_bytes, decode_wav_file, encode_wav};

#[cfg(feature = "cpal")]
mod cpal_backend;
#[cfg(feature = "cpal")]
pub use cpal_backend::{CpalMicrophone, CpalOutput};

#[cfg(test)]
#[path = "audio_test.rs"]
pub(crate) mod tests;

/// Errors that can occur in the audio side channel
///
/// None of these reach the participant; the manager logs them and carries on
/// without audio.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No audio input device available")]
    NoDevice,
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("WAV encoding error: {0}")]
    Encode(String),
    #[error("Prompt audio not found: {0}")]
    PromptNotFound(String),
    #[error("Failed to decode audio: {0}")]
    Decode(String),
}

/// Availability of the microphone and mix graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioStatus {
    /// Graph not built yet (or released by a hard stop)
    #[default]
    Idle,
    /// Microphone open and graph running
    Ready,
    /// Microphone could not be opened; recording is skipped
    Unavailable,
}
