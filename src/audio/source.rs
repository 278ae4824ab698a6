// Microphone and output device seams

use std::sync::Arc;

use super::graph::MixGraph;
use super::AudioError;

/// Opens the microphone and feeds it into the mix graph
/// Allows mocking in tests while using cpal in production
pub trait MicrophoneSource: Send + Sync {
    /// Start delivering mono chunks at the mix rate to `graph.push_mic`
    fn open(&self, graph: Arc<MixGraph>) -> Result<Box<dyn MicrophoneStream>, AudioError>;
}

/// Live microphone stream; capture stops on `close` or drop
pub trait MicrophoneStream: Send {
    fn close(&mut self);
}

/// Plays synthesized or decoded audio on the output device
pub trait AudioOutput: Send + Sync {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<(), AudioError>;
}

/// Source used when no capture backend is compiled in or audio is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMicrophone;

impl MicrophoneSource for NoMicrophone {
    fn open(&self, _graph: Arc<MixGraph>) -> Result<Box<dyn MicrophoneStream>, AudioError> {
        Err(AudioError::NoDevice)
    }
}

/// Output that discards audio
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn play(&self, _samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
        Ok(())
    }
}
