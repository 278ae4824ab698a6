// Speech capture: continuous recognizer feeding final utterances into the log

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

mod adapter;
pub use adapter::SpeechCaptureAdapter;

#[cfg(test)]
#[path = "speech_test.rs"]
pub(crate) mod tests;

/// Errors from speech recognizer backends
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech recognition unavailable: {0}")]
    Unavailable(String),
    #[error("Speech recognition session failed: {0}")]
    Session(String),
}

/// One result from a recognition session
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Partial hypothesis; ignored
    Interim(String),
    /// Final utterance
    Final(String),
    /// The backend closed the session
    Ended,
}

/// Capture state as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SpeechStatus {
    #[default]
    Idle,
    Listening,
    /// Recognizer could not start; no speech is captured this session
    Unavailable,
}

/// Continuous speech-to-text backend
/// Allows mocking in tests while leaving the platform recognizer pluggable
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Open a recognition session; results stream until `Ended` or the channel closes
    async fn start(&self) -> Result<mpsc::Receiver<RecognitionEvent>, SpeechError>;
}

/// Recognizer used when no speech backend is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeechRecognizer;

#[async_trait]
impl SpeechRecognizer for NoSpeechRecognizer {
    async fn start(&self) -> Result<mpsc::Receiver<RecognitionEvent>, SpeechError> {
        Err(SpeechError::Unavailable(
            "no speech recognizer configured".to_string(),
        ))
    }
}
