// Collaborators a task session runs against, built from settings at startup

use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioOutput, MicrophoneSource};
use crate::config::AppConfig;
use crate::events::{LoggingEmitter, SessionEventEmitter};
use crate::relay::{EventRelay, HttpRelayClient, RelayError};
use crate::speech::{NoSpeechRecognizer, SpeechRecognizer};
use crate::upload::{ArtifactUploader, HttpUploader, UploadError};
use crate::info;

/// Errors building the production collaborators
#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// External collaborators a session needs
#[derive(Clone)]
pub struct SessionServices {
    pub relay: Arc<dyn EventRelay>,
    pub uploader: Arc<dyn ArtifactUploader>,
    pub microphone: Arc<dyn MicrophoneSource>,
    pub output: Arc<dyn AudioOutput>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub emitter: Arc<dyn SessionEventEmitter>,
}

impl SessionServices {
    /// HTTP relay and uploader against `relay.api_base`, the default audio
    /// devices, and a log-only emitter
    ///
    /// Without the `cpal` feature the microphone is absent and playback is
    /// discarded; trials still run and upload their logs. No recognizer
    /// backend is bundled, so speech capture reports itself unavailable.
    #[must_use = "this returns a Result that should be handled"]
    pub fn from_config(config: &AppConfig) -> Result<Self, ServicesError> {
        let relay = HttpRelayClient::from_config(&config.relay)?;
        let uploader = HttpUploader::new(
            config.relay.api_base.as_str(),
            Duration::from_millis(config.relay.request_timeout_ms),
        )?;
        let (microphone, output) = audio_devices();
        info!(
            "[session] services for room {} at {}",
            relay.room_id(),
            config.relay.api_base
        );

        Ok(Self {
            relay: Arc::new(relay),
            uploader: Arc::new(uploader),
            microphone,
            output,
            recognizer: Arc::new(NoSpeechRecognizer),
            emitter: Arc::new(LoggingEmitter),
        })
    }
}

#[cfg(feature = "cpal")]
fn audio_devices() -> (Arc<dyn MicrophoneSource>, Arc<dyn AudioOutput>) {
    use crate::audio::{CpalMicrophone, CpalOutput};
    (Arc::new(CpalMicrophone::new()), Arc::new(CpalOutput))
}

#[cfg(not(feature = "cpal"))]
fn audio_devices() -> (Arc<dyn MicrophoneSource>, Arc<dyn AudioOutput>) {
    use crate::audio::{NoMicrophone, NullOutput};
    crate::warn!("[session] built without the cpal feature; recording disabled");
    (Arc::new(NoMicrophone), Arc::new(NullOutput))
}
