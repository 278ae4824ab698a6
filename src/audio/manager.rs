// Audio capture manager: session-scoped microphone, continuous and clip recorders
//
// Every operation here is best-effort. A missing microphone, a failed encode or
// a failed upload is logged and the task carries on.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::graph::MixGraph;
use super::recorder::{RecordedAudio, Recorder};
use super::source::{AudioOutput, MicrophoneSource, MicrophoneStream};
use super::tone::synthesize_cue;
use super::wav::decode_wav_file;
use super::{AudioError, AudioStatus};
use crate::audio_constants::MIX_SAMPLE_RATE;
use crate::config::AudioConfig;
use crate::upload::{ArtifactUploader, AudioUploadMeta, ClipUploadMeta, TrialStatus};
use crate::{debug, info, warn};

const WAV_MIME: &str = "audio/wav";

/// A prompt-response clip to record
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub participant: String,
    /// Plan index of the trigger that armed the clip
    pub index: usize,
    pub prompt_id: Option<String>,
    pub window: Duration,
}

struct ContinuousRecording {
    recorder: Recorder,
    participant: String,
    trial_index: u32,
}

#[derive(Default)]
struct GraphState {
    graph: Option<Arc<MixGraph>>,
    stream: Option<Box<dyn MicrophoneStream>>,
    status: AudioStatus,
    continuous: Option<ContinuousRecording>,
}

struct ClipSlot {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the microphone, the mix graph and both recorders for one session
///
/// The microphone is opened lazily by [`ensure_graph`](Self::ensure_graph)
/// and kept across trials; only a hard stop releases it.
pub struct AudioCaptureManager {
    source: Arc<dyn MicrophoneSource>,
    output: Arc<dyn AudioOutput>,
    uploader: Arc<dyn ArtifactUploader>,
    prompt_dir: PathBuf,
    enabled: bool,
    state: Mutex<GraphState>,
    clip_busy: Arc<AtomicBool>,
    clip: Mutex<Option<ClipSlot>>,
    prompts: Mutex<HashMap<String, Arc<Vec<f32>>>>,
    cue: Vec<f32>,
}

impl AudioCaptureManager {
    pub fn new(
        source: Arc<dyn MicrophoneSource>,
        output: Arc<dyn AudioOutput>,
        uploader: Arc<dyn ArtifactUploader>,
        config: &AudioConfig,
    ) -> Self {
        Self {
            source,
            output,
            uploader,
            prompt_dir: config.prompt_dir.clone(),
            enabled: config.enabled,
            state: Mutex::new(GraphState::default()),
            clip_busy: Arc::new(AtomicBool::new(false)),
            clip: Mutex::new(None),
            prompts: Mutex::new(HashMap::new()),
            cue: synthesize_cue(MIX_SAMPLE_RATE),
        }
    }

    pub fn status(&self) -> AudioStatus {
        self.state.lock().status
    }

    /// Open the microphone and build the graph once; reuse it afterwards
    ///
    /// Returns None (and marks audio unavailable) when the microphone cannot
    /// be opened. A later call tries again.
    pub fn ensure_graph(&self) -> Option<Arc<MixGraph>> {
        if !self.enabled {
            return None;
        }
        let mut state = self.state.lock();
        if let Some(graph) = &state.graph {
            return Some(graph.clone());
        }

        let graph = Arc::new(MixGraph::new());
        match self.source.open(graph.clone()) {
            Ok(stream) => {
                info!("[audio] microphone opened, mix graph ready");
                state.stream = Some(stream);
                state.graph = Some(graph.clone());
                state.status = AudioStatus::Ready;
                Some(graph)
            }
            Err(e) => {
                warn!("[audio] continuing without audio: {}", e);
                state.status = AudioStatus::Unavailable;
                None
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().continuous.is_some()
    }

    /// Start the per-trial recorder; no-op if one is already running
    pub fn start_continuous_recording(&self, participant: &str, trial_index: u32) -> bool {
        if self.is_recording() {
            debug!("[audio] continuous recording already active");
            return false;
        }
        let Some(graph) = self.ensure_graph() else {
            return false;
        };

        let mut state = self.state.lock();
        if state.continuous.is_some() {
            return false;
        }
        state.continuous = Some(ContinuousRecording {
            recorder: Recorder::start(graph),
            participant: participant.to_string(),
            trial_index,
        });
        info!(
            "[audio] continuous recording started for trial {}",
            trial_index + 1
        );
        true
    }

    /// Stop the per-trial recorder and wait for its upload
    ///
    /// `hard` also cancels any clip and releases the microphone and graph.
    pub async fn stop_continuous_recording(&self, status: TrialStatus, hard: bool) {
        let active = self.state.lock().continuous.take();
        if let Some(active) = active {
            let audio = active.recorder.finish();
            self.upload_trial_audio(audio, &active.participant, active.trial_index, status)
                .await;
        }
        if hard {
            self.release().await;
        }
    }

    async fn upload_trial_audio(
        &self,
        audio: RecordedAudio,
        participant: &str,
        trial_index: u32,
        status: TrialStatus,
    ) {
        let wav = match audio.to_wav() {
            Ok(wav) => wav,
            Err(e) => {
                warn!("[audio] skipping upload for trial {}: {}", trial_index + 1, e);
                return;
            }
        };
        let meta = AudioUploadMeta {
            participant: participant.to_string(),
            trial_no: trial_index + 1,
            status,
            start_ts: audio.start_ts,
            end_ts: audio.end_ts,
            duration_ms: audio.duration_ms,
            mime_type: WAV_MIME.to_string(),
        };
        match self.uploader.upload_trial_audio(wav, meta).await {
            Ok(receipt) => info!("[audio] trial audio stored as {}", receipt.file),
            Err(e) => warn!("[audio] trial audio upload failed: {}", e),
        }
    }

    pub fn is_clip_busy(&self) -> bool {
        self.clip_busy.load(Ordering::SeqCst)
    }

    /// Record a clip on the shared graph; it stops itself after the window
    ///
    /// Returns false without side effects if a clip is already recording or
    /// the microphone is unavailable.
    pub fn record_clip(&self, request: ClipRequest) -> bool {
        if self
            .clip_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(
                "[audio] clip already recording; ignoring clip for index {}",
                request.index
            );
            return false;
        }
        let Some(graph) = self.ensure_graph() else {
            self.clip_busy.store(false, Ordering::SeqCst);
            return false;
        };

        let recorder = Recorder::start(graph);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let busy = self.clip_busy.clone();
        let uploader = self.uploader.clone();
        debug!(
            "[audio] clip started for index {} ({:?})",
            request.index, request.prompt_id
        );

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(request.window) => {}
                _ = token.cancelled() => {
                    debug!("[audio] clip for index {} cut short", request.index);
                }
            }
            let audio = recorder.finish();
            busy.store(false, Ordering::SeqCst);
            upload_clip(uploader.as_ref(), audio, request).await;
        });

        *self.clip.lock() = Some(ClipSlot { cancel, task });
        true
    }

    /// True until the last clip has finished recording and uploading
    pub fn has_clip_in_flight(&self) -> bool {
        self.clip
            .lock()
            .as_ref()
            .is_some_and(|slot| !slot.task.is_finished())
    }

    /// Finalize a running clip now; it is still uploaded
    pub fn cancel_clip(&self) {
        if let Some(slot) = self.clip.lock().as_ref() {
            slot.cancel.cancel();
        }
    }

    /// Wait for the last clip to finish and upload
    pub async fn wait_for_clip(&self) {
        let slot = self.clip.lock().take();
        if let Some(slot) = slot {
            if let Err(e) = slot.task.await {
                warn!("[audio] clip task failed: {}", e);
            }
        }
    }

    /// Play the cue tone on the output and into the recording
    pub fn play_cue(&self) {
        if let Err(e) = self.output.play(&self.cue, MIX_SAMPLE_RATE) {
            warn!("[audio] cue playback failed: {}", e);
        }
        let graph = self.state.lock().graph.clone();
        if let Some(graph) = graph {
            graph.queue_synth(&self.cue);
        }
    }

    /// Play `<prompt_dir>/<prompt_id>.wav` on the output and into the recording
    pub fn play_prompt(&self, prompt_id: &str) -> Result<(), AudioError> {
        let samples = self.load_prompt(prompt_id)?;
        if let Err(e) = self.output.play(&samples, MIX_SAMPLE_RATE) {
            warn!("[audio] prompt playback failed: {}", e);
        }
        let graph = self.state.lock().graph.clone();
        if let Some(graph) = graph {
            graph.queue_synth(&samples);
        }
        Ok(())
    }

    fn load_prompt(&self, prompt_id: &str) -> Result<Arc<Vec<f32>>, AudioError> {
        if let Some(samples) = self.prompts.lock().get(prompt_id) {
            return Ok(samples.clone());
        }
        if prompt_id.is_empty() || prompt_id.contains(['/', '\\']) || prompt_id.contains("..") {
            return Err(AudioError::PromptNotFound(prompt_id.to_string()));
        }

        let path = self.prompt_dir.join(format!("{}.wav", prompt_id));
        let samples = Arc::new(decode_wav_file(&path)?);
        self.prompts
            .lock()
            .insert(prompt_id.to_string(), samples.clone());
        Ok(samples)
    }

    /// Cancel any clip, wait for its upload, then close the microphone
    pub async fn release(&self) {
        self.cancel_clip();
        self.wait_for_clip().await;

        let stream = {
            let mut state = self.state.lock();
            state.graph = None;
            state.status = AudioStatus::Idle;
            state.stream.take()
        };
        if let Some(mut stream) = stream {
            stream.close();
            info!("[audio] microphone released");
        }
    }
}

async fn upload_clip(uploader: &dyn ArtifactUploader, audio: RecordedAudio, request: ClipRequest) {
    let wav = match audio.to_wav() {
        Ok(wav) => wav,
        Err(e) => {
            warn!("[audio] skipping clip {} upload: {}", request.index, e);
            return;
        }
    };
    let meta = ClipUploadMeta {
        participant: request.participant,
        index: request.index,
        question: request.prompt_id,
        start_ts: audio.start_ts,
        end_ts: audio.end_ts,
        duration_ms: audio.duration_ms,
        mime_type: WAV_MIME.to_string(),
    };
    match uploader.upload_clip(wav, meta).await {
        Ok(receipt) => info!("[audio] clip stored as {}", receipt.file),
        Err(e) => warn!("[audio] clip upload failed: {}", e),
    }
}
