use super::*;
use crate::audio_constants::{
    CAPTURE_CHUNK_MS, CUE_DURATION_MS, CUE_GAIN, CUE_TAIL_MS, MIX_SAMPLE_RATE, SAMPLES_PER_MS,
};
use crate::config::AudioConfig;
use crate::upload::tests::MockUploader;
use crate::upload::TrialStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Microphone that pushes a constant level every capture chunk until closed
#[derive(Default, Clone)]
pub struct ToneMicrophone {
    pub level: f32,
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl ToneMicrophone {
    pub fn new(level: f32) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }
}

struct ToneStream {
    stop: CancellationToken,
    closed: Arc<AtomicUsize>,
}

impl MicrophoneStream for ToneStream {
    fn close(&mut self) {
        if !self.stop.is_cancelled() {
            self.stop.cancel();
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl MicrophoneSource for ToneMicrophone {
    fn open(&self, graph: Arc<MixGraph>) -> Result<Box<dyn MicrophoneStream>, AudioError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let stop = CancellationToken::new();
        let token = stop.clone();
        let chunk = vec![self.level; CAPTURE_CHUNK_MS as usize * SAMPLES_PER_MS];
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(CAPTURE_CHUNK_MS as u64));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => graph.push_mic(&chunk),
                }
            }
        });
        Ok(Box::new(ToneStream {
            stop,
            closed: self.closed.clone(),
        }))
    }
}

/// Microphone whose permission is always refused
pub struct FailingMicrophone;

impl MicrophoneSource for FailingMicrophone {
    fn open(&self, _graph: Arc<MixGraph>) -> Result<Box<dyn MicrophoneStream>, AudioError> {
        Err(AudioError::PermissionDenied("denied in test".to_string()))
    }
}

/// Output that records the length of every played sound
#[derive(Default, Clone)]
pub struct MockOutput {
    pub played: Arc<Mutex<Vec<usize>>>,
}

impl MockOutput {
    pub fn played(&self) -> Vec<usize> {
        self.played.lock().unwrap().clone()
    }
}

impl AudioOutput for MockOutput {
    fn play(&self, samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
        self.played.lock().unwrap().push(samples.len());
        Ok(())
    }
}

fn manager_with(
    source: Arc<dyn MicrophoneSource>,
    output: MockOutput,
    uploader: MockUploader,
    prompt_dir: std::path::PathBuf,
) -> AudioCaptureManager {
    let config = AudioConfig {
        enabled: true,
        prompt_dir,
    };
    AudioCaptureManager::new(source, Arc::new(output), Arc::new(uploader), &config)
}

fn clip_request(index: usize, window: Duration) -> ClipRequest {
    ClipRequest {
        participant: "P01".to_string(),
        index,
        prompt_id: Some("q1".to_string()),
        window,
    }
}

// ---------------------------------------------------------------------------
// Graph, tone and WAV
// ---------------------------------------------------------------------------

#[test]
fn test_graph_mixes_synth_into_every_tap() {
    let graph = MixGraph::new();
    let a = graph.open_tap();
    let b = graph.open_tap();

    graph.queue_synth(&[0.5, 0.5]);
    graph.push_mic(&[0.1, 0.1, 0.1]);

    let a_samples = graph.close_tap(a);
    assert_eq!(a_samples.len(), 3);
    assert!((a_samples[0] - 0.6).abs() < 1e-6);
    assert!((a_samples[2] - 0.1).abs() < 1e-6);
    assert_eq!(graph.tap_len(b), Some(3));
    assert_eq!(graph.pending_synth(), 0);
}

#[test]
fn test_graph_sums_overlapping_synth_and_clamps() {
    let graph = MixGraph::new();
    let tap = graph.open_tap();
    graph.queue_synth(&[0.6, 0.6]);
    graph.queue_synth(&[0.6]);
    graph.push_mic(&[0.0, 0.0]);

    let samples = graph.close_tap(tap);
    assert_eq!(samples, vec![1.0, 0.6]);
}

#[test]
fn test_closed_tap_stops_receiving() {
    let graph = MixGraph::new();
    let tap = graph.open_tap();
    graph.push_mic(&[0.1; 4]);
    assert_eq!(graph.close_tap(tap).len(), 4);
    graph.push_mic(&[0.1; 4]);
    assert_eq!(graph.tap_len(tap), None);
    assert_eq!(graph.open_taps(), 0);
}

#[test]
fn test_resample_and_downmix() {
    let halved = resample_linear(&[0.0, 1.0, 0.0, 1.0], 96_000, 48_000);
    assert_eq!(halved.len(), 2);
    assert_eq!(downmix(&[0.2, 0.4, 1.0, 0.0], 2), vec![0.3, 0.5]);
    assert_eq!(downmix(&[0.2, 0.4], 1), vec![0.2, 0.4]);
}

#[test]
fn test_cue_shape() {
    let cue = synthesize_cue(MIX_SAMPLE_RATE);
    assert_eq!(
        cue.len(),
        ((CUE_DURATION_MS + CUE_TAIL_MS) as usize) * SAMPLES_PER_MS
    );
    let peak = cue.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak <= CUE_GAIN + 1e-4);
    assert!(peak > CUE_GAIN * 0.5);
    // Starts and ends near silence
    assert!(cue[0].abs() < 1e-3);
    assert!(cue.last().unwrap().abs() < 1e-3);
}

#[test]
fn test_wav_encode_decode() {
    let samples: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0) - 0.5).collect();
    let wav = encode_wav(&samples, MIX_SAMPLE_RATE).unwrap();
    assert_eq!(&wav[0..4], b"RIFF");

    let decoded = decode_wav_bytes(&wav).unwrap();
    assert_eq!(decoded.len(), samples.len());
    assert!((decoded[100] - samples[100]).abs() < 1e-3);
}

#[test]
fn test_wav_rejects_empty_and_nan() {
    assert!(matches!(encode_wav(&[], MIX_SAMPLE_RATE), Err(AudioError::Encode(_))));
    assert!(matches!(
        encode_wav(&[0.1, f32::NAN], MIX_SAMPLE_RATE),
        Err(AudioError::Encode(_))
    ));
}

#[test]
fn test_decode_missing_file_is_prompt_not_found() {
    let result = decode_wav_file(std::path::Path::new("/nonexistent/prompt.wav"));
    assert!(matches!(result, Err(AudioError::PromptNotFound(_))));
}

// ---------------------------------------------------------------------------
// Capture manager
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_graph_is_built_once_and_reused() {
    let mic = ToneMicrophone::new(0.1);
    let manager = manager_with(
        Arc::new(mic.clone()),
        MockOutput::default(),
        MockUploader::new(),
        "prompts".into(),
    );

    assert_eq!(manager.status(), AudioStatus::Idle);
    let first = manager.ensure_graph().unwrap();
    let second = manager.ensure_graph().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(mic.opened.load(Ordering::SeqCst), 1);
    assert_eq!(manager.status(), AudioStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_continuous_recording_uploads_on_soft_stop() {
    let mic = ToneMicrophone::new(0.1);
    let uploader = MockUploader::new();
    let manager = manager_with(
        Arc::new(mic.clone()),
        MockOutput::default(),
        uploader.clone(),
        "prompts".into(),
    );

    assert!(manager.start_continuous_recording("P01", 2));
    assert!(!manager.start_continuous_recording("P01", 2));
    tokio::time::sleep(Duration::from_millis(1000)).await;

    manager
        .stop_continuous_recording(TrialStatus::Completed, false)
        .await;

    let uploads = uploader.trial_audio();
    assert_eq!(uploads.len(), 1);
    let (meta, len) = &uploads[0];
    assert_eq!(meta.trial_no, 3);
    assert_eq!(meta.status, TrialStatus::Completed);
    assert_eq!(meta.participant, "P01");
    assert_eq!(meta.mime_type, "audio/wav");
    assert_eq!(meta.duration_ms, 1000);
    assert!(*len > 44);

    // Soft stop keeps the microphone for the next trial
    assert!(!manager.is_recording());
    assert_eq!(manager.status(), AudioStatus::Ready);
    assert_eq!(mic.closed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hard_stop_releases_microphone() {
    let mic = ToneMicrophone::new(0.1);
    let uploader = MockUploader::new();
    let manager = manager_with(
        Arc::new(mic.clone()),
        MockOutput::default(),
        uploader.clone(),
        "prompts".into(),
    );

    manager.start_continuous_recording("P01", 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager
        .stop_continuous_recording(TrialStatus::Aborted, true)
        .await;

    assert_eq!(uploader.trial_audio()[0].0.status, TrialStatus::Aborted);
    assert_eq!(mic.closed.load(Ordering::SeqCst), 1);
    assert_eq!(manager.status(), AudioStatus::Idle);

    // Stopping again is harmless
    manager
        .stop_continuous_recording(TrialStatus::Aborted, true)
        .await;
    assert_eq!(uploader.trial_audio().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clip_runs_for_window_then_uploads() {
    let uploader = MockUploader::new();
    let manager = manager_with(
        Arc::new(ToneMicrophone::new(0.1)),
        MockOutput::default(),
        uploader.clone(),
        "prompts".into(),
    );

    assert!(manager.record_clip(clip_request(7, Duration::from_secs(21))));
    assert!(manager.is_clip_busy());
    manager.wait_for_clip().await;

    assert!(!manager.is_clip_busy());
    let clips = uploader.clips();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].0.index, 7);
    assert_eq!(clips[0].0.question.as_deref(), Some("q1"));
    assert_eq!(clips[0].0.duration_ms, 21_000);
}

#[tokio::test(start_paused = true)]
async fn test_second_clip_is_ignored_while_busy() {
    let uploader = MockUploader::new();
    let manager = manager_with(
        Arc::new(ToneMicrophone::new(0.1)),
        MockOutput::default(),
        uploader.clone(),
        "prompts".into(),
    );

    assert!(manager.record_clip(clip_request(1, Duration::from_secs(21))));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!manager.record_clip(clip_request(2, Duration::from_secs(21))));

    manager.wait_for_clip().await;
    let clips = uploader.clips();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].0.index, 1);

    // Free again once the first finished
    assert!(manager.record_clip(clip_request(3, Duration::from_secs(1))));
    manager.wait_for_clip().await;
    assert_eq!(uploader.clips().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_clip_is_finalized_early() {
    let uploader = MockUploader::new();
    let manager = manager_with(
        Arc::new(ToneMicrophone::new(0.1)),
        MockOutput::default(),
        uploader.clone(),
        "prompts".into(),
    );

    manager.record_clip(clip_request(4, Duration::from_secs(21)));
    tokio::time::sleep(Duration::from_secs(3)).await;
    manager.cancel_clip();
    manager.wait_for_clip().await;

    let clips = uploader.clips();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].0.duration_ms, 3000);
}

#[tokio::test(start_paused = true)]
async fn test_missing_microphone_degrades_quietly() {
    let output = MockOutput::default();
    let uploader = MockUploader::new();
    let manager = manager_with(
        Arc::new(FailingMicrophone),
        output.clone(),
        uploader.clone(),
        "prompts".into(),
    );

    assert!(!manager.start_continuous_recording("P01", 0));
    assert_eq!(manager.status(), AudioStatus::Unavailable);
    assert!(!manager.record_clip(clip_request(0, Duration::from_secs(21))));
    assert!(!manager.is_clip_busy());

    // The cue still plays to the participant
    manager.play_cue();
    assert_eq!(output.played().len(), 1);

    manager
        .stop_continuous_recording(TrialStatus::Aborted, true)
        .await;
    assert!(uploader.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_audio_never_opens_microphone() {
    let mic = ToneMicrophone::new(0.1);
    let config = AudioConfig {
        enabled: false,
        prompt_dir: "prompts".into(),
    };
    let manager = AudioCaptureManager::new(
        Arc::new(mic.clone()),
        Arc::new(NullOutput),
        Arc::new(MockUploader::new()),
        &config,
    );

    assert!(manager.ensure_graph().is_none());
    assert!(!manager.start_continuous_recording("P01", 0));
    assert_eq!(mic.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cue_is_mixed_into_recording() {
    let manager = manager_with(
        Arc::new(ToneMicrophone::new(0.0)),
        MockOutput::default(),
        MockUploader::new(),
        "prompts".into(),
    );
    let graph = manager.ensure_graph().unwrap();
    let recorder = Recorder::start(graph.clone());

    manager.play_cue();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let audio = recorder.finish();
    let peak = audio.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.1, "cue should be audible in the recording");
    assert_eq!(graph.pending_synth(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_play_prompt_reads_and_caches_wav() {
    let dir = tempfile::tempdir().unwrap();
    let wav = encode_wav(&vec![0.2; 4800], MIX_SAMPLE_RATE).unwrap();
    std::fs::write(dir.path().join("q1.wav"), wav).unwrap();

    let output = MockOutput::default();
    let manager = manager_with(
        Arc::new(ToneMicrophone::new(0.0)),
        output.clone(),
        MockUploader::new(),
        dir.path().to_path_buf(),
    );

    manager.play_prompt("q1").unwrap();
    // Served from cache even after the file is gone
    std::fs::remove_file(dir.path().join("q1.wav")).unwrap();
    manager.play_prompt("q1").unwrap();
    assert_eq!(output.played(), vec![4800, 4800]);

    assert!(matches!(
        manager.play_prompt("missing"),
        Err(AudioError::PromptNotFound(_))
    ));
    assert!(matches!(
        manager.play_prompt("../q1"),
        Err(AudioError::PromptNotFound(_))
    ));
}
