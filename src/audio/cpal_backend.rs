// cpal-based microphone and output backends
// This code interacts with hardware and is excluded from coverage measurement
//
// cpal streams are not Send, so each stream lives on a dedicated thread that
// owns it until told to stop.
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use parking_lot::Mutex;

use super::graph::{downmix, resample_linear, MixGraph};
use super::source::{AudioOutput, MicrophoneSource, MicrophoneStream};
use super::AudioError;
use crate::audio_constants::MIX_SAMPLE_RATE;
use crate::{debug, error, info, warn};

/// Try to find a supported input config with the mix sample rate
fn find_input_config(device: &cpal::Device, target_rate: u32) -> Option<cpal::SupportedStreamConfig> {
    let configs = device.supported_input_configs().ok()?;
    for range in configs {
        if range.min_sample_rate().0 <= target_rate && target_rate <= range.max_sample_rate().0 {
            return Some(range.with_sample_rate(SampleRate(target_rate)));
        }
    }
    None
}

/// Microphone capture through the default cpal input device
#[derive(Debug, Default, Clone)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a named input device, falling back to the default when missing
    pub fn with_device(device_name: impl Into<String>) -> Self {
        Self {
            device_name: Some(device_name.into()),
        }
    }
}

fn pick_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    debug!("Host: {:?}", host.id());
    if let Some(name) = name {
        let found = host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)));
        match found {
            Some(device) => return Ok(device),
            None => warn!("Requested device '{}' not found, falling back to default", name),
        }
    }
    host.default_input_device().ok_or(AudioError::NoDevice)
}

/// Build and start the input stream; runs on the capture thread
fn build_input_stream(
    device_name: Option<&str>,
    graph: Arc<MixGraph>,
) -> Result<cpal::Stream, AudioError> {
    let device = pick_input_device(device_name)?;
    let config = match find_input_config(&device, MIX_SAMPLE_RATE) {
        Some(config) => config,
        None => device
            .default_input_config()
            .map_err(|e| AudioError::Device(e.to_string()))?,
    };
    let device_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    if device_rate != MIX_SAMPLE_RATE {
        warn!(
            "Device doesn't support {}Hz, will resample from {}Hz",
            MIX_SAMPLE_RATE, device_rate
        );
    }

    let feed = move |f32_samples: &[f32]| {
        let mono = downmix(f32_samples, channels);
        graph.push_mic(&resample_linear(&mono, device_rate, MIX_SAMPLE_RATE));
    };
    let err_fn = |err: cpal::StreamError| error!("Audio stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| feed(data),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                feed(&samples);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config.into(),
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
                    .collect();
                feed(&samples);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::Device(format!(
                "Unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => AudioError::NoDevice,
        other => AudioError::Stream(other.to_string()),
    })?;

    stream
        .play()
        .map_err(|e| AudioError::Stream(e.to_string()))?;
    info!(
        "Audio stream started at {}Hz ({} channels, mix {}Hz)",
        device_rate, channels, MIX_SAMPLE_RATE
    );
    Ok(stream)
}

impl MicrophoneSource for CpalMicrophone {
    fn open(&self, graph: Arc<MixGraph>) -> Result<Box<dyn MicrophoneStream>, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let thread = thread::spawn(move || {
            match build_input_stream(device_name.as_deref(), graph) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Block until closed; dropping the stream stops capture
                    let _ = stop_rx.recv();
                    drop(stream);
                    debug!("Audio stream stopped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(AudioError::Stream("capture thread exited".to_string())),
        }
    }
}

/// Handle to the capture thread
struct CpalStream {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneStream for CpalStream {
    fn close(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Plays audio on the default output device, one short-lived thread per sound
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

fn play_blocking(samples: Vec<f32>, sample_rate: u32) -> Result<(), AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let device_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let resampled = resample_linear(&samples, sample_rate, device_rate);
    let play_ms = resampled.len() as u64 * 1000 / device_rate.max(1) as u64;
    let queue = Arc::new(Mutex::new(VecDeque::from(resampled)));

    let stream = device
        .build_output_stream(
            &config.config(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock();
                for frame in data.chunks_mut(channels) {
                    let s = queue.pop_front().unwrap_or(0.0);
                    frame.iter_mut().for_each(|out| *out = s);
                }
            },
            |err| error!("Audio output error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))?;
    stream.play().map_err(|e| AudioError::Stream(e.to_string()))?;
    thread::sleep(Duration::from_millis(play_ms + 100));
    Ok(())
}

impl AudioOutput for CpalOutput {
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
        let samples = samples.to_vec();
        thread::spawn(move || {
            if let Err(e) = play_blocking(samples, sample_rate) {
                warn!("Audio playback failed: {}", e);
            }
        });
        Ok(())
    }
}
