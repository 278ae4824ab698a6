// WAV encoding for uploads and decoding for prompt audio

use std::io::Cursor;
use std::path::Path;

use super::graph::{downmix, resample_linear};
use super::AudioError;
use crate::audio_constants::MIX_SAMPLE_RATE;

/// Convert a hound error to AudioError
#[cfg_attr(coverage_nightly, coverage(off))]
fn hound_error(e: hound::Error) -> AudioError {
    AudioError::Encode(e.to_string())
}

/// Encode audio samples as an in-memory 16-bit mono WAV file
///
/// # Arguments
/// * `samples` - Audio samples as f32 values (expected range: -1.0 to 1.0)
/// * `sample_rate` - Sample rate in Hz (e.g., 48000)
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    if samples.is_empty() {
        return Err(AudioError::Encode("Cannot encode empty samples".to_string()));
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(AudioError::Encode(
            "Samples contain NaN or infinity values".to_string(),
        ));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(hound_error)?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(hound_error)?;
        }
        writer.finalize().map_err(hound_error)?;
    }
    Ok(cursor.into_inner())
}

/// Decode a WAV file to mono samples at the mix rate
pub fn decode_wav_file(path: &Path) -> Result<Vec<f32>, AudioError> {
    let reader = hound::WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            AudioError::PromptNotFound(path.display().to_string())
        }
        other => AudioError::Decode(other.to_string()),
    })?;
    decode_reader(reader)
}

/// Decode WAV bytes to mono samples at the mix rate
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<Vec<f32>, AudioError> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode(e.to_string()))?;
    decode_reader(reader)
}

fn decode_reader<R: std::io::Read>(reader: hound::WavReader<R>) -> Result<Vec<f32>, AudioError> {
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(AudioError::Decode("WAV header has zero rate or channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Decode(e.to_string()))?
        }
    };

    let mono = downmix(&interleaved, spec.channels as usize);
    Ok(resample_linear(&mono, spec.sample_rate, MIX_SAMPLE_RATE))
}

/// Duration in whole milliseconds of `samples` at `sample_rate`
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples as u64 * 1000 / sample_rate as u64
}
