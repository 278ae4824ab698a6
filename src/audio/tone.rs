// Cue tone synthesis

use crate::audio_constants::{
    CUE_ATTACK_MS, CUE_DURATION_MS, CUE_FREQUENCY_HZ, CUE_GAIN, CUE_TAIL_MS, ENVELOPE_FLOOR,
};

/// Exponential ramp from `from` to `to`, evaluated at `t` in [0, 1]
fn exp_ramp(from: f32, to: f32, t: f32) -> f32 {
    from * (to / from).powf(t.clamp(0.0, 1.0))
}

/// Envelope gain at `ms` into a tone of `duration_ms` with `attack_ms` rise
fn envelope(ms: f32, attack_ms: f32, duration_ms: f32, peak: f32) -> f32 {
    if ms < attack_ms {
        exp_ramp(ENVELOPE_FLOOR, peak, ms / attack_ms)
    } else if ms < duration_ms {
        exp_ramp(peak, ENVELOPE_FLOOR, (ms - attack_ms) / (duration_ms - attack_ms))
    } else {
        ENVELOPE_FLOOR
    }
}

/// Sine tone with exponential attack/decay, followed by a near-silent tail
pub fn synthesize_tone(
    frequency_hz: f32,
    duration_ms: u32,
    peak: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let total_ms = duration_ms + CUE_TAIL_MS;
    let total_samples = (sample_rate as u64 * total_ms as u64 / 1000) as usize;
    let attack = (CUE_ATTACK_MS as f32).min(duration_ms as f32 / 2.0).max(1.0);

    (0..total_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let ms = t * 1000.0;
            let gain = envelope(ms, attack, duration_ms as f32, peak);
            (2.0 * std::f32::consts::PI * frequency_hz * t).sin() * gain
        })
        .collect()
}

/// The trigger cue: 220 ms at 1 kHz, peak gain 0.35
pub fn synthesize_cue(sample_rate: u32) -> Vec<f32> {
    synthesize_tone(CUE_FREQUENCY_HZ, CUE_DURATION_MS, CUE_GAIN, sample_rate)
}
