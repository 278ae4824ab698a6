//! Centralized constants for audio capture and cue synthesis.
//!
//! All audio-related magic numbers are defined here with documentation
//! explaining their purpose and constraints.

// =============================================================================
// SAMPLE RATE
// =============================================================================

/// Sample rate of the mixing graph and every recording it produces (Hz).
///
/// Microphone input at other rates is resampled by the backend before it
/// reaches the graph, so recorders never need to know the device rate.
pub const MIX_SAMPLE_RATE: u32 = 48000;

/// Samples per millisecond at the mix rate.
pub const SAMPLES_PER_MS: usize = (MIX_SAMPLE_RATE / 1000) as usize;

// =============================================================================
// MIX GAINS
// =============================================================================

/// Gain applied to the microphone before it reaches the mix destination.
pub const MIC_GAIN: f32 = 1.0;

/// Gain applied to synthesized sounds (cue tones, prompt audio) in the mix.
///
/// Tones are already shaped by their own envelope gain; this is the bus level.
pub const SYNTH_GAIN: f32 = 1.0;

// =============================================================================
// CUE TONE
// =============================================================================

/// Duration of the trigger cue tone (milliseconds).
pub const CUE_DURATION_MS: u32 = 220;

/// Frequency of the trigger cue tone (Hz).
pub const CUE_FREQUENCY_HZ: f32 = 1000.0;

/// Peak gain of the trigger cue tone.
pub const CUE_GAIN: f32 = 0.35;

/// Envelope attack time (milliseconds).
///
/// The envelope ramps exponentially from `ENVELOPE_FLOOR` to the peak gain in
/// this time, then decays exponentially back to the floor by the end of the
/// tone. Avoids clicks at tone boundaries.
pub const CUE_ATTACK_MS: u32 = 10;

/// Tail appended after the envelope reaches the floor (milliseconds).
pub const CUE_TAIL_MS: u32 = 20;

/// Near-silent level used as the start/end point of exponential ramps.
///
/// Exponential ramps cannot start from exactly 0.
pub const ENVELOPE_FLOOR: f32 = 0.0001;

// =============================================================================
// RECORDING
// =============================================================================

/// Upper bound on a single recording (samples), ~60 minutes at the mix rate.
///
/// Samples beyond this are dropped and a warning is logged once; a trial is
/// expected to last minutes, not hours.
pub const MAX_RECORDING_SAMPLES: usize = MIX_SAMPLE_RATE as usize * 60 * 60;

/// Length of the chunks a live microphone backend pushes into the graph
/// (milliseconds).
pub const CAPTURE_CHUNK_MS: u32 = 20;
