//! Beat synthesis primitives shared by both playback engines.
//!
//! The precision engine renders these live on the audio thread; the fallback
//! engine renders them once into clips. Nothing here allocates per sample.

/// Attack/hold/exponential-decay envelope for percussive beats.
pub mod envelope;
/// Phase-accumulator oscillators.
pub mod oscillator;
/// Self-terminating beat voice (oscillator × envelope).
pub mod tone;

pub use envelope::{BeatEnvelope, EnvelopeShape, EnvelopeStage};
pub use oscillator::{Oscillator, OscillatorWaveform};
pub use tone::{density_gain, peak_for, Tone, ToneSpec};
