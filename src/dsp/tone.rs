//! Tone - one self-terminating beat voice
//!
//! Every beat gets its own `Tone`: oscillator and envelope are owned by the
//! voice and never shared, so overlapping beats from different tracks
//! cannot disturb each other's envelopes.

use super::envelope::{BeatEnvelope, EnvelopeShape};
use super::oscillator::{Oscillator, OscillatorWaveform};

/// Keeps several simultaneous downbeats from clipping the mix.
const HEADROOM: f32 = 0.4;

/// Level of accented beats relative to the track volume.
const ACCENT_LEVEL: f32 = 1.0;
const BEAT_LEVEL: f32 = 0.6;

const ACCENT_SHAPE: EnvelopeShape = EnvelopeShape {
    attack: 0.002,
    hold: 0.01,
    tau: 0.045,
};

const BEAT_SHAPE: EnvelopeShape = EnvelopeShape {
    attack: 0.002,
    hold: 0.004,
    tau: 0.03,
};

/// What the engines are told about one beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub frequency: f32,
    pub accented: bool,
    /// Beats sharing the cycle with this one.
    pub density: u32,
    pub volume: f32,
}

impl ToneSpec {
    pub fn waveform(&self) -> OscillatorWaveform {
        if self.accented {
            OscillatorWaveform::Triangle
        } else {
            OscillatorWaveform::Sine
        }
    }

    pub fn shape(&self) -> EnvelopeShape {
        if self.accented {
            ACCENT_SHAPE
        } else {
            BEAT_SHAPE
        }
    }

    /// Loudness before headroom: accent × volume × density compression.
    pub fn loudness(&self) -> f32 {
        let level = if self.accented { ACCENT_LEVEL } else { BEAT_LEVEL };
        level * self.volume.clamp(0.0, 1.0) * density_gain(self.density)
    }

    pub fn peak(&self) -> f32 {
        peak_for(self.loudness())
    }
}

/// Output peak for a loudness, after headroom.
pub fn peak_for(loudness: f32) -> f32 {
    loudness * HEADROOM
}

/// Saturating gain for busy cycles: 1.0 for a single beat, easing toward
/// 0.65 as the cycle fills up.
pub fn density_gain(beats: u32) -> f32 {
    let extra = beats.max(1) as f32 - 1.0;
    0.65 + 0.35 * (-extra / 6.0).exp()
}

#[derive(Debug, Clone)]
pub struct Tone {
    osc: Oscillator,
    env: BeatEnvelope,
}

impl Tone {
    pub fn new(spec: &ToneSpec, sample_rate: f32) -> Self {
        Self {
            osc: Oscillator::new(spec.waveform(), spec.frequency, sample_rate),
            env: BeatEnvelope::new(spec.shape(), spec.peak(), sample_rate),
        }
    }

    /// A tone that starts at a fixed level instead of the `ToneSpec`'s own
    /// loudness (used for quantised clips).
    pub fn with_peak(spec: &ToneSpec, peak: f32, sample_rate: f32) -> Self {
        Self {
            osc: Oscillator::new(spec.waveform(), spec.frequency, sample_rate),
            env: BeatEnvelope::new(spec.shape(), peak, sample_rate),
        }
    }

    /// Add this tone into `out`, starting `offset` samples into the block.
    pub fn render_into(&mut self, out: &mut [f32], offset: usize) {
        if offset >= out.len() {
            return;
        }
        for sample in out[offset..].iter_mut() {
            if self.env.is_done() {
                break;
            }
            *sample += self.osc.next_sample() * self.env.next_sample();
        }
    }

    /// Render the whole tone (or `max_len` samples of it) into a new buffer.
    pub fn render_to_vec(mut self, max_len: usize) -> Vec<f32> {
        let mut buf = vec![0.0; max_len];
        self.render_into(&mut buf, 0);
        buf
    }

    pub fn is_finished(&self) -> bool {
        self.env.is_done()
    }

    pub fn level(&self) -> f32 {
        self.env.level()
    }
}
