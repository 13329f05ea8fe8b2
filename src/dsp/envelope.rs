/*
Beat Envelope
=============

Each beat is a short percussive tone. Its amplitude follows a three-part
shape that runs to completion on its own; there is no gate and no note-off.

Vocabulary
----------

  peak        Highest level reached, already scaled for accent, volume and
              cycle density.

  attack      Linear ramp 0 → peak. A couple of milliseconds: long enough to
              avoid a click, short enough to keep the beat's onset sharp.

  hold        Time spent at peak before the decay starts.

  tau         Time constant of the exponential decay: after tau seconds the
              level is peak / e.

  floor       Fraction of peak below which the tone is considered finished.


The Shape
---------

  Level
   peak ┐  ╱‾‾╲
        │ ╱    ╲
        │╱      ╲_
        │          ‾‾‾‾‾────__________
    0.0 └───────────────────────────────→ Time
        Attack Hold     Decay       Done

Unlike the ADSR used for held notes, decay here is EXPONENTIAL: a struck
or plucked sound loses a fixed fraction of its energy per unit of time, and
a linear tail sounds like it stops abruptly.


The Math: Per-sample Decay Coefficient
--------------------------------------

    level[n + 1] = level[n] * coeff
    coeff        = exp(-1 / (tau * sample_rate))

Example: tau = 40ms at 48kHz
  - coeff = exp(-1 / 1920) ≈ 0.999479
  - after 1920 samples the level is peak * e^-1 ≈ 0.37 * peak
  - the -60dB floor (0.001) is reached after ln(1000) * tau ≈ 276ms
*/

/// Stage of the beat envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attack,
    Hold,
    Decay,
    Done,
}

/// Shape parameters in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    pub attack: f32,
    pub hold: f32,
    pub tau: f32,
}

/// Tones below this fraction of their peak are finished (-60dB).
const FLOOR: f32 = 0.001;

#[derive(Debug, Clone)]
pub struct BeatEnvelope {
    peak: f32,
    attack_samples: u32,
    hold_samples: u32,
    decay_coeff: f32,

    stage: EnvelopeStage,
    level: f32,
    elapsed: u32, // samples spent in the current stage
}

impl BeatEnvelope {
    pub fn new(shape: EnvelopeShape, peak: f32, sample_rate: f32) -> Self {
        let attack_samples = (shape.attack.max(0.0) * sample_rate).round() as u32;
        let hold_samples = (shape.hold.max(0.0) * sample_rate).round() as u32;
        let tau_samples = (shape.tau * sample_rate).max(1.0);

        let stage = if peak <= 0.0 {
            EnvelopeStage::Done
        } else if attack_samples == 0 {
            EnvelopeStage::Hold
        } else {
            EnvelopeStage::Attack
        };

        Self {
            peak: peak.max(0.0),
            attack_samples,
            hold_samples,
            decay_coeff: (-1.0 / tau_samples).exp(),
            stage,
            level: if stage == EnvelopeStage::Hold { peak } else { 0.0 },
            elapsed: 0,
        }
    }

    /// Current level, then advance one sample.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Attack => {
                self.level = self.peak * self.elapsed as f32 / self.attack_samples as f32;
                self.elapsed += 1;
                if self.elapsed >= self.attack_samples {
                    self.enter(EnvelopeStage::Hold);
                }
            }
            EnvelopeStage::Hold => {
                self.level = self.peak;
                self.elapsed += 1;
                if self.elapsed >= self.hold_samples {
                    self.enter(EnvelopeStage::Decay);
                }
            }
            EnvelopeStage::Decay => {
                self.level *= self.decay_coeff;
                if self.level < self.peak * FLOOR {
                    self.level = 0.0;
                    self.enter(EnvelopeStage::Done);
                }
            }
            EnvelopeStage::Done => {
                self.level = 0.0;
            }
        }

        debug_assert!(self.level >= 0.0 && self.level <= self.peak);
        self.level
    }

    fn enter(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.elapsed = 0;
    }

    pub fn is_done(&self) -> bool {
        self.stage == EnvelopeStage::Done
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }
}
