#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Beat Oscillator
===============

A phase accumulator producing one of two waveforms. Phase is kept in
cycles (0.0 to 1.0) rather than radians so wrapping is a single subtraction
and the waveform shapes can be written directly against it.

  Sine      Pure tone, fundamental only. Used for ordinary beats.
  Triangle  Odd harmonics falling off as 1/n². Slightly brighter than a
            sine, still soft enough to sit under other tracks. Used for
            the accented downbeat of each track.

Per-sample increment:

    increment = frequency / sample_rate      (cycles per sample)
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscillatorWaveform {
    Sine,
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: OscillatorWaveform,
    phase: f32,
    increment: f32,
}

impl Oscillator {
    pub fn new(waveform: OscillatorWaveform, frequency: f32, sample_rate: f32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            increment: frequency / sample_rate,
        }
    }

    pub fn sine(frequency: f32, sample_rate: f32) -> Self {
        Self::new(OscillatorWaveform::Sine, frequency, sample_rate)
    }

    pub fn triangle(frequency: f32, sample_rate: f32) -> Self {
        Self::new(OscillatorWaveform::Triangle, frequency, sample_rate)
    }

    pub fn waveform(&self) -> OscillatorWaveform {
        self.waveform
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let p = self.phase;
        let value = match self.waveform {
            OscillatorWaveform::Sine => (std::f32::consts::TAU * p).sin(),
            // 0 → 1 → 0 → -1 → 0 over one cycle, in phase with the sine
            OscillatorWaveform::Triangle => {
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
        };

        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    #[test]
    fn valid_sine() {
        let sample_rate = 48_000.0;
        let frequency = 440.0;
        let mut osc = Oscillator::sine(frequency, sample_rate);

        let buffer: Vec<f32> = (0..128).map(|_| osc.next_sample()).collect();

        // sample n should be sin(2pi f n / sr)
        let n = 12;
        let expected = (TAU * frequency * n as f32 / sample_rate).sin();
        assert!(
            (buffer[n] - expected).abs() < 1e-5,
            "expected {expected}, got {}",
            buffer[n]
        );
    }

    #[test]
    fn triangle_peaks_at_quarter_cycle() {
        // 4 samples per cycle
        let mut osc = Oscillator::triangle(1.0, 4.0);
        let samples: Vec<f32> = (0..4).map(|_| osc.next_sample()).collect();
        assert_eq!(samples, vec![0.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn waveforms_stay_in_range() {
        for wf in [OscillatorWaveform::Sine, OscillatorWaveform::Triangle] {
            let mut osc = Oscillator::new(wf, 523.25, 44_100.0);
            for _ in 0..10_000 {
                let s = osc.next_sample();
                assert!((-1.0..=1.0).contains(&s), "{wf:?} produced {s}");
            }
        }
    }
}
