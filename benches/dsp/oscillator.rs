//! Benchmarks for oscillator waveform generation.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polybeat::dsp::{Oscillator, OscillatorWaveform};

use crate::BLOCK_SIZES;

fn render(osc: &mut Oscillator, buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        *sample = osc.next_sample();
    }
}

pub fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/oscillator");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        for (name, waveform) in [
            // sin() per sample
            ("sine", OscillatorWaveform::Sine),
            // two compares per sample
            ("triangle", OscillatorWaveform::Triangle),
        ] {
            let mut osc = Oscillator::new(waveform, 440.0, 48_000.0);
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| render(&mut osc, black_box(&mut buffer)))
            });
        }
    }

    group.finish();
}
