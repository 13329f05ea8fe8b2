//! Benchmarks for the percussive beat envelope.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polybeat::dsp::{BeatEnvelope, EnvelopeShape};

use crate::BLOCK_SIZES;

const SHAPE: EnvelopeShape = EnvelopeShape {
    attack: 0.002,
    hold: 0.01,
    tau: 0.045,
};

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Decay phase, fresh envelope each iteration so it never finishes
        group.bench_with_input(BenchmarkId::new("decay", size), &size, |b, _| {
            b.iter(|| {
                let mut env = BeatEnvelope::new(SHAPE, 1.0, 48_000.0);
                for _ in 0..1_000 {
                    env.next_sample();
                }
                for sample in buffer.iter_mut() {
                    *sample = env.next_sample();
                }
                black_box(&buffer);
            })
        });
    }

    group.finish();
}
