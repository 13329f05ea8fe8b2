//! Benchmarks for a single beat voice.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polybeat::dsp::{Tone, ToneSpec};

use crate::BLOCK_SIZES;

pub fn bench_tone(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/tone");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        for (name, accented) in [("accent", true), ("beat", false)] {
            let spec = ToneSpec {
                frequency: 659.25,
                accented,
                density: 4,
                volume: 0.8,
            };
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    buffer.fill(0.0);
                    let mut tone = Tone::new(&spec, 48_000.0);
                    tone.render_into(black_box(&mut buffer), 0);
                })
            });
        }
    }

    group.finish();
}
