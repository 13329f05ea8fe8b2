//! Benchmarks for the audio-thread renderers of both engines.
//!
//! Worst case for the precision renderer is many overlapping tones: eight
//! tracks all landing their downbeat in the same block.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion};
use polybeat::clock::FrameCounter;
use polybeat::dsp::ToneSpec;
use polybeat::engine::{ClipCache, ClipKey, ClipMixer, ClipStart, RendererCommand, ToneRenderer};
use polybeat::track::PITCH_TABLE;
use rtrb::RingBuffer;

use crate::BLOCK_SIZES;

const TRACKS: usize = 8;

pub fn bench_renderer(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/renderer");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        group.bench_with_input(BenchmarkId::new("precision_8_tones", size), &size, |b, _| {
            b.iter(|| {
                let (mut tx, rx) = RingBuffer::new(TRACKS);
                let mut renderer = ToneRenderer::new(rx, FrameCounter::new(), 48_000.0, TRACKS);
                for &frequency in PITCH_TABLE.iter().take(TRACKS) {
                    let spec = ToneSpec {
                        frequency,
                        accented: true,
                        density: 4,
                        volume: 0.8,
                    };
                    let _ = tx.push(RendererCommand::Schedule {
                        start_frame: 0,
                        spec,
                    });
                }
                buffer.fill(0.0);
                renderer.render(black_box(&mut buffer));
            })
        });

        let mut cache = ClipCache::new(48_000.0, 0.2);
        let clips: Vec<Arc<[f32]>> = PITCH_TABLE
            .iter()
            .take(TRACKS)
            .filter_map(|&frequency| {
                ClipKey::quantize(&ToneSpec {
                    frequency,
                    accented: false,
                    density: 4,
                    volume: 0.8,
                })
            })
            .map(|key| cache.get_or_render(key))
            .collect();

        group.bench_with_input(BenchmarkId::new("fallback_8_clips", size), &size, |b, _| {
            b.iter(|| {
                let (mut tx, rx) = RingBuffer::new(TRACKS);
                let mut mixer = ClipMixer::new(rx, TRACKS);
                for (handle, clip) in clips.iter().enumerate() {
                    let _ = tx.push(ClipStart {
                        handle,
                        clip: clip.clone(),
                    });
                }
                buffer.fill(0.0);
                mixer.render(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}
