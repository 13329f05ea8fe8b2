//! Benchmarks for one lookahead scheduler tick.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use polybeat::audibility::resolve;
use polybeat::scheduler::LookaheadScheduler;
use polybeat::{Tempo, TrackList};

pub fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/scheduler");

    // (tracks, beats per track)
    for &(tracks, beats) in &[(2usize, 4i64), (8, 16), (8, 64)] {
        let mut list = TrackList::new();
        for i in 0..tracks {
            list.add(beats - i as i64);
        }
        let audible = resolve(list.tracks());
        let mut events = Vec::with_capacity(tracks * beats as usize * 4);
        let label = format!("{tracks}x{beats}");

        // fastest tempo, so a window holds several cycles
        group.bench_with_input(BenchmarkId::new("tick", &label), &label, |b, _| {
            b.iter(|| {
                let mut sched = LookaheadScheduler::new(0.3, 0.1);
                sched.arm(0.0);
                events.clear();
                sched.tick(black_box(0.0), Tempo::new(240), &audible, &mut events)
            })
        });
    }

    group.finish();
}
