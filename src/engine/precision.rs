/*
Precision Engine
================

Beats are synthesised live on the audio thread and start on an exact frame
of the device clock. The control side never touches audio state directly;
it talks to the renderer over a lock-free single-producer ring.

    control thread                         audio thread
    ──────────────                         ────────────
    emit(trigger)
      frame = round(at * sample_rate)
      tx.push(Schedule { frame, spec }) ──→ rx.pop()  → pending
                                             render(block):
    cancel_pending()                           start pending tones whose
      tx.push(Flush) ───────────────────→      frame falls in this block,
                                               mix active tones,
                                               frames += block.len()

The frame counter advanced by the renderer IS the engine's clock
([`FrameClock`]). A trigger whose frame has already passed starts at the
top of the next block: late, never dropped, never rendered twice.

Real-time rules for `render`: no locks, no allocation. Both `pending` and
`active` are allocated up front and capped; anything past the cap is
dropped with the overflow counted.


Sizing
------

The caps come from [`beat_capacity`], the most beats that can be in flight
at once:

    cycles   = ceil((lookahead + start_margin + tick_interval) / shortest_cycle) + 2
    capacity = MAX_TRACKS * MAX_BEATS_PER_CYCLE * cycles

A pending beat lies between the device clock and `scheduled_until`, which
is at most one lookahead window plus one cycle ahead; a window of that
length touches at most `cycles` cycles. With the defaults (0.3s lookahead,
50ms margin, 25ms tick, 0.25s cycle at 240/min) that is 4 cycles, or 4096
beats. A sounding tone lasts about a third of a second, so the same bound
covers `active` too.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use super::output::{OutputBackend, RenderFn};
use super::{BeatTrigger, EngineKind, PlaybackEngine};
use crate::clock::{Clock, FrameClock, FrameCounter};
use crate::config::TransportConfig;
use crate::dsp::{Tone, ToneSpec};
use crate::error::EngineResult;
use crate::tempo::Tempo;
use crate::track::{MAX_BEATS_PER_CYCLE, MAX_TRACKS};

/// Commands sent to the renderer. Processed in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RendererCommand {
    Schedule { start_frame: u64, spec: ToneSpec },
    /// Forget every tone that has not started yet.
    Flush,
}

/// Ring slots on top of the beat capacity, for `Flush` commands.
const COMMAND_HEADROOM: usize = 16;

/// Placeholder rate for the clock before the device reports its own.
const IDLE_SAMPLE_RATE: f64 = 48_000.0;

/// Most beats in flight at once for `config`.
pub fn beat_capacity(config: &TransportConfig) -> usize {
    let shortest_cycle = Tempo::new(Tempo::MAX as i64).cycle_duration();
    let window = config.lookahead + config.start_margin + config.tick_interval.as_secs_f64();
    let cycles = (window / shortest_cycle).ceil() as usize + 2;
    MAX_TRACKS * MAX_BEATS_PER_CYCLE as usize * cycles
}

/// Audio-thread half of the precision engine.
pub struct ToneRenderer {
    rx: Consumer<RendererCommand>,
    frames: FrameCounter,
    sample_rate: f32,
    capacity: usize,
    pending: Vec<(u64, ToneSpec)>,
    active: Vec<Tone>,
    dropped: Arc<AtomicU64>,
}

impl ToneRenderer {
    /// A renderer holding at most `capacity` pending and `capacity`
    /// sounding tones.
    pub fn new(
        rx: Consumer<RendererCommand>,
        frames: FrameCounter,
        sample_rate: f32,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            rx,
            frames,
            sample_rate,
            capacity,
            pending: Vec::with_capacity(capacity),
            active: Vec::with_capacity(capacity),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Count dropped tones in `counter` instead of a private one.
    pub fn with_drop_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.dropped = counter;
        self
    }

    /// Mix every tone sounding in this block into `out` and advance the
    /// frame counter by `out.len()`.
    pub fn render(&mut self, out: &mut [f32]) {
        while let Ok(cmd) = self.rx.pop() {
            match cmd {
                RendererCommand::Schedule { start_frame, spec } => {
                    if self.pending.len() < self.capacity {
                        self.pending.push((start_frame, spec));
                    } else {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                RendererCommand::Flush => self.pending.clear(),
            }
        }

        // tones carried over from earlier blocks
        for tone in self.active.iter_mut() {
            tone.render_into(out, 0);
        }
        self.active.retain(|tone| !tone.is_finished());

        let block_start = self.frames.load();
        let block_end = block_start + out.len() as u64;

        let mut i = 0;
        while i < self.pending.len() {
            let (start_frame, spec) = self.pending[i];
            if start_frame >= block_end {
                i += 1;
                continue;
            }
            self.pending.swap_remove(i);

            let offset = start_frame.saturating_sub(block_start) as usize;
            let mut tone = Tone::new(&spec, self.sample_rate);
            tone.render_into(out, offset);
            if !tone.is_finished() {
                if self.active.len() < self.capacity {
                    self.active.push(tone);
                } else {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.frames.advance(out.len());
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Tones lost to the pending or active caps.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Live-synthesis engine on top of an [`OutputBackend`].
///
/// The output is opened on the first `start()` and kept open across
/// `stop()` so sounding tones can ring out; it is released when the engine
/// is dropped.
pub struct PrecisionEngine<B: OutputBackend> {
    backend: B,
    clock: FrameClock,
    tx: Option<Producer<RendererCommand>>,
    capacity: usize,
    running: bool,
    overflows: u64,
    dropped: Arc<AtomicU64>,
}

impl<B: OutputBackend> PrecisionEngine<B> {
    /// Engine sized for the default transport configuration.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, &TransportConfig::default())
    }

    pub fn with_config(backend: B, config: &TransportConfig) -> Self {
        Self {
            backend,
            clock: FrameCounter::new().clock(IDLE_SAMPLE_RATE),
            tx: None,
            capacity: beat_capacity(config),
            running: false,
            overflows: 0,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Beats the renderer can hold at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tones the renderer had no room for.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn frame_clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Commands that did not fit in the ring.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    fn send(&mut self, cmd: RendererCommand) {
        let Some(tx) = self.tx.as_mut() else {
            return;
        };
        if tx.push(cmd).is_err() {
            self.overflows += 1;
            log::warn!("renderer queue full, dropped {cmd:?}");
        }
    }

    fn open(&mut self) -> EngineResult<()> {
        let capacity = self.capacity;
        let (tx, rx) = RingBuffer::<RendererCommand>::new(capacity + COMMAND_HEADROOM);
        let counter = FrameCounter::new();
        let clock = counter.clock(IDLE_SAMPLE_RATE);
        let dropped = self.dropped.clone();

        let info = self.backend.open(Box::new(move |info| {
            let mut renderer =
                ToneRenderer::new(rx, counter, info.sample_rate as f32, capacity)
                    .with_drop_counter(dropped);
            let render: RenderFn = Box::new(move |out: &mut [f32]| renderer.render(out));
            render
        }))?;

        self.clock = clock.with_sample_rate(info.sample_rate as f64);
        self.tx = Some(tx);
        Ok(())
    }
}

impl<B: OutputBackend> PlaybackEngine for PrecisionEngine<B> {
    fn kind(&self) -> EngineKind {
        EngineKind::Precision
    }

    fn start(&mut self) -> EngineResult<()> {
        if self.running {
            return Ok(());
        }
        if self.tx.is_none() || !self.backend.is_open() {
            self.tx = None;
            self.open()?;
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.send(RendererCommand::Flush);
        self.running = false;
    }

    fn cancel_pending(&mut self) {
        self.send(RendererCommand::Flush);
    }

    fn emit(&mut self, trigger: BeatTrigger) {
        if !self.running {
            return;
        }
        let start_frame = self.clock.frame_at(trigger.at);
        self.send(RendererCommand::Schedule {
            start_frame,
            spec: trigger.spec,
        });
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl<B: OutputBackend> Drop for PrecisionEngine<B> {
    fn drop(&mut self) {
        self.backend.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audibility::resolve;
    use crate::engine::output::OfflineOutput;
    use crate::scheduler::LookaheadScheduler;
    use crate::track::{TrackId, TrackList};

    const SAMPLE_RATE: u32 = 8_000;

    fn spec(accented: bool) -> ToneSpec {
        ToneSpec {
            frequency: 440.0,
            accented,
            density: 1,
            volume: 1.0,
        }
    }

    fn renderer() -> (Producer<RendererCommand>, ToneRenderer, FrameClock) {
        let (tx, rx) = RingBuffer::new(64);
        let counter = FrameCounter::new();
        let clock = counter.clock(SAMPLE_RATE as f64);
        (tx, ToneRenderer::new(rx, counter, SAMPLE_RATE as f32, 64), clock)
    }

    fn first_sound(buf: &[f32]) -> Option<usize> {
        buf.iter().position(|&s| s != 0.0)
    }

    #[test]
    fn tone_starts_on_its_frame() {
        let (mut tx, mut r, clock) = renderer();
        tx.push(RendererCommand::Schedule {
            start_frame: 300,
            spec: spec(true),
        })
        .unwrap();

        let mut block = vec![0.0f32; 256];
        r.render(&mut block);
        assert!(first_sound(&block).is_none());
        assert_eq!(clock.frames(), 256);

        let mut block = vec![0.0f32; 256];
        r.render(&mut block);
        // attack starts from zero, so the first non-zero sample is one later
        assert_eq!(first_sound(&block), Some(300 - 256 + 1));
        assert_eq!(r.active(), 1);
    }

    #[test]
    fn late_tone_starts_at_block_top() {
        let (mut tx, mut r, _clock) = renderer();
        let mut block = vec![0.0f32; 128];
        r.render(&mut block);

        tx.push(RendererCommand::Schedule {
            start_frame: 10,
            spec: spec(false),
        })
        .unwrap();
        let mut block = vec![0.0f32; 128];
        r.render(&mut block);
        assert_eq!(first_sound(&block), Some(1));
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn flush_drops_only_unstarted_tones() {
        let (mut tx, mut r, _clock) = renderer();
        tx.push(RendererCommand::Schedule {
            start_frame: 0,
            spec: spec(true),
        })
        .unwrap();
        tx.push(RendererCommand::Schedule {
            start_frame: 4_000,
            spec: spec(true),
        })
        .unwrap();

        let mut block = vec![0.0f32; 64];
        r.render(&mut block);
        assert_eq!((r.active(), r.pending()), (1, 1));

        tx.push(RendererCommand::Flush).unwrap();
        let mut block = vec![0.0f32; 64];
        r.render(&mut block);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.active(), 1);
        assert!(first_sound(&block).is_some());
    }

    #[test]
    fn finished_tones_are_retired() {
        let (mut tx, mut r, _clock) = renderer();
        tx.push(RendererCommand::Schedule {
            start_frame: 0,
            spec: spec(true),
        })
        .unwrap();
        let mut block = vec![0.0f32; SAMPLE_RATE as usize];
        r.render(&mut block);
        let mut block = vec![0.0f32; 64];
        r.render(&mut block);
        assert_eq!(r.active(), 0);
        assert!(first_sound(&block).is_none());
    }

    #[test]
    fn engine_schedules_against_device_clock() {
        let (output, tap) = OfflineOutput::new(SAMPLE_RATE);
        let mut engine = PrecisionEngine::new(output);
        engine.start().unwrap();
        assert!(tap.is_open());

        engine.emit(BeatTrigger {
            track: TrackId(1),
            spec: spec(true),
            at: 0.1,
        });
        let out = tap.render(1_600);
        assert_eq!(first_sound(&out), Some(801));
        assert!((engine.clock().now() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn stopped_engine_ignores_triggers() {
        let (output, tap) = OfflineOutput::new(SAMPLE_RATE);
        let mut engine = PrecisionEngine::new(output);
        engine.start().unwrap();
        engine.emit(BeatTrigger {
            track: TrackId(1),
            spec: spec(false),
            at: 0.05,
        });
        engine.stop();
        engine.emit(BeatTrigger {
            track: TrackId(1),
            spec: spec(false),
            at: 0.06,
        });
        assert!(first_sound(&tap.render(1_600)).is_none());
        assert!(!engine.is_running());
    }

    #[test]
    fn failed_start_can_be_retried() {
        let (output, tap) = OfflineOutput::new(SAMPLE_RATE);
        let mut engine = PrecisionEngine::new(output);
        tap.set_failure(Some("device busy"));
        assert!(engine.start().is_err());
        assert!(!engine.is_running());

        tap.set_failure(None);
        engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(tap.opens(), 1);
    }

    #[test]
    fn default_capacity_covers_four_fast_cycles() {
        let capacity = beat_capacity(&TransportConfig::default());
        assert_eq!(capacity, 4 * MAX_TRACKS * MAX_BEATS_PER_CYCLE as usize);

        let slow_ticks = TransportConfig::default().lookahead(1.0);
        assert!(beat_capacity(&slow_ticks) > capacity);
    }

    #[test]
    fn renderer_drops_past_capacity() {
        let (mut tx, rx) = RingBuffer::new(16);
        let mut r = ToneRenderer::new(rx, FrameCounter::new(), SAMPLE_RATE as f32, 4);
        for i in 0..6 {
            tx.push(RendererCommand::Schedule {
                start_frame: 10_000 + i,
                spec: spec(false),
            })
            .unwrap();
        }
        r.render(&mut [0.0f32; 32]);
        assert_eq!((r.pending(), r.dropped()), (4, 2));
    }

    #[test]
    fn densest_session_loses_no_beats() {
        let config = TransportConfig::default();
        let mut list = TrackList::new();
        while list.add(MAX_BEATS_PER_CYCLE as i64).is_some() {}
        let audible = resolve(list.tracks());
        let tempo = Tempo::new(Tempo::MAX as i64);

        let (output, tap) = OfflineOutput::new(SAMPLE_RATE);
        let mut engine = PrecisionEngine::with_config(output, &config);
        engine.start().unwrap();

        let mut sched = LookaheadScheduler::from_config(&config);
        sched.arm(config.start_margin);
        let tick_frames =
            (config.tick_interval.as_secs_f64() * SAMPLE_RATE as f64).round() as usize;

        // one second of ticks, the device pulling one tick's worth between them
        let mut events = Vec::new();
        let mut emitted = 0;
        for _ in 0..40 {
            events.clear();
            sched.tick(engine.clock().now(), tempo, &audible, &mut events);
            for event in &events {
                engine.emit(BeatTrigger {
                    track: event.track,
                    spec: ToneSpec {
                        frequency: event.frequency,
                        accented: event.accented,
                        density: event.beats_per_cycle,
                        volume: event.volume,
                    },
                    at: event.at,
                });
            }
            emitted += events.len();
            tap.render(tick_frames);
        }

        assert!(emitted >= 4 * MAX_TRACKS * MAX_BEATS_PER_CYCLE as usize);
        assert_eq!(engine.overflows(), 0);
        assert_eq!(engine.dropped(), 0);
    }
}
