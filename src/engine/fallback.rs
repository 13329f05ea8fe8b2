/*
Fallback Engine
===============

For hosts where a live render callback cannot be trusted to run on time,
beats are not synthesised per trigger. Instead:

  1. Each distinct (pitch, accent, loudness) combination is rendered ONCE
     into a short clip and cached.

  2. A timer thread holds a deadline queue of (instant, clip). When an
     instant comes due on the wall clock, the next handle of a fixed
     round-robin pool is told to play that clip from the start.

  3. The audio callback only copies clip samples for the handles that are
     playing. No synthesis, no allocation.

    emit(trigger) ──→ ClipCache ──→ TimerQueue ──(timer thread)──→ HandlePool
                                                                      │
                                              rtrb ring  ←── ClipStart┘
                                                 │
                                              ClipMixer (audio thread)

Timing is only as good as the timer thread's wakeups, which is the price of
not trusting the render callback. Loudness is quantised to a few steps so
the cache stays small.

A timer that comes due more than the resync tolerance late (the thread was
starved or the host suspended) is skipped rather than played, so a stall
never turns into a burst of stale beats.

Reusing a handle that is still sounding cuts its clip off. With the default
pool of 8 handles and 0.2s clips that only happens above 40 beats/second.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rtrb::{Consumer, Producer, RingBuffer};

use super::output::{OutputBackend, RenderFn};
use super::timer::TimerQueue;
use super::{BeatTrigger, EngineKind, PlaybackEngine};
use crate::clock::Clock;
use crate::config::TransportConfig;
use crate::dsp::{peak_for, Tone, ToneSpec};
use crate::error::{EngineError, EngineResult};

/// Loudness steps per clip. Step 0 is silence and never rendered.
pub const LOUDNESS_STEPS: u8 = 8;

const CLIP_QUEUE_SIZE: usize = 256;
const FADE_OUT: f32 = 0.005;

/// Longest the timer thread sleeps without checking the clock.
const MAX_TIMER_WAIT: f64 = 0.05;
const MIN_TIMER_WAIT: f64 = 0.000_5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipKey {
    pub frequency_hz: u32,
    pub accented: bool,
    pub loudness: u8,
}

impl ClipKey {
    /// `None` when the beat would be inaudible.
    pub fn quantize(spec: &ToneSpec) -> Option<Self> {
        let steps = (spec.loudness() * LOUDNESS_STEPS as f32).round();
        let loudness = steps.clamp(0.0, LOUDNESS_STEPS as f32) as u8;
        if loudness == 0 || !spec.frequency.is_finite() || spec.frequency <= 0.0 {
            return None;
        }
        Some(Self {
            frequency_hz: spec.frequency.round() as u32,
            accented: spec.accented,
            loudness,
        })
    }

    pub fn loudness(&self) -> f32 {
        self.loudness as f32 / LOUDNESS_STEPS as f32
    }

    fn spec(&self) -> ToneSpec {
        ToneSpec {
            frequency: self.frequency_hz as f32,
            accented: self.accented,
            density: 1,
            volume: 1.0,
        }
    }
}

/// Pre-rendered clips, one per [`ClipKey`].
pub struct ClipCache {
    sample_rate: f32,
    clip_len: usize,
    clips: HashMap<ClipKey, Arc<[f32]>>,
}

impl ClipCache {
    pub fn new(sample_rate: f32, clip_duration: f64) -> Self {
        Self {
            sample_rate,
            clip_len: ((clip_duration * sample_rate as f64).round() as usize).max(1),
            clips: HashMap::new(),
        }
    }

    pub fn get_or_render(&mut self, key: ClipKey) -> Arc<[f32]> {
        let (sample_rate, clip_len) = (self.sample_rate, self.clip_len);
        self.clips
            .entry(key)
            .or_insert_with(|| {
                log::trace!("rendering clip {key:?}");
                render_clip(key, sample_rate, clip_len)
            })
            .clone()
    }

    pub fn clip_len(&self) -> usize {
        self.clip_len
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn render_clip(key: ClipKey, sample_rate: f32, clip_len: usize) -> Arc<[f32]> {
    let tone = Tone::with_peak(&key.spec(), peak_for(key.loudness()), sample_rate);
    let mut samples = tone.render_to_vec(clip_len);

    // short linear fade so truncated tails don't click
    let fade = ((FADE_OUT * sample_rate) as usize).clamp(1, clip_len);
    let tail = clip_len - fade;
    for (i, s) in samples[tail..].iter_mut().enumerate() {
        *s *= 1.0 - (i + 1) as f32 / fade as f32;
    }
    samples.into()
}

/// Fixed set of playback handles, handed out in rotation.
#[derive(Debug, Clone)]
pub struct HandlePool {
    size: usize,
    next: usize,
}

impl HandlePool {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            next: 0,
        }
    }

    pub fn acquire(&mut self) -> usize {
        let handle = self.next;
        self.next = (self.next + 1) % self.size;
        handle
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Start `clip` from the top on `handle`.
#[derive(Debug, Clone)]
pub struct ClipStart {
    pub handle: usize,
    pub clip: Arc<[f32]>,
}

struct Playing {
    clip: Arc<[f32]>,
    pos: usize,
}

/// Audio-thread half: one playback slot per handle.
pub struct ClipMixer {
    rx: Consumer<ClipStart>,
    slots: Vec<Option<Playing>>,
}

impl ClipMixer {
    pub fn new(rx: Consumer<ClipStart>, handles: usize) -> Self {
        Self {
            rx,
            slots: (0..handles.max(1)).map(|_| None).collect(),
        }
    }

    pub fn render(&mut self, out: &mut [f32]) {
        while let Ok(start) = self.rx.pop() {
            if let Some(slot) = self.slots.get_mut(start.handle) {
                *slot = Some(Playing {
                    clip: start.clip,
                    pos: 0,
                });
            }
        }

        for slot in self.slots.iter_mut() {
            let Some(playing) = slot.as_mut() else {
                continue;
            };
            let remaining = &playing.clip[playing.pos..];
            let n = remaining.len().min(out.len());
            for (o, &s) in out.iter_mut().zip(&remaining[..n]) {
                *o += s;
            }
            playing.pos += n;
            if playing.pos >= playing.clip.len() {
                *slot = None;
            }
        }
    }

    pub fn playing(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

struct Dispatch {
    queue: TimerQueue<Arc<[f32]>>,
    pool: HandlePool,
    tx: Option<Producer<ClipStart>>,
    late_tolerance: f64,
    fired: u64,
    skipped: u64,
}

impl Dispatch {
    fn fire_due(&mut self, now: f64) -> usize {
        let mut n = 0;
        let mut stale = 0;
        while let Some((due, clip)) = self.queue.pop_due(now) {
            if now - due > self.late_tolerance {
                stale += 1;
                continue;
            }
            let handle = self.pool.acquire();
            if let Some(tx) = self.tx.as_mut() {
                if tx.push(ClipStart { handle, clip }).is_err() {
                    log::warn!("clip queue full, beat dropped");
                }
            }
            self.fired += 1;
            n += 1;
        }
        if stale > 0 {
            log::debug!("skipped {stale} clip(s) due more than {:.3}s ago", self.late_tolerance);
            self.skipped += stale;
        }
        n
    }
}

struct Shared {
    dispatch: Mutex<Dispatch>,
    wake: Condvar,
    shutdown: AtomicBool,
}

/// Clip-based engine timed on the wall clock.
pub struct FallbackEngine<B: OutputBackend> {
    backend: B,
    wall: Arc<dyn Clock>,
    shared: Arc<Shared>,
    cache: Option<ClipCache>,
    clip_duration: f64,
    worker: Option<JoinHandle<()>>,
    running: bool,
}

impl<B: OutputBackend> FallbackEngine<B> {
    pub fn new(backend: B, wall: Arc<dyn Clock>, config: &TransportConfig) -> Self {
        let shared = Arc::new(Shared {
            dispatch: Mutex::new(Dispatch {
                queue: TimerQueue::new(),
                pool: HandlePool::new(config.clip_pool_size),
                tx: None,
                late_tolerance: config.resync_tolerance,
                fired: 0,
                skipped: 0,
            }),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        Self {
            backend,
            wall,
            shared,
            cache: None,
            clip_duration: config.clip_duration,
            worker: None,
            running: false,
        }
    }

    /// Fire every timer due at `now`. The timer thread does this on its
    /// own; calling it directly only makes dispatch deterministic.
    pub fn pump(&self, now: f64) -> usize {
        self.shared.dispatch.lock().fire_due(now)
    }

    /// Clips handed to the mixer so far.
    pub fn fired(&self) -> u64 {
        self.shared.dispatch.lock().fired
    }

    /// Timers dropped for coming due too late.
    pub fn skipped(&self) -> u64 {
        self.shared.dispatch.lock().skipped
    }

    /// Timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.shared.dispatch.lock().queue.len()
    }

    pub fn cache(&self) -> Option<&ClipCache> {
        self.cache.as_ref()
    }

    fn open(&mut self) -> EngineResult<()> {
        let (tx, rx) = RingBuffer::<ClipStart>::new(CLIP_QUEUE_SIZE);
        let handles = self.shared.dispatch.lock().pool.size();

        let info = self.backend.open(Box::new(move |_info| {
            let mut mixer = ClipMixer::new(rx, handles);
            let render: RenderFn = Box::new(move |out: &mut [f32]| mixer.render(out));
            render
        }))?;

        self.cache = Some(ClipCache::new(info.sample_rate as f32, self.clip_duration));
        self.shared.dispatch.lock().tx = Some(tx);
        Ok(())
    }

    fn spawn_timer(&mut self) -> EngineResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let shared = self.shared.clone();
        let clock = self.wall.clone();
        let handle = thread::Builder::new()
            .name("polybeat-timer".into())
            .spawn(move || run_timer(shared, clock))
            .map_err(|e| EngineError::Build(e.to_string()))?;
        self.worker = Some(handle);
        Ok(())
    }
}

fn run_timer(shared: Arc<Shared>, clock: Arc<dyn Clock>) {
    let mut dispatch = shared.dispatch.lock();
    while !shared.shutdown.load(Ordering::Acquire) {
        let now = clock.now();
        dispatch.fire_due(now);

        let wait = match dispatch.queue.next_due() {
            Some(due) => (due - now).clamp(MIN_TIMER_WAIT, MAX_TIMER_WAIT),
            None => MAX_TIMER_WAIT,
        };
        shared
            .wake
            .wait_for(&mut dispatch, Duration::from_secs_f64(wait));
    }
    log::debug!("timer thread exiting");
}

impl<B: OutputBackend> PlaybackEngine for FallbackEngine<B> {
    fn kind(&self) -> EngineKind {
        EngineKind::Fallback
    }

    fn start(&mut self) -> EngineResult<()> {
        if self.running {
            return Ok(());
        }
        if self.cache.is_none() || !self.backend.is_open() {
            self.open()?;
        }
        self.spawn_timer()?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.cancel_pending();
        self.running = false;
    }

    fn cancel_pending(&mut self) {
        let cancelled = self.shared.dispatch.lock().queue.cancel_all();
        if cancelled > 0 {
            log::debug!("cancelled {cancelled} pending clip(s)");
        }
    }

    fn emit(&mut self, trigger: BeatTrigger) {
        if !self.running {
            return;
        }
        let Some(key) = ClipKey::quantize(&trigger.spec) else {
            return;
        };
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        let clip = cache.get_or_render(key);
        self.shared.dispatch.lock().queue.schedule(trigger.at, clip);
        self.shared.wake.notify_one();
    }

    fn clock(&self) -> &dyn Clock {
        self.wall.as_ref()
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl<B: OutputBackend> Drop for FallbackEngine<B> {
    fn drop(&mut self) {
        {
            let _dispatch = self.shared.dispatch.lock();
            self.shared.shutdown.store(true, Ordering::Release);
        }
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.backend.close();
    }
}
