//! Clocks - monotonic time sources in seconds
//!
//! The scheduler works in the wall clock's frame. The precision engine plays
//! against the audio device's own clock (frames rendered), which is free to
//! drift from the wall clock. Rather than tracking that drift, the transport
//! samples the offset between the two once per tick with
//! [`ClockOffset::sample`] and converts every instant of that tick with it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic time source, in seconds since an arbitrary epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Host real-time clock, relative to its creation.
#[derive(Debug, Clone)]
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// The `Instant` corresponding to a reading of this clock.
    pub fn instant_at(&self, seconds: f64) -> Instant {
        self.epoch + std::time::Duration::from_secs_f64(seconds.max(0.0))
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Audio hardware clock: frames pulled by the device over the sample rate.
///
/// The audio callback owns the writing side through [`FrameCounter`].
#[derive(Debug, Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl FrameClock {
    pub fn new(sample_rate: f64) -> (Self, FrameCounter) {
        let frames = Arc::new(AtomicU64::new(0));
        (
            Self {
                frames: frames.clone(),
                sample_rate,
            },
            FrameCounter { frames },
        )
    }

    /// Same counter, read at a different sample rate.
    pub fn with_sample_rate(&self, sample_rate: f64) -> Self {
        Self {
            frames: self.frames.clone(),
            sample_rate,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Nearest frame for an instant in this clock's frame.
    pub fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }
}

impl Clock for FrameClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate
    }
}

/// Writing half of a [`FrameClock`], advanced by the audio callback.
#[derive(Debug, Default)]
pub struct FrameCounter {
    frames: Arc<AtomicU64>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A reading handle on this counter.
    pub fn clock(&self, sample_rate: f64) -> FrameClock {
        FrameClock {
            frames: self.frames.clone(),
            sample_rate,
        }
    }

    pub fn load(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn advance(&self, frames: usize) {
        self.frames.fetch_add(frames as u64, Ordering::AcqRel);
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// `engine_now - wall_now`, valid for the tick it was sampled in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockOffset(f64);

impl ClockOffset {
    pub const ZERO: ClockOffset = ClockOffset(0.0);

    pub fn sample(engine: &dyn Clock, wall: &dyn Clock) -> Self {
        Self(engine.now() - wall.now())
    }

    pub fn seconds(self) -> f64 {
        self.0
    }

    /// Convert a wall-clock instant into the engine's frame.
    pub fn to_engine(self, wall_instant: f64) -> f64 {
        wall_instant + self.0
    }

    pub fn to_wall(self, engine_instant: f64) -> f64 {
        engine_instant - self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_clock_follows_counter() {
        let (clock, counter) = FrameClock::new(48_000.0);
        assert_eq!(clock.now(), 0.0);
        counter.advance(24_000);
        assert!((clock.now() - 0.5).abs() < 1e-12);
        assert_eq!(clock.frame_at(0.25), 12_000);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1.0);
        let other = clock.clone();
        clock.advance(0.5);
        assert_eq!(other.now(), 1.5);
    }

    #[test]
    fn offset_converts_between_frames() {
        let wall = ManualClock::new(10.0);
        let audio = ManualClock::new(2.5);
        let offset = ClockOffset::sample(&audio, &wall);
        assert_eq!(offset.seconds(), -7.5);
        assert!((offset.to_engine(10.2) - 2.7).abs() < 1e-9);
        assert!((offset.to_wall(2.7) - 10.2).abs() < 1e-9);
    }

    #[test]
    fn offset_is_resampled_not_accumulated() {
        let wall = ManualClock::new(0.0);
        let audio = ManualClock::new(0.0);

        // audio clock runs slightly fast
        wall.advance(1.0);
        audio.advance(1.001);
        let first = ClockOffset::sample(&audio, &wall);

        wall.advance(1.0);
        audio.advance(1.001);
        let second = ClockOffset::sample(&audio, &wall);

        assert!((first.seconds() - 0.001).abs() < 1e-9);
        assert!((second.seconds() - 0.002).abs() < 1e-9);
    }

    #[test]
    fn wall_clock_is_monotonic() {
        let clock = WallClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
