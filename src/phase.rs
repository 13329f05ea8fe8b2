//! Cycle phase for the display loop
//!
//! The transport publishes the anchor and cycle length of the current run;
//! a display loop on any thread turns them into a phase in `[0, 1)` without
//! ever locking or touching transport state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;

#[derive(Debug)]
struct PhaseCell {
    // f64 bits; NaN anchor means nothing is playing
    anchor: AtomicU64,
    cycle: AtomicU64,
}

/// Writing side, owned by the transport.
#[derive(Debug)]
pub struct PhasePublisher {
    cell: Arc<PhaseCell>,
}

impl PhasePublisher {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(PhaseCell {
                anchor: AtomicU64::new(f64::NAN.to_bits()),
                cycle: AtomicU64::new(f64::NAN.to_bits()),
            }),
        }
    }

    pub fn publish(&self, anchor: f64, cycle_duration: f64) {
        // cycle first: a reader that sees the new anchor sees its cycle too
        self.cell
            .cycle
            .store(cycle_duration.to_bits(), Ordering::Release);
        self.cell.anchor.store(anchor.to_bits(), Ordering::Release);
    }

    pub fn clear(&self) {
        self.cell
            .anchor
            .store(f64::NAN.to_bits(), Ordering::Release);
    }

    pub fn reader(&self, clock: Arc<dyn Clock>) -> PhaseReader {
        PhaseReader {
            cell: self.cell.clone(),
            clock,
        }
    }
}

impl Default for PhasePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the current cycle phase. Cheap to clone.
#[derive(Clone)]
pub struct PhaseReader {
    cell: Arc<PhaseCell>,
    clock: Arc<dyn Clock>,
}

impl PhaseReader {
    /// Phase of the running cycle right now.
    pub fn phase(&self) -> Option<f64> {
        self.phase_at(self.clock.now())
    }

    /// Phase at wall-clock instant `now`. `None` when stopped or before
    /// the first downbeat of a run.
    pub fn phase_at(&self, now: f64) -> Option<f64> {
        let anchor = self.anchor()?;
        let cycle = f64::from_bits(self.cell.cycle.load(Ordering::Acquire));
        if now < anchor || !(cycle > 0.0) {
            return None;
        }
        let phase = ((now - anchor) / cycle).fract();
        Some(if phase >= 1.0 { 0.0 } else { phase })
    }

    pub fn anchor(&self) -> Option<f64> {
        let anchor = f64::from_bits(self.cell.anchor.load(Ordering::Acquire));
        (!anchor.is_nan()).then_some(anchor)
    }

    pub fn is_active(&self) -> bool {
        self.anchor().is_some()
    }
}

/// Beat of an `n`-beat track sounding at `phase`.
pub fn beat_at(phase: f64, beats_per_cycle: u32) -> u32 {
    let n = beats_per_cycle.max(1);
    ((phase.clamp(0.0, 1.0) * n as f64) as u32).min(n - 1)
}

/// Turns a stream of phase readings into one downbeat per cycle.
#[derive(Debug, Default, Clone)]
pub struct DownbeatDetector {
    last: Option<f64>,
}

impl DownbeatDetector {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// True on the first reading of a run and whenever the phase wraps.
    pub fn update(&mut self, phase: Option<f64>) -> bool {
        let Some(phase) = phase else {
            self.last = None;
            return false;
        };
        let downbeat = match self.last {
            None => true,
            Some(prev) => phase < prev,
        };
        self.last = Some(phase);
        downbeat
    }
}
