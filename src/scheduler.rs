//! Lookahead scheduler - turns the shared cycle into timed beat events
//!
//! The scheduler is called on a fixed tick (tens of milliseconds) and each
//! time materialises every beat that falls inside a short horizon ahead of
//! "now". Engines receive absolute instants, so tick jitter never reaches
//! the listener as long as the horizon outlasts the gap between ticks.

use crate::audibility::AudibleSet;
use crate::config::TransportConfig;
use crate::tempo::Tempo;
use crate::track::TrackId;

/*
Lookahead Scheduling
====================

Vocabulary
----------

  anchor          Instant at which cycle 0 starts. Fixed for one continuous
                  run; every beat instant is derived from it, never from the
                  previous beat, so rounding error cannot accumulate.

  cycle_index     Next cycle that has not been scheduled yet. Only ever
                  increases while running.

  lookahead       How far past "now" a tick schedules.

  scheduled_until End of the last fully scheduled cycle.


Per Tick
--------

    until = now + lookahead

    while anchor + cycle_index * cycle < until:
        cycle_start = anchor + cycle_index * cycle
        for each audible track with n beats:
            for b in 0..n:
                emit(cycle_start + cycle * b / n, accented = b == 0)
        cycle_index += 1

    scheduled_until = anchor + cycle_index * cycle

Whole cycles are scheduled at once; a cycle is either fully dispatched or
not at all, and because cycle_index only moves forward each
(cycle, track, beat) triple is emitted at most once.


The State Machine
-----------------

    ┌──────┐   arm(anchor)   ┌───────┐   tick   ┌─────────┐
    │ Idle │ ──────────────→ │ Armed │ ───────→ │ Running │ ──┐ tick
    └──────┘                 └───────┘          └─────────┘ ←─┘
       ↑                                             │
       └──────── reset() / stale cycle start ────────┘

Resynchronisation: if a cycle start is already further in the past than the
resync tolerance, ticks stopped arriving for a while (host suspended,
process stopped). Bursting the backlog would play a pile of stale beats at
once, so the scheduler drops back to Idle and the transport re-anchors on
its next tick.
*/

/// One beat to be played, in the wall clock's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    pub cycle: u64,
    pub track: TrackId,
    pub beat: u32,
    pub beats_per_cycle: u32,
    pub frequency: f32,
    pub accented: bool,
    pub volume: f32,
    pub at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,    // no anchor
    Armed,   // anchor set, not ticked yet
    Running, // ticking
}

/// Bookkeeping of one continuous run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportState {
    pub anchor: f64,
    pub cycle_index: u64,
    pub scheduled_until: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing armed; no events.
    Idle,
    Scheduled { cycles: u32, events: usize },
    /// A stale cycle start was found; the scheduler is Idle again.
    Resync,
}

pub struct LookaheadScheduler {
    lookahead: f64,
    resync_tolerance: f64,
    transport: Option<TransportState>,
    running: bool,
}

impl LookaheadScheduler {
    pub fn new(lookahead: f64, resync_tolerance: f64) -> Self {
        Self {
            lookahead,
            resync_tolerance,
            transport: None,
            running: false,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.lookahead, config.resync_tolerance)
    }

    pub fn state(&self) -> SchedulerState {
        match (self.transport, self.running) {
            (None, _) => SchedulerState::Idle,
            (Some(_), false) => SchedulerState::Armed,
            (Some(_), true) => SchedulerState::Running,
        }
    }

    pub fn transport_state(&self) -> Option<TransportState> {
        self.transport
    }

    pub fn anchor(&self) -> Option<f64> {
        self.transport.map(|t| t.anchor)
    }

    pub fn is_idle(&self) -> bool {
        self.transport.is_none()
    }

    /// Idle → Armed. Any previous run is discarded.
    pub fn arm(&mut self, anchor: f64) {
        self.transport = Some(TransportState {
            anchor,
            cycle_index: 0,
            scheduled_until: anchor,
        });
        self.running = false;
    }

    /// Back to Idle: anchor, cycle index and scheduled-until are dropped.
    pub fn reset(&mut self) {
        self.transport = None;
        self.running = false;
    }

    /// Schedule every cycle starting before `now + lookahead`.
    ///
    /// Events are appended to `out` in track order, each track's beats in
    /// beat order.
    pub fn tick(
        &mut self,
        now: f64,
        tempo: Tempo,
        audible: &AudibleSet,
        out: &mut Vec<BeatEvent>,
    ) -> TickOutcome {
        let Some(mut transport) = self.transport else {
            return TickOutcome::Idle;
        };

        let cycle = tempo.cycle_duration();
        let until = now + self.lookahead;
        let first_event = out.len();
        let mut cycles = 0u32;

        loop {
            let cycle_start = transport.anchor + transport.cycle_index as f64 * cycle;
            if cycle_start >= until {
                break;
            }

            if cycle_start < now - self.resync_tolerance {
                log::debug!(
                    "cycle {} started {:.3}s ago, re-anchoring",
                    transport.cycle_index,
                    now - cycle_start
                );
                out.truncate(first_event);
                self.reset();
                return TickOutcome::Resync;
            }

            for track in audible.iter() {
                let n = track.beats_per_cycle.max(1);
                for beat in 0..n {
                    out.push(BeatEvent {
                        cycle: transport.cycle_index,
                        track: track.id,
                        beat,
                        beats_per_cycle: n,
                        frequency: track.frequency,
                        accented: beat == 0,
                        volume: track.volume,
                        at: cycle_start + cycle * beat as f64 / n as f64,
                    });
                }
            }

            transport.cycle_index += 1;
            cycles += 1;
        }

        transport.scheduled_until = transport.anchor + transport.cycle_index as f64 * cycle;
        self.transport = Some(transport);
        self.running = true;

        TickOutcome::Scheduled {
            cycles,
            events: out.len() - first_event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audibility::resolve;
    use crate::track::TrackList;
    use std::collections::HashSet;

    fn audible(beats: &[i64]) -> AudibleSet {
        let mut list = TrackList::new();
        for &b in beats {
            list.add(b);
        }
        resolve(list.tracks())
    }

    #[test]
    fn idle_scheduler_emits_nothing() {
        let mut sched = LookaheadScheduler::new(0.3, 0.1);
        let mut out = Vec::new();
        let outcome = sched.tick(5.0, Tempo::DEFAULT, &audible(&[4]), &mut out);
        assert_eq!(outcome, TickOutcome::Idle);
        assert!(out.is_empty());
    }

    #[test]
    fn beats_subdivide_the_cycle_evenly() {
        let set = audible(&[4, 3, 7]);
        for t in [1, 30, 97, 240] {
            let tempo = Tempo::new(t);
            let cycle = tempo.cycle_duration();
            let mut sched = LookaheadScheduler::new(0.3, 0.1);
            sched.arm(1.0);

            let mut out = Vec::new();
            sched.tick(1.0, tempo, &set, &mut out);

            for ev in &out {
                let cycle_start = 1.0 + ev.cycle as f64 * cycle;
                let expected = cycle_start + ev.beat as f64 * cycle / ev.beats_per_cycle as f64;
                assert!((ev.at - expected).abs() < 1e-9);
                assert_eq!(ev.accented, ev.beat == 0);
            }
            for track in set.iter() {
                let accents = out
                    .iter()
                    .filter(|e| e.track == track.id && e.cycle == 0 && e.accented)
                    .count();
                assert_eq!(accents, 1);
            }
        }
    }

    #[test]
    fn armed_then_running() {
        let mut sched = LookaheadScheduler::new(0.3, 0.1);
        assert_eq!(sched.state(), SchedulerState::Idle);
        sched.arm(0.05);
        assert_eq!(sched.state(), SchedulerState::Armed);
        sched.tick(0.0, Tempo::DEFAULT, &audible(&[4]), &mut Vec::new());
        assert_eq!(sched.state(), SchedulerState::Running);
    }

    #[test]
    fn each_beat_is_dispatched_at_most_once() {
        let set = audible(&[4, 3]);
        let tempo = Tempo::new(120);
        let mut sched = LookaheadScheduler::new(0.3, 0.1);
        sched.arm(0.05);

        let mut seen = HashSet::new();
        let mut last_index = 0;
        let mut now = 0.0;
        while now < 20.0 {
            let mut out = Vec::new();
            sched.tick(now, tempo, &set, &mut out);
            for ev in out {
                assert!(seen.insert((ev.cycle, ev.track, ev.beat)), "duplicate {ev:?}");
            }
            let index = sched.transport_state().unwrap().cycle_index;
            assert!(index >= last_index);
            last_index = index;
            now += 0.025;
        }

        // 20s at 120 cpm is 40 cycles, all of them complete
        let cycles = seen.iter().map(|(c, _, _)| *c).max().unwrap() + 1;
        assert!(cycles >= 40);
        assert_eq!(seen.len() as u64, cycles * 7);
    }

    #[test]
    fn scheduled_until_tracks_last_full_cycle() {
        let tempo = Tempo::new(60);
        let mut sched = LookaheadScheduler::new(0.3, 0.1);
        sched.arm(0.0);
        sched.tick(0.0, tempo, &audible(&[2]), &mut Vec::new());
        let state = sched.transport_state().unwrap();
        assert_eq!(state.cycle_index, 1);
        assert_eq!(state.scheduled_until, 1.0);

        sched.tick(0.5, tempo, &audible(&[2]), &mut Vec::new());
        assert_eq!(sched.transport_state().unwrap().scheduled_until, 1.0);

        sched.tick(0.8, tempo, &audible(&[2]), &mut Vec::new());
        assert_eq!(sched.transport_state().unwrap().scheduled_until, 2.0);
    }

    #[test]
    fn only_the_horizon_is_materialised() {
        let set = audible(&[4, 3]);
        let tempo = Tempo::new(240);
        let mut sched = LookaheadScheduler::new(0.3, 0.1);
        sched.arm(0.0);

        let mut now = 0.0;
        while now < 600.0 {
            let mut out = Vec::new();
            sched.tick(now, tempo, &set, &mut out);
            // a 0.3s horizon holds at most two 0.25s cycles
            assert!(out.len() <= 2 * 7);
            now += 0.025;
        }
    }

    #[test]
    fn stale_cycle_forces_resync_without_burst() {
        let set = audible(&[4]);
        let tempo = Tempo::new(120);
        let mut sched = LookaheadScheduler::new(0.3, 0.1);
        sched.arm(0.0);
        sched.tick(0.0, tempo, &set, &mut Vec::new());

        // the host slept for ten seconds
        let mut out = Vec::new();
        let outcome = sched.tick(10.0, tempo, &set, &mut out);
        assert_eq!(outcome, TickOutcome::Resync);
        assert!(out.is_empty());
        assert_eq!(sched.state(), SchedulerState::Idle);
    }

    #[test]
    fn silent_set_still_advances_cycles() {
        let mut sched = LookaheadScheduler::new(0.3, 0.1);
        sched.arm(0.0);
        let outcome = sched.tick(0.0, Tempo::new(240), &AudibleSet::default(), &mut Vec::new());
        assert_eq!(outcome, TickOutcome::Scheduled { cycles: 2, events: 0 });
    }
}
