//! Transport controller - play/stop and the decisions around retiming
//!
//! The transport owns the scheduler, the engine and the current snapshot of
//! tempo and tracks. Parameter changes fall into two kinds:
//!
//! - structural (tempo, a track's beat count, the set or order of tracks):
//!   the beat grid itself moves, so the run is torn down and re-anchored on
//!   the next tick. Already scheduled beats that have not started are
//!   cancelled so nothing is doubled or skipped at the splice.
//! - everything else (volume, mute, deafen): read again by the scheduler
//!   when it builds the next cycle; nothing is torn down.

use std::sync::Arc;

use crate::audibility::{resolve, AudibleSet};
use crate::clock::{Clock, ClockOffset};
use crate::config::TransportConfig;
use crate::dsp::ToneSpec;
use crate::engine::{BeatTrigger, EngineKind, PlaybackEngine};
use crate::error::TransportError;
use crate::phase::{PhasePublisher, PhaseReader};
use crate::scheduler::{BeatEvent, LookaheadScheduler, SchedulerState, TickOutcome, TransportState};
use crate::tempo::Tempo;
use crate::track::{Track, TrackId};

pub struct Transport {
    config: TransportConfig,
    wall: Arc<dyn Clock>,
    engine: Box<dyn PlaybackEngine>,
    scheduler: LookaheadScheduler,

    tempo: Tempo,
    tracks: Arc<[Track]>,
    audible: AudibleSet,
    structure: Vec<(TrackId, u32)>,

    playing: bool,
    phase: PhasePublisher,
    events: Vec<BeatEvent>, // reused between ticks
    emitted: u64,
}

impl Transport {
    pub fn new(
        config: TransportConfig,
        wall: Arc<dyn Clock>,
        engine: Box<dyn PlaybackEngine>,
        tempo: Tempo,
        tracks: Arc<[Track]>,
    ) -> Self {
        Self {
            scheduler: LookaheadScheduler::from_config(&config),
            config,
            wall,
            engine,
            tempo,
            audible: resolve(&tracks),
            structure: structure_of(&tracks),
            tracks,
            playing: false,
            phase: PhasePublisher::new(),
            events: Vec::new(),
            emitted: 0,
        }
    }

    /// Start playback. On failure nothing is left armed and calling
    /// `start()` again is safe.
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.playing {
            return Ok(());
        }

        if let Err(err) = self.engine.start() {
            self.scheduler.reset();
            self.phase.clear();
            log::warn!("transport start failed: {err}");
            return Err(err.into());
        }

        self.playing = true;
        self.arm();
        log::info!(
            "transport started ({} engine, {} cycles/min, {} track(s))",
            self.engine.kind(),
            self.tempo,
            self.tracks.len()
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        self.scheduler.reset();
        self.engine.stop();
        self.phase.clear();
        self.playing = false;
        log::info!("transport stopped after {} beat(s)", self.emitted);
    }

    /// Clamp and apply a new tempo. Retimes when playing.
    pub fn set_tempo(&mut self, cycles_per_minute: i64) {
        let tempo = Tempo::new(cycles_per_minute);
        if tempo == self.tempo {
            return;
        }
        self.tempo = tempo;
        if self.playing {
            self.retime("tempo");
        }
    }

    /// Replace the track snapshot. Retimes when playing and the beat
    /// structure changed.
    pub fn set_tracks(&mut self, tracks: Arc<[Track]>) {
        self.audible = resolve(&tracks);
        let structure = structure_of(&tracks);
        self.tracks = tracks;

        if structure != self.structure {
            self.structure = structure;
            if self.playing {
                self.retime("track structure");
            }
        }
    }

    /// One scheduling pass. Called by the tick driver.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.playing {
            return TickOutcome::Idle;
        }
        if self.scheduler.is_idle() {
            self.arm();
        }

        let now = self.wall.now();
        let offset = ClockOffset::sample(self.engine.clock(), self.wall.as_ref());

        self.events.clear();
        let outcome = self
            .scheduler
            .tick(now, self.tempo, &self.audible, &mut self.events);

        for event in &self.events {
            self.engine.emit(BeatTrigger {
                track: event.track,
                spec: ToneSpec {
                    frequency: event.frequency,
                    accented: event.accented,
                    density: event.beats_per_cycle,
                    volume: event.volume,
                },
                at: offset.to_engine(event.at),
            });
        }
        self.emitted += self.events.len() as u64;

        if outcome == TickOutcome::Resync {
            self.phase.clear();
        }
        outcome
    }

    fn arm(&mut self) {
        let anchor = self.wall.now() + self.config.start_margin;
        self.scheduler.arm(anchor);
        self.phase.publish(anchor, self.tempo.cycle_duration());
    }

    fn retime(&mut self, what: &str) {
        log::debug!("{what} changed while playing, retiming");
        self.scheduler.reset();
        self.engine.cancel_pending();
        self.phase.clear();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn tracks(&self) -> &Arc<[Track]> {
        &self.tracks
    }

    pub fn audible(&self) -> &AudibleSet {
        &self.audible
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn transport_state(&self) -> Option<TransportState> {
        self.scheduler.transport_state()
    }

    pub fn phase_reader(&self) -> PhaseReader {
        self.phase.reader(self.wall.clone())
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Beats handed to the engine since construction.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}

fn structure_of(tracks: &[Track]) -> Vec<(TrackId, u32)> {
    tracks.iter().map(|t| (t.id, t.beats_per_cycle)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{OfflineOutput, PrecisionEngine};
    use crate::track::TrackList;

    fn transport(list: &TrackList) -> (Transport, ManualClock, crate::engine::OfflineTap) {
        let clock = ManualClock::new(10.0);
        let (output, tap) = OfflineOutput::new(8_000);
        let transport = Transport::new(
            TransportConfig::new(),
            Arc::new(clock.clone()),
            Box::new(PrecisionEngine::new(output)),
            Tempo::DEFAULT,
            list.snapshot(),
        );
        (transport, clock, tap)
    }

    #[test]
    fn start_arms_after_margin() {
        let (mut t, _clock, _tap) = transport(&TrackList::default());
        t.start().unwrap();
        assert!(t.is_playing());
        assert_eq!(t.scheduler_state(), SchedulerState::Armed);
        let anchor = t.transport_state().unwrap().anchor;
        assert!((anchor - 10.05).abs() < 1e-9);
        assert_eq!(t.phase_reader().anchor(), Some(anchor));
    }

    #[test]
    fn failed_start_is_fully_torn_down() {
        let (mut t, _clock, tap) = transport(&TrackList::default());
        tap.set_failure(Some("no gesture yet"));
        assert!(matches!(
            t.start(),
            Err(TransportError::EngineUnavailable(_))
        ));
        assert!(!t.is_playing());
        assert_eq!(t.scheduler_state(), SchedulerState::Idle);
        assert!(!t.phase_reader().is_active());
        assert_eq!(t.tick(), TickOutcome::Idle);

        tap.set_failure(None);
        t.start().unwrap();
        assert!(t.is_playing());
    }

    #[test]
    fn volume_change_does_not_retime() {
        let mut list = TrackList::default();
        let (mut t, _clock, _tap) = transport(&list);
        t.start().unwrap();
        t.tick();
        let before = t.transport_state();

        let id = list.tracks()[0].id;
        list.set_volume(id, 0.3);
        list.set_muted(id, true);
        t.set_tracks(list.snapshot());
        assert_eq!(t.transport_state(), before);
        assert_eq!(t.audible().len(), 1);
    }

    #[test]
    fn beat_change_retimes() {
        let mut list = TrackList::default();
        let (mut t, _clock, _tap) = transport(&list);
        t.start().unwrap();
        t.tick();

        let id = list.tracks()[1].id;
        list.set_beats(id, 5);
        t.set_tracks(list.snapshot());
        assert_eq!(t.scheduler_state(), SchedulerState::Idle);
        assert!(t.is_playing());

        t.tick();
        assert_eq!(t.transport_state().unwrap().cycle_index, 1);
    }

    #[test]
    fn same_tempo_is_a_no_op() {
        let (mut t, _clock, _tap) = transport(&TrackList::default());
        t.start().unwrap();
        t.tick();
        t.set_tempo(30);
        assert_eq!(t.scheduler_state(), SchedulerState::Running);
        t.set_tempo(1_000);
        assert_eq!(t.tempo().get(), Tempo::MAX);
        assert_eq!(t.scheduler_state(), SchedulerState::Idle);
    }

    #[test]
    fn stop_clears_everything() {
        let (mut t, _clock, _tap) = transport(&TrackList::default());
        t.start().unwrap();
        t.tick();
        t.stop();
        assert!(!t.is_playing());
        assert_eq!(t.transport_state(), None);
        assert!(!t.phase_reader().is_active());
        assert_eq!(t.tick(), TickOutcome::Idle);
    }
}
