//! Track - one rhythmic voice subdividing the shared cycle
//!
//! A track's position in the list decides its pitch; everything else is
//! set by the user. Every mutation goes through [`reassign_pitches`] so the
//! pitch of each position can never drift from list order.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest accepted subdivision of one cycle.
pub const MAX_BEATS_PER_CYCLE: u32 = 64;

/// Most tracks a list holds. Further additions are refused.
pub const MAX_TRACKS: usize = 16;

/// Volume a freshly added track starts with.
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Pitches handed out by list position (Hz), a descending pentatonic ladder.
pub const PITCH_TABLE: [f32; 8] = [
    880.0, 659.25, 523.25, 440.0, 392.0, 329.63, 261.63, 220.0,
];

/// Stable identity of a track, independent of its position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u64);

/// Hands out track ids. Owned by whoever creates tracks.
#[derive(Debug, Clone, Default)]
pub struct TrackIdGen {
    next: u64,
}

impl TrackIdGen {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_id(&mut self) -> TrackId {
        let id = TrackId(self.next);
        self.next += 1;
        id
    }
}

/// The user-controlled part of a track, without identity or position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSettings {
    pub beats_per_cycle: u32,
    pub volume: f32,
    pub muted: bool,
    pub deafened: bool,
}

impl TrackSettings {
    /// Settings with clamped beats and the default volume.
    pub fn with_beats(beats: i64) -> Self {
        Self {
            beats_per_cycle: clamp_beats(beats),
            volume: DEFAULT_VOLUME,
            muted: false,
            deafened: false,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub beats_per_cycle: u32,
    /// Derived from list position; see [`reassign_pitches`].
    pub pitch_index: usize,
    pub volume: f32,
    pub muted: bool,
    pub deafened: bool,
}

impl Track {
    fn from_settings(id: TrackId, settings: TrackSettings) -> Self {
        let mut track = Self {
            id,
            beats_per_cycle: clamp_beats(settings.beats_per_cycle as i64),
            pitch_index: 0,
            volume: clamp_volume(settings.volume),
            muted: false,
            deafened: false,
        };
        // applied in this order, deafen wins when both are set
        track.set_muted(settings.muted);
        track.set_deafened(settings.deafened);
        track
    }

    pub fn settings(&self) -> TrackSettings {
        TrackSettings {
            beats_per_cycle: self.beats_per_cycle,
            volume: self.volume,
            muted: self.muted,
            deafened: self.deafened,
        }
    }

    /// Frequency for this track's position.
    pub fn frequency(&self) -> f32 {
        PITCH_TABLE[self.pitch_index % PITCH_TABLE.len()]
    }

    /// Muting clears deafen; the two flags are never both set.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.deafened = false;
        }
    }

    /// Deafening clears mute; the two flags are never both set.
    pub fn set_deafened(&mut self, deafened: bool) {
        self.deafened = deafened;
        if deafened {
            self.muted = false;
        }
    }
}

pub fn clamp_beats(beats: i64) -> u32 {
    beats.clamp(1, MAX_BEATS_PER_CYCLE as i64) as u32
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

/// Set each track's pitch index from its position.
pub fn reassign_pitches(tracks: &mut [Track]) {
    for (position, track) in tracks.iter_mut().enumerate() {
        track.pitch_index = position % PITCH_TABLE.len();
    }
}

/// The ordered track list, owned by the caller.
///
/// The transport only ever sees immutable snapshots taken with
/// [`TrackList::snapshot`].
#[derive(Debug, Clone)]
pub struct TrackList {
    tracks: Vec<Track>,
    ids: TrackIdGen,
}

impl TrackList {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            ids: TrackIdGen::new(),
        }
    }

    /// Build a list from settings. Anything past [`MAX_TRACKS`] is ignored.
    pub fn from_settings(settings: &[TrackSettings]) -> Self {
        let mut list = Self::new();
        for s in settings.iter().take(MAX_TRACKS) {
            list.push(*s);
        }
        list
    }

    /// The two-track default: 4 against 3.
    pub fn default_settings() -> Vec<TrackSettings> {
        vec![TrackSettings::with_beats(4), TrackSettings::with_beats(3)]
    }

    /// Append a track. `None` once the list is full.
    pub fn push(&mut self, settings: TrackSettings) -> Option<TrackId> {
        if self.is_full() {
            return None;
        }
        let id = self.ids.next_id();
        self.tracks.push(Track::from_settings(id, settings));
        self.reassign();
        Some(id)
    }

    pub fn add(&mut self, beats: i64) -> Option<TrackId> {
        self.push(TrackSettings::with_beats(beats))
    }

    /// Remove a track. The last remaining track is never removed.
    pub fn remove(&mut self, id: TrackId) -> Option<Track> {
        if self.tracks.len() <= 1 {
            return None;
        }
        let idx = self.position(id)?;
        let removed = self.tracks.remove(idx);
        self.reassign();
        Some(removed)
    }

    /// Move the track at `from` so it ends up at `to`.
    pub fn move_track(&mut self, from: usize, to: usize) {
        if from >= self.tracks.len() || to >= self.tracks.len() || from == to {
            return;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        self.reassign();
    }

    pub fn set_beats(&mut self, id: TrackId, beats: i64) {
        self.update(id, |t| t.beats_per_cycle = clamp_beats(beats));
    }

    pub fn set_volume(&mut self, id: TrackId, volume: f32) {
        self.update(id, |t| t.volume = clamp_volume(volume));
    }

    pub fn set_muted(&mut self, id: TrackId, muted: bool) {
        self.update(id, |t| t.set_muted(muted));
    }

    pub fn set_deafened(&mut self, id: TrackId, deafened: bool) {
        self.update(id, |t| t.set_deafened(deafened));
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tracks.len() >= MAX_TRACKS
    }

    pub fn settings(&self) -> Vec<TrackSettings> {
        self.tracks.iter().map(Track::settings).collect()
    }

    /// Immutable copy for the transport.
    pub fn snapshot(&self) -> Arc<[Track]> {
        Arc::from(self.tracks.as_slice())
    }

    fn update(&mut self, id: TrackId, f: impl FnOnce(&mut Track)) {
        if let Some(track) = self.tracks.iter_mut().find(|t| t.id == id) {
            f(track);
        }
        self.reassign();
    }

    fn reassign(&mut self) {
        reassign_pitches(&mut self.tracks);
    }
}

impl Default for TrackList {
    fn default() -> Self {
        Self::from_settings(&Self::default_settings())
    }
}
