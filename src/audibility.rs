//! Audibility - which tracks currently make sound
//!
//! Deafen works as a shared solo: once any track is deafened, only the
//! deafened tracks stay in the working set. Mute then removes tracks from
//! whatever set is left. Neither flag scales volume; they only gate
//! membership.
//!
//! Snapshots can be built by hand, so this is also where the track and beat
//! limits are enforced for everything downstream: only the first
//! [`MAX_TRACKS`] tracks are considered and beat counts are clamped.

use crate::track::{clamp_beats, Track, TrackId, MAX_TRACKS};

/// One track that will produce sound, with everything the scheduler needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudibleTrack {
    pub id: TrackId,
    pub beats_per_cycle: u32,
    pub frequency: f32,
    pub volume: f32,
}

/// Audible tracks in list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudibleSet {
    tracks: Vec<AudibleTrack>,
}

impl AudibleSet {
    pub fn iter(&self) -> impl Iterator<Item = &AudibleTrack> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.iter().any(|t| t.id == id)
    }

    /// Effective volume, or `None` when the track is silent.
    pub fn volume_of(&self, id: TrackId) -> Option<f32> {
        self.tracks.iter().find(|t| t.id == id).map(|t| t.volume)
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }
}

/// Derive the audible set from a track snapshot.
pub fn resolve(tracks: &[Track]) -> AudibleSet {
    if tracks.len() > MAX_TRACKS {
        log::warn!(
            "{} tracks in snapshot, only the first {MAX_TRACKS} play",
            tracks.len()
        );
    }
    let tracks = &tracks[..tracks.len().min(MAX_TRACKS)];
    let any_deafened = tracks.iter().any(|t| t.deafened);

    let tracks = tracks
        .iter()
        .filter(|t| !any_deafened || t.deafened)
        .filter(|t| !t.muted)
        .map(|t| AudibleTrack {
            id: t.id,
            beats_per_cycle: clamp_beats(t.beats_per_cycle as i64),
            frequency: t.frequency(),
            volume: t.volume,
        })
        .collect();

    AudibleSet { tracks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{TrackList, TrackSettings, MAX_BEATS_PER_CYCLE};

    fn list(flags: &[(bool, bool)]) -> TrackList {
        let settings: Vec<TrackSettings> = flags
            .iter()
            .enumerate()
            .map(|(i, &(muted, deafened))| TrackSettings {
                beats_per_cycle: i as u32 + 2,
                volume: 0.1 * (i as f32 + 1.0),
                muted,
                deafened,
            })
            .collect();
        TrackList::from_settings(&settings)
    }

    #[test]
    fn no_flags_means_everyone_plays() {
        let list = list(&[(false, false), (false, false), (false, false)]);
        let audible = resolve(list.tracks());
        assert_eq!(audible.len(), 3);
    }

    #[test]
    fn muted_tracks_drop_out() {
        let list = list(&[(true, false), (false, false), (true, false)]);
        let audible = resolve(list.tracks());
        assert_eq!(audible.ids(), vec![list.tracks()[1].id]);
    }

    #[test]
    fn deafen_is_a_shared_solo() {
        let list = list(&[(false, true), (false, false), (false, true)]);
        let audible = resolve(list.tracks());
        assert_eq!(audible.ids(), vec![list.tracks()[0].id, list.tracks()[2].id]);
    }

    #[test]
    fn effective_volume_is_the_track_volume() {
        let list = list(&[(false, true), (false, false)]);
        let audible = resolve(list.tracks());
        let first = list.tracks()[0];
        assert_eq!(audible.volume_of(first.id), Some(first.volume));
        assert_eq!(audible.volume_of(list.tracks()[1].id), None);
    }

    #[test]
    fn everything_muted_is_silence() {
        let list = list(&[(true, false), (true, false)]);
        assert!(resolve(list.tracks()).is_empty());
    }

    #[test]
    fn hand_built_snapshots_are_limited() {
        let template = TrackList::default().tracks()[0];
        let tracks: Vec<Track> = (0..MAX_TRACKS as u64 + 3)
            .map(|i| Track {
                id: TrackId(i),
                beats_per_cycle: 500,
                ..template
            })
            .collect();

        let audible = resolve(&tracks);
        assert_eq!(audible.len(), MAX_TRACKS);
        assert!(!audible.contains(TrackId(MAX_TRACKS as u64)));
        assert!(audible.iter().all(|t| t.beats_per_cycle == MAX_BEATS_PER_CYCLE));
    }
}
