//! State codec - the session as a short shareable string
//!
//! ```text
//! theme=light;t=45;tracks=4|3v50|5m|7d
//! ```
//!
//! `;`-separated `key=value` pairs. Every field equal to its default is
//! left out, so the default session encodes to the empty string. Each track
//! entry is `<beats>[v<percent>][m][d]`. Decoding never trusts its input:
//! bad fields fall back to defaults, bad track entries are skipped, and
//! out-of-range numbers are clamped, including ones too long for an `i64`.
//!
//! A session with no tracks has nothing to share and encodes like the
//! default session.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::tempo::Tempo;
use crate::track::{
    clamp_beats, clamp_volume, TrackList, TrackSettings, DEFAULT_VOLUME, MAX_TRACKS,
};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a shared link carries.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub tempo: Tempo,
    pub tracks: Vec<TrackSettings>,
    pub theme: Theme,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            tempo: Tempo::DEFAULT,
            tracks: TrackList::default_settings(),
            theme: Theme::Dark,
        }
    }
}

impl SessionState {
    /// Capture the current session.
    pub fn capture(tempo: Tempo, tracks: &TrackList, theme: Theme) -> Self {
        Self {
            tempo,
            tracks: tracks.settings(),
            theme,
        }
    }

    /// A fresh track list built from these settings.
    pub fn track_list(&self) -> TrackList {
        TrackList::from_settings(&self.tracks)
    }
}

pub fn encode(state: &SessionState) -> String {
    let mut fields = Vec::new();

    if state.theme != Theme::default() {
        fields.push(format!("theme={}", state.theme));
    }
    if state.tempo != Tempo::DEFAULT {
        fields.push(format!("t={}", state.tempo.get()));
    }

    let tracks = encode_tracks(&state.tracks);
    if !tracks.is_empty() && tracks != encode_tracks(&TrackList::default_settings()) {
        fields.push(format!("tracks={tracks}"));
    }

    fields.join(";")
}

fn encode_tracks(tracks: &[TrackSettings]) -> String {
    tracks
        .iter()
        .take(MAX_TRACKS)
        .map(encode_entry)
        .collect::<Vec<_>>()
        .join("|")
}

fn encode_entry(track: &TrackSettings) -> String {
    let mut entry = clamp_beats(track.beats_per_cycle as i64).to_string();
    let percent = volume_percent(track.volume);
    if percent != volume_percent(DEFAULT_VOLUME) {
        entry.push_str(&format!("v{percent}"));
    }
    if track.deafened {
        entry.push('d');
    } else if track.muted {
        entry.push('m');
    }
    entry
}

fn volume_percent(volume: f32) -> u32 {
    (clamp_volume(volume) * 100.0).round() as u32
}

/// Decode a state string. Only fails when a `tracks` field is present and
/// none of its entries are usable.
pub fn decode(input: &str) -> Result<SessionState, CodecError> {
    let input = input.trim();
    let input = input.strip_prefix('#').unwrap_or(input);
    let mut state = SessionState::default();

    for field in input.split(';') {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key.trim() {
            "theme" => {
                state.theme = match value.trim() {
                    "light" => Theme::Light,
                    _ => Theme::Dark,
                }
            }
            "t" => {
                if let Some(tempo) = parse_saturating(value.trim()) {
                    state.tempo = Tempo::new(tempo);
                }
            }
            "tracks" => state.tracks = decode_tracks(value)?,
            _ => {}
        }
    }

    Ok(state)
}

/// Like [`decode`], with the default session for unusable input.
pub fn decode_or_default(input: &str) -> SessionState {
    decode(input).unwrap_or_else(|err| {
        log::debug!("discarding encoded state {input:?}: {err}");
        SessionState::default()
    })
}

fn decode_tracks(value: &str) -> Result<Vec<TrackSettings>, CodecError> {
    let tracks: Vec<_> = value
        .split('|')
        .filter_map(decode_entry)
        .take(MAX_TRACKS)
        .collect();
    if tracks.is_empty() {
        return Err(CodecError::NoValidTracks);
    }
    Ok(tracks)
}

/// `digits [v digits] [m] [d]`, nothing else.
fn decode_entry(entry: &str) -> Option<TrackSettings> {
    let entry = entry.trim();
    let (beats, rest) = split_digits(entry)?;
    // too many digits for i64 is still "too many beats"
    let beats = beats.parse::<i64>().unwrap_or(i64::MAX);
    if beats < 1 {
        return None;
    }

    let mut settings = TrackSettings::with_beats(beats);
    let mut rest = rest;

    if let Some(after_v) = rest.strip_prefix('v') {
        let (percent, after) = split_digits(after_v)?;
        let percent = percent.parse::<u32>().unwrap_or(u32::MAX);
        settings.volume = clamp_volume(percent as f32 / 100.0);
        rest = after;
    }
    if let Some(after) = rest.strip_prefix('m') {
        settings.muted = true;
        rest = after;
    }
    if let Some(after) = rest.strip_prefix('d') {
        // applied last, so it wins over `m`
        settings.deafened = true;
        settings.muted = false;
        rest = after;
    }

    rest.is_empty().then_some(settings)
}

/// An optionally signed integer. Values past the `i64` range saturate;
/// anything that isn't digits is `None`.
fn parse_saturating(s: &str) -> Option<i64> {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(s.parse::<i64>().unwrap_or(if negative { i64::MIN } else { i64::MAX }))
}

/// Split a non-empty run of leading ASCII digits off `s`.
fn split_digits(s: &str) -> Option<(&str, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    (end > 0).then(|| s.split_at(end))
}

/// Remembers the last string written out so unchanged state is never
/// written twice.
#[derive(Debug, Clone, Default)]
pub struct ShareLink {
    last: Option<String>,
}

impl ShareLink {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Start from a string that is already stored somewhere.
    pub fn with_current(encoded: &str) -> Self {
        Self {
            last: Some(encoded.to_string()),
        }
    }

    /// The new encoding if it differs from the last one written.
    pub fn update(&mut self, state: &SessionState) -> Option<&str> {
        let encoded = encode(state);
        if self.last.as_deref() == Some(encoded.as_str()) {
            return None;
        }
        self.last = Some(encoded);
        self.last.as_deref()
    }

    pub fn current(&self) -> Option<&str> {
        self.last.as_deref()
    }
}
