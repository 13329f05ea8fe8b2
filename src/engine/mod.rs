//! Playback engines - turn timed beat triggers into sound
//!
//! Two implementations share one trait:
//!
//! - [`PrecisionEngine`] renders every beat live on the audio thread and
//!   starts it on an exact frame of the device clock.
//! - [`FallbackEngine`] plays pre-rendered clips, started by a timer thread
//!   against the wall clock. Used where a live render callback is not
//!   dependable.
//!
//! The transport picks one at construction with [`select_engine`] and only
//! ever sees a `Box<dyn PlaybackEngine>`.

pub mod fallback;
pub mod output;
pub mod precision;
pub mod timer;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::config::TransportConfig;
use crate::dsp::ToneSpec;
use crate::error::EngineResult;
use crate::track::TrackId;

pub use fallback::{ClipCache, ClipKey, ClipMixer, ClipStart, FallbackEngine, HandlePool};
pub use output::{CpalOutput, OfflineOutput, OfflineTap, OutputBackend, OutputInfo};
pub use precision::{beat_capacity, PrecisionEngine, RendererCommand, ToneRenderer};
pub use timer::TimerQueue;

/// One beat, due at `at` in the engine's own clock frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatTrigger {
    pub track: TrackId,
    pub spec: ToneSpec,
    pub at: f64,
}

/// Sound-producing backend behind the transport.
///
/// `emit` is fire-and-forget: the engine owns the sound from then on and
/// nothing about an individual beat is reported back.
pub trait PlaybackEngine: Send {
    fn kind(&self) -> EngineKind;

    /// Acquire the audio output. Idempotent while running.
    fn start(&mut self) -> EngineResult<()>;

    /// Stop accepting beats and drop everything not yet sounding. Beats
    /// already sounding finish their envelope.
    fn stop(&mut self);

    /// Drop scheduled beats that have not started yet, stay running.
    fn cancel_pending(&mut self);

    fn emit(&mut self, trigger: BeatTrigger);

    /// The clock `BeatTrigger::at` is expressed in.
    fn clock(&self) -> &dyn Clock;

    fn is_running(&self) -> bool;
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Precision,
    Fallback,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Precision => write!(f, "precision"),
            EngineKind::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown engine `{0}` (expected `precision` or `fallback`)")]
pub struct ParseEngineKindError(String);

impl FromStr for EngineKind {
    type Err = ParseEngineKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "precision" | "oscillator" => Ok(EngineKind::Precision),
            "fallback" | "clip" | "clips" => Ok(EngineKind::Fallback),
            other => Err(ParseEngineKindError(other.to_string())),
        }
    }
}

/// Hosts whose audio stacks suspend or throttle live render callbacks.
const UNRELIABLE_HOSTS: &[&str] = &["ios", "android"];

/// What the process knows about where it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentProfile {
    pub os: String,
    /// Engine requested through the environment.
    pub requested: Option<EngineKind>,
}

impl EnvironmentProfile {
    pub const ENGINE_VAR: &'static str = "POLYBEAT_ENGINE";

    pub fn detect() -> Self {
        let requested = match std::env::var(Self::ENGINE_VAR) {
            Ok(value) => match value.parse() {
                Ok(kind) => Some(kind),
                Err(err) => {
                    log::warn!("ignoring {}: {}", Self::ENGINE_VAR, err);
                    None
                }
            },
            Err(_) => None,
        };

        Self {
            os: std::env::consts::OS.to_string(),
            requested,
        }
    }

    pub fn prefers_fallback(&self) -> bool {
        UNRELIABLE_HOSTS.contains(&self.os.as_str())
    }
}

/// Pick the engine for this session.
///
/// An explicit config override wins, then the environment variable, then
/// the host heuristic.
pub fn select_engine(
    profile: &EnvironmentProfile,
    config_override: Option<EngineKind>,
) -> EngineKind {
    if let Some(kind) = config_override.or(profile.requested) {
        return kind;
    }
    if profile.prefers_fallback() {
        EngineKind::Fallback
    } else {
        EngineKind::Precision
    }
}

/// Build an engine of `kind` on top of `backend`.
///
/// `wall` is only read by the fallback engine, whose timers run in the
/// wall clock's frame.
pub fn build_engine<B>(
    kind: EngineKind,
    backend: B,
    wall: Arc<dyn Clock>,
    config: &TransportConfig,
) -> Box<dyn PlaybackEngine>
where
    B: OutputBackend + 'static,
{
    log::info!("using {kind} playback engine");
    match kind {
        EngineKind::Precision => Box::new(PrecisionEngine::with_config(backend, config)),
        EngineKind::Fallback => Box::new(FallbackEngine::new(backend, wall, config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(os: &str, requested: Option<EngineKind>) -> EnvironmentProfile {
        EnvironmentProfile {
            os: os.to_string(),
            requested,
        }
    }

    #[test]
    fn desktop_hosts_get_precision() {
        for os in ["linux", "macos", "windows"] {
            assert_eq!(select_engine(&profile(os, None), None), EngineKind::Precision);
        }
    }

    #[test]
    fn mobile_hosts_get_fallback() {
        assert_eq!(select_engine(&profile("ios", None), None), EngineKind::Fallback);
        assert_eq!(
            select_engine(&profile("android", None), None),
            EngineKind::Fallback
        );
    }

    #[test]
    fn override_order() {
        let env = profile("ios", Some(EngineKind::Precision));
        assert_eq!(select_engine(&env, None), EngineKind::Precision);
        assert_eq!(
            select_engine(&env, Some(EngineKind::Fallback)),
            EngineKind::Fallback
        );
    }

    #[test]
    fn engine_kind_parses_loosely() {
        assert_eq!(" Precision ".parse(), Ok(EngineKind::Precision));
        assert_eq!("clips".parse(), Ok(EngineKind::Fallback));
        assert!("webaudio".parse::<EngineKind>().is_err());
        assert_eq!(EngineKind::Fallback.to_string(), "fallback");
    }
}
