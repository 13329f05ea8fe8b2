//! Error types
//!
//! Bad input never shows up here: tempo, beats and volume are clamped and a
//! bad link falls back to defaults. What remains is the audio output failing
//! to start, and a link with no usable tracks.

use thiserror::Error;

/// Errors raised while opening or starting an audio output
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No output device present (or none the host will give us)
    #[error("No audio output device available")]
    NoOutputDevice,

    /// Failed to query the device configuration
    #[error("Failed to get device config: {0}")]
    Config(String),

    /// Failed to build the output stream
    #[error("Failed to build audio stream: {0}")]
    Build(String),

    /// Stream built but could not be started or resumed
    #[error("Failed to start audio stream: {0}")]
    Play(String),

    /// Device only offers sample formats we don't render
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The output refused to open (blocked host, missing permission)
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the transport controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// `start()` could not bring the engine up. Transport state is fully
    /// torn down, so calling `start()` again is safe.
    #[error("Playback engine unavailable: {0}")]
    EngineUnavailable(#[from] EngineError),

    /// The tick driver thread could not be spawned
    #[error("Failed to spawn tick driver: {0}")]
    Driver(String),
}

/// Errors from decoding a shared state string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A `tracks` field was present but none of its entries parsed
    #[error("No valid track entries in encoded state")]
    NoValidTracks,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
