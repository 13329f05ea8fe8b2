pub mod audibility; // Mute/deafen resolution
pub mod clock;
pub mod codec; // Shareable state strings
pub mod config;
pub mod dsp;
pub mod engine; // Precision and fallback playback
pub mod error;
pub mod phase;
pub mod runtime; // Tick driver
pub mod scheduler;
pub mod tempo;
pub mod track;
pub mod transport;

pub use codec::{decode, decode_or_default, encode, SessionState, ShareLink, Theme};
pub use config::TransportConfig;
pub use engine::{EngineKind, PlaybackEngine};
pub use error::{CodecError, EngineError, TransportError};
pub use runtime::Player;
pub use tempo::Tempo;
pub use track::{Track, TrackId, TrackList, TrackSettings};
pub use transport::Transport;

pub const MAX_BLOCK_SIZE: usize = 2048;
