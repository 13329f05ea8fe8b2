//! Transport configuration
//!
//! Every timing constant of the scheduler and engines lives here, with
//! defaults tuned for interactive use. Build one with the consuming setters:
//!
//! ```ignore
//! let config = TransportConfig::new()
//!     .lookahead(0.2)
//!     .tick_interval(Duration::from_millis(20));
//! ```

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::EngineKind;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Horizon materialised by each tick (seconds).
    pub lookahead: f64,
    /// Period of the tick driver; independent of tempo.
    pub tick_interval: Duration,
    /// Delay between `start()` and the first downbeat (seconds).
    pub start_margin: f64,
    /// How far in the past a cycle start may be before the scheduler
    /// gives up and re-anchors (seconds).
    pub resync_tolerance: f64,
    /// Playback handles in the fallback engine's pool.
    pub clip_pool_size: usize,
    /// Length of each pre-rendered fallback clip (seconds).
    pub clip_duration: f64,
    /// Force an engine instead of detecting one.
    pub engine_override: Option<EngineKind>,
}

impl TransportConfig {
    pub fn new() -> Self {
        Self {
            lookahead: 0.3,
            tick_interval: Duration::from_millis(25),
            start_margin: 0.05,
            resync_tolerance: 0.1,
            clip_pool_size: 8,
            clip_duration: 0.2,
            engine_override: None,
        }
    }

    pub fn lookahead(mut self, seconds: f64) -> Self {
        self.lookahead = seconds.max(0.0);
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn start_margin(mut self, seconds: f64) -> Self {
        self.start_margin = seconds.max(0.0);
        self
    }

    pub fn resync_tolerance(mut self, seconds: f64) -> Self {
        self.resync_tolerance = seconds.max(0.0);
        self
    }

    pub fn clip_pool_size(mut self, handles: usize) -> Self {
        self.clip_pool_size = handles.max(1);
        self
    }

    pub fn clip_duration(mut self, seconds: f64) -> Self {
        self.clip_duration = seconds.max(0.01);
        self
    }

    pub fn engine(mut self, kind: EngineKind) -> Self {
        self.engine_override = Some(kind);
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}
