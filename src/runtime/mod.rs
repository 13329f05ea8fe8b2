//! Runtime - a transport driven by its own tick thread.
//!
//! # Example
//!
//! ```ignore
//! use polybeat::{runtime::Player, codec, config::TransportConfig};
//!
//! let session = codec::decode_or_default("t=60;tracks=4|3|5");
//! let player = Player::with_default_output(
//!     TransportConfig::new(),
//!     session.tempo,
//!     session.track_list().snapshot(),
//! )?;
//! player.start()?;
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::clock::{Clock, WallClock};
use crate::config::TransportConfig;
use crate::engine::{build_engine, select_engine, CpalOutput, EngineKind, EnvironmentProfile};
use crate::error::TransportError;
use crate::phase::PhaseReader;
use crate::tempo::Tempo;
use crate::track::Track;
use crate::transport::Transport;

/// Owns a [`Transport`] and ticks it at a fixed period, independent of
/// tempo and of the audio hardware.
pub struct Player {
    transport: Arc<Mutex<Transport>>,
    driver: Option<TickDriver>,
}

struct TickDriver {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl Player {
    pub fn new(transport: Transport) -> Result<Self, TransportError> {
        let interval = transport.config().tick_interval;
        let transport = Arc::new(Mutex::new(transport));
        let driver = spawn_driver(transport.clone(), interval)?;
        Ok(Self {
            transport,
            driver: Some(driver),
        })
    }

    /// Player on the default audio device, with the engine picked for this
    /// host (or forced by `config.engine_override`).
    pub fn with_default_output(
        config: TransportConfig,
        tempo: Tempo,
        tracks: Arc<[Track]>,
    ) -> Result<Self, TransportError> {
        let wall: Arc<dyn Clock> = Arc::new(WallClock::new());
        let kind = select_engine(&EnvironmentProfile::detect(), config.engine_override);
        let engine = build_engine(kind, CpalOutput::new(), wall.clone(), &config);
        Self::new(Transport::new(config, wall, engine, tempo, tracks))
    }

    /// Start playback and schedule the first window right away.
    pub fn start(&self) -> Result<(), TransportError> {
        let mut transport = self.transport.lock();
        transport.start()?;
        transport.tick();
        Ok(())
    }

    pub fn stop(&self) {
        self.transport.lock().stop();
    }

    /// Start when stopped, stop when playing.
    pub fn toggle(&self) -> Result<bool, TransportError> {
        let mut transport = self.transport.lock();
        if transport.is_playing() {
            transport.stop();
            Ok(false)
        } else {
            transport.start()?;
            transport.tick();
            Ok(true)
        }
    }

    pub fn set_tempo(&self, cycles_per_minute: i64) {
        self.transport.lock().set_tempo(cycles_per_minute);
    }

    pub fn set_tracks(&self, tracks: Arc<[Track]>) {
        self.transport.lock().set_tracks(tracks);
    }

    pub fn is_playing(&self) -> bool {
        self.transport.lock().is_playing()
    }

    pub fn tempo(&self) -> Tempo {
        self.transport.lock().tempo()
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.transport.lock().engine_kind()
    }

    pub fn phase_reader(&self) -> PhaseReader {
        self.transport.lock().phase_reader()
    }

    /// Run `f` with the transport locked.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut Transport) -> R) -> R {
        f(&mut self.transport.lock())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.stop.send(());
            if driver.thread.join().is_err() {
                log::error!("tick driver panicked");
            }
        }
        self.transport.lock().stop();
    }
}

fn spawn_driver(
    transport: Arc<Mutex<Transport>>,
    interval: Duration,
) -> Result<TickDriver, TransportError> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let thread = thread::Builder::new()
        .name("polybeat-tick".into())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    transport.lock().tick();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
        .map_err(|e| TransportError::Driver(e.to_string()))?;

    Ok(TickDriver {
        stop: stop_tx,
        thread,
    })
}
