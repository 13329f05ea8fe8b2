//! App - owns the player and the user's track list, turns keys into
//! transport calls.

use std::path::PathBuf;
use std::time::Duration;

use color_eyre::eyre::{Result as EyreResult, WrapErr};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;

use polybeat::audibility::resolve;
use polybeat::phase::{DownbeatDetector, PhaseReader};
use polybeat::{Player, SessionState, ShareLink, Theme, TrackList, TransportConfig};

use super::ui::{self, View};

/// Frames the downbeat indicator stays lit.
const FLASH_FRAMES: u8 = 6;
const VOLUME_STEP: f32 = 0.1;

pub struct App {
    player: Player,
    tracks: TrackList,
    theme: Theme,
    selected: usize,

    link: ShareLink,
    state_file: Option<PathBuf>,

    phase: PhaseReader,
    downbeat: DownbeatDetector,
    flash: u8,

    status: String,
    should_quit: bool,
}

impl App {
    pub fn new(
        session: SessionState,
        config: TransportConfig,
        stored: &str,
        state_file: Option<PathBuf>,
    ) -> EyreResult<Self> {
        let tracks = session.track_list();
        let player = Player::with_default_output(config, session.tempo, tracks.snapshot())
            .wrap_err("failed to set up playback")?;
        let phase = player.phase_reader();
        let status = format!("{} engine, press space to play", player.engine_kind());

        Ok(Self {
            player,
            tracks,
            theme: session.theme,
            selected: 0,
            link: ShareLink::with_current(stored),
            state_file,
            phase,
            downbeat: DownbeatDetector::new(),
            flash: 0,
            status,
            should_quit: false,
        })
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        while !self.should_quit {
            let phase = self.phase.phase();
            if self.downbeat.update(phase) {
                self.flash = FLASH_FRAMES;
            }

            terminal.draw(|frame| ui::render(frame, &self.view(phase)))?;
            self.flash = self.flash.saturating_sub(1);

            // ~60fps
            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }

        self.player.stop();
        Ok(())
    }

    fn view(&self, phase: Option<f64>) -> View<'_> {
        View {
            tempo: self.player.tempo(),
            playing: self.player.is_playing(),
            engine: self.player.engine_kind(),
            theme: self.theme,
            tracks: self.tracks.tracks(),
            audible: resolve(self.tracks.tracks()),
            selected: self.selected,
            phase,
            flash: self.flash > 0,
            status: &self.status,
            link: self.link.current().unwrap_or(""),
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char(' ') => self.toggle_playback(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.nudge_tempo(1),
            KeyCode::Char('-') | KeyCode::Char('_') => self.nudge_tempo(-1),
            KeyCode::Char('a') => {
                let beats = self.selected_track().map_or(4, |t| t.beats_per_cycle + 1);
                if self.tracks.add(beats as i64).is_some() {
                    self.selected = self.tracks.len() - 1;
                    self.tracks_changed();
                } else {
                    self.status = "track list is full".into();
                }
            }
            KeyCode::Char('x') => {
                let id = self.selected_track().map(|t| t.id);
                if id.and_then(|id| self.tracks.remove(id)).is_some() {
                    self.selected = self.selected.min(self.tracks.len().saturating_sub(1));
                    self.tracks_changed();
                }
            }
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                if self.selected + 1 < self.tracks.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Left => self.edit_beats(-1),
            KeyCode::Right => self.edit_beats(1),
            KeyCode::Char('[') => self.edit_volume(-VOLUME_STEP),
            KeyCode::Char(']') => self.edit_volume(VOLUME_STEP),
            KeyCode::Char('m') => {
                if let Some((id, muted)) = self.selected_track().map(|t| (t.id, t.muted)) {
                    self.tracks.set_muted(id, !muted);
                    self.tracks_changed();
                }
            }
            KeyCode::Char('d') => {
                if let Some((id, deafened)) = self.selected_track().map(|t| (t.id, t.deafened)) {
                    self.tracks.set_deafened(id, !deafened);
                    self.tracks_changed();
                }
            }
            KeyCode::Char('t') => {
                self.theme = self.theme.toggled();
                self.persist();
            }
            _ => {}
        }
    }

    fn toggle_playback(&mut self) {
        self.status = match self.player.toggle() {
            Ok(true) => "playing".into(),
            Ok(false) => "stopped".into(),
            Err(err) => format!("{err} (press space to retry)"),
        };
    }

    fn nudge_tempo(&mut self, delta: i64) {
        let tempo = self.player.tempo().nudged(delta);
        self.player.set_tempo(tempo.get() as i64);
        self.persist();
    }

    fn edit_beats(&mut self, delta: i64) {
        if let Some((id, beats)) = self.selected_track().map(|t| (t.id, t.beats_per_cycle)) {
            self.tracks.set_beats(id, beats as i64 + delta);
            self.tracks_changed();
        }
    }

    fn edit_volume(&mut self, delta: f32) {
        if let Some((id, volume)) = self.selected_track().map(|t| (t.id, t.volume)) {
            self.tracks.set_volume(id, volume + delta);
            self.tracks_changed();
        }
    }

    fn selected_track(&self) -> Option<&polybeat::Track> {
        self.tracks.tracks().get(self.selected)
    }

    fn tracks_changed(&mut self) {
        self.player.set_tracks(self.tracks.snapshot());
        self.persist();
    }

    /// Write the encoded session out, if it changed.
    fn persist(&mut self) {
        let state = SessionState::capture(self.player.tempo(), &self.tracks, self.theme);
        let Some(encoded) = self.link.update(&state) else {
            return;
        };
        log::debug!("session is now {encoded:?}");
        if let Some(path) = &self.state_file {
            if let Err(err) = std::fs::write(path, encoded) {
                log::warn!("failed to write {}: {err}", path.display());
            }
        }
    }
}
