//! TUI for polybeat
//!
//! Pure rendering: every widget draws from a [`View`] built by the app each
//! frame and never touches the player.

mod tracks;
mod transport;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use polybeat::audibility::AudibleSet;
use polybeat::{EngineKind, Tempo, Theme, Track};

use tracks::render_tracks;
use transport::render_transport;

/// Everything one frame shows.
pub struct View<'a> {
    pub tempo: Tempo,
    pub playing: bool,
    pub engine: EngineKind,
    pub theme: Theme,
    pub tracks: &'a [Track],
    pub audible: AudibleSet,
    pub selected: usize,
    pub phase: Option<f64>,
    pub flash: bool,
    pub status: &'a str,
    pub link: &'a str,
}

/// Colours for one theme.
#[derive(Clone, Copy)]
pub struct Palette {
    pub bg: Color,
    pub fg: Color,
    pub dim: Color,
    pub accent: Color,
    pub flash: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                bg: Color::Reset,
                fg: Color::White,
                dim: Color::DarkGray,
                accent: Color::Cyan,
                flash: Color::Yellow,
            },
            Theme::Light => Self {
                bg: Color::White,
                fg: Color::Black,
                dim: Color::Gray,
                accent: Color::Blue,
                flash: Color::Red,
            },
        }
    }

    pub fn base(&self) -> Style {
        Style::default().fg(self.fg).bg(self.bg)
    }
}

pub fn render(frame: &mut Frame, view: &View) {
    let palette = Palette::for_theme(view.theme);
    let area = frame.area();
    frame.render_widget(Block::default().style(palette.base()), area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Transport bar
            Constraint::Min(4),    // Tracks
            Constraint::Length(3), // Share link
            Constraint::Length(1), // Help bar
        ])
        .split(area);

    render_transport(frame, chunks[0], view, &palette);

    let tracks_block = Block::default()
        .title(" Tracks ")
        .borders(Borders::ALL)
        .style(palette.base());
    let tracks_inner = tracks_block.inner(chunks[1]);
    frame.render_widget(tracks_block, chunks[1]);
    render_tracks(frame, tracks_inner, view, &palette);

    let link = if view.link.is_empty() { "(defaults)" } else { view.link };
    let link = Paragraph::new(format!(" #{link}")).block(
        Block::default()
            .title(" Share ")
            .borders(Borders::ALL)
            .style(palette.base()),
    );
    frame.render_widget(link, chunks[2]);

    let help = Paragraph::new(
        " [Space] Play/Stop  [+/-] Tempo  [a/x] Add/Remove  [←/→] Beats  \
         [[/]] Volume  [m] Mute  [d] Deafen  [t] Theme  [q] Quit",
    )
    .style(Style::default().fg(palette.dim).bg(palette.bg));
    frame.render_widget(help, chunks[3]);
}
