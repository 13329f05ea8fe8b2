//! Transport bar widget - tempo, play state, engine and cycle progress

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::{Palette, View};

/// Render the transport bar
pub fn render_transport(frame: &mut Frame, area: Rect, view: &View, palette: &Palette) {
    let block = Block::default()
        .title(" polybeat ")
        .borders(Borders::ALL)
        .style(palette.base());

    let play_symbol = if view.playing { "▶" } else { "■" };
    let play_state = if view.playing { "Playing" } else { "Stopped" };
    let downbeat = if view.flash { "●" } else { "○" };

    // progress through the current cycle
    let bar_width = 16usize;
    let filled = view
        .phase
        .map_or(0, |p| ((p * bar_width as f64) as usize).min(bar_width));
    let progress = format!("{}{}", "━".repeat(filled), "─".repeat(bar_width - filled));

    let line = Line::from(vec![
        Span::styled(
            format!(" {} cycles/min ", view.tempo),
            Style::default().fg(palette.accent),
        ),
        Span::styled(
            format!("({:.2}s)  ", view.tempo.cycle_duration()),
            Style::default().fg(palette.dim),
        ),
        Span::styled(
            format!("{play_symbol} {play_state}  "),
            Style::default().fg(palette.fg).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{downbeat} "),
            Style::default().fg(if view.flash { palette.flash } else { palette.dim }),
        ),
        Span::styled(progress, Style::default().fg(palette.accent)),
        Span::styled(
            format!("  {} engine  ", view.engine),
            Style::default().fg(palette.dim),
        ),
        Span::styled(view.status.to_string(), Style::default().fg(palette.fg)),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}
