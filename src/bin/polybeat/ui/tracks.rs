//! Tracks widget - one row per track with its beats lit by the playhead

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use polybeat::phase::beat_at;

use super::{Palette, View};

pub fn render_tracks(frame: &mut Frame, area: Rect, view: &View, palette: &Palette) {
    let mut lines = Vec::with_capacity(view.tracks.len());

    for (i, track) in view.tracks.iter().enumerate() {
        let audible = view.audible.contains(track.id);
        let selected = i == view.selected;
        let base = if audible { palette.fg } else { palette.dim };

        let mut spans = vec![
            Span::styled(
                if selected { "▸ " } else { "  " },
                Style::default().fg(palette.accent),
            ),
            Span::styled(
                format!("{:>2} ", track.beats_per_cycle),
                Style::default().fg(base).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{:>7.2}Hz ", track.frequency()),
                Style::default().fg(palette.dim),
            ),
        ];

        // one cell per beat, the sounding one highlighted
        let current = view.phase.map(|p| beat_at(p, track.beats_per_cycle));
        let cells: String = (0..track.beats_per_cycle)
            .map(|b| match (current == Some(b), b == 0) {
                (true, _) => '█',
                (false, true) => '◆',
                (false, false) => '·',
            })
            .collect();
        spans.push(Span::styled(
            format!("{cells:<20} "),
            Style::default().fg(if audible { palette.accent } else { palette.dim }),
        ));

        spans.push(Span::styled(
            format!("vol {:>3}% ", (track.volume * 100.0).round() as u32),
            Style::default().fg(base),
        ));
        if track.muted {
            spans.push(Span::styled("[M] ", Style::default().fg(palette.flash)));
        }
        if track.deafened {
            spans.push(Span::styled("[D] ", Style::default().fg(palette.flash)));
        }

        let mut line = Line::from(spans);
        if selected {
            line = line.style(Style::default().add_modifier(Modifier::REVERSED));
        }
        lines.push(line);
    }

    frame.render_widget(Paragraph::new(lines), area);
}
