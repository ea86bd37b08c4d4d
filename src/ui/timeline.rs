//! Transport bar rendering.
//!
//! Displays the position, measure, loop, register and input device.

use crate::app::ViewState;
use crate::midi::SongModel;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Renders the transport bar at the top of the screen.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `area` - The area to render in
/// * `song` - The song being played
/// * `view` - Snapshot of the session
pub fn render_timeline(frame: &mut Frame, area: Rect, song: &SongModel, view: &ViewState) {
    let block = Block::default()
        .title(format!(" {} ", view.title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(18), // Position
            Constraint::Length(16), // Measure
            Constraint::Length(18), // Loop
            Constraint::Length(12), // Register
            Constraint::Length(10), // Autoplay
            Constraint::Min(20),    // Device / status
        ])
        .split(inner);

    let player = &view.player;
    let label = Style::default().fg(Color::Gray);
    let value = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);

    let last = song.len().saturating_sub(1);
    let position = Line::from(vec![
        Span::styled(" Pos ", label),
        Span::styled(format!("{}/{}", player.song_position, last), value),
    ]);
    frame.render_widget(Paragraph::new(position), chunks[0]);

    let measure = Line::from(vec![
        Span::styled("Measure ", label),
        Span::styled(
            format!(
                "{}/{}",
                song.measure_of(player.song_position) + 1,
                song.measure_count()
            ),
            value,
        ),
    ]);
    frame.render_widget(Paragraph::new(measure), chunks[1]);

    let whole_song = player.loop_range.lo == 0 && player.loop_range.hi == last;
    let loop_style = if whole_song {
        label
    } else {
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD)
    };
    let loop_line = Line::from(vec![
        Span::styled("Loop ", label),
        Span::styled(
            format!("{}-{}", player.loop_range.lo, player.loop_range.hi),
            loop_style,
        ),
    ]);
    frame.render_widget(Paragraph::new(loop_line), chunks[2]);

    let register = Line::from(vec![
        Span::styled("Reg ", label),
        Span::styled(
            player.register.clone().unwrap_or_else(|| "-".to_string()),
            Style::default().fg(Color::Yellow),
        ),
    ]);
    frame.render_widget(Paragraph::new(register), chunks[3]);

    let autoplay = if view.autoplay {
        Span::styled(
            "[>] AUTO",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("[.] STEP", label)
    };
    frame.render_widget(Paragraph::new(Line::from(autoplay)), chunks[4]);

    // A status message takes over the device field while it is shown
    let right = match (&view.status, &view.device) {
        (Some(message), _) => Span::styled(message.clone(), Style::default().fg(Color::Yellow)),
        (None, Some(device)) => {
            Span::styled(format!("MIDI: {device}"), Style::default().fg(Color::Green))
        }
        (None, None) => Span::styled("No MIDI input", Style::default().fg(Color::Red)),
    };
    frame.render_widget(Paragraph::new(Line::from(right)), chunks[5]);
}
