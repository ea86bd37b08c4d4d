//! Terminal user interface components.
//!
//! This module draws the practice screen: the transport bar, the piano roll
//! of upcoming states, and the keyboard showing what is required and what is
//! held. It only reads from a [`ViewState`] snapshot, so the render thread
//! never holds a lock while drawing.

mod dialogs;
mod help;
mod keyboard;
mod piano_roll;
mod timeline;

use crate::app::ViewState;
use crate::config::MIN_TERMINAL_WIDTH;
use crate::midi::SongModel;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};
use ratatui::Frame;

pub use dialogs::render_file_browser;
pub use help::render_help;
pub use keyboard::{render_keyboard, KeyGeometry};
pub use piano_roll::render_piano_roll;
pub use timeline::render_timeline;

/// Colours given to channels, in the order of [`SongModel::channels`].
///
/// A channel's index here is the number typed before `i` to mute it.
pub const CHANNEL_PALETTE: [Color; 8] = [
    Color::Cyan,
    Color::Magenta,
    Color::LightBlue,
    Color::LightGreen,
    Color::LightYellow,
    Color::LightRed,
    Color::Blue,
    Color::Green,
];

/// Height of the keyboard panel including its border.
const KEYBOARD_HEIGHT: u16 = 5;

/// Palette colour of `channel` in `song`.
pub fn channel_color(song: &SongModel, channel: u8) -> Color {
    song.channels()
        .iter()
        .position(|&c| c == channel)
        .map(|index| CHANNEL_PALETTE[index % CHANNEL_PALETTE.len()])
        .unwrap_or(Color::Gray)
}

/// Calculates the transport, piano roll and keyboard regions.
fn calculate_layout(size: Rect) -> [Rect; 3] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),               // Transport
            Constraint::Min(3),                  // Piano roll
            Constraint::Length(KEYBOARD_HEIGHT), // Keyboard
        ])
        .split(size);
    [chunks[0], chunks[1], chunks[2]]
}

/// Renders the practice screen.
///
/// The layout is divided into:
/// - Top: transport bar with position, loop, register and status
/// - Center: upcoming states, next state at the bottom
/// - Bottom: the keyboard
pub fn render(frame: &mut Frame, song: &SongModel, view: &ViewState) {
    let size = frame.area();
    if size.width < MIN_TERMINAL_WIDTH {
        render_too_narrow(frame, size);
        return;
    }

    let [transport, roll, keys] = calculate_layout(size);
    // Roll and keyboard share one set of key columns inside their borders
    let key_columns = Rect {
        x: keys.x + 1,
        width: keys.width.saturating_sub(2),
        ..keys
    };
    let geometry = KeyGeometry::new(view.player.display_range, key_columns);

    render_timeline(frame, transport, song, view);
    render_piano_roll(frame, roll, song, view, &geometry);
    render_keyboard(frame, keys, song, view, &geometry);

    if view.show_help {
        render_help(frame);
    }
}

/// Shown instead of the screen while the terminal is too narrow.
fn render_too_narrow(frame: &mut Frame, area: Rect) {
    let message = Paragraph::new(vec![
        Line::from(Span::styled(
            "Terminal too narrow",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(format!(
            "{} columns needed, {} available",
            MIN_TERMINAL_WIDTH, area.width
        )),
    ])
    .wrap(Wrap { trim: true });
    frame.render_widget(message, area);
}

/// Helper function to center a rectangle within another rectangle.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
