//! Scrolling view of upcoming states.
//!
//! The current state sits on the bottom row and later states stack upwards,
//! one row per position, aligned with the keyboard below.

use super::{channel_color, KeyGeometry};
use crate::app::ViewState;
use crate::midi::SongModel;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

/// Character used for note bars.
const NOTE_CHAR: char = '█';
/// Grid line drawn on the first state of a measure.
const MEASURE_CHAR: char = '─';
/// Grid dot drawn on the first state of a beat.
const BEAT_CHAR: char = '·';

/// One terminal cell of the roll.
#[derive(Debug, Clone, Copy)]
struct Cell {
    ch: char,
    style: Style,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            style: Style::default(),
        }
    }
}

/// Builds the cells of one row for `position`.
fn build_row(
    song: &SongModel,
    view: &ViewState,
    geometry: &KeyGeometry,
    area: Rect,
    position: usize,
) -> Vec<Cell> {
    let mut cells = vec![Cell::default(); area.width as usize];

    // Background grid
    let loop_range = view.player.loop_range;
    let on_loop_bound = position == loop_range.lo || position == loop_range.hi;
    let grid = if song.starts_measure(position) {
        Some((MEASURE_CHAR, Color::Gray))
    } else if song.beat_at(position).is_some() {
        Some((BEAT_CHAR, Color::DarkGray))
    } else {
        None
    };
    if let Some((ch, color)) = grid {
        let color = if on_loop_bound { Color::Magenta } else { color };
        for cell in cells.iter_mut() {
            *cell = Cell {
                ch,
                style: Style::default().fg(color),
            };
        }
    }
    if on_loop_bound {
        // Loop marker at both edges
        for x in [0, cells.len().saturating_sub(1)] {
            if let Some(cell) = cells.get_mut(x) {
                *cell = Cell {
                    ch: if position == loop_range.lo { '[' } else { ']' },
                    style: Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                };
            }
        }
    }

    let Some(state) = song.state_at(position) else {
        return cells;
    };
    for event in state.events() {
        let Some(column) = geometry.column(event.note) else {
            continue;
        };
        let mut style = Style::default().fg(channel_color(song, event.channel));
        if view.player.ignored_channels.contains(&event.channel) {
            style = style.add_modifier(Modifier::DIM);
        }
        let start = column.saturating_sub(area.x) as usize;
        for x in start..start + geometry.note_width(event.note) as usize {
            if let Some(cell) = cells.get_mut(x) {
                *cell = Cell {
                    ch: NOTE_CHAR,
                    style,
                };
            }
        }
    }
    cells
}

/// Joins runs of equally styled cells into spans.
fn cells_to_line(cells: Vec<Cell>, row_style: Style) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut run = String::new();
    let mut run_style: Option<Style> = None;

    for cell in cells {
        let style = row_style.patch(cell.style);
        if run_style != Some(style) {
            if let Some(previous) = run_style {
                spans.push(Span::styled(std::mem::take(&mut run), previous));
            }
            run_style = Some(style);
        }
        run.push(cell.ch);
    }
    if let Some(style) = run_style {
        spans.push(Span::styled(run, style));
    }
    Line::from(spans)
}

/// Chord names per unmuted channel at `position`.
fn chord_summary(song: &SongModel, view: &ViewState, position: usize) -> String {
    song.active_channels(position)
        .into_iter()
        .filter(|channel| !view.player.ignored_channels.contains(channel))
        .map(|channel| song.chord_name(position, channel))
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>()
        .join("  ")
}

/// Renders the piano roll.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `area` - The area to render in
/// * `song` - The song being played
/// * `view` - Snapshot of the player
/// * `geometry` - Key columns shared with the keyboard
pub fn render_piano_roll(
    frame: &mut Frame,
    area: Rect,
    song: &SongModel,
    view: &ViewState,
    geometry: &KeyGeometry,
) {
    let position = view.player.song_position;
    let chords = chord_summary(song, view, position);
    let title = if chords.is_empty() {
        format!(" Measure {} ", song.measure_of(position) + 1)
    } else {
        format!(" Measure {}  Chords: {} ", song.measure_of(position) + 1, chords)
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    // Top row is the furthest ahead
    let lines: Vec<Line<'static>> = (0..inner.height as usize)
        .rev()
        .map(|offset| {
            let row_position = position + offset;
            if row_position >= song.len() {
                return Line::raw("");
            }
            let row_style = if offset == 0 {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            cells_to_line(
                build_row(song, view, geometry, inner, row_position),
                row_style,
            )
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::config::Config;
    use crate::midi::fixtures::two_channel_song;
    use crate::midi::ImportedSong;

    fn test_app() -> App {
        let imported = ImportedSong {
            name: "roll".to_string(),
            ppqn: 40,
            events: two_channel_song(40),
        };
        App::new(imported, &Config::default(), None).0
    }

    #[test]
    fn test_row_places_notes_on_key_columns() {
        let app = test_app();
        let view = app.view();
        let area = Rect::new(1, 0, 104, 10);
        let geometry = KeyGeometry::new((21, 108), area);

        let cells = build_row(app.song(), &view, &geometry, area, 0);
        for note in [48u8, 60, 64, 67] {
            let x = (geometry.column(note).expect("in range") - area.x) as usize;
            assert_eq!(cells[x].ch, NOTE_CHAR, "note {note}");
        }
        let x = (geometry.column(62).expect("in range") - area.x) as usize;
        assert_ne!(cells[x].ch, NOTE_CHAR);
    }

    #[test]
    fn test_chord_summary_skips_muted_channels() {
        let app = test_app();
        assert_eq!(chord_summary(app.song(), &app.view(), 0), "C");

        app.player().ignore_channel(0);
        assert_eq!(chord_summary(app.song(), &app.view(), 0), "");
    }

    #[test]
    fn test_cells_merge_into_runs() {
        let style = Style::default().fg(Color::Cyan);
        let cells = vec![
            Cell { ch: 'a', style },
            Cell { ch: 'b', style },
            Cell::default(),
        ];
        let line = cells_to_line(cells, Style::default());
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].content, "ab");
    }
}
