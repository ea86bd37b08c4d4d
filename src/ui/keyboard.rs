//! Piano keyboard display.
//!
//! Shows the keys in the display range, colouring the notes the current
//! state asks for, the keys that are held, and held keys that still have to
//! be released before they count again.

use super::channel_color;
use crate::app::ViewState;
use crate::midi::{is_black_key, SongModel};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use std::collections::BTreeSet;

/// Widest a single white key is drawn.
const MAX_KEY_WIDTH: u16 = 4;

/// Column layout of the keys, shared by the keyboard and the piano roll.
///
/// White keys are `key_width` columns wide. A black key takes the last
/// column of the white key below it, so every note owns a distinct column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGeometry {
    /// Lowest key drawn (always white).
    lo: u8,
    /// Highest key drawn (always white).
    hi: u8,
    /// Columns per white key.
    key_width: u16,
    /// Screen column of the lowest key.
    origin: u16,
}

impl KeyGeometry {
    /// Lays out the keys `range` across `area`.
    pub fn new(range: (u8, u8), area: Rect) -> Self {
        let (mut lo, mut hi) = (range.0.min(range.1), range.0.max(range.1).min(127));
        // Start and end on white keys so black keys have a neighbour to sit on
        if is_black_key(lo) {
            lo -= 1;
        }
        if is_black_key(hi) {
            hi += 1;
        }

        let whites = (lo..=hi).filter(|&n| !is_black_key(n)).count().max(1) as u16;
        let key_width = (area.width / whites).clamp(1, MAX_KEY_WIDTH);
        let used = whites * key_width;
        let origin = area.x + area.width.saturating_sub(used) / 2;

        Self {
            lo,
            hi,
            key_width,
            origin,
        }
    }

    /// Keys drawn, inclusive.
    pub fn range(&self) -> (u8, u8) {
        (self.lo, self.hi)
    }

    /// Index of the white key at or just below `note`.
    fn white_index(&self, note: u8) -> u16 {
        (self.lo..=note).filter(|&n| !is_black_key(n)).count().saturating_sub(1) as u16
    }

    /// Screen column where `note` is drawn, or `None` outside the range.
    pub fn column(&self, note: u8) -> Option<u16> {
        if note < self.lo || note > self.hi {
            return None;
        }
        let white_x = self.origin + self.white_index(note) * self.key_width;
        if is_black_key(note) {
            Some(white_x + self.key_width - 1)
        } else {
            Some(white_x)
        }
    }

    /// Width of a note's bar: a white key minus the column a black key may use.
    pub fn note_width(&self, note: u8) -> u16 {
        if is_black_key(note) || self.key_width == 1 {
            1
        } else {
            self.key_width - 1
        }
    }

    /// Which key a screen column belongs to in the upper (black key) rows.
    fn key_at_upper(&self, x: u16) -> Option<u8> {
        let white = self.key_at_lower(x)?;
        let offset = (x - self.origin) % self.key_width;
        let above = white.checked_add(1).filter(|&n| n <= self.hi && is_black_key(n));
        match above {
            Some(black) if self.key_width > 1 && offset == self.key_width - 1 => Some(black),
            _ => Some(white),
        }
    }

    /// Which white key a screen column belongs to.
    fn key_at_lower(&self, x: u16) -> Option<u8> {
        if x < self.origin {
            return None;
        }
        let index = (x - self.origin) / self.key_width;
        (self.lo..=self.hi)
            .filter(|&n| !is_black_key(n))
            .nth(index as usize)
    }
}

/// Notes grouped by how the keyboard should paint them.
struct KeyStates<'a> {
    song: &'a SongModel,
    position: usize,
    required: BTreeSet<u8>,
    view: &'a ViewState,
}

impl KeyStates<'_> {
    fn style(&self, note: u8) -> Style {
        let pressed = self.view.player.pressed.contains(&note);
        let required = self.required.contains(&note);
        let held_over = self.view.player.need_to_release.contains(&note);

        let base = if is_black_key(note) {
            Style::default().fg(Color::White).bg(Color::Black)
        } else {
            Style::default().fg(Color::Black).bg(Color::White)
        };

        if pressed && held_over {
            base.bg(Color::Yellow)
        } else if pressed && required {
            base.bg(Color::Green)
        } else if pressed {
            base.bg(Color::Red)
        } else if required {
            let channel = self
                .song
                .state_at(self.position)
                .and_then(|state| state.event(note))
                .map(|event| event.channel)
                .unwrap_or(0);
            base.bg(channel_color(self.song, channel))
        } else {
            base
        }
    }
}

/// Renders the piano keyboard at the bottom of the screen.
///
/// # Arguments
///
/// * `frame` - The frame to render to
/// * `area` - The area to render in
/// * `song` - The song being played
/// * `view` - Snapshot of the player
/// * `geometry` - Key columns shared with the piano roll
pub fn render_keyboard(
    frame: &mut Frame,
    area: Rect,
    song: &SongModel,
    view: &ViewState,
    geometry: &KeyGeometry,
) {
    let (lo, hi) = geometry.range();
    let title = if view.player.rebind_range {
        " Keyboard (learning range: play your lowest and highest keys) ".to_string()
    } else {
        format!(
            " Keyboard {}-{} ",
            crate::midi::note_to_name(lo),
            crate::midi::note_to_name(hi)
        )
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 {
        return;
    }

    let ignored = &view.player.ignored_channels;
    let states = KeyStates {
        song,
        position: view.player.song_position,
        required: song.state(view.player.song_position, ignored),
        view,
    };

    let row = |upper: bool| -> Line<'static> {
        let spans: Vec<Span<'static>> = (inner.x..inner.x + inner.width)
            .map(|x| {
                let key = if upper {
                    geometry.key_at_upper(x)
                } else {
                    geometry.key_at_lower(x)
                };
                match key {
                    Some(note) => {
                        let label = if !upper
                            && note % 12 == 0
                            && geometry.column(note) == Some(x)
                        {
                            // Octave number under every C
                            format!("{}", (note / 12) as i8 - 1)
                        } else {
                            " ".to_string()
                        };
                        Span::styled(label, states.style(note))
                    }
                    None => Span::raw(" "),
                }
            })
            .collect();
        Line::from(spans)
    };

    // Black keys reach down two rows, the bottom row is white keys only
    let mut lines = Vec::with_capacity(inner.height as usize);
    for r in 0..inner.height {
        lines.push(row(r + 1 < inner.height));
    }
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().add_modifier(Modifier::BOLD)),
        inner,
    );
}
