//! Help overlay rendering.
//!
//! Lists the default key bindings in a modal overlay.

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use super::centered_rect;

/// Key binding entry for the help display.
struct KeyBinding {
    key: &'static str,
    description: &'static str,
}

const GENERAL_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: "h",
        description: "Toggle this help",
    },
    KeyBinding {
        key: "q",
        description: "Quit",
    },
    KeyBinding {
        key: "Ctrl+C",
        description: "Force quit",
    },
    KeyBinding {
        key: ".",
        description: "Toggle autoplay at the song's tempo",
    },
];

const NAVIGATION_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: "j",
        description: "Next state (wraps to the loop start)",
    },
    KeyBinding {
        key: "k",
        description: "Previous state",
    },
    KeyBinding {
        key: "<n>p",
        description: "Jump to position n",
    },
    KeyBinding {
        key: "<n>P",
        description: "Jump to measure n",
    },
    KeyBinding {
        key: "0-9 / -",
        description: "Type a number into the register",
    },
    KeyBinding {
        key: "Esc",
        description: "Clear the register",
    },
];

const LOOP_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: "[",
        description: "Start the loop here",
    },
    KeyBinding {
        key: "]",
        description: "End the loop here",
    },
    KeyBinding {
        key: "\\",
        description: "Loop the whole song",
    },
];

const CHANNEL_BINDINGS: &[KeyBinding] = &[
    KeyBinding {
        key: "<n>i",
        description: "Mute / unmute the channel with colour n",
    },
    KeyBinding {
        key: "u",
        description: "Unmute all channels",
    },
];

const KEYBOARD_BINDINGS: &[KeyBinding] = &[KeyBinding {
    key: "r",
    description: "Learn the keyboard range from the keys you play",
}];

/// Appends a titled block of bindings.
fn add_section(
    lines: &mut Vec<Line<'static>>,
    title: &'static str,
    bindings: &[KeyBinding],
    section_style: Style,
    key_style: Style,
    desc_style: Style,
) {
    lines.push(Line::from(Span::styled(title, section_style)));
    for binding in bindings {
        lines.push(Line::from(vec![
            Span::styled(format!("{:15}", binding.key), key_style),
            Span::styled(binding.description, desc_style),
        ]));
    }
    lines.push(Line::from(""));
}

/// Renders the help overlay.
///
/// # Arguments
///
/// * `frame` - The frame to render to
pub fn render_help(frame: &mut Frame) {
    let area = centered_rect(70, 80, frame.area());

    // Clear the area behind the popup
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Help - Keyboard Shortcuts ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Content
            Constraint::Length(1), // Footer
        ])
        .split(inner);

    let mut lines: Vec<Line<'static>> = Vec::new();

    let section_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let key_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let desc_style = Style::default().fg(Color::White);

    let sections: [(&'static str, &[KeyBinding]); 5] = [
        ("General", GENERAL_BINDINGS),
        ("Navigation", NAVIGATION_BINDINGS),
        ("Loop", LOOP_BINDINGS),
        ("Channels", CHANNEL_BINDINGS),
        ("Keyboard", KEYBOARD_BINDINGS),
    ];
    for (title, bindings) in sections {
        add_section(&mut lines, title, bindings, section_style, key_style, desc_style);
    }

    frame.render_widget(Paragraph::new(lines), chunks[0]);

    let footer = Paragraph::new(Line::from(Span::styled(
        "Close: h/Esc",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));
    frame.render_widget(footer, chunks[1]);
}
