//! Error types shared by the library.
//!
//! Only startup conditions are fatal. Everything the player can do while a
//! song is loaded degrades by clamping or ignoring input instead of failing.

use thiserror::Error;

/// Errors surfaced by the library.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be parsed as a Standard MIDI File we can step through.
    #[error("not a valid MIDI file: {0}")]
    InvalidMidi(String),

    /// The terminal is too narrow to draw the keyboard.
    #[error("terminal is {width} columns wide, at least {required} are required")]
    TerminalTooNarrow {
        /// Current terminal width in columns.
        width: u16,
        /// Minimum supported width.
        required: u16,
    },

    /// A MIDI input device could not be opened.
    #[error("MIDI device error: {0}")]
    Device(String),

    /// The per-song settings cache could not be read or written.
    #[error("settings cache error: {0}")]
    Cache(#[from] serde_json::Error),

    /// File system failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
