//! MIDI data structures for stepping through a song.
//!
//! This module turns a Standard MIDI File into a [`SongModel`]: a sequence
//! of song positions, each holding the notes that must be pressed to advance.

mod chord;
mod event;
mod midi_import;
mod song;

#[cfg(test)]
pub(crate) mod fixtures;

pub use chord::chord_name;
pub use event::{Event, NoteEvent, TimedEvent, DEFAULT_MICROS_PER_QUARTER, PERCUSSION_CHANNEL};
pub use midi_import::{parse_midi, ImportedSong};
pub use song::{SongModel, State, EMPTY_BEAT_STATES, QUANT_STEPS};

/// Standard MIDI note names for display purposes.
/// Maps MIDI note number (0-127) to note name within an octave.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Converts a MIDI note number to a human-readable note name with octave.
///
/// # Arguments
///
/// * `note` - MIDI note number (0-127)
///
/// # Returns
///
/// String representation like "C4" or "F#5"
///
/// # Examples
///
/// ```
/// use midistep::midi::note_to_name;
///
/// let name = note_to_name(60); // Middle C
/// assert_eq!(name, "C4");
/// ```
pub fn note_to_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1; // MIDI octave convention
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Returns true for the black keys of a piano.
#[inline]
pub fn is_black_key(note: u8) -> bool {
    matches!(note % 12, 1 | 3 | 6 | 8 | 10)
}
