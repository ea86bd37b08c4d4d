//! Typed MIDI events as consumed by the song model.
//!
//! The file importer and the device decoder both produce this one event
//! family, so everything downstream matches on a single enum.

/// MIDI channel reserved for percussion. Never part of the playable model.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Tempo assumed until the file sets one (120 BPM).
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// A single MIDI event, stripped of everything the trainer does not use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A key went down. A velocity of 0 is decoded as [`Event::NoteOff`].
    NoteOn {
        /// MIDI note number (0-127).
        note: u8,
        /// Strike velocity (1-127).
        velocity: u8,
        /// MIDI channel (0-15).
        channel: u8,
    },
    /// A key was released.
    NoteOff {
        /// MIDI note number (0-127).
        note: u8,
        /// MIDI channel (0-15).
        channel: u8,
    },
    /// Tempo change in microseconds per quarter note.
    SetTempo {
        /// Microseconds per quarter note.
        micros_per_quarter: u32,
    },
    /// Time signature change.
    TimeSignature {
        /// Beats per measure.
        numerator: u8,
        /// Beat unit as a power of two (2 = quarter note, 3 = eighth note).
        denominator_power: u8,
    },
    /// Anything else in the stream.
    Other,
}

impl Event {
    /// Builds a note-on, folding velocity 0 into a note-off.
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        if velocity == 0 {
            Event::NoteOff { note, channel }
        } else {
            Event::NoteOn {
                note,
                velocity,
                channel,
            }
        }
    }

    /// Decodes a raw channel message as delivered by a MIDI input port.
    ///
    /// Returns `None` for empty or truncated messages.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let channel = status & 0x0F;
        let event = match status & 0xF0 {
            0x90 if bytes.len() >= 3 => Event::note_on(channel, bytes[1], bytes[2]),
            0x80 if bytes.len() >= 3 => Event::NoteOff {
                note: bytes[1],
                channel,
            },
            0x80 | 0x90 => return None,
            _ => Event::Other,
        };
        Some(event)
    }

    /// Returns true for note-ons that belong in the playable model.
    pub fn is_playable_note_on(&self) -> bool {
        matches!(
            self,
            Event::NoteOn { velocity, channel, .. }
                if *velocity > 0 && *channel != PERCUSSION_CHANNEL
        )
    }
}

/// An event at an absolute tick position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    /// Absolute tick from the start of the song.
    pub tick: u64,
    /// The event itself.
    pub event: Event,
}

impl TimedEvent {
    /// Creates a new timed event.
    pub fn new(tick: u64, event: Event) -> Self {
        Self { tick, event }
    }
}

/// A note-on that made it into the song model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// MIDI note number after transposition.
    pub note: u8,
    /// Original strike velocity.
    pub velocity: u8,
    /// MIDI channel.
    pub channel: u8,
    /// Absolute tick of the original event.
    pub tick: u64,
}
