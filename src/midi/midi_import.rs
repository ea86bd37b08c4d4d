//! Standard MIDI File (SMF) import.
//!
//! Parses the bytes of a .mid or .midi file and flattens every track into
//! one stream of [`TimedEvent`]s ordered by absolute tick. Supports SMF
//! Format 0 (single track) and Format 1 (multi-track) files with metrical
//! timing.
//!
//! # Limitations
//!
//! - Only note on/off, tempo and time signature events are kept
//! - Format 2 (sequential) files and SMPTE timecode timing are rejected
//! - Ticks are kept at the file's own resolution (no rescaling)

use super::event::{Event, TimedEvent};
use crate::error::{Error, Result};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

/// A parsed MIDI file, ready to be fed to the song model builder.
#[derive(Debug, Clone)]
pub struct ImportedSong {
    /// Display name (file stem).
    pub name: String,
    /// Ticks per quarter note from the header.
    pub ppqn: u16,
    /// Every kept event from every track, ordered by tick.
    pub events: Vec<TimedEvent>,
}

/// Parses MIDI file bytes.
///
/// Tracks are merged by absolute tick. Events that share a tick keep their
/// track order, then their order within the track, so a time signature at
/// tick 0 in the tempo track is seen before the first note.
pub fn parse_midi(name: impl Into<String>, data: &[u8]) -> Result<ImportedSong> {
    let smf = Smf::parse(data).map_err(|e| Error::InvalidMidi(e.to_string()))?;

    let ppqn = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(_, _) => {
            return Err(Error::InvalidMidi(
                "SMPTE timecode timing is not supported".to_string(),
            ))
        }
    };
    if ppqn == 0 {
        return Err(Error::InvalidMidi("header declares 0 ticks per beat".to_string()));
    }

    if smf.header.format == Format::Sequential {
        return Err(Error::InvalidMidi(
            "Format 2 (sequential) MIDI files are not supported".to_string(),
        ));
    }

    let mut events: Vec<TimedEvent> = Vec::new();
    for track in &smf.tracks {
        let mut current_tick: u64 = 0;
        for track_event in track {
            current_tick += track_event.delta.as_int() as u64;
            let event = convert_event(&track_event.kind);
            if event != Event::Other {
                events.push(TimedEvent::new(current_tick, event));
            }
        }
    }

    // Stable sort keeps track order for events sharing a tick
    events.sort_by_key(|e| e.tick);

    Ok(ImportedSong {
        name: name.into(),
        ppqn,
        events,
    })
}

/// Maps a midly event onto the trainer's event family.
fn convert_event(kind: &TrackEventKind) -> Event {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let ch = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => Event::note_on(ch, key.as_int(), vel.as_int()),
                MidiMessage::NoteOff { key, .. } => Event::NoteOff {
                    note: key.as_int(),
                    channel: ch,
                },
                _ => Event::Other,
            }
        }
        TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Event::SetTempo {
            micros_per_quarter: tempo.as_int(),
        },
        TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_power, _, _)) => {
            Event::TimeSignature {
                numerator,
                denominator_power,
            }
        }
        _ => Event::Other,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writes a MIDI variable-length quantity.
    fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
        let mut bytes = vec![(value & 0x7F) as u8];
        let mut temp = value >> 7;
        while temp > 0 {
            bytes.push((temp & 0x7F) as u8 | 0x80);
            temp >>= 7;
        }
        buffer.extend(bytes.iter().rev());
    }

    /// Builds an SMF byte image from raw `(delta, bytes)` track events.
    pub(crate) fn smf_bytes(format: u16, ppqn: u16, tracks: &[Vec<(u32, Vec<u8>)>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"MThd");
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&format.to_be_bytes());
        out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        out.extend_from_slice(&ppqn.to_be_bytes());

        for track in tracks {
            let mut data = Vec::new();
            for (delta, bytes) in track {
                write_vlq(*delta, &mut data);
                data.extend_from_slice(bytes);
            }
            // End of track
            data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(&data);
        }
        out
    }

    #[test]
    fn test_merges_tracks_by_tick() {
        let tempo_track = vec![
            (0, vec![0xFF, 0x58, 0x04, 3, 2, 24, 8]),
            (0, vec![0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]),
        ];
        let melody = vec![
            (0, vec![0x90, 60, 100]),
            (96, vec![0x80, 60, 0]),
            (0, vec![0x91, 64, 90]),
            (96, vec![0x91, 64, 0]),
        ];
        let data = smf_bytes(1, 96, &[tempo_track, melody]);
        let song = parse_midi("test", &data).expect("valid file");

        assert_eq!(song.ppqn, 96);
        assert_eq!(
            song.events[0].event,
            Event::TimeSignature {
                numerator: 3,
                denominator_power: 2
            }
        );
        assert_eq!(
            song.events[1].event,
            Event::SetTempo {
                micros_per_quarter: 500_000
            }
        );
        assert_eq!(song.events[2], TimedEvent::new(0, Event::note_on(0, 60, 100)));
        assert_eq!(song.events[4], TimedEvent::new(96, Event::note_on(1, 64, 90)));
        // Velocity-0 note-on arrives as a note-off
        assert_eq!(
            song.events[5],
            TimedEvent::new(
                192,
                Event::NoteOff {
                    note: 64,
                    channel: 1
                }
            )
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let result = parse_midi("junk", b"definitely not a midi file");
        assert!(matches!(result, Err(Error::InvalidMidi(_))));
    }

    #[test]
    fn test_rejects_sequential_format() {
        let data = smf_bytes(2, 96, &[vec![(0, vec![0x90, 60, 100])]]);
        assert!(matches!(parse_midi("seq", &data), Err(Error::InvalidMidi(_))));
    }

    #[test]
    fn test_vlq_encoding() {
        let mut buffer = Vec::new();
        write_vlq(0, &mut buffer);
        write_vlq(0x7F, &mut buffer);
        write_vlq(0x80, &mut buffer);
        assert_eq!(buffer, vec![0x00, 0x7F, 0x81, 0x00]);
    }
}
