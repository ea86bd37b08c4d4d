//! Event streams shared by the unit tests.

use super::event::{Event, TimedEvent};
use rand::Rng;

/// `count` quarter notes rising by a semitone from E4, each one beat long.
pub(crate) fn ascending_song(count: u64, ppqn: u16) -> Vec<TimedEvent> {
    let beat = ppqn as u64;
    let mut events = Vec::new();
    for i in 0..count {
        let note = 64 + i as u8;
        events.push(TimedEvent::new(i * beat, Event::note_on(0, note, 100)));
        events.push(TimedEvent::new((i + 1) * beat, Event::NoteOff { note, channel: 0 }));
    }
    events
}

/// A C major triad on channel 0 with a low C on channel 1, then a single D.
pub(crate) fn two_channel_song(ppqn: u16) -> Vec<TimedEvent> {
    let beat = ppqn as u64;
    vec![
        TimedEvent::new(0, Event::note_on(0, 60, 100)),
        TimedEvent::new(0, Event::note_on(0, 64, 100)),
        TimedEvent::new(0, Event::note_on(0, 67, 100)),
        TimedEvent::new(0, Event::note_on(1, 48, 100)),
        TimedEvent::new(beat, Event::note_on(0, 62, 100)),
        TimedEvent::new(2 * beat, Event::NoteOff { note: 62, channel: 0 }),
    ]
}

/// A random song with signature changes on measure boundaries.
pub(crate) fn random_song(rng: &mut impl Rng) -> (Vec<TimedEvent>, u16) {
    let ppqn = [24u16, 40, 96, 480][rng.random_range(0..4)];
    let mut numerator: u64 = 4;
    let mut beat_size = ppqn as u64;
    let mut measure_start: u64 = 0;
    let mut events = Vec::new();

    for measure in 0..rng.random_range(1..8) {
        if measure > 0 && rng.random_bool(0.25) {
            let new_numerator: u8 = rng.random_range(2..8);
            let denominator_power: u8 = rng.random_range(2..=3);
            events.push(TimedEvent::new(
                measure_start,
                Event::TimeSignature {
                    numerator: new_numerator,
                    denominator_power,
                },
            ));
            numerator = new_numerator as u64;
            beat_size = (ppqn as u64 * 4) >> denominator_power;
        }

        let measure_len = beat_size * numerator;
        let mut offsets: Vec<u64> = (0..rng.random_range(0..10))
            .map(|_| rng.random_range(0..measure_len))
            .collect();
        offsets.sort_unstable();

        for offset in offsets {
            let channel = if rng.random_bool(0.1) {
                9
            } else {
                rng.random_range(0..4)
            };
            let note: u8 = rng.random_range(21..109);
            let velocity: u8 = rng.random_range(1..128);
            events.push(TimedEvent::new(
                measure_start + offset,
                Event::note_on(channel, note, velocity),
            ));
        }
        measure_start += measure_len;
    }

    events.push(TimedEvent::new(
        measure_start,
        Event::NoteOff {
            note: 60,
            channel: 0,
        },
    ));
    (events, ppqn)
}
