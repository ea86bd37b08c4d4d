//! The song model: a MIDI event stream projected onto song positions.
//!
//! A song position (state index) is one step the player has to take. The
//! builder walks the events beat by beat, groups note-ons that share an
//! offset into one state, and pads the gaps between them with empty states.
//! Gaps are not spaced by their tick length but by the *rank* of their length
//! among the beat's distinct gaps, which keeps every beat a handful of states
//! long no matter the file's resolution while preserving which notes are
//! closer together.
//!
//! The model is immutable once built. Channel muting lives on the player.

use super::chord;
use super::event::{Event, NoteEvent, TimedEvent, DEFAULT_MICROS_PER_QUARTER};
use std::collections::{BTreeMap, BTreeSet};
use std::iter;

/// Maximum number of empty states a single gap can occupy.
pub const QUANT_STEPS: u64 = 4;

/// Number of states emitted for a beat without any note-on (one leading + four trailing).
pub const EMPTY_BEAT_STATES: usize = 5;

/// The set of notes the player must hold at one song position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    /// Sounding notes keyed by note number.
    active: BTreeMap<u8, NoteEvent>,
}

impl State {
    /// Returns true if no note starts at this position.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Returns every note in the state.
    pub fn notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.active.keys().copied()
    }

    /// Returns the note-on events of the state, ordered by note.
    pub fn events(&self) -> impl Iterator<Item = &NoteEvent> + '_ {
        self.active.values()
    }

    /// Returns the event for a specific note, if present.
    pub fn event(&self, note: u8) -> Option<&NoteEvent> {
        self.active.get(&note)
    }

    /// Returns the notes whose channel is not ignored.
    pub fn notes_excluding(&self, ignored_channels: &BTreeSet<u8>) -> BTreeSet<u8> {
        self.active
            .values()
            .filter(|e| !ignored_channels.contains(&e.channel))
            .map(|e| e.note)
            .collect()
    }

    /// Returns the channels that sound in this state.
    pub fn channels(&self) -> BTreeSet<u8> {
        self.active.values().map(|e| e.channel).collect()
    }

    fn insert(&mut self, event: NoteEvent) {
        self.active.insert(event.note, event);
    }
}

/// One beat of the source file while the model is being built.
#[derive(Debug, Clone)]
struct Beat {
    /// Note-ons in arrival order, with their offset inside the beat.
    events: Vec<(u64, NoteEvent)>,
    /// Beat length in ticks.
    size: u64,
    /// Whether this beat opens a measure.
    starts_measure: bool,
}

impl Beat {
    fn new(size: u64) -> Self {
        Self {
            events: Vec::new(),
            size,
            starts_measure: false,
        }
    }
}

/// The playable projection of a MIDI file.
#[derive(Debug, Clone)]
pub struct SongModel {
    /// Ticks per quarter note of the source file.
    ppqn: u16,
    /// One entry per song position.
    states: Vec<State>,
    /// Original tick of every position holding a note-on.
    timing_map: BTreeMap<usize, u64>,
    /// First position of every measure, strictly increasing.
    measure_map: Vec<usize>,
    /// First position of every beat, strictly increasing.
    beat_starts: Vec<usize>,
    /// Tempo changes as (tick, microseconds per quarter).
    tempo_map: Vec<(u64, u32)>,
    /// Tick of the last event in the file.
    end_tick: u64,
    /// Channels carrying playable notes, ascending.
    channels: Vec<u8>,
}

/// Integer division rounding up.
fn ceil_div(value: u64, divisor: u64) -> u64 {
    value.div_ceil(divisor.max(1))
}

/// Applies a transposition, clamping to the MIDI note range.
fn transpose_note(note: u8, transpose: i8) -> u8 {
    (note as i16 + transpose as i16).clamp(0, 127) as u8
}

/// Ticks in one beat for a time signature denominator given as a power of two.
fn beat_size_for(ppqn: u64, denominator_power: u8) -> u64 {
    (ppqn * 4)
        .checked_shr(denominator_power as u32)
        .unwrap_or(0)
        .max(1)
}

/// Extends the beat list to at least `len` beats.
fn grow(beats: &mut Vec<Beat>, len: usize, size: u64) {
    while beats.len() < len {
        beats.push(Beat::new(size));
    }
}

/// Marks `count` measure starts, one every `numerator` beats from `first_beat`.
fn mark_measures(beats: &mut [Beat], first_beat: usize, numerator: u64, count: u64) {
    for k in 0..count {
        let index = first_beat + (k * numerator) as usize;
        if let Some(beat) = beats.get_mut(index) {
            beat.starts_measure = true;
        }
    }
}

impl SongModel {
    /// Builds the model from an ordered event stream.
    ///
    /// # Arguments
    ///
    /// * `events` - Events ordered by tick (as produced by the importer)
    /// * `ppqn` - Ticks per quarter note
    /// * `transpose` - Semitones added to every note-on
    ///
    /// # Returns
    ///
    /// The immutable song model
    pub fn build(events: &[TimedEvent], ppqn: u16, transpose: i8) -> Self {
        let ppqn_ticks = ppqn.max(1) as u64;

        // Signature state, 4/4 until told otherwise
        let mut numerator: u64 = 4;
        let mut beat_size = ppqn_ticks;
        let mut last_signature_tick: u64 = 0;
        let mut signature_beat: usize = 0;

        let mut beats: Vec<Beat> = Vec::new();
        let mut tempo_map: Vec<(u64, u32)> = Vec::new();
        let mut end_tick: u64 = 0;

        for timed in events {
            let tick = timed.tick.max(last_signature_tick);
            end_tick = end_tick.max(tick);

            let tick_diff = tick - last_signature_tick;
            let beat = signature_beat + (tick_diff / beat_size) as usize;
            // Beats cover [0, tick); a note-on also opens its own beat
            let covered = signature_beat + ceil_div(tick_diff, beat_size) as usize;
            grow(&mut beats, covered, beat_size);

            match timed.event {
                Event::NoteOn {
                    note,
                    velocity,
                    channel,
                } if timed.event.is_playable_note_on() => {
                    grow(&mut beats, beat + 1, beat_size);
                    beats[beat].events.push((
                        tick_diff % beat_size,
                        NoteEvent {
                            note: transpose_note(note, transpose),
                            velocity,
                            channel,
                            tick,
                        },
                    ));
                }
                Event::TimeSignature {
                    numerator: new_numerator,
                    denominator_power,
                } => {
                    let elapsed_measures = ceil_div(tick_diff, beat_size * numerator);
                    mark_measures(&mut beats, signature_beat, numerator, elapsed_measures);

                    signature_beat = covered;
                    last_signature_tick = tick;
                    numerator = (new_numerator as u64).max(1);
                    beat_size = beat_size_for(ppqn_ticks, denominator_power);

                    // A note-on at this very tick may already have opened the beat
                    for opened in beats.iter_mut().skip(signature_beat) {
                        opened.size = beat_size;
                    }
                }
                Event::SetTempo { micros_per_quarter } => {
                    tempo_map.push((tick, micros_per_quarter));
                }
                _ => {}
            }
        }

        let remaining = beats.len().saturating_sub(signature_beat) as u64;
        mark_measures(
            &mut beats,
            signature_beat,
            numerator,
            ceil_div(remaining, numerator),
        );

        let mut model = Self {
            ppqn,
            states: Vec::new(),
            timing_map: BTreeMap::new(),
            measure_map: Vec::new(),
            beat_starts: Vec::with_capacity(beats.len()),
            tempo_map,
            end_tick,
            channels: Vec::new(),
        };
        for beat in &beats {
            model.push_beat(beat);
        }

        let channels: BTreeSet<u8> = model
            .states
            .iter()
            .flat_map(|s| s.events().map(|e| e.channel))
            .collect();
        model.channels = channels.into_iter().collect();

        tracing::debug!(
            beats = beats.len(),
            states = model.states.len(),
            measures = model.measure_map.len(),
            "built song model"
        );

        model
    }

    /// Emits the states of one beat.
    fn push_beat(&mut self, beat: &Beat) {
        let start = self.states.len();
        self.beat_starts.push(start);
        if beat.starts_measure {
            self.measure_map.push(start);
        }

        if beat.events.is_empty() {
            self.push_empty(EMPTY_BEAT_STATES);
            return;
        }

        // Stable sort keeps first-seen order among equal offsets
        let mut events = beat.events.clone();
        events.sort_by_key(|(offset, _)| *offset);

        let mut onsets: Vec<(u64, Vec<NoteEvent>)> = Vec::new();
        for (offset, event) in events {
            match onsets.last_mut() {
                Some((last_offset, group)) if *last_offset == offset => group.push(event),
                _ => onsets.push((offset, vec![event])),
            }
        }

        // Leading gap, gaps between onsets, trailing gap to the end of the beat
        let mut gaps: Vec<u64> = Vec::with_capacity(onsets.len() + 1);
        gaps.push(onsets[0].0);
        for pair in onsets.windows(2) {
            gaps.push(pair[1].0 - pair[0].0);
        }
        let last_offset = onsets[onsets.len() - 1].0;
        gaps.push(beat.size.saturating_sub(1).saturating_sub(last_offset));

        let mut distinct: Vec<u64> = gaps.iter().copied().filter(|g| *g > 0).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let slots = |gap: u64| -> usize {
            if gap == 0 {
                return 0;
            }
            let rank = distinct.partition_point(|d| *d < gap) as u64 + 1;
            ceil_div(rank * QUANT_STEPS, distinct.len() as u64) as usize
        };

        self.push_empty(slots(gaps[0]));
        for (index, (_, group)) in onsets.iter().enumerate() {
            let position = self.states.len();
            let mut state = State::default();
            for event in group {
                state.insert(*event);
            }
            self.timing_map.insert(position, group[0].tick);
            self.states.push(state);
            self.push_empty(slots(gaps[index + 1]));
        }
    }

    fn push_empty(&mut self, count: usize) {
        self.states.extend(iter::repeat(State::default()).take(count));
    }

    // ==================== Queries ====================

    /// Number of song positions.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if the song has no positions at all.
    pub fn is_blank(&self) -> bool {
        self.states.is_empty()
    }

    /// Ticks per quarter note of the source file.
    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    /// Tick of the last event in the source file.
    pub fn end_tick(&self) -> u64 {
        self.end_tick
    }

    /// Returns the raw state at `position`.
    pub fn state_at(&self, position: usize) -> Option<&State> {
        self.states.get(position)
    }

    /// Notes required at `position`, leaving out ignored channels.
    ///
    /// Out-of-range positions have no required notes.
    pub fn state(&self, position: usize, ignored_channels: &BTreeSet<u8>) -> BTreeSet<u8> {
        self.states
            .get(position)
            .map(|s| s.notes_excluding(ignored_channels))
            .unwrap_or_default()
    }

    /// Returns true if no note starts at `position`.
    pub fn is_empty(&self, position: usize) -> bool {
        self.states.get(position).is_none_or(State::is_empty)
    }

    /// Channels that sound at `position`.
    pub fn active_channels(&self, position: usize) -> BTreeSet<u8> {
        self.states
            .get(position)
            .map(State::channels)
            .unwrap_or_default()
    }

    /// Channels carrying playable notes anywhere in the song, ascending.
    ///
    /// The index into this list is the channel's palette index.
    pub fn channels(&self) -> &[u8] {
        &self.channels
    }

    /// Lowest and highest note in the song.
    pub fn note_span(&self) -> Option<(u8, u8)> {
        let mut notes = self.states.iter().flat_map(|s| s.notes());
        let first = notes.next()?;
        Some(notes.fold((first, first), |(lo, hi), n| (lo.min(n), hi.max(n))))
    }

    /// Number of measures.
    pub fn measure_count(&self) -> usize {
        self.measure_map.len()
    }

    /// First position of every measure.
    pub fn measure_map(&self) -> &[usize] {
        &self.measure_map
    }

    /// Number of beats.
    pub fn beat_count(&self) -> usize {
        self.beat_starts.len()
    }

    /// Returns the beat index if `position` is the first state of a beat.
    pub fn beat_at(&self, position: usize) -> Option<usize> {
        self.beat_starts.binary_search(&position).ok()
    }

    /// Returns true if `position` is the first state of a measure.
    pub fn starts_measure(&self, position: usize) -> bool {
        self.measure_map.binary_search(&position).is_ok()
    }

    /// First position of measure `measure`, clamping the index into range.
    pub fn first_position_in_measure(&self, measure: i64) -> usize {
        if self.measure_map.is_empty() {
            return 0;
        }
        let last = self.measure_map.len() as i64 - 1;
        self.measure_map[measure.clamp(0, last) as usize]
    }

    /// Index of the measure containing `position`.
    pub fn measure_of(&self, position: usize) -> usize {
        self.measure_map
            .partition_point(|&start| start <= position)
            .saturating_sub(1)
    }

    /// Original tick of `position`.
    ///
    /// Positions without a note-on are interpolated linearly between the
    /// nearest positions that have one; past the last note the song length
    /// is used as the far anchor.
    pub fn real_tick(&self, position: usize) -> u64 {
        if let Some(&tick) = self.timing_map.get(&position) {
            return tick;
        }
        let position = position.min(self.states.len());

        let (prev_pos, prev_tick) = self
            .timing_map
            .range(..position)
            .next_back()
            .map(|(&p, &t)| (p, t))
            .unwrap_or((0, 0));
        let (next_pos, next_tick) = self
            .timing_map
            .range(position..)
            .next()
            .map(|(&p, &t)| (p, t))
            .unwrap_or((self.states.len(), self.end_tick.max(prev_tick)));

        if next_pos <= prev_pos {
            return prev_tick;
        }
        let span = next_tick.saturating_sub(prev_tick);
        prev_tick + span * (position - prev_pos) as u64 / (next_pos - prev_pos) as u64
    }

    /// Ticks between positions `from` and `to` (zero if `to` is earlier).
    pub fn tick_wait(&self, from: usize, to: usize) -> u64 {
        self.real_tick(to).saturating_sub(self.real_tick(from))
    }

    /// Tempo in force at `tick`, in microseconds per quarter note.
    pub fn tempo_at(&self, tick: u64) -> u32 {
        self.tempo_map
            .iter()
            .take_while(|(t, _)| *t <= tick)
            .last()
            .map(|(_, micros)| *micros)
            .unwrap_or(DEFAULT_MICROS_PER_QUARTER)
    }

    /// Real time between two positions at the tempo in force at `from`.
    pub fn micros_between(&self, from: usize, to: usize) -> u64 {
        let ticks = self.tick_wait(from, to);
        let tempo = self.tempo_at(self.real_tick(from)) as u64;
        ticks * tempo / self.ppqn.max(1) as u64
    }

    /// Names the chord sounding on `channel` at `position`.
    pub fn chord_name(&self, position: usize, channel: u8) -> String {
        match self.states.get(position) {
            Some(state) => chord::chord_name(
                state
                    .events()
                    .filter(|e| e.channel == channel)
                    .map(|e| e.note),
            ),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::fixtures::{ascending_song, random_song};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn on(tick: u64, channel: u8, note: u8) -> TimedEvent {
        TimedEvent::new(tick, Event::note_on(channel, note, 100))
    }

    fn off(tick: u64, channel: u8, note: u8) -> TimedEvent {
        TimedEvent::new(tick, Event::NoteOff { note, channel })
    }

    fn non_empty_positions(model: &SongModel) -> Vec<usize> {
        (0..model.len()).filter(|&p| !model.is_empty(p)).collect()
    }

    #[test]
    fn test_ascending_song_layout() {
        let model = SongModel::build(&ascending_song(12, 40), 40, 0);

        assert_eq!(model.len(), 60);
        assert_eq!(
            non_empty_positions(&model),
            (0..12).map(|i| i * 5).collect::<Vec<_>>()
        );
        for i in 0..12 {
            let notes: Vec<u8> = model.state(i * 5, &BTreeSet::new()).into_iter().collect();
            assert_eq!(notes, vec![64 + i as u8]);
        }
    }

    #[test]
    fn test_empty_beat_contributes_five_states() {
        // Notes in beats 0 and 2, nothing in beat 1
        let events = vec![on(0, 0, 60), off(40, 0, 60), on(80, 0, 62), off(120, 0, 62)];
        let model = SongModel::build(&events, 40, 0);

        assert_eq!(model.len(), 15);
        assert_eq!(non_empty_positions(&model), vec![0, 10]);
        assert_eq!(model.beat_at(5), Some(1));
        assert_eq!(model.beat_at(10), Some(2));
        assert_eq!(model.beat_at(6), None);
    }

    #[test]
    fn test_gaps_ranked_within_beat() {
        // Offsets 0 and 10 in a 40-tick beat: gaps 10 and 29 rank 1 and 2
        let events = vec![on(0, 0, 60), on(10, 0, 62), off(40, 0, 60), off(40, 0, 62)];
        let model = SongModel::build(&events, 40, 0);

        assert_eq!(model.len(), 8);
        assert_eq!(non_empty_positions(&model), vec![0, 3]);
    }

    #[test]
    fn test_leading_gap_pads_before_first_onset() {
        let events = vec![on(20, 0, 60), off(40, 0, 60)];
        let model = SongModel::build(&events, 40, 0);

        // Leading 20 outranks trailing 19
        assert_eq!(model.len(), 7);
        assert_eq!(non_empty_positions(&model), vec![4]);
    }

    #[test]
    fn test_simultaneous_notes_share_a_state() {
        let events = vec![on(0, 0, 60), on(0, 1, 64), on(0, 0, 67), off(40, 0, 60)];
        let model = SongModel::build(&events, 40, 0);

        assert_eq!(non_empty_positions(&model), vec![0]);
        let notes: Vec<u8> = model.state(0, &BTreeSet::new()).into_iter().collect();
        assert_eq!(notes, vec![60, 64, 67]);
        assert_eq!(model.active_channels(0), BTreeSet::from([0, 1]));
        assert_eq!(model.state(0, &BTreeSet::from([1])), BTreeSet::from([60, 67]));
        assert_eq!(model.channels(), &[0, 1]);
    }

    #[test]
    fn test_percussion_and_silent_notes_skipped() {
        let events = vec![on(0, 9, 36), on(0, 0, 60), on(40, 0, 62), off(80, 0, 62)];
        let model = SongModel::build(&events, 40, 0);

        assert_eq!(model.state(0, &BTreeSet::new()), BTreeSet::from([60]));
        assert_eq!(model.channels(), &[0]);
    }

    #[test]
    fn test_transpose_applied_at_build() {
        let model = SongModel::build(&ascending_song(2, 40), 40, -12);
        assert_eq!(model.state(0, &BTreeSet::new()), BTreeSet::from([52]));
        assert_eq!(model.note_span(), Some((52, 53)));

        let clamped = SongModel::build(&ascending_song(1, 40), 40, 127);
        assert_eq!(clamped.state(0, &BTreeSet::new()), BTreeSet::from([127]));
    }

    #[test]
    fn test_measures_in_common_time() {
        let model = SongModel::build(&ascending_song(12, 40), 40, 0);

        assert_eq!(model.measure_map(), &[0, 20, 40]);
        assert_eq!(model.first_position_in_measure(2), 40);
        assert_eq!(model.first_position_in_measure(99), 40);
        assert_eq!(model.first_position_in_measure(-3), 0);
        assert_eq!(model.measure_of(0), 0);
        assert_eq!(model.measure_of(19), 0);
        assert_eq!(model.measure_of(20), 1);
        assert_eq!(model.measure_of(59), 2);
    }

    #[test]
    fn test_time_signature_change_backfills_measures() {
        // Two measures of 4/4 (8 beats of 40), then 3/4 for two measures
        let mut events = vec![TimedEvent::new(
            0,
            Event::TimeSignature {
                numerator: 4,
                denominator_power: 2,
            },
        )];
        for beat in 0..8 {
            events.push(on(beat * 40, 0, 60));
        }
        events.push(TimedEvent::new(
            320,
            Event::TimeSignature {
                numerator: 3,
                denominator_power: 2,
            },
        ));
        for beat in 8..14 {
            events.push(on(beat * 40, 0, 62));
        }
        events.push(off(560, 0, 62));

        let model = SongModel::build(&events, 40, 0);

        assert_eq!(model.beat_count(), 14);
        let measure_beats: Vec<usize> = model
            .measure_map()
            .iter()
            .filter_map(|&p| model.beat_at(p))
            .collect();
        assert_eq!(measure_beats, vec![0, 4, 8, 11]);
    }

    #[test]
    fn test_eighth_note_denominator_halves_beat() {
        let mut events = vec![TimedEvent::new(
            0,
            Event::TimeSignature {
                numerator: 6,
                denominator_power: 3,
            },
        )];
        for i in 0..6 {
            events.push(on(i * 20, 0, 60 + i as u8));
        }
        events.push(off(120, 0, 65));
        let model = SongModel::build(&events, 40, 0);

        assert_eq!(model.beat_count(), 6);
        assert_eq!(model.measure_count(), 1);
    }

    #[test]
    fn test_real_tick_interpolates() {
        let model = SongModel::build(&ascending_song(12, 40), 40, 0);

        assert_eq!(model.real_tick(0), 0);
        assert_eq!(model.real_tick(5), 40);
        // Halfway between positions 5 and 10
        assert_eq!(model.real_tick(7), 56);
        // Past the last note, interpolate toward the song length (480 at position 60)
        assert_eq!(model.real_tick(55), 440);
        assert_eq!(model.real_tick(60), 480);
        assert_eq!(model.tick_wait(0, 5), 40);
        assert_eq!(model.tick_wait(10, 5), 0);
    }

    #[test]
    fn test_tempo_map_and_wait() {
        let mut events = vec![TimedEvent::new(
            0,
            Event::SetTempo {
                micros_per_quarter: 1_000_000,
            },
        )];
        events.extend(ascending_song(4, 40));
        let model = SongModel::build(&events, 40, 0);

        assert_eq!(model.tempo_at(0), 1_000_000);
        // One quarter at one second per quarter
        assert_eq!(model.micros_between(0, 5), 1_000_000);

        let default_tempo = SongModel::build(&ascending_song(4, 40), 40, 0);
        assert_eq!(default_tempo.micros_between(0, 5), 500_000);
    }

    #[test]
    fn test_chord_name_per_channel() {
        let events = vec![
            on(0, 0, 60),
            on(0, 0, 64),
            on(0, 0, 67),
            on(0, 1, 48),
            off(40, 0, 60),
        ];
        let model = SongModel::build(&events, 40, 0);

        assert_eq!(model.chord_name(0, 0), "C");
        assert_eq!(model.chord_name(0, 1), "");
        assert_eq!(model.chord_name(3, 0), "");
    }

    #[test]
    fn test_no_events_no_states() {
        let model = SongModel::build(&[], 96, 0);
        assert!(model.is_blank());
        assert_eq!(model.first_position_in_measure(0), 0);
        assert_eq!(model.real_tick(0), 0);
        assert!(model.state(0, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_onsets_map_one_to_one_onto_states() {
        for seed in 0..64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (events, ppqn) = random_song(&mut rng);
            let model = SongModel::build(&events, ppqn, 0);

            let mut onsets = BTreeSet::new();
            let mut playable = BTreeSet::new();
            for e in &events {
                if let Event::NoteOn { note, .. } = e.event {
                    if e.event.is_playable_note_on() {
                        onsets.insert(e.tick);
                        playable.insert((e.tick, note));
                    }
                }
            }
            let stored: usize = (0..model.len())
                .filter_map(|p| model.state_at(p))
                .map(|s| s.events().count())
                .sum();

            assert_eq!(non_empty_positions(&model).len(), onsets.len(), "seed {seed}");
            assert_eq!(stored, playable.len(), "seed {seed}");

            // Positions stay in tick order
            let ticks: Vec<u64> = non_empty_positions(&model)
                .into_iter()
                .map(|p| model.real_tick(p))
                .collect();
            assert!(ticks.windows(2).all(|w| w[0] < w[1]), "seed {seed}");
        }
    }
}
