//! Position, loop and channel state of a practice session.
//!
//! The [`Player`] decides where in the song the user is and whether the keys
//! they hold complete the current state. All mutation happens behind one
//! `Mutex<Player>`; the check worker reaches it through [`StateCheck`].

use crate::controller::{lock, Coordinator, StateCheck};
use crate::midi::SongModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Lowest key of an 88-key piano (A0).
pub const PIANO_LOWEST: u8 = 21;

/// Highest key of an 88-key piano (C8).
pub const PIANO_HIGHEST: u8 = 108;

/// Inclusive range of song positions the player cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRange {
    /// First position of the loop.
    pub lo: usize,
    /// Last position of the loop.
    pub hi: usize,
}

/// The part of the player state worth remembering between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Last song position.
    pub song_position: usize,
    /// Loop bounds.
    pub loop_range: LoopRange,
    /// Muted channels.
    pub ignored_channels: BTreeSet<u8>,
}

/// An owned copy of everything the view draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub song_position: usize,
    pub loop_range: LoopRange,
    pub ignored_channels: BTreeSet<u8>,
    pub need_to_release: BTreeSet<u8>,
    /// Register contents, `None` when nothing has been typed.
    pub register: Option<String>,
    pub pressed: BTreeSet<u8>,
    /// Keys drawn on the keyboard, inclusive.
    pub display_range: (u8, u8),
    pub rebind_range: bool,
}

/// Navigation and input matching over a [`SongModel`].
#[derive(Debug)]
pub struct Player {
    song: Arc<SongModel>,
    coordinator: Arc<Coordinator>,
    song_position: usize,
    loop_range: LoopRange,
    ignored_channels: BTreeSet<u8>,
    /// Notes held when the last state was completed; they must come up first.
    need_to_release: BTreeSet<u8>,
    /// Digits typed so far.
    register: u64,
    register_negative: bool,
    register_touched: bool,
    rebind_range: bool,
    /// Lowest and highest key pressed since rebinding started.
    observed_range: Option<(u8, u8)>,
    display_range: (u8, u8),
}

impl Player {
    /// Creates a player positioned on the first state that has notes.
    pub fn new(song: Arc<SongModel>, coordinator: Arc<Coordinator>) -> Self {
        let last = song.len().saturating_sub(1);
        let display_range = match song.note_span() {
            Some((lo, hi)) => (lo.min(PIANO_LOWEST), hi.max(PIANO_HIGHEST)),
            None => (PIANO_LOWEST, PIANO_HIGHEST),
        };
        let mut player = Self {
            song,
            coordinator,
            song_position: 0,
            loop_range: LoopRange { lo: 0, hi: last },
            ignored_channels: BTreeSet::new(),
            need_to_release: BTreeSet::new(),
            register: 0,
            register_negative: false,
            register_touched: false,
            rebind_range: false,
            observed_range: None,
            display_range,
        };
        player.set_state(0);
        player
    }

    /// The song being played.
    pub fn song(&self) -> &Arc<SongModel> {
        &self.song
    }

    /// Current song position.
    pub fn song_position(&self) -> usize {
        self.song_position
    }

    /// Current loop bounds.
    pub fn loop_range(&self) -> LoopRange {
        self.loop_range
    }

    /// Muted channels.
    pub fn ignored_channels(&self) -> &BTreeSet<u8> {
        &self.ignored_channels
    }

    /// Notes that must be released before they count again.
    pub fn need_to_release(&self) -> &BTreeSet<u8> {
        &self.need_to_release
    }

    /// Notes required at the current position.
    pub fn required_notes(&self) -> BTreeSet<u8> {
        self.song.state(self.song_position, &self.ignored_channels)
    }

    fn last_position(&self) -> usize {
        self.song.len().saturating_sub(1)
    }

    fn has_notes(&self, position: usize) -> bool {
        !self.song.state(position, &self.ignored_channels).is_empty()
    }

    /// First position in `from..=loop.hi` with notes, if any.
    fn scan_forward(&self, from: usize) -> Option<usize> {
        (from..=self.loop_range.hi).find(|&p| self.has_notes(p))
    }

    // ==================== Navigation ====================

    /// Moves to the next state with notes, wrapping to the loop start.
    pub fn next_state(&mut self) {
        match self.scan_forward(self.song_position + 1) {
            Some(position) => self.song_position = position,
            None => self.set_state(self.loop_range.lo as i64),
        }
    }

    /// Moves to the previous state with notes, stopping at the loop start.
    pub fn prev_state(&mut self) {
        let lo = self.loop_range.lo;
        self.song_position = (lo..self.song_position)
            .rev()
            .find(|&p| self.has_notes(p))
            .unwrap_or(lo);
    }

    /// Moves to the first state with notes at or after `position`.
    ///
    /// The target is raised to the loop start; if nothing up to the loop end
    /// has notes the player lands on the loop start.
    pub fn set_state(&mut self, position: i64) {
        let position = (position.max(0) as usize).max(self.loop_range.lo);
        self.song_position = self.scan_forward(position).unwrap_or(self.loop_range.lo);
    }

    /// Moves to the first state with notes in measure `measure` (0-based, clamped).
    pub fn set_measure(&mut self, measure: i64) {
        let position = self.song.first_position_in_measure(measure);
        self.set_state(position as i64);
    }

    /// Position the next completed state would move to.
    pub fn peek_next_position(&self) -> usize {
        self.scan_forward(self.song_position + 1).unwrap_or_else(|| {
            self.scan_forward(self.loop_range.lo)
                .unwrap_or(self.loop_range.lo)
        })
    }

    // ==================== Loop ====================

    /// Sets the loop start, dragging the end along if it would cross it.
    pub fn set_loop_start(&mut self, position: usize) {
        let lo = position.min(self.last_position());
        self.loop_range.lo = lo;
        if self.loop_range.hi < lo {
            self.loop_range.hi = lo;
        }
        self.keep_inside_loop();
    }

    /// Sets the loop end, dragging the start along if it would cross it.
    pub fn set_loop_end(&mut self, position: usize) {
        let hi = position.min(self.last_position());
        self.loop_range.hi = hi;
        if self.loop_range.lo > hi {
            self.loop_range.lo = hi;
        }
        self.keep_inside_loop();
    }

    /// Starts the loop at the current position.
    pub fn set_loop_start_to_position(&mut self) {
        self.set_loop_start(self.song_position);
    }

    /// Ends the loop at the current position.
    pub fn set_loop_end_to_position(&mut self) {
        self.set_loop_end(self.song_position);
    }

    /// Loops over the whole song again.
    pub fn clear_loop(&mut self) {
        self.loop_range = LoopRange {
            lo: 0,
            hi: self.last_position(),
        };
    }

    fn keep_inside_loop(&mut self) {
        let LoopRange { lo, hi } = self.loop_range;
        if self.song_position < lo || self.song_position > hi {
            self.set_state(lo as i64);
        }
    }

    // ==================== Register ====================

    /// Appends a digit to the register. `'-'` resets it and makes it negative.
    pub fn set_register_digit(&mut self, digit: char) {
        if digit == '-' {
            self.register = 0;
            self.register_negative = true;
            self.register_touched = true;
        } else if let Some(value) = digit.to_digit(10) {
            self.register = self.register.saturating_mul(10).saturating_add(value as u64);
            self.register_touched = true;
        }
    }

    /// Empties the register.
    pub fn clear_register(&mut self) {
        self.register = 0;
        self.register_negative = false;
        self.register_touched = false;
    }

    /// Signed register value.
    pub fn register_value(&self) -> i64 {
        let magnitude = self.register.min(i64::MAX as u64) as i64;
        if self.register_negative {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Returns the register value and clears it.
    pub fn consume_register(&mut self) -> i64 {
        let value = self.register_value();
        self.clear_register();
        value
    }

    /// Jumps to the song position held in the register.
    pub fn jump_to_register_position(&mut self) {
        let position = self.consume_register();
        self.set_state(position);
    }

    /// Jumps to the measure held in the register (counting from 1).
    pub fn jump_to_register_measure(&mut self) {
        let measure = self.consume_register();
        self.set_measure(measure - 1);
    }

    // ==================== Channels ====================

    /// Mutes a channel.
    pub fn ignore_channel(&mut self, channel: u8) {
        self.ignored_channels.insert(channel);
        self.set_state(self.song_position as i64);
    }

    /// Unmutes a channel.
    pub fn unignore_channel(&mut self, channel: u8) {
        self.ignored_channels.remove(&channel);
        self.set_state(self.song_position as i64);
    }

    /// Flips a channel between muted and unmuted.
    pub fn toggle_ignore_channel(&mut self, channel: u8) {
        if self.ignored_channels.contains(&channel) {
            self.unignore_channel(channel);
        } else {
            self.ignore_channel(channel);
        }
    }

    /// Unmutes every channel.
    pub fn unignore_all(&mut self) {
        self.ignored_channels.clear();
        self.set_state(self.song_position as i64);
    }

    /// Toggles the channel drawn with palette colour `index`.
    ///
    /// # Returns
    ///
    /// The channel toggled, or `None` if the song has no such colour
    pub fn ignore_channel_by_color(&mut self, index: i64) -> Option<u8> {
        let channel = *self.song.channels().get(usize::try_from(index).ok()?)?;
        self.toggle_ignore_channel(channel);
        Some(channel)
    }

    // ==================== Input ====================

    /// Returns the held notes, widening the rebind range with them.
    pub fn get_pressed(&mut self) -> BTreeSet<u8> {
        let pressed = self.coordinator.pressed_snapshot();
        if self.rebind_range {
            for &note in &pressed {
                let (lo, hi) = self.observed_range.unwrap_or((note, note));
                self.observed_range = Some((lo.min(note), hi.max(note)));
            }
            if let Some(range) = self.observed_range {
                self.display_range = range;
            }
        }
        pressed
    }

    /// Starts or stops learning the keyboard's range from played keys.
    pub fn toggle_rebind_range(&mut self) {
        self.rebind_range = !self.rebind_range;
        if self.rebind_range {
            self.observed_range = None;
        }
    }

    /// Whether the keyboard range is being learned.
    pub fn rebind_range(&self) -> bool {
        self.rebind_range
    }

    /// Keys drawn on the keyboard, inclusive.
    pub fn display_range(&self) -> (u8, u8) {
        self.display_range
    }

    /// Advances if `held` completes the current state.
    ///
    /// A state is complete when every required note is held and none of the
    /// held notes is still waiting to be released from the previous state.
    ///
    /// # Returns
    ///
    /// True if the player moved on
    pub fn do_state_check(&mut self, held: &BTreeSet<u8>) -> bool {
        let need = self.required_notes();
        if !need.is_subset(held) || !held.is_disjoint(&self.need_to_release) {
            return false;
        }
        self.need_to_release.extend(held.iter().copied());
        let from = self.song_position;
        self.next_state();
        tracing::trace!(from, to = self.song_position, "state completed");
        true
    }

    /// A key came up; it may count toward the next state again.
    pub fn release_note(&mut self, note: u8) {
        self.need_to_release.remove(&note);
    }

    /// Forgets every note waiting for release.
    pub fn clear_need_to_release(&mut self) {
        self.need_to_release.clear();
    }

    // ==================== Persistence & view ====================

    /// State worth restoring next time the song is opened.
    pub fn settings(&self) -> PlayerSettings {
        PlayerSettings {
            song_position: self.song_position,
            loop_range: self.loop_range,
            ignored_channels: self.ignored_channels.clone(),
        }
    }

    /// Restores saved settings.
    ///
    /// # Returns
    ///
    /// False (and nothing changed) if the settings do not fit this song
    pub fn restore(&mut self, settings: &PlayerSettings) -> bool {
        let LoopRange { lo, hi } = settings.loop_range;
        let last = self.last_position();
        if self.song.is_blank() || lo > hi || hi > last || settings.song_position > last {
            return false;
        }
        if settings.ignored_channels.iter().any(|&c| c > 15) {
            return false;
        }
        self.loop_range = settings.loop_range;
        self.ignored_channels = settings.ignored_channels.clone();
        self.set_state(settings.song_position as i64);
        true
    }

    /// Copies out everything the view needs.
    pub fn view(&mut self) -> PlayerView {
        let pressed = self.get_pressed();
        PlayerView {
            song_position: self.song_position,
            loop_range: self.loop_range,
            ignored_channels: self.ignored_channels.clone(),
            need_to_release: self.need_to_release.clone(),
            register: self.register_touched.then(|| {
                if self.register_negative && self.register == 0 {
                    "-".to_string()
                } else {
                    self.register_value().to_string()
                }
            }),
            pressed,
            display_range: self.display_range,
            rebind_range: self.rebind_range,
        }
    }
}

impl StateCheck for Mutex<Player> {
    fn do_state_check(&self, held: &BTreeSet<u8>) {
        lock(self).do_state_check(held);
    }

    fn release_note(&self, note: u8) {
        lock(self).release_note(note);
    }

    fn device_gone(&self) {
        lock(self).clear_need_to_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::fixtures::{ascending_song, random_song, two_channel_song};
    use crate::midi::{Event, TimedEvent};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn player_for(events: &[TimedEvent], ppqn: u16) -> (Player, Arc<Coordinator>) {
        let song = Arc::new(SongModel::build(events, ppqn, 0));
        let (coordinator, _worker) = Coordinator::new();
        (Player::new(song, Arc::clone(&coordinator)), coordinator)
    }

    fn ascending_player() -> Player {
        player_for(&ascending_song(12, 40), 40).0
    }

    fn held(notes: &[u8]) -> BTreeSet<u8> {
        notes.iter().copied().collect()
    }

    #[test]
    fn test_starts_on_first_note() {
        let events = vec![
            TimedEvent::new(80, Event::note_on(0, 60, 100)),
            TimedEvent::new(120, Event::NoteOff { note: 60, channel: 0 }),
        ];
        let (player, _) = player_for(&events, 40);
        assert_eq!(player.song_position(), 10);
    }

    #[test]
    fn test_advance_requires_rearticulation() {
        let mut player = ascending_player();
        assert_eq!(player.song_position(), 0);

        assert!(player.do_state_check(&held(&[64])));
        assert_eq!(player.song_position(), 5);

        // 64 still down from the previous state
        assert!(!player.do_state_check(&held(&[64, 65])));
        assert_eq!(player.song_position(), 5);

        player.release_note(64);
        player.release_note(65);
        assert!(player.do_state_check(&held(&[65])));
        assert_eq!(player.song_position(), 10);
    }

    #[test]
    fn test_missing_note_does_not_advance() {
        let (mut player, _) = player_for(&two_channel_song(40), 40);
        assert!(!player.do_state_check(&held(&[60, 64, 67])));
        assert!(player.do_state_check(&held(&[48, 60, 64, 67])));
        assert_eq!(player.need_to_release(), &held(&[48, 60, 64, 67]));
    }

    #[test]
    fn test_loop_wraps_to_start() {
        let mut player = ascending_player();
        player.set_loop_start(5);
        player.set_loop_end(15);
        player.set_state(15);
        assert_eq!(player.song_position(), 15);

        player.next_state();
        assert_eq!(player.song_position(), 5);
    }

    #[test]
    fn test_prev_state_stops_at_loop_start() {
        let mut player = ascending_player();
        player.set_state(20);
        player.prev_state();
        assert_eq!(player.song_position(), 15);

        player.set_loop_start(10);
        player.prev_state();
        assert_eq!(player.song_position(), 10);
        player.prev_state();
        assert_eq!(player.song_position(), 10);
    }

    #[test]
    fn test_set_state_snaps_forward() {
        let mut player = ascending_player();
        player.set_state(6);
        assert_eq!(player.song_position(), 10);

        player.set_state(-4);
        assert_eq!(player.song_position(), 0);

        // Past every note: back to the loop start
        player.set_state(1000);
        assert_eq!(player.song_position(), 0);
    }

    #[test]
    fn test_measure_jump_from_register() {
        let mut player = ascending_player();
        player.set_register_digit('3');
        player.jump_to_register_measure();

        assert_eq!(
            player.song_position(),
            player.song().first_position_in_measure(2)
        );
        assert_eq!(player.register_value(), 0);
    }

    #[test]
    fn test_register_digits_and_sign() {
        let mut player = ascending_player();
        player.set_register_digit('1');
        player.set_register_digit('5');
        assert_eq!(player.register_value(), 15);

        player.set_register_digit('-');
        assert_eq!(player.register_value(), 0);
        player.set_register_digit('7');
        assert_eq!(player.register_value(), -7);
        assert_eq!(player.view().register.as_deref(), Some("-7"));

        player.clear_register();
        assert_eq!(player.view().register, None);

        player.set_register_digit('2');
        player.set_register_digit('0');
        player.jump_to_register_position();
        assert_eq!(player.song_position(), 20);
    }

    #[test]
    fn test_ignored_channel_drops_notes() {
        let (mut player, _) = player_for(&two_channel_song(40), 40);
        assert_eq!(player.required_notes(), held(&[48, 60, 64, 67]));

        player.ignore_channel(1);
        assert_eq!(player.required_notes(), held(&[60, 64, 67]));
        assert!(player.do_state_check(&held(&[60, 64, 67])));
    }

    #[test]
    fn test_ignored_channel_single_note() {
        let events = vec![
            TimedEvent::new(0, Event::note_on(0, 60, 100)),
            TimedEvent::new(0, Event::note_on(1, 72, 100)),
            TimedEvent::new(40, Event::note_on(0, 62, 100)),
            TimedEvent::new(80, Event::NoteOff { note: 62, channel: 0 }),
        ];
        let (mut player, _) = player_for(&events, 40);
        player.ignore_channel(1);
        assert_eq!(player.required_notes(), held(&[60]));
        assert!(player.do_state_check(&held(&[60])));
        assert_eq!(player.song_position(), 5);
    }

    #[test]
    fn test_muting_only_channel_moves_on() {
        let (mut player, _) = player_for(&two_channel_song(40), 40);
        player.ignore_channel(0);
        // Only channel 1 remains, and it sounds at position 0 only
        assert_eq!(player.song_position(), 0);

        player.ignore_channel(1);
        assert_eq!(player.song_position(), 0);
        assert!(player.required_notes().is_empty());

        player.unignore_all();
        assert_eq!(player.required_notes(), held(&[48, 60, 64, 67]));
    }

    #[test]
    fn test_ignore_by_palette_index() {
        let (mut player, _) = player_for(&two_channel_song(40), 40);
        assert_eq!(player.ignore_channel_by_color(1), Some(1));
        assert!(player.ignored_channels().contains(&1));
        assert_eq!(player.ignore_channel_by_color(1), Some(1));
        assert!(player.ignored_channels().is_empty());
        assert_eq!(player.ignore_channel_by_color(5), None);
        assert_eq!(player.ignore_channel_by_color(-1), None);
    }

    #[test]
    fn test_loop_bounds_clamp_and_drag() {
        let mut player = ascending_player();
        player.set_loop_end(1000);
        assert_eq!(player.loop_range(), LoopRange { lo: 0, hi: 59 });

        player.set_loop_start(30);
        player.set_loop_end(20);
        assert_eq!(player.loop_range(), LoopRange { lo: 20, hi: 20 });

        player.set_loop_start(40);
        assert_eq!(player.loop_range(), LoopRange { lo: 40, hi: 40 });
        assert_eq!(player.song_position(), 40);

        player.clear_loop();
        assert_eq!(player.loop_range(), LoopRange { lo: 0, hi: 59 });
    }

    #[test]
    fn test_loop_to_current_position() {
        let mut player = ascending_player();
        player.set_state(10);
        player.set_loop_start_to_position();
        player.set_state(25);
        player.set_loop_end_to_position();
        assert_eq!(player.loop_range(), LoopRange { lo: 10, hi: 25 });
        assert_eq!(player.peek_next_position(), 10);
    }

    #[test]
    fn test_rebind_learns_range() {
        let (mut player, coordinator) = player_for(&ascending_song(4, 40), 40);
        assert_eq!(player.display_range(), (PIANO_LOWEST, PIANO_HIGHEST));

        player.toggle_rebind_range();
        coordinator.press(48);
        player.get_pressed();
        coordinator.release(48);
        coordinator.press(84);
        player.get_pressed();
        assert_eq!(player.display_range(), (48, 84));

        player.toggle_rebind_range();
        coordinator.press(30);
        player.get_pressed();
        assert_eq!(player.display_range(), (48, 84));
    }

    #[test]
    fn test_display_range_covers_song_notes() {
        let events = [
            TimedEvent::new(0, Event::note_on(0, 112, 100)),
            TimedEvent::new(40, Event::note_on(0, 115, 100)),
            TimedEvent::new(80, Event::note_on(0, 12, 100)),
        ];
        let (player, _) = player_for(&events, 40);
        assert_eq!(player.display_range(), (12, 115));
    }

    #[test]
    fn test_restore_rejects_foreign_settings() {
        let mut player = ascending_player();
        let saved = PlayerSettings {
            song_position: 25,
            loop_range: LoopRange { lo: 20, hi: 40 },
            ignored_channels: BTreeSet::new(),
        };
        assert!(player.restore(&saved));
        assert_eq!(player.settings(), saved);

        let mut other = ascending_player();
        let too_long = PlayerSettings {
            song_position: 5,
            loop_range: LoopRange { lo: 0, hi: 500 },
            ignored_channels: BTreeSet::new(),
        };
        assert!(!other.restore(&too_long));
        assert_eq!(other.loop_range(), LoopRange { lo: 0, hi: 59 });
    }

    #[test]
    fn test_worker_drives_player() {
        let song = Arc::new(SongModel::build(&ascending_song(12, 40), 40, 0));
        let (coordinator, worker) = Coordinator::new();
        let player = Mutex::new(Player::new(song, Arc::clone(&coordinator)));

        coordinator.press(64);
        worker.run_pending(&player);
        assert_eq!(lock(&player).song_position(), 5);

        coordinator.press(65);
        worker.run_pending(&player);
        assert_eq!(lock(&player).song_position(), 5);

        coordinator.release(64);
        coordinator.release(65);
        coordinator.press(65);
        worker.run_pending(&player);
        assert_eq!(lock(&player).song_position(), 10);

        // Losing the device forgets what had to be released
        coordinator.attach("Keys");
        coordinator.detach("Keys");
        worker.run_pending(&player);
        assert!(lock(&player).need_to_release().is_empty());
    }

    #[test]
    fn test_navigation_stays_in_loop() {
        for seed in 0..48 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (events, ppqn) = random_song(&mut rng);
            let (mut player, _) = player_for(&events, ppqn);
            let len = player.song().len();
            if len == 0 {
                continue;
            }

            let lo = rng.random_range(0..len);
            let hi = rng.random_range(lo..len);
            player.set_loop_start(lo);
            player.set_loop_end(hi);
            let loop_empty = (lo..=hi).all(|p| player.song().is_empty(p));

            for _ in 0..64 {
                match rng.random_range(0..3) {
                    0 => {
                        player.next_state();
                        let pos = player.song_position();
                        if loop_empty {
                            assert_eq!(pos, lo, "seed {seed}");
                        } else {
                            assert!(!player.song().is_empty(pos), "seed {seed}");
                        }
                    }
                    1 => player.prev_state(),
                    _ => player.set_state(rng.random_range(-10..len as i64 + 10)),
                }
                let pos = player.song_position();
                assert!(lo <= pos && pos <= hi, "seed {seed}: {pos} outside {lo}..={hi}");
            }
        }
    }

    #[test]
    fn test_measure_round_trip() {
        // One note per beat, so every measure has something to land on
        for count in [4u64, 9, 16] {
            let (mut player, _) = player_for(&ascending_song(count, 24), 24);
            let measures = player.song().measure_count() as i64;
            for m in 0..measures + 3 {
                player.set_measure(m);
                let expected = m.min(measures - 1) as usize;
                assert_eq!(player.song().measure_of(player.song_position()), expected);
            }
        }
    }

    #[test]
    fn test_state_check_rule() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let (mut player, _) = player_for(&two_channel_song(40), 40);
            let pool = [48u8, 60, 62, 64, 67, 72];
            let pick = |rng: &mut ChaCha8Rng| -> BTreeSet<u8> {
                pool.iter().copied().filter(|_| rng.random_bool(0.5)).collect()
            };
            for note in pick(&mut rng) {
                player.need_to_release.insert(note);
            }
            let held = pick(&mut rng);

            let need = player.required_notes();
            let expected = need.is_subset(&held) && held.is_disjoint(player.need_to_release());
            let before = player.song_position();
            assert_eq!(player.do_state_check(&held), expected);
            assert_eq!(player.song_position() != before, expected);
        }
    }
}
