//! Application state shared by the session threads.
//!
//! [`App`] ties the song, the player, the key state and the key map
//! together. It is handed to every thread behind an `Arc`; each piece of
//! mutable state sits behind its own short-lived lock.

use crate::cache::{CachedSettings, SettingsCache};
use crate::config::Config;
use crate::controller::{lock, CheckWorker, Coordinator};
use crate::interactor::{Action, Context, Interactor};
use crate::midi::{ImportedSong, SongModel};
use crate::player::{Player, PlayerView};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long a status message stays on screen.
const STATUS_DURATION: Duration = Duration::from_secs(3);

/// Where the per-song settings are stored.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    /// The store.
    pub cache: SettingsCache,
    /// Key of this song.
    pub key: String,
}

/// Tempo-driven stepping, for listening through a passage hands-free.
#[derive(Debug, Clone, Copy)]
struct Autoplay {
    enabled: bool,
    /// When the position last changed, by autoplay or by hand.
    last_step: Instant,
    /// Position seen at `last_step`.
    position: usize,
}

/// Everything one frame draws.
#[derive(Debug, Clone)]
pub struct ViewState {
    /// Song title.
    pub title: String,
    pub player: PlayerView,
    pub show_help: bool,
    pub autoplay: bool,
    /// Active MIDI input.
    pub device: Option<String>,
    pub status: Option<String>,
}

/// Shared application state.
#[derive(Debug)]
pub struct App {
    title: String,
    song: Arc<SongModel>,
    player: Mutex<Player>,
    coordinator: Arc<Coordinator>,
    interactor: Mutex<Interactor>,
    running: Arc<AtomicBool>,
    show_help: AtomicBool,
    autoplay: Mutex<Autoplay>,
    status_message: Mutex<Option<(String, Instant)>>,
    transpose: i8,
    cache: Option<CacheSlot>,
}

impl App {
    /// Builds the song model and the session state around it.
    ///
    /// # Arguments
    ///
    /// * `imported` - The parsed MIDI file
    /// * `config` - Session settings (transpose, ignore window)
    /// * `cache` - Where to remember settings, if anywhere
    ///
    /// # Returns
    ///
    /// The app and the worker that must be run to process key state
    pub fn new(
        imported: ImportedSong,
        config: &Config,
        cache: Option<CacheSlot>,
    ) -> (Self, CheckWorker) {
        let song = Arc::new(SongModel::build(
            &imported.events,
            imported.ppqn,
            config.transpose,
        ));
        tracing::info!(
            title = %imported.name,
            positions = song.len(),
            measures = song.measure_count(),
            channels = song.channels().len(),
            "song loaded"
        );

        let (coordinator, worker) = Coordinator::new();
        let player = Player::new(Arc::clone(&song), Arc::clone(&coordinator));

        let app = Self {
            title: imported.name,
            song,
            player: Mutex::new(player),
            coordinator,
            interactor: Mutex::new(Interactor::with_default_bindings(config.ignore_window)),
            running: Arc::new(AtomicBool::new(true)),
            show_help: AtomicBool::new(false),
            autoplay: Mutex::new(Autoplay {
                enabled: false,
                last_step: Instant::now(),
                position: 0,
            }),
            status_message: Mutex::new(None),
            transpose: config.transpose,
            cache,
        };
        app.restore_settings();
        (app, worker)
    }

    /// The song being played.
    pub fn song(&self) -> &Arc<SongModel> {
        &self.song
    }

    /// The player lock. Keep the guard short-lived.
    pub fn player(&self) -> MutexGuard<'_, Player> {
        lock(&self.player)
    }

    /// The player mutex itself, for the check worker.
    pub fn player_mutex(&self) -> &Mutex<Player> {
        &self.player
    }

    /// Key state shared with the device thread.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// The shutdown flag shared with the worker threads.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Returns false once the session is shutting down.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Starts shutting down. Safe to call any number of times.
    pub fn quit(&self) {
        if self.running.swap(false, Ordering::Relaxed) {
            tracing::info!("shutting down");
        }
    }

    /// Sets a status message to display temporarily.
    pub fn set_status(&self, message: impl Into<String>) {
        *lock(&self.status_message) = Some((message.into(), Instant::now()));
    }

    /// Feeds one typed character through the key map.
    pub fn handle_char(&self, ch: char) {
        let actions = lock(&self.interactor).feed(ch);
        for action in actions {
            self.apply(action);
        }
    }

    /// Carries out one action.
    pub fn apply(&self, action: Action) {
        tracing::trace!(?action, "apply");
        match action {
            Action::Quit => self.quit(),
            Action::ToggleHelp => {
                let shown = !self.show_help.fetch_xor(true, Ordering::Relaxed);
                let context = if shown { Context::Help } else { Context::Default };
                lock(&self.interactor).set_context(context);
            }
            Action::NextState => self.player().next_state(),
            Action::PrevState => self.player().prev_state(),
            Action::RegisterDigit(digit) => self.player().set_register_digit(digit),
            Action::ClearRegister => self.player().clear_register(),
            Action::JumpToPosition => self.player().jump_to_register_position(),
            Action::JumpToMeasure => self.player().jump_to_register_measure(),
            Action::IgnoreChannel => {
                let message = {
                    let mut player = self.player();
                    let index = player.consume_register();
                    match player.ignore_channel_by_color(index) {
                        Some(channel) if player.ignored_channels().contains(&channel) => {
                            format!("Channel {} muted", channel + 1)
                        }
                        Some(channel) => format!("Channel {} unmuted", channel + 1),
                        None => format!("No channel with colour {index}"),
                    }
                };
                self.set_status(message);
            }
            Action::UnignoreAll => {
                self.player().unignore_all();
                self.set_status("All channels unmuted");
            }
            Action::LoopStart => self.player().set_loop_start_to_position(),
            Action::LoopEnd => self.player().set_loop_end_to_position(),
            Action::ClearLoop => self.player().clear_loop(),
            Action::ToggleAutoplay => {
                let position = self.player().song_position();
                let enabled = {
                    let mut autoplay = lock(&self.autoplay);
                    autoplay.enabled = !autoplay.enabled;
                    autoplay.last_step = Instant::now();
                    autoplay.position = position;
                    autoplay.enabled
                };
                self.set_status(if enabled { "Autoplay on" } else { "Autoplay off" });
            }
            Action::ToggleRebindRange => {
                let learning = {
                    let mut player = self.player();
                    player.toggle_rebind_range();
                    player.rebind_range()
                };
                self.set_status(if learning {
                    "Play the lowest and highest keys of your keyboard"
                } else {
                    "Keyboard range fixed"
                });
            }
        }
    }

    /// Per-frame housekeeping: autoplay and status expiry.
    pub fn tick(&self, now: Instant) {
        {
            let mut autoplay = lock(&self.autoplay);
            if autoplay.enabled {
                let mut player = self.player();
                let position = player.song_position();
                if position != autoplay.position {
                    // Moved by hand or by the keyboard: the wait starts over
                    autoplay.position = position;
                    autoplay.last_step = now;
                } else {
                    let wait = self
                        .song
                        .micros_between(position, player.peek_next_position());
                    if now.duration_since(autoplay.last_step) >= Duration::from_micros(wait) {
                        player.next_state();
                        autoplay.position = player.song_position();
                        autoplay.last_step = now;
                    }
                }
            }
        }

        let mut status = lock(&self.status_message);
        if status
            .as_ref()
            .is_some_and(|(_, since)| now.duration_since(*since) > STATUS_DURATION)
        {
            *status = None;
        }
    }

    /// Copies out what the next frame draws.
    pub fn view(&self) -> ViewState {
        let player = self.player().view();
        ViewState {
            title: self.title.clone(),
            player,
            show_help: self.show_help.load(Ordering::Relaxed),
            autoplay: lock(&self.autoplay).enabled,
            device: self.coordinator.active_device(),
            status: lock(&self.status_message)
                .as_ref()
                .map(|(message, _)| message.clone()),
        }
    }

    fn restore_settings(&self) {
        let Some(slot) = &self.cache else {
            return;
        };
        match slot.cache.load(&slot.key) {
            Ok(Some(saved)) if saved.transpose == self.transpose => {
                if self.player().restore(&saved.player) {
                    tracing::info!(key = %slot.key, "restored saved settings");
                    self.set_status("Restored last session");
                } else {
                    tracing::info!(key = %slot.key, "saved settings do not fit this song");
                }
            }
            Ok(Some(saved)) => {
                tracing::info!(
                    saved = saved.transpose,
                    current = self.transpose,
                    "saved settings recorded with another transpose, ignoring"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read saved settings"),
        }
    }

    /// Writes the player settings to the cache. Failures are logged only.
    pub fn save_settings(&self) {
        let Some(slot) = &self.cache else {
            return;
        };
        let settings = CachedSettings {
            transpose: self.transpose,
            player: self.player().settings(),
        };
        if let Err(e) = slot.cache.save(&slot.key, &settings) {
            tracing::warn!(error = %e, "failed to save settings");
        }
    }
}
