//! Runtime configuration.
//!
//! Everything tunable lives in [`Config`]; the binary builds one from its
//! command line and hands it to the session.

use crate::error::{Error, Result};
use crate::interactor::DEFAULT_IGNORE_WINDOW;
use std::path::PathBuf;
use std::time::Duration;

/// Narrowest terminal the keyboard fits in (52 white keys, two columns each, plus borders).
pub const MIN_TERMINAL_WIDTH: u16 = 106;

/// Default redraw rate.
pub const DEFAULT_FPS: u32 = 30;

/// Name of the cache subdirectory.
const CACHE_DIR_NAME: &str = "midistep";

/// Session settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frames drawn per second.
    pub fps: u32,
    /// Minimum terminal width in columns.
    pub min_width: u16,
    /// How often the device watcher lists MIDI ports.
    pub device_poll_interval: Duration,
    /// How long a new port must stay visible before it is attached.
    pub attach_debounce: Duration,
    /// Characters dropped after a key binding fires.
    pub ignore_window: Duration,
    /// Where per-song settings are kept; `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    /// Semitones added to every note.
    pub transpose: i8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            min_width: MIN_TERMINAL_WIDTH,
            device_poll_interval: Duration::from_millis(500),
            attach_debounce: Duration::from_millis(750),
            ignore_window: DEFAULT_IGNORE_WINDOW,
            cache_dir: default_cache_dir(),
            transpose: 0,
        }
    }
}

impl Config {
    /// Time between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.clamp(1, 240)
    }

    /// Fails if the terminal cannot fit the keyboard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalTooNarrow`] when `width` is below the minimum.
    pub fn check_terminal_width(&self, width: u16) -> Result<()> {
        if width < self.min_width {
            return Err(Error::TerminalTooNarrow {
                width,
                required: self.min_width,
            });
        }
        Ok(())
    }
}

/// `$XDG_CACHE_HOME/midistep`, falling back to `~/.cache/midistep`.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .map(|dir| dir.join(CACHE_DIR_NAME))
}
