//! midistep - a step-by-step MIDI practice player for the terminal.
//!
//! A MIDI file is quantized into a sequence of states, each holding the
//! notes that start at that step. The player waits on a state until the
//! notes are held on a connected MIDI keyboard, then moves on.

pub mod app;
pub mod browser;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod interactor;
pub mod midi;
pub mod player;
pub mod ui;

// Re-export commonly used types
pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
pub use midi::SongModel;
pub use player::Player;
