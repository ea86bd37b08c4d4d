//! MIDI input hot-plug.
//!
//! [`DeviceWatch`] decides which port should be active given the ports that
//! are currently visible; the watch thread polls `midir` for the port list,
//! applies the resulting transitions and owns the open connection. The
//! connection's callback runs on midir's own thread and feeds the
//! [`Coordinator`].

use super::Coordinator;
use crate::error::{Error, Result};
use crate::midi::Event;
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Client name announced to the MIDI system.
const CLIENT_NAME: &str = "midistep";

/// A change the watch thread has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Open this port and make it the active device.
    Attach(String),
    /// Close this port.
    Detach(String),
}

/// Port reconciliation state.
#[derive(Debug, Clone)]
pub struct DeviceWatch {
    /// How long a new port must stay visible before it is attached.
    debounce: Duration,
    /// Ports seen for the first time, with when they appeared.
    pending: BTreeMap<String, Instant>,
    /// Ports visible at the previous poll.
    known: Vec<String>,
    /// Currently attached port.
    active: Option<String>,
    /// False until the first poll, whose ports attach without waiting.
    started: bool,
}

impl DeviceWatch {
    /// Creates a watch that attaches new ports after `debounce`.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: BTreeMap::new(),
            known: Vec::new(),
            active: None,
            started: false,
        }
    }

    /// Currently attached port.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Compares the visible ports with the last poll.
    ///
    /// # Arguments
    ///
    /// * `available` - Port names visible right now, in system order
    /// * `now` - Time of the poll
    ///
    /// # Returns
    ///
    /// Transitions to apply, detaches first
    pub fn reconcile(&mut self, available: &[String], now: Instant) -> Vec<Transition> {
        let mut transitions = Vec::new();

        if let Some(active) = &self.active {
            if !available.contains(active) {
                transitions.push(Transition::Detach(active.clone()));
                self.active = None;
            }
        }

        self.pending.retain(|name, _| available.contains(name));
        if self.started {
            for name in available {
                if !self.known.contains(name) {
                    self.pending.insert(name.clone(), now);
                }
            }
        }

        // Newest matured port wins; ties go to the later port in system order
        let matured = available
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                let seen = *self.pending.get(name)?;
                (now.duration_since(seen) >= self.debounce).then_some((seen, index, name))
            })
            .max();
        let candidate = match matured {
            Some((_, _, name)) => Some(name.clone()),
            // Nothing new; fall back to any settled port
            None if self.active.is_none() => available
                .iter()
                .rev()
                .find(|name| !self.pending.contains_key(*name))
                .cloned(),
            None => None,
        };
        self.pending
            .retain(|_, seen| now.duration_since(*seen) < self.debounce);

        if let Some(name) = candidate {
            if self.active.as_ref() != Some(&name) {
                if let Some(previous) = self.active.take() {
                    transitions.push(Transition::Detach(previous));
                }
                transitions.push(Transition::Attach(name.clone()));
                self.active = Some(name);
            }
        }

        self.known = available.to_vec();
        self.started = true;
        transitions
    }

    /// Forgets an attach that could not be opened so the next poll retries.
    pub fn connect_failed(&mut self, name: &str) {
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
    }
}

/// Lists the names of the visible MIDI input ports.
///
/// # Errors
///
/// Returns [`Error::Device`] if the MIDI system cannot be reached.
pub fn list_ports() -> Result<Vec<String>> {
    let input = MidiInput::new(CLIENT_NAME).map_err(|e| Error::Device(e.to_string()))?;
    Ok(input
        .ports()
        .iter()
        .filter_map(|port| input.port_name(port).ok())
        .collect())
}

/// Opens `name` and routes its note messages into `coordinator`.
///
/// # Errors
///
/// Returns [`Error::Device`] if the port is gone or refuses the connection.
pub fn connect(name: &str, coordinator: Arc<Coordinator>) -> Result<MidiInputConnection<()>> {
    let mut input = MidiInput::new(CLIENT_NAME).map_err(|e| Error::Device(e.to_string()))?;
    input.ignore(Ignore::All);

    let port = input
        .ports()
        .into_iter()
        .find(|port| input.port_name(port).is_ok_and(|n| n == name))
        .ok_or_else(|| Error::Device(format!("port '{name}' is no longer available")))?;

    input
        .connect(
            &port,
            "midistep-input",
            move |_timestamp, bytes, _| match Event::from_bytes(bytes) {
                Some(Event::NoteOn { note, .. }) => coordinator.press(note),
                Some(Event::NoteOff { note, .. }) => coordinator.release(note),
                _ => {}
            },
            (),
        )
        .map_err(|e| Error::Device(e.to_string()))
}

/// Starts the thread that keeps the newest MIDI input attached.
pub fn spawn_device_watch(
    coordinator: Arc<Coordinator>,
    poll_interval: Duration,
    debounce: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut watch = DeviceWatch::new(debounce);
        let mut connection: Option<MidiInputConnection<()>> = None;

        while running.load(Ordering::Relaxed) {
            match list_ports() {
                Ok(ports) => {
                    for transition in watch.reconcile(&ports, Instant::now()) {
                        match transition {
                            Transition::Detach(name) => {
                                // Dropping the connection closes the port
                                connection = None;
                                coordinator.detach(&name);
                            }
                            Transition::Attach(name) => {
                                match connect(&name, Arc::clone(&coordinator)) {
                                    Ok(conn) => {
                                        connection = Some(conn);
                                        coordinator.attach(&name);
                                    }
                                    Err(e) => {
                                        tracing::warn!(
                                            device = %name,
                                            error = %e,
                                            "failed to open MIDI input"
                                        );
                                        watch.connect_failed(&name);
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to list MIDI inputs"),
            }

            // Sleep in short steps so shutdown is not held up by the poll interval
            let wake = Instant::now() + poll_interval;
            while running.load(Ordering::Relaxed) && Instant::now() < wake {
                thread::sleep(Duration::from_millis(16));
            }
        }

        drop(connection);
        tracing::debug!("device watch stopped");
    })
}
