//! Live key state shared between the MIDI device and the player.
//!
//! The [`Coordinator`] owns the set of currently held notes. The device
//! callback thread reports presses and releases; each one queues a signal
//! for the [`CheckWorker`], which applies releases in arrival order and then
//! runs a single state check against a fresh snapshot of the held notes.
//! Presses that arrive while a check is running are folded into the next one.
//! Only presses ask for a check: lifting a key never completes a state.

pub mod device;

use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender, TrySendError};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use device::{spawn_device_watch, DeviceWatch, Transition};

/// How long the worker waits for a signal before re-checking the shutdown flag.
const WORKER_IDLE: Duration = Duration::from_millis(50);

/// Work queued for the check worker, other than the state check itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A key was released on the device.
    Released(u8),
    /// The active device went away; every key counts as released.
    DeviceGone,
}

/// Receiver of the worker's dispatches. Implemented by the player.
pub trait StateCheck: Send + Sync {
    /// Compares the held notes against the current song position.
    fn do_state_check(&self, held: &BTreeSet<u8>);

    /// A single key went up.
    fn release_note(&self, note: u8);

    /// The device disappeared.
    fn device_gone(&self) {}
}

/// Locks a mutex, taking the data even if another thread panicked with it held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared key state and the producer side of the check queue.
#[derive(Debug)]
pub struct Coordinator {
    /// Notes currently held on the active device.
    pressed: Mutex<BTreeSet<u8>>,
    /// Name of the attached input port.
    active_device: Mutex<Option<String>>,
    /// Holds at most one pending check; a full queue already covers a new one.
    checks: Sender<()>,
    /// Releases and device loss, never dropped.
    signals: Sender<Signal>,
}

/// Consumer side of the check queue.
#[derive(Debug)]
pub struct CheckWorker {
    coordinator: Arc<Coordinator>,
    checks: Receiver<()>,
    signals: Receiver<Signal>,
}

impl Coordinator {
    /// Creates the coordinator and the worker that drains its queue.
    pub fn new() -> (Arc<Self>, CheckWorker) {
        let (check_tx, check_rx) = bounded(1);
        let (signal_tx, signal_rx) = unbounded();

        let coordinator = Arc::new(Self {
            pressed: Mutex::new(BTreeSet::new()),
            active_device: Mutex::new(None),
            checks: check_tx,
            signals: signal_tx,
        });
        let worker = CheckWorker {
            coordinator: Arc::clone(&coordinator),
            checks: check_rx,
            signals: signal_rx,
        };
        (coordinator, worker)
    }

    /// Records a key press and requests a state check.
    pub fn press(&self, note: u8) {
        lock(&self.pressed).insert(note);
        self.request_check();
    }

    /// Records a key release.
    ///
    /// The release is forwarded to the player even when the note was not
    /// known to be held, so a release that raced a device switch still
    /// clears it.
    pub fn release(&self, note: u8) {
        lock(&self.pressed).remove(&note);
        let _ = self.signals.send(Signal::Released(note));
    }

    /// Returns a copy of the currently held notes.
    pub fn pressed_snapshot(&self) -> BTreeSet<u8> {
        lock(&self.pressed).clone()
    }

    /// Makes `device` the active input, replacing any previous one.
    pub fn attach(&self, device: &str) {
        let previous = lock(&self.active_device).replace(device.to_string());
        if let Some(previous) = previous.filter(|p| p != device) {
            tracing::info!(replaced = %previous, "MIDI device replaced");
            self.forget_keys();
        }
        tracing::info!(device, "MIDI device attached");
    }

    /// Detaches `device` if it is the active input.
    ///
    /// # Returns
    ///
    /// True if the device was active
    pub fn detach(&self, device: &str) -> bool {
        let mut active = lock(&self.active_device);
        if active.as_deref() != Some(device) {
            return false;
        }
        *active = None;
        drop(active);

        tracing::info!(device, "MIDI device detached");
        self.forget_keys();
        true
    }

    /// Name of the active input port, if any.
    pub fn active_device(&self) -> Option<String> {
        lock(&self.active_device).clone()
    }

    fn forget_keys(&self) {
        lock(&self.pressed).clear();
        let _ = self.signals.send(Signal::DeviceGone);
    }

    fn request_check(&self) {
        match self.checks.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!("check worker gone, dropping state check");
            }
        }
    }
}

impl CheckWorker {
    /// Drains everything queued so far and dispatches it.
    ///
    /// Check requests are taken first, then releases are applied in arrival
    /// order, then at most one state check runs against the held notes as
    /// they are now. A release sent before a press is therefore always
    /// applied before the check that press asked for.
    ///
    /// # Returns
    ///
    /// Number of state checks dispatched (0 or 1)
    pub fn run_pending<C: StateCheck + ?Sized>(&self, checker: &C) -> usize {
        let mut wanted = false;
        while self.checks.try_recv().is_ok() {
            wanted = true;
        }

        for signal in self.signals.try_iter() {
            match signal {
                Signal::Released(note) => checker.release_note(note),
                Signal::DeviceGone => checker.device_gone(),
            }
        }

        if !wanted {
            return 0;
        }

        let held = self.coordinator.pressed_snapshot();
        checker.do_state_check(&held);
        1
    }

    /// Runs until `running` is cleared.
    pub fn run<C: StateCheck + ?Sized>(self, checker: &C, running: &AtomicBool) {
        tracing::debug!("check worker started");
        while running.load(Ordering::Relaxed) {
            let mut select = Select::new();
            select.recv(&self.signals);
            select.recv(&self.checks);
            if select.ready_timeout(WORKER_IDLE).is_ok() {
                self.run_pending(checker);
            }
        }
        tracing::debug!("check worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every dispatch it receives.
    #[derive(Default)]
    struct Recorder {
        checks: Mutex<Vec<BTreeSet<u8>>>,
        released: Mutex<Vec<u8>>,
        gone: Mutex<usize>,
    }

    impl StateCheck for Recorder {
        fn do_state_check(&self, held: &BTreeSet<u8>) {
            lock(&self.checks).push(held.clone());
        }

        fn release_note(&self, note: u8) {
            lock(&self.released).push(note);
        }

        fn device_gone(&self) {
            *lock(&self.gone) += 1;
        }
    }

    #[test]
    fn test_burst_coalesces_into_one_check() {
        let (coordinator, worker) = Coordinator::new();
        let recorder = Recorder::default();

        coordinator.press(60);
        coordinator.press(64);
        coordinator.press(67);
        coordinator.release(64);

        assert_eq!(worker.run_pending(&recorder), 1);
        assert_eq!(*lock(&recorder.checks), vec![BTreeSet::from([60, 67])]);
        assert_eq!(*lock(&recorder.released), vec![64]);

        // Nothing left over
        assert_eq!(worker.run_pending(&recorder), 0);
    }

    #[derive(Debug, PartialEq)]
    enum Dispatch {
        Check(BTreeSet<u8>),
        Released(u8),
    }

    /// Logs dispatches in order and re-strikes a key during its first check.
    struct Restriker {
        coordinator: Arc<Coordinator>,
        log: Mutex<Vec<Dispatch>>,
    }

    impl StateCheck for Restriker {
        fn do_state_check(&self, held: &BTreeSet<u8>) {
            let first = lock(&self.log).is_empty();
            lock(&self.log).push(Dispatch::Check(held.clone()));
            if first {
                self.coordinator.release(62);
                self.coordinator.press(62);
            }
        }

        fn release_note(&self, note: u8) {
            lock(&self.log).push(Dispatch::Released(note));
        }

        fn device_gone(&self) {}
    }

    #[test]
    fn test_release_applied_before_racing_check() {
        let (coordinator, worker) = Coordinator::new();
        let restriker = Restriker {
            coordinator: Arc::clone(&coordinator),
            log: Mutex::new(Vec::new()),
        };

        coordinator.press(60);
        assert_eq!(worker.run_pending(&restriker), 1);
        assert_eq!(worker.run_pending(&restriker), 1);
        assert_eq!(
            *lock(&restriker.log),
            vec![
                Dispatch::Check(BTreeSet::from([60])),
                Dispatch::Released(62),
                Dispatch::Check(BTreeSet::from([60, 62])),
            ]
        );

        coordinator.release(60);
        coordinator.press(60);
        assert_eq!(worker.run_pending(&restriker), 1);
        let log = lock(&restriker.log);
        assert_eq!(
            log[3..],
            [
                Dispatch::Released(60),
                Dispatch::Check(BTreeSet::from([60, 62])),
            ]
        );
    }

    #[test]
    fn test_release_of_unheld_note_still_forwarded() {
        let (coordinator, worker) = Coordinator::new();
        let recorder = Recorder::default();

        coordinator.release(72);
        coordinator.release(73);
        worker.run_pending(&recorder);

        assert_eq!(*lock(&recorder.released), vec![72, 73]);
        assert!(coordinator.pressed_snapshot().is_empty());
    }

    #[test]
    fn test_detach_forgets_keys() {
        let (coordinator, worker) = Coordinator::new();
        let recorder = Recorder::default();

        coordinator.attach("Keys");
        coordinator.press(60);
        assert!(!coordinator.detach("Other"));
        assert_eq!(coordinator.pressed_snapshot(), BTreeSet::from([60]));

        assert!(coordinator.detach("Keys"));
        assert_eq!(coordinator.active_device(), None);
        assert!(coordinator.pressed_snapshot().is_empty());

        worker.run_pending(&recorder);
        assert_eq!(*lock(&recorder.gone), 1);
    }

    #[test]
    fn test_newest_device_replaces_previous() {
        let (coordinator, _worker) = Coordinator::new();

        coordinator.attach("First");
        coordinator.press(60);
        coordinator.attach("Second");

        assert_eq!(coordinator.active_device().as_deref(), Some("Second"));
        assert!(coordinator.pressed_snapshot().is_empty());
        assert!(!coordinator.detach("First"));
    }

    #[test]
    fn test_worker_stops_on_shutdown() {
        let (coordinator, worker) = Coordinator::new();
        let recorder = Arc::new(Recorder::default());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let recorder = Arc::clone(&recorder);
            let running = Arc::clone(&running);
            std::thread::spawn(move || worker.run(recorder.as_ref(), &running))
        };

        coordinator.press(60);
        // Wait for the dispatch, bounded so a broken worker fails instead of hanging
        for _ in 0..200 {
            if !lock(&recorder.checks).is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        running.store(false, Ordering::Relaxed);
        handle.join().expect("worker thread panicked");

        assert_eq!(lock(&recorder.checks).last(), Some(&BTreeSet::from([60])));
    }
}
