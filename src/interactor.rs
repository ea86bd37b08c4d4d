//! Key sequence dispatch.
//!
//! Bindings live in one prefix trie per [`Context`]. Characters walk the
//! trie; a leaf fires its action straight away, while a node that both has
//! an action and children waits to see whether a longer binding follows.
//! When the next character does not continue the sequence, the longest
//! binding typed so far fires and the character is tried again from the root.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Escape, as delivered by the input thread.
pub const ESC: char = '\x1b';

/// How long characters are dropped after an action fires.
pub const DEFAULT_IGNORE_WINDOW: Duration = Duration::from_millis(16);

/// Something a key sequence can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,
    NextState,
    PrevState,
    /// Append a digit (or `'-'`) to the register.
    RegisterDigit(char),
    ClearRegister,
    JumpToPosition,
    JumpToMeasure,
    /// Toggle the channel whose palette index is in the register.
    IgnoreChannel,
    UnignoreAll,
    LoopStart,
    LoopEnd,
    ClearLoop,
    ToggleAutoplay,
    ToggleRebindRange,
}

/// Which set of bindings is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Context {
    /// Playing a song.
    Default,
    /// The help overlay is open.
    Help,
}

#[derive(Debug, Clone, Default)]
struct Node {
    action: Option<Action>,
    children: BTreeMap<char, Node>,
}

impl Node {
    fn get(&self, path: &[char]) -> Option<&Node> {
        path.iter().try_fold(self, |node, ch| node.children.get(ch))
    }

    /// Removes the binding at `path`, then prunes nodes left with nothing.
    ///
    /// Returns true if this node is now empty and can be dropped.
    fn unset(&mut self, path: &[char]) -> bool {
        match path.split_first() {
            None => self.action = None,
            Some((ch, rest)) => {
                if let Some(child) = self.children.get_mut(ch) {
                    if child.unset(rest) {
                        self.children.remove(ch);
                    }
                }
            }
        }
        self.action.is_none() && self.children.is_empty()
    }
}

/// Turns typed characters into [`Action`]s.
#[derive(Debug, Clone)]
pub struct Interactor {
    tries: BTreeMap<Context, Node>,
    context: Context,
    /// Characters consumed since the root.
    path: Vec<char>,
    ignore_window: Duration,
    ignore_until: Option<Instant>,
}

impl Default for Interactor {
    fn default() -> Self {
        Self::with_default_bindings(DEFAULT_IGNORE_WINDOW)
    }
}

impl Interactor {
    /// Creates an interactor with no bindings.
    pub fn new(ignore_window: Duration) -> Self {
        Self {
            tries: BTreeMap::new(),
            context: Context::Default,
            path: Vec::new(),
            ignore_window,
            ignore_until: None,
        }
    }

    /// Creates an interactor with the standard key map.
    pub fn with_default_bindings(ignore_window: Duration) -> Self {
        let mut interactor = Self::new(ignore_window);
        let bindings: &[(&str, Action)] = &[
            ("q", Action::Quit),
            ("h", Action::ToggleHelp),
            ("j", Action::NextState),
            ("k", Action::PrevState),
            ("\x1b", Action::ClearRegister),
            ("p", Action::JumpToPosition),
            ("P", Action::JumpToMeasure),
            ("i", Action::IgnoreChannel),
            ("u", Action::UnignoreAll),
            ("[", Action::LoopStart),
            ("]", Action::LoopEnd),
            ("\\", Action::ClearLoop),
            (".", Action::ToggleAutoplay),
            ("r", Action::ToggleRebindRange),
            ("-", Action::RegisterDigit('-')),
        ];
        for (sequence, action) in bindings {
            interactor.assign(Context::Default, sequence, *action);
        }
        for digit in '0'..='9' {
            interactor.assign(Context::Default, &digit.to_string(), Action::RegisterDigit(digit));
        }

        interactor.assign(Context::Help, "h", Action::ToggleHelp);
        interactor.assign(Context::Help, "\x1b", Action::ToggleHelp);
        interactor.assign(Context::Help, "q", Action::Quit);
        interactor
    }

    /// Binds `sequence` to `action` in `context`, replacing any previous binding.
    pub fn assign(&mut self, context: Context, sequence: &str, action: Action) {
        let mut node = self.tries.entry(context).or_default();
        for ch in sequence.chars() {
            node = node.children.entry(ch).or_default();
        }
        node.action = Some(action);
    }

    /// Removes the binding for `sequence` in `context`.
    pub fn unset(&mut self, context: Context, sequence: &str) {
        let path: Vec<char> = sequence.chars().collect();
        if let Some(root) = self.tries.get_mut(&context) {
            root.unset(&path);
        }
        // The pending path may point into a pruned branch
        if context == self.context {
            self.path.clear();
        }
    }

    /// Switches the live bindings and drops any half-typed sequence.
    pub fn set_context(&mut self, context: Context) {
        self.context = context;
        self.path.clear();
    }

    /// The live context.
    pub fn context(&self) -> Context {
        self.context
    }

    /// Action bound to exactly `sequence` in `context`.
    pub fn binding(&self, context: Context, sequence: &str) -> Option<Action> {
        let path: Vec<char> = sequence.chars().collect();
        self.tries.get(&context)?.get(&path)?.action
    }

    /// Feeds one character typed now.
    pub fn feed(&mut self, ch: char) -> Vec<Action> {
        self.feed_at(ch, Instant::now())
    }

    /// Feeds one character typed at `now`.
    ///
    /// # Returns
    ///
    /// The actions that fired, in order (usually zero or one; two when a
    /// pending shorter binding is committed and the re-fed character fires
    /// on its own)
    pub fn feed_at(&mut self, ch: char, now: Instant) -> Vec<Action> {
        if self.ignore_until.is_some_and(|until| now < until) {
            return Vec::new();
        }

        let mut fired = Vec::new();
        self.step(ch, now, &mut fired, true);
        fired
    }

    fn step(&mut self, ch: char, now: Instant, fired: &mut Vec<Action>, refeed: bool) {
        let Some(root) = self.tries.get(&self.context) else {
            return;
        };
        let Some(current) = root.get(&self.path) else {
            self.path.clear();
            return;
        };

        match current.children.get(&ch) {
            Some(next) if next.children.is_empty() => {
                if let Some(action) = next.action {
                    fired.push(action);
                    self.ignore_until = Some(now + self.ignore_window);
                }
                self.path.clear();
            }
            Some(_) => self.path.push(ch),
            None if self.path.is_empty() => {}
            None => {
                let pending = current.action;
                self.path.clear();
                if let Some(action) = pending {
                    fired.push(action);
                    self.ignore_until = Some(now + self.ignore_window);
                }
                if refeed {
                    self.step(ch, now, fired, false);
                }
            }
        }
    }
}
