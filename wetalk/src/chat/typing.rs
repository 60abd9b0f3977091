//! Typing indicators.
//!
//! The local side debounces keystrokes into one `typing{true}` broadcast
//! followed by one `typing{false}` once input has been idle for the debounce
//! window. The remote side tracks which peers currently report typing.
//!
//! Time is passed in by the caller so the coordinator holds no timers; the
//! session driver sleeps until [`TypingCoordinator::deadline`].

use std::time::Duration;

use tokio::time::Instant;

/// Default idle window before `typing{false}` is sent.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Number of typing nicknames spelled out by [`TypingCoordinator::describe`].
const DESCRIBED_NAMES: usize = 2;

/// Local debounce state plus the set of remote typists.
#[derive(Debug)]
pub struct TypingCoordinator {
    local_nickname: String,
    debounce: Duration,
    /// `Some` while the local user is considered typing.
    deadline: Option<Instant>,
    /// Remote typists in arrival order.
    remote: Vec<String>,
}

impl TypingCoordinator {
    /// Creates a coordinator for `local_nickname`.
    pub fn new(local_nickname: impl Into<String>, debounce: Duration) -> Self {
        Self {
            local_nickname: local_nickname.into(),
            debounce,
            deadline: None,
            remote: Vec::new(),
        }
    }

    /// Registers a local input change at `now`.
    ///
    /// Returns `true` when this input starts a typing burst and
    /// `typing{true}` must be broadcast. Every call restarts the timer.
    pub fn on_local_input(&mut self, now: Instant) -> bool {
        let started = self.deadline.is_none();
        self.deadline = Some(now + self.debounce);
        started
    }

    /// When the pending `typing{false}` is due, if the user is typing.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the local user is currently considered typing.
    #[must_use]
    pub const fn is_local_typing(&self) -> bool {
        self.deadline.is_some()
    }

    /// Ends the typing burst if the window has elapsed at `now`.
    ///
    /// Returns `true` exactly once per burst, when `typing{false}` must be
    /// broadcast.
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Applies a remote typing notice. The local nickname is never tracked.
    ///
    /// Returns whether the set of typists changed.
    pub fn on_remote_typing(&mut self, nickname: &str, is_typing: bool) -> bool {
        if nickname == self.local_nickname {
            return false;
        }
        let present = self.remote.iter().any(|n| n == nickname);
        match (is_typing, present) {
            (true, false) => {
                self.remote.push(nickname.to_string());
                true
            }
            (false, true) => self.remove_remote(nickname),
            _ => false,
        }
    }

    /// Drops `nickname` from the typists, e.g. when it leaves the room.
    pub fn remove_remote(&mut self, nickname: &str) -> bool {
        let before = self.remote.len();
        self.remote.retain(|n| n != nickname);
        self.remote.len() != before
    }

    /// Remote typists in arrival order.
    #[must_use]
    pub fn typing_peers(&self) -> &[String] {
        &self.remote
    }

    /// Human readable summary of who is typing, or `""` when nobody is.
    #[must_use]
    pub fn describe(&self) -> String {
        let named = self
            .remote
            .iter()
            .take(DESCRIBED_NAMES)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match self.remote.len() {
            0 => String::new(),
            1 => format!("{named} is typing..."),
            n if n <= DESCRIBED_NAMES => format!("{named} are typing..."),
            _ => format!("{named} and others are typing..."),
        }
    }

    /// Resets local and remote state.
    pub fn clear(&mut self) {
        self.deadline = None;
        self.remote.clear();
    }
}
