//! Presence registry: who is in the room, as far as this peer knows.
//!
//! Membership is reconciled from `join`, `leave` and `userlist` envelopes.
//! Every operation is an overwrite or a removal keyed by nickname, so the
//! registry converges regardless of how envelopes from different senders
//! interleave.

use std::collections::HashMap;

use wetalk_proto::presence::Participant;

/// Nickname to avatar mapping in insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresenceRegistry {
    members: Vec<Participant>,
    /// Position of each nickname in `members`.
    index: HashMap<String, usize>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `nickname` or overwrites its avatar. Never creates a second
    /// entry for the same nickname.
    pub fn apply_join(&mut self, nickname: &str, avatar: &str) {
        match self.index.get(nickname) {
            Some(&pos) => avatar.clone_into(&mut self.members[pos].avatar),
            None => {
                self.index.insert(nickname.to_string(), self.members.len());
                self.members.push(Participant::new(nickname, avatar));
            }
        }
    }

    /// Removes `nickname`. Returns whether it was present.
    pub fn apply_leave(&mut self, nickname: &str) -> bool {
        let Some(pos) = self.index.remove(nickname) else {
            return false;
        };
        self.members.remove(pos);
        for member in &self.members[pos..] {
            if let Some(slot) = self.index.get_mut(&member.nickname) {
                *slot -= 1;
            }
        }
        true
    }

    /// Replaces the whole registry with `users`.
    ///
    /// Later duplicates of a nickname overwrite earlier ones, so the result
    /// still holds one entry per nickname.
    pub fn apply_snapshot(&mut self, users: &[Participant]) {
        self.clear();
        self.members.reserve(users.len());
        self.index.reserve(users.len());
        for user in users {
            self.apply_join(&user.nickname, &user.avatar);
        }
    }

    /// Whether `nickname` is currently present.
    #[must_use]
    pub fn contains(&self, nickname: &str) -> bool {
        self.index.contains_key(nickname)
    }

    /// Avatar recorded for `nickname`.
    #[must_use]
    pub fn avatar_of(&self, nickname: &str) -> Option<&str> {
        self.index
            .get(nickname)
            .map(|&pos| self.members[pos].avatar.as_str())
    }

    /// All members in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        self.members.clone()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.members.clear();
        self.index.clear();
    }
}
