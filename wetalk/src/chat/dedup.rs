//! Duplicate detection for `message` and `image` envelopes.
//!
//! The broker delivers at least once, so the same id can arrive several
//! times. Own messages are recorded at send time, so their echo from the
//! broker is dropped too.

use std::collections::{HashSet, VecDeque};

use wetalk_proto::message::MessageId;

/// Set of already-processed message ids, scoped to one session.
///
/// With a non-zero capacity the oldest id is evicted once the set is full.
/// Eviction is strictly first-in first-out, so an id can only be forgotten
/// after `capacity` newer ids were recorded.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<MessageId>,
    order: VecDeque<MessageId>,
    capacity: usize,
}

impl Deduplicator {
    /// Creates an unbounded deduplicator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a deduplicator that remembers at most `capacity` ids.
    /// A capacity of zero means unbounded.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Whether `id` was already recorded.
    #[must_use]
    pub fn seen(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Records `id`. Recording an id twice has no further effect.
    pub fn record(&mut self, id: &MessageId) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.order.push_back(id.clone());
        if self.capacity > 0
            && self.order.len() > self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
    }

    /// Records `id` and returns `true` if it had not been seen before.
    pub fn check_and_record(&mut self, id: &MessageId) -> bool {
        if self.seen(id) {
            return false;
        }
        self.record(id);
        true
    }

    /// Number of ids currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no id is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forgets every id.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}
