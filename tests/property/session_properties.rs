//! Property-based tests for the session building blocks.
//!
//! Uses proptest to verify:
//! 1. `open(seal(s, k), k) == s` for any non-empty text and key.
//! 2. Opening under a different key never recovers the text.
//! 3. Delivering an id N times is accepted exactly once.
//! 4. join/join/leave converges regardless of cross-sender interleaving.
//! 5. A snapshot replaces the whole registry.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;

use proptest::prelude::*;

use wetalk::chat::dedup::Deduplicator;
use wetalk::chat::presence::PresenceRegistry;
use wetalk::crypto;
use wetalk_proto::message::MessageId;
use wetalk_proto::presence::Participant;

fn arb_nickname() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

proptest! {
    #[test]
    fn seal_then_open_round_trips(text in "\\PC{1,200}", key in "\\PC{1,40}") {
        let sealed = crypto::seal(&text, &key);
        prop_assert_eq!(crypto::open(&sealed, &key), text);
    }

    #[test]
    fn other_key_does_not_recover_text(
        text in "\\PC{1,100}",
        key in "[a-z]{1,20}",
        other in "[A-Z]{1,20}",
    ) {
        let sealed = crypto::seal(&text, &key);
        prop_assert_ne!(crypto::open(&sealed, &other), text);
    }

    #[test]
    fn repeated_delivery_is_accepted_once(raw in "[0-9a-f-]{1,36}", copies in 1usize..20) {
        let mut dedup = Deduplicator::with_capacity(10_000);
        let id = MessageId::from_raw(raw);
        let accepted = (0..copies).filter(|_| dedup.check_and_record(&id)).count();
        prop_assert_eq!(accepted, 1);
        prop_assert!(dedup.seen(&id));
    }

    #[test]
    fn join_join_leave_converges(b_position in 0usize..3) {
        // A's join precedes A's leave; B's join lands anywhere.
        let mut ops = vec![("join", "A"), ("leave", "A")];
        ops.insert(b_position, ("join", "B"));

        let mut registry = PresenceRegistry::new();
        for (op, nickname) in ops {
            match op {
                "join" => registry.apply_join(nickname, ""),
                _ => {
                    registry.apply_leave(nickname);
                }
            }
        }
        prop_assert_eq!(registry.snapshot(), vec![Participant::new("B", "")]);
    }

    #[test]
    fn snapshot_overrides_prior_state(
        before in prop::collection::btree_set(arb_nickname(), 0..8),
        after in prop::collection::btree_set(arb_nickname(), 0..8),
    ) {
        let mut registry = PresenceRegistry::new();
        for nickname in &before {
            registry.apply_join(nickname, "old.png");
        }
        let snapshot: Vec<Participant> =
            after.iter().map(|n| Participant::new(n.as_str(), "new.png")).collect();
        registry.apply_snapshot(&snapshot);

        let names: BTreeSet<String> =
            registry.snapshot().into_iter().map(|p| p.nickname).collect();
        prop_assert_eq!(names, after);
        prop_assert_eq!(registry.len(), snapshot.len());
    }
}
