//! Property-based codec tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `Envelope` survives encode -> decode.
//! 2. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 3. Arbitrary JSON objects with an unknown `kind` are rejected.

use proptest::prelude::*;
use wetalk_proto::codec;
use wetalk_proto::envelope::*;
use wetalk_proto::message::{MessageId, Timestamp};
use wetalk_proto::presence::Participant;

fn arb_nickname() -> impl Strategy<Value = String> {
    "[^\x00]{1,32}"
}

fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

fn arb_id() -> impl Strategy<Value = Option<MessageId>> {
    prop::option::of("[a-zA-Z0-9_-]{1,40}".prop_map(MessageId::from_raw))
}

fn arb_participant() -> impl Strategy<Value = Participant> {
    (arb_nickname(), ".{0,64}").prop_map(|(n, a)| Participant::new(n, a))
}

fn arb_envelope() -> impl Strategy<Value = Envelope> {
    prop_oneof![
        (arb_id(), arb_nickname(), prop::option::of(".{0,32}"), ".{0,256}", arb_timestamp())
            .prop_map(|(id, nickname, avatar, content, timestamp)| {
                Envelope::Message(TextMessage {
                    id,
                    nickname,
                    avatar,
                    content,
                    timestamp,
                })
            }),
        (arb_id(), arb_nickname(), ".{0,256}", arb_timestamp()).prop_map(
            |(id, nickname, url, timestamp)| {
                Envelope::Image(ImageMessage {
                    id,
                    nickname,
                    avatar: None,
                    url,
                    timestamp,
                })
            }
        ),
        (arb_nickname(), prop::option::of(".{0,32}"), arb_timestamp()).prop_map(
            |(nickname, avatar, timestamp)| Envelope::Join(JoinNotice {
                nickname,
                avatar,
                timestamp,
            })
        ),
        (arb_nickname(), arb_timestamp())
            .prop_map(|(nickname, timestamp)| Envelope::Leave(LeaveNotice { nickname, timestamp })),
        (arb_nickname(), any::<bool>(), arb_timestamp()).prop_map(
            |(nickname, is_typing, timestamp)| Envelope::Typing(TypingNotice {
                nickname,
                is_typing,
                timestamp,
            })
        ),
        (
            prop::option::of(arb_nickname()),
            prop::collection::vec(arb_participant(), 0..8),
            arb_timestamp()
        )
            .prop_map(|(nickname, users, timestamp)| Envelope::UserList(UserList {
                nickname,
                users,
                timestamp,
            })),
    ]
}

proptest! {
    #[test]
    fn envelope_round_trips(envelope in arb_envelope()) {
        let bytes = codec::encode(&envelope).unwrap();
        let decoded = codec::decode(&bytes).unwrap();
        prop_assert_eq!(envelope, decoded);
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode(&bytes);
    }

    #[test]
    fn unknown_kinds_are_rejected(kind in "[a-z]{1,12}", nickname in arb_nickname()) {
        prop_assume!(!["message", "image", "join", "leave", "typing", "userlist"].contains(&kind.as_str()));
        let raw = serde_json::json!({ "kind": kind, "nickname": nickname, "timestamp": 1 });
        let bytes = serde_json::to_vec(&raw).unwrap();
        prop_assert!(codec::decode(&bytes).is_err());
    }
}
