//! Integration tests for the session protocol over the loopback broker.
//!
//! Verifies:
//! 1. Text and image messages flow between two peers.
//! 2. At-least-once redelivery surfaces every message exactly once.
//! 3. Self-echoes are never surfaced twice.
//! 4. Presence converges across join and leave.
//! 5. Malformed and foreign-key payloads degrade without breaking the session.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::doc_markdown)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use wetalk::chat::{
    Direction, JoinRequest, Notice, Session, SessionConfig, SessionEvent, SessionState,
};
use wetalk::crypto;
use wetalk::transport::Transport;
use wetalk::transport::loopback::{LoopbackBroker, LoopbackTransport};
use wetalk_proto::codec;
use wetalk_proto::envelope::{Envelope, JoinNotice, LeaveNotice, TextMessage, UserList};
use wetalk_proto::message::{MessageId, Timestamp};
use wetalk_proto::presence::Participant;

const ROOM: &str = "r1";
const TOPIC: &str = "/chat/r1";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Peer {
    session: Session<LoopbackTransport>,
    events: mpsc::Receiver<SessionEvent>,
}

impl Peer {
    fn join(broker: &LoopbackBroker, nickname: &str) -> Self {
        let request = JoinRequest::new(nickname, &format!("{nickname}.png"), ROOM).unwrap();
        let (session, events) = Session::new(
            Arc::new(broker.connect(nickname)),
            request,
            &SessionConfig::default(),
        );
        Self { session, events }
    }

    /// Feeds every queued transport event into the session.
    async fn pump(&mut self) {
        let transport = self.session.transport();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(20), transport.next_event()).await
        {
            self.session.handle_transport_event(event);
        }
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn nicknames(&self) -> Vec<String> {
        self.session
            .participants()
            .into_iter()
            .map(|p| p.nickname)
            .collect()
    }
}

fn texts(events: &[SessionEvent]) -> Vec<(String, String, Direction)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::MessageReceived {
                nickname,
                text,
                direction,
                ..
            } => Some((nickname.clone(), text.clone(), *direction)),
            _ => None,
        })
        .collect()
}

/// Alice and Bob joined and converged.
async fn connected_pair(broker: &LoopbackBroker) -> (Peer, Peer) {
    let mut alice = Peer::join(broker, "alice");
    alice.pump().await;
    let mut bob = Peer::join(broker, "bob");
    bob.pump().await;
    alice.pump().await;
    bob.pump().await;
    alice.drain();
    bob.drain();
    (alice, bob)
}

fn inject(broker: &LoopbackBroker, envelope: &Envelope) {
    broker.inject(TOPIC, &codec::encode(envelope).unwrap());
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_message_reaches_peer_once() {
    let broker = LoopbackBroker::new();
    let (mut alice, mut bob) = connected_pair(&broker).await;

    let id = bob.session.send_text("hi").unwrap();
    alice.pump().await;
    bob.pump().await;

    assert_eq!(
        texts(&alice.drain()),
        vec![("bob".to_string(), "hi".to_string(), Direction::Received)]
    );
    assert!(alice.session.has_seen(&id));
    // Bob saw his own message once, at send time.
    assert_eq!(
        texts(&bob.drain()),
        vec![("bob".to_string(), "hi".to_string(), Direction::Sent)]
    );
}

#[tokio::test]
async fn concrete_scenario_with_known_id() {
    let broker = LoopbackBroker::new();
    let (mut alice, _bob) = connected_pair(&broker).await;
    let t1 = MessageId::from_raw("t1");
    assert!(!alice.session.has_seen(&t1));

    inject(
        &broker,
        &Envelope::Message(TextMessage {
            id: Some(t1.clone()),
            nickname: "bob".into(),
            avatar: Some("bob.png".into()),
            content: crypto::seal("hi", ROOM),
            timestamp: Timestamp::now(),
        }),
    );
    alice.pump().await;

    assert_eq!(
        texts(&alice.drain()),
        vec![("bob".to_string(), "hi".to_string(), Direction::Received)]
    );
    assert!(alice.session.has_seen(&t1));

    // Alice's own ids are fresh, never "t1".
    let own = alice.session.send_text("hello").unwrap();
    assert_ne!(own, t1);
}

#[tokio::test]
async fn redelivered_messages_surface_once() {
    let broker = LoopbackBroker::new();
    let (mut alice, mut bob) = connected_pair(&broker).await;
    broker.set_redelivery(4);

    bob.session.send_text("one").unwrap();
    bob.session.send_image("https://img.example/cat.png").unwrap();
    alice.pump().await;

    let events = alice.drain();
    assert_eq!(texts(&events).len(), 1);
    let images: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::ImageReceived { .. }))
        .collect();
    assert_eq!(images.len(), 1);

    // Bob's own echoes are dropped as well.
    bob.pump().await;
    let bob_events = bob.drain();
    assert_eq!(texts(&bob_events).len(), 1);
}

#[tokio::test]
async fn images_travel_unsealed() {
    let broker = LoopbackBroker::new();
    let (mut alice, mut bob) = connected_pair(&broker).await;

    bob.session.send_image("https://img.example/cat.png").unwrap();
    let last = broker.published_by("bob").pop().unwrap();
    let Envelope::Image(img) = codec::decode(&last.payload).unwrap() else {
        panic!("expected an image envelope");
    };
    assert_eq!(img.url, "https://img.example/cat.png");

    alice.pump().await;
    let events = alice.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ImageReceived { nickname, url, avatar, direction: Direction::Received, .. }
            if nickname == "bob" && url == "https://img.example/cat.png" && avatar == "bob.png"
    )));
}

#[tokio::test]
async fn message_sealed_under_another_key_shows_raw_content() {
    let broker = LoopbackBroker::new();
    let (mut alice, _bob) = connected_pair(&broker).await;
    let foreign = crypto::seal("secret", "other-room");

    inject(
        &broker,
        &Envelope::Message(TextMessage {
            id: Some(MessageId::new()),
            nickname: "mallory".into(),
            avatar: None,
            content: foreign.clone(),
            timestamp: Timestamp::now(),
        }),
    );
    alice.pump().await;

    let received = texts(&alice.drain());
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].1, foreign);
    assert_ne!(received[0].1, "secret");
}

#[tokio::test]
async fn malformed_envelope_does_not_stop_processing() {
    let broker = LoopbackBroker::new();
    let (mut alice, _bob) = connected_pair(&broker).await;

    broker.inject(TOPIC, b"\xff\xfe not json");
    broker.inject(TOPIC, br#"{"kind":"shout","nickname":"x"}"#);
    inject(
        &broker,
        &Envelope::Message(TextMessage {
            id: Some(MessageId::new()),
            nickname: "bob".into(),
            avatar: None,
            content: crypto::seal("still here", ROOM),
            timestamp: Timestamp::now(),
        }),
    );
    alice.pump().await;

    let received = texts(&alice.drain());
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].1, "still here");
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn peers_see_each_other_after_joining() {
    let broker = LoopbackBroker::new();
    let (alice, bob) = connected_pair(&broker).await;
    assert_eq!(alice.nicknames(), ["alice", "bob"]);
    assert_eq!(bob.nicknames(), ["alice", "bob"]);
    assert_eq!(
        alice.session.participants(),
        vec![
            Participant::new("alice", "alice.png"),
            Participant::new("bob", "bob.png"),
        ]
    );
}

#[tokio::test]
async fn join_is_announced_as_notice() {
    let broker = LoopbackBroker::new();
    let mut alice = Peer::join(&broker, "alice");
    alice.pump().await;
    alice.drain();

    let mut bob = Peer::join(&broker, "bob");
    bob.pump().await;
    alice.pump().await;

    assert!(alice
        .drain()
        .contains(&SessionEvent::SystemNotice(Notice::PeerJoined("bob".into()))));
}

#[tokio::test]
async fn leaving_peer_is_removed_everywhere() {
    let broker = LoopbackBroker::new();
    let (mut alice, mut bob) = connected_pair(&broker).await;

    bob.session.leave();
    assert_eq!(bob.session.state(), SessionState::Disconnected);
    assert!(bob.session.participants().is_empty());

    alice.pump().await;
    assert_eq!(alice.nicknames(), ["alice"]);
    assert!(alice
        .drain()
        .contains(&SessionEvent::SystemNotice(Notice::PeerLeft("bob".into()))));
}

#[tokio::test]
async fn injected_join_join_leave_converges() {
    let broker = LoopbackBroker::new();
    let mut alice = Peer::join(&broker, "alice");
    alice.pump().await;

    for nickname in ["a", "b"] {
        inject(
            &broker,
            &Envelope::Join(JoinNotice {
                nickname: nickname.into(),
                avatar: None,
                timestamp: Timestamp::now(),
            }),
        );
    }
    inject(
        &broker,
        &Envelope::Leave(LeaveNotice {
            nickname: "a".into(),
            timestamp: Timestamp::now(),
        }),
    );
    alice.pump().await;

    assert_eq!(alice.nicknames(), ["alice", "b"]);
}

#[tokio::test]
async fn userlist_replaces_the_whole_registry() {
    let broker = LoopbackBroker::new();
    let (mut alice, _bob) = connected_pair(&broker).await;

    inject(
        &broker,
        &Envelope::UserList(UserList {
            nickname: None,
            users: vec![Participant::new("x", "")],
            timestamp: Timestamp::default(),
        }),
    );
    alice.pump().await;

    // Empty avatars fall back to the local one.
    assert_eq!(
        alice.session.participants(),
        vec![Participant::new("x", "alice.png")]
    );
    assert!(alice
        .drain()
        .iter()
        .any(|e| matches!(e, SessionEvent::PresenceChanged(list) if list.len() == 1)));
}

#[tokio::test]
async fn closed_transport_stops_events() {
    let broker = LoopbackBroker::new();
    let (mut alice, _bob) = connected_pair(&broker).await;
    let transport = alice.session.transport();
    alice.session.leave();

    // Only the echo of the leave announcement is still queued.
    let mut remaining = 0;
    while tokio::time::timeout(Duration::from_secs(1), transport.next_event())
        .await
        .expect("event stream did not end")
        .is_some()
    {
        remaining += 1;
    }
    assert_eq!(remaining, 1);
    assert!(!transport.is_connected());
    assert_eq!(
        alice.drain(),
        vec![SessionEvent::SystemNotice(Notice::Left)]
    );
}
