//! Integration tests for typing indicators driven by the session task.
//!
//! Verifies:
//! 1. A burst of input produces one `typing{true}` and, after the idle
//!    window, one `typing{false}`.
//! 2. Peers render the typing summary and clear it again.
//! 3. A peer that leaves mid-typing is dropped from the summary.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::doc_markdown)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use wetalk::chat::{JoinRequest, Notice, Session, SessionConfig, SessionEvent};
use wetalk::net::{self, SessionCommand};
use wetalk::transport::loopback::{LoopbackBroker, LoopbackTransport};
use wetalk_proto::codec;
use wetalk_proto::envelope::Envelope;

const DEBOUNCE: Duration = Duration::from_millis(150);

struct RunningPeer {
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::Receiver<SessionEvent>,
    task: JoinHandle<Session<LoopbackTransport>>,
}

async fn start(broker: &LoopbackBroker, nickname: &str) -> RunningPeer {
    start_with(broker, nickname, DEBOUNCE).await
}

async fn start_with(broker: &LoopbackBroker, nickname: &str, debounce: Duration) -> RunningPeer {
    let config = SessionConfig {
        typing_debounce: debounce,
        ..SessionConfig::default()
    };
    let request = JoinRequest::new(nickname, "avatar.png", "r1").unwrap();
    let (session, mut events) = Session::new(Arc::new(broker.connect(nickname)), request, &config);
    let (commands, task) = net::spawn_session(session, net::DEFAULT_COMMAND_CAPACITY);

    // Wait until the session is subscribed.
    loop {
        let event = next_event(&mut events).await;
        if event == SessionEvent::SystemNotice(Notice::Connected) {
            break;
        }
    }
    RunningPeer {
        commands,
        events,
        task,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session event channel closed")
}

async fn next_typing(rx: &mut mpsc::Receiver<SessionEvent>) -> String {
    loop {
        if let SessionEvent::TypingChanged(summary) = next_event(rx).await {
            return summary;
        }
    }
}

fn typing_published_by(broker: &LoopbackBroker, name: &str) -> Vec<bool> {
    broker
        .published_by(name)
        .iter()
        .filter_map(|r| match codec::decode(&r.payload).unwrap() {
            Envelope::Typing(t) => Some(t.is_typing),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn input_burst_broadcasts_start_and_stop_once() {
    let broker = LoopbackBroker::new();
    let alice = start(&broker, "alice").await;
    let mut bob = start(&broker, "bob").await;

    for _ in 0..10 {
        alice.commands.send(SessionCommand::Input).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(next_typing(&mut bob.events).await, "alice is typing...");
    assert_eq!(next_typing(&mut bob.events).await, "");
    assert_eq!(typing_published_by(&broker, "alice"), [true, false]);

    alice.commands.send(SessionCommand::Leave).await.unwrap();
    bob.commands.send(SessionCommand::Leave).await.unwrap();
    alice.task.await.unwrap();
    bob.task.await.unwrap();
}

#[tokio::test]
async fn separate_bursts_broadcast_separately() {
    let broker = LoopbackBroker::new();
    let alice = start(&broker, "alice").await;

    alice.commands.send(SessionCommand::Input).await.unwrap();
    tokio::time::sleep(DEBOUNCE * 3).await;
    alice.commands.send(SessionCommand::Input).await.unwrap();
    tokio::time::sleep(DEBOUNCE * 3).await;

    assert_eq!(
        typing_published_by(&broker, "alice"),
        [true, false, true, false]
    );
    alice.commands.send(SessionCommand::Leave).await.unwrap();
    alice.task.await.unwrap();
}

#[tokio::test]
async fn leaving_typist_is_cleared() {
    let broker = LoopbackBroker::new();
    // Long enough that the typing stop never fires during the test.
    let carol = start_with(&broker, "carol", Duration::from_secs(30)).await;
    let mut bob = start(&broker, "bob").await;

    // Carol answers bob's join with a userlist that names her.
    loop {
        if let SessionEvent::PresenceChanged(list) = next_event(&mut bob.events).await
            && list.iter().any(|p| p.nickname == "carol")
        {
            break;
        }
    }

    carol.commands.send(SessionCommand::Input).await.unwrap();
    assert_eq!(next_typing(&mut bob.events).await, "carol is typing...");

    carol.commands.send(SessionCommand::Leave).await.unwrap();
    carol.task.await.unwrap();
    assert_eq!(next_typing(&mut bob.events).await, "");

    bob.commands.send(SessionCommand::Leave).await.unwrap();
    let bob_session = bob.task.await.unwrap();
    assert!(bob_session.typing_peers().is_empty());
}
