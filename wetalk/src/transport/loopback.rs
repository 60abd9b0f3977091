//! Loopback transport for testing.
//!
//! [`LoopbackBroker`] is an in-process stand-in for a pub/sub broker. Each
//! client obtained through [`LoopbackBroker::connect`] is a
//! [`LoopbackTransport`]. Like an MQTT broker, a publish is delivered to
//! every subscriber of the topic, the publisher included.
//!
//! The broker can also misbehave on purpose: redeliver every payload several
//! times ([`set_redelivery`](LoopbackBroker::set_redelivery)) and drop or
//! restore a client's connection to exercise reconnect handling.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Transport, TransportEvent, TransportType};

/// One publish observed by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    /// Name of the publishing client.
    pub from: String,
    /// Topic published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct ClientSlot {
    name: String,
    tx: mpsc::UnboundedSender<TransportEvent>,
    subscriptions: HashSet<String>,
    online: bool,
}

#[derive(Debug)]
struct BrokerState {
    clients: HashMap<u64, ClientSlot>,
    next_id: u64,
    /// Copies delivered per publish, at least one.
    redelivery: usize,
    log: Vec<PublishRecord>,
}

impl BrokerState {
    fn slot_named(&mut self, name: &str) -> Option<&mut ClientSlot> {
        self.clients.values_mut().find(|slot| slot.name == name)
    }
}

/// In-process publish/subscribe broker shared by loopback clients.
#[derive(Debug, Clone)]
pub struct LoopbackBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBroker {
    /// Creates an empty broker that delivers each publish once.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                clients: HashMap::new(),
                next_id: 0,
                redelivery: 1,
                log: Vec::new(),
            })),
        }
    }

    /// Delivers every subsequent publish `copies` times to each subscriber.
    pub fn set_redelivery(&self, copies: usize) {
        self.state.lock().redelivery = copies.max(1);
    }

    /// Connects a new client named `name`.
    ///
    /// The client's first event is [`TransportEvent::Connected`].
    #[must_use]
    pub fn connect(&self, name: &str) -> LoopbackTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected);

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.clients.insert(
            id,
            ClientSlot {
                name: name.to_string(),
                tx,
                subscriptions: HashSet::new(),
                online: true,
            },
        );
        drop(state);

        LoopbackTransport {
            id,
            name: name.to_string(),
            state: Arc::clone(&self.state),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Severs `name`'s connection. Its subscriptions are dropped and it
    /// receives [`TransportEvent::Disconnected`].
    pub fn drop_connection(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slot_named(name) {
            slot.online = false;
            slot.subscriptions.clear();
            let _ = slot.tx.send(TransportEvent::Disconnected);
        }
    }

    /// Reports a failed reconnect attempt to `name`.
    pub fn fail_attempt(&self, name: &str, reason: &str) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slot_named(name) {
            let _ = slot.tx.send(TransportEvent::Error(reason.to_string()));
            let _ = slot.tx.send(TransportEvent::Disconnected);
        }
    }

    /// Brings `name` back online; it receives [`TransportEvent::Connected`].
    pub fn restore_connection(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slot_named(name) {
            slot.online = true;
            let _ = slot.tx.send(TransportEvent::Connected);
        }
    }

    /// Delivers a raw payload to every subscriber of `topic`, as if an
    /// unknown client had published it.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let state = self.state.lock();
        deliver(&state, topic, payload);
    }

    /// Every publish seen so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishRecord> {
        self.state.lock().log.clone()
    }

    /// Publishes made by `name` so far, in order.
    #[must_use]
    pub fn published_by(&self, name: &str) -> Vec<PublishRecord> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|record| record.from == name)
            .cloned()
            .collect()
    }
}

fn deliver(state: &BrokerState, topic: &str, payload: &[u8]) {
    for slot in state.clients.values() {
        if !slot.online || !slot.subscriptions.contains(topic) {
            continue;
        }
        for _ in 0..state.redelivery {
            let _ = slot.tx.send(TransportEvent::MessageReceived {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        }
    }
}

/// A client of a [`LoopbackBroker`].
pub struct LoopbackTransport {
    id: u64,
    name: String,
    state: Arc<Mutex<BrokerState>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl Transport for LoopbackTransport {
    fn subscribe(&self, topic: &str) {
        let mut state = self.state.lock();
        match state.clients.get_mut(&self.id) {
            Some(slot) if slot.online => {
                slot.subscriptions.insert(topic.to_string());
            }
            _ => tracing::warn!(client = %self.name, topic, "subscribe while offline ignored"),
        }
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) {
        let mut state = self.state.lock();
        let online = state.clients.get(&self.id).is_some_and(|slot| slot.online);
        if !online {
            tracing::warn!(client = %self.name, topic, "publish while offline dropped");
            return;
        }
        deliver(&state, topic, &payload);
        state.log.push(PublishRecord {
            from: self.name.clone(),
            topic: topic.to_string(),
            payload,
        });
    }

    fn close(&self) {
        // Dropping the slot drops the sender, so `next_event` drains and
        // then yields `None`.
        self.state.lock().clients.remove(&self.id);
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    fn is_connected(&self) -> bool {
        self.state
            .lock()
            .clients
            .get(&self.id)
            .is_some_and(|slot| slot.online)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Loopback
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.state.lock().clients.remove(&self.id);
    }
}
