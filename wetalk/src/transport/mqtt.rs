//! MQTT transport for `WeTalk`.
//!
//! Implements the [`Transport`] trait on top of a `rumqttc` client. A
//! background task polls the MQTT event loop, turns broker packets into
//! [`TransportEvent`]s and keeps reconnecting at a fixed interval until the
//! transport is closed.
//!
//! The room key doubles as the MQTT username. The session layer seals
//! message bodies before they reach this layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::{Mutex, mpsc};

use wetalk_proto::message::Timestamp;
use wetalk_proto::room::RoomIdentity;

use super::{Transport, TransportError, TransportEvent, TransportType};

/// Capacity of the request queue between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    /// Broker host name.
    pub host: String,
    /// Broker TCP port.
    pub port: u16,
    /// Connect with TLS (webpki roots).
    pub tls: bool,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// Pause between reconnect attempts.
    pub reconnect_interval: Duration,
    /// Capacity of the event channel towards the session.
    pub event_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "broker.emqx.io".to_string(),
            port: 1883,
            tls: false,
            keep_alive: Duration::from_secs(30),
            reconnect_interval: Duration::from_millis(1000),
            event_capacity: 256,
        }
    }
}

/// MQTT broker client implementing the [`Transport`] trait.
///
/// Created via [`MqttTransport::connect`], which starts the background
/// event loop task. The connection is established asynchronously: the
/// first [`TransportEvent::Connected`] signals that it is up.
pub struct MqttTransport {
    client: AsyncClient,
    /// Channel fed by the background event loop task.
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    /// Whether the broker has acknowledged the current connection.
    connected: Arc<AtomicBool>,
    /// Set by [`Transport::close`] to stop reconnecting.
    closing: Arc<AtomicBool>,
    _poll_handle: tokio::task::JoinHandle<()>,
}

impl MqttTransport {
    /// Starts connecting to the broker for `room` as `nickname`.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidAddress`] for an empty host or a
    /// zero port.
    pub fn connect(
        settings: &MqttSettings,
        room: &RoomIdentity,
        nickname: &str,
    ) -> Result<Self, TransportError> {
        if settings.host.trim().is_empty() || settings.port == 0 {
            return Err(TransportError::InvalidAddress(format!(
                "{}:{}",
                settings.host, settings.port
            )));
        }

        let client_id = client_id_for(nickname, Timestamp::now());
        let mut options = MqttOptions::new(client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);
        options.set_credentials(room.key(), "");
        if settings.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(settings.event_capacity.max(1));
        let connected = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            tls = settings.tls,
            client_id = %client_id,
            "connecting to MQTT broker"
        );

        let poll_handle = tokio::spawn(poll_loop(
            eventloop,
            tx,
            Arc::clone(&connected),
            Arc::clone(&closing),
            settings.reconnect_interval,
        ));

        Ok(Self {
            client,
            events: Mutex::new(rx),
            connected,
            closing,
            _poll_handle: poll_handle,
        })
    }
}

impl Transport for MqttTransport {
    fn subscribe(&self, topic: &str) {
        if let Err(e) = self.client.try_subscribe(topic, QoS::AtLeastOnce) {
            tracing::warn!(topic, err = %e, "MQTT subscribe request failed");
        }
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) {
        if let Err(e) = self
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
        {
            tracing::warn!(topic, err = %e, "MQTT publish request failed");
        }
    }

    fn close(&self) {
        self.closing.store(true, Ordering::Relaxed);
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(err = %e, "MQTT disconnect request failed");
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let mut rx = self.events.lock().await;
        rx.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Mqtt
    }
}

/// Background task that drives the MQTT event loop.
///
/// `rumqttc` reconnects on the next `poll` after an error, so each failure
/// is reported and followed by a pause of `retry` before polling again.
/// Exits once the transport is closed or the session side is dropped.
async fn poll_loop(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    retry: Duration,
) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected.store(true, Ordering::Relaxed);
                    tracing::info!("MQTT broker connection established");
                    Some(TransportEvent::Connected)
                } else {
                    tracing::warn!(code = ?ack.code, "MQTT broker refused connection");
                    Some(TransportEvent::Error(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => Some(TransportEvent::MessageReceived {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                tracing::debug!(pkid = ack.pkid, "MQTT subscription acknowledged");
                None
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::Relaxed);
                tracing::info!("MQTT disconnect sent, stopping event loop");
                break;
            }
            Ok(_) => None,
            Err(e) => {
                if closing.load(Ordering::Relaxed) {
                    break;
                }
                tracing::warn!(err = %e, "MQTT connection error");
                let was_connected = connected.swap(false, Ordering::Relaxed);
                if was_connected && tx.send(TransportEvent::Disconnected).await.is_err() {
                    break;
                }
                if tx.send(TransportEvent::Error(e.to_string())).await.is_err() {
                    break;
                }
                tokio::time::sleep(retry).await;
                None
            }
        };

        if let Some(event) = event
            && tx.send(event).await.is_err()
        {
            // Session dropped; nothing left to report to.
            break;
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("MQTT event loop task exiting");
}

/// Builds the MQTT client id `client_<nickname>_<millis>`.
fn client_id_for(nickname: &str, now: Timestamp) -> String {
    format!("client_{nickname}_{}", now.as_millis())
}
