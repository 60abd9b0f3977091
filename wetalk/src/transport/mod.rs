//! Transport layer abstraction for `WeTalk`.
//!
//! Defines the [`Transport`] trait over a topic-based publish/subscribe
//! broker. Concrete implementations:
//! - [`mqtt::MqttTransport`]: MQTT 3.1.1 broker client with automatic reconnect
//! - [`loopback::LoopbackTransport`]: in-process broker for testing

pub mod loopback;
pub mod mqtt;

use std::fmt;

/// Lifecycle and delivery events reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection (first connect or reconnect).
    ///
    /// Subscriptions do not survive a reconnect; subscribe again.
    Connected,
    /// A payload was delivered on a subscribed topic.
    MessageReceived {
        /// Topic the payload was published on.
        topic: String,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
    /// The connection was lost. The transport keeps retrying on its own.
    Disconnected,
    /// A connect, publish or subscribe failure. Never fatal.
    Error(String),
}

/// Describes which kind of transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// MQTT broker connection.
    Mqtt,
    /// In-process loopback for testing.
    Loopback,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mqtt => write!(f, "MQTT"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur while setting up a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The broker address is unusable.
    #[error("invalid broker address: {0}")]
    InvalidAddress(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Publish/subscribe transport.
///
/// `subscribe`, `publish` and `close` are fire-and-forget: failures are
/// logged by the implementation and, where the broker reports them,
/// surfaced as [`TransportEvent::Error`]. The caller never receives a
/// delivery confirmation. Delivery is at least once, so payloads may be
/// duplicated and must be deduplicated above this layer.
///
/// # Invariant
///
/// Only the session controller calls `subscribe` and `publish`; the
/// transport carries payloads opaquely.
pub trait Transport: Send + Sync {
    /// Subscribes to `topic` with at-least-once delivery.
    fn subscribe(&self, topic: &str);

    /// Publishes `payload` on `topic` with at-least-once delivery.
    fn publish(&self, topic: &str, payload: Vec<u8>);

    /// Closes the connection and stops reconnecting.
    fn close(&self);

    /// Waits for the next transport event.
    ///
    /// Returns `None` once the transport has shut down for good.
    fn next_event(&self) -> impl std::future::Future<Output = Option<TransportEvent>> + Send;

    /// Whether the broker connection is currently up.
    fn is_connected(&self) -> bool;

    /// Return the type of this transport.
    fn transport_type(&self) -> TransportType;
}
