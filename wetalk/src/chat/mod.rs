//! Session layer for `WeTalk`.
//!
//! Contains the [`Session`] which turns a bare publish/subscribe topic into a
//! multi-party chat room: it owns the connection lifecycle, dispatches
//! inbound envelopes to the [`Deduplicator`], [`PresenceRegistry`] and
//! [`TypingCoordinator`], and turns local intents into sealed, stamped
//! envelopes published through the [`Transport`].
//!
//! All session state is mutated from a single task (see [`crate::net`]), so
//! nothing here takes a lock.

pub mod dedup;
pub mod presence;
pub mod typing;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use wetalk_proto::codec::{self, CodecError};
use wetalk_proto::envelope::{
    Envelope, ImageMessage, JoinNotice, LeaveNotice, TextMessage, TypingNotice, UserList,
};
use wetalk_proto::message::{MessageId, Timestamp};
use wetalk_proto::presence::Participant;
use wetalk_proto::room::{RoomError, RoomIdentity};

use crate::crypto;
use crate::transport::{Transport, TransportEvent};

use dedup::Deduplicator;
use presence::PresenceRegistry;
use typing::TypingCoordinator;

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The nickname is blank.
    #[error("nickname must not be empty")]
    EmptyNickname,

    /// The room key is unusable.
    #[error("invalid room: {0}")]
    Room(#[from] RoomError),

    /// Text or image reference is blank.
    #[error("message must not be empty")]
    EmptyMessage,

    /// The session is not connected to the broker.
    #[error("not connected")]
    NotConnected,

    /// Encoding an outbound envelope failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle window before `typing{false}` is sent.
    pub typing_debounce: Duration,
    /// Message ids remembered for deduplication. Zero means unbounded.
    pub max_tracked_ids: usize,
    /// Capacity of the [`SessionEvent`] channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_debounce: typing::DEFAULT_DEBOUNCE,
            max_tracked_ids: 10_000,
            event_buffer: 256,
        }
    }
}

/// Validated join intent: who joins which room.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    /// Local participant.
    pub local: Participant,
    /// Room to join.
    pub room: RoomIdentity,
}

impl JoinRequest {
    /// Validates a join intent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyNickname`] for a blank nickname and
    /// [`SessionError::Room`] for a blank room key.
    pub fn new(nickname: &str, avatar: &str, room_key: &str) -> Result<Self, SessionError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(SessionError::EmptyNickname);
        }
        let room = RoomIdentity::new(room_key)?;
        Ok(Self {
            local: Participant::new(nickname, avatar),
            room,
        })
    }
}

/// Connection lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected. Terminal once the session has left.
    Disconnected,
    /// Waiting for the first broker connection.
    Connecting,
    /// Subscribed and announced.
    Connected,
    /// Connection lost; the transport is retrying.
    Reconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Whether a message was sent locally or received from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Published by this session.
    Sent,
    /// Received from a peer.
    Received,
}

/// System notices surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The broker connection is up and the room was announced.
    Connected,
    /// The broker connection was lost.
    Reconnecting,
    /// The transport reported a failure.
    TransportError(String),
    /// A peer joined.
    PeerJoined(String),
    /// A peer left.
    PeerLeft(String),
    /// A local command could not be carried out.
    CommandFailed(String),
    /// The local user left the room.
    Left,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected to WeTalk"),
            Self::Reconnecting => write!(f, "Connection lost, reconnecting..."),
            Self::TransportError(reason) => {
                write!(f, "Connection failed ({reason}), check the network or room key")
            }
            Self::PeerJoined(nickname) => write!(f, "{nickname} joined WeTalk"),
            Self::PeerLeft(nickname) => write!(f, "{nickname} left WeTalk"),
            Self::CommandFailed(reason) => write!(f, "Command failed: {reason}"),
            Self::Left => write!(f, "You left the room"),
        }
    }
}

/// Events emitted by the [`Session`] for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A system notice.
    SystemNotice(Notice),
    /// A text message to display.
    MessageReceived {
        /// Sender nickname.
        nickname: String,
        /// Sender avatar (falls back to the local avatar).
        avatar: String,
        /// Decrypted text.
        text: String,
        /// Sent or received.
        direction: Direction,
        /// Sender-local timestamp.
        timestamp: Timestamp,
    },
    /// An image reference to display.
    ImageReceived {
        /// Sender nickname.
        nickname: String,
        /// Sender avatar (falls back to the local avatar).
        avatar: String,
        /// Image reference.
        url: String,
        /// Sent or received.
        direction: Direction,
        /// Sender-local timestamp.
        timestamp: Timestamp,
    },
    /// The presence registry changed.
    PresenceChanged(Vec<Participant>),
    /// The typing summary changed; empty when nobody is typing.
    TypingChanged(String),
}

/// One participant's chat session in one room.
///
/// Created in [`SessionState::Connecting`]; the transport's first
/// [`TransportEvent::Connected`] completes the join. After [`leave`](Self::leave)
/// the session is permanently [`SessionState::Disconnected`].
pub struct Session<T: Transport> {
    transport: Arc<T>,
    room: RoomIdentity,
    local: Participant,
    state: SessionState,
    /// Set once the local user left; the session never reconnects after that.
    left: bool,
    dedup: Deduplicator,
    presence: PresenceRegistry,
    typing: TypingCoordinator,
    /// A `typing{false}` came due while offline and goes out on reconnect.
    typing_stop_owed: bool,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl<T: Transport> Session<T> {
    /// Creates a session for a validated join request.
    ///
    /// Returns the session and the receiver for its [`SessionEvent`]s. The
    /// local participant is registered as present immediately.
    pub fn new(
        transport: Arc<T>,
        request: JoinRequest,
        config: &SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let JoinRequest { local, room } = request;
        let mut presence = PresenceRegistry::new();
        presence.apply_join(&local.nickname, &local.avatar);

        tracing::info!(
            nickname = %local.nickname,
            transport = %transport.transport_type(),
            "session created"
        );

        let session = Self {
            typing: TypingCoordinator::new(local.nickname.clone(), config.typing_debounce),
            dedup: Deduplicator::with_capacity(config.max_tracked_ids),
            transport,
            room,
            local,
            state: SessionState::Connecting,
            left: false,
            presence,
            typing_stop_owed: false,
            event_tx,
        };
        (session, event_rx)
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The local participant.
    #[must_use]
    pub const fn local(&self) -> &Participant {
        &self.local
    }

    /// The room this session belongs to.
    #[must_use]
    pub const fn room(&self) -> &RoomIdentity {
        &self.room
    }

    /// Shared handle to the transport, for awaiting its events.
    #[must_use]
    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    /// Current presence snapshot.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.presence.snapshot()
    }

    /// Whether message `id` was already processed.
    #[must_use]
    pub fn has_seen(&self, id: &MessageId) -> bool {
        self.dedup.seen(id)
    }

    /// Remote peers currently typing, in arrival order.
    #[must_use]
    pub fn typing_peers(&self) -> &[String] {
        self.typing.typing_peers()
    }

    /// When the pending `typing{false}` broadcast is due.
    #[must_use]
    pub const fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    /// Applies one transport event to the session state machine.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.left {
            return;
        }
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected => {
                if self.state == SessionState::Connected {
                    tracing::warn!("broker connection lost, waiting for reconnect");
                    self.state = SessionState::Reconnecting;
                    self.notify(Notice::Reconnecting);
                }
            }
            TransportEvent::Error(reason) => {
                tracing::warn!(error = %reason, state = %self.state, "transport error");
                self.notify(Notice::TransportError(reason));
            }
            TransportEvent::MessageReceived { topic, payload } => {
                self.on_payload(&topic, &payload);
            }
        }
    }

    fn on_connected(&mut self) {
        match self.state {
            SessionState::Connecting | SessionState::Reconnecting => {}
            SessionState::Connected | SessionState::Disconnected => {
                tracing::debug!(state = %self.state, "ignoring connected event");
                return;
            }
        }
        tracing::info!(topic = %self.room.topic(), "connected, announcing presence");
        self.transport.subscribe(self.room.topic());
        self.state = SessionState::Connected;
        if let Err(e) = self.announce_join() {
            tracing::warn!(error = %e, "join announcement failed");
        }
        self.notify(Notice::Connected);
        if let Err(e) = self.broadcast_presence() {
            tracing::warn!(error = %e, "presence broadcast failed");
        }
        if std::mem::take(&mut self.typing_stop_owed)
            && let Err(e) = self.set_typing(false)
        {
            tracing::warn!(error = %e, "owed typing stop not broadcast");
        }
    }

    fn on_payload(&mut self, topic: &str, payload: &[u8]) {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Reconnecting
        ) || topic != self.room.topic()
        {
            return;
        }
        let envelope = match codec::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, len = payload.len(), "dropping malformed envelope");
                return;
            }
        };
        tracing::trace!(kind = envelope.kind(), sender = ?envelope.sender(), "inbound envelope");
        self.dispatch(envelope);
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let is_self = envelope.sender() == Some(self.local.nickname.as_str());
        if !is_self && matches!(envelope, Envelope::Message(_) | Envelope::Image(_)) {
            // Messages and images without an id cannot be deduplicated.
            let Some(id) = envelope.id() else { return };
            if !self.dedup.check_and_record(id) {
                return;
            }
        }
        match envelope {
            Envelope::Message(msg) if !is_self => {
                let text = crypto::open(&msg.content, self.room.key());
                let avatar = self.avatar_or_own(msg.avatar);
                self.emit(SessionEvent::MessageReceived {
                    nickname: msg.nickname,
                    avatar,
                    text,
                    direction: Direction::Received,
                    timestamp: msg.timestamp,
                });
            }
            Envelope::Image(img) if !is_self => {
                let avatar = self.avatar_or_own(img.avatar);
                self.emit(SessionEvent::ImageReceived {
                    nickname: img.nickname,
                    avatar,
                    url: img.url,
                    direction: Direction::Received,
                    timestamp: img.timestamp,
                });
            }
            Envelope::Join(join) if !is_self => {
                let avatar = self.avatar_or_own(join.avatar);
                self.presence.apply_join(&join.nickname, &avatar);
                self.emit_presence();
                self.notify(Notice::PeerJoined(join.nickname));
                self.publish_or_log(&self.userlist());
            }
            Envelope::Leave(leave) if !is_self => {
                if !self.presence.apply_leave(&leave.nickname) {
                    return;
                }
                if self.typing.remove_remote(&leave.nickname) {
                    self.emit(SessionEvent::TypingChanged(self.typing.describe()));
                }
                self.emit_presence();
                self.notify(Notice::PeerLeft(leave.nickname));
                self.publish_or_log(&self.userlist());
            }
            Envelope::Typing(notice) if !is_self => {
                if self.typing.on_remote_typing(&notice.nickname, notice.is_typing) {
                    self.emit(SessionEvent::TypingChanged(self.typing.describe()));
                }
            }
            Envelope::UserList(list) => {
                let users: Vec<Participant> = list
                    .users
                    .into_iter()
                    .map(|p| {
                        let avatar = self.avatar_or_own(Some(p.avatar).filter(|a| !a.is_empty()));
                        Participant::new(p.nickname, avatar)
                    })
                    .collect();
                self.presence.apply_snapshot(&users);
                self.emit_presence();
            }
            // Own echo of a message, image, join, leave or typing envelope.
            Envelope::Message(_)
            | Envelope::Image(_)
            | Envelope::Join(_)
            | Envelope::Leave(_)
            | Envelope::Typing(_) => {}
        }
    }

    // -----------------------------------------------------------------------
    // Outbound intents
    // -----------------------------------------------------------------------

    /// Seals and publishes a text message, then surfaces it locally.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyMessage`] for blank text and
    /// [`SessionError::NotConnected`] unless connected.
    pub fn send_text(&mut self, text: &str) -> Result<MessageId, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.ensure_connected()?;

        let id = MessageId::new();
        let timestamp = Timestamp::now();
        let envelope = Envelope::Message(TextMessage {
            id: Some(id.clone()),
            nickname: self.local.nickname.clone(),
            avatar: Some(self.local.avatar.clone()),
            content: crypto::seal(text, self.room.key()),
            timestamp,
        });
        self.dedup.record(&id);
        self.publish(&envelope)?;
        self.emit(SessionEvent::MessageReceived {
            nickname: self.local.nickname.clone(),
            avatar: self.local.avatar.clone(),
            text: text.to_string(),
            direction: Direction::Sent,
            timestamp,
        });
        tracing::debug!(message_id = %id, "text message published");
        Ok(id)
    }

    /// Publishes an image reference as-is, then surfaces it locally.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyMessage`] for a blank reference and
    /// [`SessionError::NotConnected`] unless connected.
    pub fn send_image(&mut self, url: &str) -> Result<MessageId, SessionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.ensure_connected()?;

        let id = MessageId::new();
        let timestamp = Timestamp::now();
        let envelope = Envelope::Image(ImageMessage {
            id: Some(id.clone()),
            nickname: self.local.nickname.clone(),
            avatar: Some(self.local.avatar.clone()),
            url: url.to_string(),
            timestamp,
        });
        self.dedup.record(&id);
        self.publish(&envelope)?;
        self.emit(SessionEvent::ImageReceived {
            nickname: self.local.nickname.clone(),
            avatar: self.local.avatar.clone(),
            url: url.to_string(),
            direction: Direction::Sent,
            timestamp,
        });
        tracing::debug!(message_id = %id, "image published");
        Ok(id)
    }

    /// Publishes a `join` envelope for the local participant.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless connected.
    pub fn announce_join(&self) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.publish(&Envelope::Join(JoinNotice {
            nickname: self.local.nickname.clone(),
            avatar: Some(self.local.avatar.clone()),
            timestamp: Timestamp::now(),
        }))
    }

    /// Publishes a `leave` envelope for the local participant.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless connected.
    pub fn announce_leave(&self) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.publish(&Envelope::Leave(LeaveNotice {
            nickname: self.local.nickname.clone(),
            timestamp: Timestamp::now(),
        }))
    }

    /// Publishes the full presence snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless connected.
    pub fn broadcast_presence(&self) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.publish(&self.userlist())
    }

    /// Publishes the local typing state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless connected.
    pub fn set_typing(&self, is_typing: bool) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.publish(&Envelope::Typing(TypingNotice {
            nickname: self.local.nickname.clone(),
            is_typing,
            timestamp: Timestamp::now(),
        }))
    }

    /// Registers a local input change at `now`, broadcasting
    /// `typing{true}` when a burst starts.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless connected.
    pub fn on_local_input(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if self.typing.on_local_input(now) {
            self.set_typing(true)?;
        }
        Ok(())
    }

    /// Broadcasts `typing{false}` if the debounce window has elapsed at `now`.
    ///
    /// While reconnecting the stop is held back and sent once the connection
    /// is back.
    pub fn poll_typing(&mut self, now: Instant) {
        if !self.typing.poll_expired(now) {
            return;
        }
        match self.set_typing(false) {
            Ok(()) => {}
            Err(SessionError::NotConnected) if self.state == SessionState::Reconnecting => {
                tracing::debug!("typing stop deferred until reconnect");
                self.typing_stop_owed = true;
            }
            Err(e) => tracing::debug!(error = %e, "typing stop not broadcast"),
        }
    }

    /// Leaves the room: publishes `leave` best-effort, closes the transport
    /// and clears all session state. The session cannot be reused.
    pub fn leave(&mut self) {
        if self.left {
            return;
        }
        if self.state == SessionState::Connected
            && let Err(e) = self.announce_leave()
        {
            tracing::warn!(error = %e, "leave announcement failed");
        }
        self.transport.close();
        self.presence.clear();
        self.dedup.clear();
        self.typing.clear();
        self.typing_stop_owed = false;
        self.state = SessionState::Disconnected;
        self.left = true;
        tracing::info!(nickname = %self.local.nickname, "left room");
        self.notify(Notice::Left);
    }

    /// Surfaces a failed local command as a notice.
    pub fn report_command_failure(&self, error: &SessionError) {
        tracing::warn!(error = %error, "command failed");
        self.notify(Notice::CommandFailed(error.to_string()));
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn ensure_connected(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Connected => Ok(()),
            _ => Err(SessionError::NotConnected),
        }
    }

    fn userlist(&self) -> Envelope {
        Envelope::UserList(UserList {
            nickname: Some(self.local.nickname.clone()),
            users: self.presence.snapshot(),
            timestamp: Timestamp::now(),
        })
    }

    fn avatar_or_own(&self, avatar: Option<String>) -> String {
        avatar.unwrap_or_else(|| self.local.avatar.clone())
    }

    fn publish(&self, envelope: &Envelope) -> Result<(), SessionError> {
        let bytes = codec::encode(envelope)?;
        self.transport.publish(self.room.topic(), bytes);
        Ok(())
    }

    fn publish_or_log(&self, envelope: &Envelope) {
        if let Err(e) = self.publish(envelope) {
            tracing::warn!(kind = envelope.kind(), error = %e, "publish failed");
        }
    }

    fn emit_presence(&self) {
        self.emit(SessionEvent::PresenceChanged(self.presence.snapshot()));
    }

    fn notify(&self, notice: Notice) {
        self.emit(SessionEvent::SystemNotice(notice));
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::debug!(error = %e, "session event dropped");
        }
    }
}
