//! Envelope types: the unit published on a room topic.
//!
//! Every envelope is a JSON object tagged by `"kind"`. Only `message` and
//! `image` carry an `id`; the other kinds are idempotent by content and can
//! be re-applied safely.

use serde::{Deserialize, Serialize};

use crate::message::{MessageId, Timestamp};
use crate::presence::Participant;

/// A text message. `content` is ciphertext produced under the room key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    /// Deduplication id; envelopes without one are ignored by receivers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Sender claim.
    pub nickname: String,
    /// Sender avatar at send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Sealed message body.
    pub content: String,
    /// Sender-local send time.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// An image message. The image reference travels unencrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMessage {
    /// Deduplication id; envelopes without one are ignored by receivers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Sender claim.
    pub nickname: String,
    /// Sender avatar at send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Image data reference (URL or data URI).
    pub url: String,
    /// Sender-local send time.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// A peer announcing itself on (re)connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNotice {
    /// Sender claim.
    pub nickname: String,
    /// Sender avatar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Sender-local time.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// A peer leaving the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveNotice {
    /// Sender claim.
    pub nickname: String,
    /// Sender-local time.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// Local typing state of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingNotice {
    /// Sender claim.
    pub nickname: String,
    /// `true` while the sender is typing.
    #[serde(rename = "isTyping")]
    pub is_typing: bool,
    /// Sender-local time.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// A full presence snapshot. Receivers replace their registry with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    /// Sender claim. Older peers omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Every participant the sender currently knows about.
    pub users: Vec<Participant>,
    /// Sender-local time.
    #[serde(default)]
    pub timestamp: Timestamp,
}

/// Top-level wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    /// Encrypted text message.
    Message(TextMessage),
    /// Image reference.
    Image(ImageMessage),
    /// Membership announcement.
    Join(JoinNotice),
    /// Membership withdrawal.
    Leave(LeaveNotice),
    /// Typing state change.
    Typing(TypingNotice),
    /// Presence snapshot.
    #[serde(rename = "userlist")]
    UserList(UserList),
}

impl Envelope {
    /// The wire name of this envelope's kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Image(_) => "image",
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::Typing(_) => "typing",
            Self::UserList(_) => "userlist",
        }
    }

    /// The claimed sender, if the envelope carries one.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Message(m) => Some(&m.nickname),
            Self::Image(m) => Some(&m.nickname),
            Self::Join(j) => Some(&j.nickname),
            Self::Leave(l) => Some(&l.nickname),
            Self::Typing(t) => Some(&t.nickname),
            Self::UserList(u) => u.nickname.as_deref(),
        }
    }

    /// The deduplication id of `message` and `image` envelopes.
    #[must_use]
    pub const fn id(&self) -> Option<&MessageId> {
        match self {
            Self::Message(m) => m.id.as_ref(),
            Self::Image(m) => m.id.as_ref(),
            _ => None,
        }
    }
}
