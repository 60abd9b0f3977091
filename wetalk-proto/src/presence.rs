//! Participant metadata exchanged in `join` and `userlist` envelopes.

use serde::{Deserialize, Serialize};

/// A room member as announced on the wire.
///
/// The nickname is the only identifier; it is neither unique nor
/// authenticated. The avatar is display metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Claimed display name.
    pub nickname: String,
    /// Avatar URI or opaque image reference. Empty when unknown.
    #[serde(default)]
    pub avatar: String,
}

impl Participant {
    /// Creates a participant entry.
    pub fn new(nickname: impl Into<String>, avatar: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            avatar: avatar.into(),
        }
    }
}
