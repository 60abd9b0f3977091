//! Room identity: the shared room key and the topic derived from it.

use url::Url;

/// Prefix of every room topic on the broker.
pub const TOPIC_PREFIX: &str = "/chat/";

/// Errors raised while building a [`RoomIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The room key is empty or whitespace only.
    #[error("room key cannot be empty")]
    EmptyKey,
}

/// The shared secret of a room and the broker topic derived from it.
///
/// The key is both the encryption secret and the broker credential. The
/// topic is fixed at construction and never changes for the session.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomIdentity {
    key: String,
    topic: String,
}

impl RoomIdentity {
    /// Builds the identity for `key` (surrounding whitespace is trimmed).
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::EmptyKey`] if the trimmed key is empty.
    pub fn new(key: &str) -> Result<Self, RoomError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(RoomError::EmptyKey);
        }
        Ok(Self {
            key: key.to_string(),
            topic: topic_for(key),
        })
    }

    /// The room key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The broker topic all room envelopes are published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

// Keep the key out of logs.
impl std::fmt::Debug for RoomIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomIdentity")
            .field("key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Derives the broker topic for a room key.
#[must_use]
pub fn topic_for(key: &str) -> String {
    format!("{TOPIC_PREFIX}{key}")
}

/// Extracts the room key from a share link of the form `...?room=<key>`.
///
/// The value is form-decoded. Returns `None` when the link is not an
/// absolute URL or has no non-empty `room` parameter.
#[must_use]
pub fn key_from_share_link(link: &str) -> Option<String> {
    let parsed = Url::parse(link.trim()).ok()?;
    parsed
        .query_pairs()
        .find(|(name, _)| name == "room")
        .map(|(_, value)| value.into_owned())
        .filter(|key| !key.trim().is_empty())
}
