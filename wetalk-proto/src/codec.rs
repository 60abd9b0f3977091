//! Serialization and deserialization for the `WeTalk` wire protocol.
//!
//! Envelopes are UTF-8 JSON documents; each broker message carries exactly
//! one, so no framing is needed.

use crate::envelope::Envelope;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes an [`Envelope`] into a JSON byte vector.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the envelope cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`Envelope`] from a JSON byte slice.
///
/// # Errors
///
/// Returns `CodecError::Serialization` for malformed JSON, an unknown
/// `kind`, or missing required fields.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
