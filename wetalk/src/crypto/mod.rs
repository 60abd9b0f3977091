//! Crypto envelope for message bodies.
//!
//! Text bodies are sealed under the room key before they are published and
//! opened after they are received. Only `message` content passes through
//! here; every other envelope field travels in the clear.
//!
//! [`seal`] and [`open`] never fail. A sealing failure sends the plaintext
//! as-is and an opening failure shows the ciphertext as-is, so a broken key
//! degrades a message instead of blocking the session. Confidentiality is
//! therefore best-effort, and only holds against parties without the room key.
//! Use [`try_seal`] / [`try_open`] where the failure must be observed.

pub mod cipher;

use cipher::RoomCipher;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The room key is empty.
    #[error("room key is empty")]
    EmptyKey,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (corrupted ciphertext, wrong key, or tampered data).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Encrypts `plaintext` under `key`, returning base64 text.
///
/// # Errors
///
/// Returns [`CryptoError::EmptyKey`] for an empty key and
/// [`CryptoError::EncryptionFailed`] if the primitive fails.
pub fn try_seal(plaintext: &str, key: &str) -> Result<String, CryptoError> {
    RoomCipher::new(key)?.seal(plaintext.as_bytes())
}

/// Decrypts text produced by [`try_seal`] under the same key.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] for malformed input, a wrong
/// key, tampered data, non UTF-8 plaintext, or an empty result.
pub fn try_open(ciphertext: &str, key: &str) -> Result<String, CryptoError> {
    let bytes = RoomCipher::new(key)?.open(ciphertext)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".into()))?;
    if text.is_empty() {
        return Err(CryptoError::DecryptionFailed("empty plaintext".into()));
    }
    Ok(text)
}

/// Seals `plaintext` under `key`, or returns it unchanged if sealing fails.
#[must_use]
pub fn seal(plaintext: &str, key: &str) -> String {
    try_seal(plaintext, key).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "sealing failed, sending plaintext");
        plaintext.to_string()
    })
}

/// Opens `ciphertext` under `key`, or returns it unchanged if opening fails.
#[must_use]
pub fn open(ciphertext: &str, key: &str) -> String {
    try_open(ciphertext, key).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "opening failed, showing raw content");
        ciphertext.to_string()
    })
}
