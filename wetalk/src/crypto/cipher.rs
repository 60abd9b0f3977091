//! XChaCha20-Poly1305 keyed by the room key.
//!
//! Sealed format: standard base64 of `nonce (24 bytes) || ciphertext+tag`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::CryptoError;

/// Length of the XChaCha20 nonce prefix.
pub const NONCE_LEN: usize = 24;

/// Symmetric cipher for one room key.
pub struct RoomCipher {
    cipher: XChaCha20Poly1305,
}

impl RoomCipher {
    /// Builds the cipher for `key`. The 256-bit cipher key is SHA-256(key).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EmptyKey`] if `key` is empty.
    pub fn new(key: &str) -> Result<Self, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        let mut digest: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&digest));
        digest.zeroize();
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the AEAD rejects the input.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypts base64 text produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] on bad base64, short input,
    /// or authentication failure.
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CryptoError> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {e}")))?;
        if bytes.len() <= NONCE_LEN {
            return Err(CryptoError::DecryptionFailed(format!(
                "sealed payload too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed("authentication failed".into()))
    }
}
