//! # Symmetric Encryption
//!
//! XChaCha20-Poly1305 with random 192-bit nonces, plus the string-keyed
//! envelope helpers ([`seal`] / [`open`]) the gateway speaks on the wire.
//!
//! ## Security Properties
//!
//! - **XChaCha20-Poly1305**: 192-bit nonce, constant-time ARX design
//! - Authenticated: a wrong key or a flipped bit fails decryption outright,
//!   which is what lets the gateway tell the switch key and the initial key
//!   apart by trial.

use crate::hashing::blake3_derive_key;
use crate::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

/// Domain separation context for envelope keys.
const ENVELOPE_KEY_CONTEXT: &str = "wraith-gateway envelope v1 xchacha20poly1305";

/// XChaCha20 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// Secret key (256-bit).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive an envelope key from a string secret of any length.
    pub fn derive(key_material: &str) -> Self {
        Self(blake3_derive_key(
            ENVELOPE_KEY_CONTEXT,
            key_material.as_bytes(),
        ))
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Nonce for encryption.
#[derive(Clone)]
pub struct Nonce([u8; NONCE_LEN]);

impl Nonce {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate random nonce (safe with XChaCha20's 192-bit nonce).
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Encrypt plaintext with XChaCha20-Poly1305.
///
/// Returns (ciphertext, nonce).
///
/// # Errors
///
/// Returns `CryptoError::EncryptionFailed` if encryption fails.
pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<(Vec<u8>, Nonce), CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::generate();

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok((ciphertext, nonce))
}

/// Decrypt ciphertext with XChaCha20-Poly1305.
///
/// # Errors
///
/// Returns `CryptoError::DecryptionFailed` if decryption fails.
pub fn decrypt(key: &SecretKey, ciphertext: &[u8], nonce: &Nonce) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce.as_bytes()), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Seal `plaintext` under a string key, producing `hex(nonce || ciphertext)`.
pub fn seal(key_material: &str, plaintext: &[u8]) -> Result<String, CryptoError> {
    let key = SecretKey::derive(key_material);
    let (ciphertext, nonce) = encrypt(&key, plaintext)?;

    let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    framed.extend_from_slice(nonce.as_bytes());
    framed.extend_from_slice(&ciphertext);
    Ok(hex::encode(framed))
}

/// Open an envelope produced by [`seal`].
///
/// # Errors
///
/// Fails on non-hex input, on input shorter than a nonce, and on any
/// authentication failure (wrong key, tampering).
pub fn open(key_material: &str, envelope: &str) -> Result<Vec<u8>, CryptoError> {
    let framed =
        hex::decode(envelope.trim()).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
    if framed.len() < NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_LEN,
            actual: framed.len(),
        });
    }

    let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(nonce_bytes);

    decrypt(
        &SecretKey::derive(key_material),
        ciphertext,
        &Nonce::from_bytes(nonce),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SecretKey::derive("switch-key");
        let plaintext = b"{\"reqType\":\"heartbeat\"}";

        let (ciphertext, nonce) = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext, &nonce).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let envelope = seal("session-token", b"[\"abc\",\"def\"]").unwrap();
        assert_eq!(open("session-token", &envelope).unwrap(), b"[\"abc\",\"def\"]");
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = seal("initial-key", b"Secret message").unwrap();
        assert!(matches!(
            open("switch-key", &envelope),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_tampered_envelope_fails() {
        let envelope = seal("key", b"Secret message").unwrap();
        let mut bytes = hex::decode(&envelope).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(open("key", &hex::encode(bytes)).is_err());
    }

    #[test]
    fn test_garbage_envelopes_rejected() {
        assert!(matches!(
            open("key", "not hex at all"),
            Err(CryptoError::InvalidEncoding(_))
        ));
        assert!(matches!(
            open("key", "abcd"),
            Err(CryptoError::InvalidNonceLength { actual: 2, .. })
        ));
        assert!(open("key", "").is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let e1 = seal("key", b"same").unwrap();
        let e2 = seal("key", b"same").unwrap();
        assert_ne!(e1, e2);
    }
}
