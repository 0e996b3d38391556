//! XChaCha20-Poly1305 envelope cipher backed by `wraith-crypto`.

use crate::ports::outbound::Cipher;
use wraith_crypto::CryptoError;

/// Seals payloads as `hex(nonce || ciphertext)` under a BLAKE3-derived key.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeCipher;

impl Cipher for EnvelopeCipher {
    fn encrypt(&self, plaintext: &[u8], key: &str) -> Result<String, CryptoError> {
        wraith_crypto::seal(key, plaintext)
    }

    fn decrypt(&self, ciphertext: &str, key: &str) -> Result<Vec<u8>, CryptoError> {
        wraith_crypto::open(key, ciphertext)
    }
}
