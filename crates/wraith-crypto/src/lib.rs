//! # Wraith Crypto - Envelope Cipher Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | XChaCha20-Poly1305 | Request/response envelopes |
//! | `hashing` | BLAKE3 `derive_key` | Stretching string secrets into 256-bit keys |
//! | `secrets` | OS-seeded CSPRNG | Session tokens, rotating keys |
//!
//! ## Envelope Format
//!
//! Every key the gateway deals with (pre-shared agent keys, the management
//! first-layer key, session tokens, manager passwords) is a string. The
//! string is turned into a 256-bit key with BLAKE3 in derive-key mode and the
//! plaintext is sealed as `hex(nonce || ciphertext || tag)`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod secrets;
pub mod symmetric;

// Re-exports
pub use errors::CryptoError;
pub use hashing::blake3_derive_key;
pub use secrets::random_secret;
pub use symmetric::{decrypt, encrypt, open, seal, Nonce, SecretKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
