//! Manager credentials.
//!
//! Account passwords are stored as Argon2id PHC strings. On the wire the
//! autoconf body carries the password sealed under
//! `username + "wraithCredentials"`.

use crate::ports::outbound::Cipher;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use wraith_crypto::CryptoError;

/// Appended to the username to form the credential obfuscation key.
pub const CREDENTIAL_KEY_SUFFIX: &str = "wraithCredentials";

const SALT_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("credential obfuscation failed: {0}")]
    Obfuscation(#[from] CryptoError),
}

/// Key the password of `username` is obfuscated with.
pub fn credential_key(username: &str) -> String {
    format!("{username}{CREDENTIAL_KEY_SUFFIX}")
}

/// Hash `password` into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| CredentialError::Hash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Check `password` against a PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is not a valid PHC string");
            false
        }
    }
}

/// Build an autoconf body: `username|sealed(password)`.
pub fn obfuscate(
    cipher: &dyn Cipher,
    username: &str,
    password: &str,
) -> Result<String, CredentialError> {
    let sealed = cipher.encrypt(password.as_bytes(), &credential_key(username))?;
    Ok(format!("{username}|{sealed}"))
}

/// Recover the password from the sealed half of an autoconf body.
pub fn reveal(cipher: &dyn Cipher, username: &str, sealed: &str) -> Option<String> {
    let plain = cipher.decrypt(sealed, &credential_key(username)).ok()?;
    String::from_utf8(plain).ok()
}
