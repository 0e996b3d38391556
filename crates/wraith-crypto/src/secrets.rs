//! Random secret generation.

use rand::RngCore;

/// Generate a hex-encoded random secret of `bytes` bytes of entropy.
///
/// Used for session tokens, rotating envelope keys and the API fingerprint.
pub fn random_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
