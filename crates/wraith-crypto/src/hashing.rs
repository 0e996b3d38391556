//! # BLAKE3 Key Derivation
//!
//! Envelope keys arrive as arbitrary strings of arbitrary length. BLAKE3's
//! derive-key mode maps them onto a uniform 256-bit key, domain-separated by
//! a context string so the same secret never yields the same key in two
//! different roles.

/// Derive key from context and input key material.
pub fn blake3_derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let hash = hasher.finalize();
    output.copy_from_slice(hash.as_bytes());
    output
}
