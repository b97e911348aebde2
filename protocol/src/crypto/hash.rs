//! # Hashing Utilities
//!
//! - **SHA-256** for everything the ledger and WebAuthn dictate: transaction
//!   hashes, network ids, intent digests, client-data hashes.
//! - **BLAKE3** `derive_key` for domain-separated deterministic derivations
//!   that never leave this client (the per-account vault salt).

use sha2::{Digest, Sha256};

/// SHA-256 as a fixed-size array.
///
/// # Example
///
/// ```
/// use lumen_protocol::crypto::sha256;
///
/// let hash = sha256(b"lumen");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of several slices, without allocating
/// the concatenation.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// BLAKE3 key derivation under a static context string.
pub fn derive_key(context: &str, material: &[u8]) -> [u8; 32] {
    blake3::derive_key(context, material)
}
