//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited implementations:
//!
//! - **Ed25519** for ledger transaction signatures.
//! - **AES-256-GCM** for the vault's data key and key wrap.
//! - **SHA-256** for transaction hashes and intent digests.
//! - **BLAKE3** for local, domain-separated derivations.
//!
//! Nothing here is clever. Keep it that way.

pub mod encryption;
pub mod hash;
pub mod keys;

pub use encryption::EncryptionError;
pub use hash::{derive_key, sha256, sha256_concat};
pub use keys::{verify_signature, KeyError, LedgerKeypair};
