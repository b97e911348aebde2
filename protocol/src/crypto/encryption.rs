//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for the secret vault. Two keys flow through
//! here: the random data-encryption-key that seals the account secret, and
//! the derived key-encryption-key that wraps it.
//!
//! ## Nonce management
//!
//! GCM is unforgiving about nonce reuse under one key. Every seal draws a
//! fresh 96-bit nonce from the OS CSPRNG and hands it back to the caller,
//! who stores it next to the ciphertext. Data keys are single-use, so the
//! birthday bound never comes into play.
//!
//! ## Fallible randomness
//!
//! Randomness goes through `try_fill_bytes`. An OS RNG failure surfaces as
//! [`EncryptionError::Randomness`] instead of a panic.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors that can occur during encryption/decryption.
///
/// Kept vague: the difference between "wrong key" and "corrupted
/// ciphertext" is none of an attacker's business. The vault layer decides
/// which of the two a failure means from *which* layer failed.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("secure randomness unavailable")]
    Randomness,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("invalid nonce length: expected {AES_NONCE_LENGTH} bytes")]
    InvalidNonceLength,
}

/// Fill `buf` from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), EncryptionError> {
    rand::rngs::OsRng
        .try_fill_bytes(buf)
        .map_err(|_| EncryptionError::Randomness)
}

/// Generate a fresh 256-bit key. Zeroized when dropped.
pub fn generate_key() -> Result<Zeroizing<[u8; AES_KEY_LENGTH]>, EncryptionError> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    fill_random(key.as_mut())?;
    Ok(key)
}

/// Generate a fresh 96-bit nonce.
pub fn generate_nonce() -> Result<[u8; AES_NONCE_LENGTH], EncryptionError> {
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    fill_random(&mut nonce)?;
    Ok(nonce)
}

/// Encrypt `plaintext` under `key` and `nonce`, authenticating `aad`.
///
/// Returns the ciphertext with the 16-byte tag appended. The caller owns
/// the nonce and must never reuse it under the same key.
pub fn seal(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)
}

/// Decrypt data produced by [`seal`]. The nonce and AAD must match.
pub fn open(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8; AES_NONCE_LENGTH],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Length-checked conversion for nonces coming off the wire.
pub fn nonce_from_slice(bytes: &[u8]) -> Result<[u8; AES_NONCE_LENGTH], EncryptionError> {
    bytes
        .try_into()
        .map_err(|_| EncryptionError::InvalidNonceLength)
}

/// Length-checked conversion for keys coming off the wire.
pub fn key_from_slice(bytes: &[u8]) -> Result<Zeroizing<[u8; AES_KEY_LENGTH]>, EncryptionError> {
    let key: [u8; AES_KEY_LENGTH] = bytes
        .try_into()
        .map_err(|_| EncryptionError::InvalidKeyLength)?;
    Ok(Zeroizing::new(key))
}
