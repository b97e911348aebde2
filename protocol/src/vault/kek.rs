//! Key-encryption-key parameters.
//!
//! ```text
//! salt = BLAKE3-derive_key(VAULT_SALT_CONTEXT, public_key)[..16]
//! kek  = HKDF-SHA256(salt, session_secret, info = VAULT_KEK_INFO)
//! ```
//!
//! The session secret is the authenticator credential id, or the account
//! public key when no credential is bound. That is a placeholder for a real
//! per-session negotiation and is far weaker than one: anyone holding the
//! credential id and the envelope can unwrap it. It is kept as-is until the
//! negotiation protocol exists.

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

use super::VaultError;
use crate::config::{AES_KEY_LENGTH, VAULT_KEK_INFO, VAULT_SALT_CONTEXT, VAULT_SALT_LENGTH};
use crate::crypto::derive_key;
use crate::ledger::LedgerAddress;

/// Inputs to the key-encryption-key derivation. Must be identical at seal
/// and open time.
pub struct KekParams {
    session_secret: Zeroizing<Vec<u8>>,
    salt: [u8; VAULT_SALT_LENGTH],
}

impl KekParams {
    pub fn new(session_secret: &[u8], salt: [u8; VAULT_SALT_LENGTH]) -> Self {
        Self {
            session_secret: Zeroizing::new(session_secret.to_vec()),
            salt,
        }
    }

    /// Params keyed on an authenticator credential id.
    pub fn for_credential(credential_id: &str, account: &LedgerAddress) -> Self {
        Self::new(credential_id.as_bytes(), derive_salt(account))
    }

    /// Fallback params keyed on the account public key alone.
    pub fn for_public_key(account: &LedgerAddress) -> Self {
        Self::new(account.public_key(), derive_salt(account))
    }

    pub fn salt(&self) -> &[u8; VAULT_SALT_LENGTH] {
        &self.salt
    }

    /// Run HKDF. The output is zeroized on drop.
    pub fn derive_kek(&self) -> Result<Zeroizing<[u8; AES_KEY_LENGTH]>, VaultError> {
        let hk = Hkdf::<Sha256>::new(Some(&self.salt), &self.session_secret);
        let mut okm = Zeroizing::new([0u8; AES_KEY_LENGTH]);
        hk.expand(VAULT_KEK_INFO, okm.as_mut())
            .map_err(|e| VaultError::KeyDerivation(format!("hkdf expand failed: {e:?}")))?;
        Ok(okm)
    }
}

impl fmt::Debug for KekParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KekParams")
            .field("session_secret", &"<redacted>")
            .field("salt", &hex::encode(self.salt))
            .finish()
    }
}

/// Deterministic per-account salt.
pub fn derive_salt(account: &LedgerAddress) -> [u8; VAULT_SALT_LENGTH] {
    let full = derive_key(VAULT_SALT_CONTEXT, account.public_key());
    let mut salt = [0u8; VAULT_SALT_LENGTH];
    salt.copy_from_slice(&full[..VAULT_SALT_LENGTH]);
    salt
}
