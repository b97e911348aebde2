//! # Vault Envelope
//!
//! Two-layer envelope encryption of an account's signing secret:
//!
//! ```text
//! dek          <- 32 random bytes
//! ciphertext   =  AES-256-GCM(dek, iv,      secret, aad = public_key)
//! wrapped_dek  =  AES-256-GCM(kek, wrap_iv, dek,    aad = public_key)
//! ```
//!
//! The data-encryption-key is random and single-use; only its wrapped form
//! is stored. Opening proceeds outside-in, and which layer fails decides
//! the error:
//!
//! | Failure                          | Error                          |
//! |----------------------------------|--------------------------------|
//! | `wrap_iv` empty or missing       | [`VaultError::Corrupt`]        |
//! | field not base64 / wrong length  | [`VaultError::Corrupt`]        |
//! | KEK cannot unwrap the DEK        | [`VaultError::AuthMismatch`]   |
//! | DEK cannot open the ciphertext   | [`VaultError::Decryption`]     |
//!
//! An envelope without a `wrap_iv` can never be opened again: the DEK is
//! gone. That is checked before any key is derived.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use zeroize::Zeroizing;

use super::kek::KekParams;
use super::VaultError;
use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, VAULT_ENVELOPE_VERSION};
use crate::crypto::encryption::{self, EncryptionError};
use crate::ledger::LedgerAddress;

/// Non-secret facts about an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub version: u32,
    /// Account whose secret is sealed; its key is the AAD of both layers.
    pub account: LedgerAddress,
    /// Credential the KEK was derived from, if any.
    #[serde(default)]
    pub credential_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The persisted vault envelope. Binary fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub wrapped_data_encryption_key: String,
    pub ciphertext: String,
    pub iv: String,
    /// Nonce of the DEK wrap. Envelopes written before it was recorded
    /// deserialize with an empty value.
    #[serde(default)]
    pub wrap_iv: String,
    pub salt: String,
    pub metadata: EnvelopeMetadata,
}

impl EncryptedSecret {
    /// Seal `secret` for `account` under `kek`.
    pub fn seal(
        secret: &[u8],
        account: &LedgerAddress,
        credential_id: Option<&str>,
        kek: &KekParams,
    ) -> Result<Self, VaultError> {
        let aad = account.public_key();

        let dek = encryption::generate_key().map_err(VaultError::Encryption)?;
        let iv = encryption::generate_nonce().map_err(VaultError::Encryption)?;
        let ciphertext = encryption::seal(&dek, &iv, secret, aad).map_err(VaultError::Encryption)?;

        let kek_bytes = kek.derive_kek()?;
        let wrap_iv = encryption::generate_nonce().map_err(VaultError::Encryption)?;
        let wrapped = encryption::seal(&kek_bytes, &wrap_iv, &dek[..], aad)
            .map_err(VaultError::Encryption)?;

        debug!(account = %account, "sealed vault envelope");

        Ok(Self {
            wrapped_data_encryption_key: STANDARD.encode(wrapped),
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(iv),
            wrap_iv: STANDARD.encode(wrap_iv),
            salt: STANDARD.encode(kek.salt()),
            metadata: EnvelopeMetadata {
                version: VAULT_ENVELOPE_VERSION,
                account: *account,
                credential_id: credential_id.map(str::to_string),
                created_at: Utc::now(),
            },
        })
    }

    /// Recover the sealed secret.
    ///
    /// The returned buffer is zeroized on drop; hold it only for the one
    /// signing operation that needs it.
    pub fn open(&self, kek: &KekParams) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let account = self.metadata.account;
        if self.wrap_iv.trim().is_empty() {
            error!(
                account = %account,
                security = true,
                "vault envelope has no wrap iv; the data key is unrecoverable"
            );
            return Err(VaultError::Corrupt("missing wrap iv".into()));
        }

        let wrap_iv = decode_nonce("wrap_iv", &self.wrap_iv)?;
        let iv = decode_nonce("iv", &self.iv)?;
        let wrapped = decode_field("wrapped_data_encryption_key", &self.wrapped_data_encryption_key)?;
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;
        let aad = account.public_key();

        let kek_bytes = kek.derive_kek()?;
        let dek = encryption::open(&kek_bytes, &wrap_iv, &wrapped, aad).map_err(|_| {
            debug!(account = %account, "vault key unwrap failed");
            VaultError::AuthMismatch
        })?;
        let dek: Zeroizing<[u8; AES_KEY_LENGTH]> = Zeroizing::new(
            dek.as_slice()
                .try_into()
                .map_err(|_| VaultError::Corrupt("unwrapped data key has wrong length".into()))?,
        );

        encryption::open(&dek, &iv, &ciphertext, aad).map_err(|e| match e {
            EncryptionError::DecryptFailed => VaultError::Decryption,
            other => VaultError::Encryption(other),
        })
    }

    /// Whether every field needed for [`EncryptedSecret::open`] is present.
    pub fn is_structurally_complete(&self) -> bool {
        [
            &self.wrapped_data_encryption_key,
            &self.ciphertext,
            &self.iv,
            &self.wrap_iv,
            &self.salt,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, VaultError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| VaultError::Corrupt(format!("{name} is not base64: {e}")))
}

fn decode_nonce(name: &str, value: &str) -> Result<[u8; AES_NONCE_LENGTH], VaultError> {
    let bytes = decode_field(name, value)?;
    encryption::nonce_from_slice(&bytes)
        .map_err(|_| VaultError::Corrupt(format!("{name} has wrong length {}", bytes.len())))
}
