//! # Vault Module: Authenticator-Gated Secret Storage
//!
//! The account's signing secret never rests in plaintext. It is sealed in a
//! two-layer envelope whose outer key is derived from the authenticator
//! credential, and recovered only for the single signing operation that
//! needs it.
//!
//! ## Architecture
//!
//! ```text
//! kek.rs        - KEK parameters: session secret + per-account salt, HKDF
//! envelope.rs   - EncryptedSecret: seal / open, corruption detection
//! credential.rs - authenticator credential records and bindings
//! session.rs    - VaultSession: one read of the store per flow
//! ```
//!
//! [`SecretVault`] ties these to the [`WalletDb`] store.
//!
//! ## Failure Modes
//!
//! Callers have to tell three situations apart, so they are separate
//! variants:
//!
//! 1. [`VaultError::AuthMismatch`]: the derived KEK is wrong. The user may
//!    retry with the right authenticator.
//! 2. [`VaultError::Corrupt`]: the envelope can never be opened again. The
//!    only way forward is a new wallet.
//! 3. [`VaultError::Decryption`]: the outer layer opened but the payload was
//!    tampered with.

pub mod credential;
pub mod envelope;
pub mod kek;
pub mod session;

use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

use crate::crypto::{EncryptionError, LedgerKeypair};
use crate::ledger::LedgerAddress;
use crate::storage::{StorageError, WalletDb};

pub use credential::{AuthenticatorCredential, CredentialBinding};
pub use envelope::{EncryptedSecret, EnvelopeMetadata};
pub use kek::{derive_salt, KekParams};
pub use session::{RecoveredSecret, SecretSource, VaultSession};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault encryption failed: {0}")]
    Encryption(EncryptionError),

    #[error("vault is corrupt and cannot be recovered ({0}); create a new wallet")]
    Corrupt(String),

    #[error("authenticator did not unlock the vault; authenticate again with the registered credential")]
    AuthMismatch,

    #[error("vault payload failed authentication")]
    Decryption,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("no authenticator credential is registered for this account")]
    MissingCredential,

    #[error("no signing secret is stored for this account")]
    NoSecret,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// SecretVault
// ---------------------------------------------------------------------------

/// Envelope encryption backed by the wallet store.
#[derive(Debug, Clone)]
pub struct SecretVault {
    db: WalletDb,
}

impl SecretVault {
    pub fn new(db: WalletDb) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &WalletDb {
        &self.db
    }

    /// Seal the keypair's secret under KEK params derived from `credential`
    /// (or the public key when there is none), then persist envelope and
    /// binding atomically.
    pub fn encrypt_and_store(
        &self,
        keypair: &LedgerKeypair,
        credential: Option<&AuthenticatorCredential>,
    ) -> Result<EncryptedSecret, VaultError> {
        let account = keypair.address();
        let kek = match credential {
            Some(c) => KekParams::for_credential(&c.id, &account),
            None => KekParams::for_public_key(&account),
        };
        let secret = keypair.secret_bytes();
        let envelope = EncryptedSecret::seal(
            &secret[..],
            &account,
            credential.map(|c| c.id.as_str()),
            &kek,
        )?;
        self.db.put_wallet(&account, &envelope, credential)?;
        info!(account = %account, bound = credential.is_some(), "vault envelope stored");
        Ok(envelope)
    }

    /// Open an envelope with explicit KEK params.
    pub fn decrypt(
        &self,
        envelope: &EncryptedSecret,
        kek: &KekParams,
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        envelope.open(kek)
    }

    /// Read credential, envelope and legacy secret for `account`, once.
    pub fn open_session(&self, account: &LedgerAddress) -> Result<VaultSession, VaultError> {
        Ok(VaultSession::new(
            *account,
            self.db.credential_for(account)?,
            self.db.envelope(account)?,
            self.db.legacy_secret(account)?,
        ))
    }

    /// Delete every local trace of `account`.
    pub fn remove(&self, account: &LedgerAddress) -> Result<bool, VaultError> {
        Ok(self.db.remove_wallet(account)?)
    }

    pub fn purge_orphaned_credentials(&self) -> Result<usize, VaultError> {
        Ok(self.db.purge_orphaned_credentials()?)
    }
}
