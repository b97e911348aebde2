//! # WalletDb: Local Wallet Store
//!
//! Everything the wallet keeps on disk, in sled's embedded key-value store.
//! Ledger state is never stored here: only what the ledger cannot give back.
//!
//! ## Tree Layout
//!
//! | Tree             | Key                   | Value                         |
//! |------------------|-----------------------|-------------------------------|
//! | `envelopes`      | `address` (UTF-8)     | `bincode(EncryptedSecret)`    |
//! | `credentials`    | `credential id`       | `bincode(CredentialBinding)`  |
//! | `bindings`       | `address` (UTF-8)     | `credential id` (UTF-8)       |
//! | `legacy_secrets` | `address` (UTF-8)     | hex seed (UTF-8), deprecated  |
//!
//! ## Atomicity
//!
//! Creating a wallet writes the envelope, the credential record and the
//! account binding in one multi-tree sled transaction; disconnecting
//! removes them the same way. A reader sees either the old record or the
//! new one, never a half-written wallet. Envelopes are replaced whole,
//! never patched in place.

use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::ledger::LedgerAddress;
use crate::vault::credential::{AuthenticatorCredential, CredentialBinding};
use crate::vault::envelope::EncryptedSecret;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("credential {credential} is already bound to {account}")]
    CredentialInUse {
        credential: String,
        account: LedgerAddress,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

fn encode<T: serde::Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn unwrap_tx(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::Sled(e),
    }
}

// ---------------------------------------------------------------------------
// WalletDb
// ---------------------------------------------------------------------------

/// Persistent wallet store.
///
/// Cheap to clone; clones share the same sled handle.
#[derive(Debug, Clone)]
pub struct WalletDb {
    db: Db,
    envelopes: Tree,
    credentials: Tree,
    bindings: Tree,
    legacy_secrets: Tree,
}

impl WalletDb {
    /// Open or create a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that is deleted when dropped.
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        Ok(Self {
            envelopes: db.open_tree("envelopes")?,
            credentials: db.open_tree("credentials")?,
            bindings: db.open_tree("bindings")?,
            legacy_secrets: db.open_tree("legacy_secrets")?,
            db,
        })
    }

    // -- Wallet records -----------------------------------------------------

    /// Store a freshly sealed envelope and bind `credential` to the account,
    /// atomically. Replaces any previous envelope or binding for the account.
    ///
    /// A credential is bound to one account at a time: binding one that
    /// another account still holds fails with
    /// [`StorageError::CredentialInUse`] and writes nothing.
    pub fn put_wallet(
        &self,
        account: &LedgerAddress,
        envelope: &EncryptedSecret,
        credential: Option<&AuthenticatorCredential>,
    ) -> StorageResult<()> {
        let key = account.to_string();
        let envelope_bytes = encode(envelope)?;
        let binding_bytes = credential
            .map(|c| {
                encode(&CredentialBinding {
                    credential: c.clone(),
                    account: Some(*account),
                })
            })
            .transpose()?;
        let credential_id = credential.map(|c| c.id.clone());

        (&self.envelopes, &self.credentials, &self.bindings)
            .transaction(
                |(envelopes, credentials, bindings)| -> ConflictableTransactionResult<(), StorageError> {
                    if let Some(id) = &credential_id {
                        if let Some(existing) = credentials.get(id.as_bytes())? {
                            let record: CredentialBinding =
                                decode(&existing).map_err(ConflictableTransactionError::Abort)?;
                            if let Some(owner) = record.account.filter(|owner| owner != account) {
                                let held = bindings
                                    .get(owner.to_string().as_bytes())?
                                    .is_some_and(|bound| bound.as_ref() == id.as_bytes());
                                if held {
                                    return Err(ConflictableTransactionError::Abort(
                                        StorageError::CredentialInUse {
                                            credential: id.clone(),
                                            account: owner,
                                        },
                                    ));
                                }
                            }
                        }
                    }
                    // Release whatever credential this account held before.
                    if let Some(previous) = bindings.get(key.as_bytes())? {
                        if credential_id.as_deref().map(str::as_bytes) != Some(previous.as_ref()) {
                            credentials.remove(previous)?;
                        }
                    }
                    envelopes.insert(key.as_bytes(), envelope_bytes.as_slice())?;
                    match (&credential_id, &binding_bytes) {
                        (Some(id), Some(bytes)) => {
                            credentials.insert(id.as_bytes(), bytes.as_slice())?;
                            bindings.insert(key.as_bytes(), id.as_bytes())?;
                        }
                        _ => {
                            bindings.remove(key.as_bytes())?;
                        }
                    }
                    Ok(())
                },
            )
            .map_err(unwrap_tx)?;

        self.db.flush()?;
        debug!(account = %account, "wallet record written");
        Ok(())
    }

    /// The account's vault envelope, if one exists.
    pub fn envelope(&self, account: &LedgerAddress) -> StorageResult<Option<EncryptedSecret>> {
        self.envelopes
            .get(account.to_string().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// The credential currently bound to the account.
    pub fn credential_for(
        &self,
        account: &LedgerAddress,
    ) -> StorageResult<Option<AuthenticatorCredential>> {
        let Some(id) = self.bindings.get(account.to_string().as_bytes())? else {
            return Ok(None);
        };
        let id = String::from_utf8(id.to_vec())
            .map_err(|_| StorageError::Corrupt("credential id is not UTF-8".into()))?;
        Ok(self.credential(&id)?.map(|b| b.credential))
    }

    /// Look up a credential record by id.
    pub fn credential(&self, id: &str) -> StorageResult<Option<CredentialBinding>> {
        self.credentials
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Register a credential with no account yet.
    pub fn put_unbound_credential(&self, credential: &AuthenticatorCredential) -> StorageResult<()> {
        let bytes = encode(&CredentialBinding {
            credential: credential.clone(),
            account: None,
        })?;
        self.credentials.insert(credential.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Plaintext secret written by pre-vault wallets.
    pub fn legacy_secret(&self, account: &LedgerAddress) -> StorageResult<Option<Zeroizing<String>>> {
        let Some(bytes) = self.legacy_secrets.get(account.to_string().as_bytes())? else {
            return Ok(None);
        };
        let secret = String::from_utf8(bytes.to_vec())
            .map_err(|_| StorageError::Corrupt("legacy secret is not UTF-8".into()))?;
        Ok(Some(Zeroizing::new(secret)))
    }

    /// Import state left behind by a pre-vault wallet. Wallet creation
    /// never calls this.
    pub fn put_legacy_secret(&self, account: &LedgerAddress, secret_hex: &str) -> StorageResult<()> {
        self.legacy_secrets
            .insert(account.to_string().as_bytes(), secret_hex.as_bytes())?;
        Ok(())
    }

    /// Remove every local trace of an account. Returns whether anything
    /// was there.
    pub fn remove_wallet(&self, account: &LedgerAddress) -> StorageResult<bool> {
        let key = account.to_string();
        let removed = (
            &self.envelopes,
            &self.credentials,
            &self.bindings,
            &self.legacy_secrets,
        )
            .transaction(
                |(envelopes, credentials, bindings, legacy)| -> ConflictableTransactionResult<bool, StorageError> {
                    let mut any = false;
                    if let Some(id) = bindings.remove(key.as_bytes())? {
                        credentials.remove(id)?;
                        any = true;
                    }
                    any |= envelopes.remove(key.as_bytes())?.is_some();
                    any |= legacy.remove(key.as_bytes())?.is_some();
                    Ok(any)
                },
            )
            .map_err(unwrap_tx)?;
        self.db.flush()?;
        Ok(removed)
    }

    /// Delete credentials that no longer guard anything: never bound, bound
    /// to an account whose binding now points elsewhere, or bound to an
    /// account with neither an envelope nor a legacy secret.
    pub fn purge_orphaned_credentials(&self) -> StorageResult<usize> {
        let mut orphans = Vec::new();
        for entry in self.credentials.iter() {
            let (id, bytes) = entry?;
            let record: CredentialBinding = decode(&bytes)?;
            let orphaned = match record.account {
                None => true,
                Some(account) => {
                    let key = account.to_string();
                    let bound_here = self
                        .bindings
                        .get(key.as_bytes())?
                        .is_some_and(|bound| bound.as_ref() == id.as_ref());
                    let has_secret = self.envelopes.contains_key(key.as_bytes())?
                        || self.legacy_secrets.contains_key(key.as_bytes())?;
                    !bound_here || !has_secret
                }
            };
            if orphaned {
                orphans.push((id, record.account));
            }
        }

        for (id, account) in &orphans {
            self.credentials.remove(id)?;
            if let Some(account) = account {
                let key = account.to_string();
                // Drop a dangling binding, but never one that moved on.
                self.bindings
                    .compare_and_swap(key.as_bytes(), Some(id.as_ref()), None as Option<&[u8]>)?
                    .ok();
            }
        }

        if !orphans.is_empty() {
            self.db.flush()?;
            info!(count = orphans.len(), "purged orphaned credentials");
        }
        Ok(orphans.len())
    }

    /// Accounts with a vault envelope or a legacy secret.
    pub fn accounts(&self) -> StorageResult<Vec<LedgerAddress>> {
        let mut out = Vec::new();
        for tree in [&self.envelopes, &self.legacy_secrets] {
            for key in tree.iter().keys() {
                let key = key?;
                let text = std::str::from_utf8(&key)
                    .map_err(|_| StorageError::Corrupt("account key is not UTF-8".into()))?;
                let account = LedgerAddress::parse(text)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                if !out.contains(&account) {
                    out.push(account);
                }
            }
        }
        Ok(out)
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
