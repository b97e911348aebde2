//! # Engine Errors
//!
//! Every component error funnels into [`EngineError`]. Callers branch on
//! [`EngineError::kind`], a stable classification, and show the `Display`
//! text to users. Raw transport errors never surface unclassified.
//!
//! | Kind                | Retried by engine | Caller may retry |
//! |---------------------|-------------------|------------------|
//! | Validation          | no                | no (fix input)   |
//! | InsufficientFunds   | no                | no               |
//! | SequenceConflict    | yes, bounded      | yes              |
//! | UnderfundedRace     | after reload      | yes              |
//! | SubmissionTimeout   | polls first       | yes              |
//! | ChallengeMismatch   | never             | new ceremony     |
//! | VaultCorrupt        | never             | no (new wallet)  |
//! | AuthMismatch        | no                | yes (re-auth)    |
//! | NetworkUnavailable  | no                | yes              |

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::auth::{AuthenticatorError, BindingError, IntentError};
use crate::crypto::KeyError;
use crate::ledger::BalanceError;
use crate::network::{ExecutionError, LedgerError, SubmitError};
use crate::storage::StorageError;
use crate::transaction::BuildError;
use crate::vault::VaultError;

/// Stable, UI-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InsufficientFunds,
    SequenceConflict,
    UnderfundedRace,
    SubmissionTimeout,
    ChallengeMismatch,
    VaultCorrupt,
    AuthMismatch,
    NetworkUnavailable,
    MissingCredential,
    InvalidAssertion,
    TransactionRejected,
    ExecutionFailed,
    EncryptionError,
    DecryptionError,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::SequenceConflict => "sequence_conflict",
            ErrorKind::UnderfundedRace => "underfunded_race",
            ErrorKind::SubmissionTimeout => "submission_timeout",
            ErrorKind::ChallengeMismatch => "challenge_mismatch",
            ErrorKind::VaultCorrupt => "vault_corrupt",
            ErrorKind::AuthMismatch => "auth_mismatch",
            ErrorKind::NetworkUnavailable => "network_unavailable",
            ErrorKind::MissingCredential => "missing_credential",
            ErrorKind::InvalidAssertion => "invalid_assertion",
            ErrorKind::TransactionRejected => "transaction_rejected",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::EncryptionError => "encryption_error",
            ErrorKind::DecryptionError => "decryption_error",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the same operation, started again by the caller, can
    /// succeed without changing its inputs.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::SequenceConflict
                | ErrorKind::UnderfundedRace
                | ErrorKind::SubmissionTimeout
                | ErrorKind::AuthMismatch
                | ErrorKind::NetworkUnavailable
        )
    }

    /// Logged with `security = true`.
    pub fn is_security_relevant(self) -> bool {
        matches!(self, ErrorKind::ChallengeMismatch | ErrorKind::VaultCorrupt)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid intent: {0}")]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Balance(#[from] BalanceError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("authenticator: {0}")]
    Authenticator(#[from] AuthenticatorError),

    #[error("transaction build failed: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: SubmitError },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Intent(IntentError::Serialization(_)) => ErrorKind::Internal,
            EngineError::Intent(_) => ErrorKind::Validation,
            EngineError::Balance(e) if e.is_insufficient_funds() => ErrorKind::InsufficientFunds,
            EngineError::Balance(_) => ErrorKind::Validation,
            EngineError::Vault(e) => vault_kind(e),
            EngineError::Binding(e) if e.is_challenge_mismatch() => ErrorKind::ChallengeMismatch,
            EngineError::Binding(_) => ErrorKind::InvalidAssertion,
            EngineError::Authenticator(AuthenticatorError::UnknownCredential(_)) => {
                ErrorKind::MissingCredential
            }
            EngineError::Authenticator(_) => ErrorKind::AuthMismatch,
            EngineError::Build(BuildError::SequenceMismatch { .. })
            | EngineError::Build(BuildError::SignerMismatch { .. }) => ErrorKind::Internal,
            EngineError::Build(_) => ErrorKind::Validation,
            EngineError::Submit(e) | EngineError::RetriesExhausted { last: e, .. } => submit_kind(e),
            EngineError::Ledger(_) => ErrorKind::NetworkUnavailable,
            EngineError::Execution(e) => match e {
                ExecutionError::Rejected(_) => ErrorKind::TransactionRejected,
                ExecutionError::Failed(_) | ExecutionError::Proof(_) => ErrorKind::ExecutionFailed,
                ExecutionError::Unavailable(_) => ErrorKind::NetworkUnavailable,
            },
            EngineError::Storage(StorageError::CredentialInUse { .. }) => ErrorKind::Validation,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Key(_) => ErrorKind::Validation,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Human-readable detail for the UI layer.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

fn vault_kind(e: &VaultError) -> ErrorKind {
    match e {
        VaultError::Corrupt(_) => ErrorKind::VaultCorrupt,
        VaultError::AuthMismatch => ErrorKind::AuthMismatch,
        VaultError::Decryption => ErrorKind::DecryptionError,
        VaultError::Encryption(_) | VaultError::KeyDerivation(_) => ErrorKind::EncryptionError,
        VaultError::MissingCredential | VaultError::NoSecret => ErrorKind::MissingCredential,
        VaultError::Storage(StorageError::CredentialInUse { .. }) => ErrorKind::Validation,
        VaultError::Storage(_) => ErrorKind::Storage,
    }
}

fn submit_kind(e: &SubmitError) -> ErrorKind {
    match e {
        SubmitError::BadSequence => ErrorKind::SequenceConflict,
        SubmitError::Underfunded => ErrorKind::UnderfundedRace,
        SubmitError::Timeout => ErrorKind::SubmissionTimeout,
        SubmitError::Rejected(_) => ErrorKind::TransactionRejected,
        SubmitError::Network(_) => ErrorKind::NetworkUnavailable,
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
