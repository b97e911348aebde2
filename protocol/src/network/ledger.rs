//! Direct-ledger client capability.
//!
//! The engine never speaks a wire protocol itself. Whatever transport the
//! host uses (Horizon-style REST, a local node, an in-memory test double)
//! implements [`LedgerClient`] and classifies its own failures into
//! [`SubmitError`] before handing them back.

use async_trait::async_trait;
use thiserror::Error;

use crate::ledger::{AccountState, LedgerAddress, TransactionRecord};
use crate::transaction::SignedTransaction;

/// Failures of read-only ledger queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger returned a malformed response: {0}")]
    Malformed(String),
}

/// Classified submission outcome. The orchestrator's retry policy keys
/// off these variants only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Signed sequence is stale.
    #[error("transaction sequence is stale")]
    BadSequence,

    /// Ledger says the source cannot cover amount plus fee.
    #[error("source account is underfunded")]
    Underfunded,

    /// No answer before the client-side deadline. The transaction may
    /// still have been applied.
    #[error("submission timed out")]
    Timeout,

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("network unavailable: {0}")]
    Network(String),
}

/// Outcome of a lookup by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerTxStatus {
    Applied,
    Failed,
    NotFound,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current account state; `None` when the account does not exist.
    async fn load_account(&self, account: &LedgerAddress) -> Result<Option<AccountState>, LedgerError>;

    /// Submit a signed transaction; returns the ledger's transaction hash.
    async fn submit(&self, tx: &SignedTransaction) -> Result<String, SubmitError>;

    async fn transaction_status(&self, hash: &str) -> Result<LedgerTxStatus, LedgerError>;

    /// Most recent first.
    async fn transactions(
        &self,
        account: &LedgerAddress,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;
}
