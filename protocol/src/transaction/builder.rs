//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] starts from a freshly loaded account
//! sequence and produces an unsigned [`LedgerTransaction`] with
//! `sequence = account_sequence + 1`, one base fee per operation, and a
//! validity window ending `window` after `now`.
//!
//! The builder does not sign; that happens in [`super::signing`], which
//! keeps construction testable without key material.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::types::{Memo, Operation, OperationBody, TimeBounds};
use crate::config::MAX_MEMO_LENGTH;
use crate::crypto::{sha256, sha256_concat};
use crate::ledger::{Amount, LedgerAddress};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("transaction has no operations")]
    NoOperations,

    #[error("memo is {0} bytes, limit is {MAX_MEMO_LENGTH}")]
    MemoTooLong(usize),

    #[error("operation amount must be positive")]
    NonPositiveAmount,

    #[error("account sequence {0} cannot be incremented")]
    SequenceOverflow(i64),

    #[error("fee overflow")]
    FeeOverflow,

    #[error("signed sequence {signed} does not follow account sequence {account}")]
    SequenceMismatch { account: i64, signed: i64 },

    #[error("signer {signer} is not the transaction source {expected}")]
    SignerMismatch {
        expected: LedgerAddress,
        signer: LedgerAddress,
    },
}

// ---------------------------------------------------------------------------
// LedgerTransaction
// ---------------------------------------------------------------------------

/// An unsigned ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub source: LedgerAddress,
    /// Total fee in stroops.
    pub fee: i64,
    pub sequence: i64,
    pub time_bounds: TimeBounds,
    pub memo: Memo,
    pub operations: Vec<Operation>,
}

impl LedgerTransaction {
    /// Canonical byte form: fixed-width big-endian integers, length-prefixed
    /// variable fields.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + 80 * self.operations.len());
        buf.extend_from_slice(self.source.public_key());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.time_bounds.min_time.to_be_bytes());
        buf.extend_from_slice(&self.time_bounds.max_time.to_be_bytes());
        self.memo.write_canonical(&mut buf);
        buf.extend_from_slice(&(self.operations.len() as u32).to_be_bytes());
        for op in &self.operations {
            op.write_canonical(&mut buf);
        }
        buf
    }

    /// `sha256(sha256(passphrase) || signable_bytes)`. Binds the hash to one
    /// network.
    pub fn hash(&self, network_passphrase: &str) -> [u8; 32] {
        let network_id = sha256(network_passphrase.as_bytes());
        sha256_concat(&[&network_id, &self.signable_bytes()])
    }

    pub fn hash_hex(&self, network_passphrase: &str) -> String {
        hex::encode(self.hash(network_passphrase))
    }

    /// Sum of all operation amounts.
    pub fn total_amount(&self) -> Option<Amount> {
        self.operations
            .iter()
            .try_fold(Amount::ZERO, |acc, op| acc.checked_add(op.body.amount()))
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`LedgerTransaction`].
///
/// ```rust
/// use lumen_protocol::ledger::{Amount, LedgerAddress};
/// use lumen_protocol::transaction::TransactionBuilder;
/// use std::time::Duration;
///
/// let source = LedgerAddress::from_public_key([1u8; 32]);
/// let dest = LedgerAddress::from_public_key([2u8; 32]);
/// let tx = TransactionBuilder::new(source, 41)
///     .base_fee(100)
///     .payment(dest, Amount::from_units(5))
///     .validity_window(1_700_000_000, Duration::from_secs(180))
///     .build()
///     .unwrap();
/// assert_eq!(tx.sequence, 42);
/// ```
pub struct TransactionBuilder {
    source: LedgerAddress,
    account_sequence: i64,
    base_fee: i64,
    time_bounds: TimeBounds,
    memo: Memo,
    operations: Vec<Operation>,
}

impl TransactionBuilder {
    /// Start from the account's current sequence number.
    pub fn new(source: LedgerAddress, account_sequence: i64) -> Self {
        Self {
            source,
            account_sequence,
            base_fee: crate::config::BASE_FEE_STROOPS,
            time_bounds: TimeBounds {
                min_time: 0,
                max_time: 0,
            },
            memo: Memo::None,
            operations: Vec::new(),
        }
    }

    /// Fee per operation, in stroops.
    pub fn base_fee(mut self, stroops: i64) -> Self {
        self.base_fee = stroops;
        self
    }

    pub fn memo(mut self, memo: Memo) -> Self {
        self.memo = memo;
        self
    }

    /// Valid from `now` until `now + window`.
    pub fn validity_window(mut self, now_unix_secs: u64, window: Duration) -> Self {
        self.time_bounds = TimeBounds {
            min_time: 0,
            max_time: now_unix_secs.saturating_add(window.as_secs()),
        };
        self
    }

    pub fn payment(mut self, destination: LedgerAddress, amount: Amount) -> Self {
        self.operations.push(Operation::new(OperationBody::Payment {
            destination,
            amount,
        }));
        self
    }

    pub fn create_account(mut self, destination: LedgerAddress, starting_balance: Amount) -> Self {
        self.operations.push(Operation::new(OperationBody::CreateAccount {
            destination,
            starting_balance,
        }));
        self
    }

    /// Total fee this transaction will pay.
    pub fn fee(&self) -> Result<i64, BuildError> {
        let count = i64::try_from(self.operations.len().max(1)).map_err(|_| BuildError::FeeOverflow)?;
        self.base_fee.checked_mul(count).ok_or(BuildError::FeeOverflow)
    }

    pub fn build(self) -> Result<LedgerTransaction, BuildError> {
        if self.operations.is_empty() {
            return Err(BuildError::NoOperations);
        }
        if let Memo::Text(text) = &self.memo {
            if text.len() > MAX_MEMO_LENGTH {
                return Err(BuildError::MemoTooLong(text.len()));
            }
        }
        if self.operations.iter().any(|op| !op.body.amount().is_positive()) {
            return Err(BuildError::NonPositiveAmount);
        }
        let fee = self.fee()?;
        let sequence = self
            .account_sequence
            .checked_add(1)
            .ok_or(BuildError::SequenceOverflow(self.account_sequence))?;

        Ok(LedgerTransaction {
            source: self.source,
            fee,
            sequence,
            time_bounds: self.time_bounds,
            memo: self.memo,
            operations: self.operations,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NETWORK_PASSPHRASE_TESTNET;

    fn addr(b: u8) -> LedgerAddress {
        LedgerAddress::from_public_key([b; 32])
    }

    fn sample_tx() -> LedgerTransaction {
        TransactionBuilder::new(addr(1), 100)
            .base_fee(100)
            .payment(addr(2), Amount::from_units(10))
            .validity_window(1_700_000_000, Duration::from_secs(180))
            .build()
            .unwrap()
    }

    #[test]
    fn sequence_is_account_plus_one() {
        assert_eq!(sample_tx().sequence, 101);
    }

    #[test]
    fn operation_source_left_unset() {
        assert!(sample_tx().operations.iter().all(|op| op.source.is_none()));
    }

    #[test]
    fn validity_window_applied() {
        let tx = sample_tx();
        assert_eq!(tx.time_bounds.max_time, 1_700_000_180);
        assert!(tx.time_bounds.contains(1_700_000_100));
        assert!(!tx.time_bounds.contains(1_700_000_181));
    }

    #[test]
    fn fee_scales_with_operations() {
        let tx = TransactionBuilder::new(addr(1), 0)
            .base_fee(100)
            .payment(addr(2), Amount::from_units(1))
            .create_account(addr(3), Amount::from_units(2))
            .build()
            .unwrap();
        assert_eq!(tx.fee, 200);
        assert_eq!(tx.total_amount(), Some(Amount::from_units(3)));
    }

    #[test]
    fn hash_is_deterministic_and_network_bound() {
        let tx = sample_tx();
        assert_eq!(tx.hash(NETWORK_PASSPHRASE_TESTNET), sample_tx().hash(NETWORK_PASSPHRASE_TESTNET));
        assert_ne!(tx.hash(NETWORK_PASSPHRASE_TESTNET), tx.hash("other network"));
        assert_eq!(tx.hash_hex(NETWORK_PASSPHRASE_TESTNET).len(), 64);
    }

    #[test]
    fn different_sequence_different_hash() {
        let a = sample_tx();
        let mut b = sample_tx();
        b.sequence += 1;
        assert_ne!(a.hash(NETWORK_PASSPHRASE_TESTNET), b.hash(NETWORK_PASSPHRASE_TESTNET));
    }

    #[test]
    fn rejects_empty_and_invalid() {
        assert_eq!(
            TransactionBuilder::new(addr(1), 0).build().unwrap_err(),
            BuildError::NoOperations
        );
        assert_eq!(
            TransactionBuilder::new(addr(1), 0)
                .payment(addr(2), Amount::ZERO)
                .build()
                .unwrap_err(),
            BuildError::NonPositiveAmount
        );
        assert!(matches!(
            TransactionBuilder::new(addr(1), 0)
                .payment(addr(2), Amount::from_units(1))
                .memo(Memo::text("x".repeat(MAX_MEMO_LENGTH + 1)))
                .build(),
            Err(BuildError::MemoTooLong(_))
        ));
        assert_eq!(
            TransactionBuilder::new(addr(1), i64::MAX)
                .payment(addr(2), Amount::from_units(1))
                .build()
                .unwrap_err(),
            BuildError::SequenceOverflow(i64::MAX)
        );
    }

    #[test]
    fn transaction_json_roundtrip() {
        let tx = sample_tx();
        let json = serde_json::to_string(&tx).unwrap();
        let recovered: LedgerTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, recovered);
    }
}
