//! # Transaction Intent
//!
//! What the user is authorizing, frozen before any authenticator prompt.
//!
//! ## Canonical JSON
//!
//! The intent body serializes with its fields in declaration order, which
//! is fixed and part of the wire format:
//!
//! ```text
//! kind, source, destination, amount, asset, memo, timestamp
//! ```
//!
//! The canonical form wraps that body with its own digest in front:
//!
//! ```text
//! {"digest":"<base64url(sha256(body))>","intent":<body>}
//! ```
//!
//! The challenge is the first 32 bytes of the canonical form: 11 bytes of
//! `{"digest":"` and 21 base64url characters, i.e. 126 bits of a hash over
//! every byte of the body. Changing any byte of the intent changes the
//! challenge.
//!
//! `timestamp` is taken once, when the intent is created, and the frozen
//! JSON is reused verbatim by the challenge, the proof request and the
//! execution request.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MAX_MEMO_LENGTH;
use crate::crypto::sha256;
use crate::ledger::{AddressError, Amount, LedgerAddress};

/// Asset identifier used in intents for the native asset.
pub const NATIVE_ASSET: &str = "native";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("invalid destination: {0}")]
    Destination(#[from] AddressError),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Amount),

    #[error("memo is {0} bytes, limit is {MAX_MEMO_LENGTH}")]
    MemoTooLong(usize),

    #[error("destination equals source")]
    SelfPayment,

    #[error("deposit has no contract id")]
    MissingContract,

    #[error("expected a {expected:?} intent, got {got:?}")]
    KindMismatch { expected: IntentKind, got: IntentKind },

    #[error("intent serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Payment,
    Deposit,
}

/// A payment or deposit the user is about to authorize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub kind: IntentKind,
    pub source: LedgerAddress,
    /// Ledger address for payments, contract id for deposits.
    pub destination: String,
    pub amount: Amount,
    /// [`NATIVE_ASSET`] or an asset contract id.
    pub asset: String,
    pub memo: Option<String>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl TransactionIntent {
    /// A payment intent stamped with the current time.
    pub fn payment(source: LedgerAddress, destination: &str, amount: Amount) -> Self {
        Self {
            kind: IntentKind::Payment,
            source,
            destination: destination.trim().to_string(),
            amount,
            asset: NATIVE_ASSET.to_string(),
            memo: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// A deposit into the contract `contract_id`, stamped now.
    pub fn deposit(source: LedgerAddress, contract_id: &str, amount: Amount, asset: &str) -> Self {
        Self {
            kind: IntentKind::Deposit,
            source,
            destination: contract_id.to_string(),
            amount,
            asset: asset.to_string(),
            memo: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = asset.into();
        self
    }

    /// Override the timestamp. Replaying a stored intent is the only
    /// legitimate use.
    pub fn at(mut self, timestamp_millis: i64) -> Self {
        self.timestamp = timestamp_millis;
        self
    }

    /// The payment destination as a ledger address.
    pub fn destination_address(&self) -> Result<LedgerAddress, IntentError> {
        Ok(LedgerAddress::parse(&self.destination)?)
    }

    pub fn is_native(&self) -> bool {
        self.asset == NATIVE_ASSET
    }

    /// Field checks shared by both paths.
    pub fn validate(&self) -> Result<(), IntentError> {
        if !self.amount.is_positive() {
            return Err(IntentError::NonPositiveAmount(self.amount));
        }
        if let Some(memo) = &self.memo {
            if memo.len() > MAX_MEMO_LENGTH {
                return Err(IntentError::MemoTooLong(memo.len()));
            }
        }
        match self.kind {
            IntentKind::Payment => {
                if self.destination_address()? == self.source {
                    return Err(IntentError::SelfPayment);
                }
            }
            IntentKind::Deposit => {
                if self.destination.trim().is_empty() {
                    return Err(IntentError::MissingContract);
                }
            }
        }
        Ok(())
    }

    /// Validate and serialize once. Every later step uses the result.
    pub fn freeze(self) -> Result<FrozenIntent, IntentError> {
        self.validate()?;
        let body =
            serde_json::to_string(&self).map_err(|e| IntentError::Serialization(e.to_string()))?;
        let digest = URL_SAFE_NO_PAD.encode(sha256(body.as_bytes()));
        let json = format!(r#"{{"digest":"{digest}","intent":{body}}}"#);
        Ok(FrozenIntent { intent: self, json })
    }
}

/// An intent together with its canonical JSON. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenIntent {
    intent: TransactionIntent,
    json: String,
}

impl FrozenIntent {
    pub fn intent(&self) -> &TransactionIntent {
        &self.intent
    }

    /// The canonical JSON, byte-for-byte what the challenge covers.
    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn timestamp(&self) -> i64 {
        self.intent.timestamp
    }
}
