//! Core type definitions for ledger transactions.
//!
//! These are the pieces a [`super::LedgerTransaction`] is made of. An
//! operation's `source` is `None` unless deliberately overridden, in which
//! case the ledger applies it to the transaction's source account. The
//! builder never sets it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::{Amount, LedgerAddress};

// ---------------------------------------------------------------------------
// Memo
// ---------------------------------------------------------------------------

/// Optional note attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Memo {
    #[default]
    None,
    Text(String),
    Id(u64),
}

impl Memo {
    pub fn text(value: impl Into<String>) -> Self {
        Memo::Text(value.into())
    }

    pub(crate) fn write_canonical(&self, buf: &mut Vec<u8>) {
        match self {
            Memo::None => buf.push(0x00),
            Memo::Text(text) => {
                buf.push(0x01);
                buf.extend_from_slice(&(text.len() as u32).to_be_bytes());
                buf.extend_from_slice(text.as_bytes());
            }
            Memo::Id(id) => {
                buf.push(0x02);
                buf.extend_from_slice(&id.to_be_bytes());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TimeBounds
// ---------------------------------------------------------------------------

/// Validity window, unix seconds. `max_time == 0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub min_time: u64,
    pub max_time: u64,
}

impl TimeBounds {
    pub fn contains(&self, unix_secs: u64) -> bool {
        unix_secs >= self.min_time && (self.max_time == 0 || unix_secs <= self.max_time)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationBody {
    /// Native payment to an existing account.
    Payment {
        destination: LedgerAddress,
        amount: Amount,
    },
    /// Fund a destination that does not exist yet.
    CreateAccount {
        destination: LedgerAddress,
        starting_balance: Amount,
    },
}

impl OperationBody {
    pub fn destination(&self) -> &LedgerAddress {
        match self {
            OperationBody::Payment { destination, .. }
            | OperationBody::CreateAccount { destination, .. } => destination,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            OperationBody::Payment { amount, .. } => *amount,
            OperationBody::CreateAccount {
                starting_balance, ..
            } => *starting_balance,
        }
    }
}

impl fmt::Display for OperationBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationBody::Payment { .. } => f.write_str("payment"),
            OperationBody::CreateAccount { .. } => f.write_str("create_account"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Leave `None`: the transaction source applies.
    pub source: Option<LedgerAddress>,
    pub body: OperationBody,
}

impl Operation {
    pub fn new(body: OperationBody) -> Self {
        Self { source: None, body }
    }

    pub(crate) fn write_canonical(&self, buf: &mut Vec<u8>) {
        match &self.source {
            Some(source) => {
                buf.push(0x01);
                buf.extend_from_slice(source.public_key());
            }
            None => buf.push(0x00),
        }
        match &self.body {
            OperationBody::Payment {
                destination,
                amount,
            } => {
                buf.push(0x01);
                buf.extend_from_slice(destination.public_key());
                buf.extend_from_slice(&amount.stroops().to_be_bytes());
            }
            OperationBody::CreateAccount {
                destination,
                starting_balance,
            } => {
                buf.push(0x00);
                buf.extend_from_slice(destination.public_key());
                buf.extend_from_slice(&starting_balance.stroops().to_be_bytes());
            }
        }
    }
}
