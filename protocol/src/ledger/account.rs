//! Typed ledger account records.
//!
//! These are what the ledger client hands back: an account's sequence
//! number, subentry count and balance lines, plus transaction history
//! records. Everything the engine reads from the ledger passes through
//! these types; nothing is carried around as untyped JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::address::LedgerAddress;
use super::amount::Amount;

/// Which asset a balance line holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetKind {
    /// The ledger's native asset.
    Native,
    /// A credit asset identified by code and issuing account.
    Issued { code: String, issuer: LedgerAddress },
}

impl AssetKind {
    pub fn is_native(&self) -> bool {
        matches!(self, AssetKind::Native)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Native => f.write_str("native"),
            AssetKind::Issued { code, issuer } => write!(f, "{}:{}", code, issuer),
        }
    }
}

/// One asset position on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLine {
    pub asset: AssetKind,
    pub amount: Amount,
    #[serde(default)]
    pub buying_liabilities: Amount,
    #[serde(default)]
    pub selling_liabilities: Amount,
}

impl BalanceLine {
    /// A native line with no open offers.
    pub fn native(amount: Amount) -> Self {
        Self {
            asset: AssetKind::Native,
            amount,
            buying_liabilities: Amount::ZERO,
            selling_liabilities: Amount::ZERO,
        }
    }
}

/// Raw account state as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub address: LedgerAddress,
    /// Sequence number of the last transaction the account submitted.
    pub sequence: i64,
    /// Trustlines, offers, signers and data entries owned by the account.
    pub subentry_count: u32,
    pub balances: Vec<BalanceLine>,
}

impl AccountState {
    /// The native balance line, if the ledger reported one.
    pub fn native_line(&self) -> Option<&BalanceLine> {
        self.balances.iter().find(|line| line.asset.is_native())
    }

    /// Balance lines for issued assets.
    pub fn issued_lines(&self) -> impl Iterator<Item = &BalanceLine> {
        self.balances.iter().filter(|line| !line.asset.is_native())
    }
}

/// One entry of an account's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub successful: bool,
    pub fee: Amount,
    pub created_at: DateTime<Utc>,
}
