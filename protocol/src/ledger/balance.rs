//! # Spendable Balance
//!
//! How much of the native asset an account can actually send. The raw
//! balance overstates it: part of it is locked as reserve and part is
//! promised to open offers.
//!
//! ```text
//! reserve            = (2 + subentries) * base_reserve
//! selling_constraint = available - selling_liabilities - reserve
//! buying_constraint  = available - buying_liabilities
//! spendable          = min(selling_constraint, buying_constraint)
//! ```
//!
//! A payment of `amount` with fee `fee` is permitted only when all three of
//! these hold. One combined check is not enough, because the two liability
//! kinds bound different legs of the operation:
//!
//! ```text
//! spendable          >= amount + fee
//! selling_constraint >= amount + fee
//! buying_constraint  >= amount
//! ```
//!
//! Everything is computed over exact stroop integers. A snapshot is
//! derived from a fresh account load and is never carried across a
//! build/submit boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::AccountState;
use super::amount::Amount;
use crate::config::{EngineConfig, BASE_RESERVE_ENTRY_COUNT};

/// Why a payment does not fit the account.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("insufficient spendable balance: spendable {spendable}, required {required}")]
    Spendable { spendable: Amount, required: Amount },

    #[error("payment would dip into the reserve or selling liabilities: available after constraints {constraint}, required {required}")]
    SellingConstraint { constraint: Amount, required: Amount },

    #[error("payment exceeds balance net of buying liabilities: available {constraint}, amount {amount}")]
    BuyingConstraint { constraint: Amount, amount: Amount },

    #[error("destination account does not exist; amount {amount} is below the account creation reserve {reserve}")]
    BelowCreationReserve { amount: Amount, reserve: Amount },

    #[error("amount arithmetic overflow")]
    Overflow,
}

impl BalanceError {
    /// Whether the failure is about the account's funds (as opposed to the
    /// amount being unacceptable for a new destination).
    pub fn is_insufficient_funds(&self) -> bool {
        !matches!(self, BalanceError::BelowCreationReserve { .. })
    }
}

/// The native-asset inputs to the spendable computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub available: Amount,
    pub buying_liabilities: Amount,
    pub selling_liabilities: Amount,
    pub subentry_count: u32,
    pub sequence_number: i64,
}

/// The derived constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendableBalance {
    pub reserve: Amount,
    pub selling_constraint: Amount,
    pub buying_constraint: Amount,
    pub spendable: Amount,
}

impl BalanceSnapshot {
    /// Snapshot an account. A missing native line counts as zero.
    pub fn from_account(account: &AccountState) -> Self {
        let (available, buying, selling) = account
            .native_line()
            .map(|l| (l.amount, l.buying_liabilities, l.selling_liabilities))
            .unwrap_or((Amount::ZERO, Amount::ZERO, Amount::ZERO));
        Self {
            available,
            buying_liabilities: buying,
            selling_liabilities: selling,
            subentry_count: account.subentry_count,
            sequence_number: account.sequence,
        }
    }

    /// Locked reserve for this account.
    pub fn reserve(&self, base_reserve: Amount) -> Amount {
        let entries = BASE_RESERVE_ENTRY_COUNT + i64::from(self.subentry_count);
        Amount::from_stroops(entries.saturating_mul(base_reserve.stroops()))
    }

    /// Compute all constraints. May be negative for accounts already below
    /// their reserve.
    pub fn spendable(&self, base_reserve: Amount) -> SpendableBalance {
        let reserve = self.reserve(base_reserve);
        let selling_constraint = self
            .available
            .saturating_sub(self.selling_liabilities)
            .saturating_sub(reserve);
        let buying_constraint = self.available.saturating_sub(self.buying_liabilities);
        SpendableBalance {
            reserve,
            selling_constraint,
            buying_constraint,
            spendable: selling_constraint.min(buying_constraint),
        }
    }
}

/// Check a native payment against a snapshot.
///
/// Returns the computed constraints on success so callers can log the
/// remaining margin.
pub fn check_payment(
    snapshot: &BalanceSnapshot,
    amount: Amount,
    fee: Amount,
    destination_exists: bool,
    config: &EngineConfig,
) -> Result<SpendableBalance, BalanceError> {
    if !destination_exists {
        let reserve = Amount::from_stroops(config.account_creation_reserve_stroops());
        if amount < reserve {
            return Err(BalanceError::BelowCreationReserve { amount, reserve });
        }
    }

    let base_reserve = Amount::from_stroops(config.base_reserve_stroops);
    let limits = snapshot.spendable(base_reserve);
    let required = amount.checked_add(fee).ok_or(BalanceError::Overflow)?;

    if limits.spendable < required {
        return Err(BalanceError::Spendable {
            spendable: limits.spendable,
            required,
        });
    }
    if limits.selling_constraint < required {
        return Err(BalanceError::SellingConstraint {
            constraint: limits.selling_constraint,
            required,
        });
    }
    if limits.buying_constraint < amount {
        return Err(BalanceError::BuyingConstraint {
            constraint: limits.buying_constraint,
            amount,
        });
    }
    Ok(limits)
}
