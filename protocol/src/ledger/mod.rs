//! # Ledger Model
//!
//! What the engine knows about the external ledger, expressed as types:
//!
//! ```text
//! address.rs - Bech32 account addresses
//! amount.rs  - exact seven-decimal amounts in stroops
//! account.rs - account state, balance lines, history records
//! balance.rs - reserve/liability-aware spendable balance
//! ```
//!
//! The engine never keeps a local copy of ledger state. Everything here is
//! a view of one fresh read.

pub mod account;
pub mod address;
pub mod amount;
pub mod balance;

pub use account::{AccountState, AssetKind, BalanceLine, TransactionRecord};
pub use address::{AddressError, LedgerAddress};
pub use amount::{Amount, AmountError};
pub use balance::{check_payment, BalanceError, BalanceSnapshot, SpendableBalance};
