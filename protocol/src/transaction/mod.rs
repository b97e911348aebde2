//! # Transaction Module
//!
//! Construction and signing of ledger transactions.
//!
//! ```text
//! types.rs   - Memo, TimeBounds, Operation and its bodies
//! builder.rs - LedgerTransaction + fluent TransactionBuilder
//! signing.rs - SignedTransaction, decorated signatures, sequence check
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build** from a freshly loaded account sequence with
//!    [`TransactionBuilder`]. The sequence is `account + 1`.
//! 2. **Sign** with [`sign_transaction`]; the hash is bound to the network
//!    passphrase.
//! 3. **Check** with [`check_sequence`] against the same snapshot. A
//!    mismatch is a builder bug and is never submitted.
//! 4. **Submit** the base64 envelope through a ledger client.

pub mod builder;
pub mod signing;
pub mod types;

pub use builder::{BuildError, LedgerTransaction, TransactionBuilder};
pub use signing::{check_sequence, sign_transaction, DecoratedSignature, SignedTransaction};
pub use types::{Memo, Operation, OperationBody, TimeBounds};
