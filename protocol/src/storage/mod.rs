//! # Storage Module
//!
//! Local persistence for the wallet: vault envelopes, authenticator
//! credentials and their account bindings, and the deprecated plaintext
//! secrets of pre-vault wallets.
//!
//! ```text
//! db.rs - WalletDb, sled trees + atomic multi-tree writes
//! ```
//!
//! Bincode for on-disk records. JSON is for export and debugging.

pub mod db;

pub use db::{StorageError, StorageResult, WalletDb};
