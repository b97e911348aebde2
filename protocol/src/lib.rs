// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lumen Protocol: Wallet Engine Core
//!
//! Authenticated transaction engine for a passkey-gated ledger wallet. It
//! decides how much an account can actually spend, keeps the signing secret
//! sealed behind the authenticator, proves that what the user approved is
//! what gets executed, and drives submissions to a terminal state with
//! bounded retries.
//!
//! ## Architecture
//!
//! - **ledger**: addresses, exact amounts, account records, spendable
//!   balance.
//! - **crypto**: Ed25519, AES-256-GCM, SHA-256 and BLAKE3 wrappers.
//! - **vault**: envelope-encrypted secret storage keyed off the
//!   authenticator credential.
//! - **auth**: transaction intents, challenge derivation and binding.
//! - **transaction**: ledger transaction building and signing.
//! - **network**: capabilities the host provides (ledger, execution
//!   endpoint, RPC, proof service).
//! - **orchestrator**: direct and vault-backed submission flows.
//! - **refresh**: background balance refresh.
//! - **storage**: sled-backed wallet store.
//! - **engine**: [`WalletEngine`], the entry point.
//! - **error**: [`EngineError`] and its stable [`ErrorKind`].
//! - **config**: protocol constants and [`EngineConfig`].
//!
//! ## Design Philosophy
//!
//! 1. Money is integers. Amounts are parsed once and never touch floats.
//! 2. A secret exists in memory for one signature, then it is gone.
//! 3. Every retry is bounded and every error is classified.
//! 4. If it touches money, it has tests.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod network;
pub mod orchestrator;
pub mod refresh;
pub mod storage;
pub mod transaction;
pub mod vault;

pub use config::EngineConfig;
pub use engine::{PaymentMode, WalletEngine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use orchestrator::SubmissionOutcome;
