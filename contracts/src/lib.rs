// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lumen Wallet Contracts
//!
//! In-process model of the remote side of the vault-backed flow:
//!
//! - **WebAuthn Verifier**: assertion checks and P-256 signature
//!   verification against a signature payload.
//! - **Smart Wallet**: passkey signer registry and custodial per-account
//!   balances, moved only with a verified assertion.
//! - **Endpoint**: adapter exposing the contract as the engine's
//!   execution endpoint, execution RPC and proof service.
//! - **Passkey**: a software P-256 authenticator for tests and demos.
//!
//! ## Design Principles
//!
//! 1. All balance arithmetic is checked; overflow is an error, never a wrap.
//! 2. Every balance movement is gated by a verified assertion whose
//!    challenge is the first 32 bytes of the exact payload executed.
//! 3. Failures are typed, never booleans.

pub mod endpoint;
pub mod passkey;
pub mod smart_wallet;
pub mod webauthn;

pub use endpoint::{ContractExecutionEndpoint, HashCommitmentProofs};
pub use passkey::SoftwarePasskey;
pub use smart_wallet::{ContractError, Holder, SmartWalletContract};
pub use webauthn::{WebAuthnError, WebAuthnSigData};
