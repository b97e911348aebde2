//! # Auth Module: Challenge Binder
//!
//! Proves that what the user approved on the authenticator and what gets
//! executed are the same bytes.
//!
//! ```text
//! intent.rs    - TransactionIntent, frozen once into canonical JSON
//! challenge.rs - 32-byte challenge derivation + binding verification
//! assertion.rs - AuthenticatorAssertion, the Authenticator capability
//! ```

pub mod assertion;
pub mod challenge;
pub mod intent;

pub use assertion::{Authenticator, AuthenticatorAssertion, AuthenticatorError};
pub use challenge::{check_authenticator_data, derive_challenge, encode_challenge, verify_binding, BindingError};
pub use intent::{FrozenIntent, IntentError, IntentKind, TransactionIntent, NATIVE_ASSET};
