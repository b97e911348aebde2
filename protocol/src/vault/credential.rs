//! Authenticator credential records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerAddress;

/// A platform or roaming authenticator credential registered with this
/// wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorCredential {
    /// Opaque credential handle, base64url as the authenticator reports it.
    pub id: String,
    /// Attested public key (uncompressed SEC1 P-256 for passkeys).
    pub public_key: Vec<u8>,
    /// Signature counter last seen.
    pub counter: u32,
    /// e.g. `"platform"`, `"cross-platform"`, `"multiDevice"`.
    pub device_type: String,
    pub created_at: DateTime<Utc>,
}

impl AuthenticatorCredential {
    pub fn new(id: impl Into<String>, public_key: Vec<u8>, device_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            public_key,
            counter: 0,
            device_type: device_type.into(),
            created_at: Utc::now(),
        }
    }
}

/// How a credential sits in the store: with the account it is bound to,
/// or `None` when orphaned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBinding {
    pub credential: AuthenticatorCredential,
    pub account: Option<LedgerAddress>,
}
