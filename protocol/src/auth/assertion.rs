//! Authenticator assertions and the capability that produces them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CHALLENGE_LENGTH;

/// One authenticator response, bound to one challenge. Never reused
/// across attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorAssertion {
    pub credential_id: String,
    /// Raw `r || s`.
    pub signature: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticatorError {
    #[error("user cancelled the authenticator prompt")]
    Cancelled,

    #[error("authenticator does not know credential {0}")]
    UnknownCredential(String),

    #[error("authenticator unavailable: {0}")]
    Unavailable(String),
}

/// A local platform or roaming authenticator. Opaque to the engine: it
/// signs whatever challenge it is handed.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn get_assertion(
        &self,
        credential_id: &str,
        challenge: &[u8; CHALLENGE_LENGTH],
    ) -> Result<AuthenticatorAssertion, AuthenticatorError>;
}
