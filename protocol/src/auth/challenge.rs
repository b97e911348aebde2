//! # Challenge Binding
//!
//! Ties an authenticator response to the exact intent bytes the user
//! approved, without a challenge-negotiation round trip.
//!
//! ```text
//! challenge = canonical_json[..32], zero-padded to 32 bytes
//! bound     = b64url(client_data.challenge decoded) == b64url(challenge)
//! ```
//!
//! Before the challenge is compared, the assertion goes through the same
//! structural checks the on-chain verifier applies, so a response that
//! would be rejected remotely never leaves the client:
//!
//! 1. `clientDataJSON` at most 1024 bytes, valid JSON, `type` is
//!    `webauthn.get`.
//! 2. Authenticator data at least 37 bytes.
//! 3. User Present and User Verified flags set.
//! 4. Backup State never set without Backup Eligible.
//! 5. Signature exactly 64 bytes.
//!
//! A mismatch aborts the flow before any secret is recovered or any
//! network call is made. It is never retried: the same assertion cannot
//! match on a second try.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use thiserror::Error;
use tracing::error;

use super::assertion::AuthenticatorAssertion;
use crate::config::{
    ASSERTION_SIGNATURE_LENGTH, AUTHENTICATOR_DATA_MIN_LEN, AUTH_DATA_FLAGS_OFFSET,
    AUTH_DATA_FLAG_BE, AUTH_DATA_FLAG_BS, AUTH_DATA_FLAG_UP, AUTH_DATA_FLAG_UV, CHALLENGE_LENGTH,
    CLIENT_DATA_MAX_LEN, WEBAUTHN_GET_TYPE,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("authenticator challenge does not match the intent (expected {expected}, got {got})")]
    ChallengeMismatch { expected: String, got: String },

    #[error("client data is {0} bytes, limit is {CLIENT_DATA_MAX_LEN}")]
    ClientDataTooLong(usize),

    #[error("client data is not valid JSON: {0}")]
    ClientDataMalformed(String),

    #[error("client data type is {0:?}, expected {WEBAUTHN_GET_TYPE:?}")]
    WrongType(String),

    #[error("client data challenge is not base64url: {0}")]
    ChallengeEncoding(String),

    #[error("authenticator data is {0} bytes, minimum is {AUTHENTICATOR_DATA_MIN_LEN}")]
    AuthenticatorDataTooShort(usize),

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification flag not set")]
    UserNotVerified,

    #[error("backup state set without backup eligibility")]
    BackupStateWithoutEligibility,

    #[error("signature is {0} bytes, expected {ASSERTION_SIGNATURE_LENGTH}")]
    SignatureLength(usize),
}

impl BindingError {
    pub fn is_challenge_mismatch(&self) -> bool {
        matches!(self, BindingError::ChallengeMismatch { .. })
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// First 32 bytes of the UTF-8 intent JSON, right-padded with zeros.
pub fn derive_challenge(intent_json: &str) -> [u8; CHALLENGE_LENGTH] {
    let bytes = intent_json.as_bytes();
    let mut challenge = [0u8; CHALLENGE_LENGTH];
    let n = bytes.len().min(CHALLENGE_LENGTH);
    challenge[..n].copy_from_slice(&bytes[..n]);
    challenge
}

/// Unpadded base64url, the form WebAuthn puts in client data.
pub fn encode_challenge(challenge: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(challenge)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ClientData {
    #[serde(rename = "type")]
    kind: String,
    challenge: String,
}

/// Structural checks, then the challenge comparison.
pub fn verify_binding(
    assertion: &AuthenticatorAssertion,
    expected: &[u8; CHALLENGE_LENGTH],
) -> Result<(), BindingError> {
    let client_data = preflight(assertion)?;

    let decoded = URL_SAFE_NO_PAD
        .decode(&client_data.challenge)
        .map_err(|e| BindingError::ChallengeEncoding(e.to_string()))?;
    let got = encode_challenge(&decoded);
    let expected = encode_challenge(expected);

    if got != expected {
        error!(
            credential = %assertion.credential_id,
            security = true,
            "authenticator challenge mismatch; aborting before secret recovery"
        );
        return Err(BindingError::ChallengeMismatch { expected, got });
    }
    Ok(())
}

fn preflight(assertion: &AuthenticatorAssertion) -> Result<ClientData, BindingError> {
    let raw = &assertion.client_data_json;
    if raw.len() > CLIENT_DATA_MAX_LEN {
        return Err(BindingError::ClientDataTooLong(raw.len()));
    }
    let client_data: ClientData = serde_json::from_slice(raw)
        .map_err(|e| BindingError::ClientDataMalformed(e.to_string()))?;
    if client_data.kind != WEBAUTHN_GET_TYPE {
        return Err(BindingError::WrongType(client_data.kind));
    }

    check_authenticator_data(&assertion.authenticator_data)?;

    if assertion.signature.len() != ASSERTION_SIGNATURE_LENGTH {
        return Err(BindingError::SignatureLength(assertion.signature.len()));
    }
    Ok(client_data)
}

/// Length and flag checks on raw authenticator data.
pub fn check_authenticator_data(auth_data: &[u8]) -> Result<(), BindingError> {
    if auth_data.len() < AUTHENTICATOR_DATA_MIN_LEN {
        return Err(BindingError::AuthenticatorDataTooShort(auth_data.len()));
    }
    let flags = auth_data[AUTH_DATA_FLAGS_OFFSET];
    if flags & AUTH_DATA_FLAG_UP == 0 {
        return Err(BindingError::UserNotPresent);
    }
    if flags & AUTH_DATA_FLAG_UV == 0 {
        return Err(BindingError::UserNotVerified);
    }
    if flags & AUTH_DATA_FLAG_BE == 0 && flags & AUTH_DATA_FLAG_BS != 0 {
        return Err(BindingError::BackupStateWithoutEligibility);
    }
    Ok(())
}
