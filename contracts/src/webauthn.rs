//! # WebAuthn Verifier
//!
//! Verifies a WebAuthn authentication assertion against a P-256 passkey
//! and a signature payload. The first 32 bytes of the payload are the
//! challenge the authenticator must have signed.
//!
//! ## Verification Steps
//!
//! 1. `clientDataJSON` is at most 1024 bytes and parses as JSON.
//! 2. `type` is `"webauthn.get"`.
//! 3. `challenge` equals base64url (no padding) of `payload[..32]`.
//! 4. `authenticatorData` is at least 37 bytes.
//! 5. User Present and User Verified are set; Backup State is never set
//!    without Backup Eligible.
//! 6. ECDSA P-256 over `sha256(authenticatorData || sha256(clientDataJSON))`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use lumen_protocol::config::{
    ASSERTION_SIGNATURE_LENGTH, AUTHENTICATOR_DATA_MIN_LEN, AUTH_DATA_FLAGS_OFFSET, AUTH_DATA_FLAG_BE,
    AUTH_DATA_FLAG_BS, AUTH_DATA_FLAG_UP, AUTH_DATA_FLAG_UV, CHALLENGE_LENGTH, CLIENT_DATA_MAX_LEN,
    WEBAUTHN_GET_TYPE,
};

/// Uncompressed SEC1 P-256 public key length.
pub const PASSKEY_PUBLIC_KEY_LENGTH: usize = 65;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebAuthnError {
    #[error("signature payload shorter than the 32-byte challenge")]
    SignaturePayloadInvalid,

    #[error("client data exceeds 1024 bytes")]
    ClientDataTooLong,

    #[error("client data is not valid JSON: {0}")]
    JsonParse(String),

    #[error("client data type is {0:?}, expected webauthn.get")]
    TypeFieldInvalid(String),

    #[error("client data challenge does not match the signature payload")]
    ChallengeInvalid,

    #[error("authenticator data shorter than 37 bytes")]
    AuthDataFormatInvalid,

    #[error("user present flag not set")]
    PresentBitNotSet,

    #[error("user verified flag not set")]
    VerifiedBitNotSet,

    #[error("backup state set without backup eligibility")]
    BackupStateWithoutEligibility,

    #[error("passkey public key is not a valid P-256 point")]
    PublicKeyInvalid,

    #[error("signature must be 64 raw bytes")]
    SignatureLengthInvalid,

    #[error("passkey signature does not verify")]
    SignatureInvalid,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The raw pieces of one assertion, as submitted to the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnSigData {
    /// Raw `r || s`.
    pub signature: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub client_data: Vec<u8>,
}

#[derive(Deserialize)]
struct ClientDataJson<'a> {
    #[serde(rename = "type")]
    type_field: &'a str,
    challenge: &'a str,
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Run every check in order; the first failure wins.
pub fn verify(signature_payload: &[u8], public_key: &[u8], sig_data: &WebAuthnSigData) -> Result<(), WebAuthnError> {
    if sig_data.client_data.len() > CLIENT_DATA_MAX_LEN {
        return Err(WebAuthnError::ClientDataTooLong);
    }
    let client: ClientDataJson<'_> =
        serde_json::from_slice(&sig_data.client_data).map_err(|e| WebAuthnError::JsonParse(e.to_string()))?;

    if client.type_field != WEBAUTHN_GET_TYPE {
        return Err(WebAuthnError::TypeFieldInvalid(client.type_field.to_string()));
    }
    validate_challenge(client.challenge, signature_payload)?;
    validate_flags(&sig_data.authenticator_data)?;
    verify_signature(public_key, sig_data)
}

fn validate_challenge(challenge: &str, signature_payload: &[u8]) -> Result<(), WebAuthnError> {
    let prefix = signature_payload
        .get(..CHALLENGE_LENGTH)
        .ok_or(WebAuthnError::SignaturePayloadInvalid)?;
    if challenge.as_bytes() != URL_SAFE_NO_PAD.encode(prefix).as_bytes() {
        return Err(WebAuthnError::ChallengeInvalid);
    }
    Ok(())
}

fn validate_flags(authenticator_data: &[u8]) -> Result<(), WebAuthnError> {
    if authenticator_data.len() < AUTHENTICATOR_DATA_MIN_LEN {
        return Err(WebAuthnError::AuthDataFormatInvalid);
    }
    let flags = authenticator_data[AUTH_DATA_FLAGS_OFFSET];
    if flags & AUTH_DATA_FLAG_UP == 0 {
        return Err(WebAuthnError::PresentBitNotSet);
    }
    if flags & AUTH_DATA_FLAG_UV == 0 {
        return Err(WebAuthnError::VerifiedBitNotSet);
    }
    if flags & AUTH_DATA_FLAG_BE == 0 && flags & AUTH_DATA_FLAG_BS != 0 {
        return Err(WebAuthnError::BackupStateWithoutEligibility);
    }
    Ok(())
}

fn verify_signature(public_key: &[u8], sig_data: &WebAuthnSigData) -> Result<(), WebAuthnError> {
    if public_key.len() != PASSKEY_PUBLIC_KEY_LENGTH {
        return Err(WebAuthnError::PublicKeyInvalid);
    }
    let key = VerifyingKey::from_sec1_bytes(public_key).map_err(|_| WebAuthnError::PublicKeyInvalid)?;
    if sig_data.signature.len() != ASSERTION_SIGNATURE_LENGTH {
        return Err(WebAuthnError::SignatureLengthInvalid);
    }
    let signature = Signature::from_slice(&sig_data.signature).map_err(|_| WebAuthnError::SignatureInvalid)?;
    // Authenticators are free to emit high-S signatures.
    let signature = signature.normalize_s().unwrap_or(signature);

    key.verify(&signed_message(&sig_data.authenticator_data, &sig_data.client_data), &signature)
        .map_err(|_| WebAuthnError::SignatureInvalid)
}

/// `authenticatorData || sha256(clientDataJSON)`. ECDSA hashes it once more.
pub fn signed_message(authenticator_data: &[u8], client_data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(authenticator_data.len() + 32);
    message.extend_from_slice(authenticator_data);
    message.extend_from_slice(&Sha256::digest(client_data));
    message
}
