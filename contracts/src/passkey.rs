//! Software P-256 passkey.
//!
//! Produces real WebAuthn assertions from an in-memory key, so the engine
//! and the contract can be exercised end to end without hardware. Never
//! use it to protect real funds.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use lumen_protocol::auth::{Authenticator, AuthenticatorAssertion, AuthenticatorError};
use lumen_protocol::config::{AUTH_DATA_FLAG_UP, AUTH_DATA_FLAG_UV, CHALLENGE_LENGTH, WEBAUTHN_GET_TYPE};
use lumen_protocol::vault::AuthenticatorCredential;

use crate::webauthn::signed_message;

pub struct SoftwarePasskey {
    credential_id: String,
    rp_id: String,
    key: SigningKey,
    sign_count: AtomicU32,
}

impl SoftwarePasskey {
    pub fn generate(credential_id: impl Into<String>, rp_id: impl Into<String>) -> Self {
        Self {
            credential_id: credential_id.into(),
            rp_id: rp_id.into(),
            key: SigningKey::random(&mut OsRng),
            sign_count: AtomicU32::new(0),
        }
    }

    /// Uncompressed SEC1 public key, 65 bytes.
    pub fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn rp_id_hash(&self) -> [u8; 32] {
        Sha256::digest(self.rp_id.as_bytes()).into()
    }

    /// The credential record the engine stores for this passkey.
    pub fn credential(&self) -> AuthenticatorCredential {
        AuthenticatorCredential::new(self.credential_id.clone(), self.public_key(), "software")
    }

    fn authenticator_data(&self) -> Vec<u8> {
        let counter = self.sign_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&self.rp_id_hash());
        data.push(AUTH_DATA_FLAG_UP | AUTH_DATA_FLAG_UV);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }
}

#[async_trait]
impl Authenticator for SoftwarePasskey {
    async fn get_assertion(
        &self,
        credential_id: &str,
        challenge: &[u8; CHALLENGE_LENGTH],
    ) -> Result<AuthenticatorAssertion, AuthenticatorError> {
        if credential_id != self.credential_id {
            return Err(AuthenticatorError::UnknownCredential(credential_id.to_string()));
        }
        let client_data_json = serde_json::json!({
            "type": WEBAUTHN_GET_TYPE,
            "challenge": URL_SAFE_NO_PAD.encode(challenge),
            "origin": format!("https://{}", self.rp_id),
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes();
        let authenticator_data = self.authenticator_data();
        let signature: Signature = self.key.sign(&signed_message(&authenticator_data, &client_data_json));

        Ok(AuthenticatorAssertion {
            credential_id: self.credential_id.clone(),
            signature: signature.to_bytes().to_vec(),
            authenticator_data,
            client_data_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_protocol::auth::verify_binding;

    #[tokio::test]
    async fn assertion_binds_and_verifies() {
        let passkey = SoftwarePasskey::generate("sw-1", "wallet.example");
        let payload = [9u8; 48];
        let challenge: [u8; CHALLENGE_LENGTH] = payload[..CHALLENGE_LENGTH].try_into().unwrap();

        let assertion = passkey.get_assertion("sw-1", &challenge).await.unwrap();
        verify_binding(&assertion, &challenge).unwrap();

        let sig_data = crate::webauthn::WebAuthnSigData {
            signature: assertion.signature,
            authenticator_data: assertion.authenticator_data,
            client_data: assertion.client_data_json,
        };
        crate::webauthn::verify(&payload, &passkey.public_key(), &sig_data).unwrap();
    }

    #[tokio::test]
    async fn unknown_credential_is_refused() {
        let passkey = SoftwarePasskey::generate("sw-1", "wallet.example");
        let err = passkey.get_assertion("other", &[0u8; 32]).await.unwrap_err();
        assert_eq!(err, AuthenticatorError::UnknownCredential("other".into()));
    }

    #[tokio::test]
    async fn counter_advances_per_assertion() {
        let passkey = SoftwarePasskey::generate("sw-1", "wallet.example");
        let a = passkey.get_assertion("sw-1", &[1u8; 32]).await.unwrap();
        let b = passkey.get_assertion("sw-1", &[1u8; 32]).await.unwrap();
        assert_eq!(&a.authenticator_data[33..], &1u32.to_be_bytes());
        assert_eq!(&b.authenticator_data[33..], &2u32.to_be_bytes());
        assert_eq!(a.credential_id, "sw-1");
    }
}
