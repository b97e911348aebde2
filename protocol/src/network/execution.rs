//! Remote execution endpoint, execution-network RPC and proof service.
//!
//! These are the three collaborators of the vault-backed flow. The engine
//! treats the proof artifact as opaque: it is requested, carried, and
//! forwarded, never interpreted.
//!
//! ```text
//! ProofService       (public_key, secret, intent_json) -> ProofArtifact
//! ExecutionEndpoint  ExecutionRequest -> ExecutionResponse
//! ExecutionRpc       hash -> ExecutionStatus, (account, asset) -> balance
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::auth::AuthenticatorAssertion;
use crate::crypto::LedgerKeypair;
use crate::ledger::{Amount, LedgerAddress};
use crate::vault::AuthenticatorCredential;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("execution endpoint rejected the request: {0}")]
    Rejected(String),

    #[error("execution failed on chain: {0}")]
    Failed(String),

    #[error("execution network unavailable: {0}")]
    Unavailable(String),

    #[error("proof generation failed: {0}")]
    Proof(String),
}

// ---------------------------------------------------------------------------
// Proof artifact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub proof_hash: String,
    pub challenge: String,
    pub timestamp: i64,
    pub nonce: String,
}

#[async_trait]
pub trait ProofService: Send + Sync {
    /// `secret` is `None` on the vault path: only the legacy path forwards
    /// plaintext key material.
    async fn generate(
        &self,
        public_key: &LedgerAddress,
        secret: Option<&str>,
        intent_json: &str,
    ) -> Result<ProofArtifact, ExecutionError>;
}

// ---------------------------------------------------------------------------
// Execution request / response
// ---------------------------------------------------------------------------

/// One authorized request. Built once per flow and submitted once.
#[derive(Clone)]
pub struct ExecutionRequest {
    pub contract_id: String,
    pub account: LedgerAddress,
    pub intent_json: String,
    pub credential_id: String,
    /// Base64 of the raw assertion fields.
    pub authenticator_data: String,
    pub client_data_json: String,
    pub signature: String,
    pub proof: ProofArtifact,
    /// Hex Ed25519 signature of `intent_json` by the account key.
    pub intent_signature: String,
    /// Only set for wallets still on the legacy secret store.
    pub legacy_secret: Option<Zeroizing<String>>,
}

impl ExecutionRequest {
    pub fn new(
        contract_id: impl Into<String>,
        account: LedgerAddress,
        intent_json: &str,
        assertion: &AuthenticatorAssertion,
        proof: ProofArtifact,
    ) -> Self {
        Self {
            contract_id: contract_id.into(),
            account,
            intent_json: intent_json.to_string(),
            credential_id: assertion.credential_id.clone(),
            authenticator_data: STANDARD.encode(&assertion.authenticator_data),
            client_data_json: STANDARD.encode(&assertion.client_data_json),
            signature: STANDARD.encode(&assertion.signature),
            proof,
            intent_signature: String::new(),
            legacy_secret: None,
        }
    }

    /// Sign the intent JSON with the recovered account key.
    pub fn signed_by(mut self, keypair: &LedgerKeypair) -> Self {
        self.intent_signature = hex::encode(keypair.sign(self.intent_json.as_bytes()));
        self
    }

    pub fn with_legacy_secret(mut self, secret: Zeroizing<String>) -> Self {
        self.legacy_secret = Some(secret);
        self
    }
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("contract_id", &self.contract_id)
            .field("account", &self.account)
            .field("credential_id", &self.credential_id)
            .field("proof_hash", &self.proof.proof_hash)
            .field("legacy_secret", &self.legacy_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Pending,
    NotFound,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExecutionEndpoint: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ExecutionError>;

    /// Register the credential's public key as a signer for `account`.
    async fn register_signer(
        &self,
        account: &LedgerAddress,
        credential: &AuthenticatorCredential,
    ) -> Result<(), ExecutionError>;
}

#[async_trait]
pub trait ExecutionRpc: Send + Sync {
    async fn transaction_status(&self, hash: &str) -> Result<ExecutionStatus, ExecutionError>;

    /// Logical balance the contract holds for `account` in `asset`.
    async fn contract_balance(
        &self,
        account: &LedgerAddress,
        asset: &str,
    ) -> Result<Amount, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_signature_verifies_against_account() {
        let kp = LedgerKeypair::generate();
        let assertion = AuthenticatorAssertion {
            credential_id: "cred".into(),
            signature: vec![1; 64],
            authenticator_data: vec![0; 37],
            client_data_json: b"{}".to_vec(),
        };
        let proof = ProofArtifact {
            proof_hash: "ph".into(),
            challenge: "c".into(),
            timestamp: 1,
            nonce: "n".into(),
        };
        let req = ExecutionRequest::new("C1", kp.address(), r#"{"digest":"x"}"#, &assertion, proof).signed_by(&kp);
        let sig = hex::decode(&req.intent_signature).unwrap();
        assert!(crate::crypto::verify_signature(
            &kp.public_key_bytes(),
            req.intent_json.as_bytes(),
            &sig
        ));
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&ExecutionStatus::NotFound).unwrap();
        assert_eq!(json, "\"NOT_FOUND\"");
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
    }

    #[test]
    fn request_debug_redacts_secret() {
        let assertion = AuthenticatorAssertion {
            credential_id: "cred".into(),
            signature: vec![1; 64],
            authenticator_data: vec![0; 37],
            client_data_json: b"{}".to_vec(),
        };
        let proof = ProofArtifact {
            proof_hash: "ph".into(),
            challenge: "c".into(),
            timestamp: 1,
            nonce: "n".into(),
        };
        let req = ExecutionRequest::new("C1", LedgerAddress::from_public_key([1; 32]), "{}", &assertion, proof)
            .with_legacy_secret(Zeroizing::new("deadbeef".into()));
        let dbg = format!("{req:?}");
        assert!(req.intent_signature.is_empty());
        assert!(!dbg.contains("deadbeef"));
        assert!(dbg.contains("<redacted>"));
    }
}
