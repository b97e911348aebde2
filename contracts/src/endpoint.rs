//! # Contract Execution Endpoint
//!
//! Adapter that serves the engine's vault-backed flow from an in-process
//! [`SmartWalletContract`]. It plays three roles:
//!
//! - [`ExecutionEndpoint`]: decode and authenticate a request, then invoke
//!   `deposit` or `execute_payment`.
//! - [`ExecutionRpc`]: report transaction status and logical balances.
//!   Accepted transactions stay `NOT_FOUND` for a configurable number of
//!   polls before turning `SUCCESS`.
//! - [`ProofService`] via [`HashCommitmentProofs`]: a hash commitment over
//!   the account and intent, which the endpoint recomputes.
//!
//! Request-level problems (malformed encoding, bad intent signature, proof
//! mismatch, wrong contract) are returned as `Err(Rejected)`. Failures
//! inside the contract come back as a `FAILED` response.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lumen_protocol::auth::{IntentKind, TransactionIntent, NATIVE_ASSET};
use lumen_protocol::crypto::{verify_signature, LedgerKeypair};
use lumen_protocol::ledger::{Amount, LedgerAddress};
use lumen_protocol::network::{
    ExecutionEndpoint, ExecutionError, ExecutionRequest, ExecutionResponse, ExecutionRpc, ExecutionStatus,
    ProofArtifact, ProofService,
};
use lumen_protocol::vault::AuthenticatorCredential;

use crate::smart_wallet::{Holder, SmartWalletContract};
use crate::webauthn::WebAuthnSigData;

// ---------------------------------------------------------------------------
// Proofs
// ---------------------------------------------------------------------------

/// `hex(sha256(public_key || intent_json))`.
pub fn commitment(account: &LedgerAddress, intent_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account.public_key());
    hasher.update(intent_json.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash-commitment proof service.
///
/// When a legacy secret is supplied it must belong to the account.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashCommitmentProofs;

#[async_trait]
impl ProofService for HashCommitmentProofs {
    async fn generate(
        &self,
        public_key: &LedgerAddress,
        secret: Option<&str>,
        intent_json: &str,
    ) -> Result<ProofArtifact, ExecutionError> {
        if let Some(secret) = secret {
            let keypair = LedgerKeypair::from_hex(secret).map_err(|e| ExecutionError::Proof(e.to_string()))?;
            if keypair.address() != *public_key {
                return Err(ExecutionError::Proof("secret does not match the account".into()));
            }
        }
        let nonce = Uuid::new_v4().to_string();
        Ok(ProofArtifact {
            proof_hash: commitment(public_key, intent_json),
            challenge: hex::encode(Sha256::digest(format!("{intent_json}{nonce}").as_bytes())),
            timestamp: chrono::Utc::now().timestamp(),
            nonce,
        })
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CanonicalIntent {
    intent: TransactionIntent,
}

pub struct ContractExecutionEndpoint {
    contract: Mutex<SmartWalletContract>,
    native_asset: String,
    rp_id_hash: [u8; 32],
    confirmation_lag: u32,
    /// Accepted hash -> remaining NOT_FOUND answers.
    pending: Mutex<HashMap<String, u32>>,
}

impl ContractExecutionEndpoint {
    /// `native_asset` is the contract-side id of the ledger's native asset.
    pub fn new(contract: SmartWalletContract, native_asset: impl Into<String>, rp_id: &str) -> Self {
        Self {
            contract: Mutex::new(contract),
            native_asset: native_asset.into(),
            rp_id_hash: Sha256::digest(rp_id.as_bytes()).into(),
            confirmation_lag: 0,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of status polls that answer `NOT_FOUND` before `SUCCESS`.
    /// With a non-zero lag `execute` answers `PENDING`.
    pub fn with_confirmation_lag(mut self, polls: u32) -> Self {
        self.confirmation_lag = polls;
        self
    }

    /// Run `f` against the contract state.
    pub fn with_contract<R>(&self, f: impl FnOnce(&mut SmartWalletContract) -> R) -> R {
        f(&mut self.contract.lock())
    }

    fn asset_id<'a>(&'a self, asset: &'a str) -> &'a str {
        if asset == NATIVE_ASSET {
            &self.native_asset
        } else {
            asset
        }
    }

    /// Decode and authenticate everything outside the contract's own checks.
    fn decode(&self, request: &ExecutionRequest) -> Result<(TransactionIntent, WebAuthnSigData), ExecutionError> {
        let rejected = |reason: String| ExecutionError::Rejected(reason);

        let canonical: CanonicalIntent =
            serde_json::from_str(&request.intent_json).map_err(|e| rejected(format!("intent json: {e}")))?;
        let intent = canonical.intent;
        // The assertion covers only the digest prefix; the body must be the
        // exact bytes that digest was taken over.
        let refrozen = intent
            .clone()
            .freeze()
            .map_err(|e| rejected(format!("intent invalid: {e}")))?;
        if refrozen.json() != request.intent_json {
            return Err(rejected("intent body does not match its digest".into()));
        }
        if intent.source != request.account {
            return Err(rejected("intent source is not the requesting account".into()));
        }

        let signature = hex::decode(&request.intent_signature).map_err(|e| rejected(format!("intent signature: {e}")))?;
        if !verify_signature(request.account.public_key(), request.intent_json.as_bytes(), &signature) {
            return Err(rejected("intent signature does not verify".into()));
        }
        if request.proof.proof_hash != commitment(&request.account, &request.intent_json) {
            return Err(rejected("proof does not commit to this intent".into()));
        }

        let contract_id = self.contract.lock().contract_id().to_string();
        if request.contract_id != contract_id {
            return Err(rejected(format!("unknown contract {}", request.contract_id)));
        }
        if intent.kind == IntentKind::Deposit && intent.destination != contract_id {
            return Err(rejected(format!("deposit targets {}", intent.destination)));
        }

        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| rejected(format!("{field}: {e}")))
        };
        let sig_data = WebAuthnSigData {
            signature: decode("signature", &request.signature)?,
            authenticator_data: decode("authenticator_data", &request.authenticator_data)?,
            client_data: decode("client_data_json", &request.client_data_json)?,
        };
        Ok((intent, sig_data))
    }

    fn failed(reason: String) -> ExecutionResponse {
        ExecutionResponse {
            success: false,
            transaction_hash: None,
            status: ExecutionStatus::Failed,
            error: Some(reason),
        }
    }
}

#[async_trait]
impl ExecutionEndpoint for ContractExecutionEndpoint {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ExecutionError> {
        let (intent, sig_data) = self.decode(&request)?;
        let payload = request.intent_json.as_bytes();
        let amount = i128::from(intent.amount.stroops());
        let asset = self.asset_id(&intent.asset).to_string();

        let result = {
            let mut contract = self.contract.lock();
            match intent.kind {
                IntentKind::Deposit => contract.deposit(request.account, &asset, amount, payload, &sig_data),
                IntentKind::Payment => {
                    let destination = match intent.destination_address() {
                        Ok(addr) => Holder::Account(addr),
                        Err(e) => return Ok(Self::failed(e.to_string())),
                    };
                    contract.execute_payment(request.account, destination, amount, &asset, payload, &sig_data)
                }
            }
        };

        match result {
            Ok(balance) => {
                let hash = hex::encode(Sha256::digest(format!("{}{}", request.intent_json, Uuid::new_v4()).as_bytes()));
                self.pending.lock().insert(hash.clone(), self.confirmation_lag);
                let status = if self.confirmation_lag == 0 {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Pending
                };
                info!(account = %request.account, kind = ?intent.kind, hash = %hash, balance = %balance, "contract call applied");
                Ok(ExecutionResponse {
                    success: true,
                    transaction_hash: Some(hash),
                    status,
                    error: None,
                })
            }
            Err(e) => {
                warn!(account = %request.account, kind = ?intent.kind, error = %e, "contract call failed");
                Ok(Self::failed(e.to_string()))
            }
        }
    }

    async fn register_signer(
        &self,
        account: &LedgerAddress,
        credential: &AuthenticatorCredential,
    ) -> Result<(), ExecutionError> {
        self.contract
            .lock()
            .register_signer(*account, &credential.public_key, &self.rp_id_hash)
            .map_err(|e| ExecutionError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl ExecutionRpc for ContractExecutionEndpoint {
    async fn transaction_status(&self, hash: &str) -> Result<ExecutionStatus, ExecutionError> {
        let mut pending = self.pending.lock();
        match pending.get_mut(hash) {
            Some(0) => Ok(ExecutionStatus::Success),
            Some(remaining) => {
                *remaining -= 1;
                debug!(hash, remaining = *remaining, "not visible yet");
                Ok(ExecutionStatus::NotFound)
            }
            None => Ok(ExecutionStatus::NotFound),
        }
    }

    async fn contract_balance(&self, account: &LedgerAddress, asset: &str) -> Result<Amount, ExecutionError> {
        let balance = self.contract.lock().get_balance(account, self.asset_id(asset));
        i64::try_from(balance)
            .map(Amount::from_stroops)
            .map_err(|_| ExecutionError::Failed(format!("balance {balance} exceeds the amount range")))
    }
}
