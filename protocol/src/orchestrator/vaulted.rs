//! Authenticator-gated execution against a remote balance contract.
//!
//! The steps run in a fixed order. Moving any of them breaks the link
//! between what the user approved and what gets executed:
//!
//! ```text
//! 1. freeze intent (timestamp included) -> canonical JSON
//! 2. challenge = first 32 bytes of that JSON
//! 3. authenticator ceremony over the challenge
//! 4. verify binding; mismatch aborts here
//! 5. recover the account secret (vault, or legacy only if no vault)
//! 6. proof artifact over the same JSON
//! 7. one execute request
//! 8. confirmation polling, NOT_FOUND tolerated
//! 9. refresh ledger + contract balances
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::SubmissionOutcome;
use crate::auth::{derive_challenge, verify_binding, Authenticator, TransactionIntent};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::network::{
    ExecutionEndpoint, ExecutionError, ExecutionRequest, ExecutionRpc, ExecutionStatus, ProofService,
};
use crate::refresh::{BalanceRefresher, RefreshScope};
use crate::vault::{SecretSource, VaultSession};

/// Collaborators of the vault-backed flow.
#[derive(Clone)]
pub struct ExecutionServices {
    pub authenticator: Arc<dyn Authenticator>,
    pub proofs: Arc<dyn ProofService>,
    pub endpoint: Arc<dyn ExecutionEndpoint>,
    pub rpc: Arc<dyn ExecutionRpc>,
}

pub struct VaultedExecutionOrchestrator {
    services: ExecutionServices,
    config: Arc<EngineConfig>,
    refresher: BalanceRefresher,
}

impl VaultedExecutionOrchestrator {
    pub fn new(services: ExecutionServices, config: Arc<EngineConfig>, refresher: BalanceRefresher) -> Self {
        Self {
            services,
            config,
            refresher,
        }
    }

    /// Authorize and execute `intent` for the account behind `session`.
    ///
    /// `contract_id` is the contract that holds the account's balance.
    pub async fn execute(
        &self,
        intent: TransactionIntent,
        session: &VaultSession,
        contract_id: &str,
    ) -> EngineResult<SubmissionOutcome> {
        let credential = session.require_credential()?;
        let account = *session.account();

        // 1-2
        let frozen = intent.freeze()?;
        let challenge = derive_challenge(frozen.json());
        debug!(account = %account, timestamp = frozen.timestamp(), "intent frozen");

        // 3-4
        let assertion = self
            .services
            .authenticator
            .get_assertion(&credential.id, &challenge)
            .await?;
        verify_binding(&assertion, &challenge)?;

        // 5
        let recovered = session.recover_secret()?;
        let legacy_secret = match recovered.source {
            SecretSource::Legacy => Some(Zeroizing::new(hex::encode(&recovered.keypair.secret_bytes()[..]))),
            SecretSource::Vault => None,
        };

        // 6
        let proof = self
            .services
            .proofs
            .generate(&account, legacy_secret.as_ref().map(|s| s.as_str()), frozen.json())
            .await?;

        // 7
        let mut request = ExecutionRequest::new(contract_id, account, frozen.json(), &assertion, proof)
            .signed_by(&recovered.keypair);
        drop(recovered);
        if let Some(secret) = legacy_secret {
            request = request.with_legacy_secret(secret);
        }
        let response = self.services.endpoint.execute(request).await?;

        if response.status == ExecutionStatus::Failed {
            let reason = response.error.unwrap_or_else(|| "execution failed".into());
            return Err(ExecutionError::Failed(reason).into());
        }
        let Some(hash) = response.transaction_hash else {
            let reason = response.error.unwrap_or_else(|| "endpoint returned no transaction hash".into());
            return Err(ExecutionError::Rejected(reason).into());
        };

        // 8
        let confirmed = match response.status {
            ExecutionStatus::Success => true,
            _ => self.poll_confirmation(&hash).await?,
        };

        // 9
        self.refresher.schedule(account, RefreshScope::LedgerAndContract);
        if confirmed {
            info!(account = %account, hash = %hash, "execution confirmed");
            Ok(SubmissionOutcome::Confirmed(hash))
        } else {
            warn!(account = %account, hash = %hash, "execution submitted but not confirmed within the poll window");
            Ok(SubmissionOutcome::Submitted(hash))
        }
    }

    /// `Ok(true)` on SUCCESS, `Ok(false)` when the window runs out.
    async fn poll_confirmation(&self, hash: &str) -> EngineResult<bool> {
        let interval = self.config.confirmation_poll_interval();
        for poll in 1..=self.config.confirmation_poll_attempts {
            tokio::time::sleep(interval).await;
            match self.services.rpc.transaction_status(hash).await {
                Ok(ExecutionStatus::Success) => {
                    debug!(hash, poll, "confirmed");
                    return Ok(true);
                }
                Ok(ExecutionStatus::Failed) => {
                    return Err(ExecutionError::Failed(format!("transaction {hash} failed")).into());
                }
                Ok(status) => debug!(hash, poll, ?status, "awaiting confirmation"),
                Err(e) => warn!(hash, poll, error = %e, "confirmation lookup failed"),
            }
        }
        Ok(false)
    }
}
