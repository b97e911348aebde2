//! # Wallet Engine
//!
//! The public face of the crate. Owns the vault, the collaborators and the
//! per-account locks, and routes each call to the right orchestrator.
//!
//! ```text
//! submit_payment(intent, Direct)  -> ceremony -> vault -> DirectPaymentOrchestrator
//! submit_payment(intent, Vaulted) -> VaultedExecutionOrchestrator (config.contract_id)
//! submit_deposit(intent)          -> VaultedExecutionOrchestrator (intent.destination)
//! ```
//!
//! At most one flow runs per account; a second call for the same account
//! waits for the first to finish. Different accounts run concurrently.
//! Cancelling a call after submission does not undo the ledger effect.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::{derive_challenge, verify_binding, IntentError, IntentKind, TransactionIntent};
use crate::config::EngineConfig;
use crate::crypto::LedgerKeypair;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{Amount, BalanceSnapshot, LedgerAddress, SpendableBalance, TransactionRecord};
use crate::network::LedgerClient;
use crate::orchestrator::{
    DirectPaymentOrchestrator, ExecutionServices, SubmissionOutcome, VaultedExecutionOrchestrator,
};
use crate::refresh::{BalanceBook, BalanceRefresher};
use crate::vault::{AuthenticatorCredential, SecretVault};

/// How a payment is authorized and executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// Sign locally and submit straight to the ledger.
    Direct,
    /// Execute through the remote contract.
    Vaulted,
}

pub struct WalletEngine {
    config: Arc<EngineConfig>,
    vault: SecretVault,
    ledger: Arc<dyn LedgerClient>,
    execution: ExecutionServices,
    refresher: BalanceRefresher,
    locks: DashMap<LedgerAddress, Arc<Mutex<()>>>,
}

impl WalletEngine {
    pub fn new(
        config: EngineConfig,
        vault: SecretVault,
        ledger: Arc<dyn LedgerClient>,
        execution: ExecutionServices,
    ) -> Self {
        let config = Arc::new(config);
        let refresher = BalanceRefresher::new(
            ledger.clone(),
            Some(execution.rpc.clone()),
            Arc::new(BalanceBook::new()),
            config.clone(),
        );
        Self {
            config,
            vault,
            ledger,
            execution,
            refresher,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn vault(&self) -> &SecretVault {
        &self.vault
    }

    /// Latest balances written by refresh tasks.
    pub fn balances(&self) -> &Arc<BalanceBook> {
        self.refresher.book()
    }

    async fn lock_account(&self, account: &LedgerAddress) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(*account).or_default().clone();
        lock.lock_owned().await
    }

    /// Accounts currently holding a serialization lock entry.
    pub fn tracked_accounts(&self) -> usize {
        self.locks.len()
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    pub async fn submit_payment(
        &self,
        intent: TransactionIntent,
        mode: PaymentMode,
    ) -> EngineResult<SubmissionOutcome> {
        let account = intent.source;
        let span = info_span!("payment", flow = %Uuid::new_v4(), account = %account, ?mode);
        let result = self.payment_inner(intent, mode).instrument(span).await;
        self.report("payment", &account, result)
    }

    async fn payment_inner(&self, intent: TransactionIntent, mode: PaymentMode) -> EngineResult<SubmissionOutcome> {
        expect_kind(&intent, IntentKind::Payment)?;
        let _guard = self.lock_account(&intent.source).await;
        let session = self.vault.open_session(&intent.source)?;

        match mode {
            PaymentMode::Direct => {
                let credential = session.require_credential()?;
                let frozen = intent.freeze()?;
                let challenge = derive_challenge(frozen.json());
                let assertion = self
                    .execution
                    .authenticator
                    .get_assertion(&credential.id, &challenge)
                    .await?;
                verify_binding(&assertion, &challenge)?;
                let recovered = session.recover_secret()?;
                self.direct().run(&frozen, &recovered.keypair).await
            }
            PaymentMode::Vaulted => {
                if self.config.contract_id.is_empty() {
                    return Err(IntentError::MissingContract.into());
                }
                self.vaulted()
                    .execute(intent, &session, &self.config.contract_id)
                    .await
            }
        }
    }

    /// Deposit into the contract named by `intent.destination`.
    pub async fn submit_deposit(&self, intent: TransactionIntent) -> EngineResult<SubmissionOutcome> {
        let account = intent.source;
        let span = info_span!("deposit", flow = %Uuid::new_v4(), account = %account);
        let result = self.deposit_inner(intent).instrument(span).await;
        self.report("deposit", &account, result)
    }

    async fn deposit_inner(&self, intent: TransactionIntent) -> EngineResult<SubmissionOutcome> {
        expect_kind(&intent, IntentKind::Deposit)?;
        let _guard = self.lock_account(&intent.source).await;
        let session = self.vault.open_session(&intent.source)?;
        let contract_id = intent.destination.clone();
        self.vaulted().execute(intent, &session, &contract_id).await
    }

    fn direct(&self) -> DirectPaymentOrchestrator {
        DirectPaymentOrchestrator::new(self.ledger.clone(), self.config.clone(), self.refresher.clone())
    }

    fn vaulted(&self) -> VaultedExecutionOrchestrator {
        VaultedExecutionOrchestrator::new(self.execution.clone(), self.config.clone(), self.refresher.clone())
    }

    fn report<T>(&self, operation: &str, account: &LedgerAddress, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(e) = &result {
            let kind = e.kind();
            if kind.is_security_relevant() {
                error!(operation, account = %account, kind = %kind, security = true, error = %e, "flow aborted");
            } else {
                warn!(operation, account = %account, kind = %kind, error = %e, "flow failed");
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Wallet lifecycle
    // -----------------------------------------------------------------------

    /// Generate a fresh account and seal it under `credential`.
    pub async fn create_wallet(&self, credential: AuthenticatorCredential) -> EngineResult<LedgerAddress> {
        let keypair = LedgerKeypair::generate();
        self.store_wallet(keypair, credential).await
    }

    /// Seal an existing hex seed under `credential`.
    pub async fn import_wallet(
        &self,
        secret_hex: &str,
        credential: AuthenticatorCredential,
    ) -> EngineResult<LedgerAddress> {
        let keypair = LedgerKeypair::from_hex(secret_hex)?;
        self.store_wallet(keypair, credential).await
    }

    async fn store_wallet(
        &self,
        keypair: LedgerKeypair,
        credential: AuthenticatorCredential,
    ) -> EngineResult<LedgerAddress> {
        let account = keypair.address();
        let _guard = self.lock_account(&account).await;
        self.vault.encrypt_and_store(&keypair, Some(&credential))?;
        info!(account = %account, credential = %credential.id, "wallet stored");
        Ok(account)
    }

    /// Register the account's credential as a signer on the remote
    /// contract.
    pub async fn register_signer(&self, account: &LedgerAddress) -> EngineResult<()> {
        let session = self.vault.open_session(account)?;
        let credential = session.require_credential()?;
        self.execution.endpoint.register_signer(account, credential).await?;
        info!(account = %account, "signer registered");
        Ok(())
    }

    /// Delete every local trace of `account`. Waits for any in-flight flow.
    pub async fn disconnect(&self, account: &LedgerAddress) -> EngineResult<bool> {
        let guard = self.lock_account(account).await;
        let removed = self.vault.remove(account);
        if removed.is_ok() {
            self.balances().forget(account);
        }
        drop(guard);
        // Waiters hold their own clone; only an idle entry goes.
        self.locks.remove_if(account, |_, lock| Arc::strong_count(lock) == 1);
        let removed = removed?;
        info!(account = %account, removed, "wallet disconnected");
        Ok(removed)
    }

    pub fn purge_orphaned_credentials(&self) -> EngineResult<usize> {
        let purged = self.vault.purge_orphaned_credentials()?;
        if purged > 0 {
            info!(purged, "orphaned credentials removed");
        }
        Ok(purged)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn recent_transactions(
        &self,
        account: &LedgerAddress,
        limit: usize,
    ) -> EngineResult<Vec<TransactionRecord>> {
        Ok(self.ledger.transactions(account, limit).await?)
    }

    /// Spendable native balance from a fresh load. A missing account has
    /// nothing to spend.
    pub async fn spendable(&self, account: &LedgerAddress) -> EngineResult<SpendableBalance> {
        let base_reserve = Amount::from_stroops(self.config.base_reserve_stroops);
        let snapshot = match self.ledger.load_account(account).await? {
            Some(state) => BalanceSnapshot::from_account(&state),
            None => BalanceSnapshot {
                available: Amount::ZERO,
                buying_liabilities: Amount::ZERO,
                selling_liabilities: Amount::ZERO,
                subentry_count: 0,
                sequence_number: 0,
            },
        };
        Ok(snapshot.spendable(base_reserve))
    }
}

fn expect_kind(intent: &TransactionIntent, expected: IntentKind) -> Result<(), EngineError> {
    if intent.kind != expected {
        return Err(IntentError::KindMismatch {
            expected,
            got: intent.kind,
        }
        .into());
    }
    Ok(())
}
