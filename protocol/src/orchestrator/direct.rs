//! Direct-ledger payments signed with a locally recovered key.
//!
//! Each attempt starts from a fresh account load. Nothing computed in one
//! attempt (snapshot, sequence, signed envelope) is reused by the next.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::attempt::{classify, AttemptState, PaymentAttempt, RetryDecision, TransitionError};
use super::SubmissionOutcome;
use crate::auth::FrozenIntent;
use crate::config::EngineConfig;
use crate::crypto::LedgerKeypair;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{check_payment, Amount, BalanceError, BalanceSnapshot, LedgerAddress};
use crate::network::{LedgerClient, LedgerTxStatus, SubmitError};
use crate::refresh::{BalanceRefresher, RefreshScope};
use crate::transaction::{check_sequence, sign_transaction, Memo, SignedTransaction, TransactionBuilder};

pub struct DirectPaymentOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    config: Arc<EngineConfig>,
    refresher: BalanceRefresher,
}

impl DirectPaymentOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: Arc<EngineConfig>, refresher: BalanceRefresher) -> Self {
        Self {
            ledger,
            config,
            refresher,
        }
    }

    /// Run the payment to a terminal state. `keypair` must control the
    /// intent's source.
    pub async fn run(&self, intent: &FrozenIntent, keypair: &LedgerKeypair) -> EngineResult<SubmissionOutcome> {
        let mut attempt = PaymentAttempt::new(self.config.max_submit_attempts);
        let result = self.drive(&mut attempt, intent, keypair).await;
        if result.is_err() {
            attempt.fail();
        }
        result
    }

    async fn drive(
        &self,
        attempt: &mut PaymentAttempt,
        frozen: &FrozenIntent,
        keypair: &LedgerKeypair,
    ) -> EngineResult<SubmissionOutcome> {
        let intent = frozen.intent();
        let source = intent.source;
        let destination = intent.destination_address()?;
        let fee = Amount::from_stroops(self.config.base_fee_stroops);

        loop {
            attempt.advance(AttemptState::LoadingAccount).map_err(internal)?;
            let (snapshot, destination_exists) = self.load(&source, &destination, intent.amount, fee).await?;

            attempt.advance(AttemptState::Building).map_err(internal)?;
            let limits = check_payment(&snapshot, intent.amount, fee, destination_exists, &self.config)?;
            debug!(
                account = %source,
                attempt = attempt.attempt(),
                spendable = %limits.spendable,
                sequence = snapshot.sequence_number,
                "balance checks passed"
            );

            let builder = TransactionBuilder::new(source, snapshot.sequence_number)
                .base_fee(self.config.base_fee_stroops)
                .validity_window(unix_now(), self.config.tx_validity_window())
                .memo(intent.memo.clone().map(Memo::Text).unwrap_or_default());
            let builder = if destination_exists {
                builder.payment(destination, intent.amount)
            } else {
                builder.create_account(destination, intent.amount)
            };
            let tx = builder.build()?;

            attempt.advance(AttemptState::Signed).map_err(internal)?;
            let signed = sign_transaction(tx, keypair, &self.config.network_passphrase)?;
            check_sequence(snapshot.sequence_number, &signed.transaction)?;

            attempt.advance(AttemptState::Submitting).map_err(internal)?;
            let error = match self.ledger.submit(&signed).await {
                Ok(hash) => {
                    attempt.advance(AttemptState::Confirmed).map_err(internal)?;
                    return Ok(self.confirmed(source, hash, attempt.attempt()));
                }
                Err(e) => e,
            };

            match classify(&error, attempt.attempt(), &self.config) {
                RetryDecision::Backoff(delay) => {
                    warn!(account = %source, attempt = attempt.attempt(), ?delay, "stale sequence; rebuilding");
                    attempt.fail_retryable(error).map_err(internal)?;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::ReloadAndRecheck => {
                    warn!(account = %source, attempt = attempt.attempt(), "ledger reported underfunded; reloading");
                    attempt.fail_retryable(error.clone()).map_err(internal)?;
                    if !attempt.has_attempts_left() {
                        // No attempt left to carry the recheck, so run it here:
                        // a confirmed shortfall is not a race.
                        let (snapshot, destination_exists) = self.load(&source, &destination, intent.amount, fee).await?;
                        check_payment(&snapshot, intent.amount, fee, destination_exists, &self.config)?;
                        return Err(EngineError::RetriesExhausted {
                            attempts: attempt.attempt(),
                            last: error,
                        });
                    }
                }
                RetryDecision::PollForHash => {
                    return match self.poll_for_hash(&signed).await? {
                        Some(hash) => {
                            attempt.advance(AttemptState::Confirmed).map_err(internal)?;
                            Ok(self.confirmed(source, hash, attempt.attempt()))
                        }
                        None => Err(SubmitError::Timeout.into()),
                    };
                }
                RetryDecision::Exhausted => {
                    return Err(EngineError::RetriesExhausted {
                        attempts: attempt.attempt(),
                        last: error,
                    });
                }
                RetryDecision::Fatal => return Err(error.into()),
            }
        }
    }

    /// Fresh source snapshot plus whether the destination exists.
    async fn load(
        &self,
        source: &LedgerAddress,
        destination: &LedgerAddress,
        amount: Amount,
        fee: Amount,
    ) -> EngineResult<(BalanceSnapshot, bool)> {
        let Some(account) = self.ledger.load_account(source).await? else {
            return Err(BalanceError::Spendable {
                spendable: Amount::ZERO,
                required: amount.saturating_add(fee),
            }
            .into());
        };
        let destination_exists = self.ledger.load_account(destination).await?.is_some();
        Ok((BalanceSnapshot::from_account(&account), destination_exists))
    }

    /// After a client-side timeout the transaction may still land. Look
    /// its hash up for a bounded window.
    async fn poll_for_hash(&self, signed: &SignedTransaction) -> EngineResult<Option<String>> {
        let interval = self.config.timeout_poll_interval();
        for poll in 1..=self.config.timeout_poll_attempts {
            tokio::time::sleep(interval).await;
            match self.ledger.transaction_status(&signed.hash).await {
                Ok(LedgerTxStatus::Applied) => return Ok(Some(signed.hash.clone())),
                Ok(LedgerTxStatus::Failed) => {
                    return Err(SubmitError::Rejected(format!("transaction {} failed on ledger", signed.hash)).into())
                }
                Ok(LedgerTxStatus::NotFound) => debug!(hash = %signed.hash, poll, "not found yet"),
                Err(e) => warn!(hash = %signed.hash, poll, error = %e, "status lookup failed"),
            }
        }
        warn!(hash = %signed.hash, "transaction not seen after submission timeout");
        Ok(None)
    }

    fn confirmed(&self, account: LedgerAddress, hash: String, attempts: u32) -> SubmissionOutcome {
        info!(account = %account, hash = %hash, attempts, "payment confirmed");
        self.refresher.schedule(account, RefreshScope::Ledger);
        SubmissionOutcome::Confirmed(hash)
    }
}

fn internal(e: TransitionError) -> EngineError {
    EngineError::Internal(e.to_string())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
