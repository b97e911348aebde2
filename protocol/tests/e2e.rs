//! End-to-end tests for the Lumen wallet engine.
//!
//! Every collaborator is an in-memory double: a ledger that applies
//! payments and can be scripted to fail, an authenticator that signs
//! whatever challenge it is handed (or a substituted one), and an
//! execution endpoint/RPC pair with a scripted confirmation lag.
//!
//! Retry and polling tests run on tokio's paused clock, so backoff and
//! poll schedules are asserted exactly and finish instantly.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::Mutex;

use lumen_protocol::auth::{
    derive_challenge, Authenticator, AuthenticatorAssertion, AuthenticatorError, TransactionIntent,
    NATIVE_ASSET,
};
use lumen_protocol::config::{AUTH_DATA_FLAG_UP, AUTH_DATA_FLAG_UV, CHALLENGE_LENGTH};
use lumen_protocol::crypto::LedgerKeypair;
use lumen_protocol::ledger::{
    AccountState, Amount, BalanceLine, LedgerAddress, TransactionRecord,
};
use lumen_protocol::network::{
    ExecutionEndpoint, ExecutionError, ExecutionRequest, ExecutionResponse, ExecutionRpc,
    ExecutionStatus, LedgerClient, LedgerError, LedgerTxStatus, ProofArtifact, ProofService,
    SubmitError,
};
use lumen_protocol::orchestrator::{ExecutionServices, VaultedExecutionOrchestrator};
use lumen_protocol::refresh::{BalanceBook, BalanceRefresher};
use lumen_protocol::storage::WalletDb;
use lumen_protocol::transaction::{OperationBody, SignedTransaction};
use lumen_protocol::vault::{AuthenticatorCredential, SecretVault, VaultSession};
use lumen_protocol::{EngineConfig, ErrorKind, PaymentMode, SubmissionOutcome, WalletEngine};

// ---------------------------------------------------------------------------
// Test Doubles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Accept,
    /// Someone else used the sequence first.
    BadSequence,
    /// Optionally drain the source to this balance before answering.
    Underfunded(Option<Amount>),
    /// Time out, optionally having applied the transaction anyway.
    Timeout { applied: bool },
}

#[derive(Default)]
struct MockLedger {
    accounts: Mutex<HashMap<LedgerAddress, AccountState>>,
    script: Mutex<VecDeque<Scripted>>,
    submitted: Mutex<Vec<SignedTransaction>>,
    statuses: Mutex<HashMap<String, LedgerTxStatus>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    submit_latency: Mutex<Duration>,
}

impl MockLedger {
    fn fund(&self, account: LedgerAddress, units: &str, sequence: i64) {
        self.accounts.lock().insert(
            account,
            AccountState {
                address: account,
                sequence,
                subentry_count: 0,
                balances: vec![BalanceLine::native(units.parse().unwrap())],
            },
        );
    }

    fn script(&self, steps: impl IntoIterator<Item = Scripted>) {
        self.script.lock().extend(steps);
    }

    fn native(&self, account: &LedgerAddress) -> Option<Amount> {
        self.accounts
            .lock()
            .get(account)
            .and_then(|a| a.native_line().map(|l| l.amount))
    }

    fn sequence(&self, account: &LedgerAddress) -> i64 {
        self.accounts.lock().get(account).map(|a| a.sequence).unwrap_or(0)
    }

    fn submit_count(&self) -> usize {
        self.submitted.lock().len()
    }

    fn last_submitted(&self) -> SignedTransaction {
        self.submitted.lock().last().cloned().unwrap()
    }

    fn set_native(&self, account: &LedgerAddress, amount: Amount) {
        if let Some(state) = self.accounts.lock().get_mut(account) {
            state.balances = vec![BalanceLine::native(amount)];
        }
    }

    fn apply(&self, signed: &SignedTransaction) {
        let tx = &signed.transaction;
        let mut accounts = self.accounts.lock();
        let total = tx.total_amount().unwrap();
        let source = accounts.get_mut(&tx.source).unwrap();
        source.sequence = tx.sequence;
        let debit = total.checked_add(Amount::from_stroops(tx.fee)).unwrap();
        source.balances[0].amount = source.balances[0].amount.checked_sub(debit).unwrap();

        for op in &tx.operations {
            let dest = *op.body.destination();
            match &op.body {
                OperationBody::Payment { amount, .. } => {
                    let line = &mut accounts.get_mut(&dest).unwrap().balances[0];
                    line.amount = line.amount.checked_add(*amount).unwrap();
                }
                OperationBody::CreateAccount { starting_balance, .. } => {
                    accounts.insert(
                        dest,
                        AccountState {
                            address: dest,
                            sequence: 0,
                            subentry_count: 0,
                            balances: vec![BalanceLine::native(*starting_balance)],
                        },
                    );
                }
            }
        }
        self.statuses
            .lock()
            .insert(signed.hash.clone(), LedgerTxStatus::Applied);
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn load_account(&self, account: &LedgerAddress) -> Result<Option<AccountState>, LedgerError> {
        Ok(self.accounts.lock().get(account).cloned())
    }

    async fn submit(&self, tx: &SignedTransaction) -> Result<String, SubmitError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.submit_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.submitted.lock().push(tx.clone());
        let step = self.script.lock().pop_front().unwrap_or(Scripted::Accept);
        let result = match step {
            Scripted::Accept => {
                self.apply(tx);
                Ok(tx.hash.clone())
            }
            Scripted::BadSequence => {
                if let Some(state) = self.accounts.lock().get_mut(&tx.transaction.source) {
                    state.sequence += 1;
                }
                Err(SubmitError::BadSequence)
            }
            Scripted::Underfunded(drain) => {
                if let Some(amount) = drain {
                    self.set_native(&tx.transaction.source, amount);
                }
                Err(SubmitError::Underfunded)
            }
            Scripted::Timeout { applied } => {
                if applied {
                    self.apply(tx);
                }
                Err(SubmitError::Timeout)
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn transaction_status(&self, hash: &str) -> Result<LedgerTxStatus, LedgerError> {
        Ok(self
            .statuses
            .lock()
            .get(hash)
            .copied()
            .unwrap_or(LedgerTxStatus::NotFound))
    }

    async fn transactions(
        &self,
        _account: &LedgerAddress,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        Ok(self
            .submitted
            .lock()
            .iter()
            .rev()
            .take(limit)
            .map(|s| TransactionRecord {
                hash: s.hash.clone(),
                successful: self.statuses.lock().contains_key(&s.hash),
                fee: Amount::from_stroops(s.transaction.fee),
                created_at: chrono::Utc::now(),
            })
            .collect())
    }
}

#[derive(Default)]
struct MockAuthenticator {
    /// Sign this instead of the challenge handed in.
    substitute: Mutex<Option<[u8; CHALLENGE_LENGTH]>>,
    calls: AtomicUsize,
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn get_assertion(
        &self,
        credential_id: &str,
        challenge: &[u8; CHALLENGE_LENGTH],
    ) -> Result<AuthenticatorAssertion, AuthenticatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let signed = self.substitute.lock().unwrap_or(*challenge);
        let client_data = format!(
            r#"{{"type":"webauthn.get","challenge":"{}","origin":"https://localhost"}}"#,
            URL_SAFE_NO_PAD.encode(signed)
        );
        let mut auth_data = vec![0u8; 37];
        auth_data[32] = AUTH_DATA_FLAG_UP | AUTH_DATA_FLAG_UV;
        Ok(AuthenticatorAssertion {
            credential_id: credential_id.to_string(),
            signature: vec![7u8; 64],
            authenticator_data: auth_data,
            client_data_json: client_data.into_bytes(),
        })
    }
}

#[derive(Default)]
struct MockProofs {
    calls: AtomicUsize,
    secrets_seen: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl ProofService for MockProofs {
    async fn generate(
        &self,
        _public_key: &LedgerAddress,
        secret: Option<&str>,
        intent_json: &str,
    ) -> Result<ProofArtifact, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.secrets_seen.lock().push(secret.map(str::to_string));
        Ok(ProofArtifact {
            proof_hash: hex::encode(lumen_protocol::crypto::sha256(intent_json.as_bytes())),
            challenge: "proof-challenge".into(),
            timestamp: 1_700_000_000,
            nonce: "n-1".into(),
        })
    }
}

struct MockExecution {
    response_status: Mutex<ExecutionStatus>,
    poll_script: Mutex<VecDeque<ExecutionStatus>>,
    executes: AtomicUsize,
    polls: AtomicUsize,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl MockExecution {
    fn new(response_status: ExecutionStatus) -> Self {
        Self {
            response_status: Mutex::new(response_status),
            poll_script: Mutex::new(VecDeque::new()),
            executes: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn script_polls(&self, steps: impl IntoIterator<Item = ExecutionStatus>) {
        self.poll_script.lock().extend(steps);
    }
}

#[async_trait]
impl ExecutionEndpoint for MockExecution {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ExecutionError> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        let status = *self.response_status.lock();
        Ok(ExecutionResponse {
            success: status != ExecutionStatus::Failed,
            transaction_hash: Some("exec-hash-1".into()),
            status,
            error: None,
        })
    }

    async fn register_signer(
        &self,
        _account: &LedgerAddress,
        _credential: &AuthenticatorCredential,
    ) -> Result<(), ExecutionError> {
        Ok(())
    }
}

#[async_trait]
impl ExecutionRpc for MockExecution {
    async fn transaction_status(&self, _hash: &str) -> Result<ExecutionStatus, ExecutionError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .poll_script
            .lock()
            .pop_front()
            .unwrap_or(ExecutionStatus::NotFound))
    }

    async fn contract_balance(&self, _account: &LedgerAddress, _asset: &str) -> Result<Amount, ExecutionError> {
        Ok(Amount::from_units(42))
    }
}

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Harness {
    engine: WalletEngine,
    ledger: Arc<MockLedger>,
    authenticator: Arc<MockAuthenticator>,
    proofs: Arc<MockProofs>,
    execution: Arc<MockExecution>,
}

fn config() -> EngineConfig {
    EngineConfig {
        contract_id: "CWALLET".into(),
        native_asset_contract_id: "CNATIVE".into(),
        ..EngineConfig::default()
    }
}

fn harness_with(execution_status: ExecutionStatus) -> Harness {
    let ledger = Arc::new(MockLedger::default());
    let authenticator = Arc::new(MockAuthenticator::default());
    let proofs = Arc::new(MockProofs::default());
    let execution = Arc::new(MockExecution::new(execution_status));
    let services = ExecutionServices {
        authenticator: authenticator.clone(),
        proofs: proofs.clone(),
        endpoint: execution.clone(),
        rpc: execution.clone(),
    };
    let vault = SecretVault::new(WalletDb::open_temporary().expect("temp db"));
    let engine = WalletEngine::new(config(), vault, ledger.clone(), services);
    Harness {
        engine,
        ledger,
        authenticator,
        proofs,
        execution,
    }
}

fn harness() -> Harness {
    harness_with(ExecutionStatus::Success)
}

fn credential(id: &str) -> AuthenticatorCredential {
    AuthenticatorCredential::new(id, vec![4u8; 65], "platform")
}

/// A wallet with a funded source and an existing destination.
async fn funded_pair(h: &Harness, units: &str) -> (LedgerAddress, LedgerAddress) {
    let alice = h.engine.create_wallet(credential("alice-cred")).await.unwrap();
    let bob = LedgerKeypair::generate().address();
    h.ledger.fund(alice, units, 100);
    h.ledger.fund(bob, "10", 5);
    (alice, bob)
}

fn pay(from: LedgerAddress, to: LedgerAddress, units: &str) -> TransactionIntent {
    TransactionIntent::payment(from, &to.to_string(), units.parse().unwrap())
}

// ---------------------------------------------------------------------------
// 1. Direct Payment Happy Path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn direct_payment_confirms_first_attempt() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;

    let outcome = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(h.ledger.submit_count(), 1);
    assert_eq!(h.authenticator.calls.load(Ordering::SeqCst), 1);

    let tx = h.ledger.last_submitted();
    assert_eq!(tx.transaction.sequence, 101);
    assert!(tx.transaction.operations.iter().all(|op| op.source.is_none()));
    assert!(tx.verify(&config().network_passphrase));
    assert_eq!(outcome.hash(), tx.hash);

    assert_eq!(h.ledger.native(&bob), Some("20".parse().unwrap()));
    assert_eq!(h.ledger.native(&alice), Some("89.99999".parse().unwrap()));
}

// ---------------------------------------------------------------------------
// 2. Stale Sequence Retry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stale_sequence_rebuilds_and_succeeds_on_second_attempt() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([Scripted::BadSequence, Scripted::Accept]);

    let start = tokio::time::Instant::now();
    let outcome = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(h.ledger.submit_count(), 2);
    // Rebuilt from the bumped sequence, not the stale one.
    assert_eq!(h.ledger.last_submitted().transaction.sequence, 102);
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn stale_sequence_gives_up_after_three_attempts() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([Scripted::BadSequence, Scripted::BadSequence, Scripted::BadSequence]);

    let start = tokio::time::Instant::now();
    let err = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SequenceConflict);
    assert_eq!(h.ledger.submit_count(), 3);
    // 1s + 2s of backoff between the three attempts.
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(start.elapsed() < Duration::from_secs(7));
}

// ---------------------------------------------------------------------------
// 3. Underfunded Race
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn underfunded_retries_when_reload_shows_funds() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([Scripted::Underfunded(None), Scripted::Accept]);

    let outcome = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap();
    assert!(outcome.is_confirmed());
    assert_eq!(h.ledger.submit_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn underfunded_confirmed_after_reload_is_fatal() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([Scripted::Underfunded(Some(Amount::from_units(5)))]);

    let err = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(h.ledger.submit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn underfunded_on_last_attempt_reports_confirmed_shortfall() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([
        Scripted::Underfunded(None),
        Scripted::Underfunded(None),
        Scripted::Underfunded(Some(Amount::from_units(5))),
    ]);

    let err = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert!(!err.kind().is_retryable());
    assert_eq!(h.ledger.submit_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn underfunded_three_times_with_funds_is_a_race() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([Scripted::Underfunded(None), Scripted::Underfunded(None), Scripted::Underfunded(None)]);

    let err = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnderfundedRace);
    assert_eq!(h.ledger.submit_count(), 3);
}

// ---------------------------------------------------------------------------
// 4. Submission Timeout
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timeout_resolved_by_hash_lookup() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([Scripted::Timeout { applied: true }]);

    let outcome = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap();
    assert!(outcome.is_confirmed());
    assert_eq!(h.ledger.submit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_never_seen_is_reported_as_timeout() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.ledger.script([Scripted::Timeout { applied: false }]);

    let err = h
        .engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SubmissionTimeout);
    assert_eq!(h.ledger.submit_count(), 1);
}

// ---------------------------------------------------------------------------
// 5. Balance Checks Before Submission
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reserve_is_respected_before_submission() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;

    let err = h
        .engine
        .submit_payment(pay(alice, bob, "99"), PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(h.ledger.submit_count(), 0);

    let ok = h
        .engine
        .submit_payment(pay(alice, bob, "98.5"), PaymentMode::Direct)
        .await
        .unwrap();
    assert!(ok.is_confirmed());
}

#[tokio::test(start_paused = true)]
async fn missing_destination_is_created() {
    let h = harness();
    let (alice, _) = funded_pair(&h, "100").await;
    let carol = LedgerKeypair::generate().address();

    let err = h
        .engine
        .submit_payment(pay(alice, carol, "0.5"), PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    h.engine
        .submit_payment(pay(alice, carol, "5"), PaymentMode::Direct)
        .await
        .unwrap();
    let tx = h.ledger.last_submitted();
    assert!(matches!(
        tx.transaction.operations[0].body,
        OperationBody::CreateAccount { .. }
    ));
    assert_eq!(h.ledger.native(&carol), Some(Amount::from_units(5)));
}

#[tokio::test(start_paused = true)]
async fn malformed_destination_fails_before_authenticator() {
    let h = harness();
    let (alice, _) = funded_pair(&h, "100").await;

    let intent = TransactionIntent::payment(alice, "lumen1notanaddress", Amount::from_units(1));
    let err = h
        .engine
        .submit_payment(intent, PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.authenticator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ledger.submit_count(), 0);
}

// ---------------------------------------------------------------------------
// 6. Vault-Backed Execution
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn not_found_nineteen_times_then_success_confirms() {
    let h = harness_with(ExecutionStatus::Pending);
    let (alice, _) = funded_pair(&h, "100").await;
    let mut polls = vec![ExecutionStatus::NotFound; 19];
    polls.push(ExecutionStatus::Success);
    h.execution.script_polls(polls);

    let intent = TransactionIntent::deposit(alice, "CWALLET", Amount::from_units(3), NATIVE_ASSET);
    let outcome = h.engine.submit_deposit(intent).await.unwrap();

    assert_eq!(outcome, SubmissionOutcome::Confirmed("exec-hash-1".into()));
    assert_eq!(h.execution.polls.load(Ordering::SeqCst), 20);
    assert_eq!(h.execution.executes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_poll_window_reports_submitted() {
    let h = harness_with(ExecutionStatus::Pending);
    let (alice, bob) = funded_pair(&h, "100").await;

    let outcome = h
        .engine
        .submit_payment(pay(alice, bob, "1"), PaymentMode::Vaulted)
        .await
        .unwrap();

    assert_eq!(outcome, SubmissionOutcome::Submitted("exec-hash-1".into()));
    assert!(!outcome.is_confirmed());
    assert_eq!(h.execution.polls.load(Ordering::SeqCst), 20);
}

#[tokio::test(start_paused = true)]
async fn failed_status_during_poll_is_terminal() {
    let h = harness_with(ExecutionStatus::Pending);
    let (alice, bob) = funded_pair(&h, "100").await;
    h.execution
        .script_polls([ExecutionStatus::NotFound, ExecutionStatus::Failed]);

    let err = h
        .engine
        .submit_payment(pay(alice, bob, "1"), PaymentMode::Vaulted)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert_eq!(h.execution.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn vault_path_signs_intent_and_withholds_secret() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;

    let intent = pay(alice, bob, "2").at(1_700_000_000_000);
    let expected_json = intent.clone().freeze().unwrap().json().to_string();
    h.engine
        .submit_payment(intent, PaymentMode::Vaulted)
        .await
        .unwrap();

    let requests = h.execution.requests.lock();
    let req = &requests[0];
    assert_eq!(req.intent_json, expected_json);
    assert_eq!(req.contract_id, "CWALLET");
    assert!(req.legacy_secret.is_none());
    assert!(!req.intent_signature.is_empty());
    assert_eq!(h.proofs.secrets_seen.lock().as_slice(), &[None]);
}

#[tokio::test(start_paused = true)]
async fn confirmed_execution_refreshes_both_balances() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;

    h.engine
        .submit_payment(pay(alice, bob, "1"), PaymentMode::Vaulted)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let balances = h.engine.balances().get(&alice).unwrap();
    assert_eq!(balances.contract.get("CNATIVE"), Some(&Amount::from_units(42)));
    assert_eq!(
        balances.ledger.map(|s| s.available),
        Some(Amount::from_units(100))
    );
}

#[tokio::test(start_paused = true)]
async fn legacy_wallet_forwards_secret() {
    let ledger = Arc::new(MockLedger::default());
    let authenticator = Arc::new(MockAuthenticator::default());
    let proofs = Arc::new(MockProofs::default());
    let execution = Arc::new(MockExecution::new(ExecutionStatus::Success));
    let services = ExecutionServices {
        authenticator: authenticator.clone(),
        proofs: proofs.clone(),
        endpoint: execution.clone(),
        rpc: execution.clone(),
    };
    let cfg = Arc::new(config());
    let refresher = BalanceRefresher::new(ledger.clone(), None, Arc::new(BalanceBook::new()), cfg.clone());
    let orchestrator = VaultedExecutionOrchestrator::new(services, cfg, refresher);

    let kp = LedgerKeypair::generate();
    let secret_hex = hex::encode(&kp.secret_bytes()[..]);
    let session = VaultSession::new(
        kp.address(),
        Some(credential("legacy-cred")),
        None,
        Some(zeroize::Zeroizing::new(secret_hex.clone())),
    );
    let intent = TransactionIntent::deposit(kp.address(), "CWALLET", Amount::from_units(1), NATIVE_ASSET);
    let outcome = orchestrator.execute(intent, &session, "CWALLET").await.unwrap();

    assert!(outcome.is_confirmed());
    assert_eq!(proofs.secrets_seen.lock()[0].as_deref(), Some(secret_hex.as_str()));
    let requests = execution.requests.lock();
    assert_eq!(
        requests[0].legacy_secret.as_ref().map(|s| s.as_str()),
        Some(secret_hex.as_str())
    );
}

// ---------------------------------------------------------------------------
// 7. Challenge Binding and Vault Failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn restamped_challenge_aborts_before_secret_or_network() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;

    let t1 = 1_700_000_000_000;
    let t2 = t1 + 1;
    let restamped = pay(alice, bob, "1").at(t2).freeze().unwrap();
    *h.authenticator.substitute.lock() = Some(derive_challenge(restamped.json()));

    for mode in [PaymentMode::Vaulted, PaymentMode::Direct] {
        let err = h
            .engine
            .submit_payment(pay(alice, bob, "1").at(t1), mode)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChallengeMismatch);
    }
    assert_eq!(h.proofs.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.execution.executes.load(Ordering::SeqCst), 0);
    assert_eq!(h.ledger.submit_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_credential_fails_fast() {
    let h = harness();
    let kp = LedgerKeypair::generate();
    h.engine
        .vault()
        .db()
        .put_legacy_secret(&kp.address(), &hex::encode(&kp.secret_bytes()[..]))
        .unwrap();
    let bob = LedgerKeypair::generate().address();

    let err = h
        .engine
        .submit_payment(pay(kp.address(), bob, "1"), PaymentMode::Vaulted)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingCredential);
    assert_eq!(h.authenticator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn corrupt_vault_never_falls_back_to_legacy() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    let db = h.engine.vault().db();

    let mut envelope = db.envelope(&alice).unwrap().unwrap();
    envelope.wrap_iv.clear();
    let cred = db.credential_for(&alice).unwrap().unwrap();
    db.put_wallet(&alice, &envelope, Some(&cred)).unwrap();
    db.put_legacy_secret(&alice, &"11".repeat(32)).unwrap();

    let err = h
        .engine
        .submit_payment(pay(alice, bob, "1"), PaymentMode::Direct)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VaultCorrupt);
    assert!(err.to_string().contains("create a new wallet"));
    assert_eq!(h.ledger.submit_count(), 0);
}

// ---------------------------------------------------------------------------
// 8. Per-Account Serialization
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn same_account_flows_never_overlap() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    *h.ledger.submit_latency.lock() = Duration::from_millis(300);

    let (a, b) = tokio::join!(
        h.engine.submit_payment(pay(alice, bob, "1"), PaymentMode::Direct),
        h.engine.submit_payment(pay(alice, bob, "2"), PaymentMode::Direct),
    );

    assert!(a.unwrap().is_confirmed());
    assert!(b.unwrap().is_confirmed());
    assert_eq!(h.ledger.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.ledger.sequence(&alice), 102);
}

#[tokio::test(start_paused = true)]
async fn different_accounts_run_concurrently() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    let dave = h.engine.create_wallet(credential("dave-cred")).await.unwrap();
    h.ledger.fund(dave, "100", 1);
    *h.ledger.submit_latency.lock() = Duration::from_millis(300);

    let (a, b) = tokio::join!(
        h.engine.submit_payment(pay(alice, bob, "1"), PaymentMode::Direct),
        h.engine.submit_payment(pay(dave, bob, "1"), PaymentMode::Direct),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(h.ledger.max_in_flight.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// 9. Wallet Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_releases_the_account_lock() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.engine
        .submit_payment(pay(alice, bob, "1"), PaymentMode::Direct)
        .await
        .unwrap();
    assert_eq!(h.engine.tracked_accounts(), 1);

    assert!(h.engine.disconnect(&alice).await.unwrap());
    assert_eq!(h.engine.tracked_accounts(), 0);
}

#[tokio::test]
async fn credential_cannot_back_two_wallets() {
    let h = harness();
    let first = h.engine.create_wallet(credential("shared")).await.unwrap();

    let err = h.engine.create_wallet(credential("shared")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.engine.vault().open_session(&first).unwrap().has_secret());
    assert_eq!(
        h.engine.vault().open_session(&first).unwrap().require_credential().unwrap().id,
        "shared"
    );
}

#[tokio::test]
async fn import_disconnect_and_purge() {
    let h = harness();
    let kp = LedgerKeypair::generate();
    let account = h
        .engine
        .import_wallet(&hex::encode(&kp.secret_bytes()[..]), credential("imported"))
        .await
        .unwrap();
    assert_eq!(account, kp.address());

    let session = h.engine.vault().open_session(&account).unwrap();
    assert_eq!(session.recover_secret().unwrap().keypair.address(), account);

    h.engine
        .vault()
        .db()
        .put_unbound_credential(&credential("stray"))
        .unwrap();
    assert_eq!(h.engine.purge_orphaned_credentials().unwrap(), 1);

    assert!(h.engine.disconnect(&account).await.unwrap());
    assert!(!h.engine.vault().open_session(&account).unwrap().has_secret());
    assert!(!h.engine.disconnect(&account).await.unwrap());
    assert_eq!(h.engine.tracked_accounts(), 0);

    let err = h.engine.import_wallet("zz", credential("bad")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test(start_paused = true)]
async fn history_and_spendable_queries() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    h.engine
        .submit_payment(pay(alice, bob, "10"), PaymentMode::Direct)
        .await
        .unwrap();

    let history = h.engine.recent_transactions(&alice, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].successful);
    assert_eq!(history[0].fee, Amount::from_stroops(100));

    let spendable = h.engine.spendable(&alice).await.unwrap();
    assert_eq!(spendable.spendable, "88.99999".parse().unwrap());

    let nobody = LedgerKeypair::generate().address();
    assert!(h.engine.spendable(&nobody).await.unwrap().spendable.is_negative());
}

#[tokio::test(start_paused = true)]
async fn deposit_requires_deposit_intent() {
    let h = harness();
    let (alice, bob) = funded_pair(&h, "100").await;
    let err = h.engine.submit_deposit(pay(alice, bob, "1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
