//! # Balance Refresh
//!
//! Latest-known balances per account, refreshed in the background after a
//! submission. Ledgers and contract RPCs lag behind the submit response, so
//! a refresh waits a short delay first and then repeats a bounded number
//! of times.
//!
//! Reads are far more frequent than writes (every UI poll vs. one write per
//! refresh round), so the book sits behind a `parking_lot::RwLock`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::ledger::{Amount, BalanceSnapshot, LedgerAddress};
use crate::network::{ExecutionRpc, LedgerClient};

/// Which balances a refresh touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// Direct-ledger native balance only.
    Ledger,
    /// Ledger plus the contract-held balance.
    LedgerAndContract,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalances {
    pub ledger: Option<BalanceSnapshot>,
    /// Contract-held balances keyed by asset id.
    pub contract: HashMap<String, Amount>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct BalanceBook {
    inner: RwLock<HashMap<LedgerAddress, AccountBalances>>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account: &LedgerAddress) -> Option<AccountBalances> {
        self.inner.read().get(account).cloned()
    }

    pub fn set_ledger(&self, account: LedgerAddress, snapshot: BalanceSnapshot) {
        let mut map = self.inner.write();
        let entry = map.entry(account).or_default();
        entry.ledger = Some(snapshot);
        entry.refreshed_at = Some(Utc::now());
    }

    pub fn set_contract(&self, account: LedgerAddress, asset: &str, amount: Amount) {
        let mut map = self.inner.write();
        let entry = map.entry(account).or_default();
        entry.contract.insert(asset.to_string(), amount);
        entry.refreshed_at = Some(Utc::now());
    }

    pub fn forget(&self, account: &LedgerAddress) {
        self.inner.write().remove(account);
    }
}

/// Spawns refresh rounds against the ledger and, when configured, the
/// execution RPC.
#[derive(Clone)]
pub struct BalanceRefresher {
    ledger: Arc<dyn LedgerClient>,
    rpc: Option<Arc<dyn ExecutionRpc>>,
    book: Arc<BalanceBook>,
    config: Arc<EngineConfig>,
}

impl BalanceRefresher {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        rpc: Option<Arc<dyn ExecutionRpc>>,
        book: Arc<BalanceBook>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            ledger,
            rpc,
            book,
            config,
        }
    }

    pub fn book(&self) -> &Arc<BalanceBook> {
        &self.book
    }

    /// Refresh once, now. Failures are logged and leave the previous
    /// value in place.
    pub async fn refresh_now(&self, account: LedgerAddress, scope: RefreshScope) {
        match self.ledger.load_account(&account).await {
            Ok(Some(state)) => self.book.set_ledger(account, BalanceSnapshot::from_account(&state)),
            Ok(None) => debug!(account = %account, "account not on ledger yet"),
            Err(e) => warn!(account = %account, error = %e, "ledger balance refresh failed"),
        }

        if scope == RefreshScope::LedgerAndContract {
            if let Some(rpc) = &self.rpc {
                let asset = self.config.native_asset_contract_id.as_str();
                match rpc.contract_balance(&account, asset).await {
                    Ok(amount) => self.book.set_contract(account, asset, amount),
                    Err(e) => warn!(account = %account, error = %e, "contract balance refresh failed"),
                }
            }
        }
    }

    /// Wait the refresh delay, refresh, then repeat `refresh_retries` more
    /// times at the same spacing.
    pub fn schedule(&self, account: LedgerAddress, scope: RefreshScope) -> JoinHandle<()> {
        let this = self.clone();
        let delay = self.config.refresh_delay();
        let rounds = self.config.refresh_retries.saturating_add(1);
        tokio::spawn(async move {
            for round in 1..=rounds {
                tokio::time::sleep(delay).await;
                debug!(account = %account, round, "balance refresh");
                this.refresh_now(account, scope).await;
            }
        })
    }
}
