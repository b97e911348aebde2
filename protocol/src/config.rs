//! # Engine Configuration & Constants
//!
//! Every magic number in the wallet engine lives here. If you're hardcoding
//! a reserve, a retry bound or a polling cadence somewhere else, move it.
//!
//! Two layers:
//!
//! - `pub const` items for values fixed by the ledger or by the wire format
//!   (decimals, reserve arithmetic, AES parameters, WebAuthn limits).
//! - [`EngineConfig`] for values an operator may tune at runtime (network,
//!   retry bounds, polling windows, contract ids). Deserializable from JSON,
//!   every field defaulted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Passphrase of the public production network. Hashed into every
/// transaction signature so a testnet signature can never be replayed here.
pub const NETWORK_PASSPHRASE_MAINNET: &str = "Public Global Stellar Network ; September 2015";

/// Passphrase of the public test network.
pub const NETWORK_PASSPHRASE_TESTNET: &str = "Test SDF Network ; September 2015";

/// Bech32 human-readable prefix for ledger account addresses.
pub const ADDRESS_HRP: &str = "lumen";

// ---------------------------------------------------------------------------
// Monetary Parameters
// ---------------------------------------------------------------------------

/// Fractional digits of the native asset. Seven, not eight.
pub const AMOUNT_DECIMALS: u32 = 7;

/// Stroops (minor units) per whole native unit: `10^AMOUNT_DECIMALS`.
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

/// Base reserve charged per ledger entry, in stroops (0.5 units).
pub const BASE_RESERVE_STROOPS: i64 = 5_000_000;

/// Entries every account pays for before any subentry: the account itself
/// counts twice.
pub const BASE_RESERVE_ENTRY_COUNT: i64 = 2;

/// Base fee per operation, in stroops (0.00001 units).
pub const BASE_FEE_STROOPS: i64 = 100;

/// Maximum length of a text memo, in bytes.
pub const MAX_MEMO_LENGTH: usize = 28;

// ---------------------------------------------------------------------------
// Transaction Lifecycle
// ---------------------------------------------------------------------------

/// Validity window attached to every built transaction.
pub const TX_VALIDITY_WINDOW: Duration = Duration::from_secs(180);

/// Hard bound on submission attempts per payment.
pub const MAX_SUBMIT_ATTEMPTS: u32 = 3;

/// First backoff step between submission attempts. Doubles every retry;
/// with three attempts the waits are 1s then 2s.
pub const SUBMIT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// After a client-side submission timeout, how many times the ledger is
/// asked whether the transaction landed anyway.
pub const TIMEOUT_POLL_ATTEMPTS: u32 = 10;

/// Spacing of the post-timeout ledger lookups.
pub const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bound on execution-network confirmation polls.
pub const CONFIRMATION_POLL_ATTEMPTS: u32 = 20;

/// Spacing of confirmation polls.
pub const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before the first balance refresh after a confirmed transaction.
pub const BALANCE_REFRESH_DELAY: Duration = Duration::from_secs(2);

/// Extra refresh rounds after the first one, absorbing propagation lag.
pub const BALANCE_REFRESH_RETRIES: u32 = 2;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 secret seed length.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Ed25519 public key length.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Length of the deterministic per-account vault salt.
pub const VAULT_SALT_LENGTH: usize = 16;

/// BLAKE3 derive-key context for the vault salt.
pub const VAULT_SALT_CONTEXT: &str = "lumen-wallet 2026 vault salt v1";

/// HKDF info string for the key-encryption-key.
pub const VAULT_KEK_INFO: &[u8] = b"lumen-wallet/vault/kek/v1";

/// Current vault envelope schema version.
pub const VAULT_ENVELOPE_VERSION: u32 = 1;

/// Length of an authenticator challenge.
pub const CHALLENGE_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// WebAuthn Limits
// ---------------------------------------------------------------------------

/// Largest `clientDataJSON` we are willing to parse.
pub const CLIENT_DATA_MAX_LEN: usize = 1024;

/// rpIdHash (32) + flags (1) + signCount (4).
pub const AUTHENTICATOR_DATA_MIN_LEN: usize = 37;

/// Offset of the flags byte inside authenticator data.
pub const AUTH_DATA_FLAGS_OFFSET: usize = 32;

/// User Present.
pub const AUTH_DATA_FLAG_UP: u8 = 0x01;

/// User Verified.
pub const AUTH_DATA_FLAG_UV: u8 = 0x04;

/// Backup Eligible.
pub const AUTH_DATA_FLAG_BE: u8 = 0x08;

/// Backup State.
pub const AUTH_DATA_FLAG_BS: u8 = 0x10;

/// Expected `type` of an assertion's client data.
pub const WEBAUTHN_GET_TYPE: &str = "webauthn.get";

/// Raw authenticator signature length (P-256 r || s).
pub const ASSERTION_SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Runtime-tunable engine parameters.
///
/// Durations are carried as integer milliseconds/seconds so the struct
/// deserializes from plain JSON; use the accessor methods to get
/// [`Duration`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Network passphrase mixed into transaction hashes.
    pub network_passphrase: String,
    /// Base reserve per ledger entry, in stroops.
    pub base_reserve_stroops: i64,
    /// Base fee per operation, in stroops.
    pub base_fee_stroops: i64,
    /// Transaction validity window, in seconds.
    pub tx_validity_window_secs: u64,
    /// Submission attempt bound.
    pub max_submit_attempts: u32,
    /// First backoff step, in milliseconds.
    pub submit_backoff_base_ms: u64,
    /// Post-timeout ledger lookups.
    pub timeout_poll_attempts: u32,
    /// Spacing of post-timeout lookups, in milliseconds.
    pub timeout_poll_interval_ms: u64,
    /// Confirmation poll bound.
    pub confirmation_poll_attempts: u32,
    /// Confirmation poll spacing, in milliseconds.
    pub confirmation_poll_interval_ms: u64,
    /// Delay before the first balance refresh, in milliseconds.
    pub refresh_delay_ms: u64,
    /// Extra balance refresh rounds.
    pub refresh_retries: u32,
    /// Remote smart wallet contract id.
    pub contract_id: String,
    /// Contract id of the native asset on the execution network.
    pub native_asset_contract_id: String,
    /// WebAuthn relying party id.
    pub rp_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network_passphrase: NETWORK_PASSPHRASE_TESTNET.to_string(),
            base_reserve_stroops: BASE_RESERVE_STROOPS,
            base_fee_stroops: BASE_FEE_STROOPS,
            tx_validity_window_secs: TX_VALIDITY_WINDOW.as_secs(),
            max_submit_attempts: MAX_SUBMIT_ATTEMPTS,
            submit_backoff_base_ms: SUBMIT_BACKOFF_BASE.as_millis() as u64,
            timeout_poll_attempts: TIMEOUT_POLL_ATTEMPTS,
            timeout_poll_interval_ms: TIMEOUT_POLL_INTERVAL.as_millis() as u64,
            confirmation_poll_attempts: CONFIRMATION_POLL_ATTEMPTS,
            confirmation_poll_interval_ms: CONFIRMATION_POLL_INTERVAL.as_millis() as u64,
            refresh_delay_ms: BALANCE_REFRESH_DELAY.as_millis() as u64,
            refresh_retries: BALANCE_REFRESH_RETRIES,
            contract_id: String::new(),
            native_asset_contract_id: String::new(),
            rp_id: "localhost".to_string(),
        }
    }
}

impl EngineConfig {
    /// Validity window as a [`Duration`].
    pub fn tx_validity_window(&self) -> Duration {
        Duration::from_secs(self.tx_validity_window_secs)
    }

    /// Backoff before retry number `retry` (1-based): base * 2^(retry-1).
    pub fn submit_backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.submit_backoff_base_ms.saturating_mul(factor))
    }

    /// Post-timeout lookup spacing.
    pub fn timeout_poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_poll_interval_ms)
    }

    /// Confirmation poll spacing.
    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms)
    }

    /// First refresh delay.
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    /// Minimum balance an account must hold: `(2 + subentries) * reserve`.
    pub fn minimum_balance_stroops(&self, subentry_count: u32) -> i64 {
        (BASE_RESERVE_ENTRY_COUNT + i64::from(subentry_count)) * self.base_reserve_stroops
    }

    /// Smallest starting balance that can create a new account.
    pub fn account_creation_reserve_stroops(&self) -> i64 {
        self.minimum_balance_stroops(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroops_per_unit_matches_decimals() {
        assert_eq!(STROOPS_PER_UNIT, 10i64.pow(AMOUNT_DECIMALS));
    }

    #[test]
    fn backoff_schedule_doubles() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.submit_backoff(1), Duration::from_secs(1));
        assert_eq!(cfg.submit_backoff(2), Duration::from_secs(2));
        assert_eq!(cfg.submit_backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn default_attempts_wait_twice() {
        let cfg = EngineConfig::default();
        let waits: Vec<_> = (1..cfg.max_submit_attempts).map(|r| cfg.submit_backoff(r)).collect();
        assert_eq!(waits, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn account_creation_reserve_is_two_base_reserves() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.account_creation_reserve_stroops(), STROOPS_PER_UNIT);
        assert_eq!(cfg.minimum_balance_stroops(3), 5 * BASE_RESERVE_STROOPS);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"max_submit_attempts": 5, "rp_id": "wallet.example"}"#)
                .unwrap();
        assert_eq!(cfg.max_submit_attempts, 5);
        assert_eq!(cfg.rp_id, "wallet.example");
        assert_eq!(cfg.confirmation_poll_attempts, CONFIRMATION_POLL_ATTEMPTS);
    }

    #[test]
    fn webauthn_limits_sanity() {
        assert_eq!(AUTHENTICATOR_DATA_MIN_LEN, AUTH_DATA_FLAGS_OFFSET + 1 + 4);
        assert_eq!(CHALLENGE_LENGTH, 32);
        assert!(CLIENT_DATA_MAX_LEN > AUTHENTICATOR_DATA_MIN_LEN);
    }
}
