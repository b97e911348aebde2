//! # Smart Wallet Contract
//!
//! Custodial balance contract gated by passkeys. Each wallet account
//! registers one P-256 passkey; every balance movement must carry a
//! WebAuthn assertion over the request payload, checked by
//! [`crate::webauthn::verify`].
//!
//! ```text
//! deposit:          account tokens --> contract   (logical balance += amount)
//! execute_payment:  contract --> destination      (logical balance -= amount)
//! ```
//!
//! The contract keeps two ledgers: the token ledger (who actually holds
//! what, including the contract itself) and the per-account logical
//! balances it owes. Deposits and payments move both in one call, so the
//! contract's token holdings always equal the sum of logical balances for
//! each asset.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use lumen_protocol::ledger::LedgerAddress;

use crate::webauthn::{self, WebAuthnError, WebAuthnSigData, PASSKEY_PUBLIC_KEY_LENGTH};

/// Length of the stored relying-party id hash.
pub const RP_ID_HASH_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i128),

    #[error("signer data rejected: passkey must be non-empty and rp id hash 32 bytes")]
    InvalidSignerData,

    #[error("signer {0} is not registered")]
    SignerNotRegistered(LedgerAddress),

    #[error("stored passkey for {0} is not a 65-byte P-256 key")]
    InvalidPasskey(LedgerAddress),

    #[error("webauthn verification failed: {0}")]
    Verification(#[from] WebAuthnError),

    #[error("insufficient token balance: available {available}, required {required}")]
    InsufficientTokens { available: i128, required: i128 },

    #[error("insufficient deposited balance: available {available}, required {required}")]
    InsufficientDeposit { available: i128, required: i128 },

    #[error("balance arithmetic overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRecord {
    /// Uncompressed SEC1 P-256 key.
    pub passkey_pubkey: Vec<u8>,
    pub rp_id_hash: [u8; RP_ID_HASH_LENGTH],
}

/// Holder of tokens on the token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Holder {
    Account(LedgerAddress),
    /// Any contract or external address, by id.
    Contract(String),
}

#[derive(Debug, Clone, Default)]
pub struct SmartWalletContract {
    contract_id: String,
    signers: HashMap<LedgerAddress, SignerRecord>,
    /// account -> asset -> amount owed by the contract.
    balances: HashMap<LedgerAddress, HashMap<String, i128>>,
    /// (holder, asset) -> amount held.
    tokens: HashMap<(Holder, String), i128>,
}

impl SmartWalletContract {
    pub fn new(contract_id: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            ..Self::default()
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    fn this(&self) -> Holder {
        Holder::Contract(self.contract_id.clone())
    }

    // -- Signers --------------------------------------------------------------

    /// Register (or replace) the passkey for `signer`.
    pub fn register_signer(
        &mut self,
        signer: LedgerAddress,
        passkey_pubkey: &[u8],
        rp_id_hash: &[u8],
    ) -> Result<(), ContractError> {
        let rp_id_hash: [u8; RP_ID_HASH_LENGTH] =
            rp_id_hash.try_into().map_err(|_| ContractError::InvalidSignerData)?;
        if passkey_pubkey.is_empty() {
            return Err(ContractError::InvalidSignerData);
        }
        self.signers.insert(
            signer,
            SignerRecord {
                passkey_pubkey: passkey_pubkey.to_vec(),
                rp_id_hash,
            },
        );
        info!(contract = %self.contract_id, signer = %signer, "signer registered");
        Ok(())
    }

    pub fn is_signer_registered(&self, signer: &LedgerAddress) -> bool {
        self.signers.contains_key(signer)
    }

    pub fn get_passkey_pubkey(&self, signer: &LedgerAddress) -> Option<&[u8]> {
        self.signers.get(signer).map(|r| r.passkey_pubkey.as_slice())
    }

    pub fn rp_id_hash(&self, signer: &LedgerAddress) -> Option<&[u8; RP_ID_HASH_LENGTH]> {
        self.signers.get(signer).map(|r| &r.rp_id_hash)
    }

    // -- Balances -------------------------------------------------------------

    /// Logical balance the contract owes `account` in `asset`. Zero when
    /// unknown.
    pub fn get_balance(&self, account: &LedgerAddress, asset: &str) -> i128 {
        self.balances
            .get(account)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    pub fn token_balance(&self, holder: &Holder, asset: &str) -> i128 {
        self.tokens
            .get(&(holder.clone(), asset.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Credit tokens out of thin air. Test and genesis setup only.
    pub fn mint(&mut self, holder: Holder, asset: &str, amount: i128) -> Result<(), ContractError> {
        let entry = self.tokens.entry((holder, asset.to_string())).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(ContractError::Overflow)?;
        Ok(())
    }

    fn transfer(&mut self, from: Holder, to: Holder, asset: &str, amount: i128) -> Result<(), ContractError> {
        let available = self.token_balance(&from, asset);
        if available < amount {
            return Err(ContractError::InsufficientTokens {
                available,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .token_balance(&to, asset)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        self.tokens.insert((from, asset.to_string()), available - amount);
        self.tokens.insert((to, asset.to_string()), credited);
        Ok(())
    }

    fn set_balance(&mut self, account: LedgerAddress, asset: &str, amount: i128) {
        self.balances
            .entry(account)
            .or_default()
            .insert(asset.to_string(), amount);
    }

    // -- Authorization --------------------------------------------------------

    fn authorize(
        &self,
        signer: &LedgerAddress,
        signature_payload: &[u8],
        sig_data: &WebAuthnSigData,
    ) -> Result<(), ContractError> {
        let record = self
            .signers
            .get(signer)
            .ok_or(ContractError::SignerNotRegistered(*signer))?;
        if record.passkey_pubkey.len() != PASSKEY_PUBLIC_KEY_LENGTH {
            return Err(ContractError::InvalidPasskey(*signer));
        }
        webauthn::verify(signature_payload, &record.passkey_pubkey, sig_data).map_err(|e| {
            warn!(contract = %self.contract_id, signer = %signer, error = %e, "assertion rejected");
            ContractError::from(e)
        })
    }

    // -- Entry points ---------------------------------------------------------

    /// Move `amount` of the account's own tokens into the contract.
    pub fn deposit(
        &mut self,
        account: LedgerAddress,
        asset: &str,
        amount: i128,
        signature_payload: &[u8],
        sig_data: &WebAuthnSigData,
    ) -> Result<i128, ContractError> {
        if amount <= 0 {
            return Err(ContractError::InvalidAmount(amount));
        }
        self.authorize(&account, signature_payload, sig_data)?;

        let new_balance = self
            .get_balance(&account, asset)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        let this = self.this();
        self.transfer(Holder::Account(account), this, asset, amount)?;
        self.set_balance(account, asset, new_balance);

        debug!(contract = %self.contract_id, account = %account, asset, amount, new_balance, "deposit");
        Ok(new_balance)
    }

    /// Pay `amount` out of the account's deposited balance to `destination`.
    pub fn execute_payment(
        &mut self,
        signer: LedgerAddress,
        destination: Holder,
        amount: i128,
        asset: &str,
        signature_payload: &[u8],
        sig_data: &WebAuthnSigData,
    ) -> Result<i128, ContractError> {
        if amount <= 0 {
            return Err(ContractError::InvalidAmount(amount));
        }
        self.authorize(&signer, signature_payload, sig_data)?;

        let available = self.get_balance(&signer, asset);
        if available < amount {
            return Err(ContractError::InsufficientDeposit {
                available,
                required: amount,
            });
        }
        let this = self.this();
        self.transfer(this, destination, asset, amount)?;
        let new_balance = available - amount;
        self.set_balance(signer, asset, new_balance);

        debug!(contract = %self.contract_id, signer = %signer, asset, amount, new_balance, "payment executed");
        Ok(new_balance)
    }
}
