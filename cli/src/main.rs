// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Lumen Operator CLI
//!
//! Entry point for the `lumen` binary. Parses arguments, initializes
//! logging, loads the engine configuration and runs one command against
//! the local vault store.
//!
//! - `init` / `import`     - seal a secret under an authenticator credential
//! - `status`              - inspect what the vault holds for an account
//! - `disconnect` / `purge` - remove wallets and orphaned credentials
//! - `challenge`           - canonical intent JSON and its challenge
//! - `spendable`           - reserve/liability arithmetic on raw figures
//! - `version`             - build and format versions
//!
//! Command output goes to stdout as JSON; logs go to stderr.

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::Path;

use lumen_protocol::auth::{derive_challenge, encode_challenge, TransactionIntent, NATIVE_ASSET};
use lumen_protocol::config::VAULT_ENVELOPE_VERSION;
use lumen_protocol::crypto::LedgerKeypair;
use lumen_protocol::ledger::{Amount, BalanceSnapshot, LedgerAddress, SpendableBalance};
use lumen_protocol::storage::WalletDb;
use lumen_protocol::vault::{AuthenticatorCredential, SecretVault};
use lumen_protocol::EngineConfig;

use cli::{ChallengeArgs, Commands, CredentialArgs, LumenCli, SpendableArgs};

/// Vault database directory inside the data directory.
const VAULT_DIR: &str = "vault";

fn main() -> Result<()> {
    let cli = LumenCli::parse();
    logging::init_logging(logging::DEFAULT_DIRECTIVES, cli.log_format);

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(network = %config.network_passphrase, "configuration loaded");

    match cli.command {
        Commands::Init(args) => {
            let vault = open_vault(&cli.data_dir)?;
            let created = create_wallet(&vault, LedgerKeypair::generate(), &args)?;
            print_json(&created)
        }
        Commands::Import(args) => {
            let vault = open_vault(&cli.data_dir)?;
            let keypair = LedgerKeypair::from_hex(args.secret.trim()).context("invalid secret")?;
            let created = create_wallet(&vault, keypair, &args.credential)?;
            print_json(&created)
        }
        Commands::Status(args) => {
            let vault = open_vault(&cli.data_dir)?;
            print_json(&vault_status(&vault, &args.account)?)
        }
        Commands::Disconnect(args) => {
            let vault = open_vault(&cli.data_dir)?;
            let removed = vault
                .remove(&args.account)
                .with_context(|| format!("failed to remove {}", args.account))?;
            tracing::info!(account = %args.account, removed, "disconnect");
            print_json(&serde_json::json!({ "account": args.account, "removed": removed }))
        }
        Commands::Purge => {
            let vault = open_vault(&cli.data_dir)?;
            let purged = vault
                .purge_orphaned_credentials()
                .context("failed to purge orphaned credentials")?;
            print_json(&serde_json::json!({ "purged": purged }))
        }
        Commands::Challenge(args) => print_json(&challenge(&args)?),
        Commands::Spendable(args) => print_json(&spendable(&config, &args)),
        Commands::Version => {
            println!("lumen          {}", env!("CARGO_PKG_VERSION"));
            println!("vault envelope v{}", VAULT_ENVELOPE_VERSION);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Read the JSON config file, or defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn open_vault(data_dir: &Path) -> Result<SecretVault> {
    let db_path = data_dir.join(VAULT_DIR);
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create data directory {}", db_path.display()))?;
    let db = WalletDb::open(&db_path)
        .with_context(|| format!("failed to open vault at {}", db_path.display()))?;
    Ok(SecretVault::new(db))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreatedWallet {
    account: LedgerAddress,
    credential_id: String,
}

fn create_wallet(vault: &SecretVault, keypair: LedgerKeypair, args: &CredentialArgs) -> Result<CreatedWallet> {
    let public_key = hex::decode(args.public_key.trim()).context("credential public key is not hex")?;
    let credential = AuthenticatorCredential::new(args.credential_id.clone(), public_key, args.device_type.clone());
    let envelope = vault
        .encrypt_and_store(&keypair, Some(&credential))
        .context("failed to seal wallet secret")?;
    vault.db().flush().context("failed to flush vault")?;
    tracing::info!(account = %envelope.metadata.account, credential = %credential.id, "wallet sealed");
    Ok(CreatedWallet {
        account: envelope.metadata.account,
        credential_id: credential.id,
    })
}

#[derive(Debug, Serialize)]
struct VaultStatus {
    account: LedgerAddress,
    credential_id: Option<String>,
    envelope_version: Option<u32>,
    envelope_created_at: Option<String>,
    envelope_intact: Option<bool>,
    legacy_secret: bool,
}

fn vault_status(vault: &SecretVault, account: &LedgerAddress) -> Result<VaultStatus> {
    let session = vault
        .open_session(account)
        .with_context(|| format!("failed to read vault for {account}"))?;
    let legacy = vault.db().legacy_secret(account).context("failed to read legacy store")?;
    let envelope = session.envelope();
    Ok(VaultStatus {
        account: *account,
        credential_id: session.credential().map(|c| c.id.clone()),
        envelope_version: envelope.map(|e| e.metadata.version),
        envelope_created_at: envelope.map(|e| e.metadata.created_at.to_rfc3339()),
        envelope_intact: envelope.map(|e| e.is_structurally_complete()),
        legacy_secret: legacy.is_some(),
    })
}

#[derive(Debug, Serialize)]
struct ChallengeOutput {
    intent_json: String,
    challenge: String,
}

fn challenge(args: &ChallengeArgs) -> Result<ChallengeOutput> {
    let mut intent = if args.deposit {
        TransactionIntent::deposit(args.source, &args.destination, args.amount, NATIVE_ASSET)
    } else {
        TransactionIntent::payment(args.source, &args.destination, args.amount)
    };
    if let Some(memo) = &args.memo {
        intent = intent.with_memo(memo.clone());
    }
    if let Some(ts) = args.timestamp {
        intent = intent.at(ts);
    }
    let frozen = intent.freeze().context("intent rejected")?;
    Ok(ChallengeOutput {
        challenge: encode_challenge(&derive_challenge(frozen.json())),
        intent_json: frozen.json().to_string(),
    })
}

fn spendable(config: &EngineConfig, args: &SpendableArgs) -> SpendableBalance {
    let snapshot = BalanceSnapshot {
        available: args.available,
        buying_liabilities: args.buying_liabilities,
        selling_liabilities: args.selling_liabilities,
        subentry_count: args.subentries,
        sequence_number: 0,
    };
    snapshot.spendable(Amount::from_stroops(config.base_reserve_stroops))
}
