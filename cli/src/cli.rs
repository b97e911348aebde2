//! # CLI Interface
//!
//! Defines the command-line argument structure for `lumen` using `clap`
//! derive. Every global option can also come from a `LUMEN_*` environment
//! variable.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use lumen_protocol::ledger::{Amount, LedgerAddress};

/// Lumen wallet operator tool.
///
/// Works offline against the local vault store: creates and imports
/// wallets, inspects and removes them, and runs the engine's pure
/// computations (challenge derivation, spendable balance) for debugging.
#[derive(Parser, Debug)]
#[command(name = "lumen", about = "Lumen passkey wallet operator tool", version, propagate_version = true)]
pub struct LumenCli {
    /// Engine configuration file (JSON). Missing fields take defaults.
    #[arg(long, short = 'c', env = "LUMEN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the vault database.
    #[arg(long, short = 'd', env = "LUMEN_DATA_DIR", default_value = ".lumen", global = true)]
    pub data_dir: PathBuf,

    /// Log output format.
    #[arg(long, env = "LUMEN_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a wallet with a fresh keypair sealed under an authenticator
    /// credential.
    Init(CredentialArgs),
    /// Seal an existing hex secret under an authenticator credential.
    Import(ImportArgs),
    /// Show what the vault holds for an account.
    Status(AccountArgs),
    /// Delete every local trace of an account.
    Disconnect(AccountArgs),
    /// Delete credentials that no longer protect a wallet.
    Purge,
    /// Print the canonical intent JSON and the challenge derived from it.
    Challenge(ChallengeArgs),
    /// Compute the spendable native balance from raw account figures.
    Spendable(SpendableArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct CredentialArgs {
    /// Authenticator credential id.
    #[arg(long)]
    pub credential_id: String,

    /// Hex of the credential's public key (65-byte uncompressed P-256).
    #[arg(long, default_value = "")]
    pub public_key: String,

    #[arg(long, default_value = "platform")]
    pub device_type: String,
}

#[derive(Parser, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub credential: CredentialArgs,

    /// Hex-encoded 32-byte Ed25519 secret.
    ///
    /// Prefer the environment variable over the flag so the secret stays
    /// out of shell history.
    #[arg(long, env = "LUMEN_IMPORT_SECRET", hide_env_values = true)]
    pub secret: String,
}

#[derive(Parser, Debug)]
pub struct AccountArgs {
    /// Bech32 account address.
    pub account: LedgerAddress,
}

#[derive(Parser, Debug)]
pub struct ChallengeArgs {
    #[arg(long)]
    pub source: LedgerAddress,

    /// Destination address (payment) or contract id (deposit).
    #[arg(long)]
    pub destination: String,

    /// Decimal amount, at most 7 fractional digits.
    #[arg(long)]
    pub amount: Amount,

    #[arg(long)]
    pub memo: Option<String>,

    /// Treat the intent as a contract deposit.
    #[arg(long)]
    pub deposit: bool,

    /// Millisecond timestamp. Defaults to now.
    #[arg(long)]
    pub timestamp: Option<i64>,
}

#[derive(Parser, Debug)]
pub struct SpendableArgs {
    /// Native balance.
    #[arg(long)]
    pub available: Amount,

    #[arg(long, default_value = "0")]
    pub buying_liabilities: Amount,

    #[arg(long, default_value = "0")]
    pub selling_liabilities: Amount,

    #[arg(long, default_value_t = 0)]
    pub subentries: u32,
}
