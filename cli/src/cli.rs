//! # CLI Interface
//!
//! Command-line structure for `airlock` using `clap` derive. One binary
//! plays both roles: the cold signer (`wallet`, `sign`) and the hot wallet
//! (`compose`, `verify`). QR payloads travel as hex lines, one frame per
//! line, so any QR tool can sit at either end of a pipe.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogFormat;

/// Air-gapped transaction signing over QR codes.
#[derive(Parser, Debug)]
#[command(
    name = "airlock",
    about = "Air-gapped hot/cold wallet signing over QR codes",
    version,
    propagate_version = true
)]
pub struct AirlockCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Directory holding the sealed wallet, the device salt and an optional
    /// `config.toml`. Created on first use.
    #[arg(long, short = 'd', env = "AIRLOCK_DATA_DIR", default_value = ".airlock", global = true)]
    pub data_dir: PathBuf,

    /// Protocol configuration file (TOML). Defaults to `config.toml` in the
    /// data directory when that file exists.
    #[arg(long, short = 'c', env = "AIRLOCK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Chain ID override. On the cold side this is the chain the reviewer
    /// expects; on the hot side it is stamped into composed requests.
    #[arg(long, env = "AIRLOCK_CHAIN_ID", global = true)]
    pub chain_id: Option<u64>,

    /// Maximum body bytes per QR frame.
    #[arg(long, env = "AIRLOCK_CHUNK_CAPACITY", global = true)]
    pub chunk_capacity: Option<usize>,

    /// Log output format. Logs always go to stderr.
    #[arg(long, value_enum, env = "AIRLOCK_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the cold device's wallet.
    #[command(subcommand)]
    Wallet(WalletCommand),
    /// Cold side: scan a request, review it, sign it, print the signed frames.
    Sign(SignArgs),
    /// Hot side: build a transaction request and print its frames.
    Compose(ComposeArgs),
    /// Hot side: check a signed reply against its request and broadcast it.
    Verify(VerifyArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum WalletCommand {
    /// Create a fresh wallet and print its recovery phrase once.
    Generate(PassphraseArgs),
    /// Restore a wallet from a recovery phrase.
    Import(ImportArgs),
    /// Print the stored wallet's address.
    Address(PassphraseArgs),
    /// Erase the stored wallet.
    Delete(DeleteArgs),
}

/// Unlocks the sealed storage in the data directory.
#[derive(Args, Debug)]
pub struct PassphraseArgs {
    /// Passphrase the device key is derived from (Argon2id).
    ///
    /// Read from the environment only; it never shows up in `--help` output
    /// or the process list.
    #[arg(long = "passphrase", env = "AIRLOCK_PASSPHRASE", hide_env_values = true, hide = true)]
    pub passphrase: String,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub unlock: PassphraseArgs,

    /// File holding the recovery phrase, or `-` for stdin.
    #[arg(long, default_value = "-")]
    pub phrase_file: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub unlock: PassphraseArgs,

    /// Skip the confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    #[command(flatten)]
    pub unlock: PassphraseArgs,

    /// File with the scanned request frames (one hex string per line), or
    /// `-` for stdin.
    #[arg(long, default_value = "-")]
    pub frames: String,

    /// Approve without prompting. Refused when the review raised warnings,
    /// unless `--accept-warnings` is also given.
    #[arg(long)]
    pub yes: bool,

    /// Let `--yes` approve a request that raised review warnings.
    #[arg(long, requires = "yes")]
    pub accept_warnings: bool,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Recipient address, `0x`-prefixed hex.
    #[arg(long)]
    pub to: String,

    /// Amount in wei, decimal or `0x` hex.
    #[arg(long)]
    pub value: String,

    #[arg(long)]
    pub nonce: u64,

    #[arg(long, default_value_t = airlock_protocol::config::MIN_GAS_LIMIT)]
    pub gas_limit: u64,

    /// Legacy (type 0) gas price in wei.
    #[arg(long, conflicts_with_all = ["max_fee", "priority_fee"], required_unless_present = "max_fee")]
    pub gas_price: Option<u128>,

    /// EIP-1559 max fee per gas in wei.
    #[arg(long, requires = "priority_fee")]
    pub max_fee: Option<u128>,

    /// EIP-1559 max priority fee per gas in wei.
    #[arg(long, requires = "max_fee")]
    pub priority_fee: Option<u128>,

    /// Call data, hex with or without `0x`.
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// File with the request frames printed by `compose`.
    #[arg(long)]
    pub request: PathBuf,

    /// File with the signed frames scanned from the cold device, or `-`
    /// for stdin.
    #[arg(long, default_value = "-")]
    pub signed: String,

    /// Only accept a signature from this address.
    #[arg(long, env = "AIRLOCK_EXPECTED_SIGNER")]
    pub expected_signer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        AirlockCli::command().debug_assert();
    }

    #[test]
    fn legacy_and_1559_fees_are_exclusive() {
        let mixed = AirlockCli::try_parse_from([
            "airlock", "compose", "--to", "0x00", "--value", "1", "--nonce", "0",
            "--gas-price", "1", "--max-fee", "2", "--priority-fee", "1",
        ]);
        assert!(mixed.is_err());

        let missing = AirlockCli::try_parse_from([
            "airlock", "compose", "--to", "0x00", "--value", "1", "--nonce", "0",
        ]);
        assert!(missing.is_err());

        let eip1559 = AirlockCli::try_parse_from([
            "airlock", "compose", "--to", "0x00", "--value", "1", "--nonce", "0",
            "--max-fee", "2", "--priority-fee", "1",
        ])
        .unwrap();
        let Commands::Compose(args) = eip1559.command else {
            panic!("expected compose");
        };
        assert_eq!(args.max_fee, Some(2));
        assert_eq!(args.gas_price, None);
    }

    #[test]
    fn accept_warnings_requires_yes() {
        let parsed = AirlockCli::try_parse_from([
            "airlock", "sign", "--passphrase", "pw", "--accept-warnings",
        ]);
        assert!(parsed.is_err());
    }
}
