// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Airlock
//!
//! Entry point for the `airlock` binary. One executable, two personalities:
//!
//! - **cold**: `wallet generate|import|address|delete` and `sign`. Keys live
//!   sealed in `--data-dir` under a device key stretched from
//!   `AIRLOCK_PASSPHRASE`.
//! - **hot**: `compose` and `verify`. No keys, no state, no network. The
//!   "broadcast" is a JSON line on stdout.
//!
//! Frames are hex strings, one per line. Logs go to stderr.

mod cli;
mod cold;
mod frames;
mod hot;
mod logging;
mod unlock;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use airlock_protocol::config::{ProtocolConfig, WIRE_VERSION_SIGNED, WIRE_VERSION_UNSIGNED};
use airlock_protocol::Device;

use cli::{AirlockCli, Commands, GlobalArgs, PassphraseArgs, WalletCommand};

/// Config file picked up from the data directory when `--config` is absent.
const CONFIG_FILE: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AirlockCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.global.log_format);

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    let config = load_config(&cli.global)?;
    tracing::debug!(
        chain_id = config.chain_id,
        chunk_capacity = config.chunk_capacity,
        data_dir = %cli.global.data_dir.display(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Wallet(WalletCommand::Generate(unlock)) => {
            cold::generate(&open_device(&cli.global, &unlock, config)?)
        }
        Commands::Wallet(WalletCommand::Import(args)) => {
            cold::import(&open_device(&cli.global, &args.unlock, config)?, &args)
        }
        Commands::Wallet(WalletCommand::Address(unlock)) => {
            cold::address(&open_device(&cli.global, &unlock, config)?)
        }
        Commands::Wallet(WalletCommand::Delete(args)) => {
            cold::delete(&mut open_device(&cli.global, &args.unlock, config)?, &args)
        }
        Commands::Sign(args) => {
            let mut device = open_device(&cli.global, &args.unlock, config)?;
            cold::sign(&mut device, &args).await
        }
        Commands::Compose(args) => hot::compose(&config, &args),
        Commands::Verify(args) => hot::verify(&config, &args).await,
        Commands::Version => Ok(()),
    }
}

/// File config (explicit, or `config.toml` in the data dir), then flag and
/// environment overrides, then validation.
fn load_config(global: &GlobalArgs) -> Result<ProtocolConfig> {
    let implicit = global.data_dir.join(CONFIG_FILE);
    let path: Option<&Path> = match &global.config {
        Some(path) => Some(path.as_path()),
        None if implicit.exists() => Some(implicit.as_path()),
        None => None,
    };

    let mut config = match path {
        Some(path) => ProtocolConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ProtocolConfig::default(),
    };
    if let Some(chain_id) = global.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(capacity) = global.chunk_capacity {
        config.chunk_capacity = capacity;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_device(global: &GlobalArgs, unlock: &PassphraseArgs, config: ProtocolConfig) -> Result<Device> {
    let storage = unlock::open_storage(&global.data_dir, &unlock.passphrase)?;
    Device::new(storage, config).context("invalid configuration")
}

fn print_version() {
    println!("airlock {}", env!("CARGO_PKG_VERSION"));
    println!("wire    v{WIRE_VERSION_UNSIGNED} (request), v{WIRE_VERSION_SIGNED} (signed)");
}
