//! Cold role: the wallet and the signer. Nothing in here touches a network.

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use airlock_protocol::device::{Device, ScanStatus};
use airlock_protocol::TransactionSummary;

use crate::cli::{DeleteArgs, ImportArgs, SignArgs};
use crate::frames::{self, STDIN};

fn require_no_wallet(device: &Device) -> Result<()> {
    if device.has_wallet().context("failed to check for an existing wallet")? {
        bail!("a wallet already exists on this device; run `airlock wallet delete` first");
    }
    Ok(())
}

pub fn generate(device: &Device) -> Result<()> {
    require_no_wallet(device)?;
    let wallet = device.generate_wallet().context("wallet generation failed")?;
    let record = device
        .store_wallet(&wallet.mnemonic, &wallet.key_ref)
        .context("failed to store the new wallet")?;
    info!(address = %record.address_string(), "wallet created");

    eprintln!("Write the recovery phrase down now. It will not be shown again.");
    println!("address: {}", record.address_string());
    println!("phrase:  {}", wallet.mnemonic.as_str());
    Ok(())
}

pub fn import(device: &Device, args: &ImportArgs) -> Result<()> {
    require_no_wallet(device)?;
    let phrase = Zeroizing::new(frames::read_lines(&args.phrase_file)?.join(" "));
    let wallet = device
        .import_wallet(&phrase)
        .context("recovery phrase rejected")?;
    let record = device
        .store_wallet(&wallet.mnemonic, &wallet.key_ref)
        .context("failed to store the imported wallet")?;
    info!(address = %record.address_string(), "wallet imported");
    println!("address: {}", record.address_string());
    Ok(())
}

pub fn address(device: &Device) -> Result<()> {
    match device.load_address().context("failed to read the wallet")? {
        Some(address) => {
            println!("{}", address.to_checksum(None));
            Ok(())
        }
        None => bail!("no wallet on this device"),
    }
}

pub fn delete(device: &mut Device, args: &DeleteArgs) -> Result<()> {
    let Some(address) = device.load_address().context("failed to read the wallet")? else {
        bail!("no wallet on this device");
    };
    if !args.yes && !frames::confirm(&format!("Erase wallet {address}? This cannot be undone."))? {
        bail!("aborted");
    }
    device.delete_wallet().context("failed to erase the wallet")?;
    info!(%address, "wallet erased");
    Ok(())
}

/// Scans a request, shows the review, and prints the signed frames.
pub async fn sign(device: &mut Device, args: &SignArgs) -> Result<()> {
    if !device.has_wallet().context("failed to check for a wallet")? {
        bail!("no wallet on this device; run `airlock wallet generate` first");
    }
    if args.frames == STDIN && !args.yes {
        bail!("frames on stdin leave nothing to answer the approval prompt with; pass --frames <file> or --yes");
    }

    let lines = frames::read_lines(&args.frames)?;
    let mut progress = (0, 0);
    let mut decoded = None;
    for (n, line) in lines.iter().enumerate() {
        match device
            .feed_scan_frame(line)
            .with_context(|| format!("frame on line {} rejected", n + 1))?
        {
            ScanStatus::Pending { received, expected } => progress = (received, expected),
            ScanStatus::Decoded { tx, summary } => {
                if n + 1 < lines.len() {
                    debug!(skipped = lines.len() - n - 1, "frames after the complete request ignored");
                }
                decoded = Some((tx, summary));
                break;
            }
            ScanStatus::Ignored => debug!(line = n + 1, "frame ignored"),
        }
    }
    let Some((tx, summary)) = decoded else {
        bail!(
            "request incomplete: {} of {} frames scanned",
            progress.0,
            progress.1
        );
    };

    eprintln!("Review the transaction:\n{summary}");
    if !approved(&summary, args)? {
        device.reject()?;
        bail!("transaction rejected");
    }

    let signed = device.approve_and_sign(&tx).await.context("signing failed")?;
    let shown = device
        .signed_frames()
        .context("signed frames missing after signing")?;
    info!(tx_hash = %signed.tx_hash(), frames = shown.len(), "show these to the hot wallet");
    frames::print(&shown)?;
    device.finish_transfer()?;
    Ok(())
}

fn approved(summary: &TransactionSummary, args: &SignArgs) -> Result<bool> {
    if !args.yes {
        return frames::confirm("Sign this transaction?");
    }
    if summary.has_warnings() && !args.accept_warnings {
        warn!(
            warnings = summary.warnings.len(),
            "--yes does not cover review warnings; add --accept-warnings"
        );
        return Ok(false);
    }
    Ok(true)
}
