//! Hot role: compose a request, then check and broadcast the signed reply.
//!
//! The hot side keeps no state between runs. `verify` re-reads the request
//! frames it printed earlier and rebuilds the pending request from them.

use alloy_primitives::{B256, U256};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use airlock_protocol::codec::{self, QrPayload};
use airlock_protocol::config::ProtocolConfig;
use airlock_protocol::transaction::{parse_address, ComposeParams, FeeFields, SignedTransaction, Transaction};
use airlock_protocol::transfer::{drive_hot, scan_channel, Broadcaster, HotSession, ScanEvent, TransferError};

use crate::cli::{ComposeArgs, VerifyArgs};
use crate::frames;

/// Broadcasts by printing. The CLI has no network code; pipe the line into
/// whatever talks to your node.
pub struct StdoutBroadcaster;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastLine {
    raw_hex: String,
    tx_hash: B256,
}

#[async_trait]
impl Broadcaster for StdoutBroadcaster {
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<B256, String> {
        let line = BroadcastLine {
            raw_hex: signed.raw_hex(),
            tx_hash: signed.tx_hash(),
        };
        let json = serde_json::to_string(&line).map_err(|e| e.to_string())?;
        println!("{json}");
        Ok(line.tx_hash)
    }
}

fn parse_value(raw: &str) -> Result<U256> {
    raw.trim()
        .parse::<U256>()
        .map_err(|e| anyhow!("invalid --value {raw:?}: {e}"))
}

fn parse_data(raw: Option<&str>) -> Result<Vec<u8>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let digits = raw.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    hex::decode(digits).with_context(|| format!("invalid --data {raw:?}"))
}

pub(crate) fn compose_params(chain_id: u64, args: &ComposeArgs) -> Result<ComposeParams> {
    let fees = match (args.gas_price, args.max_fee, args.priority_fee) {
        (Some(gas_price), None, None) => FeeFields::Legacy { gas_price },
        (None, Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) => FeeFields::Eip1559 {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        },
        _ => bail!("give either --gas-price, or both --max-fee and --priority-fee"),
    };
    Ok(ComposeParams {
        chain_id,
        to: args.to.clone(),
        value: parse_value(&args.value)?,
        nonce: args.nonce,
        gas_limit: args.gas_limit,
        fees,
        data: parse_data(args.data.as_deref())?,
    })
}

pub fn compose(config: &ProtocolConfig, args: &ComposeArgs) -> Result<()> {
    let params = compose_params(config.chain_id, args)?;
    let mut session = HotSession::new(config.clone());
    let shown: Vec<String> = session
        .compose(&params)
        .context("could not build the request")?
        .iter()
        .map(QrPayload::to_qr_string)
        .collect();
    frames::print(&shown)
}

pub async fn verify(config: &ProtocolConfig, args: &VerifyArgs) -> Result<()> {
    let request_path = args.request.display().to_string();
    let request_frames = frames::read_lines(&request_path)?
        .iter()
        .map(|line| QrPayload::from_qr_string(line))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("request frames in {request_path} do not parse"))?;
    let request = match codec::decode(&request_frames)
        .with_context(|| format!("request frames in {request_path} do not decode"))?
    {
        Transaction::Unsigned(tx) => tx,
        Transaction::Signed(_) => bail!("{request_path} holds a signed transaction, not a request"),
    };

    let mut session = HotSession::new(config.clone());
    if let Some(signer) = &args.expected_signer {
        let signer = parse_address(signer).context("invalid --expected-signer")?;
        session = session.with_expected_signer(signer);
    }
    // Same group as the printed frames, so rescanning them is harmless.
    let group_id = request_frames[0].group_id();
    session
        .submit_with_group(request, group_id)
        .context("request no longer validates")?;

    let signed_lines = frames::read_lines(&args.signed)?;
    let (events, mut inbox) = scan_channel();
    let feeder = tokio::spawn(async move {
        for line in signed_lines {
            if events.send(ScanEvent::Frame(line)).await.is_err() {
                break;
            }
        }
    });

    let outcome = drive_hot(&mut session, &mut inbox, &StdoutBroadcaster).await;
    drop(inbox);
    let _ = feeder.await;

    let tx_hash = outcome.map_err(|e| match e {
        TransferError::UserCancelled => {
            anyhow!("signed frames ran out before a complete transaction was scanned")
        }
        other => anyhow::Error::new(other).context("signed reply refused"),
    })?;
    info!(%tx_hash, "signed transaction verified and handed off");
    Ok(())
}
