//! # Verification Presenter
//!
//! Turns a decoded request into what a human needs to see before saying
//! yes: who gets paid, how much, the worst-case fee, a fingerprint of any
//! calldata, and a list of things that look off.
//!
//! Pure function, no I/O, no key access. Warnings are advisory: they never
//! block approval on their own, but the cold session refuses to approve
//! until a summary (warnings included) has been produced.

use std::fmt;

use alloy_primitives::{B256, U256};
use serde::Serialize;

use crate::config::{ProtocolConfig, WEI_PER_ETHER};
use crate::crypto::hash::keccak256;
use crate::transaction::canonical::signing_hash;
use crate::transaction::types::{FeeFields, TxType, UnsignedTransaction};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What the reviewing device considers normal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPolicy {
    pub expected_chain_id: u64,
    /// Fees above this many wei are flagged.
    pub fee_ceiling_wei: U256,
}

impl ReviewPolicy {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            expected_chain_id: config.chain_id,
            fee_ceiling_wei: config.fee_ceiling_wei,
        }
    }
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self::from_config(&ProtocolConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Something about a request that deserves a second look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Calldata on what is presented as a plain value transfer. Could be a
    /// token approval in disguise.
    NonEmptyData { len: usize },

    ChainIdMismatch { expected: u64, actual: u64 },

    FeeAboveCeiling { fee: U256, ceiling: U256 },

    /// The tip exceeds the fee cap, so the request was not built by a sane
    /// wallet.
    PriorityFeeAboveMaxFee { priority: u128, max: u128 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonEmptyData { len } => {
                write!(f, "non-empty data ({len} bytes) on a simple transfer")
            }
            Self::ChainIdMismatch { expected, actual } => {
                write!(f, "chain id {actual} does not match this wallet's chain {expected}")
            }
            Self::FeeAboveCeiling { fee, ceiling } => write!(
                f,
                "maximum fee {} ETH exceeds the configured ceiling {} ETH",
                format_ether(fee),
                format_ether(ceiling)
            ),
            Self::PriorityFeeAboveMaxFee { priority, max } => {
                write!(f, "priority fee {priority} wei exceeds max fee {max} wei")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// The review screen, as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    /// EIP-55 checksummed recipient.
    pub recipient: String,
    /// Exact amount in wei.
    pub amount: U256,
    /// The amount in ether, all 18 decimals significant.
    pub amount_ether: String,
    /// Worst-case fee in wei: gas limit times the highest price per gas.
    pub fee_estimate: U256,
    pub fee_estimate_ether: String,
    /// `0x`-prefixed keccak256 of the calldata, `None` if there is none.
    pub data_digest: Option<String>,
    pub data_len: usize,
    pub chain_id: u64,
    pub nonce: u64,
    pub tx_type: TxType,
    /// The digest approval binds to.
    pub signing_hash: B256,
    pub warnings: Vec<Warning>,
}

impl TransactionSummary {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  to:        {}", self.recipient)?;
        writeln!(f, "  amount:    {} ETH ({} wei)", self.amount_ether, self.amount)?;
        writeln!(f, "  max fee:   {} ETH", self.fee_estimate_ether)?;
        writeln!(f, "  chain id:  {}", self.chain_id)?;
        writeln!(f, "  nonce:     {}", self.nonce)?;
        writeln!(f, "  type:      {}", self.tx_type)?;
        match &self.data_digest {
            Some(digest) => writeln!(f, "  data:      {} bytes, keccak {digest}", self.data_len)?,
            None => writeln!(f, "  data:      none")?,
        }
        write!(f, "  sign hash: {}", self.signing_hash)?;
        for warning in &self.warnings {
            write!(f, "\n  WARNING:   {warning}")?;
        }
        Ok(())
    }
}

/// Builds the review summary for `tx` under `policy`.
pub fn summarize(tx: &UnsignedTransaction, policy: &ReviewPolicy) -> TransactionSummary {
    let fee_estimate = tx.max_fee();
    let mut warnings = Vec::new();

    if !tx.data.is_empty() {
        warnings.push(Warning::NonEmptyData { len: tx.data.len() });
    }
    if tx.chain_id != policy.expected_chain_id {
        warnings.push(Warning::ChainIdMismatch {
            expected: policy.expected_chain_id,
            actual: tx.chain_id,
        });
    }
    if fee_estimate > policy.fee_ceiling_wei {
        warnings.push(Warning::FeeAboveCeiling {
            fee: fee_estimate,
            ceiling: policy.fee_ceiling_wei,
        });
    }
    if let FeeFields::Eip1559 {
        max_priority_fee_per_gas,
        max_fee_per_gas,
    } = tx.fees
    {
        if max_priority_fee_per_gas > max_fee_per_gas {
            warnings.push(Warning::PriorityFeeAboveMaxFee {
                priority: max_priority_fee_per_gas,
                max: max_fee_per_gas,
            });
        }
    }

    TransactionSummary {
        recipient: tx.to.to_checksum(None),
        amount: tx.value,
        amount_ether: format_ether(&tx.value),
        fee_estimate,
        fee_estimate_ether: format_ether(&fee_estimate),
        data_digest: (!tx.data.is_empty()).then(|| format!("{}", keccak256(&tx.data))),
        data_len: tx.data.len(),
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        tx_type: tx.tx_type(),
        signing_hash: signing_hash(tx),
        warnings,
    }
}

/// Formats wei as ether with trailing zeros trimmed (`1.5`, `0.000000001`,
/// `2`).
pub fn format_ether(wei: &U256) -> String {
    let unit = U256::from(WEI_PER_ETHER);
    let whole = *wei / unit;
    let frac = *wei % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>18}", frac.to_string());
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
