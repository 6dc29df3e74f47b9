//! Core type definitions for transactions crossing the air gap.
//!
//! The legacy / fee-market split is a tagged variant ([`FeeFields`]), not a
//! bag of optional fields. Every consumer (codec, canonicalizer, presenter)
//! matches on it exhaustively, so adding a third shape is a compile error
//! everywhere it matters.

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::config::{TX_TYPE_EIP1559, TX_TYPE_LEGACY};
use crate::crypto::keys::RecoverableSignature;

// ---------------------------------------------------------------------------
// TxType
// ---------------------------------------------------------------------------

/// EIP-2718 transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// Pre-2718 transaction with EIP-155 replay protection.
    Legacy,
    /// EIP-1559 fee-market transaction (type 2).
    Eip1559,
}

impl TxType {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Legacy => TX_TYPE_LEGACY,
            Self::Eip1559 => TX_TYPE_EIP1559,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            TX_TYPE_LEGACY => Some(Self::Legacy),
            TX_TYPE_EIP1559 => Some(Self::Eip1559),
            _ => None,
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Eip1559 => write!(f, "eip1559"),
        }
    }
}

// ---------------------------------------------------------------------------
// FeeFields
// ---------------------------------------------------------------------------

/// Fee fields, tagged by transaction shape. Amounts are in wei per gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeFields {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_priority_fee_per_gas: u128,
        max_fee_per_gas: u128,
    },
}

impl FeeFields {
    pub fn tx_type(&self) -> TxType {
        match self {
            Self::Legacy { .. } => TxType::Legacy,
            Self::Eip1559 { .. } => TxType::Eip1559,
        }
    }

    /// The most the sender can pay per unit of gas.
    pub fn max_price_per_gas(&self) -> u128 {
        match self {
            Self::Legacy { gas_price } => *gas_price,
            Self::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

// ---------------------------------------------------------------------------
// UnsignedTransaction
// ---------------------------------------------------------------------------

/// A transaction request composed on the hot side, before signing.
///
/// Transient by design: it lives until it is encoded for display or
/// discarded, and is never written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    /// Recipient account. Contract creation is not supported, so this is
    /// always present.
    pub to: Address,
    /// Amount in wei.
    pub value: U256,
    pub gas_limit: u64,
    pub fees: FeeFields,
    /// Calldata. Empty for a plain value transfer.
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

impl UnsignedTransaction {
    pub fn tx_type(&self) -> TxType {
        self.fees.tx_type()
    }

    /// Worst-case fee: `gas_limit * max_price_per_gas`.
    pub fn max_fee(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.fees.max_price_per_gas())
    }
}

// ---------------------------------------------------------------------------
// SignedTransaction
// ---------------------------------------------------------------------------

/// A transaction signed on the cold side, ready for broadcast.
///
/// `raw` and `tx_hash` are derived from `unsigned` and `signature` when the
/// value is assembled (see [`super::canonical::assemble`]), so two values
/// with equal inputs are equal in every field.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub(crate) unsigned: UnsignedTransaction,
    pub(crate) signature: RecoverableSignature,
    pub(crate) raw: Vec<u8>,
    pub(crate) tx_hash: B256,
}

impl SignedTransaction {
    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn signature(&self) -> &RecoverableSignature {
        &self.signature
    }

    /// The fully serialized, signature-included transaction.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// `0x`-prefixed hex of [`Self::raw`], as `eth_sendRawTransaction` wants it.
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }
}

impl fmt::Debug for SignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTransaction")
            .field("tx_hash", &self.tx_hash)
            .field("tx_type", &self.unsigned.tx_type())
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Either kind of transaction the codec can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Unsigned(UnsignedTransaction),
    Signed(SignedTransaction),
}

impl Transaction {
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed(_))
    }

    /// The unsigned fields, whichever kind this is.
    pub fn unsigned(&self) -> &UnsignedTransaction {
        match self {
            Self::Unsigned(tx) => tx,
            Self::Signed(tx) => &tx.unsigned,
        }
    }
}

impl From<UnsignedTransaction> for Transaction {
    fn from(tx: UnsignedTransaction) -> Self {
        Self::Unsigned(tx)
    }
}

impl From<SignedTransaction> for Transaction {
    fn from(tx: SignedTransaction) -> Self {
        Self::Signed(tx)
    }
}
