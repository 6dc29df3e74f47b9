//! Transaction composition via the builder pattern.
//!
//! The [`TransactionBuilder`] is where a hot-side send request turns into an
//! [`UnsignedTransaction`]: pick the shape, set the fields, call `.build()`,
//! get back a validated request or the first reason it is unacceptable.
//!
//! The builder does not sign and never sees key material. That happens on
//! the other side of the air gap, in [`super::signing`].

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::types::{FeeFields, TxType, UnsignedTransaction};
use super::verification::{parse_address, validate_unsigned, TransactionError};
use crate::config::MIN_GAS_LIMIT;

// ---------------------------------------------------------------------------
// ComposeParams
// ---------------------------------------------------------------------------

/// UI-facing send request, with the recipient as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeParams {
    pub chain_id: u64,
    pub to: String,
    /// Amount in wei.
    pub value: U256,
    pub nonce: u64,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    pub fees: FeeFields,
    #[serde(default, with = "hex::serde")]
    pub data: Vec<u8>,
}

fn default_gas_limit() -> u64 {
    MIN_GAS_LIMIT
}

impl ComposeParams {
    /// Runs the request through the builder.
    pub fn compose(&self) -> Result<UnsignedTransaction, TransactionError> {
        let builder = match self.fees {
            FeeFields::Legacy { gas_price } => {
                TransactionBuilder::legacy(self.chain_id).gas_price(gas_price)
            }
            FeeFields::Eip1559 {
                max_priority_fee_per_gas,
                max_fee_per_gas,
            } => TransactionBuilder::eip1559(self.chain_id)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .max_fee_per_gas(max_fee_per_gas),
        };

        builder
            .to(parse_address(&self.to)?)
            .value(self.value)
            .nonce(self.nonce)
            .gas_limit(self.gas_limit)
            .data(self.data.clone())
            .build()
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`UnsignedTransaction`].
///
/// ```rust
/// use airlock_protocol::transaction::TransactionBuilder;
/// use alloy_primitives::{Address, U256};
///
/// let tx = TransactionBuilder::legacy(1)
///     .to(Address::repeat_byte(0x35))
///     .value(U256::from(1_000_000_000_000_000_000u128))
///     .nonce(9)
///     .gas_price(20_000_000_000)
///     .build()
///     .unwrap();
/// assert_eq!(tx.gas_limit, 21_000);
/// ```
///
/// Defaults: nonce 0, value 0, gas limit 21000, empty data, all fees 0.
/// The recipient has no default and must be set.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    tx_type: TxType,
    chain_id: u64,
    nonce: u64,
    to: Option<Address>,
    value: U256,
    gas_limit: u64,
    gas_price: u128,
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
    data: Vec<u8>,
}

impl TransactionBuilder {
    fn new(tx_type: TxType, chain_id: u64) -> Self {
        Self {
            tx_type,
            chain_id,
            nonce: 0,
            to: None,
            value: U256::ZERO,
            gas_limit: MIN_GAS_LIMIT,
            gas_price: 0,
            max_fee_per_gas: 0,
            max_priority_fee_per_gas: 0,
            data: Vec::new(),
        }
    }

    /// Starts a legacy (EIP-155) transaction.
    pub fn legacy(chain_id: u64) -> Self {
        Self::new(TxType::Legacy, chain_id)
    }

    /// Starts a fee-market (EIP-1559) transaction.
    pub fn eip1559(chain_id: u64) -> Self {
        Self::new(TxType::Eip1559, chain_id)
    }

    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Gas price for legacy transactions. Ignored for EIP-1559.
    pub fn gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Fee cap for EIP-1559 transactions. Ignored for legacy.
    pub fn max_fee_per_gas(mut self, fee: u128) -> Self {
        self.max_fee_per_gas = fee;
        self
    }

    /// Tip for EIP-1559 transactions. Ignored for legacy.
    pub fn max_priority_fee_per_gas(mut self, fee: u128) -> Self {
        self.max_priority_fee_per_gas = fee;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Consumes the builder and returns a validated request.
    pub fn build(self) -> Result<UnsignedTransaction, TransactionError> {
        let to = self.to.ok_or(TransactionError::MissingField("to"))?;
        let fees = match self.tx_type {
            TxType::Legacy => FeeFields::Legacy {
                gas_price: self.gas_price,
            },
            TxType::Eip1559 => FeeFields::Eip1559 {
                max_priority_fee_per_gas: self.max_priority_fee_per_gas,
                max_fee_per_gas: self.max_fee_per_gas,
            },
        };

        let tx = UnsignedTransaction {
            chain_id: self.chain_id,
            nonce: self.nonce,
            to,
            value: self.value,
            gas_limit: self.gas_limit,
            fees,
            data: self.data,
        };
        validate_unsigned(&tx)?;
        Ok(tx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_defaults() {
        let tx = TransactionBuilder::legacy(1)
            .to(Address::repeat_byte(0x01))
            .build()
            .unwrap();
        assert_eq!(tx.tx_type(), TxType::Legacy);
        assert_eq!(tx.nonce, 0);
        assert_eq!(tx.value, U256::ZERO);
        assert_eq!(tx.gas_limit, MIN_GAS_LIMIT);
        assert!(tx.data.is_empty());
    }

    #[test]
    fn eip1559_fields_land_in_fee_variant() {
        let tx = TransactionBuilder::eip1559(10)
            .to(Address::repeat_byte(0x02))
            .max_fee_per_gas(50)
            .max_priority_fee_per_gas(2)
            .gas_price(999)
            .build()
            .unwrap();
        assert_eq!(
            tx.fees,
            FeeFields::Eip1559 {
                max_priority_fee_per_gas: 2,
                max_fee_per_gas: 50
            }
        );
    }

    #[test]
    fn missing_recipient_is_an_error() {
        let err = TransactionBuilder::legacy(1).build().unwrap_err();
        assert_eq!(err, TransactionError::MissingField("to"));
    }

    #[test]
    fn build_runs_validation() {
        let err = TransactionBuilder::legacy(1)
            .to(Address::repeat_byte(0x03))
            .gas_limit(100)
            .build()
            .unwrap_err();
        assert!(matches!(err, TransactionError::GasLimitTooLow { .. }));
    }

    #[test]
    fn compose_params_parse_recipient() {
        let params = ComposeParams {
            chain_id: 1,
            to: "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F".into(),
            value: U256::from(5u8),
            nonce: 3,
            gas_limit: 21_000,
            fees: FeeFields::Legacy { gas_price: 7 },
            data: vec![],
        };
        let tx = params.compose().unwrap();
        assert_eq!(tx.to.to_checksum(None), params.to);
        assert_eq!(tx.nonce, 3);
    }

    #[test]
    fn compose_params_reject_bad_recipient() {
        let params = ComposeParams {
            chain_id: 1,
            to: "not-an-address".into(),
            value: U256::ZERO,
            nonce: 0,
            gas_limit: 21_000,
            fees: FeeFields::Legacy { gas_price: 1 },
            data: vec![],
        };
        assert!(matches!(
            params.compose(),
            Err(TransactionError::InvalidRecipient { .. })
        ));
    }

    #[test]
    fn compose_params_from_json_defaults_gas_and_data() {
        let params: ComposeParams = serde_json::from_str(
            r#"{
                "chain_id": 1,
                "to": "0x3535353535353535353535353535353535353535",
                "value": "0xde0b6b3a7640000",
                "nonce": 9,
                "fees": { "legacy": { "gas_price": 20000000000 } }
            }"#,
        )
        .unwrap();
        let tx = params.compose().unwrap();
        assert_eq!(tx.gas_limit, 21_000);
        assert_eq!(tx.value, U256::from(1_000_000_000_000_000_000u128));
    }
}
