//! Structural validation of transaction requests and recipient parsing.
//!
//! Runs on the hot side before anything is encoded and again on the cold
//! side before a decoded request is offered for approval, so a
//! hand-crafted frame cannot smuggle in a request the builder would have
//! refused. Checks are cheap and ordered so the first failure is the
//! most useful one to show the operator.

use alloy_primitives::Address;
use thiserror::Error;

use super::types::{FeeFields, UnsignedTransaction};
use crate::config::{MAX_DATA_LENGTH, MIN_GAS_LIMIT};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reasons a transaction request is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The recipient is not a 20-byte hex address.
    #[error("invalid recipient `{input}`: {reason}")]
    InvalidRecipient { input: String, reason: String },

    /// A required builder field was never set.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Chain id 0 is not a chain.
    #[error("chain id must be non-zero")]
    InvalidChainId,

    /// Below the intrinsic cost of any transaction.
    #[error("gas limit {gas_limit} below the intrinsic minimum {minimum}")]
    GasLimitTooLow { gas_limit: u64, minimum: u64 },

    #[error("calldata is {len} bytes, limit is {max}")]
    DataTooLarge { len: usize, max: usize },

    /// A tip above the fee cap can never be paid in full.
    #[error("priority fee {priority} exceeds max fee {max}")]
    PriorityFeeAboveMaxFee { priority: u128, max: u128 },

    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks an unsigned transaction for structural validity.
///
/// 1. **Chain id**: non-zero.
/// 2. **Gas limit**: at least 21000.
/// 3. **Calldata**: at most [`MAX_DATA_LENGTH`] bytes.
/// 4. **Fees**: for EIP-1559, the tip must not exceed the fee cap.
pub fn validate_unsigned(tx: &UnsignedTransaction) -> Result<(), TransactionError> {
    if tx.chain_id == 0 {
        return Err(TransactionError::InvalidChainId);
    }

    if tx.gas_limit < MIN_GAS_LIMIT {
        return Err(TransactionError::GasLimitTooLow {
            gas_limit: tx.gas_limit,
            minimum: MIN_GAS_LIMIT,
        });
    }

    if tx.data.len() > MAX_DATA_LENGTH {
        return Err(TransactionError::DataTooLarge {
            len: tx.data.len(),
            max: MAX_DATA_LENGTH,
        });
    }

    match tx.fees {
        FeeFields::Legacy { .. } => {}
        FeeFields::Eip1559 {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        } => {
            if max_priority_fee_per_gas > max_fee_per_gas {
                return Err(TransactionError::PriorityFeeAboveMaxFee {
                    priority: max_priority_fee_per_gas,
                    max: max_fee_per_gas,
                });
            }
        }
    }

    Ok(())
}

/// Parses a `0x`-prefixed (or bare) hex address.
///
/// All-lowercase and all-uppercase input is accepted as-is. Mixed case is
/// taken as an EIP-55 checksum and must be correct: a typo in a checksummed
/// address is exactly what this catches.
pub fn parse_address(input: &str) -> Result<Address, TransactionError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let invalid = |reason: &str| TransactionError::InvalidRecipient {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if digits.len() != 40 {
        return Err(invalid("expected 40 hex digits"));
    }
    let bytes = hex::decode(digits).map_err(|_| invalid("not hexadecimal"))?;
    let address = Address::from_slice(&bytes);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && address.to_checksum(None)[2..] != *digits {
        return Err(invalid("EIP-55 checksum mismatch"));
    }

    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn valid_tx() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1,
            nonce: 0,
            to: Address::repeat_byte(0x11),
            value: U256::from(1u8),
            gas_limit: 21_000,
            fees: FeeFields::Legacy {
                gas_price: 1_000_000_000,
            },
            data: vec![],
        }
    }

    #[test]
    fn valid_transaction_passes() {
        validate_unsigned(&valid_tx()).unwrap();
    }

    #[test]
    fn zero_chain_id_rejected() {
        let tx = UnsignedTransaction {
            chain_id: 0,
            ..valid_tx()
        };
        assert_eq!(validate_unsigned(&tx), Err(TransactionError::InvalidChainId));
    }

    #[test]
    fn low_gas_limit_rejected() {
        let tx = UnsignedTransaction {
            gas_limit: 20_999,
            ..valid_tx()
        };
        assert!(matches!(
            validate_unsigned(&tx),
            Err(TransactionError::GasLimitTooLow { .. })
        ));
    }

    #[test]
    fn oversized_data_rejected() {
        let tx = UnsignedTransaction {
            data: vec![0; MAX_DATA_LENGTH + 1],
            ..valid_tx()
        };
        assert!(matches!(
            validate_unsigned(&tx),
            Err(TransactionError::DataTooLarge { .. })
        ));
    }

    #[test]
    fn tip_above_cap_rejected() {
        let tx = UnsignedTransaction {
            fees: FeeFields::Eip1559 {
                max_priority_fee_per_gas: 10,
                max_fee_per_gas: 9,
            },
            ..valid_tx()
        };
        assert_eq!(
            validate_unsigned(&tx),
            Err(TransactionError::PriorityFeeAboveMaxFee {
                priority: 10,
                max: 9
            })
        );
    }

    #[test]
    fn parses_checksummed_and_plain_addresses() {
        let checksummed = "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F";
        let a = parse_address(checksummed).unwrap();
        let b = parse_address(&checksummed.to_lowercase()).unwrap();
        let c = parse_address(&checksummed[2..].to_uppercase()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn bad_checksum_rejected() {
        // Last letter's case flipped.
        let err = parse_address("0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4f").unwrap_err();
        assert!(matches!(err, TransactionError::InvalidRecipient { .. }));
    }

    #[test]
    fn wrong_length_and_garbage_rejected() {
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzz8A62f656a8d1615C1294fd71e9CFb3E4855A4F").is_err());
    }
}
