//! Transaction body layouts.
//!
//! ```text
//! unsigned: txType:u8 | chainId | nonce | to:20 | value | fees | gasLimit | dataLen | data
//!   fees (legacy):   gasPrice
//!   fees (eip1559):  maxPriorityFeePerGas | maxFeePerGas
//! signed:   <unsigned> | r:32 | s:32 | recoveryId:1
//! ```
//!
//! Numeric fields use the varint encoding from [`super::varint`]. Which of
//! the two layouts applies is decided by the frame version, never guessed
//! from the body length.

use alloy_primitives::Address;

use super::error::{DecodeError, EncodeError};
use super::varint::{put_u128, put_u256, put_u64, ByteReader};
use crate::config::{
    ADDRESS_LENGTH, MAX_DATA_LENGTH, SIGNATURE_LENGTH, WIRE_VERSION_SIGNED, WIRE_VERSION_UNSIGNED,
};
use crate::crypto::keys::RecoverableSignature;
use crate::transaction::canonical;
use crate::transaction::types::{FeeFields, Transaction, TxType, UnsignedTransaction};

/// The frame version tag for a transaction of this kind.
pub fn version_for(tx: &Transaction) -> u8 {
    match tx {
        Transaction::Unsigned(_) => WIRE_VERSION_UNSIGNED,
        Transaction::Signed(_) => WIRE_VERSION_SIGNED,
    }
}

/// Serializes a transaction body.
pub fn encode_body(tx: &Transaction) -> Result<Vec<u8>, EncodeError> {
    let unsigned = tx.unsigned();
    if unsigned.data.len() > MAX_DATA_LENGTH {
        return Err(EncodeError::DataTooLarge {
            len: unsigned.data.len(),
            max: MAX_DATA_LENGTH,
        });
    }

    let mut out = Vec::with_capacity(96 + unsigned.data.len() + SIGNATURE_LENGTH);
    put_unsigned(unsigned, &mut out);
    if let Transaction::Signed(signed) = tx {
        out.extend_from_slice(&signed.signature().to_bytes());
    }
    Ok(out)
}

fn put_unsigned(tx: &UnsignedTransaction, out: &mut Vec<u8>) {
    out.push(tx.tx_type().as_byte());
    put_u64(out, tx.chain_id);
    put_u64(out, tx.nonce);
    out.extend_from_slice(tx.to.as_slice());
    put_u256(out, &tx.value);
    match tx.fees {
        FeeFields::Legacy { gas_price } => put_u128(out, gas_price),
        FeeFields::Eip1559 {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        } => {
            put_u128(out, max_priority_fee_per_gas);
            put_u128(out, max_fee_per_gas);
        }
    }
    put_u64(out, tx.gas_limit);
    put_u64(out, tx.data.len() as u64);
    out.extend_from_slice(&tx.data);
}

/// Parses a body whose frames have already passed the checksum.
pub fn decode_body(version: u8, body: &[u8]) -> Result<Transaction, DecodeError> {
    let mut reader = ByteReader::new(body);
    let tx = match version {
        WIRE_VERSION_UNSIGNED => Transaction::Unsigned(read_unsigned(&mut reader)?),
        WIRE_VERSION_SIGNED => {
            let unsigned = read_unsigned(&mut reader)?;
            let raw = reader.array::<SIGNATURE_LENGTH>("signature")?;
            let signature = RecoverableSignature::from_bytes(&raw)
                .map_err(|e| DecodeError::format(format!("signature: {e}")))?;
            Transaction::Signed(canonical::assemble(unsigned, signature))
        }
        other => return Err(DecodeError::UnsupportedVersion(other)),
    };
    reader.finish()?;
    Ok(tx)
}

fn read_unsigned(reader: &mut ByteReader<'_>) -> Result<UnsignedTransaction, DecodeError> {
    let type_byte = reader.u8("txType")?;
    let tx_type = TxType::from_byte(type_byte)
        .ok_or_else(|| DecodeError::format(format!("unknown txType 0x{type_byte:02x}")))?;

    let chain_id = reader.u64("chainId")?;
    let nonce = reader.u64("nonce")?;
    let to = Address::from(reader.array::<ADDRESS_LENGTH>("to")?);
    let value = reader.u256("value")?;
    let fees = match tx_type {
        TxType::Legacy => FeeFields::Legacy {
            gas_price: reader.u128("gasPrice")?,
        },
        TxType::Eip1559 => FeeFields::Eip1559 {
            max_priority_fee_per_gas: reader.u128("maxPriorityFeePerGas")?,
            max_fee_per_gas: reader.u128("maxFeePerGas")?,
        },
    };
    let gas_limit = reader.u64("gasLimit")?;

    let data_len = reader.u64("dataLen")?;
    if data_len > MAX_DATA_LENGTH as u64 {
        return Err(DecodeError::format(format!(
            "dataLen {data_len} exceeds limit {MAX_DATA_LENGTH}"
        )));
    }
    let data = reader.take(data_len as usize, "data")?.to_vec();

    Ok(UnsignedTransaction {
        chain_id,
        nonce,
        to,
        value,
        gas_limit,
        fees,
        data,
    })
}
