//! Chain canonicalization: the exact bytes Ethereum hashes and broadcasts.
//!
//! | Shape    | Signing payload                                                          |
//! |----------|--------------------------------------------------------------------------|
//! | Legacy   | `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])`       |
//! | EIP-1559 | `0x02 ‖ rlp([chainId, nonce, tip, feeCap, gasLimit, to, value, data, []])` |
//!
//! The signed envelope swaps the EIP-155 trailer (legacy) or appends
//! `yParity, r, s` (EIP-1559). Field order is the same as in the wire body
//! layout, so the codec and the canonicalizer agree on one field list even
//! though their integer encodings differ.

use alloy_primitives::{B256, U256};
use alloy_rlp::{Encodable, Header};

use super::types::{FeeFields, SignedTransaction, TxType, UnsignedTransaction};
use crate::crypto::hash::keccak256;
use crate::crypto::keys::RecoverableSignature;

/// Bytes the signer hashes.
pub fn signing_payload(tx: &UnsignedTransaction) -> Vec<u8> {
    let mut fields = Vec::with_capacity(128 + tx.data.len());
    match tx.fees {
        FeeFields::Legacy { .. } => {
            encode_common_fields(tx, &mut fields);
            tx.chain_id.encode(&mut fields);
            0u8.encode(&mut fields);
            0u8.encode(&mut fields);
        }
        FeeFields::Eip1559 { .. } => {
            encode_common_fields(tx, &mut fields);
        }
    }
    wrap(tx.tx_type(), &fields)
}

/// `keccak256(signing_payload(tx))`.
pub fn signing_hash(tx: &UnsignedTransaction) -> B256 {
    keccak256(&signing_payload(tx))
}

/// The broadcastable envelope for `tx` carrying `signature`.
pub fn signed_envelope(tx: &UnsignedTransaction, signature: &RecoverableSignature) -> Vec<u8> {
    let mut fields = Vec::with_capacity(200 + tx.data.len());
    encode_common_fields(tx, &mut fields);

    match tx.fees {
        FeeFields::Legacy { .. } => {
            // EIP-155: v = recovery_id + 35 + 2 * chain_id. Computed in u128
            // so a pathological chain id cannot overflow.
            let v = u128::from(signature.recovery_id()) + 35 + 2 * u128::from(tx.chain_id);
            v.encode(&mut fields);
        }
        FeeFields::Eip1559 { .. } => {
            signature.recovery_id().encode(&mut fields);
        }
    }
    U256::from_be_bytes(*signature.r()).encode(&mut fields);
    U256::from_be_bytes(*signature.s()).encode(&mut fields);

    wrap(tx.tx_type(), &fields)
}

/// Builds the [`SignedTransaction`] for `tx` and `signature`, deriving the
/// raw envelope and its hash.
///
/// Does not check the signature. That is the signing engine's job on the
/// cold side and the session's job on the hot side.
pub fn assemble(tx: UnsignedTransaction, signature: RecoverableSignature) -> SignedTransaction {
    let raw = signed_envelope(&tx, &signature);
    let tx_hash = keccak256(&raw);
    SignedTransaction {
        unsigned: tx,
        signature,
        raw,
        tx_hash,
    }
}

/// Everything up to and including `data`, plus the empty access list for
/// EIP-1559.
fn encode_common_fields(tx: &UnsignedTransaction, out: &mut Vec<u8>) {
    match tx.fees {
        FeeFields::Legacy { gas_price } => {
            tx.nonce.encode(out);
            gas_price.encode(out);
            tx.gas_limit.encode(out);
            tx.to.encode(out);
            tx.value.encode(out);
            Encodable::encode(&tx.data[..], out);
        }
        FeeFields::Eip1559 {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        } => {
            tx.chain_id.encode(out);
            tx.nonce.encode(out);
            max_priority_fee_per_gas.encode(out);
            max_fee_per_gas.encode(out);
            tx.gas_limit.encode(out);
            tx.to.encode(out);
            tx.value.encode(out);
            Encodable::encode(&tx.data[..], out);
            // Empty access list.
            Header {
                list: true,
                payload_length: 0,
            }
            .encode(out);
        }
    }
}

/// Wraps encoded fields in an RLP list header, prefixed by the EIP-2718
/// type byte for typed transactions.
fn wrap(tx_type: TxType, fields: &[u8]) -> Vec<u8> {
    let header = Header {
        list: true,
        payload_length: fields.len(),
    };
    let mut out = Vec::with_capacity(1 + header.length() + fields.len());
    match tx_type {
        TxType::Legacy => {}
        TxType::Eip1559 => out.push(tx_type.as_byte()),
    }
    header.encode(&mut out);
    out.extend_from_slice(fields);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::WalletKey;
    use alloy_primitives::Address;

    /// The worked example from EIP-155.
    fn eip155_example() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1,
            nonce: 9,
            to: Address::repeat_byte(0x35),
            value: U256::from(1_000_000_000_000_000_000u128),
            gas_limit: 21_000,
            fees: FeeFields::Legacy {
                gas_price: 20_000_000_000,
            },
            data: vec![],
        }
    }

    #[test]
    fn legacy_signing_payload_matches_eip155() {
        assert_eq!(
            hex::encode(signing_payload(&eip155_example())),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(signing_hash(&eip155_example())),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn legacy_signed_envelope_matches_eip155() {
        let key = WalletKey::from_bytes(&[0x46; 32]).unwrap();
        let tx = eip155_example();
        let signature = key.sign_digest(&signing_hash(&tx)).unwrap();
        let signed = assemble(tx, signature);
        assert_eq!(
            signed.raw_hex(),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(signed.tx_hash(), keccak256(signed.raw()));
    }

    #[test]
    fn eip1559_payload_is_typed_and_ends_with_empty_access_list() {
        let tx = UnsignedTransaction {
            fees: FeeFields::Eip1559 {
                max_priority_fee_per_gas: 1_000_000_000,
                max_fee_per_gas: 40_000_000_000,
            },
            ..eip155_example()
        };
        let payload = signing_payload(&tx);
        assert_eq!(payload[0], 0x02);
        assert_eq!(*payload.last().unwrap(), 0xc0);
    }

    #[test]
    fn eip1559_envelope_recovers_to_signer() {
        let key = WalletKey::from_bytes(&[0x46; 32]).unwrap();
        let tx = UnsignedTransaction {
            chain_id: 11_155_111,
            fees: FeeFields::Eip1559 {
                max_priority_fee_per_gas: 1_500_000_000,
                max_fee_per_gas: 30_000_000_000,
            },
            data: vec![0xab; 40],
            ..eip155_example()
        };
        let hash = signing_hash(&tx);
        let signature = key.sign_digest(&hash).unwrap();
        let signed = assemble(tx, signature);
        assert_eq!(signed.raw()[0], 0x02);
        assert_eq!(signature.recover(&hash).unwrap(), key.public_key());
    }

    #[test]
    fn chain_id_changes_legacy_hash() {
        let mainnet = eip155_example();
        let sepolia = UnsignedTransaction {
            chain_id: 11_155_111,
            ..eip155_example()
        };
        assert_ne!(signing_hash(&mainnet), signing_hash(&sepolia));
    }

    #[test]
    fn zero_value_encodes_as_empty_string() {
        let tx = UnsignedTransaction {
            value: U256::ZERO,
            ..eip155_example()
        };
        let payload = signing_payload(&tx);
        // to (0x94 + 20 bytes) is followed directly by 0x80 for zero value.
        let to_pos = payload
            .windows(21)
            .position(|w| w[0] == 0x94 && w[1..].iter().all(|b| *b == 0x35))
            .unwrap();
        assert_eq!(payload[to_pos + 21], 0x80);
    }
}
