// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Airlock Protocol: Core Library
//!
//! Two devices, one key, zero network cables between them. The hot wallet
//! lives online and composes transactions; the cold signer never sees a
//! network and holds the only copy of the private key. Everything that
//! crosses the gap does so as QR codes, and this crate is what those codes
//! mean.
//!
//! The stance is deliberately boring: secp256k1 with RFC 6979 nonces
//! (because a repeated nonce is a leaked key), SHA-256 checksums on every
//! frame (because cameras misread), and AES-256-GCM for secrets at rest
//! (because NIST got that one right).
//!
//! ## Architecture
//!
//! - **config**: Wire constants and the TOML-loadable `ProtocolConfig`.
//! - **crypto**: Hashes, sealing, secp256k1 keys, BIP-39/BIP-32 derivation.
//! - **codec**: The frame format: chunking, checksums, reassembly.
//! - **transaction**: Ethereum requests, canonical hashing, the signing engine.
//! - **vault**: Secure storage and the key custodian. Keys go in, signatures come out.
//! - **presenter**: What the operator reads before saying yes.
//! - **transfer**: Hot and cold state machines plus their async drivers.
//! - **device**: The handful of calls a UI actually needs.
//!
//! ## Design Philosophy
//!
//! 1. Byte-exact or bust. `decode(encode(tx)) == tx`, every time.
//! 2. A damaged frame is thrown away, never patched.
//! 3. Private key bytes leave the vault only as signatures.
//! 4. The cold side has no network code. Not disabled: absent.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod device;
pub mod presenter;
pub mod transaction;
pub mod transfer;
pub mod vault;

pub use codec::{decode, encode, DecodeError, EncodeError, QrPayload};
pub use config::ProtocolConfig;
pub use device::{Device, ScanStatus};
pub use presenter::{summarize, ReviewPolicy, TransactionSummary, Warning};
pub use transaction::{
    SignedTransaction, SigningEngine, SigningError, Transaction, UnsignedTransaction,
};
pub use transfer::{ColdSession, HotSession, TransferError};
pub use vault::{KeyCustodian, KeyError};
