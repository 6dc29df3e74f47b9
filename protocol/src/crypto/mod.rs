//! # Cryptographic Primitives
//!
//! Everything security-related in Airlock funnels through here: the
//! digests that bind optical frames together, the secp256k1 keys the cold
//! device signs with, the mnemonic derivation that produces those keys, and
//! the AEAD cipher protecting them at rest.
//!
//! The choices are not ours to make. Ethereum fixes secp256k1, Keccak-256
//! and BIP-39/BIP-44; the rest is boring on purpose:
//!
//! - **secp256k1 / ECDSA** via `k256`, with RFC 6979 deterministic nonces.
//! - **Keccak-256** for addresses and transaction hashes.
//! - **SHA-256** (truncated) for frame checksums.
//! - **AES-256-GCM** for secrets at rest.
//!
//! Nothing in here is hand-rolled. These are thin, typed wrappers around
//! audited crates.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod mnemonic;

pub use encryption::{open, seal, EncryptionError};
pub use hash::{frame_checksum, keccak256, sha256};
pub use keys::{address_from_public_key, RecoverableSignature, WalletKey, WalletPublicKey};
pub use mnemonic::{DerivedKey, MnemonicError};
