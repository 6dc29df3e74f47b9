//! # Wallet Record & Key Handles
//!
//! The public face of the one wallet a cold device holds, plus the opaque
//! handle that carries a freshly generated key from `generate()` to
//! `store()` without ever exposing its bytes.
//!
//! ## What is persisted
//!
//! | Entry                          | Contents                         |
//! |--------------------------------|----------------------------------|
//! | `airlock.wallet.private_key`   | 32-byte secp256k1 scalar         |
//! | `airlock.wallet.mnemonic`      | 24-word BIP-39 phrase            |
//! | `airlock.wallet.record`        | JSON [`WalletRecord`]            |
//!
//! The address is not on that list. It is a function of the public key and
//! is recomputed every time, so the two can never drift apart.

use std::fmt;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::WALLET_RECORD_FORMAT;
use crate::crypto::keys::WalletPublicKey;
use crate::crypto::mnemonic::DerivedKey;

// ---------------------------------------------------------------------------
// WalletRecord
// ---------------------------------------------------------------------------

/// Public wallet metadata, stored next to the encrypted secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Record layout revision.
    pub format: u16,
    pub public_key: WalletPublicKey,
    pub created_at: DateTime<Utc>,
}

impl WalletRecord {
    pub fn new(public_key: WalletPublicKey) -> Self {
        Self {
            format: WALLET_RECORD_FORMAT,
            public_key,
            created_at: Utc::now(),
        }
    }

    /// The wallet address, derived from the public key on every call.
    pub fn address(&self) -> Address {
        self.public_key.address()
    }

    /// EIP-55 checksummed address string.
    pub fn address_string(&self) -> String {
        self.address().to_checksum(None)
    }
}

// ---------------------------------------------------------------------------
// PrivateKeyRef
// ---------------------------------------------------------------------------

/// Opaque handle to a private key that has not been stored yet.
///
/// Only the vault can read the secret. Callers get the key id (the
/// compressed public key) and the address, which is all they need to show
/// the user what was created. The secret is wiped when the handle drops.
pub struct PrivateKeyRef {
    secret: Zeroizing<[u8; 32]>,
    public_key: WalletPublicKey,
}

impl PrivateKeyRef {
    pub(crate) fn from_derived(derived: DerivedKey) -> (Self, Zeroizing<String>) {
        let DerivedKey {
            phrase,
            secret,
            key,
        } = derived;
        let handle = Self {
            secret,
            public_key: key.public_key(),
        };
        (handle, phrase)
    }

    pub(crate) fn secret(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Stable identifier: the 33-byte compressed public key.
    pub fn key_id(&self) -> [u8; 33] {
        self.public_key.to_compressed()
    }

    pub fn public_key(&self) -> &WalletPublicKey {
        &self.public_key
    }

    pub fn address(&self) -> Address {
        self.public_key.address()
    }
}

impl PartialEq for PrivateKeyRef {
    /// Two handles are the same key when their public keys match.
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for PrivateKeyRef {}

impl fmt::Debug for PrivateKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyRef")
            .field("key_id", &self.public_key.to_hex())
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GeneratedWallet
// ---------------------------------------------------------------------------

/// Result of `generate()` or `import()`: everything needed to show the
/// backup phrase and then call `store()`.
pub struct GeneratedWallet {
    pub address: Address,
    /// The 24-word recovery phrase. Wiped on drop.
    pub mnemonic: Zeroizing<String>,
    pub key_ref: PrivateKeyRef,
}

impl GeneratedWallet {
    pub(crate) fn from_derived(derived: DerivedKey) -> Self {
        let (key_ref, mnemonic) = PrivateKeyRef::from_derived(derived);
        Self {
            address: key_ref.address(),
            mnemonic,
            key_ref,
        }
    }
}

impl fmt::Debug for GeneratedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedWallet")
            .field("address", &self.address)
            .field("mnemonic", &"<redacted>")
            .field("key_ref", &self.key_ref)
            .finish()
    }
}
