//! # secp256k1 Key Material
//!
//! The wallet key, its public half, and the 65-byte recoverable signatures
//! Ethereum transactions carry.
//!
//! ## Security considerations
//!
//! - [`WalletKey`] wraps a `k256` `SigningKey`, which zeroizes its scalar on
//!   drop. It is `pub(crate)` to construct and has no byte accessor. Raw
//!   key bytes only ever exist inside [`crate::vault`].
//! - Signing uses RFC 6979 deterministic nonces: the same key and digest
//!   always produce the same signature. `k256` also normalizes `s` to the
//!   low half of the curve order, as EIP-2 requires.
//! - Key bytes are never logged. `Debug` prints the public key only.

use std::fmt;

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::SIGNATURE_LENGTH;
use crate::crypto::hash::keccak256;

/// Errors raised while handling key material or signatures.
///
/// As vague as possible about *why* a secret was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyMaterialError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a point on secp256k1")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signing failed")]
    SigningFailed,

    #[error("public key recovery failed")]
    RecoveryFailed,
}

// ---------------------------------------------------------------------------
// WalletKey
// ---------------------------------------------------------------------------

/// The wallet's signing key.
///
/// Deliberately not `Clone`, not `Serialize`, and without any way to read
/// the scalar back out.
pub struct WalletKey {
    signing_key: SigningKey,
}

impl WalletKey {
    /// Builds a key from a 32-byte secret scalar.
    ///
    /// Rejects zero and values at or above the curve order.
    pub(crate) fn from_bytes(secret: &[u8; 32]) -> Result<Self, KeyMaterialError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| KeyMaterialError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> WalletPublicKey {
        WalletPublicKey {
            verifying_key: self.signing_key.verifying_key().clone(),
        }
    }

    /// Signs a 32-byte digest with a deterministic RFC 6979 nonce.
    ///
    /// Crate-private: outside this crate, signatures come from
    /// [`KeyCustodian::sign`](crate::vault::KeyCustodian::sign) only.
    pub(crate) fn sign_digest(&self, digest: &B256) -> Result<RecoverableSignature, KeyMaterialError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| KeyMaterialError::SigningFailed)?;
        Ok(RecoverableSignature::from_parts(&signature, recovery_id))
    }
}

impl fmt::Debug for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletKey(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// WalletPublicKey
// ---------------------------------------------------------------------------

/// Public half of the wallet key. Safe to share, log, and print as a QR code.
#[derive(Clone, PartialEq, Eq)]
pub struct WalletPublicKey {
    verifying_key: VerifyingKey,
}

impl WalletPublicKey {
    /// Parses a SEC1-encoded point, compressed (33 bytes) or uncompressed (65).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, KeyMaterialError> {
        let verifying_key =
            VerifyingKey::from_sec1_bytes(bytes).map_err(|_| KeyMaterialError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyMaterialError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| KeyMaterialError::InvalidPublicKey)?;
        Self::from_sec1_bytes(&bytes)
    }

    /// 33-byte compressed SEC1 encoding.
    pub fn to_compressed(&self) -> [u8; 33] {
        let point = self.verifying_key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// 65-byte uncompressed SEC1 encoding (`0x04 || x || y`).
    pub fn to_uncompressed(&self) -> [u8; 65] {
        let point = self.verifying_key.to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Compressed encoding as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed())
    }

    /// The Ethereum address of this key.
    pub fn address(&self) -> Address {
        address_from_public_key(self)
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

impl fmt::Debug for WalletPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletPublicKey({})", self.to_hex())
    }
}

impl fmt::Display for WalletPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for WalletPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for WalletPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Ethereum address rule: the last 20 bytes of `keccak256(x || y)`.
pub fn address_from_public_key(public_key: &WalletPublicKey) -> Address {
    let uncompressed = public_key.to_uncompressed();
    let digest = keccak256(&uncompressed[1..]);
    Address::from_slice(&digest[12..])
}

// ---------------------------------------------------------------------------
// RecoverableSignature
// ---------------------------------------------------------------------------

/// ECDSA signature plus the recovery id that selects the signer's key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoverableSignature {
    r: [u8; 32],
    s: [u8; 32],
    recovery_id: u8,
}

impl RecoverableSignature {
    fn from_parts(signature: &Signature, recovery_id: RecoveryId) -> Self {
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        }
    }

    /// Parses `r:32 | s:32 | recoveryId:1`.
    ///
    /// Only recovery ids 0 and 1 are accepted. Ids 2 and 3 need an `r`
    /// beyond the curve order, which no honest signer produces.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Result<Self, KeyMaterialError> {
        let recovery_id = bytes[64];
        if recovery_id > 1 {
            return Err(KeyMaterialError::InvalidSignature);
        }
        Signature::from_slice(&bytes[..64]).map_err(|_| KeyMaterialError::InvalidSignature)?;

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, recovery_id })
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.recovery_id;
        out
    }

    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// 0 or 1; the y-parity of the ephemeral point.
    pub fn recovery_id(&self) -> u8 {
        self.recovery_id
    }

    fn to_k256(&self) -> Result<(Signature, RecoveryId), KeyMaterialError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature =
            Signature::from_slice(&rs).map_err(|_| KeyMaterialError::InvalidSignature)?;
        let recovery_id =
            RecoveryId::from_byte(self.recovery_id).ok_or(KeyMaterialError::InvalidSignature)?;
        Ok((signature, recovery_id))
    }

    /// Recovers the public key that produced this signature over `digest`.
    pub fn recover(&self, digest: &B256) -> Result<WalletPublicKey, KeyMaterialError> {
        let (signature, recovery_id) = self.to_k256()?;
        let verifying_key =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
                .map_err(|_| KeyMaterialError::RecoveryFailed)?;
        Ok(WalletPublicKey { verifying_key })
    }

    /// Plain ECDSA verification of this signature over `digest` under `key`.
    pub fn verify(&self, digest: &B256, key: &WalletPublicKey) -> bool {
        use k256::ecdsa::signature::hazmat::PrehashVerifier;

        let Ok((signature, _)) = self.to_k256() else {
            return false;
        };
        key.verifying_key()
            .verify_prehash(digest.as_slice(), &signature)
            .is_ok()
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecoverableSignature(r={}..., v={})",
            &hex::encode(self.r)[..8],
            self.recovery_id
        )
    }
}
