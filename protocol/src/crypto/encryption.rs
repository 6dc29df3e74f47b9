//! # AES-256-GCM Sealing
//!
//! Authenticated encryption for secrets at rest: the wallet's private key
//! and mnemonic inside [`crate::vault::storage::EncryptedFileStorage`].
//!
//! AES-256-GCM is an AEAD cipher, so one primitive gives both
//! confidentiality and integrity, and hardware acceleration is everywhere.
//!
//! ## Nonce management
//!
//! GCM is unforgiving about nonce reuse under one key. We draw a fresh
//! random 96-bit nonce from the OS CSPRNG on every seal. A device writes a
//! handful of entries in its lifetime, so the 2^48 birthday bound is out
//! of reach.
//!
//! ## Associated data
//!
//! Every seal binds associated data. The storage layer passes the entry
//! name, so a sealed private key copied over the mnemonic's slot fails to
//! open instead of decrypting into the wrong role.
//!
//! ## Wire format
//!
//! [`seal`] returns `nonce || ciphertext || tag` as one buffer. [`open`]
//! expects the same layout.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// GCM authentication tag length.
const TAG_LENGTH: usize = 16;

/// Errors that can occur while sealing or opening.
///
/// Deliberately vague. Whether it was the wrong key or a flipped bit is
/// nobody's business but the attacker's.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("sealed data too short: must be at least {} bytes", AES_NONCE_LENGTH + TAG_LENGTH)]
    CiphertextTooShort,
}

/// Encrypts `plaintext` under `key`, authenticating `aad` alongside it.
///
/// ```
/// use airlock_protocol::crypto::encryption::{open, seal};
///
/// let key = [0x42u8; 32];
/// let sealed = seal(&key, b"correct horse", b"slot-a").unwrap();
/// assert_eq!(&open(&key, &sealed, b"slot-a").unwrap()[..], b"correct horse");
/// assert!(open(&key, &sealed, b"slot-b").is_err());
/// ```
pub fn seal(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a buffer produced by [`seal`] with the same key and `aad`.
///
/// The plaintext comes back in a [`Zeroizing`] buffer because the callers
/// are opening key material.
pub fn open(
    key: &[u8; AES_KEY_LENGTH],
    sealed: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
    if sealed.len() < AES_NONCE_LENGTH + TAG_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| EncryptionError::DecryptFailed)
}
