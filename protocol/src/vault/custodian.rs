//! # Key Custodian
//!
//! The only component that ever holds decrypted private-key bytes, and it
//! holds them for exactly one signature at a time.
//!
//! ```text
//!   generate() / import() ──▶ GeneratedWallet { address, mnemonic, key_ref }
//!                                                  │
//!   store(key_ref, mnemonic) ──▶ SecureStorage ◀───┘
//!                                    │
//!   sign(digest) ── get ─▶ Zeroizing buffer ─▶ WalletKey ─▶ signature
//!                                    (wiped on every exit path)
//! ```
//!
//! ## Concurrency
//!
//! `sign` takes a `parking_lot::Mutex` with `try_lock`. A second caller
//! does not wait in line behind the first: it gets [`KeyError::Busy`]
//! immediately, so two signing requests can never interleave over the
//! decrypted buffer.
//!
//! ## Lifecycle
//!
//! There is no global. [`KeyCustodian::init`] builds the process-wide
//! instance and hands back an `Arc`; [`KeyCustodian::teardown`] drops the
//! cached public record. Nobody outside this module ever sees key bytes.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::storage::{SecureStorage, StorageError};
use super::wallet::{GeneratedWallet, PrivateKeyRef, WalletRecord};
use crate::config::{ENTROPY_LENGTH, STORAGE_KEY_MNEMONIC, STORAGE_KEY_PRIVATE_KEY, STORAGE_KEY_RECORD};
use crate::crypto::keys::{KeyMaterialError, RecoverableSignature, WalletKey, WalletPublicKey};
use crate::crypto::mnemonic::{self, MnemonicError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// No wallet has been stored on this device.
    #[error("no wallet key stored")]
    NotFound,

    #[error("secure storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("device authentication failed")]
    AuthenticationFailed,

    /// The OS random source could not be read. Never fall back to a weaker
    /// one.
    #[error("secure random source unavailable")]
    EntropySourceUnavailable,

    /// Another `sign` call holds the key.
    #[error("key custodian busy: a signature is already in progress")]
    Busy,

    /// `store` was called while a wallet already exists. Delete it first.
    #[error("a wallet is already stored on this device")]
    AlreadyExists,

    #[error("invalid recovery phrase: {0}")]
    InvalidMnemonic(#[from] MnemonicError),

    /// The phrase passed to `store` does not derive the key being stored.
    #[error("recovery phrase does not match the key being stored")]
    MnemonicMismatch,

    /// Stored data is present but unusable.
    #[error("stored wallet is corrupted: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Material(#[from] KeyMaterialError),
}

impl From<StorageError> for KeyError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unavailable(reason) => Self::StorageUnavailable(reason),
            StorageError::AuthenticationFailed => Self::AuthenticationFailed,
        }
    }
}

impl KeyError {
    /// Storage and authentication failures end the current screen; the
    /// rest can be retried in place.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::AuthenticationFailed | Self::Corrupted(_)
        )
    }
}

// ---------------------------------------------------------------------------
// KeyCustodian
// ---------------------------------------------------------------------------

pub struct KeyCustodian {
    storage: Arc<dyn SecureStorage>,
    /// Public record, cached after the first successful read.
    record: RwLock<Option<WalletRecord>>,
    /// Held for the duration of one `sign` or `delete`.
    key_lock: Mutex<()>,
}

impl KeyCustodian {
    /// Builds the custodian over a secure-storage capability.
    pub fn init(storage: Arc<dyn SecureStorage>) -> Arc<Self> {
        debug!("key custodian initialised");
        Arc::new(Self {
            storage,
            record: RwLock::new(None),
            key_lock: Mutex::new(()),
        })
    }

    /// Forgets the cached wallet record. Storage is untouched.
    pub fn teardown(&self) {
        self.record.write().take();
        debug!("key custodian torn down");
    }

    // -- creation ------------------------------------------------------------

    /// Creates a new wallet from 256 bits of OS entropy.
    ///
    /// Nothing is persisted until [`Self::store`] is called.
    pub fn generate(&self) -> Result<GeneratedWallet, KeyError> {
        self.generate_with(&mut OsRng)
    }

    /// [`Self::generate`] with a caller-supplied random source.
    pub fn generate_with<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<GeneratedWallet, KeyError> {
        let mut entropy = Zeroizing::new([0u8; ENTROPY_LENGTH]);
        rng.try_fill_bytes(&mut entropy[..]).map_err(|e| {
            warn!(error = %e, "entropy source failed");
            KeyError::EntropySourceUnavailable
        })?;

        let wallet = GeneratedWallet::from_derived(mnemonic::from_entropy(&entropy)?);
        info!(address = %wallet.address, "wallet generated");
        Ok(wallet)
    }

    /// Re-derives a wallet from a user-entered recovery phrase.
    pub fn import(&self, phrase: &str) -> Result<GeneratedWallet, KeyError> {
        let wallet = GeneratedWallet::from_derived(mnemonic::from_phrase(phrase)?);
        info!(address = %wallet.address, "wallet imported");
        Ok(wallet)
    }

    /// Persists the key and its phrase under the fixed storage entries.
    ///
    /// The phrase must derive `key_ref`. If any write fails, whatever was
    /// already written is removed again.
    pub fn store(&self, key_ref: &PrivateKeyRef, phrase: &str) -> Result<WalletRecord, KeyError> {
        let derived = mnemonic::from_phrase(phrase)?;
        if derived.key().public_key() != *key_ref.public_key() {
            return Err(KeyError::MnemonicMismatch);
        }
        if self.storage.contains(STORAGE_KEY_RECORD)?
            || self.storage.contains(STORAGE_KEY_PRIVATE_KEY)?
        {
            return Err(KeyError::AlreadyExists);
        }

        let record = WalletRecord::new(key_ref.public_key().clone());
        let record_json =
            serde_json::to_vec(&record).map_err(|e| KeyError::Corrupted(e.to_string()))?;

        let written = self
            .storage
            .put(STORAGE_KEY_PRIVATE_KEY, key_ref.secret())
            .and_then(|_| self.storage.put(STORAGE_KEY_MNEMONIC, derived.phrase().as_bytes()))
            .and_then(|_| self.storage.put(STORAGE_KEY_RECORD, &record_json));
        if let Err(e) = written {
            warn!(error = %e, "wallet store failed, rolling back");
            self.wipe_entries();
            return Err(e.into());
        }

        *self.record.write() = Some(record.clone());
        info!(address = %record.address(), "wallet stored");
        Ok(record)
    }

    // -- queries -------------------------------------------------------------

    pub fn has_key(&self) -> Result<bool, KeyError> {
        if self.record.read().is_some() {
            return Ok(true);
        }
        Ok(self.storage.contains(STORAGE_KEY_PRIVATE_KEY)?)
    }

    /// The public wallet record, or `None` if no wallet is stored.
    pub fn record(&self) -> Result<Option<WalletRecord>, KeyError> {
        if let Some(record) = self.record.read().as_ref() {
            return Ok(Some(record.clone()));
        }

        let Some(raw) = self.storage.get(STORAGE_KEY_RECORD)? else {
            return Ok(None);
        };
        let record: WalletRecord =
            serde_json::from_slice(&raw).map_err(|e| KeyError::Corrupted(e.to_string()))?;
        *self.record.write() = Some(record.clone());
        Ok(Some(record))
    }

    pub fn load_address(&self) -> Result<Option<Address>, KeyError> {
        Ok(self.record()?.map(|r| r.address()))
    }

    /// Public key of the stored wallet.
    pub fn public_key(&self) -> Result<WalletPublicKey, KeyError> {
        self.record()?
            .map(|r| r.public_key)
            .ok_or(KeyError::NotFound)
    }

    // -- use -----------------------------------------------------------------

    /// Signs a 32-byte digest with the stored key.
    ///
    /// The key is read into a zeroizing buffer, turned into a signing key
    /// that zeroizes itself, used once, and dropped before this returns,
    /// whether it returns `Ok`, `Err`, or unwinds.
    pub fn sign(&self, digest: &B256) -> Result<RecoverableSignature, KeyError> {
        let _guard = self.key_lock.try_lock().ok_or_else(|| {
            debug!("sign refused: custodian busy");
            KeyError::Busy
        })?;

        let key = self.unlock()?;
        let signature = key.sign_digest(digest)?;
        debug!(digest = %digest, "digest signed");
        Ok(signature)
    }

    fn unlock(&self) -> Result<WalletKey, KeyError> {
        let stored = self
            .storage
            .get(STORAGE_KEY_PRIVATE_KEY)?
            .ok_or(KeyError::NotFound)?;
        if stored.len() != 32 {
            return Err(KeyError::Corrupted(format!(
                "private key entry is {} bytes",
                stored.len()
            )));
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&stored);
        WalletKey::from_bytes(&secret).map_err(|_| KeyError::Corrupted("invalid secret scalar".into()))
    }

    // -- destruction ---------------------------------------------------------

    /// Irreversibly erases the stored key, phrase and record.
    pub fn delete(&self) -> Result<(), KeyError> {
        let _guard = self.key_lock.try_lock().ok_or(KeyError::Busy)?;
        self.storage.delete(STORAGE_KEY_PRIVATE_KEY)?;
        self.storage.delete(STORAGE_KEY_MNEMONIC)?;
        self.storage.delete(STORAGE_KEY_RECORD)?;
        self.record.write().take();
        info!("wallet deleted");
        Ok(())
    }

    fn wipe_entries(&self) {
        for entry in [STORAGE_KEY_PRIVATE_KEY, STORAGE_KEY_MNEMONIC, STORAGE_KEY_RECORD] {
            if let Err(e) = self.storage.delete(entry) {
                warn!(entry, error = %e, "rollback delete failed");
            }
        }
    }
}

impl std::fmt::Debug for KeyCustodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCustodian")
            .field("record", &*self.record.read())
            .finish_non_exhaustive()
    }
}
