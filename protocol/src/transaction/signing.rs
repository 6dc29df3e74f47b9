//! The Signing Engine: unsigned request in, broadcastable transaction out.
//!
//! The procedure:
//! 1. Validate the request. A frame that decoded is not automatically a
//!    request the builder would have produced.
//! 2. Canonicalize it into the chain's signing payload and hash it
//!    ([`super::canonical`]).
//! 3. Ask the [`KeyCustodian`] for a signature over the digest. RFC 6979
//!    makes this deterministic: same key, same request, same bytes.
//! 4. Self-check: the signature must recover to the wallet's public key and
//!    verify under it. If it does not, something upstream hashed
//!    differently than we think, and the result is thrown away.
//! 5. Assemble the signed envelope and its hash.

use std::sync::Arc;

use alloy_primitives::B256;
use thiserror::Error;
use tracing::{debug, error, info};

use super::canonical;
use super::types::{SignedTransaction, UnsignedTransaction};
use super::verification::{validate_unsigned, TransactionError};
use crate::vault::{KeyCustodian, KeyError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The request canonicalizes to a different digest than the one the
    /// operator reviewed.
    #[error("signing hash mismatch: reviewed {reviewed}, computed {computed}")]
    HashMismatch { reviewed: B256, computed: B256 },

    /// The fresh signature does not check out against the wallet key.
    #[error("signature failed self-verification against the wallet key")]
    SignatureVerificationFailed,

    #[error("request refused: {0}")]
    InvalidTransaction(#[from] TransactionError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl SigningError {
    /// Whether the operator can simply try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Key(e) => !e.is_fatal(),
            _ => true,
        }
    }
}

/// Signs requests with the custodian's wallet key.
#[derive(Debug, Clone)]
pub struct SigningEngine {
    custodian: Arc<KeyCustodian>,
}

impl SigningEngine {
    pub fn new(custodian: Arc<KeyCustodian>) -> Self {
        Self { custodian }
    }

    /// Signs `tx`.
    pub fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, SigningError> {
        let hash = canonical::signing_hash(tx);
        self.sign_hash(tx, hash)
    }

    /// Signs `tx` only if it still hashes to `reviewed`, the digest that was
    /// on screen when the operator approved.
    pub fn sign_reviewed(
        &self,
        tx: &UnsignedTransaction,
        reviewed: &B256,
    ) -> Result<SignedTransaction, SigningError> {
        let computed = canonical::signing_hash(tx);
        if computed != *reviewed {
            error!(%reviewed, %computed, "approved digest does not match request");
            return Err(SigningError::HashMismatch {
                reviewed: *reviewed,
                computed,
            });
        }
        self.sign_hash(tx, computed)
    }

    fn sign_hash(
        &self,
        tx: &UnsignedTransaction,
        hash: B256,
    ) -> Result<SignedTransaction, SigningError> {
        validate_unsigned(tx)?;

        let signature = self.custodian.sign(&hash)?;
        let wallet_key = self.custodian.public_key()?;

        let recovers = signature
            .recover(&hash)
            .map(|recovered| recovered == wallet_key)
            .unwrap_or(false);
        if !recovers || !signature.verify(&hash, &wallet_key) {
            error!(signing_hash = %hash, "signature self-check failed, discarding");
            return Err(SigningError::SignatureVerificationFailed);
        }
        debug!(signing_hash = %hash, "signature self-check passed");

        let signed = canonical::assemble(tx.clone(), signature);
        info!(
            tx_hash = %signed.tx_hash(),
            tx_type = %tx.tx_type(),
            chain_id = tx.chain_id,
            "transaction signed"
        );
        Ok(signed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STORAGE_KEY_RECORD;
    use crate::transaction::builder::TransactionBuilder;
    use crate::vault::{MemoryStorage, SecureStorage, WalletRecord};
    use alloy_primitives::{Address, U256};

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
        abandon abandon abandon abandon abandon art";

    fn engine() -> (SigningEngine, Arc<KeyCustodian>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let custodian = KeyCustodian::init(storage.clone());
        let wallet = custodian.import(PHRASE).unwrap();
        custodian.store(&wallet.key_ref, &wallet.mnemonic).unwrap();
        (SigningEngine::new(custodian.clone()), custodian, storage)
    }

    fn request() -> UnsignedTransaction {
        TransactionBuilder::legacy(1)
            .to(Address::repeat_byte(0x35))
            .value(U256::from(1_000_000_000_000_000_000u128))
            .nonce(9)
            .gas_price(20_000_000_000)
            .build()
            .unwrap()
    }

    #[test]
    fn signature_recovers_to_wallet() {
        let (engine, custodian, _) = engine();
        let tx = request();
        let signed = engine.sign(&tx).unwrap();

        let hash = canonical::signing_hash(&tx);
        assert_eq!(
            signed.signature().recover(&hash).unwrap(),
            custodian.public_key().unwrap()
        );
        assert_eq!(signed.unsigned(), &tx);
    }

    #[test]
    fn signing_is_deterministic() {
        let (engine, _, _) = engine();
        let a = engine.sign(&request()).unwrap();
        let b = engine.sign(&request()).unwrap();
        assert_eq!(a.raw(), b.raw());
        assert_eq!(a.tx_hash(), b.tx_hash());
    }

    #[test]
    fn different_requests_get_different_signatures() {
        let (engine, _, _) = engine();
        let a = engine.sign(&request()).unwrap();
        let mut other = request();
        other.nonce += 1;
        let b = engine.sign(&other).unwrap();
        assert_ne!(a.signature().r(), b.signature().r());
    }

    #[test]
    fn reviewed_hash_must_match() {
        let (engine, _, _) = engine();
        let tx = request();
        let reviewed = canonical::signing_hash(&tx);
        assert!(engine.sign_reviewed(&tx, &reviewed).is_ok());

        let mut swapped = tx;
        swapped.value = U256::from(2u8);
        assert!(matches!(
            engine.sign_reviewed(&swapped, &reviewed),
            Err(SigningError::HashMismatch { .. })
        ));
    }

    #[test]
    fn wrong_wallet_key_fails_self_check() {
        let (_, _, storage) = engine();
        // Point the public record at an unrelated key; the stored secret
        // stays the same.
        let other = KeyCustodian::init(Arc::new(MemoryStorage::new()))
            .generate()
            .unwrap();
        let forged = WalletRecord::new(other.key_ref.public_key().clone());
        storage
            .put(STORAGE_KEY_RECORD, &serde_json::to_vec(&forged).unwrap())
            .unwrap();

        let engine = SigningEngine::new(KeyCustodian::init(storage));
        assert_eq!(
            engine.sign(&request()).unwrap_err(),
            SigningError::SignatureVerificationFailed
        );
    }

    #[test]
    fn invalid_request_is_refused_before_the_key_is_touched() {
        let (engine, _, _) = engine();
        let mut tx = request();
        tx.gas_limit = 1;
        assert!(matches!(
            engine.sign(&tx),
            Err(SigningError::InvalidTransaction(TransactionError::GasLimitTooLow { .. }))
        ));
    }

    #[test]
    fn missing_wallet_is_key_not_found() {
        let engine = SigningEngine::new(KeyCustodian::init(Arc::new(MemoryStorage::new())));
        let err = engine.sign(&request()).unwrap_err();
        assert_eq!(err, SigningError::Key(KeyError::NotFound));
        assert!(err.is_retryable());
    }
}
