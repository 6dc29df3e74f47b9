//! # Device Facade
//!
//! The narrow surface a UI layer talks to. One [`Device`] per app process:
//! it owns the key custodian, a signing engine over it, and the cold-side
//! transfer session. Screens call these methods and render what comes back;
//! none of them ever sees key bytes.
//!
//! | UI operation          | Method                          |
//! |-----------------------|---------------------------------|
//! | `generateWallet()`    | [`Device::generate_wallet`]     |
//! | `storeWallet(m, k)`   | [`Device::store_wallet`]        |
//! | `hasWallet()`         | [`Device::has_wallet`]          |
//! | `loadAddress()`       | [`Device::load_address`]        |
//! | `composeTransaction`  | [`Device::compose_transaction`] |
//! | `encodeForDisplay`    | [`Device::encode_for_display`]  |
//! | `feedScanFrame(raw)`  | [`Device::feed_scan_frame`]     |
//! | `approveAndSign(tx)`  | [`Device::approve_and_sign`]    |
//! | `reject()`            | [`Device::reject`]              |
//! | `deleteWallet()`      | [`Device::delete_wallet`]       |

use std::sync::Arc;

use alloy_primitives::Address;
use tracing::info;

use crate::codec::{self, EncodeError, QrPayload};
use crate::config::{ConfigError, ProtocolConfig};
use crate::presenter::TransactionSummary;
use crate::transaction::{
    ComposeParams, SignedTransaction, SigningEngine, Transaction, TransactionError,
    UnsignedTransaction,
};
use crate::transfer::{ColdSession, ScanProgress, StateKind, TransferError};
use crate::vault::{GeneratedWallet, KeyCustodian, KeyError, PrivateKeyRef, SecureStorage, WalletRecord};

/// Outcome of [`Device::feed_scan_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// Keep scanning.
    Pending { received: usize, expected: usize },
    /// A request is ready for review.
    Decoded {
        tx: UnsignedTransaction,
        summary: TransactionSummary,
    },
    /// The session was busy with something else; the frame was dropped.
    Ignored,
}

pub struct Device {
    custodian: Arc<KeyCustodian>,
    config: ProtocolConfig,
    cold: ColdSession,
}

impl Device {
    /// Sets up the device over a secure-storage capability.
    pub fn new(storage: Arc<dyn SecureStorage>, config: ProtocolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let custodian = KeyCustodian::init(storage);
        let cold = ColdSession::new(SigningEngine::new(custodian.clone()), config.clone());
        Ok(Self {
            custodian,
            config,
            cold,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn custodian(&self) -> &Arc<KeyCustodian> {
        &self.custodian
    }

    pub fn session(&self) -> &ColdSession {
        &self.cold
    }

    // -- wallet --------------------------------------------------------------

    pub fn generate_wallet(&self) -> Result<GeneratedWallet, KeyError> {
        self.custodian.generate()
    }

    /// Re-derives a wallet from a recovery phrase typed by the user.
    pub fn import_wallet(&self, phrase: &str) -> Result<GeneratedWallet, KeyError> {
        self.custodian.import(phrase)
    }

    pub fn store_wallet(
        &self,
        mnemonic: &str,
        private_key: &PrivateKeyRef,
    ) -> Result<WalletRecord, KeyError> {
        self.custodian.store(private_key, mnemonic)
    }

    pub fn has_wallet(&self) -> Result<bool, KeyError> {
        self.custodian.has_key()
    }

    pub fn load_address(&self) -> Result<Option<Address>, KeyError> {
        self.custodian.load_address()
    }

    /// Wipes the wallet and drops whatever transfer was in progress.
    pub fn delete_wallet(&mut self) -> Result<(), KeyError> {
        self.custodian.delete()?;
        self.cold.reset();
        Ok(())
    }

    // -- transfer ------------------------------------------------------------

    pub fn compose_transaction(
        &self,
        params: &ComposeParams,
    ) -> Result<UnsignedTransaction, TransactionError> {
        params.compose()
    }

    /// QR strings for `tx`, in display order.
    pub fn encode_for_display(&self, tx: &Transaction) -> Result<Vec<String>, EncodeError> {
        let frames = codec::encode(tx, self.config.chunk_capacity)?;
        Ok(frames.iter().map(QrPayload::to_qr_string).collect())
    }

    /// Feeds one scanned code to the cold session.
    ///
    /// After a failed or finished transfer the next frame starts a fresh
    /// one.
    pub fn feed_scan_frame(&mut self, raw: &str) -> Result<ScanStatus, TransferError> {
        if matches!(self.cold.kind(), StateKind::Error | StateKind::Done) {
            self.cold.reset();
        }

        match self.cold.feed_frame(raw)? {
            ScanProgress::Pending {
                received, expected, ..
            } => Ok(ScanStatus::Pending { received, expected }),
            ScanProgress::Decoded(Transaction::Unsigned(tx)) => {
                let summary = self.cold.summary().cloned().ok_or(TransferError::InvalidState {
                    state: self.cold.kind(),
                    action: "summarize",
                })?;
                Ok(ScanStatus::Decoded { tx, summary })
            }
            ScanProgress::Decoded(Transaction::Signed(_)) | ScanProgress::Ignored => {
                Ok(ScanStatus::Ignored)
            }
        }
    }

    /// The review summary of the request awaiting approval.
    pub fn summary(&self) -> Option<&TransactionSummary> {
        self.cold.summary()
    }

    /// Signs `tx`, which must be the request currently under review.
    pub async fn approve_and_sign(
        &mut self,
        tx: &UnsignedTransaction,
    ) -> Result<SignedTransaction, TransferError> {
        let signed = self.cold.approve_and_sign(tx).await?;
        info!(tx_hash = %signed.tx_hash(), "approved and signed");
        Ok(signed)
    }

    /// Signed frames to show the hot wallet.
    pub fn signed_frames(&self) -> Option<Vec<String>> {
        self.cold
            .frames()
            .map(|frames| frames.iter().map(QrPayload::to_qr_string).collect())
    }

    pub fn reject(&mut self) -> Result<(), TransferError> {
        self.cold.reject()
    }

    /// The operator finished showing the signed codes.
    pub fn finish_transfer(&mut self) -> Result<(), TransferError> {
        self.cold.complete()
    }
}
