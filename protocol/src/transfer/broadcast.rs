//! The hot side's way out to the network.
//!
//! This crate never opens a socket. Whoever embeds the hot session supplies
//! a [`Broadcaster`] that knows how to reach a node.

use alloy_primitives::B256;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::transaction::SignedTransaction;

/// Submits a signed transaction to the chain.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sends the raw signed envelope. Returns the transaction hash the node
    /// reported, or a reason for refusal.
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<B256, String>;
}

/// Keeps every broadcast in memory instead of sending it. Useful in tests
/// and dry runs.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<String>>,
    refuse_with: Mutex<Option<String>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following broadcast fail with `reason`.
    pub fn refuse(&self, reason: impl Into<String>) {
        *self.refuse_with.lock() = Some(reason.into());
    }

    /// Raw hex of everything broadcast so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<B256, String> {
        if let Some(reason) = self.refuse_with.lock().clone() {
            return Err(reason);
        }
        self.sent.lock().push(signed.raw_hex());
        Ok(signed.tx_hash())
    }
}
