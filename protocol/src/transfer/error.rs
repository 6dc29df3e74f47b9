//! Transfer errors and the failure record kept in a session's `Error` state.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::codec::{DecodeError, EncodeError};
use crate::transaction::{SigningError, TransactionError};
use crate::vault::KeyError;

use super::StateKind;

/// Errors that can occur while moving a transfer between devices.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Nothing happened for too long in the given phase.
    #[error("timed out after {after_secs}s while {phase}")]
    Timeout { phase: &'static str, after_secs: u64 },

    /// The operator backed out.
    #[error("cancelled by user")]
    UserCancelled,

    /// The scanned signed transaction is not the one sent for signing.
    #[error("signed transaction does not match the pending request: {0}")]
    MismatchedTransaction(String),

    /// The action makes no sense in the session's current state. The
    /// session is left where it was.
    #[error("cannot {action} while {state}")]
    InvalidState {
        state: StateKind,
        action: &'static str,
    },

    #[error("request rejected: {0}")]
    InvalidRequest(#[from] TransactionError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Key(#[from] KeyError),

    /// The broadcast collaborator refused the transaction.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// The background signing task died before reporting back.
    #[error("signing task failed: {0}")]
    TaskFailed(String),
}

impl TransferError {
    /// Decode, signing and broadcast problems can be retried from the same
    /// screen. Storage and authentication failures cannot.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Key(e) => !e.is_fatal(),
            Self::Signing(e) => e.is_retryable(),
            Self::TaskFailed(_) => false,
            _ => true,
        }
    }
}

/// Why a session ended up in `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    pub reason: String,
    pub retryable: bool,
}

impl From<&TransferError> for TransferFailure {
    fn from(e: &TransferError) -> Self {
        Self {
            reason: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hint = if self.retryable { "retry" } else { "go back" };
        write!(f, "{} ({hint})", self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_fatal() {
        let fatal = TransferError::Key(KeyError::AuthenticationFailed);
        assert!(!fatal.is_retryable());
        let wrapped = TransferError::Signing(SigningError::Key(KeyError::StorageUnavailable(
            "locked".into(),
        )));
        assert!(!wrapped.is_retryable());
    }

    #[test]
    fn decode_and_signing_failures_are_retryable() {
        assert!(TransferError::Decode(DecodeError::ChecksumMismatch).is_retryable());
        assert!(TransferError::Signing(SigningError::SignatureVerificationFailed).is_retryable());
        assert!(TransferError::Key(KeyError::Busy).is_retryable());
    }

    #[test]
    fn failure_record_carries_reason() {
        let failure = TransferFailure::from(&TransferError::UserCancelled);
        assert_eq!(failure.reason, "cancelled by user");
        assert!(failure.retryable);
        assert_eq!(failure.to_string(), "cancelled by user (retry)");
    }
}
