//! The cold signer's half of a transfer.
//!
//! Scans a request, puts the review summary in front of the operator and
//! then waits. Nothing gets signed without an explicit approval, and the
//! approval is bound to the signing hash that was on screen.
//!
//! Signing itself is split into [`ColdSession::begin_signing`] and
//! [`ColdSession::finish_signing`] so the slow part, a [`SigningJob`], can
//! run off the scan loop. [`ColdSession::approve_and_sign`] does both with
//! `spawn_blocking` in between.

use alloy_primitives::B256;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::error::{TransferError, TransferFailure};
use super::{ScanProgress, StateKind};
use crate::codec::{self, ChunkAssembler, DecodeError, FeedOutcome, GroupId, QrPayload};
use crate::config::ProtocolConfig;
use crate::presenter::{summarize, ReviewPolicy, TransactionSummary};
use crate::transaction::{
    validate_unsigned, SignedTransaction, SigningEngine, SigningError, Transaction,
    UnsignedTransaction,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColdState {
    Idle,
    Scanning {
        group_id: GroupId,
        received: usize,
        expected: usize,
    },
    Decoded {
        request: UnsignedTransaction,
    },
    AwaitingApproval {
        request: UnsignedTransaction,
        summary: TransactionSummary,
    },
    Signing {
        signing_hash: B256,
    },
    Encoded {
        signed: SignedTransaction,
        frames: Vec<QrPayload>,
    },
    Done,
    Error(TransferFailure),
}

impl ColdState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::Scanning { .. } => StateKind::Scanning,
            Self::Decoded { .. } => StateKind::Decoded,
            Self::AwaitingApproval { .. } => StateKind::AwaitingApproval,
            Self::Signing { .. } => StateKind::Signing,
            Self::Encoded { .. } => StateKind::Encoded,
            Self::Done => StateKind::Done,
            Self::Error(_) => StateKind::Error,
        }
    }
}

/// An approved request on its way to the key. Owns everything it needs, so
/// it can be moved onto a blocking thread.
pub struct SigningJob {
    engine: SigningEngine,
    request: UnsignedTransaction,
    reviewed: B256,
}

impl SigningJob {
    /// Signs, refusing if the request no longer matches the reviewed hash.
    pub fn run(self) -> Result<SignedTransaction, SigningError> {
        self.engine.sign_reviewed(&self.request, &self.reviewed)
    }
}

/// Cold-side session.
pub struct ColdSession {
    state: ColdState,
    assembler: ChunkAssembler,
    engine: SigningEngine,
    policy: ReviewPolicy,
    config: ProtocolConfig,
}

impl ColdSession {
    pub fn new(engine: SigningEngine, config: ProtocolConfig) -> Self {
        Self {
            state: ColdState::Idle,
            assembler: ChunkAssembler::with_max_groups(config.max_pending_groups),
            engine,
            policy: ReviewPolicy::from_config(&config),
            config,
        }
    }

    pub fn state(&self) -> &ColdState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// The review summary, while awaiting approval.
    pub fn summary(&self) -> Option<&TransactionSummary> {
        match &self.state {
            ColdState::AwaitingApproval { summary, .. } => Some(summary),
            _ => None,
        }
    }

    /// The request under review.
    pub fn request(&self) -> Option<&UnsignedTransaction> {
        match &self.state {
            ColdState::AwaitingApproval { request, .. } | ColdState::Decoded { request } => {
                Some(request)
            }
            _ => None,
        }
    }

    /// Signed frames to display, once encoded.
    pub fn frames(&self) -> Option<&[QrPayload]> {
        match &self.state {
            ColdState::Encoded { frames, .. } => Some(frames),
            _ => None,
        }
    }

    pub fn signed(&self) -> Option<&SignedTransaction> {
        match &self.state {
            ColdState::Encoded { signed, .. } => Some(signed),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    /// Feeds one scanned frame.
    ///
    /// A completed request is validated and summarized, and the session
    /// moves to `AwaitingApproval`. Frames that arrive while not scanning,
    /// including during signing, are dropped.
    pub fn feed_frame(&mut self, text: &str) -> Result<ScanProgress, TransferError> {
        if !matches!(self.kind(), StateKind::Idle | StateKind::Scanning) {
            debug!(state = %self.kind(), "frame ignored");
            return Ok(ScanProgress::Ignored);
        }

        match self.assembler.feed_text(text) {
            Err(e) => Err(self.fail(e.into())),
            Ok(FeedOutcome::Pending {
                group_id,
                received,
                expected,
            }) => {
                self.transition(ColdState::Scanning {
                    group_id,
                    received,
                    expected,
                });
                Ok(ScanProgress::Pending {
                    group_id,
                    received,
                    expected,
                })
            }
            Ok(FeedOutcome::Complete(Transaction::Signed(_))) => Err(self.fail(
                DecodeError::InvalidFormat("expected a signing request, got a signed transaction".into())
                    .into(),
            )),
            Ok(FeedOutcome::Complete(Transaction::Unsigned(request))) => {
                self.transition(ColdState::Decoded {
                    request: request.clone(),
                });
                self.review(request.clone())?;
                Ok(ScanProgress::Decoded(Transaction::Unsigned(request)))
            }
        }
    }

    /// `Decoded → AwaitingApproval`.
    fn review(&mut self, request: UnsignedTransaction) -> Result<(), TransferError> {
        if let Err(e) = validate_unsigned(&request) {
            return Err(self.fail(e.into()));
        }
        let summary = summarize(&request, &self.policy);
        info!(
            recipient = %summary.recipient,
            chain_id = summary.chain_id,
            warnings = summary.warnings.len(),
            "request ready for review"
        );
        for warning in &summary.warnings {
            warn!(%warning, "review warning");
        }
        self.transition(ColdState::AwaitingApproval { request, summary });
        Ok(())
    }

    /// `AwaitingApproval → Idle`. The request is discarded.
    pub fn reject(&mut self) -> Result<(), TransferError> {
        if self.kind() != StateKind::AwaitingApproval {
            return Err(self.invalid("reject"));
        }
        info!("request rejected by operator");
        self.assembler.clear();
        self.transition(ColdState::Idle);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sign
    // -----------------------------------------------------------------------

    /// `AwaitingApproval → Signing`. The job signs `tx` only if it hashes to
    /// the digest in the summary the operator saw.
    pub fn begin_signing(&mut self, tx: &UnsignedTransaction) -> Result<SigningJob, TransferError> {
        let reviewed = self
            .summary()
            .map(|s| s.signing_hash)
            .ok_or_else(|| self.invalid("approve"))?;
        info!(signing_hash = %reviewed, "approved, signing");
        self.transition(ColdState::Signing {
            signing_hash: reviewed,
        });
        Ok(SigningJob {
            engine: self.engine.clone(),
            request: tx.clone(),
            reviewed,
        })
    }

    /// `Signing → Encoded`, or `Error` with the reason attached.
    ///
    /// A result arriving after the session left `Signing` (it was cancelled)
    /// is dropped.
    pub fn finish_signing(
        &mut self,
        result: Result<SignedTransaction, TransferError>,
    ) -> Result<SignedTransaction, TransferError> {
        if self.kind() != StateKind::Signing {
            return Err(self.invalid("finish signing"));
        }
        let signed = result.map_err(|e| self.fail(e))?;
        let frames = codec::encode(&Transaction::Signed(signed.clone()), self.config.chunk_capacity)
            .map_err(|e| self.fail(e.into()))?;
        info!(
            tx_hash = %signed.tx_hash(),
            chunks = frames.len(),
            "signed transaction encoded for display"
        );
        self.transition(ColdState::Encoded {
            signed: signed.clone(),
            frames,
        });
        Ok(signed)
    }

    /// Approves `tx` and signs it on the blocking pool.
    pub async fn approve_and_sign(
        &mut self,
        tx: &UnsignedTransaction,
    ) -> Result<SignedTransaction, TransferError> {
        let job = self.begin_signing(tx)?;
        let joined = tokio::task::spawn_blocking(move || job.run()).await;
        self.finish_signing(flatten_join(joined))
    }

    // -----------------------------------------------------------------------
    // Wrap-up
    // -----------------------------------------------------------------------

    /// `Encoded → Done`: the hot side has what it needs.
    pub fn complete(&mut self) -> Result<(), TransferError> {
        if self.kind() != StateKind::Encoded {
            return Err(self.invalid("complete"));
        }
        self.transition(ColdState::Done);
        Ok(())
    }

    pub fn cancel(&mut self) -> TransferError {
        self.fail(TransferError::UserCancelled)
    }

    /// Back to `Idle` from anywhere.
    pub fn reset(&mut self) {
        self.assembler.clear();
        self.transition(ColdState::Idle);
    }

    pub(crate) fn fail(&mut self, err: TransferError) -> TransferError {
        if !self.kind().is_settled() {
            warn!(state = %self.kind(), error = %err, "cold transfer failed");
            self.assembler.clear();
            self.transition(ColdState::Error(TransferFailure::from(&err)));
        }
        err
    }

    fn invalid(&self, action: &'static str) -> TransferError {
        TransferError::InvalidState {
            state: self.kind(),
            action,
        }
    }

    fn transition(&mut self, next: ColdState) {
        let from = self.kind();
        self.state = next;
        debug!(from = %from, to = %self.kind(), "cold state");
    }
}

/// Collapses a blocking-task result into a transfer result.
pub(crate) fn flatten_join(
    joined: Result<Result<SignedTransaction, SigningError>, JoinError>,
) -> Result<SignedTransaction, TransferError> {
    match joined {
        Ok(result) => result.map_err(TransferError::from),
        Err(e) => Err(TransferError::TaskFailed(e.to_string())),
    }
}
