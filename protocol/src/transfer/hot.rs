//! The hot wallet's half of a transfer.
//!
//! Composes the request, keeps it in memory while the cold device does its
//! thing, and refuses to broadcast anything that is not a signature over
//! exactly that request.

use alloy_primitives::{Address, B256};
use tracing::{debug, info, warn};

use super::broadcast::Broadcaster;
use super::error::{TransferError, TransferFailure};
use super::{ScanProgress, StateKind};
use crate::codec::{self, ChunkAssembler, FeedOutcome, GroupId, QrPayload};
use crate::config::ProtocolConfig;
use crate::transaction::{
    signing_hash, validate_unsigned, ComposeParams, SignedTransaction, Transaction,
    UnsignedTransaction,
};

/// The request that went out for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request: UnsignedTransaction,
    /// Digest the returned signature must cover.
    pub signing_hash: B256,
    /// Group id of the frames we displayed, so our own codes are not
    /// mistaken for the reply.
    pub group_id: GroupId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotState {
    Idle,
    Composing,
    Encoded {
        frames: Vec<QrPayload>,
    },
    AwaitingSignedScan,
    Scanning {
        group_id: GroupId,
        received: usize,
        expected: usize,
    },
    Verifying,
    Broadcasting {
        signed: SignedTransaction,
    },
    Done {
        tx_hash: B256,
    },
    Error(TransferFailure),
}

impl HotState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::Composing => StateKind::Composing,
            Self::Encoded { .. } => StateKind::Encoded,
            Self::AwaitingSignedScan => StateKind::AwaitingSignedScan,
            Self::Scanning { .. } => StateKind::Scanning,
            Self::Verifying => StateKind::Verifying,
            Self::Broadcasting { .. } => StateKind::Broadcasting,
            Self::Done { .. } => StateKind::Done,
            Self::Error(_) => StateKind::Error,
        }
    }
}

/// Hot-side session. One transfer at a time.
pub struct HotSession {
    state: HotState,
    pending: Option<PendingRequest>,
    assembler: ChunkAssembler,
    config: ProtocolConfig,
    expected_signer: Option<Address>,
}

impl HotSession {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            state: HotState::Idle,
            pending: None,
            assembler: ChunkAssembler::with_max_groups(config.max_pending_groups),
            config,
            expected_signer: None,
        }
    }

    /// Also require the returned signature to recover to `address`, the
    /// cold wallet this hot wallet watches.
    pub fn with_expected_signer(mut self, address: Address) -> Self {
        self.expected_signer = Some(address);
        self
    }

    pub fn state(&self) -> &HotState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Frames to display while in `Encoded`.
    pub fn frames(&self) -> Option<&[QrPayload]> {
        match &self.state {
            HotState::Encoded { frames } => Some(frames),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Compose
    // -----------------------------------------------------------------------

    /// `Idle → Composing`: the send form is open.
    pub fn begin_compose(&mut self) -> Result<(), TransferError> {
        self.expect(&[StateKind::Idle], "start composing")?;
        self.transition(HotState::Composing);
        Ok(())
    }

    /// Builds the request from form input and encodes it.
    ///
    /// Bad input is returned as [`TransferError::InvalidRequest`] and leaves
    /// the session in `Composing` so the form can be fixed.
    pub fn compose(&mut self, params: &ComposeParams) -> Result<&[QrPayload], TransferError> {
        self.expect(&[StateKind::Idle, StateKind::Composing], "compose")?;
        if self.kind() == StateKind::Idle {
            self.transition(HotState::Composing);
        }
        let tx = params.compose()?;
        self.submit(tx)
    }

    /// `Composing → Encoded` for an already built request.
    pub fn submit(&mut self, tx: UnsignedTransaction) -> Result<&[QrPayload], TransferError> {
        self.submit_with_group(tx, GroupId::random())
    }

    /// [`submit`](Self::submit) under a known group id.
    ///
    /// For a hot side that persists nothing and rebuilds its pending
    /// request from the frames it displayed earlier: reusing their group id
    /// keeps those frames recognisable as its own while scanning.
    pub fn submit_with_group(
        &mut self,
        tx: UnsignedTransaction,
        group_id: GroupId,
    ) -> Result<&[QrPayload], TransferError> {
        self.expect(&[StateKind::Idle, StateKind::Composing], "submit a request")?;
        validate_unsigned(&tx)?;

        let frames = match codec::encode_with_group(
            &Transaction::Unsigned(tx.clone()),
            group_id,
            self.config.chunk_capacity,
        ) {
            Ok(frames) => frames,
            Err(e) => return Err(self.fail(e.into())),
        };

        let pending = PendingRequest {
            signing_hash: signing_hash(&tx),
            group_id: frames[0].group_id(),
            request: tx,
        };
        info!(
            group_id = %pending.group_id,
            signing_hash = %pending.signing_hash,
            chunks = frames.len(),
            "request encoded for display"
        );
        self.pending = Some(pending);
        self.transition(HotState::Encoded { frames });
        Ok(self.frames().unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Scan back
    // -----------------------------------------------------------------------

    /// `Encoded → AwaitingSignedScan`: the operator switches to the camera.
    pub fn await_signed(&mut self) -> Result<(), TransferError> {
        self.expect(&[StateKind::Encoded], "start scanning")?;
        self.assembler.clear();
        self.transition(HotState::AwaitingSignedScan);
        Ok(())
    }

    /// Feeds one scanned frame.
    ///
    /// On a complete transfer the payload is verified right away and the
    /// session lands in `Broadcasting` or `Error`. Frames that arrive while
    /// the session is not scanning are ignored.
    pub fn feed_frame(&mut self, text: &str) -> Result<ScanProgress, TransferError> {
        if !matches!(
            self.kind(),
            StateKind::AwaitingSignedScan | StateKind::Scanning
        ) {
            debug!(state = %self.kind(), "frame ignored");
            return Ok(ScanProgress::Ignored);
        }

        let frame = match QrPayload::from_qr_string(text) {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(e.into())),
        };
        if self.pending.as_ref().map(|p| p.group_id) == Some(frame.group_id()) {
            debug!(group_id = %frame.group_id(), "own request frame ignored");
            return Ok(ScanProgress::Ignored);
        }

        match self.assembler.feed(frame) {
            Err(e) => Err(self.fail(e.into())),
            Ok(FeedOutcome::Pending {
                group_id,
                received,
                expected,
            }) => {
                self.transition(HotState::Scanning {
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
            Ok(FeedOutcome::Complete(tx)) => {
                self.transition(HotState::Verifying);
                match self.verify(tx) {
                    Ok(signed) => {
                        self.transition(HotState::Broadcasting {
                            signed: signed.clone(),
                        });
                        Ok(ScanProgress::Decoded(Transaction::Signed(signed)))
                    }
                    Err(e) => Err(self.fail(e)),
                }
            }
        }
    }

    /// The scanned payload must be a signature over the pending request,
    /// by the expected signer if we know one.
    fn verify(&self, tx: Transaction) -> Result<SignedTransaction, TransferError> {
        let pending = self.pending.as_ref().ok_or(TransferError::InvalidState {
            state: StateKind::Verifying,
            action: "verify without a pending request",
        })?;

        let signed = match tx {
            Transaction::Signed(signed) => signed,
            Transaction::Unsigned(_) => {
                return Err(TransferError::MismatchedTransaction(
                    "scanned payload is not signed".into(),
                ))
            }
        };

        let hash = signing_hash(signed.unsigned());
        if hash != pending.signing_hash {
            return Err(TransferError::MismatchedTransaction(format!(
                "signature covers {hash}, request was {}",
                pending.signing_hash
            )));
        }

        let signer = signed
            .signature()
            .recover(&hash)
            .map_err(|e| TransferError::MismatchedTransaction(e.to_string()))?
            .address();
        if let Some(expected) = self.expected_signer {
            if signer != expected {
                return Err(TransferError::MismatchedTransaction(format!(
                    "signed by {signer}, expected {expected}"
                )));
            }
        }

        debug!(%signer, tx_hash = %signed.tx_hash(), "signed transaction verified");
        Ok(signed)
    }

    // -----------------------------------------------------------------------
    // Broadcast
    // -----------------------------------------------------------------------

    /// `Broadcasting → Done`.
    pub async fn broadcast(&mut self, broadcaster: &dyn Broadcaster) -> Result<B256, TransferError> {
        let signed = match &self.state {
            HotState::Broadcasting { signed } => signed.clone(),
            _ => return Err(self.invalid("broadcast")),
        };

        match broadcaster.broadcast(&signed).await {
            Ok(tx_hash) => {
                if tx_hash != signed.tx_hash() {
                    warn!(reported = %tx_hash, local = %signed.tx_hash(), "node reported a different hash");
                }
                info!(%tx_hash, "transaction broadcast");
                self.pending = None;
                self.transition(HotState::Done { tx_hash });
                Ok(tx_hash)
            }
            Err(reason) => Err(self.fail(TransferError::Broadcast(reason))),
        }
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// After a retryable failure with the request still pending, go back to
    /// scanning for the signed reply.
    pub fn rescan(&mut self) -> Result<(), TransferError> {
        let retryable = matches!(&self.state, HotState::Error(f) if f.retryable);
        if !retryable || self.pending.is_none() {
            return Err(self.invalid("rescan"));
        }
        self.assembler.clear();
        self.transition(HotState::AwaitingSignedScan);
        Ok(())
    }

    /// Operator backed out.
    pub fn cancel(&mut self) -> TransferError {
        self.fail(TransferError::UserCancelled)
    }

    /// Back to `Idle`, forgetting the pending request.
    pub fn reset(&mut self) {
        self.pending = None;
        self.assembler.clear();
        self.transition(HotState::Idle);
    }

    /// Moves to `Error` unless the outcome is already recorded. Returns
    /// `err` for the caller to propagate.
    pub(crate) fn fail(&mut self, err: TransferError) -> TransferError {
        if !self.kind().is_settled() {
            warn!(state = %self.kind(), error = %err, "hot transfer failed");
            self.assembler.clear();
            self.transition(HotState::Error(TransferFailure::from(&err)));
        }
        err
    }

    fn expect(&self, allowed: &[StateKind], action: &'static str) -> Result<(), TransferError> {
        if allowed.contains(&self.kind()) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> TransferError {
        TransferError::InvalidState {
            state: self.kind(),
            action,
        }
    }

    fn transition(&mut self, next: HotState) {
        let from = self.kind();
        self.state = next;
        debug!(from = %from, to = %self.kind(), "hot state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeError;
    use crate::transaction::{FeeFields, SigningEngine, TransactionBuilder};
    use crate::transfer::RecordingBroadcaster;
    use crate::vault::{KeyCustodian, MemoryStorage};
    use alloy_primitives::U256;
    use std::sync::Arc;

    fn engine() -> SigningEngine {
        let custodian = KeyCustodian::init(Arc::new(MemoryStorage::new()));
        let wallet = custodian.generate().unwrap();
        custodian.store(&wallet.key_ref, &wallet.mnemonic).unwrap();
        SigningEngine::new(custodian)
    }

    fn params() -> ComposeParams {
        ComposeParams {
            chain_id: 1,
            to: "0x3535353535353535353535353535353535353535".into(),
            value: U256::from(1_000_000_000_000_000_000u128),
            nonce: 4,
            gas_limit: 21_000,
            fees: FeeFields::Legacy {
                gas_price: 20_000_000_000,
            },
            data: vec![],
        }
    }

    fn signed_frames(engine: &SigningEngine, tx: &UnsignedTransaction) -> Vec<String> {
        let signed = engine.sign(tx).unwrap();
        codec::encode(&Transaction::Signed(signed), 64)
            .unwrap()
            .iter()
            .map(QrPayload::to_qr_string)
            .collect()
    }

    fn feed_all(session: &mut HotSession, frames: &[String]) -> Result<ScanProgress, TransferError> {
        let mut last = Ok(ScanProgress::Ignored);
        for frame in frames {
            last = session.feed_frame(frame);
            if last.is_err() {
                break;
            }
        }
        last
    }

    fn ready_session() -> HotSession {
        let mut session = HotSession::new(ProtocolConfig::default());
        session.begin_compose().unwrap();
        session.compose(&params()).unwrap();
        session.await_signed().unwrap();
        session
    }

    #[tokio::test]
    async fn full_hot_round_trip() {
        let engine = engine();
        let mut session = ready_session();
        let request = session.pending().unwrap().request.clone();

        let frames = signed_frames(&engine, &request);
        assert!(frames.len() > 1);
        assert!(matches!(
            session.feed_frame(&frames[0]).unwrap(),
            ScanProgress::Pending { received: 1, .. }
        ));
        assert_eq!(session.kind(), StateKind::Scanning);

        let last = feed_all(&mut session, &frames[1..]).unwrap();
        assert!(matches!(last, ScanProgress::Decoded(Transaction::Signed(_))));
        assert_eq!(session.kind(), StateKind::Broadcasting);

        let broadcaster = RecordingBroadcaster::new();
        let tx_hash = session.broadcast(&broadcaster).await.unwrap();
        assert_eq!(session.state(), &HotState::Done { tx_hash });
        assert_eq!(broadcaster.sent().len(), 1);
        assert!(session.pending().is_none());
    }

    #[test]
    fn signature_for_another_request_is_refused() {
        let engine = engine();
        let mut session = ready_session();
        let mut other = session.pending().unwrap().request.clone();
        other.nonce += 1;

        let err = feed_all(&mut session, &signed_frames(&engine, &other)).unwrap_err();
        assert!(matches!(err, TransferError::MismatchedTransaction(_)));
        assert!(matches!(session.state(), HotState::Error(f) if f.retryable));

        session.rescan().unwrap();
        assert_eq!(session.kind(), StateKind::AwaitingSignedScan);
        let request = session.pending().unwrap().request.clone();
        feed_all(&mut session, &signed_frames(&engine, &request)).unwrap();
        assert_eq!(session.kind(), StateKind::Broadcasting);
    }

    #[test]
    fn unsigned_reply_is_refused() {
        let mut session = ready_session();
        let request = session.pending().unwrap().request.clone();
        let frames: Vec<String> = codec::encode(&Transaction::Unsigned(request), 512)
            .unwrap()
            .iter()
            .map(QrPayload::to_qr_string)
            .collect();
        assert!(matches!(
            feed_all(&mut session, &frames),
            Err(TransferError::MismatchedTransaction(_))
        ));
    }

    #[test]
    fn unexpected_signer_is_refused() {
        let engine = engine();
        let stranger = Address::repeat_byte(0x77);
        let mut session = HotSession::new(ProtocolConfig::default()).with_expected_signer(stranger);
        session.compose(&params()).unwrap();
        session.await_signed().unwrap();
        let request = session.pending().unwrap().request.clone();

        let err = feed_all(&mut session, &signed_frames(&engine, &request)).unwrap_err();
        assert!(matches!(err, TransferError::MismatchedTransaction(reason) if reason.contains("expected")));
    }

    #[test]
    fn own_request_frames_are_ignored() {
        let mut session = HotSession::new(ProtocolConfig::default());
        let own: Vec<String> = session
            .compose(&params())
            .unwrap()
            .iter()
            .map(QrPayload::to_qr_string)
            .collect();

        // Not scanning yet.
        assert_eq!(session.feed_frame(&own[0]).unwrap(), ScanProgress::Ignored);
        session.await_signed().unwrap();
        // Scanning, but it is our own code.
        assert_eq!(session.feed_frame(&own[0]).unwrap(), ScanProgress::Ignored);
        assert_eq!(session.kind(), StateKind::AwaitingSignedScan);
    }

    #[test]
    fn resubmitted_request_keeps_recognising_its_old_frames() {
        let request = params().compose().unwrap();
        let shown = codec::encode(&Transaction::Unsigned(request.clone()), 64).unwrap();
        let group_id = shown[0].group_id();

        let mut session = HotSession::new(ProtocolConfig::default());
        session.submit_with_group(request, group_id).unwrap();
        assert_eq!(session.pending().unwrap().group_id, group_id);
        session.await_signed().unwrap();

        for frame in &shown {
            assert_eq!(
                session.feed_frame(&frame.to_qr_string()).unwrap(),
                ScanProgress::Ignored
            );
        }
        assert_eq!(session.kind(), StateKind::AwaitingSignedScan);
    }

    #[test]
    fn corrupted_frame_moves_to_error() {
        let engine = engine();
        let mut session = ready_session();
        let request = session.pending().unwrap().request.clone();
        let signed = engine.sign(&request).unwrap();
        let mut bytes = codec::encode(&Transaction::Signed(signed), 4096).unwrap()[0].to_bytes();
        bytes[40] ^= 0x01;
        let text = hex::encode_upper(bytes);

        assert_eq!(
            session.feed_frame(&text).unwrap_err(),
            TransferError::Decode(DecodeError::ChecksumMismatch)
        );
        assert_eq!(session.kind(), StateKind::Error);

        // A cancel after the fact does not bury the real reason.
        assert_eq!(session.cancel(), TransferError::UserCancelled);
        let HotState::Error(failure) = session.state() else {
            panic!("expected error state, got {:?}", session.kind());
        };
        assert_eq!(
            failure.reason,
            TransferError::Decode(DecodeError::ChecksumMismatch).to_string()
        );
    }

    #[test]
    fn bad_form_input_stays_in_composing() {
        let mut session = HotSession::new(ProtocolConfig::default());
        session.begin_compose().unwrap();
        let mut bad = params();
        bad.to = "0x1234".into();
        assert!(matches!(
            session.compose(&bad),
            Err(TransferError::InvalidRequest(_))
        ));
        assert_eq!(session.kind(), StateKind::Composing);
    }

    #[test]
    fn out_of_order_actions_are_invalid_state() {
        let mut session = HotSession::new(ProtocolConfig::default());
        assert_eq!(
            session.await_signed().unwrap_err(),
            TransferError::InvalidState {
                state: StateKind::Idle,
                action: "start scanning"
            }
        );
        assert_eq!(session.kind(), StateKind::Idle);
        assert!(session.rescan().is_err());
    }

    #[tokio::test]
    async fn broadcast_refusal_is_retryable() {
        let engine = engine();
        let mut session = ready_session();
        let request = session.pending().unwrap().request.clone();
        feed_all(&mut session, &signed_frames(&engine, &request)).unwrap();

        let broadcaster = RecordingBroadcaster::new();
        broadcaster.refuse("nonce too low");
        let err = session.broadcast(&broadcaster).await.unwrap_err();
        assert_eq!(err, TransferError::Broadcast("nonce too low".into()));
        assert!(matches!(session.state(), HotState::Error(f) if f.retryable));
    }

    #[test]
    fn done_ignores_cancel() {
        let mut session = HotSession::new(ProtocolConfig::default());
        session.transition(HotState::Done {
            tx_hash: B256::repeat_byte(1),
        });
        session.cancel();
        assert_eq!(session.kind(), StateKind::Done);

        session.reset();
        assert_eq!(session.kind(), StateKind::Idle);
        let tx = TransactionBuilder::legacy(1)
            .to(Address::repeat_byte(1))
            .build()
            .unwrap();
        assert!(session.submit(tx).is_ok());
    }
}
