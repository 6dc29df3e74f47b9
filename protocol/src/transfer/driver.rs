//! Async drivers: run a session off a bounded event channel.
//!
//! The UI (camera callback, buttons) is the producer. The driver is the
//! single consumer, so the session sees one event at a time in the order
//! they were sent. Every wait has a deadline from [`ProtocolConfig`].
//!
//! While the cold side signs, the job runs on tokio's blocking pool and the
//! driver keeps draining the channel: frames are dropped, `Cancel` is
//! honoured. A cancelled or timed-out signing task is still awaited before
//! the driver returns, so the key buffers it holds are wiped before anyone
//! is told the transfer is over.
//!
//! [`ProtocolConfig`]: crate::config::ProtocolConfig

use std::time::Duration;

use alloy_primitives::B256;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use super::broadcast::Broadcaster;
use super::cold::{flatten_join, ColdSession, SigningJob};
use super::error::TransferError;
use super::hot::HotSession;
use super::StateKind;
use crate::config::SCAN_EVENT_CHANNEL_CAPACITY;
use crate::transaction::SignedTransaction;

/// Something the operator or the camera did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Text of one scanned QR code.
    Frame(String),
    Approve,
    Reject,
    Cancel,
}

/// Bounded channel sized for scanner bursts.
pub fn scan_channel() -> (mpsc::Sender<ScanEvent>, mpsc::Receiver<ScanEvent>) {
    mpsc::channel(SCAN_EVENT_CHANNEL_CAPACITY)
}

/// Next event, or a timeout, or cancellation if every sender is gone.
async fn next_event(
    events: &mut mpsc::Receiver<ScanEvent>,
    limit: Duration,
    phase: &'static str,
) -> Result<ScanEvent, TransferError> {
    match timeout(limit, events.recv()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(TransferError::UserCancelled),
        Err(_) => Err(TransferError::Timeout {
            phase,
            after_secs: limit.as_secs(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Cold
// ---------------------------------------------------------------------------

/// Runs a cold session from `Idle` to `Encoded`.
///
/// Returns the signed transaction; its display frames are in
/// [`ColdSession::frames`]. A rejection sends the session back to `Idle`
/// and the driver keeps scanning for the next request.
pub async fn drive_cold(
    session: &mut ColdSession,
    events: &mut mpsc::Receiver<ScanEvent>,
) -> Result<SignedTransaction, TransferError> {
    let scan_limit = session.config().scan_timeout();
    let sign_limit = session.config().sign_timeout();

    loop {
        let phase = if session.kind() == StateKind::AwaitingApproval {
            "awaiting approval"
        } else {
            "scanning"
        };
        let event = match next_event(events, scan_limit, phase).await {
            Ok(event) => event,
            Err(e) => return Err(session.fail(e)),
        };

        match event {
            ScanEvent::Frame(text) => {
                session.feed_frame(&text)?;
            }
            ScanEvent::Reject => {
                if let Err(e) = session.reject() {
                    debug!(error = %e, "reject ignored");
                }
            }
            ScanEvent::Cancel => return Err(session.cancel()),
            ScanEvent::Approve => {
                let Some(request) = session.request().cloned() else {
                    debug!(state = %session.kind(), "approve ignored");
                    continue;
                };
                let job = session.begin_signing(&request)?;
                return sign_until_done(session, events, job, sign_limit).await;
            }
        }
    }
}

async fn sign_until_done(
    session: &mut ColdSession,
    events: &mut mpsc::Receiver<ScanEvent>,
    job: SigningJob,
    limit: Duration,
) -> Result<SignedTransaction, TransferError> {
    let mut task = tokio::task::spawn_blocking(move || job.run());
    let deadline = sleep(limit);
    tokio::pin!(deadline);
    let mut events_open = true;

    loop {
        tokio::select! {
            joined = &mut task => {
                return session.finish_signing(flatten_join(joined));
            }
            _ = &mut deadline => {
                let _ = (&mut task).await;
                return Err(session.fail(TransferError::Timeout {
                    phase: "signing",
                    after_secs: limit.as_secs(),
                }));
            }
            event = events.recv(), if events_open => match event {
                Some(ScanEvent::Cancel) => {
                    info!("cancel while signing, waiting for the key to be released");
                    let _ = (&mut task).await;
                    return Err(session.cancel());
                }
                Some(other) => debug!(event = ?other, "event ignored while signing"),
                None => events_open = false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Hot
// ---------------------------------------------------------------------------

/// Runs a hot session from `AwaitingSignedScan` to `Done`: scans the
/// signed reply, verifies it, and broadcasts it.
pub async fn drive_hot(
    session: &mut HotSession,
    events: &mut mpsc::Receiver<ScanEvent>,
    broadcaster: &dyn Broadcaster,
) -> Result<B256, TransferError> {
    if session.kind() == StateKind::Encoded {
        session.await_signed()?;
    }
    let scan_limit = session.config().scan_timeout();

    loop {
        if session.kind() == StateKind::Broadcasting {
            return session.broadcast(broadcaster).await;
        }
        if !matches!(
            session.kind(),
            StateKind::AwaitingSignedScan | StateKind::Scanning
        ) {
            return Err(TransferError::InvalidState {
                state: session.kind(),
                action: "scan the signed transaction",
            });
        }

        let event = match next_event(events, scan_limit, "scanning").await {
            Ok(event) => event,
            Err(e) => return Err(session.fail(e)),
        };
        match event {
            ScanEvent::Frame(text) => {
                session.feed_frame(&text)?;
            }
            ScanEvent::Cancel => return Err(session.cancel()),
            other => debug!(event = ?other, "event ignored on hot side"),
        }
    }
}
