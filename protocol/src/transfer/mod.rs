//! # Transfer State Machines
//!
//! One session per device role. The hot wallet composes a request, shows it
//! as QR frames, then scans the signed result back and hands it to a
//! broadcaster. The cold signer scans the request, shows it for review,
//! waits for an explicit yes, signs, and shows the result.
//!
//! ```text
//! hot:  Idle → Composing → Encoded → AwaitingSignedScan → Scanning
//!            → Verifying → Broadcasting → Done
//! cold: Idle → Scanning → Decoded → AwaitingApproval → Signing
//!            → Encoded → Done            (reject: AwaitingApproval → Idle)
//! ```
//!
//! `Error` is reachable from every non-terminal state and records whether
//! the operator can retry. Sessions are plain synchronous state machines;
//! [`driver`] runs them off a bounded event channel with deadlines and
//! keeps signing off the scan loop.

pub mod broadcast;
pub mod cold;
pub mod driver;
pub mod error;
pub mod hot;

use std::fmt;

use serde::Serialize;

pub use broadcast::{Broadcaster, RecordingBroadcaster};
pub use cold::{ColdSession, ColdState, SigningJob};
pub use driver::{drive_cold, drive_hot, scan_channel, ScanEvent};
pub use error::{TransferError, TransferFailure};
pub use hot::{HotSession, HotState, PendingRequest};

use crate::codec::GroupId;
use crate::transaction::Transaction;

/// Which state a session is in, without the data it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Idle,
    Composing,
    Encoded,
    AwaitingSignedScan,
    Scanning,
    Verifying,
    Broadcasting,
    Decoded,
    AwaitingApproval,
    Signing,
    Done,
    Error,
}

impl StateKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    /// `Done` or `Error`: the outcome is recorded and a later failure
    /// (a cancel, a timeout) must not overwrite it.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Composing => "composing",
            Self::Encoded => "encoded",
            Self::AwaitingSignedScan => "awaiting signed scan",
            Self::Scanning => "scanning",
            Self::Verifying => "verifying",
            Self::Broadcasting => "broadcasting",
            Self::Decoded => "decoded",
            Self::AwaitingApproval => "awaiting approval",
            Self::Signing => "signing",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// What feeding one scanned frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanProgress {
    /// More chunks are needed for this group.
    Pending {
        group_id: GroupId,
        received: usize,
        expected: usize,
    },
    /// A transfer completed, decoded, and passed the session's checks.
    Decoded(Transaction),
    /// The session is not scanning right now; the frame was dropped.
    Ignored,
}
