//! # Transaction Codec
//!
//! Turns transactions into optical frames and back.
//!
//! ```text
//!  Transaction ──encode_body──▶ body ──split──▶ [QrPayload; n] ──▶ QR codes
//!                                                                    │
//!  Transaction ◀──decode_body── body ◀──verify── ChunkAssembler ◀────┘
//! ```
//!
//! The checksum is the last gate before any body field is interpreted:
//! nothing in [`body`] ever runs on bytes that did not verify.
//!
//! ## Modules
//!
//! - [`varint`]: minimal big-endian integers and a bounds-checked reader.
//! - [`body`]: the unsigned and signed body layouts.
//! - [`frame`]: the frame header, checksum, hex text form and chunking.
//! - [`assembler`]: per-group reassembly and verification.
//! - [`error`]: [`DecodeError`] and [`EncodeError`].

pub mod assembler;
pub mod body;
pub mod error;
pub mod frame;
pub mod varint;

pub use assembler::{ChunkAssembler, FeedOutcome};
pub use error::{DecodeError, EncodeError};
pub use frame::{GroupId, QrPayload};

use crate::transaction::types::Transaction;

/// Encodes `tx` into display frames under a fresh random group id.
pub fn encode(tx: &Transaction, capacity: usize) -> Result<Vec<QrPayload>, EncodeError> {
    encode_with_group(tx, GroupId::random(), capacity)
}

/// Encodes `tx` under a caller-chosen group id.
///
/// Deterministic, which is what tests and benchmarks want. Real transfers
/// should use [`encode`] so that two transfers never share a group.
pub fn encode_with_group(
    tx: &Transaction,
    group_id: GroupId,
    capacity: usize,
) -> Result<Vec<QrPayload>, EncodeError> {
    let body = body::encode_body(tx)?;
    let frames = frame::split(body::version_for(tx), group_id, &body, capacity)?;
    tracing::debug!(
        %group_id,
        chunks = frames.len(),
        body_len = body.len(),
        signed = tx.is_signed(),
        "transaction encoded"
    );
    Ok(frames)
}

/// Decodes a complete set of frames belonging to one transfer, in any order.
///
/// Frames from more than one group in the same set mean the transfer was
/// spliced and are refused with [`DecodeError::ChecksumMismatch`]. A set
/// that is missing chunks yields [`DecodeError::IncompleteChunks`].
pub fn decode(frames: &[QrPayload]) -> Result<Transaction, DecodeError> {
    let first = frames
        .first()
        .ok_or_else(|| DecodeError::format("no frames to decode"))?;
    let group_id = first.group_id();
    if frames.iter().any(|f| f.group_id() != group_id) {
        return Err(DecodeError::ChecksumMismatch);
    }

    let mut assembler = ChunkAssembler::with_max_groups(1);
    for frame in frames {
        if let FeedOutcome::Complete(tx) = assembler.feed(frame.clone())? {
            return Ok(tx);
        }
    }
    Err(assembler.finish(&group_id))
}

/// [`decode`] over the text read from QR codes.
pub fn decode_strings<S: AsRef<str>>(texts: &[S]) -> Result<Transaction, DecodeError> {
    let frames = texts
        .iter()
        .map(|t| QrPayload::from_qr_string(t.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    decode(&frames)
}
