//! Optical frames: the unit a single QR code carries.
//!
//! ```text
//! version:u8 | groupId:16 | chunkIndex:u16 | chunkCount:u16 | bodyLen:u16 | body | checksum:8
//! ```
//!
//! All integers are big-endian. The checksum is bound to the frame's own
//! header and to the *complete* body of the transfer, so a frame can only be
//! verified once all of its siblings are in hand. Until then it is just a
//! claim, and the assembler treats it as one.

use std::fmt;

use uuid::Uuid;

use super::error::{DecodeError, EncodeError};
use crate::config::{
    CHECKSUM_LENGTH, FRAME_HEADER_LENGTH, GROUP_ID_LENGTH, MAX_CHUNK_COUNT, MIN_CHUNK_CAPACITY,
};
use crate::crypto::hash::frame_checksum;

// ---------------------------------------------------------------------------
// GroupId
// ---------------------------------------------------------------------------

/// Random token shared by every chunk of one transfer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId([u8; GROUP_ID_LENGTH]);

impl GroupId {
    /// A fresh token from a v4 UUID.
    pub fn random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; GROUP_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; GROUP_ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({self})")
    }
}

// ---------------------------------------------------------------------------
// QrPayload
// ---------------------------------------------------------------------------

/// One parsed frame.
///
/// Fields are read-only: a payload is either produced by [`split`] or
/// parsed from scanned bytes, and in both cases `bodyLen` is implied by the
/// body it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    version: u8,
    group_id: GroupId,
    chunk_index: u16,
    chunk_count: u16,
    body: Vec<u8>,
    checksum: [u8; CHECKSUM_LENGTH],
}

impl QrPayload {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn chunk_index(&self) -> u16 {
        self.chunk_index
    }

    pub fn chunk_count(&self) -> u16 {
        self.chunk_count
    }

    /// This chunk's slice of the transfer body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn checksum(&self) -> &[u8; CHECKSUM_LENGTH] {
        &self.checksum
    }

    /// The 23 header bytes as they appear on the wire.
    pub fn header_bytes(&self) -> [u8; FRAME_HEADER_LENGTH] {
        header(
            self.version,
            &self.group_id,
            self.chunk_index,
            self.chunk_count,
            self.body.len() as u16,
        )
    }

    /// Serializes the frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LENGTH + self.body.len() + CHECKSUM_LENGTH);
        out.extend_from_slice(&self.header_bytes());
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&self.checksum);
        out
    }

    /// Parses one frame.
    ///
    /// Only the framing is checked here. A frame too short to hold a header
    /// and checksum is `InvalidFormat`. A `bodyLen` that disagrees with
    /// the frame length, or an index/count pair that cannot exist, means
    /// the header was damaged, and that is reported as `ChecksumMismatch`.
    /// The checksum itself is verified later against the reassembled body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < FRAME_HEADER_LENGTH + CHECKSUM_LENGTH {
            return Err(DecodeError::format(format!(
                "frame is {} bytes, need at least {}",
                bytes.len(),
                FRAME_HEADER_LENGTH + CHECKSUM_LENGTH
            )));
        }

        let version = bytes[0];
        let mut group = [0u8; GROUP_ID_LENGTH];
        group.copy_from_slice(&bytes[1..1 + GROUP_ID_LENGTH]);
        let at = 1 + GROUP_ID_LENGTH;
        let chunk_index = u16::from_be_bytes([bytes[at], bytes[at + 1]]);
        let chunk_count = u16::from_be_bytes([bytes[at + 2], bytes[at + 3]]);
        let body_len = u16::from_be_bytes([bytes[at + 4], bytes[at + 5]]) as usize;

        let checksum_at = bytes.len() - CHECKSUM_LENGTH;
        if checksum_at - FRAME_HEADER_LENGTH != body_len {
            return Err(DecodeError::ChecksumMismatch);
        }
        if chunk_count == 0 || chunk_index >= chunk_count {
            return Err(DecodeError::ChecksumMismatch);
        }

        let mut checksum = [0u8; CHECKSUM_LENGTH];
        checksum.copy_from_slice(&bytes[checksum_at..]);

        Ok(Self {
            version,
            group_id: GroupId(group),
            chunk_index,
            chunk_count,
            body: bytes[FRAME_HEADER_LENGTH..checksum_at].to_vec(),
            checksum,
        })
    }

    /// Uppercase hex, the text a QR code carries in alphanumeric mode.
    pub fn to_qr_string(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }

    /// Parses the text read from a QR code. Either hex case is accepted and
    /// surrounding whitespace is ignored.
    pub fn from_qr_string(text: &str) -> Result<Self, DecodeError> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| DecodeError::format(format!("frame is not hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Whether this frame's checksum matches `full_body`.
    pub fn verify_against(&self, full_body: &[u8]) -> bool {
        frame_checksum(&self.header_bytes(), full_body) == self.checksum
    }
}

fn header(
    version: u8,
    group_id: &GroupId,
    chunk_index: u16,
    chunk_count: u16,
    body_len: u16,
) -> [u8; FRAME_HEADER_LENGTH] {
    let mut out = [0u8; FRAME_HEADER_LENGTH];
    out[0] = version;
    out[1..1 + GROUP_ID_LENGTH].copy_from_slice(group_id.as_bytes());
    let at = 1 + GROUP_ID_LENGTH;
    out[at..at + 2].copy_from_slice(&chunk_index.to_be_bytes());
    out[at + 2..at + 4].copy_from_slice(&chunk_count.to_be_bytes());
    out[at + 4..at + 6].copy_from_slice(&body_len.to_be_bytes());
    out
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// Cuts `body` into frames of at most `capacity` body bytes.
///
/// A body of `L > capacity` bytes becomes `n = ceil(L / capacity)` chunks
/// of `ceil(L / n)` bytes each (the last may be shorter), so a transfer
/// never ends in a nearly-empty straggler frame. An empty body is one
/// empty frame.
pub fn split(
    version: u8,
    group_id: GroupId,
    body: &[u8],
    capacity: usize,
) -> Result<Vec<QrPayload>, EncodeError> {
    if !(MIN_CHUNK_CAPACITY..=u16::MAX as usize).contains(&capacity) {
        return Err(EncodeError::InvalidCapacity(capacity));
    }

    let count = body.len().div_ceil(capacity).max(1);
    if count > MAX_CHUNK_COUNT {
        return Err(EncodeError::PayloadTooLarge {
            chunks: count,
            max: MAX_CHUNK_COUNT,
        });
    }
    let size = body.len().div_ceil(count).max(1);

    let pieces: Vec<&[u8]> = if body.is_empty() {
        vec![&[]]
    } else {
        body.chunks(size).collect()
    };
    let chunk_count = pieces.len() as u16;

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            let chunk_index = index as u16;
            let head = header(version, &group_id, chunk_index, chunk_count, piece.len() as u16);
            QrPayload {
                version,
                group_id,
                chunk_index,
                chunk_count,
                body: piece.to_vec(),
                checksum: frame_checksum(&head, body),
            }
        })
        .collect())
}
