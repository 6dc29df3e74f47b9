//! Chunk reassembly.
//!
//! Scanners are messy: frames arrive in any order, the same code is read
//! ten times in a row, and a stray code from an earlier transfer can sneak
//! in mid-collection. The assembler buffers frames per [`GroupId`] and only
//! hands out a [`Transaction`] once a group is complete *and* every one of
//! its frames verifies against the reassembled body.
//!
//! Any integrity failure throws the whole group away. There is no partial
//! credit.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use super::body::decode_body;
use super::error::DecodeError;
use super::frame::{GroupId, QrPayload};
use crate::config::DEFAULT_MAX_PENDING_GROUPS;
use crate::transaction::types::Transaction;

/// Result of feeding one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Frame accepted; the group still needs more chunks.
    Pending {
        group_id: GroupId,
        received: usize,
        expected: usize,
    },
    /// The group completed and decoded.
    Complete(Transaction),
}

impl FeedOutcome {
    /// The decoded transaction, or [`DecodeError::IncompleteChunks`] if the
    /// group is still collecting.
    pub fn require_complete(self) -> Result<Transaction, DecodeError> {
        match self {
            Self::Complete(tx) => Ok(tx),
            Self::Pending {
                received, expected, ..
            } => Err(DecodeError::IncompleteChunks { received, expected }),
        }
    }
}

enum Slot {
    Fresh,
    Duplicate,
    Conflict,
}

struct PendingGroup {
    version: u8,
    chunk_count: u16,
    chunks: BTreeMap<u16, QrPayload>,
    last_touched: u64,
}

/// Buffers chunks per group until each group can be verified.
pub struct ChunkAssembler {
    groups: HashMap<GroupId, PendingGroup>,
    max_groups: usize,
    tick: u64,
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::with_max_groups(DEFAULT_MAX_PENDING_GROUPS)
    }

    /// An assembler holding at most `max_groups` incomplete groups (at
    /// least one).
    pub fn with_max_groups(max_groups: usize) -> Self {
        Self {
            groups: HashMap::new(),
            max_groups: max_groups.max(1),
            tick: 0,
        }
    }

    /// Number of groups currently collecting.
    pub fn pending_groups(&self) -> usize {
        self.groups.len()
    }

    /// `(received, expected)` for a group being collected.
    pub fn progress(&self, group_id: &GroupId) -> Option<(usize, usize)> {
        self.groups
            .get(group_id)
            .map(|g| (g.chunks.len(), g.chunk_count as usize))
    }

    /// Drops every buffered frame.
    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Parses a scanned string and feeds it.
    pub fn feed_text(&mut self, text: &str) -> Result<FeedOutcome, DecodeError> {
        self.feed(QrPayload::from_qr_string(text)?)
    }

    /// Feeds one frame. Completes the group as soon as its last chunk
    /// arrives.
    pub fn feed(&mut self, frame: QrPayload) -> Result<FeedOutcome, DecodeError> {
        let group_id = frame.group_id();
        self.tick += 1;

        if frame.chunk_count() == 0 || frame.chunk_index() >= frame.chunk_count() {
            self.groups.remove(&group_id);
            return Err(DecodeError::ChecksumMismatch);
        }

        if !self.groups.contains_key(&group_id) {
            self.make_room();
            debug!(
                %group_id,
                chunk_count = frame.chunk_count(),
                "new transfer group"
            );
        }
        let tick = self.tick;
        let group = self.groups.entry(group_id).or_insert_with(|| PendingGroup {
            version: frame.version(),
            chunk_count: frame.chunk_count(),
            chunks: BTreeMap::new(),
            last_touched: tick,
        });
        group.last_touched = tick;

        let index = frame.chunk_index();
        let consistent =
            group.version == frame.version() && group.chunk_count == frame.chunk_count();
        let slot = match group.chunks.get(&index) {
            _ if !consistent => Slot::Conflict,
            Some(seen) if *seen == frame => Slot::Duplicate,
            Some(_) => Slot::Conflict,
            None => Slot::Fresh,
        };

        match slot {
            Slot::Conflict => {
                warn!(%group_id, chunk_index = index, "frame disagrees with its group, discarding transfer");
                self.groups.remove(&group_id);
                return Err(DecodeError::ChecksumMismatch);
            }
            Slot::Duplicate => {
                debug!(%group_id, chunk_index = index, "duplicate frame ignored");
            }
            Slot::Fresh => {
                debug!(%group_id, chunk_index = index, "frame buffered");
                group.chunks.insert(index, frame);
            }
        }

        let received = group.chunks.len();
        let expected = group.chunk_count as usize;
        if received < expected {
            return Ok(FeedOutcome::Pending {
                group_id,
                received,
                expected,
            });
        }

        // Complete: the buffer is released whatever the verdict.
        match self.groups.remove(&group_id) {
            Some(group) => complete(group_id, group).map(FeedOutcome::Complete),
            None => Err(DecodeError::format("transfer group vanished")),
        }
    }

    /// Reports why `group_id` has not produced a transaction yet.
    ///
    /// Completed groups are released by [`Self::feed`], so this only ever
    /// answers with [`DecodeError::IncompleteChunks`].
    pub fn finish(&self, group_id: &GroupId) -> DecodeError {
        let (received, expected) = self.progress(group_id).unwrap_or((0, 0));
        DecodeError::IncompleteChunks { received, expected }
    }

    fn make_room(&mut self) {
        while self.groups.len() >= self.max_groups {
            let oldest = self
                .groups
                .iter()
                .min_by_key(|(_, g)| g.last_touched)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    debug!(group_id = %id, "evicting stale transfer group");
                    self.groups.remove(&id);
                }
                None => break,
            }
        }
    }
}

/// Reassembles, verifies every frame, then interprets the body.
fn complete(group_id: GroupId, group: PendingGroup) -> Result<Transaction, DecodeError> {
    let body: Vec<u8> = group
        .chunks
        .values()
        .flat_map(|frame| frame.body().iter().copied())
        .collect();

    if !group.chunks.values().all(|frame| frame.verify_against(&body)) {
        warn!(%group_id, "reassembled transfer failed checksum");
        return Err(DecodeError::ChecksumMismatch);
    }

    let tx = decode_body(group.version, &body)?;
    debug!(%group_id, signed = tx.is_signed(), body_len = body.len(), "transfer decoded");
    Ok(tx)
}
