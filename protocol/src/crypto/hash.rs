//! # Hashing Utilities
//!
//! Two hash functions, each with exactly one job:
//!
//! - **Keccak-256** is Ethereum's hash. Addresses, signing digests and
//!   transaction hashes all use it, so it comes from `alloy-primitives`,
//!   the same implementation the rest of the Ethereum stack uses.
//! - **SHA-256**, truncated to [`CHECKSUM_LENGTH`] bytes, is the optical
//!   frame checksum. Collision resistance is not required here: the
//!   checksum catches camera misreads and spliced frames, not a forger
//!   (a forger can recompute any unkeyed checksum). Forgery is caught by
//!   the signature and hash checks further down the pipeline.

use alloy_primitives::B256;
use sha2::{Digest, Sha256};

use crate::config::CHECKSUM_LENGTH;

/// Keccak-256 digest.
///
/// ```
/// use airlock_protocol::crypto::keccak256;
///
/// // keccak256("") is a well-known constant.
/// assert_eq!(
///     hex::encode(keccak256(b"")),
///     "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
/// );
/// ```
pub fn keccak256(data: &[u8]) -> B256 {
    alloy_primitives::keccak256(data)
}

/// SHA-256 digest as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Frame checksum: truncated SHA-256 over a frame header and the complete
/// unchunked body.
///
/// The header goes first so that a corrupted header byte is caught by the
/// same comparison as a corrupted body byte.
pub fn frame_checksum(header: &[u8], full_body: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(header);
    hasher.update(full_body);
    let digest = hasher.finalize();
    let mut out = [0u8; CHECKSUM_LENGTH];
    out.copy_from_slice(&digest[..CHECKSUM_LENGTH]);
    out
}
