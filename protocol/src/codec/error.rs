//! Codec error types.

use thiserror::Error;

/// Why a scanned payload was refused.
///
/// Every variant except [`DecodeError::IncompleteChunks`] means the data is
/// discarded. Nothing downstream ever sees a partially-trusted value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A field could not be parsed: wrong length, non-canonical integer,
    /// unknown transaction type, trailing bytes, or text that is not a frame.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The frame version tag is not one this build understands.
    #[error("unsupported payload version 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// The reassembled transfer failed its integrity check.
    #[error("checksum mismatch: transfer damaged or spliced")]
    ChecksumMismatch,

    /// Completion was requested before every chunk arrived. A status, not
    /// a failure: keep scanning.
    #[error("incomplete transfer: {received} of {expected} chunks collected")]
    IncompleteChunks { received: usize, expected: usize },
}

impl DecodeError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat(reason.into())
    }
}

/// Why a transaction could not be turned into frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("calldata is {len} bytes, limit is {max}")]
    DataTooLarge { len: usize, max: usize },

    #[error("payload needs {chunks} frames, the wire format allows {max}")]
    PayloadTooLarge { chunks: usize, max: usize },

    #[error("chunk capacity {0} is outside the supported range")]
    InvalidCapacity(usize),
}
