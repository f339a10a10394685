//! Error types for TSSC operations.

use std::fmt;

/// Result type for TSSC operations.
pub type Result<T> = std::result::Result<T, TsscError>;

/// Errors that can occur while decoding a TSSC stream or handling frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsscError {
    /// A code was read that does not belong to the current position of the
    /// field cascade. The decoder and encoder are out of step.
    Desync {
        /// Smallest code allowed at this position
        expected_min: u8,
        /// Code actually read
        found: u8,
    },

    /// A code outside the wire code table was read.
    InvalidCode(u8),

    /// Bits or payload bytes were requested past the end of the bound buffer.
    UnexpectedEndOfData,

    /// The block size cannot admit a single sample.
    BufferTooSmall {
        /// Minimum usable size
        required: usize,
        /// Size provided
        actual: usize,
    },

    /// Frame carries a version byte this implementation does not speak.
    UnsupportedVersion(u8),

    /// Frame arrived out of sequence.
    SequenceMismatch {
        /// Sequence number the reader was waiting for
        expected: u16,
        /// Sequence number carried by the frame
        received: u16,
    },

    /// Frame is shorter than its header.
    FrameTooShort(usize),
}

impl fmt::Display for TsscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TsscError::Desync {
                expected_min,
                found,
            } => write!(
                f,
                "Stream desynchronized: expecting code >= {}, got {}",
                expected_min, found
            ),
            TsscError::InvalidCode(code) => write!(f, "Invalid code received: {}", code),
            TsscError::UnexpectedEndOfData => write!(f, "Unexpected end of data"),
            TsscError::BufferTooSmall { required, actual } => write!(
                f,
                "Buffer too small: need at least {} bytes, got {} bytes",
                required, actual
            ),
            TsscError::UnsupportedVersion(version) => {
                write!(f, "Unsupported frame version: {}", version)
            }
            TsscError::SequenceMismatch { expected, received } => write!(
                f,
                "Frame out of sequence: expecting {}, received {}",
                expected, received
            ),
            TsscError::FrameTooShort(len) => write!(f, "Frame too short: {} bytes", len),
        }
    }
}

impl std::error::Error for TsscError {}
