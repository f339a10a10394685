//! # tssc
//!
//! Time-Series Special Compression: a streaming codec for measurement samples
//! `(point_id, timestamp, quality, value)`.
//!
//! TSSC compresses a sample by predicting each field from running state and
//! emitting a short code naming the predictor that hit, plus a payload only
//! when no predictor did. Codes themselves are bit-packed through adaptive
//! tables, so the most common transitions cost a single bit.
//!
//! ## Quick Start
//!
//! ```
//! use tssc::{Sample, decode_blocks, encode_blocks};
//!
//! let samples = vec![
//!     Sample::new(1, 1000, 0, 1.0),
//!     Sample::new(1, 1000, 0, 1.0),
//!     Sample::new(2, 1001, 0, 2.0),
//! ];
//!
//! let blocks = encode_blocks(&samples, 1024).unwrap();
//! let recovered = decode_blocks(&blocks).unwrap();
//! assert_eq!(recovered, samples);
//! ```
//!
//! ## Sessions
//!
//! [`Encoder`] and [`Decoder`] keep state across blocks: caches of recent
//! timestamps, per-point qualities and values, and per-point code tables.
//! Blocks must therefore be decoded in the order they were encoded, by one
//! decoder. After a lost or reordered block both sides must
//! [`reset`](Encoder::reset) before exchanging more data; the [`frame`]
//! module carries the sequence numbers needed to notice.
//!
//! ## Algorithm Details
//!
//! For each sample the encoder:
//! 1. Emits a point ID code only if the ID differs from the one predicted to
//!    follow the previous sample's point
//! 2. Emits a timestamp code only if the timestamp changed, preferring a
//!    repeat of the one before last or a cached delta over a varint
//! 3. Emits a quality code only if the point's quality changed
//! 4. Always emits a value code: a cache hit, zero, or an XOR against the
//!    point's previous value in 4-bit steps
//!
//! Code groups are ordered, so a code from a later group implies the earlier
//! fields were unchanged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod buffer;
pub mod code;
mod decoder;
mod encoder;
mod error;
pub mod frame;
mod metadata;
mod sample;
mod state;
mod varint;

pub use decoder::{Decoder, Samples};
pub use encoder::{Encoder, MIN_FREE_SPACE};
pub use error::{Result, TsscError};
pub use metadata::{CodeTable, CodingMode};
pub use sample::Sample;

/// Encodes samples into a sequence of blocks of at most `block_size` bytes.
///
/// All blocks belong to one session and must be decoded in order by a single
/// decoder, e.g. with [`decode_blocks`].
///
/// # Errors
///
/// Returns [`TsscError::BufferTooSmall`] if `block_size` is below
/// [`MIN_FREE_SPACE`], since no sample could ever be admitted.
///
/// # Examples
///
/// ```
/// use tssc::{Sample, encode_blocks};
///
/// let samples: Vec<Sample> = (0..1000)
///     .map(|i| Sample::new(i % 10, 1_000 + i64::from(i / 10), 0, f32::from(i % 10)))
///     .collect();
///
/// let blocks = encode_blocks(&samples, 512).unwrap();
/// let total: usize = blocks.iter().map(Vec::len).sum();
/// assert!(total < samples.len() * 18);
/// ```
pub fn encode_blocks(samples: &[Sample], block_size: usize) -> Result<Vec<Vec<u8>>> {
    if block_size < MIN_FREE_SPACE {
        return Err(TsscError::BufferTooSmall {
            required: MIN_FREE_SPACE,
            actual: block_size,
        });
    }

    let mut encoder = Encoder::new();
    Ok(encoder.fill_blocks(samples, block_size, 0))
}

/// Decodes a session's blocks, in order, back into samples.
///
/// # Errors
///
/// Returns the first decoding error: [`TsscError::Desync`],
/// [`TsscError::InvalidCode`] or [`TsscError::UnexpectedEndOfData`].
pub fn decode_blocks<B: AsRef<[u8]>>(blocks: &[B]) -> Result<Vec<Sample>> {
    let mut decoder = Decoder::new();
    let mut samples = Vec::new();

    for block in blocks {
        decoder.set_block(block.as_ref());
        for sample in decoder.samples() {
            samples.push(sample?);
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_scenario() {
        let samples = vec![
            Sample::new(1, 1000, 0, 1.0),
            Sample::new(1, 1000, 0, 1.0),
            Sample::new(2, 1001, 0, 2.0),
        ];

        let blocks = encode_blocks(&samples, 256).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(decode_blocks(&blocks).unwrap(), samples);
    }

    #[test]
    fn test_encode_decode_empty() {
        let blocks = encode_blocks(&[], 256).unwrap();
        assert!(blocks.is_empty());
        assert!(decode_blocks(&blocks).unwrap().is_empty());
    }

    #[test]
    fn test_block_size_too_small() {
        assert_eq!(
            encode_blocks(&[Sample::default()], 64),
            Err(TsscError::BufferTooSmall {
                required: MIN_FREE_SPACE,
                actual: 64
            })
        );
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn test_encode_decode_many_blocks() {
        let samples: Vec<Sample> = (0..5_000u32)
            .map(|i| {
                Sample::new(
                    (i % 37) as u16,
                    1_000_000 + i64::from(i / 37) * 333_333,
                    if i % 101 == 0 { 0x10 } else { 0 },
                    (i as f32 * 0.37).sin(),
                )
            })
            .collect();

        let blocks = encode_blocks(&samples, MIN_FREE_SPACE).unwrap();
        assert!(blocks.len() > 10);
        assert!(blocks.iter().all(|block| block.len() <= MIN_FREE_SPACE));
        assert_eq!(decode_blocks(&blocks).unwrap(), samples);
    }
}
