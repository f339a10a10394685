//! Sequence-numbered framing for TSSC blocks.
//!
//! A frame is `[version][sequence: u16 big-endian][block]`. Blocks of one
//! session only decode in order, so the reader checks every sequence number
//! and stops decoding at the first gap until the writer starts a new session,
//! which it announces by sending sequence 0.

use log::{info, warn};

use crate::decoder::Decoder;
use crate::encoder::{Encoder, MIN_FREE_SPACE};
use crate::error::{Result, TsscError};
use crate::sample::Sample;

/// Version byte leading every frame.
pub const FRAME_VERSION: u8 = 85;

/// Bytes of frame header before the block.
pub const FRAME_HEADER_LEN: usize = 3;

#[inline]
fn next_sequence(sequence: u16) -> u16 {
    match sequence.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// Encodes samples into frames for one session.
#[derive(Debug)]
pub struct FrameWriter {
    encoder: Encoder,
    block_size: usize,
    sequence: u16,
}

impl FrameWriter {
    /// Creates a writer producing frames of at most `frame_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TsscError::BufferTooSmall`] if a frame of that size could not
    /// hold the header plus one sample.
    pub fn new(frame_size: usize) -> Result<Self> {
        let required = FRAME_HEADER_LEN + MIN_FREE_SPACE;
        if frame_size < required {
            return Err(TsscError::BufferTooSmall {
                required,
                actual: frame_size,
            });
        }

        Ok(Self {
            encoder: Encoder::new(),
            block_size: frame_size,
            sequence: 0,
        })
    }

    /// Sequence number the next frame will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Starts a new session. The next frame carries sequence 0, which tells
    /// the reader to reset its decoder.
    pub fn reset(&mut self) {
        self.encoder.reset();
        self.sequence = 0;
    }

    /// Encodes `samples` into as many frames as needed, each consuming one
    /// sequence number.
    pub fn encode(&mut self, samples: &[Sample]) -> Vec<Vec<u8>> {
        let mut frames = self
            .encoder
            .fill_blocks(samples, self.block_size, FRAME_HEADER_LEN);

        for frame in &mut frames {
            frame[0] = FRAME_VERSION;
            frame[1..FRAME_HEADER_LEN].copy_from_slice(&self.sequence.to_be_bytes());
            self.sequence = next_sequence(self.sequence);
        }

        frames
    }
}

/// Decodes frames of one session, checking their order.
#[derive(Debug, Default)]
pub struct FrameReader {
    decoder: Decoder,
    expected: u16,
    awaiting_reset: bool,
}

impl FrameReader {
    /// Creates a reader expecting sequence 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next frame should carry.
    pub fn expected_sequence(&self) -> u16 {
        self.expected
    }

    /// Whether frames are being refused until the writer resets.
    pub fn is_awaiting_reset(&self) -> bool {
        self.awaiting_reset
    }

    /// Forgets the session and expects sequence 0.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.expected = 0;
        self.awaiting_reset = false;
    }

    /// Decodes one frame.
    ///
    /// A frame with sequence 0 arriving mid-session resets the decoder. Any
    /// other gap, or a frame that fails to decode, leaves the reader refusing
    /// frames until the writer resets.
    ///
    /// # Errors
    ///
    /// [`TsscError::FrameTooShort`] and [`TsscError::UnsupportedVersion`] reject
    /// the frame without affecting the session. [`TsscError::SequenceMismatch`]
    /// and decoding errors are returned once the session is abandoned.
    pub fn read_frame(&mut self, frame: &[u8]) -> Result<Vec<Sample>> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(TsscError::FrameTooShort(frame.len()));
        }
        if frame[0] != FRAME_VERSION {
            return Err(TsscError::UnsupportedVersion(frame[0]));
        }

        let sequence = u16::from_be_bytes([frame[1], frame[2]]);

        if sequence == 0 && (self.expected != 0 || self.awaiting_reset) {
            info!("publisher reset detected, resetting decoder");
            self.reset();
        }

        if self.awaiting_reset || sequence != self.expected {
            if !self.awaiting_reset {
                warn!(
                    "frame sequence gap: expecting {}, received {}; waiting for reset",
                    self.expected, sequence
                );
                self.awaiting_reset = true;
            }
            return Err(TsscError::SequenceMismatch {
                expected: self.expected,
                received: sequence,
            });
        }

        self.decoder.set_block(&frame[FRAME_HEADER_LEN..]);

        let mut samples = Vec::new();
        for sample in self.decoder.samples() {
            match sample {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    warn!("frame {} failed to decode: {}; waiting for reset", sequence, e);
                    self.awaiting_reset = true;
                    return Err(e);
                }
            }
        }

        self.expected = next_sequence(sequence);
        Ok(samples)
    }
}
