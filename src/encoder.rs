//! TSSC encoder: turns samples into codes and payloads against running state.

use log::debug;

use crate::buffer::BitWriter;
use crate::code::{CodeWord, POINT_ID_XOR, VALUE_XOR};
use crate::metadata::CodeTable;
use crate::sample::Sample;
use crate::state::StreamState;
use crate::varint::{write_varint, write_varint_u32};

/// Free space below which [`Encoder::try_add_measurement`] declines a sample.
///
/// Comfortably above the largest encoding of a single sample plus the
/// end-of-stream code written by [`Encoder::finish_block`].
pub const MIN_FREE_SPACE: usize = 100;

/// Stateful TSSC encoder for one session.
///
/// State carries across blocks; only [`Encoder::reset`] clears it, and the
/// receiving [`Decoder`](crate::Decoder) must be reset at the same point in
/// the stream.
#[derive(Debug, Default)]
pub struct Encoder {
    writer: BitWriter,
    state: StreamState,
}

impl Encoder {
    /// Creates an encoder with empty state and no buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all session state.
    ///
    /// Samples already written to the bound buffer belong to the old session,
    /// so the block in progress is discarded and restarts at its offset.
    pub fn reset(&mut self) {
        debug!(
            "encoder reset with {} registered points, discarding {} block bytes",
            self.state.point_count(),
            self.writer.written()
        );
        self.state.reset();
        self.writer.rewind();
    }

    /// Binds the buffer the next block is written into.
    ///
    /// Only `data[offset..offset + length]` is written; the vector is never
    /// grown.
    pub fn set_buffer(&mut self, data: Vec<u8>, offset: usize, length: usize) {
        self.writer.bind(data, offset, length);
    }

    /// Returns the bound buffer, leaving the encoder without one.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        self.writer.take()
    }

    /// The bound buffer.
    pub fn buffer(&self) -> &[u8] {
        self.writer.as_slice()
    }

    /// Current write position in the bound buffer.
    pub fn position(&self) -> usize {
        self.writer.position()
    }

    /// Number of distinct point IDs seen this session.
    pub fn point_count(&self) -> usize {
        self.state.point_count()
    }

    /// Code table owned by `point_id`, if the point has been seen.
    pub fn code_table(&self, point_id: u16) -> Option<&CodeTable> {
        self.state.metadata(point_id).map(|point| point.code_table())
    }

    /// Encodes one sample.
    ///
    /// Returns `false` without touching any state when the bound buffer has
    /// fewer than [`MIN_FREE_SPACE`] bytes left; the caller should finish the
    /// block and bind a new buffer.
    pub fn try_add_measurement(&mut self, sample: &Sample) -> bool {
        if self.writer.remaining() < MIN_FREE_SPACE {
            return false;
        }

        let slot = self.state.slot_or_insert(sample.point_id);

        // The active table belongs to the previous sample's point, whose
        // successor is usually this one.
        if self.state.active().predicted_next_id != sample.point_id {
            self.write_point_id_change(sample.point_id);
        }

        if self.state.prev_timestamp1 != sample.timestamp {
            self.write_timestamp_change(sample.timestamp);
        }

        if self.state.point(slot).prev_quality1 != sample.quality {
            self.write_quality_change(slot, sample.quality);
        }

        self.write_value(slot, sample.value.to_bits());

        self.state.set_active(slot);
        true
    }

    /// Ends the current block and returns the position one past its last byte.
    ///
    /// If codes are pending in a partial byte an end-of-stream code is written
    /// first; the tail is padded with zero bits.
    pub fn finish_block(&mut self) -> usize {
        if self.writer.pending_bits() > 0 {
            self.state.write_code(CodeWord::EndOfStream, &mut self.writer);
        }
        self.writer.flush();
        self.writer.position()
    }

    /// Encodes `samples` into as many blocks of `block_size` bytes as needed.
    ///
    /// Each block starts with `header_len` zeroed bytes reserved for the
    /// caller and is truncated to its finished length.
    pub(crate) fn fill_blocks(
        &mut self,
        samples: &[Sample],
        block_size: usize,
        header_len: usize,
    ) -> Vec<Vec<u8>> {
        debug_assert!(block_size >= header_len + MIN_FREE_SPACE);

        let mut blocks = Vec::new();
        let mut pending = 0usize;
        self.set_buffer(vec![0; block_size], header_len, block_size - header_len);

        for sample in samples {
            if !self.try_add_measurement(sample) {
                blocks.push(self.take_block());
                self.set_buffer(vec![0; block_size], header_len, block_size - header_len);
                pending = 0;

                let added = self.try_add_measurement(sample);
                debug_assert!(added, "a fresh block always admits a sample");
            }
            pending += 1;
        }

        if pending > 0 {
            blocks.push(self.take_block());
        }

        debug!(
            "encoded {} samples into {} blocks",
            samples.len(),
            blocks.len()
        );
        blocks
    }

    fn take_block(&mut self) -> Vec<u8> {
        let len = self.finish_block();
        let mut block = self.take_buffer();
        block.truncate(len);
        block
    }

    fn write_point_id_change(&mut self, point_id: u16) {
        let bits_changed = point_id ^ self.state.active().predicted_next_id;
        let width = xor_width(u32::from(bits_changed));

        self.state.write_code(
            POINT_ID_XOR[(width / 4 - 1) as usize],
            &mut self.writer,
        );
        write_xor_payload(&mut self.writer, u32::from(bits_changed), width);

        self.state.active_mut().predicted_next_id = point_id;
    }

    fn write_timestamp_change(&mut self, timestamp: i64) {
        let code = if timestamp == self.state.prev_timestamp2 {
            Some(CodeWord::Timestamp2)
        } else {
            self.state.delta_code(timestamp)
        };

        match code {
            Some(code) => self.state.write_code(code, &mut self.writer),
            None => {
                self.state.write_code(CodeWord::TimeXor7Bit, &mut self.writer);
                let bits = (timestamp ^ self.state.prev_timestamp1) as u64;
                write_varint(&mut self.writer, bits);
            }
        }

        self.state.push_timestamp(timestamp);
    }

    fn write_quality_change(&mut self, slot: usize, quality: u32) {
        if self.state.point(slot).prev_quality2 == quality {
            self.state.write_code(CodeWord::Quality2, &mut self.writer);
        } else {
            self.state.write_code(CodeWord::Quality7Bit32, &mut self.writer);
            write_varint_u32(&mut self.writer, quality);
        }

        self.state.point_mut(slot).push_quality(quality);
    }

    fn write_value(&mut self, slot: usize, value: u32) {
        let point = self.state.point(slot);

        if value == point.prev_value1 {
            self.state.write_code(CodeWord::Value1, &mut self.writer);
        } else if value == point.prev_value2 {
            self.state.write_code(CodeWord::Value2, &mut self.writer);
            self.state.point_mut(slot).promote_value2();
        } else if value == point.prev_value3 {
            self.state.write_code(CodeWord::Value3, &mut self.writer);
            self.state.point_mut(slot).promote_value3();
        } else if value == 0 {
            self.state.write_code(CodeWord::ValueZero, &mut self.writer);
            self.state.point_mut(slot).push_value(0);
        } else {
            let bits_changed = value ^ point.prev_value1;
            let width = xor_width(bits_changed);

            self.state
                .write_code(VALUE_XOR[(width / 4 - 1) as usize], &mut self.writer);
            write_xor_payload(&mut self.writer, bits_changed, width);

            self.state.point_mut(slot).push_value(value);
        }
    }
}

/// Narrowest multiple of four bits that holds `bits` (at least 4).
#[inline]
fn xor_width(bits: u32) -> u32 {
    let used = u32::BITS - bits.leading_zeros();
    used.div_ceil(4).max(1) * 4
}

/// Writes an XOR payload: a leading nibble through the bit stream when the
/// width is an odd number of nibbles, then whole bytes, low order first.
#[allow(clippy::cast_possible_truncation)]
fn write_xor_payload(writer: &mut BitWriter, bits: u32, width: u32) {
    let mut shift = 0;
    if width % 8 == 4 {
        writer.write_bits(bits & 0xF, 4);
        shift = 4;
    }
    while shift < width {
        writer.write_byte((bits >> shift) as u8);
        shift += 8;
    }
}
