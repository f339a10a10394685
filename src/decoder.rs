//! TSSC decoder: reconstructs samples from codes and payloads.

use log::debug;

use crate::buffer::BitReader;
use crate::code::{
    CodeWord, FIRST_QUALITY_CODE, FIRST_TIMESTAMP_CODE, FIRST_VALUE_CODE, LAST_POINT_ID_CODE,
    LAST_QUALITY_CODE, LAST_TIMESTAMP_CODE, xor_width,
};
use crate::error::{Result, TsscError};
use crate::metadata::CodeTable;
use crate::sample::Sample;
use crate::state::StreamState;
use crate::varint::{read_varint, read_varint_u32};

/// Stateful TSSC decoder for one session.
#[derive(Debug, Default)]
pub struct Decoder {
    reader: BitReader,
    state: StreamState,
}

impl Decoder {
    /// Creates a decoder with empty state and no buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all session state.
    pub fn reset(&mut self) {
        debug!(
            "decoder reset with {} registered points",
            self.state.point_count()
        );
        self.state.reset();
        self.reader.clear_bits();
    }

    /// Binds the next block; only `data[offset..offset + length]` is read.
    pub fn set_buffer(&mut self, data: Vec<u8>, offset: usize, length: usize) {
        self.reader.bind(data, offset, length);
    }

    /// Binds a copy of `block`, reusing the previously bound allocation.
    pub fn set_block(&mut self, block: &[u8]) {
        let mut data = self.reader.take();
        data.clear();
        data.extend_from_slice(block);
        self.reader.bind(data, 0, block.len());
    }

    /// Returns the bound buffer, leaving the decoder without one.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        self.reader.take()
    }

    /// Current read position in the bound buffer.
    pub fn position(&self) -> usize {
        self.reader.position()
    }

    /// Number of distinct point IDs seen this session.
    pub fn point_count(&self) -> usize {
        self.state.point_count()
    }

    /// Code table owned by `point_id`, if the point has been seen.
    pub fn code_table(&self, point_id: u16) -> Option<&CodeTable> {
        self.state.metadata(point_id).map(|point| point.code_table())
    }

    /// Decodes the next sample of the bound block.
    ///
    /// Returns `Ok(None)` at the end of the block, either on an end-of-stream
    /// code or when the buffer is consumed. Any error leaves the session
    /// unusable until both peers reset.
    pub fn try_get_measurement(&mut self) -> Result<Option<Sample>> {
        if self.reader.is_exhausted() {
            self.reader.clear_bits();
            return Ok(None);
        }

        // Decoded with the table of the previous sample's point.
        let mut code = self.state.read_code(&mut self.reader)?;

        if code == CodeWord::EndOfStream.code() {
            self.reader.clear_bits();
            return Ok(None);
        }

        if code <= LAST_POINT_ID_CODE {
            self.decode_point_id(code)?;
            code = self.next_code(FIRST_TIMESTAMP_CODE)?;
        }

        let point_id = self.state.active().predicted_next_id;
        let slot = self.state.slot_or_insert(point_id);

        let timestamp = if code <= LAST_TIMESTAMP_CODE {
            let timestamp = self.decode_timestamp(code)?;
            code = self.next_code(FIRST_QUALITY_CODE)?;
            timestamp
        } else {
            self.state.prev_timestamp1
        };

        let quality = if code <= LAST_QUALITY_CODE {
            let quality = self.decode_quality(code, slot)?;
            code = self.next_code(FIRST_VALUE_CODE)?;
            quality
        } else {
            self.state.point(slot).prev_quality1
        };

        let value = self.decode_value(code, slot)?;

        self.state.set_active(slot);

        Ok(Some(Sample::new(
            point_id,
            timestamp,
            quality,
            f32::from_bits(value),
        )))
    }

    /// Iterates over the remaining samples of the bound block.
    ///
    /// The iterator ends after the first error.
    pub fn samples(&mut self) -> Samples<'_> {
        Samples {
            decoder: self,
            done: false,
        }
    }

    fn next_code(&mut self, expected_min: u8) -> Result<u8> {
        let code = self.state.read_code(&mut self.reader)?;
        if code < expected_min {
            return Err(TsscError::Desync {
                expected_min,
                found: code,
            });
        }
        Ok(code)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn decode_point_id(&mut self, code: u8) -> Result<()> {
        let width = xor_width(code).ok_or(TsscError::InvalidCode(code))?;
        let bits_changed = read_xor_payload(&mut self.reader, width)? as u16;
        self.state.active_mut().predicted_next_id ^= bits_changed;
        Ok(())
    }

    fn decode_timestamp(&mut self, code: u8) -> Result<i64> {
        let timestamp = match CodeWord::try_from(code)? {
            CodeWord::Timestamp2 => self.state.prev_timestamp2,
            CodeWord::TimeXor7Bit => {
                let bits = read_varint(&mut self.reader)?;
                (bits ^ self.state.prev_timestamp1 as u64) as i64
            }
            _ => self
                .state
                .apply_delta(usize::from(code - FIRST_TIMESTAMP_CODE)),
        };

        self.state.push_timestamp(timestamp);
        Ok(timestamp)
    }

    fn decode_quality(&mut self, code: u8, slot: usize) -> Result<u32> {
        let quality = if code == CodeWord::Quality2.code() {
            self.state.point(slot).prev_quality2
        } else {
            read_varint_u32(&mut self.reader)?
        };

        self.state.point_mut(slot).push_quality(quality);
        Ok(quality)
    }

    fn decode_value(&mut self, code: u8, slot: usize) -> Result<u32> {
        let point = self.state.point_mut(slot);

        let value = match CodeWord::try_from(code)? {
            CodeWord::Value1 => point.prev_value1,
            CodeWord::Value2 => point.promote_value2(),
            CodeWord::Value3 => point.promote_value3(),
            CodeWord::ValueZero => {
                point.push_value(0);
                0
            }
            _ => {
                let width = xor_width(code).ok_or(TsscError::InvalidCode(code))?;
                let value = read_xor_payload(&mut self.reader, width)? ^ point.prev_value1;
                point.push_value(value);
                value
            }
        };

        Ok(value)
    }
}

/// Reads a payload written as a leading nibble (odd nibble counts only)
/// followed by whole bytes, low order first.
fn read_xor_payload(reader: &mut BitReader, width: u32) -> Result<u32> {
    let mut bits = 0;
    let mut shift = 0;
    if width % 8 == 4 {
        bits = reader.read_bits4()?;
        shift = 4;
    }
    while shift < width {
        bits |= u32::from(reader.read_byte()?) << shift;
        shift += 8;
    }
    Ok(bits)
}

/// Iterator over the samples of a block, see [`Decoder::samples`].
pub struct Samples<'a> {
    decoder: &'a mut Decoder,
    done: bool,
}

impl Iterator for Samples<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decoder.try_get_measurement() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BitWriter;
    use crate::encoder::Encoder;

    fn encode(samples: &[Sample]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.set_buffer(vec![0; 4096], 0, 4096);
        for sample in samples {
            assert!(encoder.try_add_measurement(sample));
        }
        let len = encoder.finish_block();
        let mut block = encoder.take_buffer();
        block.truncate(len);
        block
    }

    fn decode(block: &[u8]) -> Result<Vec<Sample>> {
        let mut decoder = Decoder::new();
        decoder.set_block(block);
        decoder.samples().collect()
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(decode(&[]).unwrap(), vec![]);
    }

    #[test]
    fn test_every_value_path() {
        let samples = [
            Sample::new(1, 100, 0, 1.0),
            Sample::new(1, 200, 0, 1.0),
            Sample::new(1, 300, 0, 2.0),
            Sample::new(1, 400, 0, 1.0),
            Sample::new(1, 500, 0, 3.0),
            Sample::new(1, 600, 0, 2.0),
            Sample::new(1, 700, 0, 0.0),
            Sample::new(1, 800, 0, f32::from_bits(0x0000_0003)),
            Sample::new(1, 900, 0, f32::from_bits(0x0000_0F03)),
            Sample::new(1, 1000, 0, f32::from_bits(0x00F0_0F03)),
            Sample::new(1, 1100, 0, f32::from_bits(0xFFF0_0F03)),
            Sample::new(1, 1200, 0, -0.0),
            Sample::new(1, 1300, 0, f32::NAN),
        ];
        assert_eq!(decode(&encode(&samples)).unwrap(), samples);
    }

    #[test]
    fn test_every_timestamp_path() {
        let samples = [
            Sample::new(1, 1_000, 0, 1.0),
            Sample::new(1, 1_010, 0, 1.0),
            Sample::new(1, 1_020, 0, 1.0),
            Sample::new(1, 1_010, 0, 1.0),
            Sample::new(1, 1_020, 0, 1.0),
            Sample::new(1, 1_040, 0, 1.0),
            Sample::new(1, 1_000, 0, 1.0),
            Sample::new(1, -5, 0, 1.0),
            Sample::new(1, i64::MAX, 0, 1.0),
            Sample::new(1, i64::MIN, 0, 1.0),
            Sample::new(1, 0, 0, 1.0),
        ];
        assert_eq!(decode(&encode(&samples)).unwrap(), samples);
    }

    #[test]
    fn test_every_point_id_width() {
        let samples: Vec<Sample> = [0u16, 5, 0x35, 0x235, 0xF235, 0xF235, 0, u16::MAX]
            .iter()
            .map(|&id| Sample::new(id, 42, 7, 1.25))
            .collect();
        assert_eq!(decode(&encode(&samples)).unwrap(), samples);
    }

    #[test]
    fn test_quality_cache() {
        let samples = [
            Sample::new(2, 1, 0xC000_0000, 1.0),
            Sample::new(2, 2, 8, 1.0),
            Sample::new(2, 3, 0xC000_0000, 1.0),
            Sample::new(2, 4, 0xC000_0000, 1.0),
            Sample::new(2, 5, u32::MAX, 1.0),
        ];
        assert_eq!(decode(&encode(&samples)).unwrap(), samples);
    }

    #[test]
    fn test_desync_is_reported() {
        // Seed table is in mode 4: "000" + 5-bit code. Two point ID codes in
        // a row break the cascade.
        let mut writer = BitWriter::default();
        writer.bind(vec![0; 8], 0, 8);
        writer.write_bits(CodeWord::PointIdXor4.code().into(), 8);
        writer.write_bits(0b0001, 4);
        writer.write_bits(CodeWord::PointIdXor8.code().into(), 8);
        writer.flush();
        let len = writer.position();
        let mut block = writer.take();
        block.truncate(len);

        assert_eq!(
            decode(&block),
            Err(TsscError::Desync {
                expected_min: FIRST_TIMESTAMP_CODE,
                found: CodeWord::PointIdXor8.code(),
            })
        );
    }

    #[test]
    fn test_unknown_code_is_reported() {
        let mut writer = BitWriter::default();
        writer.bind(vec![0; 4], 0, 4);
        writer.write_bits(30, 8);
        writer.flush();
        let block = writer.take();

        assert_eq!(decode(&block[..1]), Err(TsscError::InvalidCode(30)));
    }

    #[test]
    fn test_truncated_payload() {
        let block = encode(&[Sample::new(9, 123_456_789, 0, 1.0)]);
        assert_eq!(
            decode(&block[..block.len() - 2]),
            Err(TsscError::UnexpectedEndOfData)
        );
    }

    #[test]
    fn test_state_carries_across_blocks() {
        let first = [Sample::new(4, 10, 1, 1.0), Sample::new(5, 10, 1, 2.0)];
        let second = [Sample::new(4, 20, 1, 1.0), Sample::new(5, 20, 1, 2.0)];

        let mut encoder = Encoder::new();
        let mut blocks = Vec::new();
        for batch in [&first, &second] {
            encoder.set_buffer(vec![0; 256], 0, 256);
            for sample in batch.iter() {
                assert!(encoder.try_add_measurement(sample));
            }
            let len = encoder.finish_block();
            let mut block = encoder.take_buffer();
            block.truncate(len);
            blocks.push(block);
        }

        let mut decoder = Decoder::new();
        decoder.set_block(&blocks[0]);
        let decoded: Vec<Sample> = decoder.samples().collect::<Result<_>>().unwrap();
        assert_eq!(decoded, first);

        decoder.set_block(&blocks[1]);
        let decoded: Vec<Sample> = decoder.samples().collect::<Result<_>>().unwrap();
        assert_eq!(decoded, second);

        // Alone, the second block's leading XOR applies to the seed prediction
        // (0) instead of point 5's (6), and its delta code to an empty cache.
        let mut fresh = Decoder::new();
        fresh.set_block(&blocks[1]);
        assert_eq!(
            fresh.try_get_measurement(),
            Ok(Some(Sample::new(2, i64::MAX, 0, 0.0)))
        );
    }
}
