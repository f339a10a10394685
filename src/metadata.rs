//! Per-point running state and the adaptive code table.
//!
//! A code table maps the code space onto bit patterns of 1 to 8 bits. It keeps
//! a histogram of the codes that passed through it and periodically picks the
//! mode that would have spent the fewest bits on that history. Encoder and
//! decoder see the same codes in the same order, so both arrive at the same
//! table without any side channel.

use log::{debug, trace};

use crate::buffer::{BitReader, BitWriter};
use crate::code::{CODE_SPACE, CodeWord};
use crate::error::Result;

/// Number of codes after which the table adapts, per startup phase.
const ADAPT_THRESHOLDS: [u32; 3] = [5, 20, 100];

/// How many codes receive an abbreviated escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingMode {
    /// Every code is a plain 5-bit field.
    Fixed5,
    /// One code costs 1 bit, the rest 6.
    OneEscape,
    /// Two codes cost 1 and 2 bits, the rest 7.
    TwoEscapes,
    /// Three codes cost 1, 2 and 3 bits, the rest 8.
    ThreeEscapes,
}

impl CodingMode {
    /// Mode number (1 to 4).
    #[inline]
    pub const fn number(self) -> u8 {
        match self {
            CodingMode::Fixed5 => 1,
            CodingMode::OneEscape => 2,
            CodingMode::TwoEscapes => 3,
            CodingMode::ThreeEscapes => 4,
        }
    }

    /// Number of escape codes in use.
    #[inline]
    pub const fn escape_count(self) -> usize {
        self.number() as usize - 1
    }
}

/// Adaptive mapping from codes to bit patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    histogram: [u8; CODE_SPACE],
    samples_since_adapt: u32,
    startup_phase: usize,
    mode: CodingMode,
    escapes: [u8; 3],
}

impl Default for CodeTable {
    fn default() -> Self {
        Self {
            histogram: [0; CODE_SPACE],
            samples_since_adapt: 0,
            startup_phase: 0,
            mode: CodingMode::ThreeEscapes,
            escapes: [
                CodeWord::Value1.code(),
                CodeWord::Value2.code(),
                CodeWord::Value3.code(),
            ],
        }
    }
}

impl CodeTable {
    /// Current coding mode.
    #[inline]
    pub fn mode(&self) -> CodingMode {
        self.mode
    }

    /// Escape codes in use, most frequent first.
    #[inline]
    pub fn escape_codes(&self) -> &[u8] {
        &self.escapes[..self.mode.escape_count()]
    }

    /// Codes seen since the last adaptation.
    #[inline]
    pub fn samples_since_adapt(&self) -> u32 {
        self.samples_since_adapt
    }

    /// Writes `code` with the current mode and records it.
    pub fn write_code(&mut self, code: CodeWord, writer: &mut BitWriter) {
        let code = code.code();
        let value = u32::from(code);

        match self.mode {
            CodingMode::Fixed5 => writer.write_bits(value, 5),
            CodingMode::OneEscape => {
                if code == self.escapes[0] {
                    writer.write_bits(1, 1);
                } else {
                    writer.write_bits(value, 6);
                }
            }
            CodingMode::TwoEscapes => {
                if code == self.escapes[0] {
                    writer.write_bits(1, 1);
                } else if code == self.escapes[1] {
                    writer.write_bits(1, 2);
                } else {
                    writer.write_bits(value, 7);
                }
            }
            CodingMode::ThreeEscapes => {
                if code == self.escapes[0] {
                    writer.write_bits(1, 1);
                } else if code == self.escapes[1] {
                    writer.write_bits(1, 2);
                } else if code == self.escapes[2] {
                    writer.write_bits(1, 3);
                } else {
                    writer.write_bits(value, 8);
                }
            }
        }

        trace!("wrote code {} in mode {}", code, self.mode.number());
        self.record(code);
    }

    /// Reads one code with the current mode and records it.
    ///
    /// The returned number is not validated against the code table.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_code(&mut self, reader: &mut BitReader) -> Result<u8> {
        let code = match self.mode {
            CodingMode::Fixed5 => reader.read_bits5()? as u8,
            CodingMode::OneEscape => {
                if reader.read_bit()? == 1 {
                    self.escapes[0]
                } else {
                    reader.read_bits5()? as u8
                }
            }
            CodingMode::TwoEscapes => {
                if reader.read_bit()? == 1 {
                    self.escapes[0]
                } else if reader.read_bit()? == 1 {
                    self.escapes[1]
                } else {
                    reader.read_bits5()? as u8
                }
            }
            CodingMode::ThreeEscapes => {
                if reader.read_bit()? == 1 {
                    self.escapes[0]
                } else if reader.read_bit()? == 1 {
                    self.escapes[1]
                } else if reader.read_bit()? == 1 {
                    self.escapes[2]
                } else {
                    reader.read_bits5()? as u8
                }
            }
        };

        trace!("read code {} in mode {}", code, self.mode.number());
        self.record(code);
        Ok(code)
    }

    fn record(&mut self, code: u8) {
        self.samples_since_adapt += 1;
        let slot = &mut self.histogram[usize::from(code) % CODE_SPACE];
        *slot = slot.saturating_add(1);

        if self.samples_since_adapt > ADAPT_THRESHOLDS[self.startup_phase] {
            if self.startup_phase < ADAPT_THRESHOLDS.len() - 1 {
                self.startup_phase += 1;
            }
            self.adapt();
        }
    }

    /// Picks the cheapest mode for the codes seen since the last adaptation,
    /// then clears the histogram.
    #[allow(clippy::cast_possible_truncation)]
    fn adapt(&mut self) {
        let mut top = [(0u8, 0u32), (1, 0), (2, 0)];
        let mut total = 0u32;

        for (code, slot) in self.histogram.iter_mut().enumerate() {
            let count = u32::from(*slot);
            *slot = 0;
            total += count;

            if count > top[2].1 {
                let entry = (code as u8, count);
                if count > top[0].1 {
                    top[2] = top[1];
                    top[1] = top[0];
                    top[0] = entry;
                } else if count > top[1].1 {
                    top[2] = top[1];
                    top[1] = entry;
                } else {
                    top[2] = entry;
                }
            }
        }

        let [(code1, count1), (code2, count2), (code3, count3)] = top;

        let mode1_size = total * 5;
        let mode2_size = count1 + (total - count1) * 6;
        let mode3_size = count1 + count2 * 2 + (total - count1 - count2) * 7;
        let mode4_size =
            count1 + count2 * 2 + count3 * 3 + (total - count1 - count2 - count3) * 8;

        let min_size = mode1_size.min(mode2_size).min(mode3_size).min(mode4_size);

        if min_size == mode1_size {
            self.mode = CodingMode::Fixed5;
        } else if min_size == mode2_size {
            self.mode = CodingMode::OneEscape;
            self.escapes[0] = code1;
        } else if min_size == mode3_size {
            self.mode = CodingMode::TwoEscapes;
            self.escapes[0] = code1;
            self.escapes[1] = code2;
        } else {
            self.mode = CodingMode::ThreeEscapes;
            self.escapes = [code1, code2, code3];
        }

        debug!(
            "code table adapted after {} codes: mode {}, escapes {:?}, estimated {} bits",
            total,
            self.mode.number(),
            self.escape_codes(),
            min_size
        );

        self.samples_since_adapt = 0;
    }
}

/// Running state for one point ID.
#[derive(Debug, Clone, Default)]
pub(crate) struct PointMetadata {
    pub(crate) predicted_next_id: u16,
    pub(crate) prev_quality1: u32,
    pub(crate) prev_quality2: u32,
    pub(crate) prev_value1: u32,
    pub(crate) prev_value2: u32,
    pub(crate) prev_value3: u32,
    pub(crate) table: CodeTable,
}

impl PointMetadata {
    /// Creates metadata that predicts `predicted_next_id` as its successor.
    pub(crate) fn new(predicted_next_id: u16) -> Self {
        Self {
            predicted_next_id,
            ..Self::default()
        }
    }

    /// The code table owned by this point.
    #[inline]
    pub(crate) fn code_table(&self) -> &CodeTable {
        &self.table
    }

    pub(crate) fn push_quality(&mut self, quality: u32) {
        self.prev_quality2 = self.prev_quality1;
        self.prev_quality1 = quality;
    }

    /// Swaps the first two value slots (cache hit on slot 2).
    pub(crate) fn promote_value2(&mut self) -> u32 {
        let value = self.prev_value2;
        self.prev_value2 = self.prev_value1;
        self.prev_value1 = value;
        value
    }

    /// Moves slot 3 to the front (cache hit on slot 3).
    pub(crate) fn promote_value3(&mut self) -> u32 {
        let value = self.prev_value3;
        self.prev_value3 = self.prev_value2;
        self.prev_value2 = self.prev_value1;
        self.prev_value1 = value;
        value
    }

    /// Pushes a new value in front, dropping slot 3.
    pub(crate) fn push_value(&mut self, value: u32) {
        self.prev_value3 = self.prev_value2;
        self.prev_value2 = self.prev_value1;
        self.prev_value1 = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> BitWriter {
        let mut w = BitWriter::default();
        w.bind(vec![0; 256], 0, 256);
        w
    }

    /// Bits `code` costs under the table's current mode.
    fn code_len(table: &CodeTable, code: CodeWord) -> u32 {
        let mut w = writer();
        table.clone().write_code(code, &mut w);
        match w.pending_bits() {
            0 => 8,
            bits => bits,
        }
    }

    #[test]
    fn test_initial_table() {
        let table = CodeTable::default();
        assert_eq!(table.mode(), CodingMode::ThreeEscapes);
        assert_eq!(table.escape_codes(), &[17, 18, 19]);
        assert_eq!(code_len(&table, CodeWord::Value1), 1);
        assert_eq!(code_len(&table, CodeWord::Value3), 3);
        assert_eq!(code_len(&table, CodeWord::TimeXor7Bit), 8);
    }

    #[test]
    fn test_first_adaptation_on_sixth_code() {
        let mut table = CodeTable::default();
        let mut w = writer();

        for _ in 0..5 {
            table.write_code(CodeWord::ValueXor8, &mut w);
        }
        assert_eq!(table.mode(), CodingMode::ThreeEscapes);
        assert_eq!(table.samples_since_adapt(), 5);

        table.write_code(CodeWord::ValueXor8, &mut w);
        assert_eq!(table.mode(), CodingMode::OneEscape);
        assert_eq!(table.escape_codes(), &[CodeWord::ValueXor8.code()]);
        assert_eq!(table.samples_since_adapt(), 0);
    }

    #[test]
    fn test_ties_favour_lower_mode() {
        let mut table = CodeTable::default();
        let mut w = writer();

        // six distinct codes: mode 1 and mode 4 both cost 30 bits
        for code in [1u8, 2, 3, 4, 5, 6] {
            table.write_code(CodeWord::try_from(code).unwrap(), &mut w);
        }
        assert_eq!(table.mode(), CodingMode::Fixed5);
        assert!(table.escape_codes().is_empty());
    }

    #[test]
    fn test_startup_schedule() {
        let mut table = CodeTable::default();
        let mut w = writer();

        for _ in 0..6 {
            table.write_code(CodeWord::Value1, &mut w);
        }
        assert_eq!(table.samples_since_adapt(), 0);

        for _ in 0..21 {
            table.write_code(CodeWord::Value1, &mut w);
        }
        assert_eq!(table.samples_since_adapt(), 0);

        for _ in 0..100 {
            table.write_code(CodeWord::Value1, &mut w);
        }
        assert_eq!(table.samples_since_adapt(), 100);
        table.write_code(CodeWord::Value1, &mut w);
        assert_eq!(table.samples_since_adapt(), 0);

        for _ in 0..101 {
            table.write_code(CodeWord::Value1, &mut w);
        }
        assert_eq!(table.samples_since_adapt(), 0);
    }

    #[test]
    fn test_three_escapes_chosen_for_three_hot_codes() {
        let mut table = CodeTable::default();
        let mut w = writer();

        // burn through startup with a skewed mix so the history is long enough
        let pattern = [
            CodeWord::ValueXor16,
            CodeWord::ValueXor16,
            CodeWord::ValueXor16,
            CodeWord::Quality2,
            CodeWord::Quality2,
            CodeWord::TimeDelta1Forward,
            CodeWord::ValueXor32,
        ];
        for code in pattern.iter().cycle().take(6 + 21) {
            table.write_code(*code, &mut w);
        }

        assert_eq!(table.mode(), CodingMode::ThreeEscapes);
        assert_eq!(table.escape_codes()[0], CodeWord::ValueXor16.code());
        assert_eq!(table.escape_codes()[1], CodeWord::Quality2.code());
    }

    #[test]
    fn test_read_tracks_write() {
        let codes: Vec<CodeWord> = (0..400u32)
            .map(|i| match i % 11 {
                0..=5 => CodeWord::Value1,
                6 | 7 => CodeWord::ValueXor12,
                8 => CodeWord::TimeDelta1Forward,
                9 => CodeWord::PointIdXor4,
                _ => CodeWord::EndOfStream,
            })
            .collect();

        let mut encoder_table = CodeTable::default();
        let mut w = BitWriter::default();
        w.bind(vec![0; 1024], 0, 1024);
        for code in &codes {
            encoder_table.write_code(*code, &mut w);
        }
        w.flush();
        let end = w.position();

        let mut decoder_table = CodeTable::default();
        let mut r = BitReader::default();
        r.bind(w.take(), 0, end);
        for code in &codes {
            assert_eq!(decoder_table.read_code(&mut r).unwrap(), code.code());
        }
        assert_eq!(decoder_table.mode(), encoder_table.mode());
        assert_eq!(decoder_table.escape_codes(), encoder_table.escape_codes());
    }

    #[test]
    fn test_value_cache_rotation() {
        let mut point = PointMetadata::new(8);
        point.push_value(1);
        point.push_value(2);
        point.push_value(3);
        assert_eq!(
            (point.prev_value1, point.prev_value2, point.prev_value3),
            (3, 2, 1)
        );

        assert_eq!(point.promote_value2(), 2);
        assert_eq!(
            (point.prev_value1, point.prev_value2, point.prev_value3),
            (2, 3, 1)
        );

        assert_eq!(point.promote_value3(), 1);
        assert_eq!(
            (point.prev_value1, point.prev_value2, point.prev_value3),
            (1, 2, 3)
        );
    }
}
