//! The TSSC code space.
//!
//! Every field of a sample is described by one code naming the predictor that
//! was used. Codes are grouped in ascending ranges (point ID, timestamp,
//! quality, value) so that a single code can also mean "the earlier groups are
//! unchanged". The numbering is part of the wire format.

use crate::error::TsscError;

/// Number of slots in a code table histogram; codes are 5-bit fields.
pub const CODE_SPACE: usize = 32;

/// Operation codes, numbered as on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeWord {
    /// End of the block; no sample follows.
    EndOfStream = 0,
    /// Point ID differs from the prediction in the low 4 bits.
    PointIdXor4 = 1,
    /// Point ID differs in the low byte.
    PointIdXor8 = 2,
    /// Point ID differs in the low 12 bits.
    PointIdXor12 = 3,
    /// Point ID differs anywhere.
    PointIdXor16 = 4,
    /// Timestamp is previous + smallest cached delta.
    TimeDelta1Forward = 5,
    /// Timestamp is previous + second cached delta.
    TimeDelta2Forward = 6,
    /// Timestamp is previous + third cached delta.
    TimeDelta3Forward = 7,
    /// Timestamp is previous + fourth cached delta.
    TimeDelta4Forward = 8,
    /// Timestamp is previous - smallest cached delta.
    TimeDelta1Reverse = 9,
    /// Timestamp is previous - second cached delta.
    TimeDelta2Reverse = 10,
    /// Timestamp is previous - third cached delta.
    TimeDelta3Reverse = 11,
    /// Timestamp is previous - fourth cached delta.
    TimeDelta4Reverse = 12,
    /// Timestamp equals the one before the previous.
    Timestamp2 = 13,
    /// Timestamp XOR previous, as a 7-bit varint.
    TimeXor7Bit = 14,
    /// Quality equals the point's second cached quality.
    Quality2 = 15,
    /// Quality as a 7-bit varint.
    Quality7Bit32 = 16,
    /// Value equals the point's first cached value.
    Value1 = 17,
    /// Value equals the point's second cached value.
    Value2 = 18,
    /// Value equals the point's third cached value.
    Value3 = 19,
    /// Value bits are all zero.
    ValueZero = 20,
    /// Value differs from the first cached value in the low 4 bits.
    ValueXor4 = 21,
    /// Value differs in the low 8 bits.
    ValueXor8 = 22,
    /// Value differs in the low 12 bits.
    ValueXor12 = 23,
    /// Value differs in the low 16 bits.
    ValueXor16 = 24,
    /// Value differs in the low 20 bits.
    ValueXor20 = 25,
    /// Value differs in the low 24 bits.
    ValueXor24 = 26,
    /// Value differs in the low 28 bits.
    ValueXor28 = 27,
    /// Value differs anywhere.
    ValueXor32 = 28,
}

/// First code of the point ID group.
pub const FIRST_POINT_ID_CODE: u8 = CodeWord::PointIdXor4 as u8;
/// Last code of the point ID group.
pub const LAST_POINT_ID_CODE: u8 = CodeWord::PointIdXor16 as u8;
/// First code of the timestamp group.
pub const FIRST_TIMESTAMP_CODE: u8 = CodeWord::TimeDelta1Forward as u8;
/// Last code of the timestamp group.
pub const LAST_TIMESTAMP_CODE: u8 = CodeWord::TimeXor7Bit as u8;
/// First code of the quality group.
pub const FIRST_QUALITY_CODE: u8 = CodeWord::Quality2 as u8;
/// Last code of the quality group.
pub const LAST_QUALITY_CODE: u8 = CodeWord::Quality7Bit32 as u8;
/// First code of the value group.
pub const FIRST_VALUE_CODE: u8 = CodeWord::Value1 as u8;
/// Last code of the value group.
pub const LAST_VALUE_CODE: u8 = CodeWord::ValueXor32 as u8;

const FIRST_VALUE_XOR_CODE: u8 = CodeWord::ValueXor4 as u8;

/// Forward delta codes indexed by cache slot.
pub const TIME_DELTA_FORWARD: [CodeWord; 4] = [
    CodeWord::TimeDelta1Forward,
    CodeWord::TimeDelta2Forward,
    CodeWord::TimeDelta3Forward,
    CodeWord::TimeDelta4Forward,
];

/// Reverse delta codes indexed by cache slot.
pub const TIME_DELTA_REVERSE: [CodeWord; 4] = [
    CodeWord::TimeDelta1Reverse,
    CodeWord::TimeDelta2Reverse,
    CodeWord::TimeDelta3Reverse,
    CodeWord::TimeDelta4Reverse,
];

/// Point ID XOR codes indexed by payload width in nibbles, minus one.
pub const POINT_ID_XOR: [CodeWord; 4] = [
    CodeWord::PointIdXor4,
    CodeWord::PointIdXor8,
    CodeWord::PointIdXor12,
    CodeWord::PointIdXor16,
];

/// Value XOR codes indexed by payload width in nibbles, minus one.
pub const VALUE_XOR: [CodeWord; 8] = [
    CodeWord::ValueXor4,
    CodeWord::ValueXor8,
    CodeWord::ValueXor12,
    CodeWord::ValueXor16,
    CodeWord::ValueXor20,
    CodeWord::ValueXor24,
    CodeWord::ValueXor28,
    CodeWord::ValueXor32,
];

/// Payload width in bits of an XOR code, or `None` for any other code.
pub fn xor_width(code: u8) -> Option<u32> {
    match code {
        FIRST_POINT_ID_CODE..=LAST_POINT_ID_CODE => Some(u32::from(code) * 4),
        FIRST_VALUE_XOR_CODE..=LAST_VALUE_CODE => {
            Some(u32::from(code - FIRST_VALUE_XOR_CODE + 1) * 4)
        }
        _ => None,
    }
}

const ALL_CODES: [CodeWord; 29] = [
    CodeWord::EndOfStream,
    CodeWord::PointIdXor4,
    CodeWord::PointIdXor8,
    CodeWord::PointIdXor12,
    CodeWord::PointIdXor16,
    CodeWord::TimeDelta1Forward,
    CodeWord::TimeDelta2Forward,
    CodeWord::TimeDelta3Forward,
    CodeWord::TimeDelta4Forward,
    CodeWord::TimeDelta1Reverse,
    CodeWord::TimeDelta2Reverse,
    CodeWord::TimeDelta3Reverse,
    CodeWord::TimeDelta4Reverse,
    CodeWord::Timestamp2,
    CodeWord::TimeXor7Bit,
    CodeWord::Quality2,
    CodeWord::Quality7Bit32,
    CodeWord::Value1,
    CodeWord::Value2,
    CodeWord::Value3,
    CodeWord::ValueZero,
    CodeWord::ValueXor4,
    CodeWord::ValueXor8,
    CodeWord::ValueXor12,
    CodeWord::ValueXor16,
    CodeWord::ValueXor20,
    CodeWord::ValueXor24,
    CodeWord::ValueXor28,
    CodeWord::ValueXor32,
];

impl CodeWord {
    /// Returns the wire number of this code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Looks a wire number up in the table.
    #[inline]
    pub fn from_code(code: u8) -> Option<Self> {
        ALL_CODES.get(usize::from(code)).copied()
    }
}

impl TryFrom<u8> for CodeWord {
    type Error = TsscError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        CodeWord::from_code(code).ok_or(TsscError::InvalidCode(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_discriminants() {
        for (index, code) in ALL_CODES.iter().enumerate() {
            assert_eq!(usize::from(code.code()), index);
        }
    }

    #[test]
    fn test_ranges_are_contiguous() {
        assert_eq!(FIRST_POINT_ID_CODE, 1);
        assert_eq!(FIRST_TIMESTAMP_CODE, LAST_POINT_ID_CODE + 1);
        assert_eq!(FIRST_QUALITY_CODE, LAST_TIMESTAMP_CODE + 1);
        assert_eq!(FIRST_VALUE_CODE, LAST_QUALITY_CODE + 1);
        assert_eq!(LAST_VALUE_CODE, 28);
        assert!(usize::from(LAST_VALUE_CODE) < CODE_SPACE);
    }

    #[test]
    fn test_unknown_codes_rejected() {
        assert_eq!(CodeWord::try_from(20), Ok(CodeWord::ValueZero));
        assert_eq!(CodeWord::try_from(29), Err(TsscError::InvalidCode(29)));
        assert_eq!(CodeWord::from_code(31), None);
    }

    #[test]
    fn test_xor_widths() {
        for (index, code) in POINT_ID_XOR.iter().enumerate() {
            assert_eq!(xor_width(code.code()), Some(4 * (index as u32 + 1)));
        }
        for (index, code) in VALUE_XOR.iter().enumerate() {
            assert_eq!(xor_width(code.code()), Some(4 * (index as u32 + 1)));
        }
        assert_eq!(xor_width(CodeWord::ValueZero.code()), None);
        assert_eq!(xor_width(CodeWord::TimeXor7Bit.code()), None);
    }
}
