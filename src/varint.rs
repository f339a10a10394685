//! Variable-length integer encoding for values the fixed predictors miss.
//!
//! Each byte stores 7 bits of the value, lowest group first. The high bit of
//! each byte indicates whether more bytes follow. Payload bytes go straight to
//! the byte cursor, interleaved with the bit stream.

use crate::buffer::{BitReader, BitWriter};
use crate::error::Result;

/// Number of value bits per byte in varint encoding.
const VARINT_BITS: u32 = 7;

/// Mask for extracting varint value bits.
const VARINT_MASK: u64 = (1 << VARINT_BITS) - 1;

/// Writes a variable-length integer at the writer's byte cursor.
pub fn write_varint(writer: &mut BitWriter, mut value: u64) {
    loop {
        let byte_val = (value & VARINT_MASK) as u8;
        value >>= VARINT_BITS;

        if value == 0 {
            writer.write_byte(byte_val);
            break;
        }
        writer.write_byte(byte_val | 0x80);
    }
}

/// Writes a 32-bit value; never longer than five bytes.
#[inline]
pub fn write_varint_u32(writer: &mut BitWriter, value: u32) {
    write_varint(writer, u64::from(value));
}

/// Reads a variable-length integer from the reader's byte cursor.
///
/// Groups beyond the 64th bit are discarded rather than overflowing.
pub fn read_varint(reader: &mut BitReader) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = reader.read_byte()?;
        let byte_val = u64::from(byte & 0x7F);

        value |= byte_val.checked_shl(shift).unwrap_or(0);
        shift += VARINT_BITS;

        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok(value)
}

/// Reads a 32-bit value written by [`write_varint_u32`].
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn read_varint_u32(reader: &mut BitReader) -> Result<u32> {
    read_varint(reader).map(|value| value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TsscError;

    /// Longest encoding of a `u64`.
    const MAX_VARINT_LEN: usize = 10;

    fn encoded(value: u64) -> Vec<u8> {
        let mut writer = BitWriter::default();
        writer.bind(vec![0; MAX_VARINT_LEN], 0, MAX_VARINT_LEN);
        write_varint(&mut writer, value);
        let len = writer.position();
        let mut data = writer.take();
        data.truncate(len);
        data
    }

    #[test]
    fn test_varint_layout() {
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(127), vec![0x7F]);
        assert_eq!(encoded(128), vec![0x80, 0x01]);
        assert_eq!(encoded(300), vec![0xAC, 0x02]);
        assert_eq!(encoded(u64::from(u32::MAX)).len(), 5);
        assert_eq!(encoded(u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_varint_encoding() {
        let mut writer = BitWriter::default();
        writer.bind(vec![0; 32], 0, 32);

        write_varint(&mut writer, 127);
        write_varint(&mut writer, 16383);
        write_varint(&mut writer, u64::MAX);
        write_varint_u32(&mut writer, 0xDEAD_BEEF);
        let len = writer.position();

        let mut reader = BitReader::default();
        reader.bind(writer.take(), 0, len);

        assert_eq!(read_varint(&mut reader).unwrap(), 127);
        assert_eq!(read_varint(&mut reader).unwrap(), 16383);
        assert_eq!(read_varint(&mut reader).unwrap(), u64::MAX);
        assert_eq!(read_varint_u32(&mut reader).unwrap(), 0xDEAD_BEEF);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_truncated_varint() {
        let mut reader = BitReader::default();
        reader.bind(vec![0x80, 0x80], 0, 2);
        assert_eq!(read_varint(&mut reader), Err(TsscError::UnexpectedEndOfData));
    }
}
