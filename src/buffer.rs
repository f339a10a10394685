//! Bit-stream packing over a caller-supplied byte buffer.
//!
//! Codes are packed most-significant-bit first into bytes that are reserved in
//! the buffer at the moment their first bit is written. Raw payload bytes that
//! are written while a byte is only partially filled land after the reserved
//! byte, so a reader that pulls bits and bytes in the same order finds them in
//! the same places.

use crate::error::{Result, TsscError};

/// Writer side of the bit packer.
///
/// Owns the bound buffer but only ever writes inside
/// `data[offset..offset + length]`; the vector is never grown.
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    start: usize,
    position: usize,
    last_position: usize,
    cache: u32,
    count: u32,
    reserved: Option<usize>,
}

impl BitWriter {
    /// Binds a new buffer region and clears any pending bits.
    pub fn bind(&mut self, data: Vec<u8>, offset: usize, length: usize) {
        debug_assert!(offset + length <= data.len());
        self.last_position = (offset + length).min(data.len());
        self.position = offset.min(self.last_position);
        self.start = self.position;
        self.data = data;
        self.clear_bits();
    }

    /// Returns the current byte cursor.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of bytes used since the region was bound.
    #[inline]
    pub fn written(&self) -> usize {
        self.position - self.start
    }

    /// Discards everything written since the region was bound.
    pub fn rewind(&mut self) {
        self.position = self.start;
        self.clear_bits();
    }

    /// Returns the number of bytes left before the end of the bound region.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.last_position.saturating_sub(self.position)
    }

    /// Returns the number of bits written but not yet stored.
    #[inline]
    pub fn pending_bits(&self) -> u32 {
        self.count
    }

    /// Appends the low `len` bits of `value` (1..=8 bits).
    pub fn write_bits(&mut self, value: u32, len: u32) {
        debug_assert!((1..=8).contains(&len));

        if self.reserved.is_none() {
            self.reserved = Some(self.position);
            self.position += 1;
        }

        self.cache = (self.cache << len) | (value & ((1 << len) - 1));
        self.count += len;

        if self.count > 7 {
            self.store_full_bytes();
        }
    }

    /// Writes a raw byte at the cursor, bypassing the bit cache.
    #[inline]
    pub fn write_byte(&mut self, value: u8) {
        self.data[self.position] = value;
        self.position += 1;
    }

    /// Pads the partial byte with zero bits and stores it.
    pub fn flush(&mut self) {
        if self.count > 0 {
            if let Some(index) = self.reserved {
                self.data[index] = (self.cache << (8 - self.count)) as u8;
            }
        }
        self.clear_bits();
    }

    /// Drops any pending bits without storing them.
    pub fn clear_bits(&mut self) {
        self.cache = 0;
        self.count = 0;
        self.reserved = None;
    }

    /// Gives the bound buffer back to the caller.
    pub fn take(&mut self) -> Vec<u8> {
        self.clear_bits();
        self.start = 0;
        self.position = 0;
        self.last_position = 0;
        std::mem::take(&mut self.data)
    }

    /// Returns the bound buffer.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..]
    }

    fn store_full_bytes(&mut self) {
        while self.count > 7 {
            if let Some(index) = self.reserved {
                self.data[index] = (self.cache >> (self.count - 8)) as u8;
            }
            self.count -= 8;
            self.cache &= (1 << self.count) - 1;

            self.reserved = if self.count > 0 {
                let index = self.position;
                self.position += 1;
                Some(index)
            } else {
                None
            };
        }
    }
}

/// Reader side of the bit packer.
#[derive(Debug, Default)]
pub struct BitReader {
    data: Vec<u8>,
    position: usize,
    last_position: usize,
    cache: u32,
    count: u32,
}

impl BitReader {
    /// Binds a new buffer region and clears the bit cache.
    pub fn bind(&mut self, data: Vec<u8>, offset: usize, length: usize) {
        debug_assert!(offset + length <= data.len());
        self.last_position = (offset + length).min(data.len());
        self.position = offset.min(self.last_position);
        self.data = data;
        self.clear_bits();
    }

    /// Returns the current byte cursor.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// True when every byte has been consumed and no bits are cached.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.last_position && self.count == 0
    }

    /// Reads a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<u32> {
        if self.count == 0 {
            self.cache = u32::from(self.next_byte()?);
            self.count = 8;
        }
        self.count -= 1;
        Ok((self.cache >> self.count) & 1)
    }

    /// Reads a 4-bit field.
    #[inline]
    pub fn read_bits4(&mut self) -> Result<u32> {
        self.read_bits(4)
    }

    /// Reads a 5-bit field.
    #[inline]
    pub fn read_bits5(&mut self) -> Result<u32> {
        self.read_bits(5)
    }

    /// Reads a raw byte at the cursor, bypassing the bit cache.
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        self.next_byte()
    }

    /// Discards the remaining bits of the current byte.
    pub fn clear_bits(&mut self) {
        self.cache = 0;
        self.count = 0;
    }

    /// Gives the bound buffer back to the caller.
    pub fn take(&mut self) -> Vec<u8> {
        self.clear_bits();
        self.position = 0;
        self.last_position = 0;
        std::mem::take(&mut self.data)
    }

    fn read_bits(&mut self, len: u32) -> Result<u32> {
        let mut value = 0;
        for _ in 0..len {
            value = (value << 1) | self.read_bit()?;
        }
        Ok(value)
    }

    fn next_byte(&mut self) -> Result<u8> {
        if self.position >= self.last_position {
            return Err(TsscError::UnexpectedEndOfData);
        }
        let value = self.data[self.position];
        self.position += 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(capacity: usize) -> BitWriter {
        let mut w = BitWriter::default();
        w.bind(vec![0; capacity], 0, capacity);
        w
    }

    #[test]
    fn test_bits_are_msb_first() {
        let mut w = writer(4);
        w.write_bits(0b1, 1);
        w.write_bits(0b01, 2);
        w.write_bits(0b10110, 5);
        assert_eq!(w.position(), 1);
        assert_eq!(w.pending_bits(), 0);
        assert_eq!(w.as_slice()[0], 0b1011_0110);
    }

    #[test]
    fn test_flush_pads_low_bits() {
        let mut w = writer(4);
        w.write_bits(0b101, 3);
        w.flush();
        assert_eq!(w.position(), 1);
        assert_eq!(w.as_slice()[0], 0b1010_0000);
    }

    #[test]
    fn test_bytes_land_after_reserved_bit_byte() {
        let mut w = writer(8);
        w.write_bits(0b1111, 4);
        w.write_byte(0xAB);
        w.write_bits(0b0000, 4);
        w.write_bits(0b11, 2);
        w.flush();

        // byte 0 holds the first eight bits, byte 1 the payload, byte 2 the tail
        assert_eq!(&w.as_slice()[..3], &[0xF0, 0xAB, 0b1100_0000]);
        assert_eq!(w.position(), 3);
    }

    #[test]
    fn test_reader_mirrors_writer() {
        let mut w = writer(8);
        w.write_bits(0b1, 1);
        w.write_bits(0b10011, 5);
        w.write_byte(0x5A);
        w.write_bits(0b0110, 4);
        w.write_byte(0xC3);
        w.flush();
        let end = w.position();

        let mut r = BitReader::default();
        r.bind(w.take(), 0, end);
        assert_eq!(r.read_bit().unwrap(), 1);
        assert_eq!(r.read_bits5().unwrap(), 0b10011);
        assert_eq!(r.read_byte().unwrap(), 0x5A);
        assert_eq!(r.read_bits4().unwrap(), 0b0110);
        assert_eq!(r.read_byte().unwrap(), 0xC3);
        r.clear_bits();
        assert!(r.is_exhausted());
    }

    #[test]
    fn test_reader_underflow() {
        let mut r = BitReader::default();
        r.bind(vec![0xFF, 0x00], 1, 0);
        assert!(r.is_exhausted());
        assert_eq!(r.read_bit(), Err(TsscError::UnexpectedEndOfData));
        assert_eq!(r.read_byte(), Err(TsscError::UnexpectedEndOfData));
    }

    #[test]
    fn test_bind_respects_offset() {
        let mut w = BitWriter::default();
        w.bind(vec![0xEE; 6], 2, 3);
        assert_eq!(w.position(), 2);
        assert_eq!(w.remaining(), 3);
        w.write_byte(0x01);
        assert_eq!(w.as_slice(), &[0xEE, 0xEE, 0x01, 0xEE, 0xEE, 0xEE]);
    }

    #[test]
    fn test_rewind_returns_to_region_start() {
        let mut w = BitWriter::default();
        w.bind(vec![0; 8], 2, 6);
        w.write_bits(0b101, 3);
        w.write_byte(0x42);
        assert_eq!(w.position(), 4);

        w.rewind();
        assert_eq!(w.position(), 2);
        assert_eq!(w.pending_bits(), 0);
        assert_eq!(w.remaining(), 6);

        w.write_bits(1, 1);
        w.flush();
        assert_eq!(w.position(), 3);
        assert_eq!(w.as_slice()[2], 0b1000_0000);
    }
}
