use bitvec::prelude::*;
use thiserror::Error;

use crate::error::DecodeError;

/// Reads integers of arbitrary bit width from a byte buffer.
///
/// The cursor is never reset between reads. Consecutive channels of the same
/// track continue consuming bits from wherever the previous read ended,
/// including mid byte.
pub struct BitReader {
    bits: BitVec<u8, Lsb0>,
    index: usize,
}

#[derive(Debug, Error)]
pub enum BitReadError {
    #[error("failed to read enough bits from reader")]
    NotEnoughBits,

    #[error("bit reads are limited to 32 bits, requested {0}")]
    TooManyBits(usize),
}

impl From<BitReadError> for DecodeError {
    fn from(error: BitReadError) -> Self {
        match error {
            BitReadError::NotEnoughBits => DecodeError::NotEnoughBits,
            BitReadError::TooManyBits(count) => DecodeError::TooManyBits(count),
        }
    }
}

impl BitReader {
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bits: BitVec::from_slice(bytes),
            index: 0,
        }
    }

    /// Reads `bit_count` bits, least significant first.
    /// A width of zero is a valid no-op that consumes nothing,
    /// used by constant channels.
    pub fn read_u32(&mut self, bit_count: usize) -> Result<u32, BitReadError> {
        if bit_count == 0 {
            return Ok(0);
        }
        if bit_count > 32 {
            return Err(BitReadError::TooManyBits(bit_count));
        }

        let value: u32 = self
            .bits
            .as_bitslice()
            .get(self.index..self.index + bit_count)
            .ok_or(BitReadError::NotEnoughBits)?
            .load_le();
        self.index += bit_count;

        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool, BitReadError> {
        let value = self
            .bits
            .get(self.index)
            .as_deref()
            .copied()
            .ok_or(BitReadError::NotEnoughBits)?;

        self.index += 1;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_bits() {
        let mut reader = BitReader::from_slice(&[0b1011]);
        assert_eq!(true, reader.read_bit().unwrap());
        assert_eq!(true, reader.read_bit().unwrap());
        assert_eq!(false, reader.read_bit().unwrap());
        assert_eq!(true, reader.read_bit().unwrap());
    }

    #[test]
    fn read_u32() {
        let mut reader = BitReader::from_slice(&[3u8, 0u8]);
        assert_eq!(3, reader.read_u32(16).unwrap());
    }

    #[test]
    fn zero_width_reads_consume_nothing() {
        let mut reader = BitReader::from_slice(&[0xffu8]);
        assert_eq!(0, reader.read_u32(0).unwrap());
        assert_eq!(0, reader.read_u32(0).unwrap());
        // The cursor has not advanced.
        assert_eq!(0xff, reader.read_u32(8).unwrap());
    }

    #[test]
    fn split_reads_reconstruct_the_original_pattern() {
        // Reading n and then 32 - n bits reassembles the source u32
        // even when the split lands mid byte.
        let pattern = 0xdeadbeefu32;
        for n in 1..32 {
            let mut reader = BitReader::from_slice(&pattern.to_le_bytes());
            let low = reader.read_u32(n).unwrap();
            let high = reader.read_u32(32 - n).unwrap();
            assert_eq!(pattern, low | (high << n), "split at {n}");
        }
    }

    #[test]
    fn read_bit_past_end() {
        let mut reader = BitReader::from_slice(&[0u8]);
        reader.read_u32(8).unwrap();
        assert!(matches!(
            reader.read_bit(),
            Err(BitReadError::NotEnoughBits)
        ));
    }

    #[test]
    fn read_u32_past_end() {
        let mut reader = BitReader::from_slice(&[0u8]);
        reader.read_bit().unwrap();
        assert!(matches!(
            reader.read_u32(8),
            Err(BitReadError::NotEnoughBits)
        ));
    }

    #[test]
    fn read_u32_too_wide() {
        let mut reader = BitReader::from_slice(&[0u8; 8]);
        assert!(matches!(
            reader.read_u32(33),
            Err(BitReadError::TooManyBits(33))
        ));
    }
}
