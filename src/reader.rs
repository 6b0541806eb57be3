//! Sequential reads for the offset-relative container layout.
//!
//! Every stored offset is a 32 bit delta added to the stream position
//! recorded *before* the delta itself is read. Most offset fields are
//! followed by a 4 byte alignment word that callers skip separately.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::DecodeError;
use crate::half::Half;

pub(crate) trait ReadContainerExt: Read + Seek {
    /// Reads a 4 byte delta and resolves it against the stream position
    /// recorded before the read. The cursor ends just past the delta field.
    fn read_relative_offset(&mut self) -> Result<u64, DecodeError> {
        let base = self.stream_position()?;
        let delta = self.read_u32::<LittleEndian>()?;
        Ok(base + u64::from(delta))
    }

    fn skip(&mut self, count: i64) -> Result<(), DecodeError> {
        self.seek(SeekFrom::Current(count))?;
        Ok(())
    }

    fn seek_to(&mut self, offset: u64) -> Result<(), DecodeError> {
        self.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Reads one byte at a time until a terminator is seen, excluding the
    /// terminator from the result. A backslash also terminates, an artifact
    /// of one observed decoding path for these containers.
    fn read_cstring(&mut self) -> Result<String, DecodeError> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_u8()?;
            if byte == 0 || byte == b'\\' {
                break;
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_half(&mut self) -> Result<f32, DecodeError> {
        Ok(Half(self.read_u16::<LittleEndian>()?).to_f32())
    }

    /// Checks the 4 byte format tag, the only top level validation.
    fn check_magic(&mut self, expected: [u8; 4]) -> Result<(), DecodeError> {
        let mut found = [0u8; 4];
        self.read_exact(&mut found)?;
        if found != expected {
            return Err(DecodeError::MalformedContainer { expected, found });
        }
        Ok(())
    }
}

impl<R: Read + Seek> ReadContainerExt for R {}
