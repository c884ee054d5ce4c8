//! Reader side of the codec.

use crate::error::DecodeError;

/// A cursor over an encoded byte buffer.
///
/// All reads advance the cursor; a failed read leaves the cursor wherever the
/// failure was detected, which greedy decoding relies on to discard the
/// half-parsed tail record.
pub struct Input<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    /// Wraps a buffer for reading.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// True once every byte has been consumed.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.buf.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    /// Reads a base-128 varint, keeping the low 32 bits.
    ///
    /// A negative `i32` written sign-extended occupies ten bytes; the upper
    /// continuation bytes are consumed and discarded. More than ten
    /// continuation bytes is malformed.
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_varint32(&mut self) -> Result<i32, DecodeError> {
        let mut result: u32 = 0;
        for shift in [0u32, 7, 14, 21, 28] {
            let b = self.read_byte()?;
            // the final group overflows into the discarded upper half
            result |= u32::from(b & 0x7f).wrapping_shl(shift);
            if b & 0x80 == 0 {
                return Ok(result as i32);
            }
        }
        // discard upper 32 bits of a sign-extended 64-bit varint
        for _ in 0..5 {
            if self.read_byte()? & 0x80 == 0 {
                return Ok(result as i32);
            }
        }
        Err(DecodeError::VarintOverflow)
    }

    /// Reads a base-128 varint as a 64-bit value.
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_varint64(&mut self) -> Result<i64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        while shift < 64 {
            let b = self.read_byte()?;
            result |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(result as i64);
            }
            shift += 7;
        }
        Err(DecodeError::VarintOverflow)
    }

    /// Reads a bool (any non-zero varint is true).
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_varint32()? != 0)
    }

    /// Reads an `i32`.
    pub fn read_int32(&mut self) -> Result<i32, DecodeError> {
        self.read_varint32()
    }

    /// Reads a `u32`.
    #[allow(clippy::cast_sign_loss)]
    pub fn read_uint32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_varint32()? as u32)
    }

    /// Reads an `i64`.
    pub fn read_int64(&mut self) -> Result<i64, DecodeError> {
        self.read_varint64()
    }

    /// Reads a `u64`.
    #[allow(clippy::cast_sign_loss)]
    pub fn read_uint64(&mut self) -> Result<u64, DecodeError> {
        Ok(self.read_varint64()? as u64)
    }

    /// Reads a little-endian fixed 32-bit word.
    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let end = self.pos.checked_add(4).ok_or(DecodeError::Truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Reads a little-endian fixed 64-bit word.
    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let end = self.pos.checked_add(8).ok_or(DecodeError::Truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    /// Reads an `f32` (IEEE-754 bits in a fixed32).
    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    /// Reads an `f64` (IEEE-754 bits in a fixed64).
    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Reads a length-delimited byte slice without copying.
    pub fn read_bytes_ref(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint32()?;
        if len < 0 {
            return Err(DecodeError::NegativeLength);
        }
        #[allow(clippy::cast_sign_loss)]
        let len = len as usize;
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Reads a length-delimited byte string.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        Ok(self.read_bytes_ref()?.to_vec())
    }

    /// Reads a length-delimited string. Invalid UTF-8 is replaced rather than
    /// rejected; stored keys and strings are written as UTF-8.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.read_bytes_ref()?).into_owned())
    }
}
