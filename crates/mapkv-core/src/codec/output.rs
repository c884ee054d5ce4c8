//! Writer side of the codec.

use tracing::error;

/// A cursor writing encoded fields into a caller-provided buffer.
///
/// Buffers are sized exactly via the size helpers, so running out of space is
/// a logic error; it is reported and the excess bytes are dropped rather than
/// panicking, since the buffer may be a live file mapping.
pub struct Output<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Output<'a> {
    /// Wraps a buffer for writing.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes still writable.
    #[must_use]
    pub fn space_left(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn write_byte(&mut self, value: u8) {
        debug_assert!(self.pos < self.buf.len(), "codec buffer overrun");
        if self.pos == self.buf.len() {
            error!("out of space writing byte at position {}", self.pos);
            return;
        }
        self.buf[self.pos] = value;
        self.pos += 1;
    }

    /// Writes a base-128 varint from a 32-bit value.
    ///
    /// Negative values are sign-extended to 64 bits first, matching
    /// [`varint32_size`](super::varint32_size).
    pub fn write_varint32(&mut self, value: i32) {
        // sign-extension gives negatives the ten-byte form readers expect
        self.write_varint64(i64::from(value));
    }

    /// Writes a base-128 varint from a 64-bit value.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn write_varint64(&mut self, value: i64) {
        let mut v = value as u64;
        loop {
            if v & !0x7f == 0 {
                self.write_byte(v as u8);
                return;
            }
            self.write_byte(((v & 0x7f) | 0x80) as u8);
            v >>= 7;
        }
    }

    /// Writes a bool as a single byte.
    pub fn write_bool(&mut self, value: bool) {
        self.write_byte(u8::from(value));
    }

    /// Writes an `i32`.
    pub fn write_int32(&mut self, value: i32) {
        self.write_varint32(value);
    }

    /// Writes a `u32`.
    pub fn write_uint32(&mut self, value: u32) {
        self.write_varint64(i64::from(value));
    }

    /// Writes an `i64`.
    pub fn write_int64(&mut self, value: i64) {
        self.write_varint64(value);
    }

    /// Writes a `u64`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn write_uint64(&mut self, value: u64) {
        self.write_varint64(value as i64);
    }

    /// Writes a little-endian fixed 32-bit word.
    pub fn write_fixed32(&mut self, value: u32) {
        self.write_raw(&value.to_le_bytes());
    }

    /// Writes a little-endian fixed 64-bit word.
    pub fn write_fixed64(&mut self, value: u64) {
        self.write_raw(&value.to_le_bytes());
    }

    /// Writes an `f32` as its IEEE-754 bits.
    pub fn write_float(&mut self, value: f32) {
        self.write_fixed32(value.to_bits());
    }

    /// Writes an `f64` as its IEEE-754 bits.
    pub fn write_double(&mut self, value: f64) {
        self.write_fixed64(value.to_bits());
    }

    /// Writes a length-delimited byte string.
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.write_varint32(value.len() as i32);
        self.write_raw(value);
    }

    /// Writes a length-delimited string.
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Writes bytes with no length prefix.
    pub fn write_raw(&mut self, data: &[u8]) {
        debug_assert!(
            self.pos + data.len() <= self.buf.len(),
            "codec buffer overrun"
        );
        let Some(dst) = self.buf.get_mut(self.pos..self.pos + data.len()) else {
            error!(
                "out of space writing {} bytes at position {}",
                data.len(),
                self.pos
            );
            return;
        };
        dst.copy_from_slice(data);
        self.pos += data.len();
    }
}
