//! Exact encoded-length helpers.
//!
//! Used to preallocate value buffers and rewrite images; every writer relies
//! on these being exact, not estimates.

/// Encoded length of a 32-bit varint.
///
/// Negative values are written as sign-extended 64-bit varints and always
/// occupy ten bytes.
#[must_use]
pub fn varint32_size(value: i32) -> usize {
    if value < 0 {
        return 10;
    }
    varint64_size(value as u64)
}

/// Encoded length of a 64-bit varint.
#[must_use]
pub fn varint64_size(value: u64) -> usize {
    match value {
        v if v & !0x7f == 0 => 1,
        v if v & !0x3fff == 0 => 2,
        v if v & !0x001f_ffff == 0 => 3,
        v if v & !0x0fff_ffff == 0 => 4,
        v if v & !0x0007_ffff_ffff == 0 => 5,
        v if v & !0x03ff_ffff_ffff == 0 => 6,
        v if v & !0x0001_ffff_ffff_ffff == 0 => 7,
        v if v & !0x00ff_ffff_ffff_ffff == 0 => 8,
        v if v & !0x7fff_ffff_ffff_ffff == 0 => 9,
        _ => 10,
    }
}

/// Encoded length of an `i32` value.
#[must_use]
pub fn int32_size(value: i32) -> usize {
    varint32_size(value)
}

/// Encoded length of a `u32` value.
#[must_use]
pub fn uint32_size(value: u32) -> usize {
    varint64_size(u64::from(value))
}

/// Encoded length of an `i64` value.
#[must_use]
pub fn int64_size(value: i64) -> usize {
    varint64_size(value as u64)
}

/// Encoded length of a `u64` value.
#[must_use]
pub fn uint64_size(value: u64) -> usize {
    varint64_size(value)
}

/// Encoded length of a bool value.
#[must_use]
pub fn bool_size() -> usize {
    1
}

/// Encoded length of a fixed 32-bit word (`f32`, fixed32).
#[must_use]
pub fn fixed32_size() -> usize {
    4
}

/// Encoded length of a fixed 64-bit word (`f64`, fixed64).
#[must_use]
pub fn fixed64_size() -> usize {
    8
}

/// Encoded length of a length-delimited byte string.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
#[must_use]
pub fn bytes_size(len: usize) -> usize {
    varint32_size(len as i32) + len
}

/// Encoded length of a length-delimited string.
#[must_use]
pub fn string_size(s: &str) -> usize {
    bytes_size(s.len())
}
