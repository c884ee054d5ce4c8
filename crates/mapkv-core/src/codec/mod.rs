//! Varint/fixed-width framing for keys and values.
//!
//! A protobuf-like wire form: base-128 little-endian varints, little-endian
//! fixed 32/64-bit words, and length-delimited byte strings. [`Input`] reads
//! from a borrowed buffer, [`Output`] writes into a caller-sized buffer, and
//! the size helpers compute exact encoded lengths so buffers never need to
//! grow mid-write.

mod coder;
mod input;
mod output;
mod sizes;

pub use coder::{decode_map, decode_string_list, encode_map, encode_string_list, DecodeMode};
pub use input::Input;
pub use output::Output;
pub use sizes::{
    bool_size, bytes_size, fixed32_size, fixed64_size, int32_size, int64_size, string_size,
    uint32_size, uint64_size, varint32_size, varint64_size,
};
