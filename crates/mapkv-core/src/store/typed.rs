//! Typed accessors over the raw `set_data`/`get_data` surface.
//!
//! Each setter sizes its buffer exactly with the codec size helpers, so
//! encoding can never run out of space; each getter decodes the stored bytes
//! and falls back to the caller's default (or `None`) when the key is absent
//! or the bytes do not parse. Decode failures never propagate.

use crate::codec::{
    self, bool_size, bytes_size, fixed32_size, fixed64_size, int32_size, int64_size, string_size,
    uint32_size, uint64_size, Input, Output,
};

use super::Store;

impl Store {
    /// Stores a bool.
    pub fn set_bool(&self, key: &str, value: bool) -> bool {
        let mut buf = vec![0u8; bool_size()];
        Output::new(&mut buf).write_bool(value);
        self.set_data(key, buf)
    }

    /// Reads a bool, or `default` when absent or undecodable.
    #[must_use]
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.with_data(key, |data| Input::new(data).read_bool().ok())
            .flatten()
            .unwrap_or(default)
    }

    /// Stores an `i32`.
    pub fn set_i32(&self, key: &str, value: i32) -> bool {
        let mut buf = vec![0u8; int32_size(value)];
        Output::new(&mut buf).write_int32(value);
        self.set_data(key, buf)
    }

    /// Reads an `i32`, or `default` when absent or undecodable.
    #[must_use]
    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.with_data(key, |data| Input::new(data).read_int32().ok())
            .flatten()
            .unwrap_or(default)
    }

    /// Stores a `u32`.
    pub fn set_u32(&self, key: &str, value: u32) -> bool {
        let mut buf = vec![0u8; uint32_size(value)];
        Output::new(&mut buf).write_uint32(value);
        self.set_data(key, buf)
    }

    /// Reads a `u32`, or `default` when absent or undecodable.
    #[must_use]
    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.with_data(key, |data| Input::new(data).read_uint32().ok())
            .flatten()
            .unwrap_or(default)
    }

    /// Stores an `i64`.
    pub fn set_i64(&self, key: &str, value: i64) -> bool {
        let mut buf = vec![0u8; int64_size(value)];
        Output::new(&mut buf).write_int64(value);
        self.set_data(key, buf)
    }

    /// Reads an `i64`, or `default` when absent or undecodable.
    #[must_use]
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.with_data(key, |data| Input::new(data).read_int64().ok())
            .flatten()
            .unwrap_or(default)
    }

    /// Stores a `u64`.
    pub fn set_u64(&self, key: &str, value: u64) -> bool {
        let mut buf = vec![0u8; uint64_size(value)];
        Output::new(&mut buf).write_uint64(value);
        self.set_data(key, buf)
    }

    /// Reads a `u64`, or `default` when absent or undecodable.
    #[must_use]
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.with_data(key, |data| Input::new(data).read_uint64().ok())
            .flatten()
            .unwrap_or(default)
    }

    /// Stores an `f32`.
    pub fn set_f32(&self, key: &str, value: f32) -> bool {
        let mut buf = vec![0u8; fixed32_size()];
        Output::new(&mut buf).write_float(value);
        self.set_data(key, buf)
    }

    /// Reads an `f32`, or `default` when absent or undecodable.
    #[must_use]
    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        self.with_data(key, |data| Input::new(data).read_float().ok())
            .flatten()
            .unwrap_or(default)
    }

    /// Stores an `f64`.
    pub fn set_f64(&self, key: &str, value: f64) -> bool {
        let mut buf = vec![0u8; fixed64_size()];
        Output::new(&mut buf).write_double(value);
        self.set_data(key, buf)
    }

    /// Reads an `f64`, or `default` when absent or undecodable.
    #[must_use]
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.with_data(key, |data| Input::new(data).read_double().ok())
            .flatten()
            .unwrap_or(default)
    }

    /// Stores a string, length-delimited.
    pub fn set_string(&self, key: &str, value: &str) -> bool {
        let mut buf = vec![0u8; string_size(value)];
        Output::new(&mut buf).write_string(value);
        self.set_data(key, buf)
    }

    /// Reads a string, or `None` when absent or undecodable.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.with_data(key, |data| Input::new(data).read_string().ok())
            .flatten()
    }

    /// Stores a byte buffer, length-delimited.
    pub fn set_bytes(&self, key: &str, value: &[u8]) -> bool {
        let mut buf = vec![0u8; bytes_size(value.len())];
        Output::new(&mut buf).write_bytes(value);
        self.set_data(key, buf)
    }

    /// Reads a byte buffer, or `None` when absent or undecodable.
    #[must_use]
    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.with_data(key, |data| Input::new(data).read_bytes().ok())
            .flatten()
    }

    /// Stores a list of strings.
    pub fn set_string_list(&self, key: &str, value: &[String]) -> bool {
        self.set_data(key, codec::encode_string_list(value))
    }

    /// Reads a list of strings, or `None` when absent or undecodable.
    #[must_use]
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.with_data(key, |data| codec::decode_string_list(data).ok())
            .flatten()
    }
}
