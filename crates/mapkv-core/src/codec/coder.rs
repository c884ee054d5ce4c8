//! Record-stream and container coding.
//!
//! The payload of a data file is a bare concatenation of
//! `varint(keyLen) || key || varint(valueLen) || value` records; a record with
//! an empty value is a tombstone. Replay is a left fold in file order, later
//! records winning.

use rustc_hash::FxHashMap;

use super::{bytes_size, string_size, varint32_size, Input, Output};
use crate::error::DecodeError;

/// How leniently to treat a malformed record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Abort on the first malformed record. Used when meta validation fully
    /// succeeded, so any parse failure is a real defect.
    Strict,
    /// Accept records up to the first malformed one. Used after recovery,
    /// since the tail may hold a partially written record.
    Greedy,
}

/// Serializes the live dictionary into a fresh payload buffer.
///
/// Emits bare records with no outer wrapper; empty keys are skipped.
#[must_use]
pub fn encode_map(dic: &FxHashMap<String, Vec<u8>>) -> Vec<u8> {
    let total: usize = dic
        .iter()
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| string_size(k) + bytes_size(v.len()))
        .sum();
    let mut buf = vec![0u8; total];
    let mut out = Output::new(&mut buf);
    for (key, value) in dic {
        if key.is_empty() {
            continue;
        }
        out.write_string(key);
        out.write_bytes(value);
    }
    debug_assert_eq!(out.position(), total);
    buf
}

/// Replays a record stream into the dictionary.
///
/// Returns the number of payload bytes consumed by fully parsed records. In
/// [`DecodeMode::Strict`] a malformed record is an error; a legacy leading
/// length wrapper covering the whole buffer is recognized and skipped. In
/// [`DecodeMode::Greedy`] decoding stops silently at the first malformed or
/// truncated record and the stream is taken as bare.
pub fn decode_map(
    dic: &mut FxHashMap<String, Vec<u8>>,
    data: &[u8],
    mode: DecodeMode,
) -> Result<usize, DecodeError> {
    let mut input = Input::new(data);
    if mode == DecodeMode::Strict {
        skip_legacy_wrapper(&mut input, data);
    }

    let mut consumed = input.position();
    while !input.is_at_end() {
        let record = decode_record(&mut input);
        match record {
            Ok((key, value)) => {
                consumed = input.position();
                if key.is_empty() {
                    continue;
                }
                if value.is_empty() {
                    dic.remove(&key);
                } else {
                    dic.insert(key, value);
                }
            }
            Err(err) => {
                if mode == DecodeMode::Strict {
                    return Err(err);
                }
                break;
            }
        }
    }
    Ok(consumed)
}

fn decode_record(input: &mut Input<'_>) -> Result<(String, Vec<u8>), DecodeError> {
    let key = input.read_string()?;
    if key.is_empty() {
        // a lone zero-length key consumes its varint and nothing else
        return Ok((key, Vec::new()));
    }
    let value = input.read_bytes()?;
    Ok((key, value))
}

/// Old full-rewrite images carried an outer `varint(totalLen)` wrapper; if the
/// first varint spans exactly the rest of the buffer, treat it as one.
fn skip_legacy_wrapper(input: &mut Input<'_>, data: &[u8]) {
    let mut probe = Input::new(data);
    if let Ok(len) = probe.read_varint32() {
        if len > 0 && len as usize == data.len() - probe.position() {
            let _ = input.read_varint32();
        }
    }
}

/// Encodes a string list value: `varint(totalByteLen) || (varint(len)||bytes)*`.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
#[must_use]
pub fn encode_string_list(items: &[String]) -> Vec<u8> {
    let inner: usize = items.iter().map(|s| string_size(s)).sum();
    let mut buf = vec![0u8; varint32_size(inner as i32) + inner];
    let mut out = Output::new(&mut buf);
    out.write_varint32(inner as i32);
    for item in items {
        out.write_string(item);
    }
    buf
}

/// Decodes a string list value.
pub fn decode_string_list(data: &[u8]) -> Result<Vec<String>, DecodeError> {
    let mut input = Input::new(data);
    let _total = input.read_varint32()?;
    let mut items = Vec::new();
    while !input.is_at_end() {
        items.push(input.read_string()?);
    }
    Ok(items)
}
