//! The metadata block persisted in the `.crc` file.
//!
//! One page, mapped shared, and authoritative: the data file's legacy header
//! length is only a cross-check. Layout is fixed little-endian:
//!
//! ```text
//! [crcDigest: u32][version: u32][sequence: u32][iv: 16][pad: u32]
//! [actualSize: u64][lastActualSize: u64][lastCRCDigest: u32]
//! ```
//!
//! Schema versions: 1 legacy, 2 adds the random IV, 3 makes `actualSize`
//! authoritative, 4 adds the `lastConfirmed` recovery anchor. Files are
//! upgraded in place on first write.

use crate::crypt::AES_KEY_LEN;

/// Legacy files: CRC and sequence only.
pub const VERSION_LEGACY: u32 = 1;
/// Adds a per-file random IV.
pub const VERSION_RANDOM_IV: u32 = 2;
/// Meta `actualSize` becomes the source of truth.
pub const VERSION_ACTUAL_SIZE: u32 = 3;
/// Adds the last-confirmed `(size, crc)` recovery anchor.
pub const VERSION_LAST_CONFIRMED: u32 = 4;

/// Serialized length of the meta block within its page.
pub const META_LEN: usize = 52;

const OFFSET_CRC: usize = 0;
const OFFSET_VERSION: usize = 4;
const OFFSET_SEQUENCE: usize = 8;
const OFFSET_IV: usize = 12;
const OFFSET_ACTUAL_SIZE: usize = 32;
const OFFSET_LAST_ACTUAL_SIZE: usize = 40;
const OFFSET_LAST_CRC: usize = 48;

/// In-memory snapshot of the meta file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaInfo {
    /// CRC-32 of `payload[0..actualSize]`, post-encryption.
    pub crc_digest: u32,
    /// Schema version.
    pub version: u32,
    /// Incremented on every full rewrite.
    pub sequence: u32,
    /// Current AES-CFB IV (v2+).
    pub vector: [u8; AES_KEY_LEN],
    /// Authoritative payload length (v3+).
    pub actual_size: u64,
    /// Payload length at the last confirmed full rewrite (v4+).
    pub last_actual_size: u64,
    /// CRC at the last confirmed full rewrite (v4+).
    pub last_crc_digest: u32,
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().expect("4-byte slice"))
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().expect("8-byte slice"))
}

impl MetaInfo {
    /// Deserializes a snapshot from the mapped meta page.
    #[must_use]
    pub fn read(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= META_LEN);
        let mut vector = [0u8; AES_KEY_LEN];
        vector.copy_from_slice(&buf[OFFSET_IV..OFFSET_IV + AES_KEY_LEN]);
        Self {
            crc_digest: read_u32(buf, OFFSET_CRC),
            version: read_u32(buf, OFFSET_VERSION),
            sequence: read_u32(buf, OFFSET_SEQUENCE),
            vector,
            actual_size: read_u64(buf, OFFSET_ACTUAL_SIZE),
            last_actual_size: read_u64(buf, OFFSET_LAST_ACTUAL_SIZE),
            last_crc_digest: read_u32(buf, OFFSET_LAST_CRC),
        }
    }

    /// Serializes the full snapshot into the mapped meta page.
    pub fn write(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= META_LEN);
        buf[OFFSET_CRC..OFFSET_CRC + 4].copy_from_slice(&self.crc_digest.to_le_bytes());
        buf[OFFSET_VERSION..OFFSET_VERSION + 4].copy_from_slice(&self.version.to_le_bytes());
        buf[OFFSET_SEQUENCE..OFFSET_SEQUENCE + 4].copy_from_slice(&self.sequence.to_le_bytes());
        buf[OFFSET_IV..OFFSET_IV + AES_KEY_LEN].copy_from_slice(&self.vector);
        buf[OFFSET_ACTUAL_SIZE..OFFSET_ACTUAL_SIZE + 8]
            .copy_from_slice(&self.actual_size.to_le_bytes());
        buf[OFFSET_LAST_ACTUAL_SIZE..OFFSET_LAST_ACTUAL_SIZE + 8]
            .copy_from_slice(&self.last_actual_size.to_le_bytes());
        buf[OFFSET_LAST_CRC..OFFSET_LAST_CRC + 4]
            .copy_from_slice(&self.last_crc_digest.to_le_bytes());
    }

    /// Fast path for appends: only the digest and payload length change, so
    /// only those words are rewritten.
    pub fn write_crc_and_actual_size(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= META_LEN);
        buf[OFFSET_CRC..OFFSET_CRC + 4].copy_from_slice(&self.crc_digest.to_le_bytes());
        buf[OFFSET_ACTUAL_SIZE..OFFSET_ACTUAL_SIZE + 8]
            .copy_from_slice(&self.actual_size.to_le_bytes());
    }
}
