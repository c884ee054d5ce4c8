//! The storage engine behind a [`Store`](super::Store) handle.
//!
//! Owns the in-memory dictionary, the append cursor, the running CRC digest
//! and the cached meta snapshot, and drives mount, append, capacity
//! management, full rewrites, cross-process reload and rekeying. All methods
//! assume the handle's thread lock is held; inter-process exclusion is taken
//! per operation through the recursive file lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, error, info, warn};

use crate::checksum::crc32;
use crate::codec::{self, bytes_size, DecodeMode, Output};
use crate::crypt::{AesCfb, AES_KEY_LEN};
use crate::error::{CorruptKind, RecoverStrategy, Result};
use crate::file::lock::{FileLock, LockType};
use crate::file::{page_size, MetaFile, MmapedFile};
use crate::meta::{MetaInfo, VERSION_ACTUAL_SIZE, VERSION_LAST_CONFIRMED, VERSION_RANDOM_IV};

use super::registry;

/// Size of the legacy `u32 actualSize` header at the front of the data file.
pub(crate) const FIXED32_SIZE: usize = 4;

/// Reserve added on the first insert into an empty dictionary so growth
/// arithmetic never sees a zero-item file.
const ITEM_SIZE_HOLDER: usize = 4;

const KEEP_SEQUENCE: bool = false;
const INCREASE_SEQUENCE: bool = true;

/// How an append was satisfied.
enum AppendResult {
    /// Enough tail space; the record went in at the cursor.
    Tail,
    /// A full rewrite ran and the record is already part of the new image.
    Rewritten,
    /// The file is invalid or could not be grown.
    Failed,
}

pub(crate) struct StoreInner {
    mmap_id: String,
    path: PathBuf,
    inter_process: bool,
    crypter: Option<AesCfb>,
    meta_file: MetaFile,
    meta: MetaInfo,
    file: Option<MmapedFile>,
    actual_size: usize,
    crc_digest: u32,
    dic: FxHashMap<String, Vec<u8>>,
    need_load_from_file: bool,
    has_full_writeback: bool,
    process_lock: FileLock,
}

impl StoreInner {
    pub(crate) fn new(
        mmap_id: String,
        path: PathBuf,
        meta_path: &Path,
        inter_process: bool,
        key: Option<&[u8]>,
    ) -> Result<Self> {
        let meta_file = MetaFile::open(meta_path)?;
        let process_lock = FileLock::new(Arc::clone(meta_file.file()), inter_process);
        let crypter = key.filter(|k| !k.is_empty()).map(AesCfb::new);

        let mut inner = Self {
            mmap_id,
            path,
            inter_process,
            crypter,
            meta_file,
            meta: MetaInfo::default(),
            file: None,
            actual_size: 0,
            crc_digest: 0,
            dic: FxHashMap::default(),
            need_load_from_file: true,
            has_full_writeback: false,
            process_lock,
        };

        {
            let _lock = inner.process_lock.acquire(LockType::Shared);
            inner.load_from_file()?;
        }
        Ok(inner)
    }

    fn file_size(&self) -> usize {
        self.file.as_ref().map_or(0, MmapedFile::len)
    }

    fn space_left(&self) -> usize {
        self.file_size()
            .saturating_sub(FIXED32_SIZE + self.actual_size)
    }

    pub(crate) fn is_file_valid(&self) -> bool {
        self.file.as_ref().is_some_and(|f| f.len() > 0)
    }

    // ---------------------------------------------------------------------
    // Mount & validation
    // ---------------------------------------------------------------------

    pub(crate) fn load_from_file(&mut self) -> Result<()> {
        self.meta = MetaInfo::read(self.meta_file.bytes());
        if let Some(crypter) = self.crypter.as_mut() {
            if self.meta.version >= VERSION_RANDOM_IV {
                crypter.reset(&self.meta.vector);
            } else {
                crypter.reset_legacy();
            }
        }

        self.file = Some(MmapedFile::open(&self.path)?);

        let (load, mut need_writeback) = self.check_data_valid();
        info!(
            "loading [{}] with {} actual size, file size {}, inter-process {}, meta version {}",
            self.mmap_id,
            self.actual_size,
            self.file_size(),
            self.inter_process,
            self.meta.version
        );
        // mounted from here on; recovery below may compact or sync
        self.need_load_from_file = false;

        if load && self.actual_size > 0 {
            debug!(
                "loading [{}] with crc {} sequence {}",
                self.mmap_id, self.meta.crc_digest, self.meta.sequence
            );
            let mut buffer = match self.file.as_ref() {
                Some(file) => {
                    file.as_slice()[FIXED32_SIZE..FIXED32_SIZE + self.actual_size].to_vec()
                }
                None => Vec::new(),
            };
            if let Some(crypter) = self.crypter.as_mut() {
                crypter.decrypt(&mut buffer);
            }

            self.dic.clear();
            let mode = if need_writeback {
                DecodeMode::Greedy
            } else {
                DecodeMode::Strict
            };
            if let Err(err) = codec::decode_map(&mut self.dic, &buffer, mode) {
                // CRC was clean yet a record failed to parse; salvage what
                // does parse and compact
                warn!("[{}] strict decode failed ({err}), replaying greedily", self.mmap_id);
                self.dic.clear();
                let _ = codec::decode_map(&mut self.dic, &buffer, DecodeMode::Greedy);
                need_writeback = true;
            }

            if need_writeback {
                self.full_writeback();
            }
        } else {
            // nothing trustworthy on disk; start over
            let _lock = self.process_lock.acquire(LockType::Exclusive);
            self.dic.clear();
            if self.actual_size > 0 {
                self.write_actual_size(0, 0, None, INCREASE_SEQUENCE);
                self.sync(true);
            } else {
                self.write_actual_size(0, 0, None, KEEP_SEQUENCE);
            }
        }
        info!("loaded [{}] with {} values", self.mmap_id, self.dic.len());

        Ok(())
    }

    /// Decides whether the payload can be replayed, recovering through the
    /// legacy header or `lastConfirmed` when the primary check fails.
    fn check_data_valid(&mut self) -> (bool, bool) {
        let mut load = false;
        let mut need_writeback = false;
        let file_size = self.file_size();

        self.actual_size = self.read_actual_size();

        if self.actual_size < file_size && self.actual_size + FIXED32_SIZE <= file_size {
            if self.check_file_crc_valid(self.actual_size, self.meta.crc_digest) {
                load = true;
            } else {
                self.check_last_confirmed(&mut load);
                if !load {
                    let strategy =
                        registry::recover_strategy(&self.mmap_id, CorruptKind::CrcMismatch);
                    if strategy == RecoverStrategy::Recover {
                        load = true;
                        need_writeback = true;
                    }
                    info!("recover strategy for [{}] is {:?}", self.mmap_id, strategy);
                }
            }
        } else {
            error!(
                "check [{}] error: {} size in total, file size is {}",
                self.mmap_id, self.actual_size, file_size
            );
            self.check_last_confirmed(&mut load);
            if !load {
                let strategy =
                    registry::recover_strategy(&self.mmap_id, CorruptKind::LengthMismatch);
                if strategy == RecoverStrategy::Recover {
                    // never read past the mapping
                    self.actual_size = file_size.saturating_sub(FIXED32_SIZE);
                    load = true;
                    need_writeback = true;
                }
                info!("recover strategy for [{}] is {:?}", self.mmap_id, strategy);
            }
        }

        (load, need_writeback)
    }

    fn check_last_confirmed(&mut self, load: &mut bool) {
        let file_size = self.file_size();

        if self.meta.version >= VERSION_ACTUAL_SIZE {
            // downgrade & upgrade support: an old binary trusts only the
            // legacy header, so the header may hold the real length
            let header = self.read_header_actual_size();
            if u64::from(header) != self.meta.actual_size {
                warn!(
                    "[{}] header actual size {header} differs from meta actual size {}",
                    self.mmap_id, self.meta.actual_size
                );
                let header = header as usize;
                if header + FIXED32_SIZE <= file_size
                    && self.check_file_crc_valid(header, self.meta.crc_digest)
                {
                    info!("looks like [{}] was downgraded and upgraded again", self.mmap_id);
                    *load = true;
                    self.write_actual_size(header, self.meta.crc_digest, None, KEEP_SEQUENCE);
                    return;
                }
            }
        }

        if self.meta.version >= VERSION_LAST_CONFIRMED {
            let last_actual_size = self.meta.last_actual_size as usize;
            let last_crc_digest = self.meta.last_crc_digest;
            if last_actual_size < file_size && last_actual_size + FIXED32_SIZE <= file_size {
                if self.check_file_crc_valid(last_actual_size, last_crc_digest) {
                    *load = true;
                    self.write_actual_size(
                        last_actual_size,
                        last_crc_digest,
                        None,
                        KEEP_SEQUENCE,
                    );
                } else {
                    error!(
                        "check [{}] error: lastActualSize {last_actual_size}, lastCRCDigest {last_crc_digest}",
                        self.mmap_id
                    );
                }
            } else {
                error!(
                    "check [{}] error: lastActualSize {last_actual_size}, file size {file_size}",
                    self.mmap_id
                );
            }
        }
    }

    fn read_header_actual_size(&self) -> u32 {
        match self.file.as_ref() {
            Some(file) if file.len() >= FIXED32_SIZE => {
                let bytes = &file.as_slice()[..FIXED32_SIZE];
                u32::from_le_bytes(bytes.try_into().unwrap_or_default())
            }
            _ => 0,
        }
    }

    /// The payload length in effect: meta when it is authoritative (v3+),
    /// otherwise the legacy header.
    fn read_actual_size(&mut self) -> usize {
        let header = self.read_header_actual_size();
        if self.meta.version >= VERSION_ACTUAL_SIZE {
            if u64::from(header) != self.meta.actual_size {
                warn!(
                    "[{}] header actual size {header}, meta actual size {}",
                    self.mmap_id, self.meta.actual_size
                );
            }
            usize::try_from(self.meta.actual_size).unwrap_or(0)
        } else {
            header as usize
        }
    }

    /// Verifies the file CRC over `payload[0..actual_size]`, leaving the
    /// running digest at the computed value.
    fn check_file_crc_valid(&mut self, actual_size: usize, crc_digest: u32) -> bool {
        let Some(file) = self.file.as_ref() else {
            return false;
        };
        if FIXED32_SIZE + actual_size > file.len() {
            return false;
        }
        let digest = crc32(
            0,
            &file.as_slice()[FIXED32_SIZE..FIXED32_SIZE + actual_size],
        );
        self.crc_digest = digest;
        if digest == crc_digest {
            return true;
        }
        error!(
            "check crc [{}] failed, expected {crc_digest}, computed {digest}",
            self.mmap_id
        );
        false
    }

    // ---------------------------------------------------------------------
    // Cross-process reload
    // ---------------------------------------------------------------------

    /// Re-syncs with the file before every public operation. In
    /// inter-process mode the meta page is compared with the cached snapshot
    /// to detect rewrites (sequence) and appends (crc) from siblings.
    pub(crate) fn check_load_data(&mut self) -> Result<()> {
        if self.need_load_from_file {
            let _lock = self.process_lock.acquire(LockType::Shared);
            return self.load_from_file();
        }
        if !self.inter_process {
            return Ok(());
        }

        let on_disk = MetaInfo::read(self.meta_file.bytes());
        if self.meta.sequence != on_disk.sequence {
            info!(
                "[{}] sequence changed from {} to {}",
                self.mmap_id, self.meta.sequence, on_disk.sequence
            );
            let _lock = self.process_lock.acquire(LockType::Shared);
            self.clear_memory_state();
            self.load_from_file()?;
        } else if self.meta.crc_digest != on_disk.crc_digest {
            debug!(
                "[{}] crc changed from {} to {}",
                self.mmap_id, self.meta.crc_digest, on_disk.crc_digest
            );
            let _lock = self.process_lock.acquire(LockType::Shared);
            let disk_len = match self.file.as_ref() {
                Some(file) => file.disk_len().unwrap_or(0) as usize,
                None => 0,
            };
            if self.file_size() == disk_len {
                self.partial_load_from_file()?;
            } else {
                info!(
                    "file size of [{}] changed from {} to {disk_len}",
                    self.mmap_id,
                    self.file_size()
                );
                self.clear_memory_state();
                self.load_from_file()?;
            }
        }
        Ok(())
    }

    /// Folds records a sibling process appended since our cursor into the
    /// dictionary, verifying the incremental CRC first.
    fn partial_load_from_file(&mut self) -> Result<()> {
        self.meta = MetaInfo::read(self.meta_file.bytes());

        let old_actual_size = self.actual_size;
        let new_actual_size = self.read_actual_size();
        debug!(
            "partial loading [{}] from {old_actual_size} to {new_actual_size}",
            self.mmap_id
        );

        let file_size = self.file_size();
        if new_actual_size > 0
            && new_actual_size < file_size
            && new_actual_size + FIXED32_SIZE <= file_size
            && new_actual_size > old_actual_size
        {
            let start = FIXED32_SIZE + old_actual_size;
            let end = FIXED32_SIZE + new_actual_size;
            let mut buffer = match self.file.as_ref() {
                Some(file) => file.as_slice()[start..end].to_vec(),
                None => Vec::new(),
            };
            let digest = crc32(self.crc_digest, &buffer);
            if digest == self.meta.crc_digest {
                self.crc_digest = digest;
                self.actual_size = new_actual_size;
                if let Some(crypter) = self.crypter.as_mut() {
                    crypter.decrypt(&mut buffer);
                }
                let _ = codec::decode_map(&mut self.dic, &buffer, DecodeMode::Greedy);
                self.has_full_writeback = false;
                debug!("partial loaded [{}] with {} values", self.mmap_id, self.dic.len());
                return Ok(());
            }
            error!(
                "[{}] incremental crc {digest} != meta crc {}",
                self.mmap_id, self.meta.crc_digest
            );
        }

        // something is off, fall back to a full load
        self.actual_size = old_actual_size;
        self.clear_memory_state();
        self.load_from_file()
    }

    /// Forgets everything loaded from the file; the next operation remounts.
    pub(crate) fn clear_memory_state(&mut self) {
        if self.need_load_from_file {
            return;
        }
        self.need_load_from_file = true;

        self.dic.clear();
        self.has_full_writeback = false;

        if let Some(crypter) = self.crypter.as_mut() {
            if self.meta.version >= VERSION_RANDOM_IV {
                crypter.reset(&self.meta.vector);
            } else {
                crypter.reset_legacy();
            }
        }

        self.file = None;
        self.actual_size = 0;
        self.crc_digest = 0;
        self.meta.crc_digest = 0;
    }

    // ---------------------------------------------------------------------
    // Append path
    // ---------------------------------------------------------------------

    pub(crate) fn set_data(&mut self, key: &str, value: Vec<u8>) -> bool {
        if key.is_empty() || value.is_empty() {
            return false;
        }
        let _lock = self.process_lock.acquire(LockType::Exclusive);
        if self.check_load_data().is_err() {
            return false;
        }
        match self.append_record(key, &value) {
            AppendResult::Tail => {
                self.dic.insert(key.to_owned(), value);
                self.has_full_writeback = false;
                true
            }
            AppendResult::Rewritten => true,
            AppendResult::Failed => false,
        }
    }

    pub(crate) fn remove_data(&mut self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        let _lock = self.process_lock.acquire(LockType::Exclusive);
        if self.check_load_data().is_err() {
            return false;
        }
        if !self.dic.contains_key(key) {
            return false;
        }
        // a zero-length value is the tombstone
        match self.append_record(key, &[]) {
            AppendResult::Tail => {
                self.dic.remove(key);
                self.has_full_writeback = false;
                true
            }
            AppendResult::Rewritten => true,
            AppendResult::Failed => false,
        }
    }

    /// Appends one encoded record at the cursor, or lets the capacity path
    /// fold it into a rewrite image.
    fn append_record(&mut self, key: &str, value: &[u8]) -> AppendResult {
        let record_size = bytes_size(key.len()) + bytes_size(value.len());

        match self.ensure_memory_size(record_size, key, value) {
            AppendResult::Tail => {}
            other => return other,
        }
        if !self.is_file_valid() {
            warn!("[{}] file not valid", self.mmap_id);
            return AppendResult::Failed;
        }

        let offset = FIXED32_SIZE + self.actual_size;
        let crc_digest;
        {
            let Some(file) = self.file.as_mut() else {
                return AppendResult::Failed;
            };
            let window = &mut file.as_mut_slice()[offset..offset + record_size];
            {
                let mut out = Output::new(&mut *window);
                out.write_string(key);
                out.write_bytes(value);
            }
            if let Some(crypter) = self.crypter.as_mut() {
                crypter.encrypt(window);
            }
            crc_digest = crc32(self.crc_digest, window);
        }
        self.write_actual_size(
            self.actual_size + record_size,
            crc_digest,
            None,
            KEEP_SEQUENCE,
        );
        AppendResult::Tail
    }

    /// Makes room for an incoming record. Since the log is append-only, a
    /// full rewrite is the only way to reclaim space; if one runs, the
    /// incoming record is folded into the rewrite image.
    fn ensure_memory_size(&mut self, record_size: usize, key: &str, value: &[u8]) -> AppendResult {
        if !self.is_file_valid() {
            warn!("[{}] file not valid", self.mmap_id);
            return AppendResult::Failed;
        }

        let mut new_size = record_size;
        if self.dic.is_empty() {
            new_size += ITEM_SIZE_HOLDER;
        }

        if new_size < self.space_left() && !self.dic.is_empty() {
            return AppendResult::Tail;
        }

        // fold the record in, then rewrite the whole image
        if value.is_empty() {
            self.dic.remove(key);
        } else {
            self.dic.insert(key.to_owned(), value.to_vec());
        }
        let payload = codec::encode_map(&self.dic);
        if !self.grow_to_fit(payload.len(), new_size) {
            return AppendResult::Failed;
        }
        if self.do_full_write_back(payload) {
            AppendResult::Rewritten
        } else {
            AppendResult::Failed
        }
    }

    /// Doubles the file until the projected usage fits, leaving headroom so
    /// rewrites stay rare.
    fn grow_to_fit(&mut self, payload_len: usize, incoming_size: usize) -> bool {
        let len_needed = payload_len + FIXED32_SIZE + incoming_size;
        let avg_item_size = len_needed / self.dic.len().max(1);
        let future_usage = avg_item_size * std::cmp::max(8, (self.dic.len() + 1) / 2);
        let file_size = self.file_size();

        if len_needed < file_size && len_needed + future_usage < file_size {
            return true;
        }

        let mut target = file_size;
        while len_needed + future_usage >= target {
            target *= 2;
        }
        info!(
            "extending [{}] file size from {file_size} to {target}, incoming size {incoming_size}, future usage {future_usage}",
            self.mmap_id
        );
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        if let Err(err) = file.resize(target) {
            error!("failed to extend [{}] to {target}: {err}", self.mmap_id);
            return false;
        }
        true
    }

    // ---------------------------------------------------------------------
    // Full rewrite
    // ---------------------------------------------------------------------

    /// Serializes the live dictionary and replaces the payload in place.
    pub(crate) fn full_writeback(&mut self) -> bool {
        if self.has_full_writeback {
            return true;
        }
        if self.need_load_from_file {
            return true;
        }
        if !self.is_file_valid() {
            warn!("[{}] file not valid", self.mmap_id);
            return false;
        }

        if self.dic.is_empty() {
            self.clear_all();
            return true;
        }

        let payload = codec::encode_map(&self.dic);
        let _lock = self.process_lock.acquire(LockType::Exclusive);
        if payload.is_empty() {
            return false;
        }
        if payload.len() + FIXED32_SIZE > self.file_size() && !self.grow_to_fit(payload.len(), 0) {
            return false;
        }
        self.do_full_write_back(payload)
    }

    /// Commits a serialized image: encrypt under a fresh IV, overwrite the
    /// payload, recompute the digest and bump the sequence. This is the only
    /// path that moves `lastConfirmed`, so a crash in the middle reverts to
    /// the previous confirmed point.
    fn do_full_write_back(&mut self, mut payload: Vec<u8>) -> bool {
        let mut new_iv = None;
        if let Some(crypter) = self.crypter.as_mut() {
            let mut iv = [0u8; AES_KEY_LEN];
            AesCfb::fill_random_iv(&mut iv);
            crypter.reset(&iv);
            crypter.encrypt(&mut payload);
            new_iv = Some(iv);
        }

        let payload_len = payload.len();
        let crc_digest;
        {
            let Some(file) = self.file.as_mut() else {
                return false;
            };
            if FIXED32_SIZE + payload_len > file.len() {
                error!(
                    "[{}] rewrite image of {payload_len} bytes exceeds file size {}",
                    self.mmap_id,
                    file.len()
                );
                return false;
            }
            file.as_mut_slice()[FIXED32_SIZE..FIXED32_SIZE + payload_len]
                .copy_from_slice(&payload);
            crc_digest = crc32(0, &file.as_slice()[FIXED32_SIZE..FIXED32_SIZE + payload_len]);
        }

        self.write_actual_size(payload_len, crc_digest, new_iv.as_ref(), INCREASE_SEQUENCE);
        self.has_full_writeback = true;
        // lastConfirmed must reach disk before the next append relies on it
        self.sync(true);
        true
    }

    /// Writes the new `(actualSize, crc)` pair to the legacy header and the
    /// meta page, upgrading the schema version in place as features are
    /// first used. `increase_sequence` marks a full rewrite and moves the
    /// `lastConfirmed` anchor.
    #[allow(clippy::cast_possible_truncation)]
    fn write_actual_size(
        &mut self,
        actual_size: usize,
        crc_digest: u32,
        iv: Option<&[u8; AES_KEY_LEN]>,
        increase_sequence: bool,
    ) {
        // legacy header kept for downgrade readers
        if let Some(file) = self.file.as_mut() {
            if file.len() >= FIXED32_SIZE {
                file.as_mut_slice()[..FIXED32_SIZE]
                    .copy_from_slice(&(actual_size as u32).to_le_bytes());
            }
        }

        self.actual_size = actual_size;
        self.crc_digest = crc_digest;
        self.meta.actual_size = actual_size as u64;
        self.meta.crc_digest = crc_digest;

        let mut needs_full_write = false;
        if self.meta.version < VERSION_ACTUAL_SIZE {
            self.meta.version = VERSION_ACTUAL_SIZE;
            needs_full_write = true;
        }
        if let Some(iv) = iv {
            self.meta.vector = *iv;
            needs_full_write = true;
        }
        if increase_sequence {
            self.meta.sequence += 1;
            self.meta.last_actual_size = actual_size as u64;
            self.meta.last_crc_digest = crc_digest;
            if self.meta.version < VERSION_LAST_CONFIRMED {
                self.meta.version = VERSION_LAST_CONFIRMED;
            }
            needs_full_write = true;
        }

        if needs_full_write {
            self.meta.write(self.meta_file.bytes_mut());
        } else {
            self.meta.write_crc_and_actual_size(self.meta_file.bytes_mut());
        }
    }

    // ---------------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------------

    /// Wipes the namespace: one zeroed page, a fresh IV and a bumped
    /// sequence so siblings discard their state too.
    pub(crate) fn clear_all(&mut self) {
        info!("cleaning all key-values from [{}]", self.mmap_id);
        let _lock = self.process_lock.acquire(LockType::Exclusive);

        if self.need_load_from_file {
            let _ = std::fs::remove_file(&self.path);
            if let Err(err) = self.load_from_file() {
                error!("failed to reload [{}] after clear: {err}", self.mmap_id);
            }
            return;
        }

        let page = page_size();
        if let Some(file) = self.file.as_mut() {
            let head = page.min(file.len());
            file.as_mut_slice()[..head].fill(0);
            if let Err(err) = file.flush(true) {
                error!("failed to msync [{}]: {err}", self.mmap_id);
            }
            if file.len() != page {
                info!("truncating [{}] from {} to {page}", self.mmap_id, file.len());
                if let Err(err) = file.resize(page) {
                    error!("failed to truncate [{}] to {page}: {err}", self.mmap_id);
                }
            }
        }

        let mut iv = [0u8; AES_KEY_LEN];
        AesCfb::fill_random_iv(&mut iv);
        if let Some(crypter) = self.crypter.as_mut() {
            crypter.reset(&iv);
        }
        self.write_actual_size(0, 0, Some(&iv), INCREASE_SEQUENCE);
        if let Err(err) = self.meta_file.flush(true) {
            error!("failed to msync meta of [{}]: {err}", self.mmap_id);
        }

        self.clear_memory_state();
        if let Err(err) = self.load_from_file() {
            error!("failed to reload [{}] after clear: {err}", self.mmap_id);
        }
    }

    /// Shrinks the file while it is more than twice the live payload,
    /// compacting first. A tight file is left untouched.
    pub(crate) fn trim(&mut self) {
        debug!("preparing to trim [{}]", self.mmap_id);
        if self.check_load_data().is_err() {
            return;
        }

        if self.actual_size == 0 {
            self.clear_all();
            return;
        }
        let page = page_size();
        if self.file_size() <= page {
            return;
        }
        let _lock = self.process_lock.acquire(LockType::Exclusive);

        self.full_writeback();
        let old_size = self.file_size();
        let mut new_size = old_size;
        while new_size > (self.actual_size + FIXED32_SIZE) * 2 && new_size > page {
            new_size /= 2;
        }
        if new_size == old_size {
            debug!(
                "no need to trim [{}] with size {old_size}, actual size {}",
                self.mmap_id, self.actual_size
            );
            return;
        }

        info!(
            "trimming [{}] from {old_size} to {new_size}, actual size {}",
            self.mmap_id, self.actual_size
        );
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(err) = file.resize(new_size) {
            error!("failed to trim [{}] to {new_size}: {err}", self.mmap_id);
            return;
        }
        info!("finished trimming [{}] to {new_size}", self.mmap_id);
    }

    /// Flushes the data and meta mappings; `sync` selects msync-synchronous.
    pub(crate) fn sync(&mut self, sync: bool) {
        if self.need_load_from_file || !self.is_file_valid() {
            return;
        }
        let _lock = self.process_lock.acquire(LockType::Exclusive);
        if let Some(file) = self.file.as_ref() {
            if let Err(err) = file.flush(sync) {
                error!("failed to msync [{}]: {err}", self.mmap_id);
            }
        }
        if let Err(err) = self.meta_file.flush(sync) {
            error!("failed to msync meta of [{}]: {err}", self.mmap_id);
        }
    }

    // ---------------------------------------------------------------------
    // Rekeying
    // ---------------------------------------------------------------------

    /// Changes the encryption scheme. Any change of key material rewrites
    /// the file under a fresh IV so the on-disk bytes match the new scheme.
    pub(crate) fn re_key(&mut self, new_key: Option<&[u8]>) -> bool {
        if self.check_load_data().is_err() {
            return false;
        }
        let new_key = new_key.filter(|k| !k.is_empty());

        match (self.crypter.as_ref(), new_key) {
            (Some(crypter), Some(key)) => {
                if crypter.key() == AesCfb::new(key).key() {
                    return true;
                }
                info!("rekeying [{}] with a new aes key", self.mmap_id);
                self.crypter = Some(AesCfb::new(key));
            }
            (Some(_), None) => {
                info!("rekeying [{}] to plain text", self.mmap_id);
                self.crypter = None;
            }
            (None, Some(key)) => {
                info!("rekeying [{}] with an aes key", self.mmap_id);
                self.crypter = Some(AesCfb::new(key));
            }
            (None, None) => return true,
        }
        // the on-disk bytes still use the old scheme; force the rewrite
        self.has_full_writeback = false;
        self.full_writeback()
    }

    /// Adopts new key material for reading without rewriting; used when a
    /// sibling process performed the rekey and this handle must follow.
    pub(crate) fn check_re_set_crypt_key(&mut self, key: Option<&[u8]>) {
        let key = key.filter(|k| !k.is_empty());
        let changed = match (self.crypter.as_ref(), key) {
            (Some(crypter), Some(key)) => crypter.key() != AesCfb::new(key).key(),
            (None, None) => false,
            _ => true,
        };
        if !changed {
            return;
        }
        info!("resetting aes key of [{}]", self.mmap_id);
        self.crypter = key.map(AesCfb::new);
        self.clear_memory_state();
        if let Err(err) = self.load_from_file() {
            error!("failed to reload [{}] after key reset: {err}", self.mmap_id);
        }
    }

    /// Returns the active key material, if encryption is on.
    pub(crate) fn crypt_key(&self) -> Option<[u8; AES_KEY_LEN]> {
        self.crypter.as_ref().map(AesCfb::key)
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub(crate) fn get_data(&mut self, key: &str) -> Option<&[u8]> {
        if self.check_load_data().is_err() {
            return None;
        }
        self.dic.get(key).map(Vec::as_slice)
    }

    pub(crate) fn contains_key(&mut self, key: &str) -> bool {
        if self.check_load_data().is_err() {
            return false;
        }
        self.dic.contains_key(key)
    }

    pub(crate) fn count(&mut self) -> usize {
        if self.check_load_data().is_err() {
            return 0;
        }
        self.dic.len()
    }

    pub(crate) fn total_size(&mut self) -> usize {
        if self.check_load_data().is_err() {
            return 0;
        }
        self.file_size()
    }

    pub(crate) fn actual_size(&mut self) -> usize {
        if self.check_load_data().is_err() {
            return 0;
        }
        self.actual_size
    }

    pub(crate) fn all_keys(&mut self) -> Vec<String> {
        if self.check_load_data().is_err() {
            return Vec::new();
        }
        self.dic.keys().cloned().collect()
    }

    /// Removes several keys with a single compaction instead of one
    /// tombstone per key.
    pub(crate) fn remove_keys(&mut self, keys: &[&str]) {
        if keys.is_empty() {
            return;
        }
        let _lock = self.process_lock.acquire(LockType::Exclusive);
        if self.check_load_data().is_err() {
            return;
        }
        let mut removed = false;
        for key in keys {
            removed |= self.dic.remove(*key).is_some();
        }
        if removed {
            self.has_full_writeback = false;
            self.full_writeback();
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if self.need_load_from_file {
            return;
        }
        if let Some(file) = self.file.as_ref() {
            if let Err(err) = file.flush(true) {
                error!("failed to flush [{}] on drop: {err}", self.mmap_id);
            }
        }
        if let Err(err) = self.meta_file.flush(true) {
            error!("failed to flush meta of [{}] on drop: {err}", self.mmap_id);
        }
    }
}
