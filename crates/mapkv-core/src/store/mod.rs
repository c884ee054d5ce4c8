//! The public store handle and its process-wide registry.

mod inner;
mod paths;
mod registry;
mod typed;

#[cfg(test)]
mod encrypted_tests;
#[cfg(test)]
mod recovery_tests;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::checksum::crc32;
use crate::codec::{varint32_size, Input};
use crate::error::{Error, Result};
use crate::meta::{MetaInfo, META_LEN, VERSION_ACTUAL_SIZE};

use inner::{StoreInner, FIXED32_SIZE};
pub use registry::RecoverHandler;

/// Whether a namespace is shared with sibling processes.
///
/// Multi-process mode re-reads the meta page on every operation and mediates
/// writes through OS byte-range locks; single-process mode skips both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// One process owns the files.
    #[default]
    SingleProcess,
    /// Several processes may operate on the files concurrently.
    MultiProcess,
}

/// A handle to one persistent namespace.
///
/// Handles are process-wide singletons: opening the same `(root, id)` twice
/// returns the same `Arc`. Every public operation takes the handle's thread
/// lock, so a `Store` can be shared freely between threads.
pub struct Store {
    registry_key: String,
    inner: Mutex<StoreInner>,
}

impl Store {
    /// Records the default root directory used by [`Store::open_default`]
    /// and creates it.
    pub fn initialize(root: impl AsRef<Path>) -> Result<()> {
        registry::initialize(root.as_ref())
    }

    /// Installs a process-wide handler deciding how to react when a
    /// namespace fails validation on load. Without one, corrupt state is
    /// discarded.
    pub fn register_recover_handler(
        handler: impl Fn(&str, crate::CorruptKind) -> crate::RecoverStrategy + Send + Sync + 'static,
    ) {
        registry::register_recover_handler(Box::new(handler));
    }

    /// Removes the recovery handler installed by
    /// [`register_recover_handler`](Store::register_recover_handler).
    pub fn unregister_recover_handler() {
        registry::unregister_recover_handler();
    }

    /// Opens (or creates) the namespace `id` under `root`, reusing the live
    /// handle if this process already opened it.
    pub fn open(
        root: impl AsRef<Path>,
        id: &str,
        mode: StoreMode,
        key: Option<&[u8]>,
    ) -> Result<Arc<Store>> {
        if id.is_empty() {
            return Err(Error::InvalidArgument("id must not be empty"));
        }
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;

        let data_path = paths::data_path(root, id)?;
        let registry_key = paths::registry_key(&data_path);

        let mut instances = registry::instances().lock();
        if let Some(store) = instances.get(&registry_key) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(Self::open_unregistered(id, mode, key, &data_path)?);
        instances.insert(registry_key, Arc::clone(&store));
        Ok(store)
    }

    /// Like [`Store::open`], but under the root recorded by
    /// [`Store::initialize`].
    pub fn open_default(id: &str, mode: StoreMode, key: Option<&[u8]>) -> Result<Arc<Store>> {
        let root = registry::default_root()
            .ok_or(Error::InvalidArgument("initialize() has not been called"))?;
        Self::open(root, id, mode, key)
    }

    /// Builds a handle without touching the registry. Exposed to tests so
    /// two handles can drive the same files like two processes would.
    pub(crate) fn open_unregistered(
        id: &str,
        mode: StoreMode,
        key: Option<&[u8]>,
        data_path: &Path,
    ) -> Result<Store> {
        let meta_path = paths::meta_path(data_path);
        let inner = StoreInner::new(
            id.to_owned(),
            data_path.to_path_buf(),
            &meta_path,
            mode == StoreMode::MultiProcess,
            key,
        )?;
        Ok(Store {
            registry_key: paths::registry_key(data_path),
            inner: Mutex::new(inner),
        })
    }

    /// Stores an already-encoded value under `key`.
    pub fn set_data(&self, key: &str, value: Vec<u8>) -> bool {
        self.inner.lock().set_data(key, value)
    }

    /// Returns a copy of the encoded value stored under `key`.
    #[must_use]
    pub fn get_data(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().get_data(key).map(<[u8]>::to_vec)
    }

    /// Runs `f` over the stored value without copying it out.
    pub(crate) fn with_data<R>(&self, key: &str, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.get_data(key).map(f)
    }

    /// True when `key` holds a live value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Number of live keys.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().count()
    }

    /// Current data-file size in bytes (a page multiple).
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.inner.lock().total_size()
    }

    /// Length of the live payload in bytes.
    #[must_use]
    pub fn actual_size(&self) -> usize {
        self.inner.lock().actual_size()
    }

    /// All live keys, in no particular order.
    #[must_use]
    pub fn all_keys(&self) -> Vec<String> {
        self.inner.lock().all_keys()
    }

    /// Removes `key`, appending a tombstone. Removing an absent key is a
    /// no-op.
    pub fn remove_value_for_key(&self, key: &str) -> bool {
        self.inner.lock().remove_data(key)
    }

    /// Removes several keys at once through a single compaction.
    pub fn remove_values_for_keys(&self, keys: &[&str]) {
        if keys.len() == 1 {
            self.remove_value_for_key(keys[0]);
            return;
        }
        self.inner.lock().remove_keys(keys);
    }

    /// Stored size of the value under `key`: with `actual` the payload
    /// behind its length prefix (when one is present), otherwise the full
    /// encoded length.
    #[must_use]
    pub fn value_size(&self, key: &str, actual: bool) -> usize {
        self.with_data(key, |data| {
            if actual {
                let mut input = Input::new(data);
                if let Ok(len) = input.read_int32() {
                    if len >= 0 {
                        #[allow(clippy::cast_sign_loss)]
                        let len = len as usize;
                        if varint32_size(len as i32) + len == data.len() {
                            return len;
                        }
                    }
                }
            }
            data.len()
        })
        .unwrap_or(0)
    }

    /// Copies the raw value bytes under `key` into `out`, unwrapping the
    /// length prefix when one is present. Returns the number of bytes
    /// copied, or `None` when the key is absent or `out` is too small.
    pub fn write_value_to_buffer(&self, key: &str, out: &mut [u8]) -> Option<usize> {
        self.with_data(key, |data| {
            let mut input = Input::new(data);
            if let Ok(len) = input.read_int32() {
                if len >= 0 {
                    #[allow(clippy::cast_sign_loss)]
                    let len = len as usize;
                    let offset = varint32_size(len as i32);
                    if offset + len == data.len() && len <= out.len() {
                        out[..len].copy_from_slice(&data[offset..offset + len]);
                        return Some(len);
                    }
                }
            }
            if data.len() <= out.len() {
                out[..data.len()].copy_from_slice(data);
                return Some(data.len());
            }
            None
        })
        .flatten()
    }

    /// Removes every key and shrinks the file back to one page.
    pub fn clear_all(&self) {
        self.inner.lock().clear_all();
    }

    /// Compacts and shrinks the file when it is more than twice the live
    /// payload. Idempotent.
    pub fn trim(&self) {
        self.inner.lock().trim();
    }

    /// Flushes the data and meta files. `SyncMode::Sync` blocks until the
    /// pages reach disk.
    pub fn sync(&self, mode: SyncMode) {
        self.inner.lock().sync(mode == SyncMode::Sync);
    }

    /// Re-encrypts the namespace under `new_key` (or decrypts it when
    /// `None`), rewriting the file so no byte of the old scheme survives.
    pub fn re_key(&self, new_key: Option<&[u8]>) -> bool {
        self.inner.lock().re_key(new_key)
    }

    /// Adopts key material changed by a sibling process without rewriting.
    pub fn check_re_set_crypt_key(&self, key: Option<&[u8]>) {
        self.inner.lock().check_re_set_crypt_key(key);
    }

    /// The active key material, if encryption is on.
    #[must_use]
    pub fn crypt_key(&self) -> Option<[u8; 16]> {
        self.inner.lock().crypt_key()
    }

    /// Re-checks the meta page for changes made by sibling processes.
    pub fn check_content_changed(&self) {
        let _ = self.inner.lock().check_load_data();
    }

    /// Drops this handle from the registry and releases its mappings. The
    /// files stay on disk; a later [`Store::open`] remounts them.
    pub fn close(&self) {
        info!("closing [{}]", self.registry_key);
        registry::instances().lock().remove(&self.registry_key);
        self.inner.lock().clear_memory_state();
    }

    /// Offline integrity check: recomputes the payload CRC of the namespace
    /// `id` under `root` and compares it with the meta file. A namespace
    /// that was never created passes.
    #[must_use]
    pub fn is_file_valid(root: impl AsRef<Path>, id: &str) -> bool {
        let Ok(data_path) = paths::data_path(root.as_ref(), id) else {
            return false;
        };
        if !data_path.exists() {
            return true;
        }
        let meta_path = paths::meta_path(&data_path);
        let Ok(meta_bytes) = std::fs::read(&meta_path) else {
            return false;
        };
        if meta_bytes.len() < META_LEN {
            return false;
        }
        let meta = MetaInfo::read(&meta_bytes);

        let Ok(file_data) = std::fs::read(&data_path) else {
            return false;
        };
        if file_data.len() < FIXED32_SIZE {
            return false;
        }
        let header = u32::from_le_bytes(
            file_data[..FIXED32_SIZE].try_into().unwrap_or_default(),
        );
        let actual_size = if meta.version >= VERSION_ACTUAL_SIZE {
            usize::try_from(meta.actual_size).unwrap_or(usize::MAX)
        } else {
            header as usize
        };
        if actual_size > file_data.len() - FIXED32_SIZE {
            return false;
        }
        let digest = crc32(0, &file_data[FIXED32_SIZE..FIXED32_SIZE + actual_size]);
        digest == meta.crc_digest
    }
}

/// Whether [`Store::sync`] blocks until the pages hit disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// msync synchronously.
    Sync,
    /// Schedule the writeback and return.
    Async,
}
