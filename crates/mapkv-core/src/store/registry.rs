//! Process-wide ambient state: the handle registry, the default root
//! directory, and the corruption-recovery handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::info;

use super::Store;
use crate::error::{CorruptKind, RecoverStrategy, Result};
use crate::file::page_size;

/// Callback consulted when a namespace fails validation on load.
pub type RecoverHandler = dyn Fn(&str, CorruptKind) -> RecoverStrategy + Send + Sync;

static INSTANCES: OnceLock<Mutex<FxHashMap<String, Arc<Store>>>> = OnceLock::new();
static DEFAULT_ROOT: Mutex<Option<PathBuf>> = Mutex::new(None);
static RECOVER_HANDLER: Mutex<Option<Box<RecoverHandler>>> = Mutex::new(None);

/// One live handle per resolved data path, for the lifetime of the process.
pub(crate) fn instances() -> &'static Mutex<FxHashMap<String, Arc<Store>>> {
    INSTANCES.get_or_init(|| {
        info!("page size: {}", page_size());
        Mutex::new(FxHashMap::default())
    })
}

/// Records `root` as the default root directory and creates it.
pub(crate) fn initialize(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)?;
    *DEFAULT_ROOT.lock() = Some(root.to_path_buf());
    info!("root dir: {}", root.display());
    Ok(())
}

/// The root recorded by [`initialize`], if any.
pub(crate) fn default_root() -> Option<PathBuf> {
    DEFAULT_ROOT.lock().clone()
}

/// Installs the corruption-recovery handler.
pub(crate) fn register_recover_handler(handler: Box<RecoverHandler>) {
    *RECOVER_HANDLER.lock() = Some(handler);
}

/// Removes the corruption-recovery handler; the default policy (discard)
/// applies again.
pub(crate) fn unregister_recover_handler() {
    *RECOVER_HANDLER.lock() = None;
}

/// Asks the registered handler what to do about a corrupt namespace.
pub(crate) fn recover_strategy(id: &str, kind: CorruptKind) -> RecoverStrategy {
    let handler = RECOVER_HANDLER.lock();
    match handler.as_ref() {
        Some(handler) => handler(id, kind),
        None => RecoverStrategy::Discard,
    }
}
