//! Memory-mapped file primitives.
//!
//! Each namespace owns two files: the data file (append log) and the meta
//! file (one page of commit state). Both are mapped shared so sibling
//! processes observe writes. Growth goes through `set_len` followed by a
//! remap; the old mapping stays installed if the remap fails, so a failed
//! grow never invalidates the engine's view.

pub mod lock;

#[cfg(test)]
mod file_tests;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;

use memmap2::MmapMut;
use tracing::error;

/// OS page size, cached after the first query.
#[must_use]
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        #[cfg(unix)]
        {
            // SAFETY: sysconf with a valid name has no preconditions.
            let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if sz > 0 {
                return sz as usize;
            }
        }
        4096
    })
}

/// Rounds `size` up to a positive multiple of the page size.
#[must_use]
pub fn round_to_page(size: usize) -> usize {
    let page = page_size();
    ((size / page) + 1) * page
}

/// A file kept open, sized to a page multiple, and mapped read-write shared.
pub struct MmapedFile {
    path: PathBuf,
    file: Arc<File>,
    map: MmapMut,
    size: usize,
}

impl MmapedFile {
    /// Opens or creates `path` and maps it. Files smaller than a page (or not
    /// page-aligned) are extended to the next page multiple; the extension
    /// reads back as zeroes.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let disk_len = file.metadata()?.len() as usize;
        let page = page_size();
        let size = if disk_len < page || disk_len % page != 0 {
            let target = round_to_page(disk_len);
            file.set_len(target as u64)?;
            target
        } else {
            disk_len
        };

        // SAFETY: the file is open read-write and set_len above guarantees
        // the mapping range is fully allocated.
        let map = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
            map,
            size,
        })
    }

    /// Absolute path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle to the underlying file (used for byte-range locks).
    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    /// Mapped length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// True when nothing is mapped (never the case for an open file).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Current on-disk length, which another process may have changed.
    pub fn disk_len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Read view of the mapping.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    /// Write view of the mapping.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Resizes the file to `new_size` bytes (a page multiple) and remaps.
    ///
    /// On failure the previous mapping and size stay in effect; growth
    /// extensions read back as zeroes.
    pub fn resize(&mut self, new_size: usize) -> io::Result<()> {
        debug_assert!(new_size > 0 && new_size % page_size() == 0);
        if new_size == self.size {
            return Ok(());
        }
        if let Err(err) = self.map.flush() {
            error!("failed to flush {} before resize: {err}", self.path.display());
        }
        self.file.set_len(new_size as u64)?;

        // SAFETY: set_len succeeded, so the new mapping range is allocated.
        match unsafe { MmapMut::map_mut(&*self.file) } {
            Ok(map) => {
                self.map = map;
                self.size = new_size;
                Ok(())
            }
            Err(err) => {
                error!(
                    "failed to remap {} at {new_size} bytes: {err}",
                    self.path.display()
                );
                Err(err)
            }
        }
    }

    /// Flushes the mapping to disk; `sync` selects msync-synchronous.
    pub fn flush(&self, sync: bool) -> io::Result<()> {
        if sync {
            self.map.flush()
        } else {
            self.map.flush_async()
        }
    }
}

/// The one-page meta file holding the serialized commit state.
pub struct MetaFile {
    inner: MmapedFile,
}

impl MetaFile {
    /// Opens or creates the meta file sized to exactly one page.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            inner: MmapedFile::open(path)?,
        })
    }

    /// Shared handle to the underlying file (the byte-range lock target).
    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        self.inner.file()
    }

    /// Read view of the meta page.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.inner.as_slice()
    }

    /// Write view of the meta page.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.inner.as_mut_slice()
    }

    /// Flushes the meta page; `sync` selects msync-synchronous.
    pub fn flush(&self, sync: bool) -> io::Result<()> {
        self.inner.flush(sync)
    }
}
