//! Recursive advisory byte-range lock shared between processes.
//!
//! One lock per namespace, taken on the meta file. Two counters track
//! reentrancy from the owning process; the OS-level lock is touched only on
//! transitions from zero. Upgrading shared → exclusive cannot be done
//! atomically with POSIX record locks, so the shared lock is dropped first
//! and the exclusive lock taken afterwards; releasing the last exclusive
//! claim downgrades back to shared when shared claims remain.

use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::error;

/// Lock flavor: many readers or one writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    /// Concurrent with other shared holders; excludes writers.
    Shared,
    /// Excludes every other holder across processes.
    Exclusive,
}

struct LockInner {
    file: Arc<File>,
    enabled: bool,
    shared_count: AtomicU32,
    exclusive_count: AtomicU32,
}

/// Process-wide recursive file lock handle. Cloning shares the counters.
#[derive(Clone)]
pub struct FileLock {
    inner: Arc<LockInner>,
}

impl FileLock {
    /// Wraps the lock target. With `enabled` false every operation is a
    /// no-op; single-process stores skip the syscalls entirely.
    #[must_use]
    pub fn new(file: Arc<File>, enabled: bool) -> Self {
        Self {
            inner: Arc::new(LockInner {
                file,
                enabled,
                shared_count: AtomicU32::new(0),
                exclusive_count: AtomicU32::new(0),
            }),
        }
    }

    /// Acquires the lock and returns a guard releasing it on drop.
    ///
    /// The caller must already hold the engine's thread lock; the counters
    /// are not an independent synchronization point.
    #[must_use]
    pub fn acquire(&self, kind: LockType) -> LockGuard {
        self.lock(kind);
        LockGuard {
            lock: self.clone(),
            kind,
        }
    }

    fn lock(&self, kind: LockType) {
        if !self.inner.enabled {
            return;
        }
        let shared = &self.inner.shared_count;
        let exclusive = &self.inner.exclusive_count;
        let mut drop_shared_first = false;

        match kind {
            LockType::Shared => {
                let prev = shared.fetch_add(1, Ordering::Relaxed);
                // never let a shared claim disturb a lock we already hold
                if prev > 0 || exclusive.load(Ordering::Relaxed) > 0 {
                    return;
                }
            }
            LockType::Exclusive => {
                let prev = exclusive.fetch_add(1, Ordering::Relaxed);
                if prev > 0 {
                    return;
                }
                if shared.load(Ordering::Relaxed) > 0 {
                    drop_shared_first = true;
                }
            }
        }

        if drop_shared_first {
            // POSIX record locks upgrade only through release; funnel the
            // race into one drop-then-escalate step
            if let Err(err) = self.os_unlock() {
                error!("failed to release shared lock before upgrade: {err}");
            }
        }
        if let Err(err) = self.os_lock(kind) {
            error!("failed to take {kind:?} file lock: {err}");
        }
    }

    fn unlock(&self, kind: LockType) {
        if !self.inner.enabled {
            return;
        }
        let shared = &self.inner.shared_count;
        let exclusive = &self.inner.exclusive_count;
        let mut downgrade_to_shared = false;

        match kind {
            LockType::Shared => {
                if shared.load(Ordering::Relaxed) == 0 {
                    return;
                }
                let now = shared.fetch_sub(1, Ordering::Relaxed) - 1;
                if now > 0 || exclusive.load(Ordering::Relaxed) > 0 {
                    return;
                }
            }
            LockType::Exclusive => {
                if exclusive.load(Ordering::Relaxed) == 0 {
                    return;
                }
                let now = exclusive.fetch_sub(1, Ordering::Relaxed) - 1;
                if now > 0 {
                    return;
                }
                if shared.load(Ordering::Relaxed) > 0 {
                    downgrade_to_shared = true;
                }
            }
        }

        if downgrade_to_shared {
            // setting a read lock over the held range downgrades in place
            if let Err(err) = self.os_lock(LockType::Shared) {
                error!("failed to downgrade to shared lock: {err}");
            }
        } else if let Err(err) = self.os_unlock() {
            error!("failed to release file lock: {err}");
        }
    }

    #[cfg(unix)]
    fn os_lock(&self, kind: LockType) -> io::Result<()> {
        let lock_type = match kind {
            LockType::Shared => libc::F_RDLCK,
            LockType::Exclusive => libc::F_WRLCK,
        };
        fcntl_byte_range(&self.inner.file, lock_type as _)
    }

    #[cfg(unix)]
    fn os_unlock(&self) -> io::Result<()> {
        fcntl_byte_range(&self.inner.file, libc::F_UNLCK as _)
    }

    #[cfg(not(unix))]
    fn os_lock(&self, _kind: LockType) -> io::Result<()> {
        Ok(())
    }

    #[cfg(not(unix))]
    fn os_unlock(&self) -> io::Result<()> {
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn counts(&self) -> (u32, u32) {
        (
            self.inner.shared_count.load(Ordering::Relaxed),
            self.inner.exclusive_count.load(Ordering::Relaxed),
        )
    }
}

#[cfg(unix)]
fn fcntl_byte_range(file: &File, lock_type: libc::c_short) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: zeroed flock is a valid all-defaults value.
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = lock_type;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = 0;
    fl.l_len = 1;
    loop {
        // SAFETY: fd is owned by `file` and stays open for the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLKW, &fl) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// RAII release for [`FileLock::acquire`].
pub struct LockGuard {
    lock: FileLock,
    kind: LockType,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.lock.unlock(self.kind);
    }
}
