#![forbid(unsafe_code)]
//! Single-writer, multiple-reader coordination for index access.
//!
//! The index itself never takes this lock. Callers wrap every mutation (`add_binding`,
//! `File::clear`, `File::add_names`, tree inserts and deletes) in a writer guard and every
//! query in a reader guard. Long write loops hand the writer guard to the core as a
//! [`YieldPoint`] so that waiting readers get a turn at safe points.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use tracing::trace;

/// A place where a long-running writer may temporarily give up the write lock.
pub trait YieldPoint {
    /// Lets waiting threads run if there are any; returns once the lock is held again.
    fn yield_point(&mut self);
}

/// A yield point that never yields, for callers owning the index exclusively.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoYield;

impl YieldPoint for NoYield {
    fn yield_point(&mut self) {}
}

/// Single-writer, multiple-reader lock coordinator.
#[derive(Clone, Default)]
pub struct IndexLock {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    lock: Arc<RwLock<()>>,
    readers: AtomicU32,
    writer_yields: AtomicU64,
}

/// Snapshot of lock state for observability.
#[derive(Default, Debug, Clone, Copy)]
pub struct LockSnapshot {
    /// Number of active readers.
    pub readers: u32,
    /// Whether the writer lock is held.
    pub writer: bool,
    /// Number of times writers yielded the lock.
    pub writer_yields: u64,
}

/// Guard representing a held reader lock.
pub struct ReaderGuard {
    inner: Arc<Inner>,
    _guard: ArcRwLockReadGuard<RawRwLock, ()>,
}

/// Guard representing the held writer lock.
pub struct WriterGuard {
    inner: Arc<Inner>,
    guard: ArcRwLockWriteGuard<RawRwLock, ()>,
}

impl IndexLock {
    /// Creates an unlocked coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a reader lock, blocking while a writer holds the lock.
    pub fn acquire_reader(&self) -> ReaderGuard {
        let guard = self.inner.lock.read_arc();
        self.inner.readers.fetch_add(1, Ordering::Relaxed);
        ReaderGuard {
            inner: Arc::clone(&self.inner),
            _guard: guard,
        }
    }

    /// Acquires the writer lock, blocking until all readers and any other writer are gone.
    pub fn acquire_writer(&self) -> WriterGuard {
        let guard = self.inner.lock.write_arc();
        WriterGuard {
            inner: Arc::clone(&self.inner),
            guard,
        }
    }

    /// Attempts to take the writer lock without blocking.
    pub fn try_acquire_writer(&self) -> Option<WriterGuard> {
        let guard = self.inner.lock.try_write_arc()?;
        Some(WriterGuard {
            inner: Arc::clone(&self.inner),
            guard,
        })
    }

    /// Returns a snapshot of the current lock state.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            readers: self.inner.readers.load(Ordering::Relaxed),
            writer: self.inner.lock.is_locked_exclusive(),
            writer_yields: self.inner.writer_yields.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.inner.readers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl YieldPoint for WriterGuard {
    fn yield_point(&mut self) {
        self.inner.writer_yields.fetch_add(1, Ordering::Relaxed);
        trace!("index_lock.writer.yield");
        ArcRwLockWriteGuard::bump(&mut self.guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn readers_share_and_writer_excludes() {
        let lock = IndexLock::new();
        let r1 = lock.acquire_reader();
        let r2 = lock.acquire_reader();
        assert_eq!(lock.snapshot().readers, 2);
        assert!(lock.try_acquire_writer().is_none());
        drop(r1);
        drop(r2);
        let writer = lock.try_acquire_writer().expect("writer available");
        assert!(lock.snapshot().writer);
        drop(writer);
        assert!(!lock.snapshot().writer);
    }

    #[test]
    fn yield_point_lets_a_waiting_reader_in() {
        let lock = IndexLock::new();
        let mut writer = lock.acquire_writer();
        let (tx, rx) = mpsc::channel();
        let reader_lock = lock.clone();
        let handle = thread::spawn(move || {
            let _guard = reader_lock.acquire_reader();
            tx.send(()).unwrap();
        });
        let mut observed = false;
        for _ in 0..200 {
            writer.yield_point();
            if rx.try_recv().is_ok() {
                observed = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        drop(writer);
        handle.join().unwrap();
        assert!(observed || rx.try_recv().is_ok());
        assert!(lock.snapshot().writer_yields >= 1);
    }
}
