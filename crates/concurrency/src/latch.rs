//! The writer latch
//!
//! A thin wrapper over `parking_lot::RwLock` naming the two access modes the
//! spec describes: [`WriterLatch::read`] for the shared-reader path,
//! [`WriterLatch::write`] for the exclusive writer path that covers index
//! update + EBF append + WAL intent as one critical section.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Guards engine state under the single-writer/multi-reader discipline.
pub struct WriterLatch<T> {
    inner: RwLock<T>,
}

impl<T> WriterLatch<T> {
    /// Wrap `value` behind the latch.
    pub fn new(value: T) -> Self {
        WriterLatch {
            inner: RwLock::new(value),
        }
    }

    /// Take the shared read latch, for index lookups and entity reads.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Take the exclusive write latch. The caller is expected to perform
    /// WAL append, EBF append and index update all while holding this guard
    /// before releasing it, so no reader ever observes an intermediate
    /// state.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }
}
