//! Synchronization primitives for embedders distributing functions over
//! worker threads; the structuring core itself is single-threaded and
//! never touches these.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Test-and-set spinlock guarding a value
///
/// Every critical section in this crate is a handful of queue operations,
/// short enough that spinning beats parking a thread.
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// the lock provides the exclusion that &T over threads otherwise forbids
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> SpinLock<T> {
        SpinLock {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Spins until the lock is acquired and returns the releasing guard.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        while self.locked.swap(true, Ordering::Acquire) {
            std::hint::spin_loop();
        }
        SpinGuard { lock: self }
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// RAII guard of a [`SpinLock`]; releases on drop.
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // safety: the guard exists only while the lock is held
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // safety: as above, and &mut self forbids aliased guards
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Thread-safe FIFO work queue
///
/// Retrieval pops: there is no way to peek at the front element, because
/// under concurrency the peeked element could be gone by the next call.
pub struct SyncQueue<T> {
    inner: SpinLock<VecDeque<T>>,
}

impl<T> SyncQueue<T> {
    pub fn new() -> SyncQueue<T> {
        SyncQueue {
            inner: SpinLock::new(VecDeque::new()),
        }
    }

    /// Appends `value` at the back of the queue.
    pub fn push(&self, value: T) {
        self.inner.lock().push_back(value);
    }

    /// Removes and returns the front element, `None` when empty.
    pub fn pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<T> Default for SyncQueue<T> {
    fn default() -> SyncQueue<T> {
        SyncQueue::new()
    }
}
