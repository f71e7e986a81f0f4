// =============================================================================
// heapcraft — Reentrant Mutex
// =============================================================================
//
// A process-wide mutex that the *same* thread may lock multiple times
// without deadlocking. This is required because `resize` and
// `allocate_zeroed` call `allocate`/`release` internally while already
// holding the lock; a plain `std::sync::Mutex` would self-deadlock the
// first time that happened.
//
// HOW IT WORKS:
//   - An inner `Mutex<()>`-guarded `Owner` record tracks the owning
//     thread's `ThreadId` and a re-entry depth counter; a `Condvar` parks
//     threads that lose the race.
//   - `lock()` checks whether the calling thread already owns the mutex.
//     If so, it just bumps the depth counter and returns — no blocking.
//   - Otherwise it waits on the condvar until the mutex is unowned, then
//     claims it with depth 1.
//   - Dropping the guard decrements the depth; only when it reaches zero
//     is the mutex actually released and a waiter notified.
//
// WHY NOT `parking_lot::ReentrantMutex`?
//   That type hands out `&T`, not `&mut T`, so mutating the protected
//   heap state through it needs an extra `RefCell`/`Cell` layer. Rolling a
//   small depth-counted mutex keeps the safety argument in one place, the
//   same way the teacher's kernel rolls its own ticket spinlock rather
//   than reaching for a crate.
//
// BOOTSTRAPPING:
//   The original C allocator guarded lock construction with a racy
//   `lock_initialized` boolean, checked-then-set outside any lock — two
//   threads entering `allocate` for the first time at once could both
//   observe the flag unset and double-initialize the mutex. This type is
//   instead always constructed inside a `std::sync::OnceLock`
//   (`engine::heap()`), whose `get_or_init` is itself the one-shot
//   initialization primitive the spec's design notes call for.
// =============================================================================

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

/// A mutex that the holding thread may re-acquire without blocking.
///
/// # Type Parameter
/// - `T`: the data protected by the lock. Must be `Send` — ownership
///   effectively transfers between threads each time the lock changes
///   hands.
pub struct ReentrantMutex<T> {
    owner: Mutex<Owner>,
    available: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: `ReentrantMutex<T>` may be shared between threads as long as `T`
// can be sent between threads; the lock ensures only one logical holder
// (one thread, at any re-entry depth) accesses `T` at a time.
unsafe impl<T: Send> Send for ReentrantMutex<T> {}
unsafe impl<T: Send> Sync for ReentrantMutex<T> {}

impl<T> ReentrantMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            owner: Mutex::new(Owner {
                thread: None,
                depth: 0,
            }),
            available: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, blocking the calling thread if another thread
    /// currently holds it. If the calling thread already holds it, this
    /// re-enters for free and returns immediately.
    ///
    /// Returns a [`ReentrantMutexGuard`] that releases one level of
    /// re-entry (and, at depth zero, the lock itself) when dropped.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, T> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            match owner.thread {
                Some(holder) if holder == me => {
                    owner.depth += 1;
                    break;
                }
                None => {
                    owner.thread = Some(me);
                    owner.depth = 1;
                    break;
                }
                Some(_) => {
                    owner = self
                        .available
                        .wait(owner)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }

        ReentrantMutexGuard { lock: self }
    }
}

/// RAII guard for a held [`ReentrantMutex`]. Dereferences to `&T`/`&mut T`;
/// dropping it releases one level of re-entry.
pub struct ReentrantMutexGuard<'a, T> {
    lock: &'a ReentrantMutex<T>,
}

impl<T> Deref for ReentrantMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding the guard means our thread is the current owner,
        // and the owner has exclusive (possibly re-entrant, but always
        // single-threaded-at-a-time) access to the data.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for ReentrantMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Deref`.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for ReentrantMutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut owner = self.lock.owner.lock().unwrap_or_else(|e| e.into_inner());
        owner.depth -= 1;
        if owner.depth == 0 {
            owner.thread = None;
            drop(owner);
            self.lock.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reentrant_lock_does_not_deadlock_same_thread() {
        let lock = ReentrantMutex::new(0_i32);
        let outer = lock.lock();
        {
            let mut inner = lock.lock();
            *inner += 1;
        }
        assert_eq!(*outer, 1);
    }

    #[test]
    fn excludes_other_threads_until_released() {
        let lock = Arc::new(ReentrantMutex::new(0_i32));
        {
            let mut guard = lock.lock();
            *guard = 41;
        }

        let lock2 = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            let mut guard = lock2.lock();
            *guard += 1;
            *guard
        });
        assert_eq!(handle.join().unwrap(), 42);
    }
}
