//! Spin lock for state that is touched from any process, such as the
//! console.
//!
//! The lock never sleeps, so the critical section passed to
//! [`SpinLock::with`] must not block.

use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, Ordering},
};
use crossbeam_utils::Backoff;

/// Busy-waiting mutual exclusion around a `T`.
///
/// ```
/// use abyss::spinlock::SpinLock;
///
/// let hits = SpinLock::new(0);
/// hits.with(|n| *n += 1);
/// assert_eq!(hits.with(|n| *n), 1);
/// ```
pub struct SpinLock<T> {
    held: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

/// Clears the flag even if the critical section panics.
struct Release<'a>(&'a AtomicBool);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> SpinLock<T> {
    /// Creates an unlocked spin lock.
    pub const fn new(data: T) -> Self {
        SpinLock {
            held: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Runs `f` with exclusive access to the data.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let backoff = Backoff::new();
        while self
            .held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
        let _release = Release(&self.held);
        // Safety: `held` was set by this call and is cleared by `_release`.
        f(unsafe { &mut *self.data.get() })
    }
}
