//! # Mailbox lock.
//!
//! A [`MboxLock`] owns a mailbox with exactly one slot. [`MboxLock::lock`]
//! sends an empty message into the slot, which blocks while another process
//! holds the lock; [`MboxLockGuard::unlock`] receives the message back,
//! letting the next blocked sender in.
//!
//! The lock is not reentrant and does not inherit priorities. The guard
//! must be released explicitly with [`MboxLockGuard::unlock`]; a guard that
//! is dropped while locked panics and reports where it was acquired.

use crate::kernel::Mailbox;
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

/// The lock could not be taken without sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldBlock;

/// A mutual exclusion primitive that sleeps while the lock is contended.
///
/// # Examples
///
/// ```ignore
/// let queue = MboxLock::new(kernel.mailbox(1), VecDeque::new());
///
/// let mut guard = queue.lock();
/// guard.push_back(request);
/// // the lock must be "explicitly" unlocked.
/// guard.unlock();
/// ```
pub struct MboxLock<T, M> {
    slot: M,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send, M: Mailbox<()>> Send for MboxLock<T, M> {}
unsafe impl<T: Send, M: Mailbox<()>> Sync for MboxLock<T, M> {}

impl<T, M: Mailbox<()>> MboxLock<T, M> {
    /// Creates a new lock around `t`.
    ///
    /// `slot` must be an empty mailbox with a single slot.
    pub fn new(slot: M, t: T) -> Self {
        MboxLock {
            slot,
            data: UnsafeCell::new(t),
        }
    }

    /// Acquires the lock, sleeping until it is able to do so.
    ///
    /// When the returned guard goes out of scope without
    /// [`MboxLockGuard::unlock`], panic occurs.
    #[track_caller]
    pub fn lock(&self) -> MboxLockGuard<'_, T, M> {
        self.slot.send(());
        MboxLockGuard {
            caller: core::panic::Location::caller(),
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Attempts to acquire the lock without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`WouldBlock`] if another process holds the lock.
    #[track_caller]
    pub fn try_lock(&self) -> Result<MboxLockGuard<'_, T, M>, WouldBlock> {
        self.slot.cond_send(()).map_err(|_| WouldBlock)?;
        Ok(MboxLockGuard {
            caller: core::panic::Location::caller(),
            lock: self,
            _not_send: PhantomData,
        })
    }
}

/// Scoped access to the data of a [`MboxLock`].
///
/// The lock must be explicitly unlocked by [`unlock`]; dropping a locked
/// guard panics.
///
/// [`unlock`]: Self::unlock
pub struct MboxLockGuard<'a, T, M: Mailbox<()>> {
    caller: &'static core::panic::Location<'static>,
    lock: &'a MboxLock<T, M>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: Sync, M: Mailbox<()>> Sync for MboxLockGuard<'_, T, M> {}

impl<T, M: Mailbox<()>> MboxLockGuard<'_, T, M> {
    /// Releases the underlying [`MboxLock`].
    pub fn unlock(self) {
        self.lock.slot.recv();
        core::mem::forget(self);
    }
}

impl<T, M: Mailbox<()>> Deref for MboxLockGuard<'_, T, M> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, M: Mailbox<()>> DerefMut for MboxLockGuard<'_, T, M> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, M: Mailbox<()>> Drop for MboxLockGuard<'_, T, M> {
    fn drop(&mut self) {
        panic!(
            "`.unlock()` must be explicitly called before dropping MboxLockGuard.
The lock is held at {:?}.",
            self.caller
        );
    }
}
