//! Synchronization primitives of the device layer.
//!
//! Every queue shared between system-call handlers and a daemon is protected
//! by a [`MboxLock`], a lock built out of a single-slot [`Mailbox`]: taking
//! the lock fills the slot, releasing it drains the slot. Because a full
//! mailbox blocks its senders, a process that finds the lock taken sleeps
//! inside the kernel instead of spinning.
//!
//! [`Mailbox`]: crate::kernel::Mailbox
pub mod mbox_lock;

pub use mbox_lock::{MboxLock, MboxLockGuard, WouldBlock};
