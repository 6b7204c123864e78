//! The kernel services the device layer is built on.
//!
//! The device layer does not schedule processes by itself. It borrows four
//! services from the kernel underneath:
//!
//! - bounded **mailboxes** ([`Mailbox`]), used both as the payload channel
//!   between callers and daemons and, with a single slot, as a lock;
//! - **parking**: [`Kernel::park_with`] puts the caller to sleep after
//!   handing a [`Unpark`] handle to a closure, and whoever holds the handle
//!   wakes it up later;
//! - **process creation** with [`Kernel::fork`], used to start the daemons;
//! - process identity with [`Kernel::getpid`], used for tracing.
//!
//! Together with [`Hardware`], these make up a [`Platform`].
//!
//! [`Hardware`]: abyss::dev::Hardware

use abyss::dev::Hardware;

/// Process identifier.
pub type Pid = u64;

/// A bounded, blocking message queue.
///
/// Messages are received in the order they were sent.
pub trait Mailbox<T>: Send + Sync {
    /// Sends `msg`, blocking while every slot is occupied.
    fn send(&self, msg: T);

    /// Receives the oldest message, blocking while the mailbox is empty.
    fn recv(&self) -> T;

    /// Sends `msg` only if a slot is free; gives it back otherwise.
    fn cond_send(&self, msg: T) -> Result<(), T>;

    /// Receives the oldest message only if one is present.
    fn cond_recv(&self) -> Option<T>;
}

/// A handle that wakes up a parked process.
pub trait Unpark: Send + 'static {
    /// Wakes up the process that produced this handle.
    ///
    /// The handle may be consumed before the process actually went to sleep;
    /// the wake-up must not be lost in that case.
    fn unpark(self);
}

/// Process and message services of the kernel.
pub trait Kernel: Send + Sync + 'static {
    /// Mailbox carrying messages of type `T`.
    type Mailbox<T: Send + 'static>: Mailbox<T> + 'static;

    /// Handle returned by [`Kernel::park_with`].
    type ParkHandle: Unpark;

    /// Creates a mailbox with `slots` slots.
    fn mailbox<T: Send + 'static>(&self, slots: usize) -> Self::Mailbox<T>;

    /// Identifier of the calling process.
    fn getpid(&self) -> Pid;

    /// Parks the calling process.
    ///
    /// `f` runs before the process sleeps and receives the handle that
    /// wakes it up.
    fn park_with(&self, f: impl FnOnce(Self::ParkHandle));

    /// Starts a new process running `f`.
    fn fork(&self, name: &str, f: impl FnOnce() + Send + 'static) -> Pid;
}

/// Everything the device layer needs from the machine below it.
pub trait Platform: Kernel + Hardware {}

impl<T: Kernel + Hardware> Platform for T {}
