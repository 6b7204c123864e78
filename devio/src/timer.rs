//! # Sleep timer.
//!
//! A process that calls [`SleepTimer::sleep`] is parked until the clock has
//! advanced by the requested number of seconds. The timer keeps the sleeping
//! processes in a wait list sorted by the tick on which they must wake, so a
//! clock interrupt only has to look at the front of the list.
//!
//! The sleep daemon ([`SleepTimer::daemon`]) owns the clock. On every clock
//! interrupt it advances the tick counter and releases, in wake-tick order,
//! every process whose tick has come:
//!
//! ```text
//!   tick 30:  [ 31:pid7 ]-[ 40:pid3 ]-[ 40:pid5 ]-[ 55:pid2 ]
//!   tick 40:  release pid7, pid3, pid5 (in this order)
//!             [ 55:pid2 ]
//! ```
//!
//! Processes with the same wake tick are released in the order they went to
//! sleep.

use crate::{
    kernel::{Pid, Platform, Unpark},
    sync::MboxLock,
};
use abyss::{DeviceType, debug, info};
use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU64, Ordering};
use crossbeam_utils::CachePadded;

/// A process waiting for its wake tick.
pub struct SleepWaiter<H> {
    /// The sleeping process.
    pub pid: Pid,
    /// Absolute tick at which the process must wake.
    pub wake_at: u64,
    /// Wakes the process.
    pub handle: H,
}

/// Inserts `waiter` after every waiter that wakes no later than it.
fn enqueue<H>(list: &mut VecDeque<SleepWaiter<H>>, waiter: SleepWaiter<H>) {
    let pos = list
        .iter()
        .position(|w| w.wake_at > waiter.wake_at)
        .unwrap_or(list.len());
    list.insert(pos, waiter);
}

/// Removes every waiter whose wake tick is `now` or earlier.
fn expire<H>(list: &mut VecDeque<SleepWaiter<H>>, now: u64) -> Vec<SleepWaiter<H>> {
    let mut expired = Vec::new();
    while list.front().is_some_and(|w| w.wake_at <= now) {
        if let Some(waiter) = list.pop_front() {
            expired.push(waiter);
        }
    }
    expired
}

/// The sleep timer manager.
pub struct SleepTimer<K: Platform> {
    kernel: Arc<K>,
    ticks: CachePadded<AtomicU64>,
    ticks_per_second: u64,
    waiters: MboxLock<VecDeque<SleepWaiter<K::ParkHandle>>, K::Mailbox<()>>,
}

impl<K: Platform> SleepTimer<K> {
    /// Creates a timer whose clock delivers `ticks_per_second` ticks per
    /// second.
    pub fn new(kernel: Arc<K>, ticks_per_second: u64) -> Self {
        let waiters = MboxLock::new(kernel.mailbox::<()>(1), VecDeque::new());
        SleepTimer {
            kernel,
            ticks: CachePadded::new(AtomicU64::new(0)),
            ticks_per_second,
            waiters,
        }
    }

    /// Number of clock ticks seen so far.
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Number of processes currently asleep.
    pub fn pending(&self) -> usize {
        let waiters = self.waiters.lock();
        let len = waiters.len();
        waiters.unlock();
        len
    }

    /// Parks the calling process for at least `seconds` seconds.
    ///
    /// A zero-second sleep lasts until the next tick.
    pub fn sleep(&self, seconds: u64) {
        let pid = self.kernel.getpid();
        let wake_at = self
            .now()
            .saturating_add(seconds.saturating_mul(self.ticks_per_second));
        debug!("sleep: pid {} sleeps until tick {}", pid, wake_at);
        self.kernel.park_with(|handle| {
            let mut waiters = self.waiters.lock();
            enqueue(
                &mut waiters,
                SleepWaiter {
                    pid,
                    wake_at,
                    handle,
                },
            );
            waiters.unlock();
        });
    }

    /// Body of the sleep daemon.
    ///
    /// Returns when the clock stops.
    pub fn daemon(self: Arc<Self>) {
        info!("sleep daemon started (pid {})", self.kernel.getpid());
        while self.kernel.wait_device(DeviceType::Clock, 0).is_ok() {
            let now = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            let mut waiters = self.waiters.lock();
            let expired = expire(&mut waiters, now);
            waiters.unlock();
            for waiter in expired {
                debug!("sleep: tick {} wakes pid {}", now, waiter.pid);
                waiter.handle.unpark();
            }
        }
    }
}
