//! Track count discovery.
//!
//! The number of tracks of a unit is unknown until the driver's probe
//! completes. Processes asking before that register a [`GeometryWaiter`] and
//! sleep on its mailbox; the driver answers all of them with the same value
//! once the probe is done. The value never changes afterwards.

use crate::kernel::{Kernel, Mailbox, Pid};
use abyss::debug;
use alloc::{sync::Arc, vec::Vec};

/// A process waiting for the probe.
pub struct GeometryWaiter<K: Kernel> {
    /// The waiting process.
    pub pid: Pid,
    reply: Arc<K::Mailbox<usize>>,
}

impl<K: Kernel> GeometryWaiter<K> {
    /// Creates a waiter answered through `reply`.
    pub fn new(pid: Pid, reply: Arc<K::Mailbox<usize>>) -> Self {
        GeometryWaiter { pid, reply }
    }
}

/// Per-unit geometry state.
pub struct Geometry<K: Kernel> {
    tracks: Option<usize>,
    waiters: Vec<GeometryWaiter<K>>,
}

impl<K: Kernel> Default for Geometry<K> {
    fn default() -> Self {
        Geometry {
            tracks: None,
            waiters: Vec::new(),
        }
    }
}

impl<K: Kernel> Geometry<K> {
    /// The track count, if the probe has completed.
    pub fn tracks(&self) -> Option<usize> {
        self.tracks
    }

    /// Registers a process that waits for the probe.
    pub fn wait(&mut self, waiter: GeometryWaiter<K>) {
        self.waiters.push(waiter);
    }

    /// Records the probe result. Returns the waiters to answer.
    ///
    /// Only the first result is kept.
    pub fn resolve(&mut self, tracks: usize) -> (usize, Vec<GeometryWaiter<K>>) {
        let tracks = *self.tracks.get_or_insert(tracks);
        (tracks, core::mem::take(&mut self.waiters))
    }
}

/// Answers `waiters` with `tracks`.
pub fn notify<K: Kernel>(waiters: Vec<GeometryWaiter<K>>, tracks: usize) {
    for waiter in waiters {
        debug!("geometry: pid {} learns {} tracks", waiter.pid, tracks);
        waiter.reply.send(tracks);
    }
}
