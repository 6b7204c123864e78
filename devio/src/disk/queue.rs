//! Pending requests of a disk unit.
//!
//! The queue is ordered so that the head sweeps towards higher tracks. The
//! request at the front is the one being served and never moves. A newcomer
//! whose track lies behind the head waits for the next sweep: it skips the
//! ascending run that starts at the head before looking for its place.
//!
//! ```text
//!   queue: [5*] 7 9 | 2 3        (* in service)
//!   + 6 -> [5*] 6 7 9 | 2 3
//!   + 1 -> [5*] 6 7 9 | 1 2 3
//!   + 8 -> [5*] 6 7 8 9 | 1 2 3
//! ```
//!
//! Requests on the same track are served in arrival order.

use crate::kernel::{Kernel, Mailbox, Pid};
use abyss::dev::disk::SectorBuf;
use alloc::{boxed::Box, collections::VecDeque, sync::Arc, vec::Vec};

/// Anything that sits on a track.
pub trait Seekable {
    /// Track the item is waiting for.
    fn track(&self) -> usize;
}

impl Seekable for usize {
    fn track(&self) -> usize {
        *self
    }
}

impl<T: Seekable> Seekable for Box<T> {
    fn track(&self) -> usize {
        (**self).track()
    }
}

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Disk to memory.
    Read,
    /// Memory to disk.
    Write,
}

/// Result of a request, handed back to the issuing process.
#[derive(Debug)]
pub struct Completion {
    /// The sector buffers of the request.
    pub sectors: Vec<SectorBuf>,
    /// Device status of the last command: 0 on success.
    pub status: u32,
}

impl Completion {
    /// Whether every sector was transferred.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// A multi-sector transfer waiting in (or at the front of) the queue.
pub struct DiskRequest<K: Kernel> {
    /// Issuing process.
    pub pid: Pid,
    /// Direction.
    pub op: Operation,
    /// One buffer per sector.
    pub sectors: Vec<SectorBuf>,
    /// Track the head has to be on for the next transfer.
    pub track: usize,
    /// Sector within `track` of the next transfer.
    pub block: usize,
    /// Number of sectors already transferred.
    pub completed: usize,
    /// Whether the driver has begun to serve the request.
    pub started: bool,
    reply: Arc<K::Mailbox<Completion>>,
}

impl<K: Kernel> DiskRequest<K> {
    /// Creates a request; the result is delivered into `reply`.
    pub fn new(
        pid: Pid,
        op: Operation,
        sectors: Vec<SectorBuf>,
        track: usize,
        block: usize,
        reply: Arc<K::Mailbox<Completion>>,
    ) -> Self {
        DiskRequest {
            pid,
            op,
            sectors,
            track,
            block,
            completed: 0,
            started: false,
            reply,
        }
    }

    /// Whether every sector has been transferred.
    pub fn is_done(&self) -> bool {
        self.completed == self.sectors.len()
    }

    /// Hands the result to the issuing process.
    pub fn complete(self, status: u32) {
        let DiskRequest { sectors, reply, .. } = self;
        reply.send(Completion { sectors, status });
    }
}

impl<K: Kernel> Seekable for DiskRequest<K> {
    fn track(&self) -> usize {
        self.track
    }
}

/// Scan-ordered queue of pending requests.
pub struct RequestQueue<R> {
    inner: VecDeque<R>,
}

impl<R> Default for RequestQueue<R> {
    fn default() -> Self {
        RequestQueue {
            inner: VecDeque::new(),
        }
    }
}

impl<R: Seekable> RequestQueue<R> {
    /// Queues `req`. Returns `true` if the queue was empty, in which case
    /// `req` is the new head and nobody is serving it yet.
    pub fn insert(&mut self, req: R) -> bool {
        let Some(head) = self.inner.front() else {
            self.inner.push_back(req);
            return true;
        };
        let track = req.track();
        let mut at = 0;
        if track < head.track() {
            while at + 1 < self.inner.len()
                && self.inner[at].track() <= self.inner[at + 1].track()
            {
                at += 1;
            }
        }
        while at + 1 < self.inner.len() && self.inner[at + 1].track() <= track {
            at += 1;
        }
        self.inner.insert(at + 1, req);
        false
    }

    /// The request in service.
    pub fn front(&self) -> Option<&R> {
        self.inner.front()
    }

    /// The request in service.
    pub fn front_mut(&mut self) -> Option<&mut R> {
        self.inner.front_mut()
    }

    /// Removes the request in service.
    pub fn pop_front(&mut self) -> Option<R> {
        self.inner.pop_front()
    }

    /// Number of queued requests, including the one in service.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Tracks in service order.
    pub fn tracks(&self) -> impl Iterator<Item = usize> + '_ {
        self.inner.iter().map(Seekable::track)
    }
}
