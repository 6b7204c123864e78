//! # Disk scheduler.
//!
//! Every disk unit is served by one driver process. A disk can only do one
//! thing at a time: move its head to a track, or transfer a single sector
//! of the track under the head. A multi-sector read or write therefore turns
//! into a sequence of commands that the driver issues one by one, each
//! after the interrupt of the previous one:
//!
//! ```text
//!   read 20 sectors from track 1, sector 10:
//!     seek 1, read 1:10 .. read 1:15, seek 2, read 2:0 .. read 2:13
//! ```
//!
//! Processes that call [`DiskUnit::read`] or [`DiskUnit::write`] queue a
//! [`DiskRequest`] in the unit's [`RequestQueue`] and sleep on the request's
//! reply mailbox. The queue is ordered as a one-directional scan, so the head
//! sweeps towards higher tracks and requests behind it wait for the next
//! sweep.
//!
//! The request at the front of the queue is the one being served. The
//! driver moves it along on every interrupt:
//!
//! 1. not started: seek to its track;
//! 2. sectors left: seek to the next track if the current one is exhausted,
//!    otherwise transfer the next sector;
//! 3. all sectors transferred, or the device reported an error: remove it,
//!    hand the result back and start the next request right away.
//!
//! Nothing is retried. An error abandons the remaining sectors of the
//! request in service only.
//!
//! The driver begins its life with a geometry probe (see [`geometry`]). A
//! process that finds the queue empty has to wake the driver up, since no
//! interrupt is pending; it does so with a harmless track-count command, but
//! only after the probe finished, so that the unit never has two commands
//! in flight.

pub mod geometry;
pub mod queue;

use crate::{
    KernelError,
    kernel::{Mailbox, Platform},
    sync::MboxLock,
};
use abyss::{
    DevStatus, DeviceError, DeviceType, debug,
    dev::disk::{DiskCommand, SECTOR_SIZE, SectorBuf, TRACK_SIZE},
    info, warning,
};
use alloc::{boxed::Box, sync::Arc, vec, vec::Vec};
use geometry::{Geometry, GeometryWaiter};
pub use queue::{Completion, DiskRequest, Operation, RequestQueue};

/// Geometry of a disk unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSize {
    /// Bytes per sector.
    pub sector_size: usize,
    /// Sectors per track.
    pub track_size: usize,
    /// Number of tracks.
    pub tracks: usize,
}

/// What the driver does with the head of the queue after an interrupt.
enum Verdict {
    Idle,
    Step,
    Finish(u32),
}

/// A disk unit and its queue.
pub struct DiskUnit<K: Platform> {
    unit: usize,
    kernel: Arc<K>,
    queue: MboxLock<RequestQueue<Box<DiskRequest<K>>>, K::Mailbox<()>>,
    geometry: MboxLock<Geometry<K>, K::Mailbox<()>>,
}

impl<K: Platform> DiskUnit<K> {
    /// Creates the state of disk `unit`.
    pub fn new(kernel: Arc<K>, unit: usize) -> Self {
        DiskUnit {
            unit,
            queue: MboxLock::new(kernel.mailbox::<()>(1), RequestQueue::default()),
            geometry: MboxLock::new(kernel.mailbox::<()>(1), Geometry::default()),
            kernel,
        }
    }

    /// Unit number.
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Number of requests queued, including the one in service.
    pub fn pending(&self) -> usize {
        let queue = self.queue.lock();
        let len = queue.len();
        queue.unlock();
        len
    }

    /// Number of tracks of the unit.
    ///
    /// Sleeps until the geometry probe has completed.
    pub fn tracks(&self) -> usize {
        let mut geometry = self.geometry.lock();
        if let Some(tracks) = geometry.tracks() {
            geometry.unlock();
            return tracks;
        }
        let pid = self.kernel.getpid();
        let reply = Arc::new(self.kernel.mailbox::<usize>(1));
        geometry.wait(GeometryWaiter::new(pid, reply.clone()));
        geometry.unlock();
        debug!("disk{}: pid {} waits for the geometry probe", self.unit, pid);
        reply.recv()
    }

    /// Geometry of the unit.
    pub fn size(&self) -> DiskSize {
        DiskSize {
            sector_size: SECTOR_SIZE,
            track_size: TRACK_SIZE,
            tracks: self.tracks(),
        }
    }

    /// Checks that a transfer of `count` sectors fits on the unit.
    ///
    /// Sleeps until the geometry probe has completed.
    pub fn check_count(&self, count: usize) -> Result<(), KernelError> {
        if count > self.tracks().saturating_mul(TRACK_SIZE) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }

    /// Reads `count` sectors starting at `block` of `track`.
    pub fn read(&self, count: usize, track: usize, block: usize) -> Result<Completion, KernelError> {
        self.check_count(count)?;
        self.submit(Operation::Read, vec![[0; SECTOR_SIZE]; count], track, block)
    }

    /// Writes `sectors` starting at `block` of `track`.
    pub fn write(
        &self,
        sectors: Vec<SectorBuf>,
        track: usize,
        block: usize,
    ) -> Result<Completion, KernelError> {
        self.check_count(sectors.len())?;
        self.submit(Operation::Write, sectors, track, block)
    }

    fn submit(
        &self,
        op: Operation,
        sectors: Vec<SectorBuf>,
        track: usize,
        block: usize,
    ) -> Result<Completion, KernelError> {
        if block >= TRACK_SIZE {
            return Err(KernelError::InvalidArgument);
        }
        let pid = self.kernel.getpid();
        let reply = Arc::new(self.kernel.mailbox::<Completion>(1));
        debug!(
            "disk{}: pid {} queues {:?} of {} sectors at {}:{}",
            self.unit,
            pid,
            op,
            sectors.len(),
            track,
            block
        );
        let request = DiskRequest::new(pid, op, sectors, track, block, reply.clone());

        let mut queue = self.queue.lock();
        let idle = queue.insert(Box::new(request));
        queue.unlock();

        if idle {
            self.kick();
        }
        Ok(reply.recv())
    }

    /// Wakes up an idle driver to serve a request that just became the head.
    fn kick(&self) {
        // The probe must not share the unit with the wake-up command.
        self.tracks();
        // The count is stored on issue, so the local outlives its use.
        let mut tracks = 0;
        if let Err(e) = self
            .kernel
            .disk_output(self.unit, DiskCommand::Tracks { out: &mut tracks })
        {
            warning!("disk{}: cannot wake the driver: {}", self.unit, e);
            let mut queue = self.queue.lock();
            let head = if queue.front().is_some_and(|head| !head.started) {
                queue.pop_front()
            } else {
                None
            };
            queue.unlock();
            if let Some(head) = head {
                head.complete(DevStatus::Error.into());
            }
        }
    }

    /// Issues the next command of `req`.
    fn step(&self, req: &mut DiskRequest<K>) -> Result<(), DeviceError> {
        if !req.started {
            req.started = true;
            debug!("disk{}: seek to track {}", self.unit, req.track);
            return self
                .kernel
                .disk_output(self.unit, DiskCommand::Seek { track: req.track });
        }
        if req.block >= TRACK_SIZE {
            req.track += 1;
            req.block = 0;
            debug!("disk{}: seek to track {}", self.unit, req.track);
            return self
                .kernel
                .disk_output(self.unit, DiskCommand::Seek { track: req.track });
        }
        let sector = req.block;
        let buf = &mut req.sectors[req.completed];
        let cmd = match req.op {
            Operation::Read => DiskCommand::Read { sector, buf },
            Operation::Write => DiskCommand::Write { sector, buf },
        };
        self.kernel.disk_output(self.unit, cmd)?;
        req.completed += 1;
        req.block += 1;
        Ok(())
    }

    fn verdict(req: Option<&Box<DiskRequest<K>>>, status: u32) -> Verdict {
        match req {
            None => Verdict::Idle,
            Some(req) if !req.started => Verdict::Step,
            Some(_) if DevStatus::from_word(status) != DevStatus::Ready => Verdict::Finish(status),
            Some(req) if req.is_done() => Verdict::Finish(status),
            Some(_) => Verdict::Step,
        }
    }

    fn probe(&self) -> Result<usize, DeviceError> {
        let mut tracks = 0;
        self.kernel
            .disk_output(self.unit, DiskCommand::Tracks { out: &mut tracks })?;
        let status = self.kernel.wait_device(DeviceType::Disk, self.unit)?;
        if DevStatus::from_word(status) != DevStatus::Ready {
            warning!("disk{}: geometry probe failed with {}", self.unit, status);
            return Ok(0);
        }
        Ok(tracks)
    }

    fn publish_geometry(&self, tracks: usize) {
        let mut geometry = self.geometry.lock();
        let (tracks, waiters) = geometry.resolve(tracks);
        geometry.unlock();
        info!("disk{}: {} tracks", self.unit, tracks);
        geometry::notify(waiters, tracks);
    }

    /// Body of the driver process of the unit.
    ///
    /// Returns when the machine halts.
    pub fn daemon(self: Arc<Self>) {
        info!("disk{}: driver started (pid {})", self.unit, self.kernel.getpid());
        match self.probe() {
            Ok(tracks) => self.publish_geometry(tracks),
            Err(e) => {
                warning!("disk{}: geometry probe: {}", self.unit, e);
                self.publish_geometry(0);
                return;
            }
        }

        while let Ok(status) = self.kernel.wait_device(DeviceType::Disk, self.unit) {
            let mut finished = Vec::new();
            let mut queue = self.queue.lock();
            let mut verdict = Self::verdict(queue.front(), status);
            loop {
                match verdict {
                    Verdict::Idle => break,
                    Verdict::Finish(status) => {
                        if let Some(req) = queue.pop_front() {
                            finished.push((req, status));
                        }
                        verdict = if queue.is_empty() {
                            Verdict::Idle
                        } else {
                            Verdict::Step
                        };
                    }
                    Verdict::Step => {
                        let Some(head) = queue.front_mut() else {
                            break;
                        };
                        match self.step(head) {
                            Ok(()) => break,
                            Err(e) => {
                                warning!("disk{}: command refused: {}", self.unit, e);
                                verdict = Verdict::Finish(DevStatus::Error.into());
                            }
                        }
                    }
                }
            }
            queue.unlock();

            for (req, status) in finished {
                debug!(
                    "disk{}: pid {} done with status {} after {} sectors",
                    self.unit, req.pid, status, req.completed
                );
                req.complete(status);
            }
        }
    }
}
