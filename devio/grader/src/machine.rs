//! A simulated machine.
//!
//! Processes are host threads; mailboxes are [`ArrayQueue`]s guarded by a
//! condition variable; devices are plain state machines that produce their
//! interrupts synchronously when a command is issued. The clock only ticks
//! when a test calls [`Machine::tick`], and the disks can be held back with
//! [`Machine::hold_disk`], so every test decides when things happen.

use abyss::{
    DevStatus, DeviceError, DeviceType, Hardware,
    dev::{
        disk::{DISK_UNITS, DiskCommand, SECTOR_SIZE, TRACK_SIZE},
        terminal::{TERM_UNITS, TermControl, TermStatus},
    },
};
use crossbeam_queue::ArrayQueue;
use devio::kernel::{Kernel, Mailbox, Pid, Unpark};
use std::{
    cell::Cell,
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn wait<'a, T>(cv: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    cv.wait(guard).unwrap_or_else(|e| e.into_inner())
}

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static PID: Cell<Option<Pid>> = const { Cell::new(None) };
}

fn current_pid() -> Pid {
    PID.with(|pid| match pid.get() {
        Some(pid) => pid,
        None => {
            let new = NEXT_PID.fetch_add(1, Ordering::SeqCst);
            pid.set(Some(new));
            new
        }
    })
}

/// A mailbox of the simulated kernel.
pub struct SimMailbox<T> {
    slots: ArrayQueue<T>,
    lock: Mutex<()>,
    cv: Condvar,
}

impl<T> SimMailbox<T> {
    fn new(slots: usize) -> Self {
        SimMailbox {
            slots: ArrayQueue::new(slots.max(1)),
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }
}

impl<T: Send> Mailbox<T> for SimMailbox<T> {
    fn send(&self, mut msg: T) {
        let mut guard = lock(&self.lock);
        loop {
            match self.slots.push(msg) {
                Ok(()) => break,
                Err(back) => {
                    msg = back;
                    guard = wait(&self.cv, guard);
                }
            }
        }
        drop(guard);
        self.cv.notify_all();
    }

    fn recv(&self) -> T {
        let mut guard = lock(&self.lock);
        let msg = loop {
            match self.slots.pop() {
                Some(msg) => break msg,
                None => guard = wait(&self.cv, guard),
            }
        };
        drop(guard);
        self.cv.notify_all();
        msg
    }

    fn cond_send(&self, msg: T) -> Result<(), T> {
        let guard = lock(&self.lock);
        let result = self.slots.push(msg);
        drop(guard);
        if result.is_ok() {
            self.cv.notify_all();
        }
        result
    }

    fn cond_recv(&self) -> Option<T> {
        let guard = lock(&self.lock);
        let msg = self.slots.pop();
        drop(guard);
        if msg.is_some() {
            self.cv.notify_all();
        }
        msg
    }
}

/// Wakes up a process parked by [`Machine::park_with`].
pub struct SimParkHandle {
    token: Arc<(Mutex<bool>, Condvar)>,
}

impl Unpark for SimParkHandle {
    fn unpark(self) {
        let (woken, cv) = &*self.token;
        *lock(woken) = true;
        cv.notify_all();
    }
}

/// A command the simulated disk executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOp {
    /// Head moved to a track.
    Seek(usize),
    /// A sector was read.
    Read {
        /// Track under the head.
        track: usize,
        /// Sector within the track.
        sector: usize,
    },
    /// A sector was written.
    Write {
        /// Track under the head.
        track: usize,
        /// Sector within the track.
        sector: usize,
    },
    /// The track count was queried.
    Tracks,
}

impl DiskOp {
    /// Whether the command moved data.
    pub fn is_transfer(&self) -> bool {
        matches!(self, DiskOp::Read { .. } | DiskOp::Write { .. })
    }
}

struct Device<S> {
    state: Mutex<S>,
    cv: Condvar,
}

impl<S> Device<S> {
    fn new(state: S) -> Self {
        Device {
            state: Mutex::new(state),
            cv: Condvar::new(),
        }
    }
}

struct DiskState {
    tracks: usize,
    image: Vec<u8>,
    head: usize,
    log: Vec<DiskOp>,
    interrupts: VecDeque<u32>,
    outstanding: bool,
    overlaps: usize,
    held: bool,
    fault_in: Option<usize>,
}

impl DiskState {
    fn new(tracks: usize) -> Self {
        DiskState {
            tracks,
            image: vec![0; tracks * TRACK_SIZE * SECTOR_SIZE],
            head: 0,
            log: Vec::new(),
            interrupts: VecDeque::new(),
            outstanding: false,
            overlaps: 0,
            held: false,
            fault_in: None,
        }
    }

    fn faulted(&mut self) -> bool {
        match self.fault_in {
            Some(0) => {
                self.fault_in = None;
                true
            }
            Some(n) => {
                self.fault_in = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn offset(&self, sector: usize) -> usize {
        (self.head * TRACK_SIZE + sector) * SECTOR_SIZE
    }

    fn execute(&mut self, cmd: DiskCommand<'_>) -> DevStatus {
        match cmd {
            DiskCommand::Seek { track } => {
                self.log.push(DiskOp::Seek(track));
                if track >= self.tracks {
                    return DevStatus::Error;
                }
                self.head = track;
            }
            DiskCommand::Read { sector, buf } => {
                self.log.push(DiskOp::Read {
                    track: self.head,
                    sector,
                });
                if self.faulted() || sector >= TRACK_SIZE {
                    return DevStatus::Error;
                }
                let at = self.offset(sector);
                buf.copy_from_slice(&self.image[at..at + SECTOR_SIZE]);
            }
            DiskCommand::Write { sector, buf } => {
                self.log.push(DiskOp::Write {
                    track: self.head,
                    sector,
                });
                if self.faulted() || sector >= TRACK_SIZE {
                    return DevStatus::Error;
                }
                let at = self.offset(sector);
                self.image[at..at + SECTOR_SIZE].copy_from_slice(buf);
            }
            DiskCommand::Tracks { out } => {
                self.log.push(DiskOp::Tracks);
                *out = self.tracks;
            }
        }
        DevStatus::Ready
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Xmit {
    Idle,
    Sending,
    Draining,
}

struct TermState {
    input: VecDeque<u8>,
    output: Vec<u8>,
    recv_int: bool,
    xmit_int: bool,
    xmit: Xmit,
}

/// The simulated machine: kernel services plus devices.
pub struct Machine {
    halted: AtomicBool,
    clock: Device<u64>,
    disks: Vec<Device<DiskState>>,
    terminals: Vec<Device<TermState>>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// Tracks of each disk of [`Machine::new`].
    pub const DEFAULT_TRACKS: usize = 16;

    /// A machine whose disks have [`Machine::DEFAULT_TRACKS`] tracks.
    pub fn new() -> Self {
        Self::with_tracks([Self::DEFAULT_TRACKS; DISK_UNITS])
    }

    /// A machine whose disk `i` has `tracks[i]` tracks.
    pub fn with_tracks(tracks: [usize; DISK_UNITS]) -> Self {
        Machine {
            halted: AtomicBool::new(false),
            clock: Device::new(0),
            disks: tracks
                .iter()
                .map(|&tracks| Device::new(DiskState::new(tracks)))
                .collect(),
            terminals: (0..TERM_UNITS)
                .map(|_| {
                    Device::new(TermState {
                        input: VecDeque::new(),
                        output: Vec::new(),
                        recv_int: false,
                        xmit_int: false,
                        xmit: Xmit::Idle,
                    })
                })
                .collect(),
        }
    }

    /// Stops every device; daemons return from their loops.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        let clock = lock(&self.clock.state);
        self.clock.cv.notify_all();
        drop(clock);
        for disk in self.disks.iter() {
            let state = lock(&disk.state);
            disk.cv.notify_all();
            drop(state);
        }
        for term in self.terminals.iter() {
            let state = lock(&term.state);
            term.cv.notify_all();
            drop(state);
        }
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Raises one clock interrupt.
    pub fn tick(&self) {
        *lock(&self.clock.state) += 1;
        self.clock.cv.notify_all();
    }

    fn disk(&self, unit: usize) -> &Device<DiskState> {
        &self.disks[unit]
    }

    /// Withholds the interrupts of disk `unit` until [`Machine::release_disk`].
    pub fn hold_disk(&self, unit: usize) {
        lock(&self.disk(unit).state).held = true;
    }

    /// Delivers the interrupts of disk `unit` again.
    pub fn release_disk(&self, unit: usize) {
        let disk = self.disk(unit);
        lock(&disk.state).held = false;
        disk.cv.notify_all();
    }

    /// Makes the sector transfer that follows the next `after` transfers of
    /// disk `unit` fail.
    pub fn fail_transfer_after(&self, unit: usize, after: usize) {
        lock(&self.disk(unit).state).fault_in = Some(after);
    }

    /// Commands disk `unit` executed so far.
    pub fn disk_log(&self, unit: usize) -> Vec<DiskOp> {
        lock(&self.disk(unit).state).log.clone()
    }

    /// Number of commands disk `unit` refused because another one was in
    /// flight.
    pub fn disk_overlaps(&self, unit: usize) -> usize {
        lock(&self.disk(unit).state).overlaps
    }

    /// Contents of `sector` of `track` on disk `unit`.
    pub fn read_sector(&self, unit: usize, track: usize, sector: usize) -> Vec<u8> {
        let state = lock(&self.disk(unit).state);
        let at = (track * TRACK_SIZE + sector) * SECTOR_SIZE;
        state.image[at..at + SECTOR_SIZE].to_vec()
    }

    /// Overwrites `sector` of `track` on disk `unit` behind the driver's back.
    pub fn write_sector(&self, unit: usize, track: usize, sector: usize, data: &[u8]) {
        let mut state = lock(&self.disk(unit).state);
        let at = (track * TRACK_SIZE + sector) * SECTOR_SIZE;
        state.image[at..at + SECTOR_SIZE].copy_from_slice(data);
    }

    /// Types `input` on the keyboard of terminal `unit`.
    pub fn type_input(&self, unit: usize, input: &[u8]) {
        let term = &self.terminals[unit];
        lock(&term.state).input.extend(input.iter().copied());
        term.cv.notify_all();
    }

    /// Everything terminal `unit` transmitted so far.
    pub fn transmitted(&self, unit: usize) -> Vec<u8> {
        lock(&self.terminals[unit].state).output.clone()
    }

    fn wait_clock(&self) -> Result<u32, DeviceError> {
        let mut pending = lock(&self.clock.state);
        loop {
            if self.is_halted() {
                return Err(DeviceError::Halted);
            }
            if *pending > 0 {
                *pending -= 1;
                return Ok(0);
            }
            pending = wait(&self.clock.cv, pending);
        }
    }

    fn wait_disk(&self, unit: usize) -> Result<u32, DeviceError> {
        let disk = self.disks.get(unit).ok_or(DeviceError::InvalidUnit)?;
        let mut state = lock(&disk.state);
        loop {
            if self.is_halted() {
                return Err(DeviceError::Halted);
            }
            if !state.held {
                if let Some(status) = state.interrupts.pop_front() {
                    state.outstanding = false;
                    return Ok(status);
                }
            }
            state = wait(&disk.cv, state);
        }
    }

    fn wait_terminal(&self, unit: usize) -> Result<u32, DeviceError> {
        let term = self.terminals.get(unit).ok_or(DeviceError::InvalidUnit)?;
        let mut state = lock(&term.state);
        let mut idle = false;
        loop {
            if self.is_halted() {
                return Err(DeviceError::Halted);
            }
            let received = state.recv_int && !state.input.is_empty();
            let transmitted = state.xmit_int && state.xmit != Xmit::Idle;
            if received || transmitted || (idle && state.xmit_int) {
                let incoming = if received { state.input.pop_front() } else { None };
                let (recv, ch) = match incoming {
                    Some(ch) => (DevStatus::Busy, ch),
                    None => (DevStatus::Ready, 0),
                };
                let xmit = match state.xmit {
                    Xmit::Sending => {
                        state.xmit = Xmit::Draining;
                        DevStatus::Busy
                    }
                    Xmit::Draining => {
                        state.xmit = Xmit::Idle;
                        DevStatus::Ready
                    }
                    Xmit::Idle => DevStatus::Ready,
                };
                return Ok(TermStatus::new(recv, xmit, ch).0);
            }
            let (next, timeout) = term
                .cv
                .wait_timeout(state, Duration::from_millis(1))
                .unwrap_or_else(|e| e.into_inner());
            state = next;
            idle = timeout.timed_out();
        }
    }
}

impl Kernel for Machine {
    type Mailbox<T: Send + 'static> = SimMailbox<T>;
    type ParkHandle = SimParkHandle;

    fn mailbox<T: Send + 'static>(&self, slots: usize) -> SimMailbox<T> {
        SimMailbox::new(slots)
    }

    fn getpid(&self) -> Pid {
        current_pid()
    }

    fn park_with(&self, f: impl FnOnce(SimParkHandle)) {
        let token = Arc::new((Mutex::new(false), Condvar::new()));
        f(SimParkHandle {
            token: token.clone(),
        });
        let (woken, cv) = &*token;
        let mut woken = lock(woken);
        while !*woken {
            woken = wait(cv, woken);
        }
    }

    fn fork(&self, name: &str, f: impl FnOnce() + Send + 'static) -> Pid {
        let pid = NEXT_PID.fetch_add(1, Ordering::SeqCst);
        std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                PID.with(|slot| slot.set(Some(pid)));
                f()
            })
            .expect("failed to spawn a process");
        pid
    }
}

impl Hardware for Machine {
    fn wait_device(&self, dev: DeviceType, unit: usize) -> Result<u32, DeviceError> {
        match dev {
            DeviceType::Clock if unit == 0 => self.wait_clock(),
            DeviceType::Clock => Err(DeviceError::InvalidUnit),
            DeviceType::Disk => self.wait_disk(unit),
            DeviceType::Terminal => self.wait_terminal(unit),
        }
    }

    fn disk_output(&self, unit: usize, cmd: DiskCommand<'_>) -> Result<(), DeviceError> {
        let disk = self.disks.get(unit).ok_or(DeviceError::InvalidUnit)?;
        let mut state = lock(&disk.state);
        if state.outstanding {
            state.overlaps += 1;
            return Err(DeviceError::Busy);
        }
        let status = state.execute(cmd);
        state.outstanding = true;
        state.interrupts.push_back(status.into());
        drop(state);
        disk.cv.notify_all();
        Ok(())
    }

    fn term_output(&self, unit: usize, control: u32) -> Result<(), DeviceError> {
        let term = self.terminals.get(unit).ok_or(DeviceError::InvalidUnit)?;
        let (flags, ch) = TermControl::decode(control);
        let mut state = lock(&term.state);
        state.recv_int = flags.contains(TermControl::RECV_INT);
        state.xmit_int = flags.contains(TermControl::XMIT_INT);
        if flags.contains(TermControl::SEND_CHAR) {
            state.output.push(ch);
            state.xmit = Xmit::Sending;
        }
        drop(state);
        term.cv.notify_all();
        Ok(())
    }
}
