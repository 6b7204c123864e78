//! # devio: the device I/O layer
//!
//! This crate turns the raw, interrupt-driven devices of the machine (one
//! clock, two disks and four terminals, see [`abyss::dev`]) into blocking
//! system calls:
//!
//! | call        | service                                       |
//! |-------------|-----------------------------------------------|
//! | `Sleep`     | [`timer::SleepTimer::sleep`]                  |
//! | `DiskSize`  | [`disk::DiskUnit::size`]                      |
//! | `DiskRead`  | [`disk::DiskUnit::read`]                      |
//! | `DiskWrite` | [`disk::DiskUnit::write`]                     |
//! | `TermRead`  | [`teletype::Teletype::read`]                  |
//! | `TermWrite` | [`teletype::Teletype::write`]                 |
//!
//! Each device unit is owned by a daemon, a long-lived process that is the
//! only one to issue commands to the unit and to wait for its interrupts.
//! A system-call handler never touches the hardware. It validates its
//! arguments, queues a request for the daemon, and sleeps until the daemon
//! reports back.
//!
//! ## Getting Started
//!
//! The layer is built on a [`Platform`]: the process and mailbox services of
//! the kernel ([`kernel::Kernel`]) plus the devices ([`abyss::Hardware`]).
//! Build the context once, start the daemons, and route system calls to
//! [`DeviceIo::syscall`]:
//!
//! ```ignore
//! let io = DeviceIo::new(platform, Config::default());
//! io.start_service_processes();
//!
//! let mut args = SysArgs::new(SyscallNumber::Sleep);
//! args.arg1 = 3;
//! io.syscall(&mut args);
//! assert_eq!(args.status(), 0);
//! ```
//!
//! ## Logging
//!
//! Daemons report their progress with the kernel log of [`abyss::kprint`].
//! Set [`Config::quiet`] to silence it.
//!
//! [`Platform`]: kernel::Platform

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod disk;
pub mod kernel;
pub mod sync;
pub mod syscall;
pub mod teletype;
pub mod timer;

use abyss::{
    dev::{TICKS_PER_SECOND, disk::DISK_UNITS, terminal::TERM_UNITS},
    info,
};
use alloc::{format, sync::Arc, vec::Vec};
use disk::DiskUnit;
use kernel::Platform;
use teletype::Terminal;
use timer::SleepTimer;

pub use syscall::{SysArgs, SyscallNumber};

/// Enum representing errors that can occur during a device operation.
///
/// The system-call layer reports every one of them to the caller as the
/// status `-1`; the variant tells the kernel log what went wrong.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KernelError {
    /// Bad address. (EFAULT)
    BadAddress,
    /// Invalid arguement. (EINVAL)
    InvalidArgument,
    /// Invalid system call number. (ENOSYS)
    NoSuchSyscall,
}

impl KernelError {
    /// Converts the [`KernelError`] enum into a corresponding `usize` error
    /// code.
    pub fn into_usize(self) -> usize {
        (match self {
            KernelError::BadAddress => -14isize,
            KernelError::InvalidArgument => -22,
            KernelError::NoSuchSyscall => -38,
        }) as usize
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::BadAddress => write!(f, "bad address"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::NoSuchSyscall => write!(f, "no such system call"),
        }
    }
}

/// A builder for the configuration of the device layer.
///
/// ```
/// use devio::Config;
///
/// let config = Config::new().ticks_per_second(20).line_buffers(4);
/// assert_eq!(config.get_ticks_per_second(), 20);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    ticks_per_second: u64,
    line_buffers: usize,
    quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ticks_per_second: TICKS_PER_SECOND,
            line_buffers: 10,
            quiet: false,
        }
    }
}

impl Config {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of clock ticks per second.
    pub fn ticks_per_second(mut self, ticks: u64) -> Self {
        self.ticks_per_second = ticks.max(1);
        self
    }

    /// Sets how many unread lines a terminal keeps before dropping input.
    pub fn line_buffers(mut self, lines: usize) -> Self {
        self.line_buffers = lines.max(1);
        self
    }

    /// Silences the informational kernel log.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Number of clock ticks per second.
    pub fn get_ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// Number of unread lines a terminal keeps.
    pub fn get_line_buffers(&self) -> usize {
        self.line_buffers
    }
}

/// State of the whole device layer.
///
/// Shared by every daemon and every system-call handler.
pub struct DeviceIo<K: Platform> {
    kernel: Arc<K>,
    config: Config,
    timer: Arc<SleepTimer<K>>,
    disks: Vec<Arc<DiskUnit<K>>>,
    terminals: Vec<Arc<Terminal<K>>>,
}

impl<K: Platform> DeviceIo<K> {
    /// Builds the state of every device unit.
    ///
    /// No daemon runs until [`DeviceIo::start_service_processes`].
    pub fn new(kernel: Arc<K>, config: Config) -> Arc<Self> {
        abyss::QUITE.store(config.quiet, core::sync::atomic::Ordering::SeqCst);
        let timer = Arc::new(SleepTimer::new(kernel.clone(), config.get_ticks_per_second()));
        let disks = (0..DISK_UNITS)
            .map(|unit| Arc::new(DiskUnit::new(kernel.clone(), unit)))
            .collect();
        let terminals = (0..TERM_UNITS)
            .map(|unit| Arc::new(Terminal::new(kernel.clone(), unit, config.get_line_buffers())))
            .collect();
        Arc::new(DeviceIo {
            kernel,
            config,
            timer,
            disks,
            terminals,
        })
    }

    /// Starts the sleep daemon and one daemon per disk and terminal unit.
    pub fn start_service_processes(&self) {
        let timer = self.timer.clone();
        self.kernel.fork("sleep", move || timer.daemon());
        for disk in self.disks.iter() {
            let disk = disk.clone();
            self.kernel
                .fork(&format!("disk{}", disk.unit()), move || disk.daemon());
        }
        for terminal in self.terminals.iter() {
            let terminal = terminal.clone();
            self.kernel
                .fork(&format!("term{}", terminal.unit()), move || terminal.daemon());
        }
        info!(
            "device layer up: {} disks, {} terminals, {} ticks/s",
            DISK_UNITS, TERM_UNITS, self.config.ticks_per_second
        );
    }

    /// The configuration the layer was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The sleep timer.
    pub fn timer(&self) -> &SleepTimer<K> {
        &self.timer
    }

    /// Disk `unit`.
    pub fn disk(&self, unit: usize) -> Result<&DiskUnit<K>, KernelError> {
        self.disks
            .get(unit)
            .map(Arc::as_ref)
            .ok_or(KernelError::InvalidArgument)
    }

    /// Terminal `unit`.
    pub fn terminal(&self, unit: usize) -> Result<&Terminal<K>, KernelError> {
        self.terminals
            .get(unit)
            .map(Arc::as_ref)
            .ok_or(KernelError::InvalidArgument)
    }
}
