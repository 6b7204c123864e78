//! Devices of the machine.
//!
//! The machine has one clock, [`DISK_UNITS`] disks and [`TERM_UNITS`]
//! terminals. Every unit accepts at most one outstanding command; the unit
//! signals completion with an interrupt that carries a 32-bit status word.
//! A driver observes that word through [`Hardware::wait_device`], which
//! blocks the calling process until the next interrupt of the unit.
//!
//! [`DISK_UNITS`]: disk::DISK_UNITS
//! [`TERM_UNITS`]: terminal::TERM_UNITS
pub mod disk;
pub mod terminal;

use disk::DiskCommand;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Number of ticks the clock delivers per second.
pub const TICKS_PER_SECOND: u64 = 10;

/// Kinds of devices attached to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// The periodic clock.
    Clock,
    /// A disk with 512-byte sectors, 16 sectors per track.
    Disk,
    /// A character terminal.
    Terminal,
}

/// Status a unit reports for its last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum DevStatus {
    /// The command completed.
    Ready = 0,
    /// The unit is still working.
    Busy = 1,
    /// The command failed.
    Error = 2,
}

impl DevStatus {
    /// Decodes a raw status value.
    ///
    /// Any value the hardware does not define is an error.
    pub fn from_word(word: u32) -> Self {
        Self::try_from(word).unwrap_or(DevStatus::Error)
    }
}

/// Failures of the hardware interface itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The unit does not exist.
    InvalidUnit,
    /// The unit already has a command outstanding.
    Busy,
    /// The machine has been halted; no further interrupts will arrive.
    Halted,
}

impl core::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeviceError::InvalidUnit => write!(f, "no such unit"),
            DeviceError::Busy => write!(f, "unit has a command outstanding"),
            DeviceError::Halted => write!(f, "machine halted"),
        }
    }
}

/// The interface through which drivers reach the devices.
pub trait Hardware: Send + Sync + 'static {
    /// Blocks until the next interrupt of `unit` of `dev`, and returns the
    /// status word it carried.
    fn wait_device(&self, dev: DeviceType, unit: usize) -> Result<u32, DeviceError>;

    /// Issues a command to a disk unit.
    ///
    /// The buffers of `cmd` are only borrowed for the duration of the call.
    /// A [`DiskCommand::Tracks`] is answered before this returns, while the
    /// sector data of a read or write has moved by the time the unit
    /// interrupts.
    fn disk_output(&self, unit: usize, cmd: DiskCommand<'_>) -> Result<(), DeviceError>;

    /// Writes a control word to a terminal unit.
    ///
    /// See [`terminal::TermControl`] for the encoding.
    fn term_output(&self, unit: usize, control: u32) -> Result<(), DeviceError>;
}
