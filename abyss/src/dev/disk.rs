//! Disk units.
//!
//! A disk is addressed by track and sector. The head must first be moved to
//! a track with [`DiskCommand::Seek`]; sectors of that track are then
//! transferred one at a time. The number of tracks differs per unit and is
//! discovered with [`DiskCommand::Tracks`].

/// Number of disk units.
pub const DISK_UNITS: usize = 2;

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 512;

/// Sectors per track.
pub const TRACK_SIZE: usize = 16;

/// Contents of a single sector.
pub type SectorBuf = [u8; SECTOR_SIZE];

/// A command for a disk unit.
#[derive(Debug)]
pub enum DiskCommand<'a> {
    /// Move the head to `track`.
    Seek {
        /// Destination track.
        track: usize,
    },
    /// Read `sector` of the current track into `buf`.
    Read {
        /// Sector within the current track.
        sector: usize,
        /// Destination buffer.
        buf: &'a mut SectorBuf,
    },
    /// Write `buf` to `sector` of the current track.
    Write {
        /// Sector within the current track.
        sector: usize,
        /// Source buffer.
        buf: &'a SectorBuf,
    },
    /// Store the number of tracks of the unit into `out`.
    ///
    /// The count is stored when the command is issued. The unit still
    /// interrupts afterwards, like for any other command.
    Tracks {
        /// Receives the track count.
        out: &'a mut usize,
    },
}
