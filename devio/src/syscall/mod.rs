//! # System call layer.
//!
//! A system call arrives as a [`SysArgs`]: the call number and five argument
//! slots. The handler reads its inputs from the slots, and, when it returns,
//! the same slots carry the outputs back to the caller:
//!
//! | call (number)   | inputs                                  | outputs                                   |
//! |-----------------|-----------------------------------------|-------------------------------------------|
//! | Sleep (12)      | arg1 seconds                            | arg4 status                               |
//! | DiskRead (13)   | arg1 buf, arg2 sectors, arg3 track, arg4 first sector, arg5 unit | arg1 device status, arg4 status |
//! | DiskWrite (14)  | same as DiskRead                        | arg1 device status, arg4 status           |
//! | DiskSize (15)   | arg1 unit                               | arg1 sector size, arg2 sectors per track, arg3 tracks, arg4 status |
//! | TermRead (16)   | arg1 buf, arg2 size, arg3 unit          | arg2 bytes read, arg4 status              |
//! | TermWrite (17)  | arg1 buf, arg2 size, arg3 unit          | arg2 bytes accepted, arg4 status          |
//!
//! The status in arg4 is `0` on success and `-1` when the arguments were
//! rejected; rejected calls have no side effects. A device failure during a
//! disk transfer is not a rejected call: arg4 is `0` and arg1 carries the
//! status the device reported. A transfer of more sectors than the disk
//! holds is rejected before any buffer is allocated or touched.
//!
//! Handlers propagate errors with `?` up to [`DeviceIo::syscall`], whose
//! epilog converts the [`KernelError`] into the status slot. Each handler is
//! also reachable as a typed method of [`DeviceIo`].

pub mod uaccess;

use crate::{
    DeviceIo, KernelError,
    disk::DiskSize,
    kernel::Platform,
    teletype::{MAXLINE, Teletype},
};
use abyss::{
    dev::disk::{SECTOR_SIZE, SectorBuf},
    warning,
};
use alloc::{vec, vec::Vec};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use uaccess::{UserU8SliceRO, UserU8SliceWO};

/// System call numbers served by the device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(usize)]
pub enum SyscallNumber {
    /// Sleeps for a number of seconds.
    Sleep = 12,
    /// Reads sectors from a disk.
    DiskRead = 13,
    /// Writes sectors to a disk.
    DiskWrite = 14,
    /// Queries the geometry of a disk.
    DiskSize = 15,
    /// Reads a line from a terminal.
    TermRead = 16,
    /// Writes a line to a terminal.
    TermWrite = 17,
}

/// Arguments and results of a system call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SysArgs {
    /// The system call number.
    pub number: usize,
    /// First argument slot.
    pub arg1: usize,
    /// Second argument slot.
    pub arg2: usize,
    /// Third argument slot.
    pub arg3: usize,
    /// Fourth argument slot.
    pub arg4: usize,
    /// Fifth argument slot.
    pub arg5: usize,
}

impl SysArgs {
    /// Status reported on success.
    pub const OK: usize = 0;
    /// Status reported for rejected arguments.
    pub const INVALID: usize = -1isize as usize;

    /// Creates the arguments of system call `number` with empty slots.
    pub fn new(number: SyscallNumber) -> Self {
        SysArgs {
            number: number.into(),
            ..Default::default()
        }
    }

    /// The status slot, as a signed value.
    pub fn status(&self) -> isize {
        self.arg4 as isize
    }

    fn fail(&mut self, number: Option<SyscallNumber>) {
        match number {
            Some(SyscallNumber::TermRead | SyscallNumber::TermWrite) => self.arg2 = 0,
            Some(SyscallNumber::DiskRead | SyscallNumber::DiskWrite) => self.arg1 = 0,
            Some(SyscallNumber::DiskSize) => {
                self.arg1 = 0;
                self.arg2 = 0;
                self.arg3 = 0;
            }
            Some(SyscallNumber::Sleep) | None => {}
        }
        self.arg4 = Self::INVALID;
    }
}

/// Interprets a slot as a signed quantity that must not be negative.
fn non_negative(slot: usize) -> Result<usize, KernelError> {
    if (slot as isize) < 0 {
        Err(KernelError::InvalidArgument)
    } else {
        Ok(slot)
    }
}

fn to_sectors(data: &[u8]) -> Vec<SectorBuf> {
    data.chunks_exact(SECTOR_SIZE)
        .map(|chunk| {
            let mut sector = [0; SECTOR_SIZE];
            sector.copy_from_slice(chunk);
            sector
        })
        .collect()
}

impl<K: Platform> DeviceIo<K> {
    /// Serves the system call described by `args`, writing its results back
    /// into `args`.
    pub fn syscall(&self, args: &mut SysArgs) {
        let number = SyscallNumber::try_from(args.number).ok();
        let result = match number {
            Some(SyscallNumber::Sleep) => self.sys_sleep(args),
            Some(SyscallNumber::DiskRead) => self.sys_disk_read(args),
            Some(SyscallNumber::DiskWrite) => self.sys_disk_write(args),
            Some(SyscallNumber::DiskSize) => self.sys_disk_size(args),
            Some(SyscallNumber::TermRead) => self.sys_term_read(args),
            Some(SyscallNumber::TermWrite) => self.sys_term_write(args),
            None => Err(KernelError::NoSuchSyscall),
        };
        if let Err(e) = result {
            warning!(
                "syscall {}: {} ({})",
                args.number,
                e,
                e.into_usize() as isize
            );
            args.fail(number);
        }
    }

    /// Parks the calling process for at least `seconds` seconds.
    pub fn sleep(&self, seconds: u64) {
        self.timer().sleep(seconds)
    }

    /// Reads the next line of terminal `unit` into `buf`.
    pub fn term_read(&self, unit: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
        self.terminal(unit)?.read(buf)
    }

    /// Queues `data` for transmission on terminal `unit`.
    pub fn term_write(&self, unit: usize, data: &[u8]) -> Result<usize, KernelError> {
        self.terminal(unit)?.write(data)
    }

    /// Geometry of disk `unit`.
    pub fn disk_size(&self, unit: usize) -> Result<DiskSize, KernelError> {
        Ok(self.disk(unit)?.size())
    }

    /// Fills `buf` with whole sectors of disk `unit`, starting at sector
    /// `block` of `track`. Returns the device status of the transfer.
    ///
    /// `buf` is only written if the whole transfer succeeded.
    pub fn disk_read(
        &self,
        unit: usize,
        buf: &mut [u8],
        track: usize,
        block: usize,
    ) -> Result<u32, KernelError> {
        let disk = self.disk(unit)?;
        if buf.len() % SECTOR_SIZE != 0 {
            return Err(KernelError::InvalidArgument);
        }
        let completion = disk.read(buf.len() / SECTOR_SIZE, track, block)?;
        if completion.is_ok() {
            buf.copy_from_slice(completion.sectors.as_flattened());
        }
        Ok(completion.status)
    }

    /// Writes the whole sectors in `data` to disk `unit`, starting at sector
    /// `block` of `track`. Returns the device status of the transfer.
    pub fn disk_write(
        &self,
        unit: usize,
        data: &[u8],
        track: usize,
        block: usize,
    ) -> Result<u32, KernelError> {
        let disk = self.disk(unit)?;
        if data.len() % SECTOR_SIZE != 0 {
            return Err(KernelError::InvalidArgument);
        }
        Ok(disk.write(to_sectors(data), track, block)?.status)
    }

    fn sys_sleep(&self, args: &mut SysArgs) -> Result<(), KernelError> {
        let seconds = non_negative(args.arg1)?;
        self.sleep(seconds as u64);
        args.arg4 = SysArgs::OK;
        Ok(())
    }

    fn sys_disk_read(&self, args: &mut SysArgs) -> Result<(), KernelError> {
        let count = non_negative(args.arg2)?;
        let track = non_negative(args.arg3)?;
        let block = non_negative(args.arg4)?;
        self.disk(args.arg5)?.check_count(count)?;
        let len = count
            .checked_mul(SECTOR_SIZE)
            .ok_or(KernelError::InvalidArgument)?;
        if !uaccess::access_ok(args.arg1, len) {
            return Err(KernelError::BadAddress);
        }
        let user = UserU8SliceWO::new(args.arg1, len);
        let mut buf = vec![0; len];
        let status = self.disk_read(args.arg5, &mut buf, track, block)?;
        if status == 0 {
            user.put(&buf)?;
        }
        args.arg1 = status as usize;
        args.arg4 = SysArgs::OK;
        Ok(())
    }

    fn sys_disk_write(&self, args: &mut SysArgs) -> Result<(), KernelError> {
        let count = non_negative(args.arg2)?;
        let track = non_negative(args.arg3)?;
        let block = non_negative(args.arg4)?;
        self.disk(args.arg5)?.check_count(count)?;
        let len = count
            .checked_mul(SECTOR_SIZE)
            .ok_or(KernelError::InvalidArgument)?;
        let data = UserU8SliceRO::new(args.arg1, len).get()?;
        let status = self.disk_write(args.arg5, &data, track, block)?;
        args.arg1 = status as usize;
        args.arg4 = SysArgs::OK;
        Ok(())
    }

    fn sys_disk_size(&self, args: &mut SysArgs) -> Result<(), KernelError> {
        let size = self.disk_size(args.arg1)?;
        args.arg1 = size.sector_size;
        args.arg2 = size.track_size;
        args.arg3 = size.tracks;
        args.arg4 = SysArgs::OK;
        Ok(())
    }

    fn sys_term_read(&self, args: &mut SysArgs) -> Result<(), KernelError> {
        let size = non_negative(args.arg2)?;
        if size == 0 || size > MAXLINE {
            return Err(KernelError::InvalidArgument);
        }
        if !uaccess::access_ok(args.arg1, size) {
            return Err(KernelError::BadAddress);
        }
        let user = UserU8SliceWO::new(args.arg1, size);
        let mut line = [0; MAXLINE];
        let read = self.term_read(args.arg3, &mut line[..size])?;
        user.put(&line[..read])?;
        args.arg2 = read;
        args.arg4 = SysArgs::OK;
        Ok(())
    }

    fn sys_term_write(&self, args: &mut SysArgs) -> Result<(), KernelError> {
        let size = non_negative(args.arg2)?;
        if size > MAXLINE {
            return Err(KernelError::InvalidArgument);
        }
        self.terminal(args.arg3)?;
        let data = UserU8SliceRO::new(args.arg1, size).get()?;
        args.arg2 = self.term_write(args.arg3, &data)?;
        args.arg4 = SysArgs::OK;
        Ok(())
    }
}
