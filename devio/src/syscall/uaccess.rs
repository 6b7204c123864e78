//! The `uaccess` module provides the buffers a system call exchanges with
//! its caller.
//!
//! - [`UserU8SliceRO`]: A one-time, read-only pointer to a slice of `u8`
//!   owned by the caller.
//! - [`UserU8SliceWO`]: A one-time, write-only pointer to a slice of `u8`
//!   owned by the caller.
//!
//! Both are checked with [`access_ok`] before they are dereferenced. The
//! caller of a system call guarantees that a non-null buffer it passes stays
//! valid for the duration of the call; a null buffer with a non-zero length,
//! or one that wraps around the address space, is rejected with
//! [`KernelError::BadAddress`].
use crate::KernelError;
use alloc::vec::Vec;

/// Whether `len` bytes at `addr` may be accessed.
pub fn access_ok(addr: usize, len: usize) -> bool {
    len == 0 || (addr != 0 && addr.checked_add(len).is_some())
}

/// A one-time, read-only pointer to a slice of `u8` owned by the caller.
#[derive(PartialEq, PartialOrd, Eq, Ord, Debug)]
pub struct UserU8SliceRO {
    addr: usize,
    len: usize,
}

impl UserU8SliceRO {
    /// Creates a new `UserU8SliceRO` instance with the given address and
    /// length.
    pub fn new(addr: usize, len: usize) -> Self {
        UserU8SliceRO { addr, len }
    }

    /// Reads the caller's buffer into a `Vec<u8>`.
    ///
    /// Takes ownership of `self` to prevent TOCTOU attacks.
    pub fn get(self) -> Result<Vec<u8>, KernelError> {
        if !access_ok(self.addr, self.len) {
            return Err(KernelError::BadAddress);
        }
        if self.len == 0 {
            return Ok(Vec::new());
        }
        let mut result = Vec::new();
        result.extend_from_slice(unsafe {
            core::slice::from_raw_parts(self.addr as *const u8, self.len)
        });
        Ok(result)
    }
}

/// A one-time, write-only pointer to a slice of `u8` owned by the caller.
#[derive(PartialEq, PartialOrd, Eq, Ord, Debug)]
pub struct UserU8SliceWO {
    addr: usize,
    len: usize,
}

impl UserU8SliceWO {
    /// Creates a new `UserU8SliceWO` instance with the given address and
    /// length.
    pub fn new(addr: usize, len: usize) -> Self {
        UserU8SliceWO { addr, len }
    }

    /// Writes data from a slice to the caller's buffer.
    ///
    /// Takes ownership of `self` to prevent TOCTOU attacks.
    ///
    /// Returns `Ok(usize)` indicating the number of bytes written.
    pub fn put(self, other: &[u8]) -> Result<usize, KernelError> {
        let size = self.len.min(other.len());
        if !access_ok(self.addr, self.len) {
            return Err(KernelError::BadAddress);
        }
        if size > 0 {
            unsafe {
                // Safety: access_ok rejected null and wrapping buffers; the
                // caller keeps the buffer alive during the call.
                core::ptr::copy_nonoverlapping(other.as_ptr(), self.addr as *mut u8, size);
            }
        }
        Ok(size)
    }
}
