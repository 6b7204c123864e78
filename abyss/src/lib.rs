//! The abyss of the device layer: the hardware it drives.
//!
//! This crate describes the machine the device-I/O layer talks to: which
//! devices exist and how many units of each, how commands are issued to a
//! unit, and how the status word a unit reports on its interrupt is laid out.
//! The [`dev::Hardware`] trait is the only way the layer touches a device:
//! it issues one command to a unit and then blocks in
//! [`dev::Hardware::wait_device`] until the unit interrupts.
//!
//! The crate also hosts the kernel log ([`print!`], [`info!`], [`warning!`],
//! [`debug!`]) and the [`SpinLock`] that protects the console.
//!
//! You are **not** required to understand the encoding details of every
//! status word; [`dev::terminal::TermStatus`] and [`dev::DevStatus`] decode
//! them for you.
//!
//! [`SpinLock`]: spinlock::SpinLock
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

use core::sync::atomic::AtomicBool;

extern crate alloc;

#[macro_use]
pub mod kprint;
pub mod dev;
pub mod spinlock;

pub use dev::{DevStatus, DeviceError, DeviceType, Hardware};

/// Mutes [`info!`], [`warning!`] and [`debug!`] when set.
pub static QUITE: AtomicBool = AtomicBool::new(false);
