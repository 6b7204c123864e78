//! A teletype (TTY) interface for the terminals.
//!
//! This module provides the trait [`Teletype`] that defines an interface for
//! reading lines from and writing lines to a terminal, and the per-unit
//! [`Terminal`] that implements it on top of the terminal hardware.
//!
//! A terminal interrupts for two reasons: a character arrived, or the
//! transmitter finished sending one. Both are handled by the terminal's
//! daemon ([`Terminal::daemon`]):
//!
//! - **Read path.** Every received character is appended to the
//!   [`LineBuffer`]. A line is complete at a newline (which is kept), at a
//!   NUL (which is not), or when it reaches [`MAXLINE`] characters.
//!   Complete lines go into a bounded mailbox from which [`Teletype::read`]
//!   takes them; when the mailbox is full the line is dropped.
//! - **Write path.** [`Teletype::write`] hands a copy of the caller's bytes
//!   to the daemon through a single-slot mailbox. When the transmitter is
//!   ready, the daemon sends the bytes one at a time, waiting for the
//!   transmitter after each.
//!
//! The single-slot mailbox is the write lock of the unit: a writer acquires
//! it by sending its line, which blocks while another line is pending, and
//! the daemon releases it by taking the line out before transmitting. Only
//! the daemon drives the transmitter, so the output of two writers never
//! interleaves.
//!
//! The daemon keeps assembling input while a write is in progress.

use crate::{
    KernelError,
    kernel::{Mailbox, Platform},
    sync::MboxLock,
};
use abyss::{
    DevStatus, DeviceError, DeviceType, debug,
    dev::terminal::{TermControl, TermStatus},
    info, warning,
};
use alloc::sync::Arc;
use arrayvec::ArrayVec;

/// Maximum length of a line.
pub const MAXLINE: usize = 80;

/// A line of at most [`MAXLINE`] characters.
pub type Line = ArrayVec<u8, MAXLINE>;

/// The `Teletype` trait represents a line-oriented terminal.
pub trait Teletype {
    /// Writes data to the teletype.
    ///
    /// # Returns
    /// - `Ok(usize)`: The number of bytes accepted for transmission.
    /// - `Err(KernelError)`: If `data` is longer than [`MAXLINE`].
    fn write(&self, data: &[u8]) -> Result<usize, KernelError>;

    /// Reads the next line from the teletype.
    ///
    /// Blocks until a line is available. At most `data.len()` bytes of the
    /// line are copied; the rest of the line is discarded.
    ///
    /// # Returns
    /// - `Ok(usize)`: The number of bytes stored into `data`.
    /// - `Err(KernelError)`: If `data` is empty or longer than [`MAXLINE`].
    fn read(&self, data: &mut [u8]) -> Result<usize, KernelError>;
}

/// Characters received since the last complete line.
#[derive(Default)]
pub struct LineBuffer {
    buf: Line,
    published: usize,
    dropped: usize,
}

impl LineBuffer {
    /// Appends a received character. Returns the line it completed, if any.
    pub fn push(&mut self, ch: u8) -> Option<Line> {
        match ch {
            0 => {}
            b'\n' => self.buf.push(ch),
            _ => {
                self.buf.push(ch);
                if !self.buf.is_full() {
                    return None;
                }
            }
        }
        if self.buf.is_empty() {
            None
        } else {
            Some(core::mem::take(&mut self.buf))
        }
    }

    /// Number of lines delivered to the line mailbox.
    pub fn published(&self) -> usize {
        self.published
    }

    /// Number of lines lost because the line mailbox was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// A terminal unit.
pub struct Terminal<K: Platform> {
    unit: usize,
    kernel: Arc<K>,
    input: MboxLock<LineBuffer, K::Mailbox<()>>,
    lines: K::Mailbox<Line>,
    writes: K::Mailbox<Line>,
}

impl<K: Platform> Terminal<K> {
    /// Creates the state of terminal `unit` that holds up to `line_buffers`
    /// complete lines nobody has read yet.
    pub fn new(kernel: Arc<K>, unit: usize, line_buffers: usize) -> Self {
        Terminal {
            unit,
            input: MboxLock::new(kernel.mailbox::<()>(1), LineBuffer::default()),
            lines: kernel.mailbox::<Line>(line_buffers),
            writes: kernel.mailbox::<Line>(1),
            kernel,
        }
    }

    /// Unit number.
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Number of complete lines that were dropped.
    pub fn dropped(&self) -> usize {
        let input = self.input.lock();
        let dropped = input.dropped();
        input.unlock();
        dropped
    }

    /// Number of complete lines that were delivered.
    pub fn published(&self) -> usize {
        let input = self.input.lock();
        let published = input.published();
        input.unlock();
        published
    }

    fn receive(&self, status: TermStatus) {
        if status.recv() != DevStatus::Busy {
            return;
        }
        let mut input = self.input.lock();
        if let Some(line) = input.push(status.char()) {
            match self.lines.cond_send(line) {
                Ok(()) => input.published += 1,
                Err(line) => {
                    input.dropped += 1;
                    warning!("term{}: dropped a line of {} bytes", self.unit, line.len());
                }
            }
        }
        input.unlock();
    }

    fn transmit(&self, line: &Line) -> Result<(), DeviceError> {
        let control = TermControl::SEND_CHAR | TermControl::RECV_INT | TermControl::XMIT_INT;
        for &ch in line.iter() {
            self.kernel.term_output(self.unit, control.with_char(ch))?;
            loop {
                let status = TermStatus(self.kernel.wait_device(DeviceType::Terminal, self.unit)?);
                self.receive(status);
                match status.xmit() {
                    DevStatus::Ready => break,
                    DevStatus::Busy => {}
                    DevStatus::Error => {
                        warning!("term{}: transmit error", self.unit);
                        break;
                    }
                }
            }
            if ch == b'\n' || ch == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Body of the terminal daemon.
    ///
    /// Returns when the machine halts.
    pub fn daemon(self: Arc<Self>) {
        info!("term{}: daemon started (pid {})", self.unit, self.kernel.getpid());
        let enable = TermControl::RECV_INT | TermControl::XMIT_INT;
        if let Err(e) = self.kernel.term_output(self.unit, enable.bits()) {
            warning!("term{}: cannot enable interrupts: {}", self.unit, e);
            return;
        }

        let mut outgoing = None;
        while let Ok(status) = self.kernel.wait_device(DeviceType::Terminal, self.unit) {
            let status = TermStatus(status);
            self.receive(status);
            if outgoing.is_none() {
                outgoing = self.writes.cond_recv();
            }
            if status.xmit() != DevStatus::Ready {
                continue;
            }
            if let Some(line) = outgoing.take() {
                debug!("term{}: transmitting {} bytes", self.unit, line.len());
                if self.transmit(&line).is_err() {
                    return;
                }
            }
        }
    }
}

impl<K: Platform> Teletype for Terminal<K> {
    fn write(&self, data: &[u8]) -> Result<usize, KernelError> {
        if data.is_empty() {
            return Ok(0);
        }
        let line = Line::try_from(data).map_err(|_| KernelError::InvalidArgument)?;
        self.writes.send(line);
        Ok(data.len())
    }

    fn read(&self, data: &mut [u8]) -> Result<usize, KernelError> {
        if data.is_empty() || data.len() > MAXLINE {
            return Err(KernelError::InvalidArgument);
        }
        let line = self.lines.recv();
        let len = line.len().min(data.len());
        data[..len].copy_from_slice(&line[..len]);
        Ok(len)
    }
}
