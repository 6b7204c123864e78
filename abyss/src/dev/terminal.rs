//! Terminal units.
//!
//! A terminal is driven by writing a control word ([`TermControl`] plus an
//! optional character) and reports a packed [`TermStatus`] on every
//! interrupt. A single status word can carry both a received character and
//! the state of the transmitter.

use super::DevStatus;

/// Number of terminal units.
pub const TERM_UNITS: usize = 4;

bitflags::bitflags! {
    /// Bits of a terminal control word.
    pub struct TermControl: u32 {
        /// Transmit the character in bits 8..16.
        const SEND_CHAR = 1 << 0;
        /// Interrupt when a character is received.
        const RECV_INT = 1 << 1;
        /// Interrupt when the transmitter becomes ready.
        const XMIT_INT = 1 << 2;
    }
}

impl TermControl {
    /// Builds a control word carrying `ch`.
    pub const fn with_char(self, ch: u8) -> u32 {
        self.bits() | (ch as u32) << 8
    }

    /// Splits a control word into its flags and its character.
    pub const fn decode(word: u32) -> (Self, u8) {
        (Self::from_bits_truncate(word), (word >> 8) as u8)
    }
}

/// A terminal status word.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TermStatus(pub u32);

impl TermStatus {
    /// Packs a status word.
    pub fn new(recv: DevStatus, xmit: DevStatus, ch: u8) -> Self {
        Self(u32::from(recv) | u32::from(xmit) << 2 | (ch as u32) << 8)
    }

    /// State of the receiver. [`DevStatus::Busy`] means a character arrived.
    pub fn recv(self) -> DevStatus {
        DevStatus::from_word(self.0 & 0x3)
    }

    /// State of the transmitter.
    pub fn xmit(self) -> DevStatus {
        DevStatus::from_word((self.0 >> 2) & 0x3)
    }

    /// The received character.
    pub fn char(self) -> u8 {
        (self.0 >> 8) as u8
    }
}

impl core::fmt::Debug for TermStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TermStatus")
            .field("recv", &self.recv())
            .field("xmit", &self.xmit())
            .field("char", &self.char())
            .finish()
    }
}
