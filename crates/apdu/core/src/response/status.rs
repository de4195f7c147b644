//! Trailer status words returned by travel document chips

use std::fmt;

use tracing::{Level, debug};

use crate::{Error, Result};

/// SW1 SW2 trailer of a chip response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// SW1
    pub sw1: u8,
    /// SW2
    pub sw2: u8,
}

impl StatusWord {
    /// Status word from its two bytes
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Split a raw response into its trailer and the length of the data before it
    ///
    /// # Errors
    /// Returns [`Error::IncompleteResponse`] when fewer than two bytes arrived.
    pub fn split_trailer(raw: &[u8]) -> Result<(Self, usize)> {
        match raw {
            [data @ .., sw1, sw2] => Ok((Self::new(*sw1, *sw2), data.len())),
            _ => {
                debug!(len = raw.len(), "Response shorter than a status word");
                Err(Error::IncompleteResponse(raw.len()))
            }
        }
    }

    /// Both bytes as one big endian value
    pub const fn to_u16(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    /// 90 00
    pub const fn is_success(&self) -> bool {
        matches!((self.sw1, self.sw2), (0x90, 0x00))
    }

    /// 62 82, fewer bytes than Le were left in the file
    pub const fn is_end_of_file(&self) -> bool {
        matches!((self.sw1, self.sw2), (0x62, 0x82))
    }

    /// 69 83, the PIN or key is blocked
    pub const fn is_authentication_blocked(&self) -> bool {
        matches!((self.sw1, self.sw2), (0x69, 0x83))
    }

    /// 6B 00, the READ BINARY offset is past the end of the file
    pub const fn is_wrong_parameters(&self) -> bool {
        matches!((self.sw1, self.sw2), (0x6B, 0x00))
    }

    /// Tries left after a failed VERIFY, from 63 CX
    pub const fn remaining_attempts(&self) -> Option<u8> {
        match (self.sw1, self.sw2 & 0xF0) {
            (0x63, 0xC0) => Some(self.sw2 & 0x0F),
            _ => None,
        }
    }

    /// Level at which a response with this trailer is logged
    pub const fn tracing_level(&self) -> Level {
        match self.sw1 {
            0x90 | 0x61 => Level::DEBUG,
            0x62 | 0x63 => Level::INFO,
            _ => Level::WARN,
        }
    }

    /// Short human readable meaning
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x61, _) => "More data available",
            (0x62, 0x82) => "End of file reached before Le bytes",
            (0x63, n) if n & 0xF0 == 0xC0 => "Verification failed, counter updated",
            (0x63, _) => "Verification failed",
            (0x65, 0x81) => "Memory failure",
            (0x67, 0x00) => "Wrong length",
            (0x68, 0x82) => "Secure messaging not supported",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x83) => "Authentication method blocked",
            (0x69, 0x84) => "Reference data not usable",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x69, 0x87) => "Secure messaging data objects missing",
            (0x69, 0x88) => "Secure messaging data objects incorrect",
            (0x6A, 0x80) => "Incorrect data field",
            (0x6A, 0x82) => "File or application not found",
            (0x6A, 0x86) => "Incorrect P1 P2",
            (0x6A, 0x88) => "Reference data not found",
            (0x6B, 0x00) => "Offset outside the file",
            (0x6C, _) => "Wrong Le, exact length in SW2",
            (0x6D, 0x00) => "Instruction not supported",
            (0x6E, 0x00) => "Class not supported",
            (0x6F, 0x00) => "No precise diagnosis",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self::new(sw1, sw2)
    }
}

impl From<u16> for StatusWord {
    fn from(value: u16) -> Self {
        let [sw1, sw2] = value.to_be_bytes();
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Status words the reader builds responses from
pub mod common {
    use super::StatusWord;

    /// 90 00
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
}
