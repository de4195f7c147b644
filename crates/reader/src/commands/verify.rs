//! VERIFY command for PIN verification

use std::fmt;

use mrtd_apdu_core::{ApduCommand, ExpectedLength};
use zeroize::Zeroizing;

use crate::constants::{cla, ins};

/// VERIFY command carrying a zero padded PIN
///
/// The padded PIN is wiped from memory when the command is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyPinCommand {
    reference: u8,
    pin: Zeroizing<Vec<u8>>,
}

impl VerifyPinCommand {
    /// Verify `pin` against the reference data `reference`, right padding
    /// with zero bytes up to `padded_len`
    pub fn with_pin(pin: &str, reference: u8, padded_len: usize) -> Self {
        let mut padded = Zeroizing::new(pin.as_bytes().to_vec());
        if padded.len() < padded_len {
            padded.resize(padded_len, 0x00);
        }
        Self {
            reference,
            pin: padded,
        }
    }
}

impl fmt::Debug for VerifyPinCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyPinCommand")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl ApduCommand for VerifyPinCommand {
    fn class(&self) -> u8 {
        cla::ISO7816
    }

    fn instruction(&self) -> u8 {
        ins::VERIFY
    }

    fn p1(&self) -> u8 {
        0x00
    }

    fn p2(&self) -> u8 {
        self.reference
    }

    fn data(&self) -> Option<&[u8]> {
        Some(self.pin.as_slice())
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        None
    }
}
