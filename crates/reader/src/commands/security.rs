//! Security environment and signature commands
//!
//! MANAGE SECURITY ENVIRONMENT picks the key and algorithm, PERFORM
//! SECURITY OPERATION then signs the caller's challenge with it.

use bytes::Bytes;
use mrtd_apdu_core::{ApduCommand, ExpectedLength};

use crate::constants::{cla, ins};

/// MANAGE SECURITY ENVIRONMENT: SET for digital signature computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManageSecurityEnvironmentCommand {
    p1: u8,
    p2: u8,
    data: Bytes,
}

impl ManageSecurityEnvironmentCommand {
    /// SET the digital signature template (P1 `81`, P2 `B6`) with the given
    /// control reference data objects
    pub fn set_signature_template(data: impl Into<Bytes>) -> Self {
        Self {
            p1: 0x81,
            p2: 0xB6,
            data: data.into(),
        }
    }
}

impl ApduCommand for ManageSecurityEnvironmentCommand {
    fn class(&self) -> u8 {
        cla::ISO7816
    }

    fn instruction(&self) -> u8 {
        ins::MANAGE_SECURITY_ENVIRONMENT
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        Some(self.data.as_ref())
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        None
    }
}

/// PERFORM SECURITY OPERATION: COMPUTE DIGITAL SIGNATURE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignCommand {
    challenge: Bytes,
}

impl SignCommand {
    /// Sign `challenge`, asking for the full signature
    pub fn with_challenge(challenge: impl Into<Bytes>) -> Self {
        Self {
            challenge: challenge.into(),
        }
    }
}

impl ApduCommand for SignCommand {
    fn class(&self) -> u8 {
        cla::ISO7816
    }

    fn instruction(&self) -> u8 {
        ins::PERFORM_SECURITY_OPERATION
    }

    fn p1(&self) -> u8 {
        0x9E
    }

    fn p2(&self) -> u8 {
        0x9A
    }

    fn data(&self) -> Option<&[u8]> {
        Some(self.challenge.as_ref())
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        Some(0x00)
    }
}
