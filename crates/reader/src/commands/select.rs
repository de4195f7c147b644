//! SELECT command
//!
//! Selects the master file, an application by name or an elementary file
//! by identifier.

use bytes::Bytes;
use mrtd_apdu_core::{ApduCommand, ExpectedLength};

use crate::constants::{EMRTD_AID, cla, file, ins, select_p1, select_p2};

/// SELECT command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectCommand {
    p1: u8,
    p2: u8,
    data: Bytes,
}

impl SelectCommand {
    /// Create a SELECT command with explicit parameters
    pub fn new(p1: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self {
            p1,
            p2,
            data: data.into(),
        }
    }

    /// Select the master file without asking for the FCI
    pub fn master_file() -> Self {
        Self::new(
            select_p1::BY_ID,
            select_p2::NO_RESPONSE_DATA,
            file::MASTER_FILE.to_vec(),
        )
    }

    /// Select an application by its AID without asking for the FCI
    pub fn with_aid(aid: impl Into<Bytes>) -> Self {
        Self::new(select_p1::BY_NAME, select_p2::NO_RESPONSE_DATA, aid)
    }

    /// Select the eMRTD LDS1 application
    pub fn emrtd_application() -> Self {
        Self::with_aid(EMRTD_AID.to_vec())
    }

    /// Select an elementary file under the current application
    pub fn elementary_file(file_id: [u8; 2]) -> Self {
        Self::new(
            select_p1::EF_UNDER_CURRENT_DF,
            select_p2::NO_RESPONSE_DATA,
            file_id.to_vec(),
        )
    }

    /// Select any file by identifier, the FCI may be returned
    pub fn by_id(file_id: [u8; 2]) -> Self {
        Self::new(select_p1::BY_ID, select_p2::RETURN_FCI, file_id.to_vec())
    }
}

impl ApduCommand for SelectCommand {
    fn class(&self) -> u8 {
        cla::ISO7816
    }

    fn instruction(&self) -> u8 {
        ins::SELECT
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
