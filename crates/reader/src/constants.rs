//! Constants used when talking to eMRTD chips
//!
//! Instruction codes, parameter values, file identifiers and application
//! identifiers from ICAO Doc 9303 and ISO/IEC 7816-4.

/// Command classes
pub mod cla {
    /// ISO 7816 interindustry class
    pub const ISO7816: u8 = 0x00;
}

/// Instruction codes
pub mod ins {
    /// SELECT
    pub const SELECT: u8 = 0xA4;
    /// READ BINARY
    pub const READ_BINARY: u8 = 0xB0;
    /// READ BINARY, odd instruction with an offset data object
    pub const READ_BINARY_ODD: u8 = 0xB1;
    /// VERIFY
    pub const VERIFY: u8 = 0x20;
    /// MANAGE SECURITY ENVIRONMENT
    pub const MANAGE_SECURITY_ENVIRONMENT: u8 = 0x22;
    /// PERFORM SECURITY OPERATION
    pub const PERFORM_SECURITY_OPERATION: u8 = 0x2A;
}

/// Parameter values for SELECT (P1)
pub mod select_p1 {
    /// Select MF, DF or EF by identifier
    pub const BY_ID: u8 = 0x00;
    /// Select EF under the current DF
    pub const EF_UNDER_CURRENT_DF: u8 = 0x02;
    /// Select by DF name
    pub const BY_NAME: u8 = 0x04;
}

/// Parameter values for SELECT (P2)
pub mod select_p2 {
    /// Return the FCI template
    pub const RETURN_FCI: u8 = 0x00;
    /// No response data
    pub const NO_RESPONSE_DATA: u8 = 0x0C;
}

/// File identifiers
pub mod file {
    /// Master file
    pub const MASTER_FILE: [u8; 2] = [0x3F, 0x00];
    /// EF.CardAccess, the modern handshake capability object
    pub const CARD_ACCESS: [u8; 2] = [0x01, 0x1C];
}

/// Application identifier of the eMRTD LDS1 application
pub const EMRTD_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];

/// Tag of the DER `SET` wrapping the security infos in EF.CardAccess and DG14
pub const SECURITY_INFOS_TAG: u8 = 0x31;

/// Tag of the data group tag list inside EF.COM
pub const TAG_LIST_TAG: u8 = 0x5C;

/// Tag of the offset data object carried by the odd READ BINARY
pub const OFFSET_DATA_OBJECT_TAG: u8 = 0x54;

/// Highest offset addressable by the even READ BINARY
pub const MAX_SHORT_OFFSET: usize = 0x7FFF;

/// Bytes read up front to learn the length of a data group
pub const DATA_GROUP_HEADER_LEN: u8 = 4;
