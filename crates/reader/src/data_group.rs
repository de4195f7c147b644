//! Data group identifiers and raw data group containers

use bytes::Bytes;
use derive_more::Display;
use iso7816_tlv::ber::{Tlv, Value};

use crate::constants::TAG_LIST_TAG;

/// Logical object stored on the chip
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataGroupId {
    /// Common data, lists the groups present
    #[display("COM")]
    Com,
    /// Machine readable zone
    #[display("DG1")]
    Dg1,
    /// Encoded face
    #[display("DG2")]
    Dg2,
    /// Encoded fingerprints
    #[display("DG3")]
    Dg3,
    /// Encoded irises
    #[display("DG4")]
    Dg4,
    /// Displayed portrait
    #[display("DG5")]
    Dg5,
    /// Reserved for future use
    #[display("DG6")]
    Dg6,
    /// Displayed signature or usual mark
    #[display("DG7")]
    Dg7,
    /// Data features
    #[display("DG8")]
    Dg8,
    /// Structure features
    #[display("DG9")]
    Dg9,
    /// Substance features
    #[display("DG10")]
    Dg10,
    /// Additional personal details
    #[display("DG11")]
    Dg11,
    /// Additional document details
    #[display("DG12")]
    Dg12,
    /// Optional details
    #[display("DG13")]
    Dg13,
    /// Security options, chip authentication public keys
    #[display("DG14")]
    Dg14,
    /// Active authentication public key
    #[display("DG15")]
    Dg15,
    /// Persons to notify
    #[display("DG16")]
    Dg16,
    /// Document security object
    #[display("SOD")]
    Sod,
}

impl DataGroupId {
    /// Every identifier, in file identifier order
    pub const ALL: [Self; 18] = [
        Self::Com,
        Self::Dg1,
        Self::Dg2,
        Self::Dg3,
        Self::Dg4,
        Self::Dg5,
        Self::Dg6,
        Self::Dg7,
        Self::Dg8,
        Self::Dg9,
        Self::Dg10,
        Self::Dg11,
        Self::Dg12,
        Self::Dg13,
        Self::Dg14,
        Self::Dg15,
        Self::Dg16,
        Self::Sod,
    ];

    /// Elementary file identifier
    pub const fn file_id(&self) -> [u8; 2] {
        let low = match self {
            Self::Com => 0x1E,
            Self::Dg1 => 0x01,
            Self::Dg2 => 0x02,
            Self::Dg3 => 0x03,
            Self::Dg4 => 0x04,
            Self::Dg5 => 0x05,
            Self::Dg6 => 0x06,
            Self::Dg7 => 0x07,
            Self::Dg8 => 0x08,
            Self::Dg9 => 0x09,
            Self::Dg10 => 0x0A,
            Self::Dg11 => 0x0B,
            Self::Dg12 => 0x0C,
            Self::Dg13 => 0x0D,
            Self::Dg14 => 0x0E,
            Self::Dg15 => 0x0F,
            Self::Dg16 => 0x10,
            Self::Sod => 0x1D,
        };
        [0x01, low]
    }

    /// Outer BER tag of the file content
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Com => 0x60,
            Self::Dg1 => 0x61,
            Self::Dg2 => 0x75,
            Self::Dg3 => 0x63,
            Self::Dg4 => 0x76,
            Self::Dg5 => 0x65,
            Self::Dg6 => 0x66,
            Self::Dg7 => 0x67,
            Self::Dg8 => 0x68,
            Self::Dg9 => 0x69,
            Self::Dg10 => 0x6A,
            Self::Dg11 => 0x6B,
            Self::Dg12 => 0x6C,
            Self::Dg13 => 0x6D,
            Self::Dg14 => 0x6E,
            Self::Dg15 => 0x6F,
            Self::Dg16 => 0x70,
            Self::Sod => 0x77,
        }
    }

    /// Look up the identifier owning an outer tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.tag() == tag)
    }

    /// Whether the group holds extended biometrics behind extended access control
    pub const fn is_secure_element(&self) -> bool {
        matches!(self, Self::Dg3 | Self::Dg4)
    }
}

/// Why raw bytes could not be accepted as a data group
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    /// The outer tag does not belong to the expected group
    #[error("unexpected tag {found:#04x}, expected {expected:#04x}")]
    UnexpectedTag {
        /// Tag of the requested group
        expected: u8,
        /// Tag found in the file
        found: u8,
    },

    /// Not enough bytes for a BER header
    #[error("truncated header")]
    TruncatedHeader,

    /// Length form this reader does not handle
    #[error("unsupported length encoding {0:#04x}")]
    UnsupportedLength(u8),

    /// The declared length disagrees with the bytes read
    #[error("declared {declared} bytes, got {actual}")]
    LengthMismatch {
        /// Length from the header, header included
        declared: usize,
        /// Bytes actually read
        actual: usize,
    },

    /// Content could not be decoded
    #[error("{0}")]
    Malformed(String),
}

/// Header and value lengths of a BER encoded object with a single byte tag
///
/// Only the short form and the one and two byte long forms are accepted,
/// which covers every object an eMRTD stores.
pub fn ber_header(bytes: &[u8]) -> Result<(usize, usize), ParseFailure> {
    match bytes {
        [_, len, ..] if *len < 0x80 => Ok((2, usize::from(*len))),
        [_, 0x81, len, ..] => Ok((3, usize::from(*len))),
        [_, 0x82, hi, lo, ..] => Ok((4, usize::from(u16::from_be_bytes([*hi, *lo])))),
        [_, 0x81 | 0x82, ..] | [] | [_] => Err(ParseFailure::TruncatedHeader),
        [_, form, ..] => Err(ParseFailure::UnsupportedLength(*form)),
    }
}

/// Raw content of one data group, validated against its outer tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataGroup {
    id: DataGroupId,
    raw: Bytes,
    header_len: usize,
}

impl DataGroup {
    pub(crate) const fn new(id: DataGroupId, raw: Bytes, header_len: usize) -> Self {
        Self { id, raw, header_len }
    }

    /// Which group this is
    pub const fn id(&self) -> DataGroupId {
        self.id
    }

    /// The file content, outer tag and length included
    pub const fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The value inside the outer tag
    pub fn value(&self) -> Bytes {
        self.raw.slice(self.header_len..)
    }

    /// Groups announced in the tag list of EF.COM
    ///
    /// Unknown tags are skipped. Fails when called on any other group or
    /// when the tag list is missing.
    pub fn tag_list(&self) -> Result<Vec<DataGroupId>, ParseFailure> {
        if self.id != DataGroupId::Com {
            return Err(ParseFailure::Malformed(format!("{} has no tag list", self.id)));
        }

        let tlv = Tlv::from_bytes(&self.raw)
            .map_err(|e| ParseFailure::Malformed(format!("{e:?}")))?;
        let Value::Constructed(children) = tlv.value() else {
            return Err(ParseFailure::Malformed("COM is not constructed".into()));
        };

        children
            .iter()
            .find(|child| child.tag().to_bytes() == [TAG_LIST_TAG])
            .and_then(|child| match child.value() {
                Value::Primitive(tags) => Some(
                    tags.iter()
                        .filter_map(|tag| DataGroupId::from_tag(*tag))
                        .collect(),
                ),
                Value::Constructed(_) => None,
            })
            .ok_or_else(|| ParseFailure::Malformed("COM has no tag list".into()))
    }
}
