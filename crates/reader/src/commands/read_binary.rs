//! READ BINARY command
//!
//! Offsets up to `0x7FFF` fit in P1-P2 of the even instruction. Larger
//! offsets use the odd instruction with the offset carried in data object
//! `54`.

use bytes::{BufMut, Bytes, BytesMut};
use mrtd_apdu_core::{ApduCommand, ExpectedLength};

use crate::constants::{MAX_SHORT_OFFSET, OFFSET_DATA_OBJECT_TAG, cla, ins};

/// READ BINARY command on the currently selected EF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBinaryCommand {
    offset: usize,
    le: ExpectedLength,
    offset_object: Option<Bytes>,
}

impl ReadBinaryCommand {
    /// Read `le` bytes starting at `offset`
    pub fn new(offset: usize, le: ExpectedLength) -> Self {
        let offset_object = (offset > MAX_SHORT_OFFSET).then(|| offset_data_object(offset));
        Self {
            offset,
            le,
            offset_object,
        }
    }

    /// Offset this command reads from
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

/// Offset data object with the minimal big endian encoding of `offset`
fn offset_data_object(offset: usize) -> Bytes {
    let digits = offset.to_be_bytes();
    let first = digits
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(digits.len() - 1);
    let value = &digits[first..];

    let mut buf = BytesMut::with_capacity(2 + value.len());
    buf.put_u8(OFFSET_DATA_OBJECT_TAG);
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
    buf.freeze()
}

impl ApduCommand for ReadBinaryCommand {
    fn class(&self) -> u8 {
        cla::ISO7816
    }

    fn instruction(&self) -> u8 {
        match self.offset_object {
            Some(_) => ins::READ_BINARY_ODD,
            None => ins::READ_BINARY,
        }
    }

    fn p1(&self) -> u8 {
        match self.offset_object {
            Some(_) => 0x00,
            None => (self.offset >> 8) as u8,
        }
    }

    fn p2(&self) -> u8 {
        match self.offset_object {
            Some(_) => 0x00,
            None => self.offset as u8,
        }
    }

    fn data(&self) -> Option<&[u8]> {
        self.offset_object.as_deref()
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        Some(self.le)
    }
}
