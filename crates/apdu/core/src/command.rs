//! Short command APDUs as sent to travel document chips

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Le of a short APDU; `0x00` asks for up to 256 bytes
pub type ExpectedLength = u8;

/// Largest data field a short command APDU can carry
pub const MAX_SHORT_DATA: usize = 255;

/// Anything that can be framed as CLA INS P1 P2 [Lc data] [Le]
pub trait ApduCommand {
    /// CLA
    fn class(&self) -> u8;

    /// INS
    fn instruction(&self) -> u8;

    /// P1
    fn p1(&self) -> u8;

    /// P2
    fn p2(&self) -> u8;

    /// Data field, without Lc
    fn data(&self) -> Option<&[u8]>;

    /// Le, when a body is expected back
    fn expected_length(&self) -> Option<ExpectedLength>;

    /// Check that the command can be framed as a short APDU
    fn validate(&self) -> Result<()> {
        match self.data() {
            Some(data) if data.is_empty() => Err(Error::InvalidCommandData("empty data field")),
            Some(data) if data.len() > MAX_SHORT_DATA => {
                Err(Error::InvalidCommandLength(data.len()))
            }
            _ => Ok(()),
        }
    }

    /// Wire form
    fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.class());
        buffer.put_u8(self.instruction());
        buffer.put_u8(self.p1());
        buffer.put_u8(self.p2());

        if let Some(data) = self.data() {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.expected_length() {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }

    /// Length of [`to_bytes`](Self::to_bytes)
    fn command_length(&self) -> usize {
        4 + self.data().map_or(0, |data| 1 + data.len())
            + usize::from(self.expected_length().is_some())
    }

    /// Owned copy as a plain [`Command`]
    fn to_command(&self) -> Command {
        Command {
            cla: self.class(),
            ins: self.instruction(),
            p1: self.p1(),
            p2: self.p2(),
            data: self.data().map(Bytes::copy_from_slice),
            le: self.expected_length(),
        }
    }
}

/// Plain command with every field spelled out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// CLA
    pub cla: u8,
    /// INS
    pub ins: u8,
    /// P1
    pub p1: u8,
    /// P2
    pub p2: u8,
    /// Data field
    pub data: Option<Bytes>,
    /// Le
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Header only, case 1
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Header and Le, case 2
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Header and data, case 3
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Header, data and Le, case 4
    pub fn new_with_data_and_le<T: Into<Bytes>>(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: T,
        le: ExpectedLength,
    ) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data).with_le(le)
    }

    /// Replace the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Replace Le
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Number of bytes the card is asked to return
    pub fn expected_response_len(&self) -> Option<usize> {
        self.le.map(|le| if le == 0 { 256 } else { usize::from(le) })
    }

    /// Parse the wire form back, as a simulated chip sees it
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);

        match data.len() {
            4 => {}
            5 => command.le = Some(data[4]),
            len => {
                let lc = data[4] as usize;
                if lc == 0 || len < 5 + lc || len > 6 + lc {
                    return Err(Error::InvalidCommandLength(len));
                }
                command.data = Some(Bytes::copy_from_slice(&data[5..5 + lc]));
                if len == 6 + lc {
                    command.le = Some(data[5 + lc]);
                }
            }
        }

        Ok(command)
    }
}

impl ApduCommand for Command {
    fn class(&self) -> u8 {
        self.cla
    }

    fn instruction(&self) -> u8 {
        self.ins
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        self.le
    }
}
