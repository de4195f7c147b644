//! Chip responses: body followed by the SW1 SW2 trailer

pub mod status;

use bytes::Bytes;
use tracing::trace;

use crate::{Error, Result};
use status::StatusWord;

/// Read access shared by plain and unwrapped secure messaging responses
pub trait ApduResponse: Sized {
    /// Body without the trailer
    fn payload(&self) -> &Bytes;

    /// Trailer
    fn status(&self) -> StatusWord;

    /// Whether the trailer is 90 00
    fn is_success(&self) -> bool {
        self.status().is_success()
    }
}

/// One response from the chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Bytes,
    status: StatusWord,
}

impl Response {
    /// Response from a body and a trailer
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Body with a 90 00 trailer
    pub fn success(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, status::common::SUCCESS)
    }

    /// Split what the transport returned; the body shares `raw`'s buffer
    pub fn from_bytes(raw: &Bytes) -> Result<Self> {
        let (status, body_len) = StatusWord::split_trailer(raw)?;
        trace!(%status, body_len, "Chip responded");
        Ok(Self {
            payload: raw.slice(..body_len),
            status,
        })
    }

    /// The body, or the trailer as an error when it is not 90 00
    pub fn into_payload(self) -> Result<Bytes> {
        if self.is_success() {
            Ok(self.payload)
        } else {
            Err(Error::Status {
                status: self.status,
            })
        }
    }
}

impl ApduResponse for Response {
    fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn status(&self) -> StatusWord {
        self.status
    }
}

impl TryFrom<Bytes> for Response {
    type Error = Error;

    fn try_from(raw: Bytes) -> Result<Self> {
        Self::from_bytes(&raw)
    }
}
