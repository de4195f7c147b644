//! Closed classification of chip and link failures
//!
//! [`FailureKind`] is produced by the layer that observes the failure (status
//! word decoding or the transport) so recovery policy never has to inspect
//! human readable error text.

use std::fmt;

use crate::response::status::StatusWord;
use crate::transport::TransportError;

/// What went wrong, reduced to the distinctions recovery cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The radio link to the chip was lost
    LinkDropped,
    /// The host session was invalidated underneath us
    SessionInvalidated,
    /// The caller cancelled the session
    Cancelled,
    /// Class byte not supported (6E 00)
    ClassNotSupported,
    /// Security status not satisfied (69 82)
    AccessDenied,
    /// File or application not found (6A 82)
    ObjectNotFound,
    /// Secure messaging data objects missing or incorrect (69 87 / 69 88),
    /// or a response MAC that failed to verify
    SecureMessagingIntegrity,
    /// Wrong length (67 00) or wrong Le (6C XX)
    WrongLength,
    /// End of file reached before Le bytes were read (62 82)
    EndOfFile,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Whether the failure came from the link rather than from the chip
    pub const fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::LinkDropped | Self::SessionInvalidated | Self::Cancelled
        )
    }
}

impl From<StatusWord> for FailureKind {
    fn from(status: StatusWord) -> Self {
        match (status.sw1, status.sw2) {
            (0x6E, 0x00) => Self::ClassNotSupported,
            (0x69, 0x82) => Self::AccessDenied,
            (0x6A, 0x82) => Self::ObjectNotFound,
            (0x69, 0x87) | (0x69, 0x88) => Self::SecureMessagingIntegrity,
            (0x67, 0x00) | (0x6C, _) => Self::WrongLength,
            (0x62, 0x82) => Self::EndOfFile,
            _ => Self::Other,
        }
    }
}

impl From<&TransportError> for FailureKind {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::ConnectionLost | TransportError::Timeout => Self::LinkDropped,
            TransportError::SessionInvalidated => Self::SessionInvalidated,
            TransportError::Cancelled => Self::Cancelled,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::LinkDropped => "tag connection lost",
            Self::SessionInvalidated => "session invalidated",
            Self::Cancelled => "cancelled",
            Self::ClassNotSupported => "class not supported",
            Self::AccessDenied => "security status not satisfied",
            Self::ObjectNotFound => "file not found",
            Self::SecureMessagingIntegrity => "SM data objects incorrect",
            Self::WrongLength => "wrong length",
            Self::EndOfFile => "end of file",
            Self::Other => "unclassified failure",
        };
        f.write_str(text)
    }
}
