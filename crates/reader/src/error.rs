//! Error types for reading a document
//!
//! Every terminal failure of a session is one [`Error`], and every [`Error`]
//! maps to exactly one user facing [`ErrorCategory`].

use derive_more::Display;
use mrtd_apdu_core::{FailureKind, SecureChannelProtocol, StatusWord, TransportError};

use crate::data_group::{DataGroupId, ParseFailure};
use crate::orchestrator::AuthFailure;
use crate::sequence::SequenceStep;

/// Result type for reader operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Terminal failure of a read attempt
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Link level failure: no chip, several chips, connection dropped or cancelled
    #[error("Link error: {0}")]
    Link(#[from] TransportError),

    /// Key agreement failed and no fallback was left
    #[error("{protocol} handshake failed: {cause}")]
    Handshake {
        /// Protocol of the last handshake attempted
        protocol: SecureChannelProtocol,
        /// Why it failed
        cause: AuthFailure,
    },

    /// A required data group could not be read
    #[error("Failed to read {group}: {kind}")]
    Read {
        /// The group
        group: DataGroupId,
        /// Classification of the last failure
        kind: FailureKind,
    },

    /// The chip rejected the PIN
    #[error("PIN verification failed ({status}), remaining attempts: {remaining_attempts:?}")]
    Pin {
        /// Attempts left, when the chip reports them
        remaining_attempts: Option<u8>,
        /// Status word returned by VERIFY
        status: StatusWord,
    },

    /// A step of the command sequence failed
    #[error("Command sequence failed while {step}: {source}")]
    Sequence {
        /// The step that failed
        step: SequenceStep,
        /// Underlying APDU error
        #[source]
        source: mrtd_apdu_core::Error,
    },

    /// The certificate kept growing past the accepted size
    #[error("Certificate exceeds {limit} bytes")]
    CertificateTooLarge {
        /// Largest accepted certificate
        limit: usize,
    },

    /// Data group content could not be accepted
    #[error("Malformed {group}: {reason}")]
    Parse {
        /// The group
        group: DataGroupId,
        /// What was wrong with it
        reason: ParseFailure,
    },

    /// A data group was stored twice in the same document
    #[error("{0} already stored in the document")]
    DuplicateGroup(DataGroupId),

    /// The read request is inconsistent
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),

    /// APDU level failure outside of any recoverable context
    #[error(transparent)]
    Apdu(mrtd_apdu_core::Error),
}

impl From<mrtd_apdu_core::Error> for Error {
    fn from(error: mrtd_apdu_core::Error) -> Self {
        match error.transport_error() {
            Some(link) => Self::Link(link.clone()),
            None => Self::Apdu(error),
        }
    }
}

impl Error {
    /// The user facing category of this failure
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Link(TransportError::TagNotValid) => ErrorCategory::DocumentNotValid,
            Self::Link(TransportError::MultipleTags) => ErrorCategory::MultipleDocuments,
            Self::Link(_) => ErrorCategory::ConnectionProblem,
            Self::Handshake { .. } | Self::Pin { .. } => ErrorCategory::AuthenticationProblem,
            Self::Read { .. }
            | Self::Sequence { .. }
            | Self::Parse { .. }
            | Self::CertificateTooLarge { .. }
            | Self::DuplicateGroup(_)
            | Self::InvalidRequest(_)
            | Self::Apdu(_) => ErrorCategory::UnexpectedProblem,
        }
    }

    /// Whether the session ended because it was cancelled
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Link(TransportError::Cancelled))
    }

    /// Attempts left after a PIN failure, when the chip reported them
    pub const fn remaining_pin_attempts(&self) -> Option<u8> {
        match self {
            Self::Pin {
                remaining_attempts, ..
            } => *remaining_attempts,
            _ => None,
        }
    }
}

/// Human level category of a terminal failure
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The tag is not an ISO 7816 document
    #[display("document not valid")]
    DocumentNotValid,
    /// Several documents were presented at once
    #[display("multiple documents")]
    MultipleDocuments,
    /// The link dropped or the session was cancelled
    #[display("connection problem")]
    ConnectionProblem,
    /// Handshake or PIN rejected
    #[display("authentication problem")]
    AuthenticationProblem,
    /// Anything else
    #[display("unexpected problem")]
    UnexpectedProblem,
}
