//! Core error type for all APDU operations
//!
//! Transport failures, framing problems and secure-messaging failures are
//! consolidated here so that callers can bubble them up with `?` and still
//! recover the [`FailureKind`] a recovery policy needs.

use crate::failure::FailureKind;
use crate::response::status::StatusWord;
use crate::transport::TransportError;

/// Result type for APDU operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The link to the chip failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response shorter than the two status bytes
    #[error("Incomplete response: {0} bytes")]
    IncompleteResponse(usize),

    /// Status error from response
    #[error("Status error {status} ({})", status.description())]
    Status {
        /// Status word that caused the error
        status: StatusWord,
    },

    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Invalid command data
    #[error("Invalid command data: {0}")]
    InvalidCommandData(&'static str),

    /// Secure messaging could not protect a command or verify a response
    #[error("Secure messaging error: {0}")]
    SecureMessaging(String),

    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new status error
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self::Status {
            status: StatusWord::new(sw1, sw2),
        }
    }

    /// Create a new secure messaging error
    pub fn secure_messaging<S: Into<String>>(message: S) -> Self {
        Self::SecureMessaging(message.into())
    }

    /// The status word behind this error, if the chip reported one
    pub fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Context { source, .. } => source.status_word(),
            _ => None,
        }
    }

    /// The link failure behind this error, if the transport reported one
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(error) => Some(error),
            Self::Context { source, .. } => source.transport_error(),
            _ => None,
        }
    }

    /// Classify this error for recovery purposes
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transport(error) => FailureKind::from(error),
            Self::Status { status } => FailureKind::from(*status),
            Self::SecureMessaging(_) => FailureKind::SecureMessagingIntegrity,
            Self::Context { source, .. } => source.failure_kind(),
            Self::IncompleteResponse(_)
            | Self::InvalidCommandLength(_)
            | Self::InvalidCommandData(_) => FailureKind::Other,
        }
    }
}

/// Extension trait for Result with APDU Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
