//! Error types specific to card transport

/// Link-level failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// More than one chip is in the field
    #[error("More than one tag detected")]
    MultipleTags,

    /// The detected tag does not speak ISO 7816
    #[error("Tag not valid")]
    TagNotValid,

    /// Could not connect to the tag
    #[error("Failed to connect to tag")]
    Connection,

    /// The tag left the field mid-session
    #[error("Tag connection lost")]
    ConnectionLost,

    /// The host reader session was invalidated
    #[error("Session invalidated")]
    SessionInvalidated,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled by the user or the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// The transport was used after being released
    #[error("Transport already released")]
    Released,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Check if the user or the caller cancelled the session
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
