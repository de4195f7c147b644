//! Progress checkpoints and the text shown for them
//!
//! Every checkpoint has a default message. A caller supplied handler sees
//! each event and may return replacement text; its answer never changes
//! what the session does next.

use std::fmt;

use derive_more::Display;

use crate::data_group::DataGroupId;
use crate::error::ErrorCategory;

/// Checkpoint reached by a session
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Waiting for a document to enter the field
    #[display("awaiting chip")]
    AwaitingChip,
    /// Handshake in progress
    #[display("authenticating")]
    Authenticating,
    /// Reading one data group
    #[display("reading {group} ({index} of {total})")]
    ReadingDataGroup {
        /// The group being read
        group: DataGroupId,
        /// One based position in the read plan
        index: usize,
        /// Groups in the read plan
        total: usize,
    },
    /// Submitting the PIN
    #[display("verifying PIN")]
    VerifyingPin,
    /// The chip accepted the PIN
    #[display("PIN verified")]
    PinVerified,
    /// Asking the chip to sign the challenge
    #[display("signing challenge")]
    SigningChallenge,
    /// Paging through the certificate
    #[display("reading certificate")]
    ReadingCertificate,
    /// Everything was read
    #[display("completed")]
    Completed,
    /// The session failed
    #[display("failed: {_0}")]
    Failed(ErrorCategory),
}

impl ProgressEvent {
    /// Text shown when no handler overrides it
    pub const fn default_message(&self) -> &'static str {
        match self {
            Self::AwaitingChip => "Hold your device near an NFC enabled passport.",
            Self::Authenticating => "Authenticating with passport ...",
            Self::ReadingDataGroup { .. } => "Reading user data ...",
            Self::VerifyingPin => "Authenticating with PIN",
            Self::PinVerified => "PIN authentication successful",
            Self::SigningChallenge => "Signing challenge",
            Self::ReadingCertificate => "Reading user certificate",
            Self::Completed => "Identity document read successfully",
            Self::Failed(ErrorCategory::DocumentNotValid) => "Tag not valid.",
            Self::Failed(ErrorCategory::MultipleDocuments) => {
                "More than one tag was found. Please present only one document."
            }
            Self::Failed(ErrorCategory::ConnectionProblem) => {
                "Connection error. Please try again."
            }
            Self::Failed(ErrorCategory::AuthenticationProblem) => {
                "Invalid access key or PIN for this document."
            }
            Self::Failed(ErrorCategory::UnexpectedProblem) => {
                "Sorry, there was a problem reading the document. Please try again"
            }
        }
    }
}

/// Caller hook invoked at every checkpoint, returning replacement text
pub type ProgressHandler = Box<dyn Fn(&ProgressEvent) -> Option<String> + Send + Sync>;

/// Resolves the text for each checkpoint
#[derive(Default)]
pub struct ProgressReporter {
    handler: Option<ProgressHandler>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("custom_handler", &self.handler.is_some())
            .finish()
    }
}

impl ProgressReporter {
    /// Reporter using a custom handler
    pub fn new(handler: ProgressHandler) -> Self {
        Self {
            handler: Some(handler),
        }
    }

    /// Notify the handler and return the text to display
    pub fn message(&self, event: &ProgressEvent) -> String {
        self.handler
            .as_ref()
            .and_then(|handler| handler(event))
            .unwrap_or_else(|| event.default_message().to_owned())
    }
}
