//! Recovery policy for failed data group reads

use mrtd_apdu_core::FailureKind;

/// What to do after a read attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    /// Try the same read again over the same channel
    RetrySame,
    /// Shrink the read window, then redo the handshake
    ReduceReadWindow,
    /// Redo the handshake; with `drop_group` the group is abandoned
    RedoHandshake {
        /// Remove the group from the pending reads
        drop_group: bool,
    },
    /// Forget the chip authentication upgrade and redo the handshake
    DropAndRedoHandshake,
    /// Give up on the whole session
    Abort,
}

impl RecoveryAction {
    /// Whether a fresh handshake must run before the next attempt
    pub const fn requires_handshake(&self) -> bool {
        matches!(
            self,
            Self::ReduceReadWindow | Self::RedoHandshake { .. } | Self::DropAndRedoHandshake
        )
    }
}

/// Decide how to recover from `kind`
///
/// `chip_auth_active` tells whether the channel in force was upgraded by
/// chip authentication; only then can a lost link be recovered.
pub const fn classify(kind: FailureKind, chip_auth_active: bool) -> RecoveryAction {
    match kind {
        FailureKind::Cancelled => RecoveryAction::Abort,
        FailureKind::LinkDropped | FailureKind::SessionInvalidated | FailureKind::ClassNotSupported
            if chip_auth_active =>
        {
            RecoveryAction::DropAndRedoHandshake
        }
        FailureKind::LinkDropped | FailureKind::SessionInvalidated => RecoveryAction::Abort,
        FailureKind::AccessDenied | FailureKind::ObjectNotFound => {
            RecoveryAction::RedoHandshake { drop_group: true }
        }
        FailureKind::SecureMessagingIntegrity | FailureKind::ClassNotSupported => {
            RecoveryAction::RedoHandshake { drop_group: false }
        }
        FailureKind::WrongLength | FailureKind::EndOfFile => RecoveryAction::ReduceReadWindow,
        FailureKind::Other => RecoveryAction::RetrySame,
    }
}
