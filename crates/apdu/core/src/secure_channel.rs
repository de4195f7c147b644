//! Secure messaging abstractions
//!
//! The key agreement protocols (PACE, BAC, chip authentication) live outside
//! this crate. Whatever they produce is handed over as a boxed
//! [`SecureMessaging`] implementation wrapped in a [`SecureChannelContext`].

use std::fmt;

use crate::command::Command;
use crate::error::Result;
use crate::response::Response;

/// Protocol that produced a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecureChannelProtocol {
    /// Password authenticated connection establishment
    Pace,
    /// Basic access control
    Bac,
    /// Chip authentication, re-keying an existing channel
    ChipAuthentication,
}

impl fmt::Display for SecureChannelProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pace => f.write_str("PACE"),
            Self::Bac => f.write_str("BAC"),
            Self::ChipAuthentication => f.write_str("Chip Authentication"),
        }
    }
}

/// Trait for command protection in secure channels
///
/// Implementations hold session keys and send sequence counters, so both
/// methods take `&mut self` and must be called strictly in exchange order.
pub trait SecureMessaging: Send + Sync + fmt::Debug {
    /// Wrap a plain command into its protected form
    fn protect(&mut self, command: &Command) -> Result<Command>;

    /// Verify and unwrap a protected response
    fn unprotect(&mut self, response: Response) -> Result<Response>;
}

/// Secure messaging state produced by a successful handshake
///
/// Opaque to everything but the executor. A new handshake produces a new
/// context that replaces the previous one wholesale.
#[derive(Debug)]
pub struct SecureChannelContext {
    protocol: SecureChannelProtocol,
    messaging: Box<dyn SecureMessaging>,
}

impl SecureChannelContext {
    /// Wrap the secure messaging produced by `protocol`
    pub fn new(protocol: SecureChannelProtocol, messaging: Box<dyn SecureMessaging>) -> Self {
        Self {
            protocol,
            messaging,
        }
    }

    /// Protocol that established this channel
    pub const fn protocol(&self) -> SecureChannelProtocol {
        self.protocol
    }

    pub(crate) fn protect(&mut self, command: &Command) -> Result<Command> {
        self.messaging.protect(command)
    }

    pub(crate) fn unprotect(&mut self, response: Response) -> Result<Response> {
        self.messaging.unprotect(response)
    }
}
