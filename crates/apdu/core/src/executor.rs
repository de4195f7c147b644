//! Executor for APDU command execution
//!
//! [`CardExecutor`] owns the transport together with the secure channel
//! currently in force, and routes every command through it.

use std::fmt;

use async_trait::async_trait;
use tracing::{Level, debug, instrument, trace};

use crate::command::Command;
use crate::response::{ApduResponse, Response};
use crate::secure_channel::{SecureChannelContext, SecureChannelProtocol};
use crate::transport::CardTransport;
use crate::Result;

/// Trait for APDU command execution
#[async_trait]
pub trait Executor: Send + fmt::Debug {
    /// Transmit a command, applying secure messaging if a channel is open
    async fn transmit(&mut self, command: &Command) -> Result<Response>;

    /// Protocol of the secure channel in force, if any
    fn secure_channel_protocol(&self) -> Option<SecureChannelProtocol>;

    /// Show status text to whoever is holding the document
    fn display_message(&mut self, _text: &str) {}
}

/// Card executor combining a transport with an optional secure channel
pub struct CardExecutor<T: CardTransport> {
    /// The transport used for communication
    transport: T,
    /// Secure channel in force
    secure_channel: Option<SecureChannelContext>,
}

impl<T: CardTransport> fmt::Debug for CardExecutor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardExecutor")
            .field("transport", &self.transport)
            .field(
                "secure_channel",
                &self.secure_channel.as_ref().map(SecureChannelContext::protocol),
            )
            .finish()
    }
}

impl<T: CardTransport> CardExecutor<T> {
    /// Create a new card executor with the given transport
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            secure_channel: None,
        }
    }

    /// Get a reference to the underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take ownership of the transport and return it
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Install a freshly established secure channel, returning the one it replaces
    pub fn open_secure_channel(
        &mut self,
        context: SecureChannelContext,
    ) -> Option<SecureChannelContext> {
        debug!(protocol = %context.protocol(), "Opening secure channel");
        self.secure_channel.replace(context)
    }

    /// Drop the secure channel in force, if any
    pub fn close_secure_channel(&mut self) -> Option<SecureChannelContext> {
        let previous = self.secure_channel.take();
        if let Some(context) = &previous {
            debug!(protocol = %context.protocol(), "Closed secure channel");
        }
        previous
    }

    /// Whether a secure channel is in force
    pub const fn has_secure_channel(&self) -> bool {
        self.secure_channel.is_some()
    }
}

#[async_trait]
impl<T: CardTransport> Executor for CardExecutor<T> {
    #[instrument(level = "trace", skip_all, fields(ins = command.ins))]
    async fn transmit(&mut self, command: &Command) -> Result<Response> {
        let response = match &mut self.secure_channel {
            Some(context) => {
                let protected = context.protect(command)?;
                let response = self.transport.exchange(&protected).await?;
                context.unprotect(response)?
            }
            None => self.transport.exchange(command).await?,
        };

        let status = response.status();
        if status.tracing_level() == Level::DEBUG {
            trace!(%status, "Command completed");
        } else {
            debug!(%status, description = status.description(), "Command rejected");
        }

        Ok(response)
    }

    fn secure_channel_protocol(&self) -> Option<SecureChannelProtocol> {
        self.secure_channel.as_ref().map(SecureChannelContext::protocol)
    }

    fn display_message(&mut self, text: &str) {
        self.transport.display_message(text);
    }
}
