//! Transport traits for APDU communication with chips
//!
//! A transport is responsible for carrying raw APDU bytes to a chip and back.
//! It has no knowledge of command structure, secure messaging or recovery.

pub mod error;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

use crate::command::ApduCommand;
use crate::response::Response;
use crate::{Error, Result};

/// Trait for chip transports
///
/// Each call suspends until exactly one exchange completes. Implementations
/// are exclusively owned by a single session, so `&mut self` guarantees only
/// one APDU is ever in flight.
#[async_trait]
pub trait CardTransport: Send + Sync + fmt::Debug {
    /// Wait until exactly one chip is attached and connect to it
    ///
    /// Zero chips in the field keeps the call pending; several chips fail
    /// with [`TransportError::MultipleTags`].
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Send raw APDU bytes to the chip and return the raw response bytes
    async fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Advise the transport of the largest read window callers will request
    fn set_max_read_chunk(&mut self, _len: usize) {}

    /// Show status text to whoever is holding the document
    fn display_message(&mut self, _text: &str) {}

    /// Release the link, optionally leaving a final message for the user
    async fn disconnect(&mut self, message: Option<&str>);

    /// Frame a command, transmit it and parse the response
    async fn exchange(&mut self, command: &(dyn ApduCommand + Sync)) -> Result<Response> {
        command.validate()?;
        let raw = command.to_bytes();
        trace!(command = %hex::encode(&raw), "Transmitting command");

        let result = self.transmit_raw(&raw).await;
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }

        Response::from_bytes(&result.map_err(Error::from)?)
    }
}

#[cfg(test)]
pub(crate) use mock::MockTransport;


#[cfg(test)]
mod tests {
    use super::*;
    use crate::Command;
    use crate::response::ApduResponse;
    use hex_literal::hex;

    #[tokio::test]
    async fn test_exchange_frames_and_parses() {
        let mut transport = MockTransport::new([&hex!("01029000")[..]]);
        let response = transport
            .exchange(&Command::new_with_le(0x00, 0xB0, 0x00, 0x00, 0x02))
            .await
            .unwrap();

        assert_eq!(transport.commands[0].as_ref(), hex!("00B0000002"));
        assert_eq!(response.payload().as_ref(), hex!("0102"));
        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_exchange_surfaces_link_errors() {
        let mut transport = MockTransport::default();
        transport
            .responses
            .push_back(Err(TransportError::ConnectionLost));

        let err = transport
            .exchange(&Command::new(0x00, 0xA4, 0x00, 0x00))
            .await
            .unwrap_err();
        assert_eq!(err, Error::Transport(TransportError::ConnectionLost));
    }

    #[tokio::test]
    async fn test_exchange_rejects_oversized_commands() {
        let mut transport = MockTransport::default();
        let err = transport
            .exchange(&Command::new_with_data(0x00, 0x20, 0x00, 0x05, vec![0u8; 300]))
            .await
            .unwrap_err();
        assert_eq!(err, Error::InvalidCommandLength(300));
        assert!(transport.commands.is_empty());
    }
}
