//! Two tier handshake and chip authentication
//!
//! The modern handshake (PACE) runs when EF.CardAccess advertises it; MRZ
//! credentials fall back to the legacy handshake (BAC) when it fails or is
//! unsupported. The cryptography itself lives behind
//! [`AuthenticationHandler`]; the orchestrator only decides which handler
//! runs and installs the channel it produces.

use std::fmt;

use async_trait::async_trait;
use derive_more::Display;
use iso7816_tlv::ber::Tlv;
use mrtd_apdu_core::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::commands::SelectCommand;
use crate::config::DEFAULT_READ_CHUNK;
use crate::constants::{SECURITY_INFOS_TAG, file};
use crate::credential::Credential;
use crate::data_group::DataGroup;
use crate::reader::{FileReadError, read_elementary_file};
use crate::{Error, Result};

/// Outcome of one handshake tier
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStatus {
    /// Never attempted
    #[default]
    #[display("not attempted")]
    NotAttempted,
    /// Completed and in force
    #[display("success")]
    Success,
    /// Attempted and failed
    #[display("failed")]
    Failed,
    /// Succeeded earlier, then discarded by a re-handshake
    #[display("dropped")]
    Dropped,
}

/// Status of every handshake tier, committed together
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakeStatuses {
    /// PACE
    pub modern: HandshakeStatus,
    /// BAC
    pub legacy: HandshakeStatus,
    /// Chip authentication upgrade
    pub chip_authentication: HandshakeStatus,
}

/// Why a handshake failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// The chip does not advertise the protocol
    #[error("not supported by the chip")]
    Unsupported,

    /// No handler was configured or the tier was disabled
    #[error("not available")]
    NotAvailable,

    /// The protocol cannot use this kind of credential
    #[error("credential not accepted by this protocol")]
    CredentialNotAccepted,

    /// An APDU exchange failed
    #[error(transparent)]
    Apdu(#[from] mrtd_apdu_core::Error),

    /// The protocol itself failed, e.g. a bad cryptogram
    #[error("{0}")]
    Protocol(String),
}

impl AuthFailure {
    /// Create a protocol failure
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Apdu(error) => error.transport_error(),
            _ => None,
        }
    }
}

/// What a handler gets to work with
#[derive(Debug, Clone, Copy)]
pub struct HandshakeInput<'a> {
    /// The session credential
    pub credential: &'a Credential,
    /// EF.CardAccess for PACE, the DG14 security infos for chip
    /// authentication, nothing for BAC
    pub security_info: Option<&'a [u8]>,
}

/// One handshake protocol
///
/// Implementations exchange whatever APDUs the protocol needs through
/// `executor` and return the secure messaging state they negotiated.
#[async_trait]
pub trait AuthenticationHandler: Send + Sync + fmt::Debug {
    /// Protocol implemented by this handler
    fn protocol(&self) -> SecureChannelProtocol;

    /// Run the protocol once
    async fn attempt(
        &self,
        input: HandshakeInput<'_>,
        executor: &mut dyn Executor,
    ) -> std::result::Result<SecureChannelContext, AuthFailure>;
}

/// Runs handshakes and owns their outcome
#[derive(Debug)]
pub struct AuthenticationOrchestrator {
    credential: Credential,
    modern: Option<Box<dyn AuthenticationHandler>>,
    legacy: Option<Box<dyn AuthenticationHandler>>,
    chip_authentication: Option<Box<dyn AuthenticationHandler>>,
    skip_modern: bool,
    skip_legacy: bool,
    read_chunk: u8,
    statuses: HandshakeStatuses,
    handshakes: usize,
}

impl AuthenticationOrchestrator {
    /// Orchestrator for `credential` with no handlers configured
    pub const fn new(credential: Credential) -> Self {
        Self {
            credential,
            modern: None,
            legacy: None,
            chip_authentication: None,
            skip_modern: false,
            skip_legacy: false,
            read_chunk: DEFAULT_READ_CHUNK,
            statuses: HandshakeStatuses {
                modern: HandshakeStatus::NotAttempted,
                legacy: HandshakeStatus::NotAttempted,
                chip_authentication: HandshakeStatus::NotAttempted,
            },
            handshakes: 0,
        }
    }

    /// Set the modern handshake handler
    pub fn with_modern(mut self, handler: Box<dyn AuthenticationHandler>) -> Self {
        self.modern = Some(handler);
        self
    }

    /// Set the legacy handshake handler
    pub fn with_legacy(mut self, handler: Box<dyn AuthenticationHandler>) -> Self {
        self.legacy = Some(handler);
        self
    }

    /// Set the chip authentication handler
    pub fn with_chip_authentication(mut self, handler: Box<dyn AuthenticationHandler>) -> Self {
        self.chip_authentication = Some(handler);
        self
    }

    /// Disable either handshake tier
    pub const fn with_skips(mut self, skip_modern: bool, skip_legacy: bool) -> Self {
        self.skip_modern = skip_modern;
        self.skip_legacy = skip_legacy;
        self
    }

    /// Read window used for EF.CardAccess
    pub const fn with_read_chunk(mut self, read_chunk: u8) -> Self {
        self.read_chunk = read_chunk;
        self
    }

    /// Statuses of the last completed handshake
    pub const fn statuses(&self) -> HandshakeStatuses {
        self.statuses
    }

    /// Handshakes run so far, re-handshakes included
    pub const fn handshakes(&self) -> usize {
        self.handshakes
    }

    /// Establish a fresh secure channel
    ///
    /// The channel in force, chip authentication included, is discarded
    /// before the first handshake APDU.
    #[instrument(level = "debug", skip_all, fields(handshake = self.handshakes + 1))]
    pub async fn establish_channel<T: CardTransport>(
        &mut self,
        executor: &mut CardExecutor<T>,
    ) -> Result<HandshakeStatuses> {
        executor.close_secure_channel();
        self.handshakes += 1;

        let chip_authentication = match self.statuses.chip_authentication {
            HandshakeStatus::Success => HandshakeStatus::Dropped,
            status => status,
        };
        let mut statuses = HandshakeStatuses {
            chip_authentication,
            ..HandshakeStatuses::default()
        };
        let result = self.run_tiers(executor, &mut statuses).await;
        self.statuses = statuses;
        result.map(|()| statuses)
    }

    async fn run_tiers<T: CardTransport>(
        &self,
        executor: &mut CardExecutor<T>,
        statuses: &mut HandshakeStatuses,
    ) -> Result<()> {
        let mut modern_failure = None;

        if !self.skip_modern {
            let attempt = match self.modern.as_deref() {
                Some(handler) => self.attempt_modern(handler, executor).await,
                None => Err(AuthFailure::NotAvailable),
            };
            match attempt {
                Ok(context) => {
                    executor.open_secure_channel(context);
                    statuses.modern = HandshakeStatus::Success;
                    info!("PACE succeeded");

                    executor
                        .transmit(&SelectCommand::emrtd_application().to_command())
                        .await?
                        .into_payload()?;
                    return Ok(());
                }
                Err(cause) => {
                    if let Some(link) = cause.transport_error() {
                        return Err(Error::Link(link.clone()));
                    }
                    statuses.modern = HandshakeStatus::Failed;
                    if !self.credential.allows_legacy() {
                        warn!(%cause, "PACE failed, no fallback for a card access number");
                        return Err(Error::Handshake {
                            protocol: SecureChannelProtocol::Pace,
                            cause,
                        });
                    }
                    warn!(%cause, "PACE failed, falling back to BAC");
                    modern_failure = Some(cause);
                }
            }
        }

        if self.skip_legacy {
            return Err(Error::Handshake {
                protocol: SecureChannelProtocol::Pace,
                cause: modern_failure.unwrap_or(AuthFailure::NotAvailable),
            });
        }
        if !self.credential.allows_legacy() {
            return Err(Error::Handshake {
                protocol: SecureChannelProtocol::Bac,
                cause: AuthFailure::CredentialNotAccepted,
            });
        }

        let cause = match self.attempt_legacy(executor).await {
            Ok(context) => {
                executor.open_secure_channel(context);
                statuses.legacy = HandshakeStatus::Success;
                info!("BAC succeeded");
                return Ok(());
            }
            Err(cause) => cause,
        };

        if let Some(link) = cause.transport_error() {
            return Err(Error::Link(link.clone()));
        }
        statuses.legacy = HandshakeStatus::Failed;
        warn!(%cause, "BAC failed");
        Err(Error::Handshake {
            protocol: SecureChannelProtocol::Bac,
            cause,
        })
    }

    async fn attempt_modern<T: CardTransport>(
        &self,
        handler: &dyn AuthenticationHandler,
        executor: &mut CardExecutor<T>,
    ) -> std::result::Result<SecureChannelContext, AuthFailure> {
        let card_access = read_card_access(executor, self.read_chunk)
            .await?
            .ok_or(AuthFailure::Unsupported)?;
        if !is_security_infos(&card_access) {
            debug!(card_access = %hex::encode(&card_access), "EF.CardAccess is not a SET");
            return Err(AuthFailure::Unsupported);
        }

        let input = HandshakeInput {
            credential: &self.credential,
            security_info: Some(&card_access[..]),
        };
        handler.attempt(input, executor).await
    }

    async fn attempt_legacy<T: CardTransport>(
        &self,
        executor: &mut CardExecutor<T>,
    ) -> std::result::Result<SecureChannelContext, AuthFailure> {
        let handler = self.legacy.as_deref().ok_or(AuthFailure::NotAvailable)?;

        executor
            .transmit(&SelectCommand::emrtd_application().to_command())
            .await?
            .into_payload()?;

        let input = HandshakeInput {
            credential: &self.credential,
            security_info: None,
        };
        handler.attempt(input, executor).await
    }

    /// Whether chip authentication can run at all
    pub fn supports_chip_authentication(&self) -> bool {
        self.chip_authentication.is_some()
    }

    /// Upgrade the channel in force with chip authentication
    ///
    /// Failure is recorded but does not end the session: the channel is
    /// rebuilt with a fresh handshake and reading carries on. A link failure
    /// is returned as is.
    #[instrument(level = "debug", skip_all)]
    pub async fn authenticate_chip<T: CardTransport>(
        &mut self,
        executor: &mut CardExecutor<T>,
        dg14: &DataGroup,
    ) -> Result<HandshakeStatus> {
        let Some(handler) = self.chip_authentication.as_deref() else {
            return Ok(self.statuses.chip_authentication);
        };

        let security_infos = dg14.value();
        let input = HandshakeInput {
            credential: &self.credential,
            security_info: Some(&security_infos[..]),
        };

        let result = handler.attempt(input, executor).await;
        match result {
            Ok(context) => {
                executor.open_secure_channel(context);
                self.statuses.chip_authentication = HandshakeStatus::Success;
                info!("Chip authentication succeeded");
            }
            Err(cause) => {
                if let Some(link) = cause.transport_error() {
                    return Err(Error::Link(link.clone()));
                }
                warn!(%cause, "Chip authentication failed, re-establishing channel");
                self.statuses.chip_authentication = HandshakeStatus::Failed;
                self.establish_channel(executor).await?;
            }
        }

        Ok(self.statuses.chip_authentication)
    }
}

/// Read EF.CardAccess from the master file, `None` when the chip has none
async fn read_card_access<T: CardTransport>(
    executor: &mut CardExecutor<T>,
    read_chunk: u8,
) -> std::result::Result<Option<Bytes>, AuthFailure> {
    let selected = executor
        .transmit(&SelectCommand::master_file().to_command())
        .await?;
    if !selected.is_success() {
        debug!(status = %selected.status(), "Master file not selectable");
        return Ok(None);
    }

    match read_elementary_file(executor, file::CARD_ACCESS, read_chunk).await {
        Ok(content) => Ok(Some(content)),
        Err(FileReadError::Apdu(error)) if error.transport_error().is_some() => Err(error.into()),
        Err(error) => {
            debug!(%error, "EF.CardAccess not readable");
            Ok(None)
        }
    }
}

/// Whether `content` is a well formed DER `SET` of security infos
fn is_security_infos(content: &[u8]) -> bool {
    Tlv::from_bytes(content).is_ok_and(|tlv| tlv.tag().to_bytes() == [SECURITY_INFOS_TAG])
}
