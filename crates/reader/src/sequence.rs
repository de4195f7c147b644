//! Authenticated command sequence run after the data groups
//!
//! Over the established channel: select the root object, select the signing
//! application, verify the PIN, sign the caller's challenge and page through
//! the signer certificate. Every step runs, in this order, or the sequence
//! fails at the first step that does not succeed.

use bytes::{Bytes, BytesMut};
use derive_more::Display;
use mrtd_apdu_core::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::commands::{
    ManageSecurityEnvironmentCommand, ReadBinaryCommand, SelectCommand, SignCommand,
    VerifyPinCommand,
};
use crate::config::SigningProfile;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::{Error, Result};

/// Step of the command sequence
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceStep {
    /// Selecting the root object
    #[display("selecting the root object")]
    SelectRoot,
    /// Selecting the signing application
    #[display("selecting the signing application")]
    SelectSigningApplication,
    /// Verifying the PIN
    #[display("verifying the PIN")]
    VerifyPin,
    /// Setting the security environment and signing the challenge
    #[display("signing the challenge")]
    SignChallenge,
    /// Selecting the certificate object
    #[display("selecting the certificate")]
    SelectCertificate,
    /// Paging through the certificate
    #[display("reading the certificate")]
    ReadCertificate,
}

impl SequenceStep {
    /// Whether the step only sets up the signing application
    pub const fn is_setup(&self) -> bool {
        matches!(self, Self::SelectRoot | Self::SelectSigningApplication)
    }
}

/// What the sequence produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOutput {
    /// Signature over the challenge
    pub signed_challenge: Bytes,
    /// The signer certificate
    pub certificate: Bytes,
}

/// The fixed command sequence against a signing application
#[derive(Debug, Clone, Copy)]
pub struct SecureCommandSequence<'a> {
    profile: &'a SigningProfile,
}

impl<'a> SecureCommandSequence<'a> {
    /// Sequence against the application described by `profile`
    pub const fn new(profile: &'a SigningProfile) -> Self {
        Self { profile }
    }

    /// Run all steps
    #[instrument(level = "debug", skip_all)]
    pub async fn run<E: Executor + ?Sized>(
        &self,
        executor: &mut E,
        pin: &str,
        challenge: &[u8],
        progress: &ProgressReporter,
    ) -> Result<SequenceOutput> {
        let profile = self.profile;

        executor.display_message(&progress.message(&ProgressEvent::VerifyingPin));
        self.expect_success(
            executor,
            SequenceStep::SelectRoot,
            SelectCommand::by_id(profile.root_file).to_command(),
        )
        .await?;
        self.expect_success(
            executor,
            SequenceStep::SelectSigningApplication,
            SelectCommand::with_aid(profile.application_aid.clone()).to_command(),
        )
        .await?;

        self.verify_pin(executor, pin).await?;
        executor.display_message(&progress.message(&ProgressEvent::PinVerified));

        executor.display_message(&progress.message(&ProgressEvent::SigningChallenge));
        self.expect_success(
            executor,
            SequenceStep::SignChallenge,
            ManageSecurityEnvironmentCommand::set_signature_template(
                profile.security_environment.clone(),
            )
            .to_command(),
        )
        .await?;
        let signed_challenge = self
            .expect_success(
                executor,
                SequenceStep::SignChallenge,
                SignCommand::with_challenge(Bytes::copy_from_slice(challenge)).to_command(),
            )
            .await?;
        info!(len = signed_challenge.len(), "Challenge signed");

        executor.display_message(&progress.message(&ProgressEvent::ReadingCertificate));
        self.expect_success(
            executor,
            SequenceStep::SelectCertificate,
            SelectCommand::by_id(profile.certificate_file).to_command(),
        )
        .await?;
        let certificate = self.read_certificate(executor).await?;
        info!(len = certificate.len(), "Certificate read");

        Ok(SequenceOutput {
            signed_challenge,
            certificate,
        })
    }

    async fn expect_success<E: Executor + ?Sized>(
        &self,
        executor: &mut E,
        step: SequenceStep,
        command: Command,
    ) -> Result<Bytes> {
        let response = executor
            .transmit(&command)
            .await
            .map_err(|e| step_error(step, e))?;
        response.into_payload().map_err(|e| step_error(step, e))
    }

    async fn verify_pin<E: Executor + ?Sized>(&self, executor: &mut E, pin: &str) -> Result<()> {
        let command =
            VerifyPinCommand::with_pin(pin, self.profile.pin_reference, self.profile.pin_padded_len);
        let response = executor
            .transmit(&command.to_command())
            .await
            .map_err(|e| step_error(SequenceStep::VerifyPin, e))?;

        let status = response.status();
        if status.is_success() {
            debug!("PIN accepted");
            return Ok(());
        }

        let remaining_attempts = status
            .remaining_attempts()
            .or_else(|| status.is_authentication_blocked().then_some(0));
        warn!(%status, ?remaining_attempts, "PIN rejected");
        Err(Error::Pin {
            remaining_attempts,
            status,
        })
    }

    /// Read the selected certificate page by page until a short page
    async fn read_certificate<E: Executor + ?Sized>(&self, executor: &mut E) -> Result<Bytes> {
        let page_len = self.profile.page_len;
        let full_page = if page_len == 0 { 256 } else { usize::from(page_len) };
        let mut certificate = BytesMut::new();

        loop {
            let offset = certificate.len();
            let response = executor
                .transmit(&ReadBinaryCommand::new(offset, page_len).to_command())
                .await
                .map_err(|e| step_error(SequenceStep::ReadCertificate, e))?;

            let status = response.status();
            let page = if status.is_success() || status.is_end_of_file() {
                response.payload().clone()
            } else if status.is_wrong_parameters() && offset > 0 {
                Bytes::new()
            } else {
                return Err(step_error(
                    SequenceStep::ReadCertificate,
                    mrtd_apdu_core::Error::Status { status },
                ));
            };

            debug!(offset, len = page.len(), "Read certificate page");
            certificate.extend_from_slice(&page);
            if page.len() < full_page {
                break;
            }
            if certificate.len() >= self.profile.max_certificate_len {
                return Err(Error::CertificateTooLarge {
                    limit: self.profile.max_certificate_len,
                });
            }
        }

        Ok(certificate.freeze())
    }
}

/// Link failures surface as such, anything else belongs to the step
fn step_error(step: SequenceStep, error: mrtd_apdu_core::Error) -> Error {
    match error.transport_error() {
        Some(link) => Error::Link(link.clone()),
        None => Error::Sequence {
            step,
            source: error,
        },
    }
}
