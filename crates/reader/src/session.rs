//! The session: one document, start to finish
//!
//! A [`Session`] owns the transport for its whole life. It waits for a chip,
//! establishes the secure channel, reads the data groups, optionally runs
//! the command sequence and finally releases the transport exactly once,
//! whatever the outcome. Cancelling through a [`CancelHandle`] ends the
//! session at its next suspension point.

use std::sync::Arc;

use derive_more::Display;
use mrtd_apdu_core::prelude::*;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::config::{ReaderConfig, SigningProfile};
use crate::data_group::DataGroupId;
use crate::document::DocumentModel;
use crate::orchestrator::{AuthenticationHandler, AuthenticationOrchestrator};
use crate::parser::{DataGroupParser, TlvDataGroupParser};
use crate::progress::{ProgressEvent, ProgressHandler, ProgressReporter};
use crate::reader::{DataGroupReader, ReadOutcome};
use crate::request::{ReadOptions, ReadRequest};
use crate::sequence::SecureCommandSequence;
use crate::{Error, Result};

/// Where a session stands
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, nothing done yet
    #[default]
    #[display("idle")]
    Idle,
    /// Waiting for exactly one chip
    #[display("polling")]
    Polling,
    /// Running the handshake
    #[display("authenticating")]
    Authenticating,
    /// Reading data groups
    #[display("reading data groups")]
    ReadingDataGroups,
    /// Running the PIN and signing sequence
    #[display("executing command sequence")]
    ExecutingCommandSequence,
    /// Finished successfully
    #[display("completed")]
    Completed,
    /// Finished with an error
    #[display("failed")]
    Failed,
}

impl SessionState {
    /// The state a successful step leads to
    pub const fn successor(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Polling),
            Self::Polling => Some(Self::Authenticating),
            Self::Authenticating => Some(Self::ReadingDataGroups),
            Self::ReadingDataGroups => Some(Self::ExecutingCommandSequence),
            Self::ExecutingCommandSequence => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Whether the session is over
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Records every state entered, in order
#[derive(Debug)]
struct StateMachine {
    state: SessionState,
    transitions: Vec<SessionState>,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            transitions: vec![SessionState::Idle],
        }
    }

    fn enter(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session state changed");
        self.state = next;
        self.transitions.push(next);
    }

    /// Move one step along the chain
    fn advance(&mut self) {
        if let Some(next) = self.state.successor() {
            self.enter(next);
        }
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.enter(SessionState::Failed);
        }
    }
}

/// Cancels a running session from anywhere
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation; the session ends with a cancelled link error
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Everything a finished session hands back
#[derive(Debug)]
pub struct SessionOutcome<T> {
    /// The document, or the single error that ended the session
    pub result: Result<DocumentModel>,
    /// Every state entered, starting with [`SessionState::Idle`]
    pub transitions: Vec<SessionState>,
    /// The transport, already disconnected
    pub transport: T,
}

/// Reads one document over `T`
pub struct Session<T: CardTransport> {
    transport: T,
    config: ReaderConfig,
    modern: Option<Box<dyn AuthenticationHandler>>,
    legacy: Option<Box<dyn AuthenticationHandler>>,
    chip_authentication: Option<Box<dyn AuthenticationHandler>>,
    parser: Box<dyn DataGroupParser>,
    progress: ProgressReporter,
    cancel: Arc<watch::Sender<bool>>,
}

impl<T: CardTransport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("modern", &self.modern)
            .field("legacy", &self.legacy)
            .field("chip_authentication", &self.chip_authentication)
            .field("parser", &self.parser)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl<T: CardTransport> Session<T> {
    /// Session over `transport` with the default configuration
    pub fn new(transport: T) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            transport,
            config: ReaderConfig::default(),
            modern: None,
            legacy: None,
            chip_authentication: None,
            parser: Box::new(TlvDataGroupParser),
            progress: ProgressReporter::default(),
            cancel: Arc::new(cancel),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler for the modern handshake
    ///
    /// Without one the modern handshake is recorded as failed and MRZ
    /// credentials go straight to the legacy handshake.
    pub fn with_modern_handler(mut self, handler: impl AuthenticationHandler + 'static) -> Self {
        self.modern = Some(Box::new(handler));
        self
    }

    /// Handler for the legacy handshake
    pub fn with_legacy_handler(mut self, handler: impl AuthenticationHandler + 'static) -> Self {
        self.legacy = Some(Box::new(handler));
        self
    }

    /// Handler for chip authentication after DG14
    pub fn with_chip_authentication_handler(
        mut self,
        handler: impl AuthenticationHandler + 'static,
    ) -> Self {
        self.chip_authentication = Some(Box::new(handler));
        self
    }

    /// Replace the data group parser
    pub fn with_parser(mut self, parser: impl DataGroupParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Receive every progress checkpoint, optionally overriding its text
    pub fn with_progress_handler(mut self, handler: ProgressHandler) -> Self {
        self.progress = ProgressReporter::new(handler);
        self
    }

    /// Handle that cancels this session
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            sender: Arc::clone(&self.cancel),
        }
    }

    /// Read the document described by `request`
    pub async fn read_document(self, request: ReadRequest) -> Result<DocumentModel> {
        self.run(request).await.result
    }

    /// Read the document and hand back the transport and the transitions
    #[instrument(level = "info", skip_all)]
    pub async fn run(self, request: ReadRequest) -> SessionOutcome<T> {
        let Self {
            transport,
            config,
            modern,
            legacy,
            chip_authentication,
            parser,
            progress,
            cancel,
        } = self;

        let options = request.options();
        let mut orchestrator = AuthenticationOrchestrator::new(request.credential().clone())
            .with_skips(options.skip_modern_handshake, options.skip_legacy_fallback)
            .with_read_chunk(config.read_chunk);
        if let Some(handler) = modern {
            orchestrator = orchestrator.with_modern(handler);
        }
        if let Some(handler) = legacy {
            orchestrator = orchestrator.with_legacy(handler);
        }
        if let Some(handler) = chip_authentication {
            orchestrator = orchestrator.with_chip_authentication(handler);
        }

        let mut flow = Flow {
            orchestrator,
            reader: DataGroupReader::new(config.read_chunk, config.min_read_chunk, parser),
            signing: config.signing,
            options,
            progress,
        };
        let mut machine = StateMachine::new();
        let mut executor = CardExecutor::new(transport);
        let mut cancelled = cancel.subscribe();

        let result = tokio::select! {
            biased;
            () = wait_for_cancel(&mut cancelled) => Err(Error::Link(TransportError::Cancelled)),
            result = flow.drive(&request, &mut executor, &mut machine) => result,
        };

        executor.close_secure_channel();
        let message = match &result {
            Ok(_) => {
                machine.advance();
                executor.display_message(&flow.progress.message(&ProgressEvent::Completed));
                info!("Document read");
                None
            }
            Err(e) => {
                machine.fail();
                error!(error = %e, category = %e.category(), "Session failed");
                Some(flow.progress.message(&ProgressEvent::Failed(e.category())))
            }
        };

        let mut transport = executor.into_transport();
        transport.disconnect(message.as_deref()).await;

        SessionOutcome {
            result,
            transitions: machine.transitions,
            transport,
        }
    }
}

/// Resolves once cancellation is requested, never if the sender is gone
async fn wait_for_cancel(cancelled: &mut watch::Receiver<bool>) {
    if cancelled.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// State threaded through the steps of one session
#[derive(Debug)]
struct Flow {
    orchestrator: AuthenticationOrchestrator,
    reader: DataGroupReader,
    signing: SigningProfile,
    options: ReadOptions,
    progress: ProgressReporter,
}

impl Flow {
    fn show<T: CardTransport>(&self, executor: &mut CardExecutor<T>, event: ProgressEvent) {
        executor.display_message(&self.progress.message(&event));
    }

    async fn drive<T: CardTransport>(
        &mut self,
        request: &ReadRequest,
        executor: &mut CardExecutor<T>,
        machine: &mut StateMachine,
    ) -> Result<DocumentModel> {
        request.validate()?;

        machine.advance();
        self.show(executor, ProgressEvent::AwaitingChip);
        executor.transport_mut().connect().await?;
        executor
            .transport_mut()
            .set_max_read_chunk(usize::from(self.reader.read_chunk()));

        machine.advance();
        self.show(executor, ProgressEvent::Authenticating);
        let statuses = self.orchestrator.establish_channel(executor).await?;
        debug!(?statuses, "Secure channel established");

        machine.advance();
        let mut document = DocumentModel::new();
        self.read_groups(request, executor, &mut document).await?;
        document.set_handshake(self.orchestrator.statuses());

        machine.advance();
        if let Some((pin, challenge)) = request.command_sequence() {
            let output = SecureCommandSequence::new(&self.signing)
                .run(executor, pin, challenge, &self.progress)
                .await?;
            document.set_signed_challenge(output.signed_challenge);
            document.set_certificate(output.certificate);
        }

        Ok(document)
    }

    async fn read_groups<T: CardTransport>(
        &mut self,
        request: &ReadRequest,
        executor: &mut CardExecutor<T>,
        document: &mut DocumentModel,
    ) -> Result<()> {
        let mut plan = request.plan();
        let mut index = 0;

        while let Some(id) = plan.next_pending() {
            index += 1;
            self.show(
                executor,
                ProgressEvent::ReadingDataGroup {
                    group: id,
                    index,
                    total: index + plan.remaining(),
                },
            );

            let outcome = self
                .reader
                .read_group(id, executor, &mut self.orchestrator, &mut plan)
                .await?;
            match outcome {
                ReadOutcome::Read(group) => {
                    if id == DataGroupId::Com {
                        plan.expand_from_com(group.tag_list().ok());
                    }
                    if id == DataGroupId::Dg14
                        && !self.options.skip_chip_authentication
                        && self.orchestrator.supports_chip_authentication()
                    {
                        let status = self.orchestrator.authenticate_chip(executor, &group).await?;
                        debug!(%status, "Chip authentication finished");
                    }
                    document.insert_group(group)?;
                }
                ReadOutcome::Unread { reason } => {
                    if id == DataGroupId::Com {
                        plan.expand_from_com(None);
                    }
                    debug!(group = %id, ?reason, "Data group left unread");
                    document.record_unread(id, reason);
                }
            }
        }

        Ok(())
    }
}
