//! Authentication and recovery orchestrator for reading eMRTD chips
//!
//! Drives a chip from first contact to a finished [`DocumentModel`]:
//!
//! - a two tier handshake, PACE first and BAC as fallback for MRZ
//!   credentials, through [`AuthenticationOrchestrator`]
//! - data group reads with bounded, status driven recovery in
//!   [`DataGroupReader`] and [`classify`]
//! - an optional PIN, signature and certificate [`SecureCommandSequence`]
//! - a [`Session`] state machine owning the transport, with cancellation
//!   and progress messages
//!
//! The key agreement cryptography is supplied by the application as
//! [`AuthenticationHandler`] implementations; the transport as a
//! [`CardTransport`](mrtd_apdu_core::CardTransport).
//!
//! ```no_run
//! # use mrtd_reader::{Credential, ReadRequest, Session, DataGroupId};
//! # async fn example<T: mrtd_apdu_core::CardTransport>(transport: T) -> mrtd_reader::Result<()> {
//! let document = Session::new(transport)
//!     .read_document(ReadRequest::new(Credential::mrz("L898902C3674081221204159")))
//!     .await?;
//! if let Some(dg1) = document.group(DataGroupId::Dg1) {
//!     println!("{}", hex::encode(dg1.value()));
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod classifier;
pub mod commands;
pub mod config;
pub mod constants;
pub mod credential;
pub mod data_group;
pub mod document;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod progress;
pub mod reader;
pub mod request;
pub mod sequence;
pub mod session;

#[cfg(test)]
mod testing;

pub use classifier::{RecoveryAction, classify};
pub use config::{ReaderConfig, SigningProfile};
pub use credential::{AccessKey, Credential};
pub use data_group::{DataGroup, DataGroupId, ParseFailure};
pub use document::DocumentModel;
pub use error::{Error, ErrorCategory, Result};
pub use orchestrator::{
    AuthFailure, AuthenticationHandler, AuthenticationOrchestrator, HandshakeInput,
    HandshakeStatus, HandshakeStatuses,
};
pub use parser::{DataGroupParser, TlvDataGroupParser};
pub use progress::{ProgressEvent, ProgressHandler, ProgressReporter};
pub use reader::{DataGroupReader, ReadOutcome, ReadPlan, UnreadReason};
pub use request::{ReadOptions, ReadRequest};
pub use sequence::{SecureCommandSequence, SequenceOutput, SequenceStep};
pub use session::{CancelHandle, Session, SessionOutcome, SessionState};
