//! Core traits and types for talking APDUs to an electronic identity document chip
//!
//! This crate provides the foundational types for exchanging ISO/IEC 7816-4
//! command/response APDUs with an eMRTD chip.
//!
//! ## Overview
//!
//! - Building and serialising command APDUs, parsing response APDUs
//! - Interpreting status words, including the closed [`FailureKind`]
//!   classification consumed by recovery logic
//! - The [`CardTransport`] seam for whatever physically carries the APDUs
//! - The [`SecureMessaging`] seam and the [`CardExecutor`] that routes
//!   commands through an established secure channel
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod error;
pub mod executor;
pub mod failure;
pub mod response;
pub mod secure_channel;
pub mod transport;

pub use command::{ApduCommand, Command, ExpectedLength};
pub use error::{Error, Result, ResultExt};
pub use executor::{CardExecutor, Executor};
pub use failure::FailureKind;
pub use response::status::StatusWord;
pub use response::{ApduResponse, Response};
pub use secure_channel::{SecureChannelContext, SecureChannelProtocol, SecureMessaging};
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut, Error, Result, ResultExt};

    pub use crate::Command;
    pub use crate::command::{ApduCommand, ExpectedLength};

    pub use crate::Response;
    pub use crate::response::ApduResponse;
    pub use crate::response::status::{StatusWord, common as status};

    pub use crate::failure::FailureKind;

    pub use crate::transport::{CardTransport, TransportError};

    pub use crate::secure_channel::{
        SecureChannelContext, SecureChannelProtocol, SecureMessaging,
    };

    pub use crate::executor::{CardExecutor, Executor};
}
