//! eMRTD command definitions
//!
//! Each command is a small builder implementing [`ApduCommand`], so the exact
//! byte layout of every APDU the reader sends is named and testable.
//!
//! [`ApduCommand`]: mrtd_apdu_core::ApduCommand

pub mod read_binary;
pub mod security;
pub mod select;
pub mod verify;

pub use read_binary::ReadBinaryCommand;
pub use security::{ManageSecurityEnvironmentCommand, SignCommand};
pub use select::SelectCommand;
pub use verify::VerifyPinCommand;
