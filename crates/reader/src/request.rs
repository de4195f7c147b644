//! What a caller asks a session to read

use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::credential::Credential;
use crate::data_group::DataGroupId;
use crate::reader::ReadPlan;
use crate::{Error, Result};

/// Switches for the optional parts of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Go straight to the legacy handshake
    pub skip_modern_handshake: bool,
    /// Fail instead of falling back when the modern handshake fails
    pub skip_legacy_fallback: bool,
    /// Never upgrade the channel after DG14 was read
    pub skip_chip_authentication: bool,
    /// Leave DG3 and DG4 out when reading everything EF.COM lists
    pub skip_secure_elements: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            skip_modern_handshake: false,
            skip_legacy_fallback: false,
            skip_chip_authentication: false,
            skip_secure_elements: true,
        }
    }
}

impl ReadOptions {
    /// Set whether the modern handshake is skipped
    pub const fn with_skip_modern_handshake(mut self, skip: bool) -> Self {
        self.skip_modern_handshake = skip;
        self
    }

    /// Set whether the legacy fallback is skipped
    pub const fn with_skip_legacy_fallback(mut self, skip: bool) -> Self {
        self.skip_legacy_fallback = skip;
        self
    }

    /// Set whether chip authentication is skipped
    pub const fn with_skip_chip_authentication(mut self, skip: bool) -> Self {
        self.skip_chip_authentication = skip;
        self
    }

    /// Set whether DG3 and DG4 are left out of a full read
    pub const fn with_skip_secure_elements(mut self, skip: bool) -> Self {
        self.skip_secure_elements = skip;
        self
    }
}

/// Everything one session should do
///
/// With no groups listed the session reads every group EF.COM announces.
/// PIN and challenge go together: with both the command sequence runs,
/// with neither it is skipped.
#[derive(Clone)]
pub struct ReadRequest {
    credential: Credential,
    pin: Option<Zeroizing<String>>,
    challenge: Option<Bytes>,
    groups: Vec<DataGroupId>,
    required: BTreeSet<DataGroupId>,
    options: ReadOptions,
}

impl fmt::Debug for ReadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadRequest")
            .field("credential", &self.credential)
            .field("pin", &self.pin.as_ref().map(|_| "***"))
            .field("challenge", &self.challenge.as_ref().map(hex::encode))
            .field("groups", &self.groups)
            .field("required", &self.required)
            .field("options", &self.options)
            .finish()
    }
}

impl ReadRequest {
    /// Read everything EF.COM lists with `credential`
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            pin: None,
            challenge: None,
            groups: Vec::new(),
            required: BTreeSet::new(),
            options: ReadOptions::default(),
        }
    }

    /// PIN for the command sequence
    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(Zeroizing::new(pin.into()));
        self
    }

    /// Challenge the signing application signs
    pub fn with_challenge(mut self, challenge: impl Into<Bytes>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    /// Read only these groups instead of everything EF.COM lists
    pub fn with_groups(mut self, groups: impl IntoIterator<Item = DataGroupId>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }

    /// Fail the session when `group` cannot be read
    pub fn require(mut self, group: DataGroupId) -> Self {
        self.required.insert(group);
        self
    }

    /// Set the options
    pub const fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    /// The credential
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The options
    pub const fn options(&self) -> ReadOptions {
        self.options
    }

    /// Reject inconsistent requests before touching the chip
    pub fn validate(&self) -> Result<()> {
        match (&self.pin, &self.challenge) {
            (Some(_), None) => Err(Error::InvalidRequest("a PIN was given without a challenge")),
            (None, Some(_)) => Err(Error::InvalidRequest("a challenge was given without a PIN")),
            (Some(pin), _) if pin.is_empty() => Err(Error::InvalidRequest("the PIN is empty")),
            _ => Ok(()),
        }
    }

    /// PIN and challenge, when the command sequence should run
    pub(crate) fn command_sequence(&self) -> Option<(&str, &[u8])> {
        match (&self.pin, &self.challenge) {
            (Some(pin), Some(challenge)) => Some((pin.as_str(), &challenge[..])),
            _ => None,
        }
    }

    /// Order in which the groups are read
    pub(crate) fn plan(&self) -> ReadPlan {
        if self.groups.is_empty() {
            ReadPlan::everything(&self.required, self.options.skip_secure_elements)
        } else {
            ReadPlan::requested(&self.groups, &self.required)
        }
    }
}
