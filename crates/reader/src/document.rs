//! The document assembled by a successful session

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::data_group::{DataGroup, DataGroupId};
use crate::orchestrator::HandshakeStatuses;
use crate::reader::UnreadReason;
use crate::{Error, Result};

/// Everything read from one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentModel {
    handshake: HandshakeStatuses,
    groups: BTreeMap<DataGroupId, DataGroup>,
    unread: BTreeMap<DataGroupId, UnreadReason>,
    signed_challenge: Option<Bytes>,
    certificate: Option<Bytes>,
}

impl DocumentModel {
    /// Empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a group; each group is stored at most once
    pub fn insert_group(&mut self, group: DataGroup) -> Result<()> {
        let id = group.id();
        if self.groups.contains_key(&id) {
            return Err(Error::DuplicateGroup(id));
        }
        self.unread.remove(&id);
        self.groups.insert(id, group);
        Ok(())
    }

    /// Record a group that was skipped
    pub fn record_unread(&mut self, id: DataGroupId, reason: UnreadReason) {
        self.unread.insert(id, reason);
    }

    pub(crate) const fn set_handshake(&mut self, statuses: HandshakeStatuses) {
        self.handshake = statuses;
    }

    pub(crate) fn set_signed_challenge(&mut self, signature: Bytes) {
        self.signed_challenge = Some(signature);
    }

    pub(crate) fn set_certificate(&mut self, certificate: Bytes) {
        self.certificate = Some(certificate);
    }

    /// Handshake statuses at the end of the session
    pub const fn handshake(&self) -> HandshakeStatuses {
        self.handshake
    }

    /// A stored group
    pub fn group(&self, id: DataGroupId) -> Option<&DataGroup> {
        self.groups.get(&id)
    }

    /// All stored groups in identifier order
    pub fn groups(&self) -> impl Iterator<Item = &DataGroup> {
        self.groups.values()
    }

    /// Groups skipped and why
    pub const fn unread(&self) -> &BTreeMap<DataGroupId, UnreadReason> {
        &self.unread
    }

    /// Signature returned for the challenge
    pub const fn signed_challenge(&self) -> Option<&Bytes> {
        self.signed_challenge.as_ref()
    }

    /// Signature returned for the challenge, hex encoded
    pub fn signed_challenge_hex(&self) -> Option<String> {
        self.signed_challenge.as_ref().map(hex::encode)
    }

    /// Signer certificate read from the signing application
    pub const fn certificate(&self) -> Option<&Bytes> {
        self.certificate.as_ref()
    }

    /// Signer certificate, hex encoded
    pub fn certificate_hex(&self) -> Option<String> {
        self.certificate.as_ref().map(hex::encode)
    }
}
