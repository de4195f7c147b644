//! Data group reading with bounded recovery
//!
//! [`DataGroupReader`] reads one group at a time through the channel in
//! force. A failed attempt is classified and recovered from as the
//! [`classify`] policy dictates; no group gets more than
//! [`MAX_READ_ATTEMPTS`] attempts.

use std::collections::{BTreeSet, VecDeque};

use bytes::{Bytes, BytesMut};
use mrtd_apdu_core::prelude::*;
use tracing::{debug, instrument, trace, warn};

use crate::classifier::{RecoveryAction, classify};
use crate::commands::{ReadBinaryCommand, SelectCommand};
use crate::config::MAX_READ_ATTEMPTS;
use crate::constants::DATA_GROUP_HEADER_LEN;
use crate::data_group::{DataGroup, DataGroupId, ParseFailure, ber_header};
use crate::orchestrator::AuthenticationOrchestrator;
use crate::parser::DataGroupParser;
use crate::{Error, Result};

/// Why reading an elementary file failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileReadError {
    /// The chip or the link reported a failure
    #[error(transparent)]
    Apdu(#[from] mrtd_apdu_core::Error),

    /// The content did not have a usable BER header
    #[error(transparent)]
    Parse(#[from] ParseFailure),
}

impl FileReadError {
    /// Classification used by the recovery policy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Apdu(error) => error.failure_kind(),
            Self::Parse(_) => FailureKind::Other,
        }
    }
}

/// Select an elementary file and read it whole
///
/// A short header read learns the BER length, then the rest is read in
/// windows of at most `chunk` bytes.
pub async fn read_elementary_file<E: Executor + ?Sized>(
    executor: &mut E,
    file_id: [u8; 2],
    chunk: u8,
) -> std::result::Result<Bytes, FileReadError> {
    let file = hex::encode_upper(file_id);
    executor
        .transmit(&SelectCommand::elementary_file(file_id).to_command())
        .await
        .and_then(Response::into_payload)
        .context(format!("Selecting EF {file}"))?;

    let header = executor
        .transmit(&ReadBinaryCommand::new(0, DATA_GROUP_HEADER_LEN).to_command())
        .await
        .and_then(Response::into_payload)
        .context(format!("Reading header of EF {file}"))?;
    let (header_len, value_len) = ber_header(&header)?;
    let total = header_len + value_len;
    trace!(%file, total, "Read file header");

    let mut content = BytesMut::with_capacity(total);
    content.extend_from_slice(&header[..header.len().min(total)]);

    while content.len() < total {
        let le = usize::from(chunk).min(total - content.len()) as u8;
        let window = executor
            .transmit(&ReadBinaryCommand::new(content.len(), le).to_command())
            .await
            .and_then(Response::into_payload)
            .context(format!("Reading EF {file} at offset {}", content.len()))?;
        if window.is_empty() {
            return Err(ParseFailure::LengthMismatch {
                declared: total,
                actual: content.len(),
            }
            .into());
        }
        content.extend_from_slice(&window);
    }

    content.truncate(total);
    Ok(content.freeze())
}

/// Next smaller read window: the largest power of two below `current`,
/// never below `floor`
pub const fn reduce_read_chunk(current: u8, floor: u8) -> u8 {
    let next = if current <= 1 {
        1
    } else if current.is_power_of_two() {
        current / 2
    } else {
        1 << (7 - current.leading_zeros())
    };
    if next < floor { floor } else { next }
}

/// Why a group ended up unread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreadReason {
    /// The chip refused access or does not hold the file; the group was dropped
    Dropped(FailureKind),
    /// Every attempt failed
    AttemptsExhausted(FailureKind),
    /// The content was read but could not be accepted
    Malformed(ParseFailure),
}

/// Result of reading one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The group was read and accepted
    Read(DataGroup),
    /// The group was skipped, which is tolerated for groups not required
    Unread {
        /// Why
        reason: UnreadReason,
    },
}

/// Groups still to be read, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPlan {
    pending: VecDeque<DataGroupId>,
    required: BTreeSet<DataGroupId>,
    dropped: Vec<DataGroupId>,
    expand_from_com: bool,
    skip_secure_elements: bool,
}

impl ReadPlan {
    /// Plan for an explicit list of groups; DG14 moves to the front
    pub fn requested(groups: &[DataGroupId], required: &BTreeSet<DataGroupId>) -> Self {
        let mut pending = VecDeque::with_capacity(groups.len());
        for id in groups {
            if !pending.contains(id) {
                pending.push_back(*id);
            }
        }
        if let Some(index) = pending.iter().position(|id| *id == DataGroupId::Dg14) {
            pending.remove(index);
            pending.push_front(DataGroupId::Dg14);
        }

        Self {
            pending,
            required: required.clone(),
            ..Self::default()
        }
    }

    /// Plan reading everything EF.COM announces, plus COM and SOD
    pub fn everything(required: &BTreeSet<DataGroupId>, skip_secure_elements: bool) -> Self {
        Self {
            pending: VecDeque::from([DataGroupId::Com]),
            required: required.clone(),
            expand_from_com: true,
            skip_secure_elements,
            ..Self::default()
        }
    }

    /// Take the next group to read
    pub fn next_pending(&mut self) -> Option<DataGroupId> {
        self.pending.pop_front()
    }

    /// Groups left after the current one
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Whether failing to read `id` is fatal
    pub fn is_required(&self, id: DataGroupId) -> bool {
        self.required.contains(&id)
    }

    /// Abandon `id` for the rest of the session
    pub fn drop_group(&mut self, id: DataGroupId) {
        self.pending.retain(|pending| *pending != id);
        if !self.dropped.contains(&id) {
            self.dropped.push(id);
        }
    }

    /// Groups abandoned so far
    pub fn dropped(&self) -> &[DataGroupId] {
        &self.dropped
    }

    /// Queue the groups announced by EF.COM after it was processed
    ///
    /// `announced` is `None` when COM could not be read. SOD always goes
    /// last. Does nothing for plans built from an explicit list.
    pub fn expand_from_com(&mut self, announced: Option<Vec<DataGroupId>>) {
        if !std::mem::take(&mut self.expand_from_com) {
            return;
        }

        let mut seen: BTreeSet<_> = self.pending.iter().copied().collect();
        let mut groups: Vec<_> = announced
            .unwrap_or_default()
            .into_iter()
            .filter(|id| !matches!(id, DataGroupId::Com | DataGroupId::Sod))
            .filter(|id| !(self.skip_secure_elements && id.is_secure_element()))
            .filter(|id| !self.dropped.contains(id))
            .filter(|id| seen.insert(*id))
            .collect();
        if let Some(index) = groups.iter().position(|id| *id == DataGroupId::Dg14) {
            let dg14 = groups.remove(index);
            groups.insert(0, dg14);
        }

        debug!(?groups, "Expanded read plan from COM");
        self.pending.extend(groups);
        self.pending.push_back(DataGroupId::Sod);
    }
}

/// Reads data groups and recovers from failed attempts
pub struct DataGroupReader {
    read_chunk: u8,
    min_read_chunk: u8,
    parser: Box<dyn DataGroupParser>,
}

impl std::fmt::Debug for DataGroupReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataGroupReader")
            .field("read_chunk", &self.read_chunk)
            .field("min_read_chunk", &self.min_read_chunk)
            .field("parser", &self.parser)
            .finish()
    }
}

impl DataGroupReader {
    /// Create a reader starting with window `read_chunk`
    pub fn new(read_chunk: u8, min_read_chunk: u8, parser: Box<dyn DataGroupParser>) -> Self {
        Self {
            read_chunk,
            min_read_chunk,
            parser,
        }
    }

    /// Current read window
    pub const fn read_chunk(&self) -> u8 {
        self.read_chunk
    }

    /// Read one data group
    ///
    /// Handshakes demanded by the recovery policy go through
    /// `orchestrator`, which discards the previous channel first. A group
    /// the chip refuses is dropped from `plan` and reported unread without
    /// a second attempt.
    #[instrument(level = "debug", skip_all, fields(group = %id))]
    pub async fn read_group<T: CardTransport>(
        &mut self,
        id: DataGroupId,
        executor: &mut CardExecutor<T>,
        orchestrator: &mut AuthenticationOrchestrator,
        plan: &mut ReadPlan,
    ) -> Result<ReadOutcome> {
        let mut last_kind = FailureKind::Other;
        let mut last_parse = None;

        for attempt in 1..=MAX_READ_ATTEMPTS {
            debug!(attempt, chunk = self.read_chunk, "Reading data group");

            let error = match read_elementary_file(executor, id.file_id(), self.read_chunk).await {
                Ok(raw) => match self.parser.parse(raw, id) {
                    Ok(group) => return Ok(ReadOutcome::Read(group)),
                    Err(reason) => {
                        warn!(%reason, "Data group content rejected");
                        last_parse = Some(reason.clone());
                        FileReadError::Parse(reason)
                    }
                },
                Err(error) => error,
            };

            last_kind = error.failure_kind();
            let action = classify(
                last_kind,
                executor.secure_channel_protocol() == Some(SecureChannelProtocol::ChipAuthentication),
            );
            warn!(attempt, %error, ?action, "Data group read failed");

            match action {
                RecoveryAction::Abort => {
                    return Err(match error {
                        FileReadError::Apdu(error) => Error::from(error),
                        FileReadError::Parse(reason) => Error::Parse { group: id, reason },
                    });
                }
                RecoveryAction::RetrySame => {}
                RecoveryAction::ReduceReadWindow => {
                    self.read_chunk = reduce_read_chunk(self.read_chunk, self.min_read_chunk);
                    executor
                        .transport_mut()
                        .set_max_read_chunk(usize::from(self.read_chunk));
                    debug!(chunk = self.read_chunk, "Reduced read window");
                    orchestrator.establish_channel(executor).await?;
                }
                RecoveryAction::RedoHandshake { drop_group } => {
                    orchestrator.establish_channel(executor).await?;
                    if drop_group {
                        plan.drop_group(id);
                        return Ok(ReadOutcome::Unread {
                            reason: UnreadReason::Dropped(last_kind),
                        });
                    }
                }
                RecoveryAction::DropAndRedoHandshake => {
                    orchestrator.establish_channel(executor).await?;
                }
            }
        }

        if plan.is_required(id) {
            return Err(match last_parse {
                Some(reason) => Error::Parse { group: id, reason },
                None => Error::Read {
                    group: id,
                    kind: last_kind,
                },
            });
        }

        Ok(ReadOutcome::Unread {
            reason: match last_parse {
                Some(reason) => UnreadReason::Malformed(reason),
                None => UnreadReason::AttemptsExhausted(last_kind),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ChipBuilder, Fault, FakeHandler, tlv};
    use crate::{Credential, TlvDataGroupParser};
    use hex_literal::hex;

    fn reader() -> DataGroupReader {
        DataGroupReader::new(0xA0, 0x20, Box::new(TlvDataGroupParser))
    }

    fn orchestrator(legacy: &FakeHandler) -> AuthenticationOrchestrator {
        AuthenticationOrchestrator::new(Credential::mrz("L898902C3674081221204159"))
            .with_legacy(Box::new(legacy.clone()))
    }

    #[test]
    fn test_reduce_read_chunk() {
        assert_eq!(reduce_read_chunk(0xA0, 0x20), 0x80);
        assert_eq!(reduce_read_chunk(0xFF, 0x20), 0x80);
        assert_eq!(reduce_read_chunk(0x80, 0x20), 0x40);
        assert_eq!(reduce_read_chunk(0x40, 0x20), 0x20);
        assert_eq!(reduce_read_chunk(0x20, 0x20), 0x20);
    }

    #[test]
    fn test_requested_plan_reads_dg14_first() {
        let mut plan = ReadPlan::requested(
            &[DataGroupId::Dg1, DataGroupId::Dg2, DataGroupId::Dg14, DataGroupId::Dg1],
            &BTreeSet::new(),
        );
        assert_eq!(plan.remaining(), 3);
        assert_eq!(plan.next_pending(), Some(DataGroupId::Dg14));
        assert_eq!(plan.next_pending(), Some(DataGroupId::Dg1));
        plan.expand_from_com(Some(vec![DataGroupId::Dg5]));
        assert_eq!(plan.next_pending(), Some(DataGroupId::Dg2));
        assert_eq!(plan.next_pending(), None);
    }

    #[test]
    fn test_everything_plan_expands_from_com() {
        let mut plan = ReadPlan::everything(&BTreeSet::new(), true);
        assert_eq!(plan.next_pending(), Some(DataGroupId::Com));
        plan.expand_from_com(Some(vec![
            DataGroupId::Dg1,
            DataGroupId::Dg2,
            DataGroupId::Dg3,
            DataGroupId::Dg14,
        ]));

        let order: Vec<_> = std::iter::from_fn(|| plan.next_pending()).collect();
        assert_eq!(
            order,
            vec![DataGroupId::Dg14, DataGroupId::Dg1, DataGroupId::Dg2, DataGroupId::Sod]
        );
    }

    #[test]
    fn test_everything_plan_queues_each_group_once() {
        let mut plan = ReadPlan::everything(&BTreeSet::new(), true);
        plan.next_pending();
        plan.expand_from_com(Some(vec![
            DataGroupId::Dg1,
            DataGroupId::Dg2,
            DataGroupId::Dg1,
            DataGroupId::Dg14,
            DataGroupId::Dg2,
        ]));

        let order: Vec<_> = std::iter::from_fn(|| plan.next_pending()).collect();
        assert_eq!(
            order,
            vec![DataGroupId::Dg14, DataGroupId::Dg1, DataGroupId::Dg2, DataGroupId::Sod]
        );
    }

    #[test]
    fn test_everything_plan_survives_missing_com() {
        let mut plan = ReadPlan::everything(&BTreeSet::new(), false);
        plan.next_pending();
        plan.expand_from_com(None);
        assert_eq!(plan.next_pending(), Some(DataGroupId::Sod));
        assert_eq!(plan.next_pending(), None);
    }

    #[tokio::test]
    async fn test_reads_in_windows() {
        let dg1 = tlv(0x61, &[0x42; 300]);
        let chip = ChipBuilder::new().with_file(DataGroupId::Dg1.file_id(), dg1.clone()).build();
        let log = chip.log();
        let mut executor = CardExecutor::new(chip);

        let raw = read_elementary_file(&mut executor, DataGroupId::Dg1.file_id(), 0xA0)
            .await
            .unwrap();
        assert_eq!(raw.as_ref(), dg1.as_slice());

        let commands = log.commands();
        assert_eq!(commands[0], hex!("00A4020C020101"));
        assert_eq!(commands[1], hex!("00B0000004"));
        assert_eq!(commands[2], hex!("00B00004A0"));
        assert_eq!(commands[3], hex!("00B000A48C"));
        assert_eq!(commands.len(), 4);
    }

    #[tokio::test]
    async fn test_file_errors_name_the_file() {
        let dg3 = DataGroupId::Dg3.file_id();
        let chip = ChipBuilder::new().with_protected_file(dg3, tlv(0x63, b"fingers")).build();
        let mut executor = CardExecutor::new(chip);

        let err = read_elementary_file(&mut executor, dg3, 0xA0).await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::AccessDenied);
        assert_eq!(
            err.to_string(),
            format!(
                "Reading header of EF {}: Status error 6982 (Security status not satisfied)",
                hex::encode_upper(dg3)
            )
        );

        let dg5 = DataGroupId::Dg5.file_id();
        let err = read_elementary_file(&mut executor, dg5, 0xA0).await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::ObjectNotFound);
        assert!(err.to_string().starts_with(&format!("Selecting EF {}", hex::encode_upper(dg5))));
    }

    #[tokio::test]
    async fn test_read_group_success() {
        let legacy = FakeHandler::bac();
        let chip = ChipBuilder::new()
            .with_file(DataGroupId::Dg1.file_id(), tlv(0x61, b"P<UTOERIKSSON"))
            .build();
        let mut executor = CardExecutor::new(chip);
        let mut plan = ReadPlan::default();

        let outcome = reader()
            .read_group(DataGroupId::Dg1, &mut executor, &mut orchestrator(&legacy), &mut plan)
            .await
            .unwrap();
        let ReadOutcome::Read(group) = outcome else {
            panic!("expected DG1 to be read, got {outcome:?}");
        };
        assert_eq!(group.value().as_ref(), b"P<UTOERIKSSON");
        assert_eq!(legacy.attempts(), 0);
    }

    #[tokio::test]
    async fn test_access_denied_drops_group_and_redoes_handshake() {
        let legacy = FakeHandler::bac();
        let chip = ChipBuilder::new()
            .with_protected_file(DataGroupId::Dg3.file_id(), tlv(0x63, b"fingers"))
            .build();
        let log = chip.log();
        let mut executor = CardExecutor::new(chip);
        let mut plan = ReadPlan::requested(&[DataGroupId::Dg3, DataGroupId::Dg4], &BTreeSet::new());
        plan.next_pending();

        let outcome = reader()
            .read_group(DataGroupId::Dg3, &mut executor, &mut orchestrator(&legacy), &mut plan)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReadOutcome::Unread {
                reason: UnreadReason::Dropped(FailureKind::AccessDenied)
            }
        );
        assert_eq!(legacy.attempts(), 1);
        assert_eq!(log.selects_of(DataGroupId::Dg3.file_id()), 1);
        assert_eq!(plan.dropped(), &[DataGroupId::Dg3]);
        assert_eq!(plan.next_pending(), Some(DataGroupId::Dg4));
    }

    #[tokio::test]
    async fn test_never_more_than_two_attempts() {
        let legacy = FakeHandler::bac();
        let chip = ChipBuilder::new()
            .with_file(DataGroupId::Dg2.file_id(), tlv(0x75, &[0x01; 16]))
            .with_fault(DataGroupId::Dg2.file_id(), Fault::Status(0x69, 0x88))
            .with_fault(DataGroupId::Dg2.file_id(), Fault::Status(0x6F, 0x00))
            .with_fault(DataGroupId::Dg2.file_id(), Fault::Status(0x6F, 0x00))
            .build();
        let log = chip.log();
        let mut executor = CardExecutor::new(chip);
        let mut plan = ReadPlan::default();

        let outcome = reader()
            .read_group(DataGroupId::Dg2, &mut executor, &mut orchestrator(&legacy), &mut plan)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReadOutcome::Unread {
                reason: UnreadReason::AttemptsExhausted(FailureKind::Other)
            }
        );
        assert_eq!(log.selects_of(DataGroupId::Dg2.file_id()), 2);
        assert_eq!(legacy.attempts(), 1);
    }

    #[tokio::test]
    async fn test_required_group_fails_the_read() {
        let legacy = FakeHandler::bac();
        let chip = ChipBuilder::new()
            .with_file(DataGroupId::Dg1.file_id(), tlv(0x61, b"x"))
            .with_fault(DataGroupId::Dg1.file_id(), Fault::Status(0x6F, 0x00))
            .with_fault(DataGroupId::Dg1.file_id(), Fault::Status(0x6F, 0x00))
            .build();
        let mut executor = CardExecutor::new(chip);
        let mut plan = ReadPlan::requested(&[DataGroupId::Dg1], &BTreeSet::from([DataGroupId::Dg1]));

        let err = reader()
            .read_group(DataGroupId::Dg1, &mut executor, &mut orchestrator(&legacy), &mut plan)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Read {
                group: DataGroupId::Dg1,
                kind: FailureKind::Other
            }
        ));
    }

    #[tokio::test]
    async fn test_wrong_length_shrinks_window() {
        let legacy = FakeHandler::bac();
        let chip = ChipBuilder::new()
            .with_file(DataGroupId::Dg11.file_id(), tlv(0x6B, &[0x30; 200]))
            .with_max_le(0x80)
            .build();
        let log = chip.log();
        let mut executor = CardExecutor::new(chip);
        let mut reader = reader();

        let outcome = reader
            .read_group(
                DataGroupId::Dg11,
                &mut executor,
                &mut orchestrator(&legacy),
                &mut ReadPlan::default(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ReadOutcome::Read(_)));
        assert_eq!(reader.read_chunk(), 0x80);
        assert_eq!(legacy.attempts(), 1);
        assert_eq!(log.max_read_chunk(), Some(0x80));
    }

    #[tokio::test]
    async fn test_link_loss_without_chip_authentication_aborts() {
        let legacy = FakeHandler::bac();
        let chip = ChipBuilder::new()
            .with_file(DataGroupId::Dg1.file_id(), tlv(0x61, b"x"))
            .with_fault(DataGroupId::Dg1.file_id(), Fault::Link(TransportError::ConnectionLost))
            .build();
        let log = chip.log();
        let mut executor = CardExecutor::new(chip);

        let err = reader()
            .read_group(
                DataGroupId::Dg1,
                &mut executor,
                &mut orchestrator(&legacy),
                &mut ReadPlan::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Link(TransportError::ConnectionLost)));
        assert_eq!(log.selects_of(DataGroupId::Dg1.file_id()), 1);
        assert_eq!(legacy.attempts(), 0);
    }
}
