//! In-memory chip and handshake handlers shared by the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use hex_literal::hex;
use mrtd_apdu_core::prelude::*;

use crate::Credential;
use crate::config::SigningProfile;
use crate::constants::{EMRTD_AID, file, ins, select_p1};
use crate::orchestrator::{AuthFailure, AuthenticationHandler, HandshakeInput};
use crate::session::CancelHandle;

/// EF.CardAccess advertising PACE
pub(crate) const CARD_ACCESS: [u8; 22] =
    hex!("3114" "3012" "060A04007F00070202040202" "020102" "02010D");

/// Signature the simulated signing application returns
pub(crate) const SIGNATURE: &[u8] = &[0x5A; 64];

/// BER encode `value` under a one byte `tag`
pub(crate) fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    match value.len() {
        len @ 0..=0x7F => out.push(len as u8),
        len @ 0x80..=0xFF => out.extend([0x81, len as u8]),
        len => out.extend([0x82, (len >> 8) as u8, len as u8]),
    }
    out.extend_from_slice(value);
    out
}

/// Failure injected into the next READ BINARY of a file
#[derive(Debug, Clone)]
pub(crate) enum Fault {
    /// Answer with this status word
    Status(u8, u8),
    /// Fail the exchange at link level
    Link(TransportError),
}

#[derive(Debug, Clone)]
struct ChipFile {
    content: Bytes,
    protected: bool,
}

#[derive(Debug, Default)]
struct ChipState {
    files: HashMap<[u8; 2], ChipFile>,
    faults: HashMap<[u8; 2], VecDeque<Fault>>,
    selected: Option<[u8; 2]>,
    max_le: Option<usize>,
    tags_in_field: usize,
    connect_failure: Option<TransportError>,
    signing_application: bool,
    pin: Vec<u8>,
    pin_tries: u8,
    pin_verified: bool,
    commands: Vec<Vec<u8>>,
    max_read_chunk: Option<usize>,
    messages: Vec<String>,
    disconnects: Vec<Option<String>>,
    cancel_on_select: Option<([u8; 2], CancelHandle)>,
    yield_after_exchange: bool,
}

/// Builds a [`SimulatedChip`]
#[derive(Debug)]
pub(crate) struct ChipBuilder {
    state: ChipState,
}

impl ChipBuilder {
    pub(crate) fn new() -> Self {
        Self {
            state: ChipState {
                tags_in_field: 1,
                signing_application: true,
                pin: b"123456".to_vec(),
                pin_tries: 3,
                ..ChipState::default()
            },
        }
    }

    pub(crate) fn with_file(mut self, file_id: [u8; 2], content: Vec<u8>) -> Self {
        self.state.files.insert(
            file_id,
            ChipFile {
                content: content.into(),
                protected: false,
            },
        );
        self
    }

    /// Selectable, but every READ BINARY is refused with `6982`
    pub(crate) fn with_protected_file(mut self, file_id: [u8; 2], content: Vec<u8>) -> Self {
        self.state.files.insert(
            file_id,
            ChipFile {
                content: content.into(),
                protected: true,
            },
        );
        self
    }

    /// Queue a fault; faults of one file are consumed in order
    pub(crate) fn with_fault(mut self, file_id: [u8; 2], fault: Fault) -> Self {
        self.state.faults.entry(file_id).or_default().push_back(fault);
        self
    }

    /// READ BINARY asking for more than `max_le` bytes gets `6700`
    pub(crate) fn with_max_le(mut self, max_le: u8) -> Self {
        self.state.max_le = Some(if max_le == 0 { 256 } else { usize::from(max_le) });
        self
    }

    pub(crate) fn with_card_access(self, content: Vec<u8>) -> Self {
        self.with_file(file::CARD_ACCESS, content)
    }

    /// Zero keeps `connect` pending forever
    pub(crate) fn with_tags_in_field(mut self, tags: usize) -> Self {
        self.state.tags_in_field = tags;
        self
    }

    pub(crate) fn with_connect_failure(mut self, error: TransportError) -> Self {
        self.state.connect_failure = Some(error);
        self
    }

    pub(crate) fn without_signing_application(mut self) -> Self {
        self.state.signing_application = false;
        self
    }

    pub(crate) fn with_pin(mut self, pin: &str) -> Self {
        self.state.pin = pin.as_bytes().to_vec();
        self
    }

    pub(crate) fn with_pin_tries(mut self, tries: u8) -> Self {
        self.state.pin_tries = tries;
        self
    }

    pub(crate) fn with_certificate(self, certificate: Vec<u8>) -> Self {
        let file_id = SigningProfile::default().certificate_file;
        self.with_file(file_id, certificate)
    }

    pub(crate) fn build(self) -> SimulatedChip {
        SimulatedChip {
            state: Arc::new(Mutex::new(self.state)),
        }
    }
}

/// Chip answering from in-memory files
#[derive(Debug, Clone)]
pub(crate) struct SimulatedChip {
    state: Arc<Mutex<ChipState>>,
}

impl SimulatedChip {
    /// Handle on what the chip saw, usable after the chip moved into a session
    pub(crate) fn log(&self) -> ChipLog {
        ChipLog {
            state: Arc::clone(&self.state),
        }
    }

    /// Cancel `handle` when `file_id` gets selected, then yield once
    pub(crate) fn cancel_on_select(&self, file_id: [u8; 2], handle: CancelHandle) {
        self.state().cancel_on_select = Some((file_id, handle));
    }

    fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap()
    }
}

fn respond(data: &[u8], sw1: u8, sw2: u8) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + 2);
    out.put_slice(data);
    out.put_u8(sw1);
    out.put_u8(sw2);
    out.freeze()
}

fn status(sw1: u8, sw2: u8) -> Bytes {
    respond(&[], sw1, sw2)
}

impl ChipState {
    fn process(&mut self, command: &Command) -> Result<Bytes, TransportError> {
        let data = command.data.clone().unwrap_or_default();
        Ok(match command.ins {
            ins::SELECT => self.select(command.p1, &data),
            ins::READ_BINARY => return self.read_binary(command),
            ins::VERIFY => self.verify(&data),
            ins::MANAGE_SECURITY_ENVIRONMENT => status(0x90, 0x00),
            ins::PERFORM_SECURITY_OPERATION if self.pin_verified => respond(SIGNATURE, 0x90, 0x00),
            ins::PERFORM_SECURITY_OPERATION => status(0x69, 0x82),
            _ => status(0x6D, 0x00),
        })
    }

    fn select(&mut self, p1: u8, data: &[u8]) -> Bytes {
        match p1 {
            select_p1::BY_NAME if data == EMRTD_AID => status(0x90, 0x00),
            select_p1::BY_NAME
                if self.signing_application
                    && data == SigningProfile::default().application_aid.as_ref() =>
            {
                status(0x90, 0x00)
            }
            select_p1::BY_ID if data == file::MASTER_FILE => {
                self.selected = None;
                status(0x90, 0x00)
            }
            select_p1::BY_ID | select_p1::EF_UNDER_CURRENT_DF => {
                match <[u8; 2]>::try_from(data) {
                    Ok(file_id) if self.files.contains_key(&file_id) => {
                        if let Some((_, handle)) = self
                            .cancel_on_select
                            .take_if(|(target, _)| *target == file_id)
                        {
                            handle.cancel();
                            self.yield_after_exchange = true;
                        }
                        self.selected = Some(file_id);
                        status(0x90, 0x00)
                    }
                    _ => status(0x6A, 0x82),
                }
            }
            _ => status(0x6A, 0x82),
        }
    }

    fn read_binary(&mut self, command: &Command) -> Result<Bytes, TransportError> {
        let Some(file_id) = self.selected else {
            return Ok(status(0x69, 0x86));
        };
        if let Some(fault) = self.faults.get_mut(&file_id).and_then(VecDeque::pop_front) {
            return match fault {
                Fault::Status(sw1, sw2) => Ok(status(sw1, sw2)),
                Fault::Link(error) => Err(error),
            };
        }

        let Some(file) = self.files.get(&file_id) else {
            return Ok(status(0x6A, 0x82));
        };
        if file.protected {
            return Ok(status(0x69, 0x82));
        }

        let le = command.expected_response_len().unwrap_or(256);
        if self.max_le.is_some_and(|max| le > max) {
            return Ok(status(0x67, 0x00));
        }
        let offset = usize::from(u16::from_be_bytes([command.p1, command.p2]));
        if offset >= file.content.len() {
            return Ok(status(0x6B, 0x00));
        }
        let end = (offset + le).min(file.content.len());
        Ok(respond(&file.content[offset..end], 0x90, 0x00))
    }

    fn verify(&mut self, data: &[u8]) -> Bytes {
        if self.pin_tries == 0 {
            return status(0x69, 0x83);
        }

        let entered = data.iter().rposition(|b| *b != 0x00).map_or(&[][..], |i| &data[..=i]);
        if entered == self.pin.as_slice() {
            self.pin_verified = true;
            return status(0x90, 0x00);
        }

        self.pin_tries -= 1;
        match self.pin_tries {
            0 => status(0x69, 0x83),
            tries => status(0x63, 0xC0 | tries),
        }
    }
}

#[async_trait]
impl CardTransport for SimulatedChip {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let (tags, failure) = {
            let state = self.state();
            (state.tags_in_field, state.connect_failure.clone())
        };
        if let Some(error) = failure {
            return Err(error);
        }
        match tags {
            0 => std::future::pending().await,
            1 => Ok(()),
            _ => Err(TransportError::MultipleTags),
        }
    }

    async fn transmit_raw(&mut self, raw: &[u8]) -> Result<Bytes, TransportError> {
        let (response, yield_now) = {
            let mut state = self.state();
            state.commands.push(raw.to_vec());
            let command =
                Command::from_bytes(raw).map_err(|e| TransportError::Other(e.to_string()))?;
            let response = state.process(&command);
            (response, std::mem::take(&mut state.yield_after_exchange))
        };
        if yield_now {
            tokio::task::yield_now().await;
        }
        response
    }

    fn set_max_read_chunk(&mut self, len: usize) {
        self.state().max_read_chunk = Some(len);
    }

    fn display_message(&mut self, text: &str) {
        self.state().messages.push(text.to_owned());
    }

    async fn disconnect(&mut self, message: Option<&str>) {
        self.state().disconnects.push(message.map(str::to_owned));
    }
}

/// What a [`SimulatedChip`] saw
#[derive(Debug, Clone)]
pub(crate) struct ChipLog {
    state: Arc<Mutex<ChipState>>,
}

impl ChipLog {
    fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap()
    }

    /// Raw command APDUs in the order received
    pub(crate) fn commands(&self) -> Vec<Vec<u8>> {
        self.state().commands.clone()
    }

    /// SELECTs of `file_id` under the current application
    pub(crate) fn selects_of(&self, file_id: [u8; 2]) -> usize {
        let select = [0x00, 0xA4, 0x02, 0x0C, 0x02, file_id[0], file_id[1]];
        self.state()
            .commands
            .iter()
            .filter(|command| command.as_slice() == select)
            .count()
    }

    pub(crate) fn count_instruction(&self, instruction: u8) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|command| command.get(1) == Some(&instruction))
            .count()
    }

    pub(crate) fn max_read_chunk(&self) -> Option<usize> {
        self.state().max_read_chunk
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.state().messages.clone()
    }

    /// Final message of every disconnect
    pub(crate) fn disconnects(&self) -> Vec<Option<String>> {
        self.state().disconnects.clone()
    }
}

/// Secure messaging that leaves commands untouched
///
/// Holds a clone of its handler's token while the channel is alive.
#[derive(Debug)]
pub(crate) struct PlainMessaging {
    _channel: Arc<()>,
}

impl SecureMessaging for PlainMessaging {
    fn protect(&mut self, command: &Command) -> mrtd_apdu_core::Result<Command> {
        Ok(command.clone())
    }

    fn unprotect(&mut self, response: Response) -> mrtd_apdu_core::Result<Response> {
        Ok(response)
    }
}

#[derive(Debug, Default)]
struct HandlerLog {
    attempts: usize,
    security_info: Option<Vec<u8>>,
    channels: Vec<Option<SecureChannelProtocol>>,
    credentials: Vec<Credential>,
    channel_token: Arc<()>,
}

/// Handshake handler that succeeds or fails without any cryptography
#[derive(Debug, Clone)]
pub(crate) struct FakeHandler {
    protocol: SecureChannelProtocol,
    failure: Option<AuthFailure>,
    log: Arc<Mutex<HandlerLog>>,
}

impl FakeHandler {
    fn new(protocol: SecureChannelProtocol) -> Self {
        Self {
            protocol,
            failure: None,
            log: Arc::default(),
        }
    }

    pub(crate) fn pace() -> Self {
        Self::new(SecureChannelProtocol::Pace)
    }

    pub(crate) fn bac() -> Self {
        Self::new(SecureChannelProtocol::Bac)
    }

    pub(crate) fn chip_authentication() -> Self {
        Self::new(SecureChannelProtocol::ChipAuthentication)
    }

    /// Fail every attempt with `failure`
    pub(crate) fn failing(mut self, failure: AuthFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    fn log(&self) -> MutexGuard<'_, HandlerLog> {
        self.log.lock().unwrap()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.log().attempts
    }

    pub(crate) fn last_security_info(&self) -> Option<Vec<u8>> {
        self.log().security_info.clone()
    }

    /// Channel in force when each attempt started
    pub(crate) fn channels_seen(&self) -> Vec<Option<SecureChannelProtocol>> {
        self.log().channels.clone()
    }

    pub(crate) fn credentials_seen(&self) -> Vec<Credential> {
        self.log().credentials.clone()
    }

    /// Channels produced by this handler that have not been dropped yet
    pub(crate) fn open_channels(&self) -> usize {
        Arc::strong_count(&self.log().channel_token) - 1
    }
}

#[async_trait]
impl AuthenticationHandler for FakeHandler {
    fn protocol(&self) -> SecureChannelProtocol {
        self.protocol
    }

    async fn attempt(
        &self,
        input: HandshakeInput<'_>,
        executor: &mut dyn Executor,
    ) -> std::result::Result<SecureChannelContext, AuthFailure> {
        let token = {
            let mut log = self.log();
            log.attempts += 1;
            log.security_info = input.security_info.map(<[u8]>::to_vec);
            log.channels.push(executor.secure_channel_protocol());
            log.credentials.push(input.credential.clone());
            Arc::clone(&log.channel_token)
        };

        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(SecureChannelContext::new(
                self.protocol,
                Box::new(PlainMessaging { _channel: token }),
            )),
        }
    }
}
