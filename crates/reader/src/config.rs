//! Configuration options for reading a document

use bytes::Bytes;

/// Read window used when nothing else is configured
pub const DEFAULT_READ_CHUNK: u8 = 0xA0;

/// Smallest window the reader shrinks to
pub const DEFAULT_MIN_READ_CHUNK: u8 = 0x20;

/// Read attempts per data group
pub const MAX_READ_ATTEMPTS: usize = 2;

/// Largest certificate accepted from the signing application
pub const DEFAULT_MAX_CERTIFICATE_LEN: usize = 32 * 1024;

/// Objects and parameters of the signing application used by the command
/// sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningProfile {
    /// Root object selected first
    pub root_file: [u8; 2],

    /// AID of the signing application
    pub application_aid: Bytes,

    /// Reference data qualifier of the PIN (P2 of VERIFY)
    pub pin_reference: u8,

    /// Length the PIN is zero padded to
    pub pin_padded_len: usize,

    /// Control reference templates for MANAGE SECURITY ENVIRONMENT
    pub security_environment: Bytes,

    /// File holding the signer certificate
    pub certificate_file: [u8; 2],

    /// Bytes requested per certificate page
    pub page_len: u8,

    /// Certificates growing beyond this are rejected
    pub max_certificate_len: usize,
}

impl Default for SigningProfile {
    fn default() -> Self {
        Self {
            root_file: [0x3F, 0x00],
            application_aid: Bytes::from_static(&[
                0xE8, 0x28, 0xBD, 0x08, 0x0F, 0x01, 0x4E, 0x58, 0x50, 0x30,
            ]),
            pin_reference: 0x05,
            pin_padded_len: 6,
            security_environment: Bytes::from_static(&[0x91, 0x02, 0x22, 0xA1]),
            certificate_file: [0x00, 0x1D],
            page_len: 200,
            max_certificate_len: DEFAULT_MAX_CERTIFICATE_LEN,
        }
    }
}

impl SigningProfile {
    /// Set the signing application AID
    pub fn with_application_aid(mut self, aid: impl Into<Bytes>) -> Self {
        self.application_aid = aid.into();
        self
    }

    /// Set the PIN reference and padded length
    pub const fn with_pin_format(mut self, reference: u8, padded_len: usize) -> Self {
        self.pin_reference = reference;
        self.pin_padded_len = padded_len;
        self
    }

    /// Set the security environment templates
    pub fn with_security_environment(mut self, data: impl Into<Bytes>) -> Self {
        self.security_environment = data.into();
        self
    }

    /// Set the certificate file identifier
    pub const fn with_certificate_file(mut self, file_id: [u8; 2]) -> Self {
        self.certificate_file = file_id;
        self
    }

    /// Set the certificate page length; 0 is sent as Le `00`, 256 bytes
    pub const fn with_page_len(mut self, page_len: u8) -> Self {
        self.page_len = page_len;
        self
    }

    /// Set the certificate size limit
    pub const fn with_max_certificate_len(mut self, len: usize) -> Self {
        self.max_certificate_len = len;
        self
    }
}

/// Configuration options for a reading session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Initial read window for data groups
    pub read_chunk: u8,

    /// Floor for window reductions
    pub min_read_chunk: u8,

    /// Signing application used by the command sequence
    pub signing: SigningProfile,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            min_read_chunk: DEFAULT_MIN_READ_CHUNK,
            signing: SigningProfile::default(),
        }
    }
}

impl ReaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the initial read window, for chips that cannot cope with
    /// the default
    pub const fn with_read_chunk(mut self, read_chunk: u8) -> Self {
        self.read_chunk = read_chunk;
        self
    }

    /// Set the smallest window reductions may reach
    pub const fn with_min_read_chunk(mut self, min_read_chunk: u8) -> Self {
        self.min_read_chunk = min_read_chunk;
        self
    }

    /// Set the signing application profile
    pub fn with_signing_profile(mut self, signing: SigningProfile) -> Self {
        self.signing = signing;
        self
    }
}
