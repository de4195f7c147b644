//! Access credentials for the handshake
//!
//! A credential is either the MRZ derived key seed or the card access number
//! printed on the document. Key material is wiped from memory on drop.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Error;

/// Weights of the ICAO 9303 check digit
const CHECK_DIGIT_WEIGHTS: [u32; 3] = [7, 3, 1];

/// Length of the document number field in the MRZ
const DOCUMENT_NUMBER_LEN: usize = 9;

/// Secret material of a credential
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessKey(String);

impl AccessKey {
    /// Raw bytes handed to the key derivation
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(***)")
    }
}

/// Access credential for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// MRZ information: document number, birth date and expiry date with
    /// their check digits. Both handshake tiers accept it.
    Mrz(AccessKey),
    /// Card access number. Only the modern handshake accepts it.
    Can(AccessKey),
}

impl Credential {
    /// Use a ready made MRZ key string
    pub fn mrz(key: impl Into<String>) -> Self {
        Self::Mrz(AccessKey(key.into()))
    }

    /// Use a card access number
    pub fn can(number: impl Into<String>) -> Self {
        Self::Can(AccessKey(number.into()))
    }

    /// Derive the MRZ key from the printed document fields
    ///
    /// Dates are `YYMMDD`. Short document numbers are padded with `<`.
    pub fn from_mrz_fields(
        document_number: &str,
        date_of_birth: &str,
        date_of_expiry: &str,
    ) -> Result<Self, Error> {
        for date in [date_of_birth, date_of_expiry] {
            if date.len() != 6 || !date.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidRequest("MRZ dates must be six digits"));
            }
        }

        let mut number = document_number.to_ascii_uppercase();
        if number.len() < DOCUMENT_NUMBER_LEN {
            number.extend(std::iter::repeat_n('<', DOCUMENT_NUMBER_LEN - number.len()));
        }

        let mut key = String::with_capacity(number.len() + 15);
        for field in [number.as_str(), date_of_birth, date_of_expiry] {
            let digit = check_digit(field)
                .ok_or(Error::InvalidRequest("MRZ field contains invalid characters"))?;
            key.push_str(field);
            key.push(char::from(b'0' + digit));
        }
        number.zeroize();

        Ok(Self::Mrz(AccessKey(key)))
    }

    /// Whether the legacy handshake may be used with this credential
    pub const fn allows_legacy(&self) -> bool {
        matches!(self, Self::Mrz(_))
    }

    /// The secret material
    pub const fn key(&self) -> &AccessKey {
        match self {
            Self::Mrz(key) | Self::Can(key) => key,
        }
    }
}

/// ICAO 9303 check digit over an MRZ field
fn check_digit(field: &str) -> Option<u8> {
    let mut sum = 0u32;
    for (i, c) in field.chars().enumerate() {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'A'..='Z' => c as u32 - 'A' as u32 + 10,
            '<' => 0,
            _ => return None,
        };
        sum += value * CHECK_DIGIT_WEIGHTS[i % 3];
    }
    Some((sum % 10) as u8)
}
