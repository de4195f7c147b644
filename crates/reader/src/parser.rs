//! Acceptance of raw data group bytes
//!
//! Structured decoding of group content is left to the application; the
//! default parser only checks the outer tag and length.

use std::fmt;

use bytes::Bytes;

use crate::data_group::{DataGroup, DataGroupId, ParseFailure, ber_header};

/// Turns the raw bytes of a file into a [`DataGroup`]
pub trait DataGroupParser: Send + Sync + fmt::Debug {
    /// Accept or reject `raw` as the content of `id`
    fn parse(&self, raw: Bytes, id: DataGroupId) -> Result<DataGroup, ParseFailure>;
}

/// Parser validating the outer BER tag and length
#[derive(Debug, Default, Clone, Copy)]
pub struct TlvDataGroupParser;

impl DataGroupParser for TlvDataGroupParser {
    fn parse(&self, raw: Bytes, id: DataGroupId) -> Result<DataGroup, ParseFailure> {
        let found = raw.first().copied().ok_or(ParseFailure::TruncatedHeader)?;
        if found != id.tag() {
            return Err(ParseFailure::UnexpectedTag {
                expected: id.tag(),
                found,
            });
        }

        let (header_len, value_len) = ber_header(&raw)?;
        if header_len + value_len != raw.len() {
            return Err(ParseFailure::LengthMismatch {
                declared: header_len + value_len,
                actual: raw.len(),
            });
        }

        Ok(DataGroup::new(id, raw, header_len))
    }
}
