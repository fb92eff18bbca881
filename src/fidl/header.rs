// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Transactional Header
//!
//! The sixteen bytes at the front of every request, response and event:
//!
//! ```text
//! bytes 0-3   transaction id (0 for one-way messages and events)
//! bytes 4-5   at-rest flags
//! byte  6     dynamic flags
//! byte  7     magic number
//! bytes 8-15  method ordinal
//! ```
//!
//! All fields are little-endian.

use alloc::vec::Vec;
use bitflags::bitflags;
use crate::fidl::error::{Error, Result};
use crate::fidl::metadata::{WireFormatMetadata, WireFormatVersion, MAGIC_NUMBER_INITIAL};
use crate::status::Status;

/// Size of the transactional header
pub const HEADER_SIZE: usize = 16;

/// Ordinal of an epitaph message
pub const EPITAPH_ORDINAL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Size of an epitaph message (header + status + padding)
pub const EPITAPH_SIZE: usize = HEADER_SIZE + 8;

bitflags! {
    /// Flags that may differ per message
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DynamicFlags: u8 {
        /// The method is flexible (may be unknown to the peer)
        const FLEXIBLE = 1 << 7;
    }
}

/// Transactional message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHeader {
    /// Transaction id
    pub tx_id: u32,

    /// At-rest flags (wire format selection)
    pub at_rest_flags: [u8; 2],

    /// Dynamic flags, raw
    pub dynamic_flags: u8,

    /// Magic number
    pub magic_number: u8,

    /// Method ordinal
    pub ordinal: u64,
}

impl TransactionHeader {
    /// Header for a message in `version`
    pub fn new(tx_id: u32, ordinal: u64, dynamic_flags: DynamicFlags, version: WireFormatVersion) -> Self {
        Self {
            tx_id,
            at_rest_flags: version.at_rest_flags(),
            dynamic_flags: dynamic_flags.bits(),
            magic_number: MAGIC_NUMBER_INITIAL,
            ordinal,
        }
    }

    /// Header of an epitaph
    pub fn epitaph(version: WireFormatVersion) -> Self {
        Self::new(0, EPITAPH_ORDINAL, DynamicFlags::empty(), version)
    }

    /// Whether this is an epitaph
    pub fn is_epitaph(&self) -> bool {
        self.ordinal == EPITAPH_ORDINAL
    }

    /// Whether the message expects no reply (or is an event)
    pub fn is_one_way(&self) -> bool {
        self.tx_id == 0
    }

    /// Dynamic flags, ignoring unknown bits
    pub fn flags(&self) -> DynamicFlags {
        DynamicFlags::from_bits_truncate(self.dynamic_flags)
    }

    /// Metadata describing this header
    pub fn metadata(&self) -> WireFormatMetadata {
        WireFormatMetadata::from_header(self)
    }

    /// Check the magic number and return the wire format
    pub fn validate(&self) -> Result<WireFormatVersion> {
        self.metadata().validate()
    }

    /// Serialize
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.tx_id.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.at_rest_flags);
        bytes[6] = self.dynamic_flags;
        bytes[7] = self.magic_number;
        bytes[8..16].copy_from_slice(&self.ordinal.to_le_bytes());
        bytes
    }

    /// Deserialize the header at the front of `bytes`
    ///
    /// Returns the header and the body after it. The magic number is not
    /// checked; use [`TransactionHeader::validate`].
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::InvalidHeader);
        }
        let (head, body) = bytes.split_at(HEADER_SIZE);
        let mut tx_id = [0u8; 4];
        tx_id.copy_from_slice(&head[0..4]);
        let mut ordinal = [0u8; 8];
        ordinal.copy_from_slice(&head[8..16]);
        let header = Self {
            tx_id: u32::from_le_bytes(tx_id),
            at_rest_flags: [head[4], head[5]],
            dynamic_flags: head[6],
            magic_number: head[7],
            ordinal: u64::from_le_bytes(ordinal),
        };
        Ok((header, body))
    }
}

/// Encode an epitaph carrying `status`
pub fn encode_epitaph(status: Status, version: WireFormatVersion) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(EPITAPH_SIZE);
    bytes.extend_from_slice(&TransactionHeader::epitaph(version).to_bytes());
    bytes.extend_from_slice(&status.into_raw().to_le_bytes());
    bytes.extend_from_slice(&[0u8; 4]);
    bytes
}

/// Decode the status carried by an epitaph body
///
/// A raw `OK` decodes as `Ok(())`.
pub fn decode_epitaph(body: &[u8]) -> Result<core::result::Result<(), Status>> {
    if body.len() != 8 {
        return Err(Error::InvalidHeader);
    }
    if body[4..8] != [0, 0, 0, 0] {
        return Err(Error::NonZeroPadding);
    }
    let raw = i32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    Ok(Status::from_raw(raw))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = TransactionHeader::new(
            0x0403_0201,
            0x0c0b_0a09_0807_0605,
            DynamicFlags::FLEXIBLE,
            WireFormatVersion::V2,
        );
        assert_eq!(
            header.to_bytes(),
            [1, 2, 3, 4, 1, 0, 0x80, 1, 5, 6, 7, 8, 9, 10, 11, 12]
        );
    }

    #[test]
    fn test_header_decode() {
        let header = TransactionHeader::new(9, 7, DynamicFlags::empty(), WireFormatVersion::V1);
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let (decoded, body) = TransactionHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(body, &[0xAA, 0xBB]);
        assert_eq!(decoded.validate(), Ok(WireFormatVersion::V1));
        assert!(!decoded.is_one_way());
        assert_eq!(decoded.flags(), DynamicFlags::empty());

        assert_eq!(
            TransactionHeader::decode(&bytes[..15]).unwrap_err(),
            Error::InvalidHeader
        );
    }

    #[test]
    fn test_header_bad_magic() {
        let mut bytes = TransactionHeader::new(0, 1, DynamicFlags::empty(), WireFormatVersion::V2).to_bytes();
        bytes[7] = 0x42;
        let (header, _) = TransactionHeader::decode(&bytes).unwrap();
        assert_eq!(header.validate(), Err(Error::IncompatibleMagicNumber(0x42)));
    }

    #[test]
    fn test_header_metadata() {
        let header = TransactionHeader::new(3, 4, DynamicFlags::empty(), WireFormatVersion::V2);
        let metadata = header.metadata();
        assert!(metadata.is_valid());
        assert_eq!(metadata.wire_format_version(), WireFormatVersion::V2);
        assert_eq!(metadata.disambiguator(), 0);
    }

    #[test]
    fn test_epitaph() {
        let bytes = encode_epitaph(Status::PeerClosed, WireFormatVersion::V2);
        assert_eq!(bytes.len(), EPITAPH_SIZE);

        let (header, body) = TransactionHeader::decode(&bytes).unwrap();
        assert!(header.is_epitaph());
        assert!(header.is_one_way());
        assert_eq!(decode_epitaph(body).unwrap(), Err(Status::PeerClosed));

        assert_eq!(decode_epitaph(&[0; 4]).unwrap_err(), Error::InvalidHeader);
        assert_eq!(
            decode_epitaph(&[0, 0, 0, 0, 1, 0, 0, 0]).unwrap_err(),
            Error::NonZeroPadding
        );
        assert_eq!(decode_epitaph(&[0; 8]).unwrap(), Ok(()));
    }
}
