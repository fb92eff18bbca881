// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Wire-Format Metadata
//!
//! Every message carries eight bytes of self-describing metadata that
//! say how the rest of it is laid out:
//!
//! ```text
//! byte 0     disambiguator (0 in a transactional header)
//! byte 1     magic number
//! bytes 2-3  at-rest flags (bit 0 of flags[0] selects V2)
//! bytes 4-7  reserved, zero
//! ```
//!
//! The block is copied around as one opaque `u64` (little-endian).

use crate::fidl::error::{Error, Result};
use crate::fidl::header::TransactionHeader;

/// The only magic number this library understands
pub const MAGIC_NUMBER_INITIAL: u8 = 1;

/// At-rest flag (in `flags[0]`) selecting the V2 wire format
pub const AT_REST_FLAG_V2: u8 = 1 << 0;

/// Size of the metadata block
pub const METADATA_SIZE: usize = 8;

/// Wire format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormatVersion {
    /// 16-byte out-of-line envelopes
    V1,

    /// 8-byte envelopes with small values inlined
    #[default]
    V2,
}

impl WireFormatVersion {
    /// At-rest flags announcing this version
    pub const fn at_rest_flags(self) -> [u8; 2] {
        match self {
            Self::V1 => [0, 0],
            Self::V2 => [AT_REST_FLAG_V2, 0],
        }
    }
}

/// Eight-byte wire-format metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireFormatMetadata {
    disambiguator: u8,
    magic_number: u8,
    at_rest_flags: [u8; 2],
    reserved: [u8; 4],
}

impl WireFormatMetadata {
    /// Metadata for a message in `version`
    pub const fn new(version: WireFormatVersion) -> Self {
        Self {
            disambiguator: 0,
            magic_number: MAGIC_NUMBER_INITIAL,
            at_rest_flags: version.at_rest_flags(),
            reserved: [0; 4],
        }
    }

    /// Metadata describing a transactional header
    pub fn from_header(header: &TransactionHeader) -> Self {
        Self {
            disambiguator: 0,
            magic_number: header.magic_number,
            at_rest_flags: header.at_rest_flags,
            reserved: [0; 4],
        }
    }

    /// Serialize
    pub const fn to_bytes(&self) -> [u8; METADATA_SIZE] {
        [
            self.disambiguator,
            self.magic_number,
            self.at_rest_flags[0],
            self.at_rest_flags[1],
            self.reserved[0],
            self.reserved[1],
            self.reserved[2],
            self.reserved[3],
        ]
    }

    /// Deserialize (no validation)
    pub const fn from_bytes(bytes: [u8; METADATA_SIZE]) -> Self {
        Self {
            disambiguator: bytes[0],
            magic_number: bytes[1],
            at_rest_flags: [bytes[2], bytes[3]],
            reserved: [bytes[4], bytes[5], bytes[6], bytes[7]],
        }
    }

    /// Deserialize from the front of a message
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let block: [u8; METADATA_SIZE] = bytes
            .get(..METADATA_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::InvalidHeader)?;
        Ok(Self::from_bytes(block))
    }

    /// The block as one opaque integer
    pub const fn to_opaque(&self) -> u64 {
        u64::from_le_bytes(self.to_bytes())
    }

    /// Inverse of [`WireFormatMetadata::to_opaque`]
    pub const fn from_opaque(value: u64) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }

    /// Whether the magic number is one this library understands
    pub const fn is_valid(&self) -> bool {
        self.magic_number == MAGIC_NUMBER_INITIAL
    }

    /// Magic number byte
    pub const fn magic_number(&self) -> u8 {
        self.magic_number
    }

    /// Disambiguator byte
    pub const fn disambiguator(&self) -> u8 {
        self.disambiguator
    }

    /// At-rest flags
    pub const fn at_rest_flags(&self) -> [u8; 2] {
        self.at_rest_flags
    }

    /// Wire format selected by the at-rest flags
    ///
    /// # Panics
    ///
    /// If the metadata is not valid. Metadata is validated where it enters
    /// the process (see [`WireFormatMetadata::validate`]); reaching here
    /// with a bad magic number is a bug.
    pub fn wire_format_version(&self) -> WireFormatVersion {
        assert!(
            self.is_valid(),
            "wire format queried on invalid metadata (magic {:#x})",
            self.magic_number
        );
        if self.at_rest_flags[0] & AT_REST_FLAG_V2 != 0 {
            WireFormatVersion::V2
        } else {
            WireFormatVersion::V1
        }
    }

    /// Check the magic number and return the wire format
    pub fn validate(&self) -> Result<WireFormatVersion> {
        if !self.is_valid() {
            return Err(Error::IncompatibleMagicNumber(self.magic_number));
        }
        Ok(self.wire_format_version())
    }
}

impl Default for WireFormatMetadata {
    fn default() -> Self {
        Self::new(WireFormatVersion::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
