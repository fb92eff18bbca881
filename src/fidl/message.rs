// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Transactional Messages
//!
//! [`OutgoingMessage`] pairs an encoded header + body with the handles the
//! body moved out of its value. [`IncomingMessage`] is a read packet whose
//! header has been decoded and whose magic number has been checked, so
//! the wire format is known before any body byte is interpreted.

use alloc::vec::Vec;
use core::fmt;
use crate::fidl::encoding::{Decode, Decoder, Encode, Encoder};
use crate::fidl::error::{Error, Result};
use crate::fidl::header::{decode_epitaph, encode_epitaph, TransactionHeader, HEADER_SIZE};
use crate::fidl::metadata::WireFormatVersion;
use crate::object::channel::Channel;
use crate::object::handle::Handle;
use crate::object::message_packet::MessagePacket;
use crate::status::Status;

/// ============================================================================
/// Outgoing
/// ============================================================================

/// An encoded message ready to be written
pub struct OutgoingMessage {
    bytes: Vec<u8>,
    handles: Vec<Handle>,
}

impl OutgoingMessage {
    /// Encode `header` followed by `body`
    ///
    /// Handles are moved out of `body`. The body uses the wire format the
    /// header announces.
    pub fn encode<T: Encode>(header: TransactionHeader, body: &mut T) -> Result<Self> {
        let version = header.validate()?;
        let mut body_bytes = Vec::new();
        let mut handles = Vec::new();
        Encoder::encode(&mut body_bytes, &mut handles, version, body)?;

        let mut bytes = Vec::with_capacity(HEADER_SIZE + body_bytes.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&body_bytes);
        Ok(Self { bytes, handles })
    }

    /// A message with a raw body
    pub fn from_raw(header: TransactionHeader, body: &[u8], handles: Vec<Handle>) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(body);
        Self { bytes, handles }
    }

    /// An epitaph carrying `status`
    pub fn epitaph(status: Status, version: WireFormatVersion) -> Self {
        Self {
            bytes: encode_epitaph(status, version),
            handles: Vec::new(),
        }
    }

    /// Rewrite the transaction id
    pub fn set_txid(&mut self, txid: u32) {
        self.bytes[0..4].copy_from_slice(&txid.to_le_bytes());
    }

    /// Decoded header
    pub fn header(&self) -> Result<TransactionHeader> {
        TransactionHeader::decode(&self.bytes).map(|(header, _)| header)
    }

    /// Encoded bytes, header included
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Handles carried by the message
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// Write to a channel, consuming the handles
    pub fn write(self, channel: &Channel) -> core::result::Result<(), Status> {
        channel.write(&self.bytes, self.handles)
    }

    /// Split into bytes and handles
    pub fn into_parts(self) -> (Vec<u8>, Vec<Handle>) {
        (self.bytes, self.handles)
    }
}

impl fmt::Debug for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingMessage")
            .field("len", &self.bytes.len())
            .field("handles", &self.handles.len())
            .finish()
    }
}

/// ============================================================================
/// Incoming
/// ============================================================================

/// A received message with a validated header
pub struct IncomingMessage {
    header: TransactionHeader,
    version: WireFormatVersion,
    bytes: Vec<u8>,
    handles: Vec<Handle>,
}

impl IncomingMessage {
    /// Decode the header of raw bytes + handles
    ///
    /// # Returns
    ///
    /// - `InvalidHeader` if the bytes are shorter than a header
    /// - `IncompatibleMagicNumber` if the magic number is unknown
    pub fn new(bytes: Vec<u8>, handles: Vec<Handle>) -> Result<Self> {
        let (header, _) = TransactionHeader::decode(&bytes)?;
        let version = header.validate()?;
        Ok(Self {
            header,
            version,
            bytes,
            handles,
        })
    }

    /// Decode the header of a read packet
    pub fn from_packet(packet: MessagePacket) -> Result<Self> {
        let (bytes, handles) = packet.into_parts();
        Self::new(bytes, handles)
    }

    /// Decoded header
    pub fn header(&self) -> &TransactionHeader {
        &self.header
    }

    /// Method ordinal
    pub fn ordinal(&self) -> u64 {
        self.header.ordinal
    }

    /// Transaction id
    pub fn txid(&self) -> u32 {
        self.header.tx_id
    }

    /// Wire format of the body
    pub fn wire_format(&self) -> WireFormatVersion {
        self.version
    }

    /// Whether this is an epitaph
    pub fn is_epitaph(&self) -> bool {
        self.header.is_epitaph()
    }

    /// Body bytes after the header
    pub fn body(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// Handles carried by the message
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// Decode the body as a `T`, taking the handles
    pub fn decode_body<T: Decode>(&mut self) -> Result<T> {
        let version = self.version;
        let body = &self.bytes[HEADER_SIZE..];
        Decoder::decode(version, body, &mut self.handles)
    }

    /// Status carried by an epitaph
    pub fn epitaph_status(&self) -> Result<Status> {
        if !self.is_epitaph() {
            return Err(Error::InvalidHeader);
        }
        match decode_epitaph(self.body())? {
            Ok(()) => Ok(Status::PeerClosed),
            Err(status) => Ok(status),
        }
    }

    /// Split into header, body bytes and handles
    pub fn into_parts(self) -> (TransactionHeader, Vec<u8>, Vec<Handle>) {
        let mut bytes = self.bytes;
        let body = bytes.split_off(HEADER_SIZE);
        (self.header, body, self.handles)
    }
}

impl fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("header", &self.header)
            .field("len", &self.bytes.len())
            .field("handles", &self.handles.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
