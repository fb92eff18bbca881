// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Message Packets
//!
//! A message packet is one atomic unit of transfer over a channel: a
//! bounded byte payload plus a bounded array of handles. The handles are
//! owned by the packet while it sits in a queue, so they travel with it
//! and are released with it.
//!
//! # Design
//!
//! - **Immutable in flight**: Once queued, only the channel can touch a packet
//! - **Bounded**: [`MAX_MESSAGE_BYTES`] and [`MAX_MESSAGE_HANDLES`]
//! - **Fallible allocation**: Payload storage is reserved with `try_reserve`
//!   so exhaustion surfaces as [`Status::NoMemory`]

use alloc::vec::Vec;
use core::fmt;
use crate::object::handle::Handle;
use crate::status::{Result, Status};

/// Maximum payload of one channel message
pub const MAX_MESSAGE_BYTES: usize = 65536;

/// Maximum number of handles in one channel message
pub const MAX_MESSAGE_HANDLES: usize = 64;

/// Size of the transaction id prefix read by [`MessagePacket::txid`]
pub const TXID_SIZE: usize = 4;

/// One message in flight
pub struct MessagePacket {
    /// Payload bytes
    data: Vec<u8>,

    /// Transferred handles
    handles: Vec<Handle>,

    /// Position in the pipe, assigned when enqueued
    seq: u64,
}

impl MessagePacket {
    /// Build a packet from a payload and handles
    ///
    /// The handles are moved in first; if validation fails they are
    /// released along with the packet.
    ///
    /// # Returns
    ///
    /// - `OutOfRange` if the payload or handle count is over the limit
    /// - `NoMemory` if the payload could not be allocated
    pub fn create(data: &[u8], handles: Vec<Handle>) -> Result<Self> {
        if data.len() > MAX_MESSAGE_BYTES || handles.len() > MAX_MESSAGE_HANDLES {
            return Err(Status::OutOfRange);
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(data.len())
            .map_err(|_| Status::NoMemory)?;
        buffer.extend_from_slice(data);
        Ok(Self {
            data: buffer,
            handles,
            seq: 0,
        })
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Handles carried by the packet
    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    /// Number of handles carried
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Transaction id stored in the first four payload bytes
    ///
    /// Returns 0 for payloads shorter than the prefix.
    pub fn txid(&self) -> u32 {
        match self.data.get(..TXID_SIZE) {
            Some(prefix) => u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]),
            None => 0,
        }
    }

    /// Overwrite the transaction id prefix
    pub(crate) fn set_txid(&mut self, txid: u32) -> Result<()> {
        let prefix = self
            .data
            .get_mut(..TXID_SIZE)
            .ok_or(Status::InvalidArgs)?;
        prefix.copy_from_slice(&txid.to_le_bytes());
        Ok(())
    }

    /// Sequence number assigned by the pipe
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    /// Remove the handles, leaving only the payload
    pub(crate) fn take_handles(&mut self) -> Vec<Handle> {
        core::mem::take(&mut self.handles)
    }

    /// Split into payload and handles
    pub fn into_parts(self) -> (Vec<u8>, Vec<Handle>) {
        (self.data, self.handles)
    }
}

impl fmt::Debug for MessagePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePacket")
            .field("bytes", &self.data.len())
            .field("handles", &self.handles.len())
            .field("txid", &self.txid())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
