// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Stream Framing
//!
//! A socket carries bytes, not messages. Frames restore the boundaries:
//!
//! ```text
//! bytes 0-3   size  (whole frame, header included)
//! bytes 4-7   kind  (request, reply, notification)
//! bytes 8-11  txid  (0 for notifications)
//! bytes 12..  payload
//! ```
//!
//! All fields are little-endian.
//!
//! # Design
//!
//! - **Header first**: Nothing past the header is interpreted until all
//!   twelve header bytes are buffered
//! - **Ceiling**: A declared size below the header size or above the
//!   configured maximum is a fatal framing error, raised as soon as the
//!   header arrives and before any payload is buffered
//! - **Bounded buffering**: The reader stops pulling from the socket once
//!   one maximum-size frame is buffered

use alloc::vec::Vec;
use core::fmt;
use crate::fidl::error::{Error, Result};
use crate::object::socket::Socket;
use crate::status::Status;

/// Size of the frame header
pub const FRAME_HEADER_SIZE: usize = 12;

/// Hard ceiling on a frame's declared size
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Bytes pulled from the socket per read
const READ_CHUNK: usize = 4096;

/// What a frame carries
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Expects a reply with the same txid
    Request = 1,

    /// Answers a request
    Reply = 2,

    /// Expects nothing; txid is 0
    Notification = 3,
}

impl FrameKind {
    /// Convert from the wire value
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Request),
            2 => Some(Self::Reply),
            3 => Some(Self::Notification),
            _ => None,
        }
    }
}

/// One framed message
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Kind
    pub kind: FrameKind,

    /// Transaction id
    pub txid: u32,

    /// Payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame
    pub fn new(kind: FrameKind, txid: u32, payload: &[u8]) -> Self {
        Self {
            kind,
            txid,
            payload: payload.to_vec(),
        }
    }

    /// Size on the wire
    pub fn size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Serialize
    ///
    /// Fails with `OutOfRange` above [`MAX_FRAME_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = self.size();
        if size > MAX_FRAME_SIZE {
            return Err(Error::OutOfRange);
        }
        let mut bytes = Vec::with_capacity(size);
        bytes.extend_from_slice(&(size as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.kind as u32).to_le_bytes());
        bytes.extend_from_slice(&self.txid.to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("txid", &self.txid)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// Framing limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingConfig {
    /// Largest frame accepted, header included
    ///
    /// Clamped to `FRAME_HEADER_SIZE..=MAX_FRAME_SIZE`.
    pub max_frame_size: usize,
}

impl FramingConfig {
    /// Limit actually enforced
    pub fn effective_max(&self) -> usize {
        self.max_frame_size.clamp(FRAME_HEADER_SIZE, MAX_FRAME_SIZE)
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Decoded frame header
struct RawHeader {
    size: usize,
    kind: FrameKind,
    txid: u32,
}

/// Reassembles frames from stream bytes
pub struct FrameReader {
    max_frame_size: usize,
    buf: Vec<u8>,
}

impl FrameReader {
    /// Create an empty reader
    pub fn new(config: FramingConfig) -> Self {
        Self {
            max_frame_size: config.effective_max(),
            buf: Vec::new(),
        }
    }

    /// Bytes buffered but not yet returned as frames
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forget buffered bytes
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Append stream bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Validate the buffered header, if complete
    fn header(&self) -> Result<Option<RawHeader>> {
        let Some(head) = self.buf.get(..FRAME_HEADER_SIZE) else {
            return Ok(None);
        };
        let word = |at: usize| u32::from_le_bytes([head[at], head[at + 1], head[at + 2], head[at + 3]]);

        let size = word(0) as usize;
        if size < FRAME_HEADER_SIZE {
            return Err(Error::InvalidHeader);
        }
        if size > self.max_frame_size {
            log::error!("frame declares {} bytes, limit {}", size, self.max_frame_size);
            return Err(Error::OutOfRange);
        }
        let kind = FrameKind::from_raw(word(4)).ok_or(Error::InvalidHeader)?;
        Ok(Some(RawHeader {
            size,
            kind,
            txid: word(8),
        }))
    }

    /// Take the next complete frame
    ///
    /// Returns `None` until a whole frame is buffered. An error is fatal:
    /// the stream can no longer be framed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(header) = self.header()? else {
            return Ok(None);
        };
        if self.buf.len() < header.size {
            return Ok(None);
        }
        let payload = self.buf[FRAME_HEADER_SIZE..header.size].to_vec();
        self.buf.drain(..header.size);
        Ok(Some(Frame {
            kind: header.kind,
            txid: header.txid,
            payload,
        }))
    }

    /// Pull available bytes from `socket`
    ///
    /// Returns how many bytes were read. Stops early once a maximum-size
    /// frame is buffered, and fails as soon as a bad header is seen.
    ///
    /// # Returns
    ///
    /// - `Transport(PeerClosed)` if nothing was read and the peer is gone
    pub fn fill_from(&mut self, socket: &Socket) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            self.header()?;
            if self.buf.len() >= self.max_frame_size {
                return Ok(total);
            }
            let want = READ_CHUNK.min(self.max_frame_size - self.buf.len());
            match socket.read(&mut chunk[..want]) {
                Ok(count) => {
                    self.push(&chunk[..count]);
                    total += count;
                }
                Err(Status::ShouldWait) => {
                    self.header()?;
                    return Ok(total);
                }
                Err(Status::PeerClosed) if total > 0 => return Ok(total),
                Err(status) => return Err(Error::Transport(status)),
            }
        }
    }
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReader")
            .field("max_frame_size", &self.max_frame_size)
            .field("buffered", &self.buf.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn header(size: u32, kind: u32, txid: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&txid.to_le_bytes());
        bytes
    }

    #[test]
    fn test_frame_encode_layout() {
        let bytes = Frame::new(FrameKind::Reply, 9, &[0xAA, 0xBB]).encode().unwrap();
        assert_eq!(bytes.len(), 14);
        assert_eq!(&bytes[..12], &header(14, 2, 9)[..]);
        assert_eq!(&bytes[12..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_reader_waits_for_whole_frame() {
        let bytes = Frame::new(FrameKind::Request, 3, b"hello").encode().unwrap();
        let mut reader = FrameReader::new(FramingConfig::default());

        reader.push(&bytes[..5]);
        assert_eq!(reader.next_frame(), Ok(None));
        reader.push(&bytes[5..15]);
        assert_eq!(reader.next_frame(), Ok(None));
        reader.push(&bytes[15..]);

        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.kind, FrameKind::Request);
        assert_eq!(frame.txid, 3);
        assert_eq!(frame.payload, b"hello");
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_splits_back_to_back_frames() {
        let mut bytes = Frame::new(FrameKind::Notification, 0, &[1]).encode().unwrap();
        bytes.extend(Frame::new(FrameKind::Reply, 4, &[]).encode().unwrap());
        let mut reader = FrameReader::new(FramingConfig::default());
        reader.push(&bytes);

        assert_eq!(reader.next_frame().unwrap().unwrap().kind, FrameKind::Notification);
        let reply = reader.next_frame().unwrap().unwrap();
        assert_eq!(reply.txid, 4);
        assert!(reply.payload.is_empty());
        assert_eq!(reader.next_frame(), Ok(None));
    }

    #[test]
    fn test_reader_rejects_bad_sizes() {
        let mut reader = FrameReader::new(FramingConfig::default());
        reader.push(&header(4, 1, 1));
        assert_eq!(reader.next_frame(), Err(Error::InvalidHeader));

        let mut reader = FrameReader::new(FramingConfig::default());
        reader.push(&header(MAX_FRAME_SIZE as u32 + 1, 1, 1));
        assert_eq!(reader.next_frame(), Err(Error::OutOfRange));
        // Nothing beyond the header was buffered.
        assert_eq!(reader.buffered(), FRAME_HEADER_SIZE);

        let mut reader = FrameReader::new(FramingConfig { max_frame_size: 64 });
        reader.push(&header(65, 1, 1));
        assert_eq!(reader.next_frame(), Err(Error::OutOfRange));

        let mut reader = FrameReader::new(FramingConfig::default());
        reader.push(&header(12, 7, 1));
        assert_eq!(reader.next_frame(), Err(Error::InvalidHeader));
    }

    #[test]
    fn test_config_clamped() {
        assert_eq!(FramingConfig { max_frame_size: 0 }.effective_max(), FRAME_HEADER_SIZE);
        assert_eq!(FramingConfig { max_frame_size: usize::MAX }.effective_max(), MAX_FRAME_SIZE);
        assert_eq!(FramingConfig::default().effective_max(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_fill_from_socket() {
        let (a, b) = Socket::create().unwrap();
        let bytes = Frame::new(FrameKind::Request, 1, &[5; 10]).encode().unwrap();
        assert_eq!(a.write(&bytes), Ok(bytes.len()));

        let mut reader = FrameReader::new(FramingConfig::default());
        assert_eq!(reader.fill_from(&b), Ok(bytes.len()));
        assert_eq!(reader.next_frame().unwrap().unwrap().payload, [5; 10]);
        assert_eq!(reader.fill_from(&b), Ok(0));

        drop(a);
        assert_eq!(reader.fill_from(&b), Err(Error::Transport(Status::PeerClosed)));
    }

    #[test]
    fn test_fill_from_stops_at_bad_header() {
        let (a, b) = Socket::create().unwrap();
        let mut bytes = header(u32::MAX, 1, 1);
        bytes.extend_from_slice(&[0; 100]);
        a.write(&bytes).unwrap();

        let mut reader = FrameReader::new(FramingConfig::default());
        assert_eq!(reader.fill_from(&b), Err(Error::OutOfRange));
        assert!(reader.buffered() < 4096 + FRAME_HEADER_SIZE);
    }
}
