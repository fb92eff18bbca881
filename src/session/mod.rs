// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Framed Session
//!
//! Request/reply messaging over a stream [`Socket`]. Frames are defined in
//! [`framing`]; a [`Session`] adds the pending-reply table on top.
//!
//! # Design
//!
//! - **Caller-driven**: The owner calls [`Session::process_frames`] when the
//!   socket is readable; nothing runs on its own
//! - **Pending replies**: Each request registers a handler under a fresh
//!   txid; a reply with that txid consumes it exactly once
//! - **Unknown txids**: A reply nobody is waiting for is logged and
//!   dropped, the session stays up
//! - **Fatal framing**: A bad frame header disconnects the session and
//!   fails every pending request with `NoConnection`
//! - **Callbacks unlocked**: Handlers run after the session lock is
//!   released and may issue new requests
//!
//! # Usage
//!
//! ```ignore
//! let session = Session::new(socket, FramingConfig::default());
//! session.send_request(b"ping", Box::new(|reply| { /* ... */ }))?;
//! session.process_frames(|frame| { /* requests and notifications */ })?;
//! ```

pub mod framing;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::mem;
use crate::fidl::error::{Error, Result};
use crate::object::socket::Socket;
use crate::status::Status;
use crate::sync::SpinMutex;

pub use framing::{
    Frame, FrameKind, FrameReader, FramingConfig, FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
};

/// Receives the reply to one request
pub type ReplyHandler = Box<dyn FnOnce(Result<Frame>) + Send>;

struct SessionState {
    socket: Option<Socket>,
    reader: FrameReader,
    pending: BTreeMap<u32, ReplyHandler>,
    next_txid: u32,
}

impl SessionState {
    fn alloc_txid(&mut self) -> u32 {
        loop {
            let txid = self.next_txid;
            self.next_txid = self.next_txid.checked_add(1).unwrap_or(1);
            if txid != 0 && !self.pending.contains_key(&txid) {
                return txid;
            }
        }
    }

    /// Write a whole frame or tear the connection down
    ///
    /// A frame cut short mid-write leaves the stream unframeable, so a
    /// partial write drops the socket. The caller fails what is pending.
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode()?;
        let socket = self.socket.as_ref().ok_or(Error::NoConnection)?;
        let mut written = 0;
        while written < bytes.len() {
            match socket.write(&bytes[written..]) {
                Ok(count) => written += count,
                Err(status) => {
                    if written > 0 || status == Status::PeerClosed {
                        log::warn!("session: write failed after {} bytes: {}", written, status);
                        self.socket = None;
                        self.reader.reset();
                    }
                    return Err(Error::Transport(status));
                }
            }
        }
        Ok(())
    }
}

/// What one pass over the socket produced
enum Delivery {
    Reply(ReplyHandler, Frame),
    Inbound(Frame),
}

/// A request/reply session over a stream socket
pub struct Session {
    config: FramingConfig,
    state: SpinMutex<SessionState>,
}

impl Session {
    /// Wrap a connected socket
    pub fn new(socket: Socket, config: FramingConfig) -> Self {
        Self {
            config,
            state: SpinMutex::new(SessionState {
                socket: Some(socket),
                reader: FrameReader::new(config),
                pending: BTreeMap::new(),
                next_txid: 1,
            }),
        }
    }

    /// Framing limits in effect
    pub fn config(&self) -> FramingConfig {
        self.config
    }

    /// Whether a socket is attached
    pub fn is_connected(&self) -> bool {
        self.state.lock().socket.is_some()
    }

    /// Requests still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Send a request and register `handler` for its reply
    ///
    /// On error the handler is dropped without being called.
    pub fn send_request(&self, payload: &[u8], handler: ReplyHandler) -> Result<u32> {
        let (result, failed) = {
            let mut state = self.state.lock();
            let txid = state.alloc_txid();
            match state.write_frame(&Frame::new(FrameKind::Request, txid, payload)) {
                Ok(()) => {
                    state.pending.insert(txid, handler);
                    (Ok(txid), BTreeMap::new())
                }
                Err(error) => {
                    let failed = if state.socket.is_none() {
                        mem::take(&mut state.pending)
                    } else {
                        BTreeMap::new()
                    };
                    (Err(error), failed)
                }
            }
        };
        fail_pending(failed);
        result
    }

    /// Send a frame that expects no reply
    pub fn send_notification(&self, payload: &[u8]) -> Result<()> {
        self.send(&Frame::new(FrameKind::Notification, 0, payload))
    }

    /// Answer a request received through [`Session::process_frames`]
    pub fn send_reply(&self, txid: u32, payload: &[u8]) -> Result<()> {
        if txid == 0 {
            return Err(Error::InvalidResponseTxid);
        }
        self.send(&Frame::new(FrameKind::Reply, txid, payload))
    }

    fn send(&self, frame: &Frame) -> Result<()> {
        let (result, failed) = {
            let mut state = self.state.lock();
            let result = state.write_frame(frame);
            let failed = if result.is_err() && state.socket.is_none() {
                mem::take(&mut state.pending)
            } else {
                BTreeMap::new()
            };
            (result, failed)
        };
        fail_pending(failed);
        result
    }

    /// Read and dispatch everything the socket has
    ///
    /// Replies go to their pending handlers. Requests and notifications go
    /// to `on_frame`. Returns how many frames were delivered.
    ///
    /// # Errors
    ///
    /// A framing error or a closed peer disconnects the session; pending
    /// requests are failed with `NoConnection` before the error returns.
    pub fn process_frames(&self, mut on_frame: impl FnMut(Frame)) -> Result<usize> {
        let mut delivered = 0;
        loop {
            let (batch, failure) = self.collect();
            let progressed = !batch.is_empty();

            for delivery in batch {
                match delivery {
                    Delivery::Reply(handler, frame) => handler(Ok(frame)),
                    Delivery::Inbound(frame) => on_frame(frame),
                }
                delivered += 1;
            }

            if let Some((error, failed)) = failure {
                fail_pending(failed);
                return Err(error);
            }
            if !progressed {
                return Ok(delivered);
            }
        }
    }

    /// One locked pass: read, split into frames, match replies
    fn collect(&self) -> (Vec<Delivery>, Option<(Error, BTreeMap<u32, ReplyHandler>)>) {
        let mut batch = Vec::new();
        let mut state = self.state.lock();
        let state = &mut *state;

        let Some(socket) = state.socket.as_ref() else {
            return (batch, Some((Error::NoConnection, BTreeMap::new())));
        };
        let filled = state.reader.fill_from(socket);

        // Frames completed before a read failure are still delivered.
        let framed = loop {
            match state.reader.next_frame() {
                Ok(Some(frame)) => match frame.kind {
                    FrameKind::Reply => match state.pending.remove(&frame.txid) {
                        Some(handler) => batch.push(Delivery::Reply(handler, frame)),
                        None => log::warn!("session: discarding reply for unknown txid {}", frame.txid),
                    },
                    FrameKind::Request | FrameKind::Notification => {
                        batch.push(Delivery::Inbound(frame))
                    }
                },
                Ok(None) => break Ok(()),
                Err(error) => break Err(error),
            }
        };

        let error = match (filled, framed) {
            (_, Err(error)) | (Err(error), Ok(())) => error,
            (Ok(_), Ok(())) => return (batch, None),
        };
        match error {
            Error::Transport(Status::PeerClosed) => log::debug!("session: peer closed"),
            _ => log::error!("session: framing error, disconnecting: {}", error),
        }
        state.socket = None;
        state.reader.reset();
        let failed = mem::take(&mut state.pending);
        (batch, Some((error, failed)))
    }

    /// Swap the underlying socket
    ///
    /// Every request pending on the old socket is failed with
    /// `NoConnection`, exactly once and after the swap, so a handler that
    /// sends a new request uses the new socket. Returns the old socket.
    pub fn replace_connection(&self, socket: Option<Socket>) -> Option<Socket> {
        let (old, failed) = {
            let mut state = self.state.lock();
            state.reader.reset();
            let old = mem::replace(&mut state.socket, socket);
            (old, mem::take(&mut state.pending))
        };
        fail_pending(failed);
        old
    }

    /// Drop the socket and fail pending requests
    pub fn close(&self) {
        drop(self.replace_connection(None));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let failed = mem::take(&mut self.state.get_mut().pending);
        fail_pending(failed);
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn fail_pending(pending: BTreeMap<u32, ReplyHandler>) {
    for (_, handler) in pending {
        handler(Err(Error::NoConnection));
    }
}

// ============================================================================
// Tests
// ============================================================================
