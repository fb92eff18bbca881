// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Client Binding
//!
//! Multiplexes concurrent calls over one channel and routes replies back
//! to the call that issued them.
//!
//! # Design
//!
//! - **Pending table**: Each two-way call registers a response handler
//!   under a fresh transaction id before the request is written
//! - **Tolerant matching**: A reply whose id is not pending is logged and
//!   discarded; the connection stays up
//! - **Drain by snapshot**: On teardown, peer closure, epitaph or
//!   [`Client::replace_channel`], the table is swapped out under the lock
//!   and every handler is then invoked once with
//!   [`Error::NoConnection`], in transaction-id order, with no lock held
//! - **Events**: Messages with transaction id 0 go to the
//!   [`EventHandler`]
//!
//! # Usage
//!
//! ```ignore
//! let client = Client::bind(event_loop.dispatcher(), client_end, ClientConfig::default(), None)?;
//! client.call(ECHO_ORDINAL, &mut 7u32, |result: fidl::Result<u32>| {
//!     log::info!("echoed {:?}", result);
//! })?;
//! ```

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use crate::fidl::encoding::{Decode, Encode};
use crate::fidl::error::{Error, Result};
use crate::fidl::header::{DynamicFlags, TransactionHeader};
use crate::fidl::message::{IncomingMessage, OutgoingMessage};
use crate::fidl::metadata::WireFormatVersion;
use crate::object::channel::{Channel, KERNEL_TXID_BIT};
use crate::object::handle::{Handle, HandleBased};
use crate::object::message_packet::MessagePacket;
use crate::object::signals::Signals;
use crate::status::Status;
use crate::sync::{Completion, SpinMutex};
use crate::traits::{Dispatcher, WaitHandler, WaitId};

/// Callback receiving the reply to one call
pub type ResponseHandler = Box<dyn FnOnce(Result<IncomingMessage>) + Send>;

/// Client configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientConfig {
    /// Wire format stamped on outgoing messages
    pub wire_format: WireFormatVersion,
}

/// Receiver of events and connection errors
pub trait EventHandler: Send + Sync {
    /// A message with transaction id 0 arrived
    fn on_event(&self, message: IncomingMessage) {
        log::warn!("unhandled event ordinal {:#x}", message.ordinal());
    }

    /// The connection ended because of `error`
    fn on_fidl_error(&self, error: Error) {
        let _ = error;
    }
}

/// Client state, reachable only with the client lock held
struct ClientState {
    channel: Option<Channel>,
    wait: Option<WaitId>,
    /// Bumped on every arm; a wait handler from an older generation is stale
    generation: u64,
    pending: BTreeMap<u32, ResponseHandler>,
    next_txid: u32,
    epitaph: Option<Status>,
}

impl ClientState {
    /// Next transaction id that is not zero, not pending and clear of
    /// [`KERNEL_TXID_BIT`]
    fn alloc_txid(&mut self) -> u32 {
        loop {
            let txid = self.next_txid;
            self.next_txid = if txid + 1 >= KERNEL_TXID_BIT { 1 } else { txid + 1 };
            if !self.pending.contains_key(&txid) {
                return txid;
            }
        }
    }

    /// Refuse new calls once disconnected
    fn check_connected(&self) -> Result<&Channel> {
        match (&self.channel, self.epitaph) {
            (_, Some(status)) => Err(Error::ClientChannelClosed { status }),
            (Some(channel), None) => Ok(channel),
            (None, None) => Err(Error::NoConnection),
        }
    }
}

struct ClientInner {
    dispatcher: Arc<dyn Dispatcher>,
    config: ClientConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
    state: SpinMutex<ClientState>,
}

impl ClientInner {
    fn arm(self: &Arc<Self>) -> core::result::Result<(), Status> {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let inner = self.clone();
        let handler: WaitHandler = Box::new(move |result| inner.on_signals(generation, result));

        let Some(channel) = state.channel.as_ref() else {
            return Err(Status::BadState);
        };
        let id = self.dispatcher.begin_wait(
            channel.as_handle(),
            Signals::CHANNEL_READABLE | Signals::CHANNEL_PEER_CLOSED,
            handler,
        )?;
        state.wait = Some(id);
        Ok(())
    }

    fn on_signals(self: Arc<Self>, generation: u64, result: core::result::Result<Signals, Status>) {
        {
            let mut state = self.state.lock();
            // A wait that was already queued when the channel was replaced
            if state.channel.is_none() || state.generation != generation {
                return;
            }
            state.wait = None;
        }
        if let Err(status) = result {
            return self.disconnect(Some(Error::Transport(status)));
        }

        loop {
            let read = {
                let state = self.state.lock();
                match state.channel.as_ref() {
                    Some(channel) => channel.read(),
                    None => return,
                }
            };
            match read {
                Ok(packet) => {
                    if !self.handle_packet(packet) {
                        return;
                    }
                }
                Err(Status::ShouldWait) => break,
                Err(Status::PeerClosed) => {
                    return self.disconnect(Some(Error::ClientChannelClosed {
                        status: Status::PeerClosed,
                    }))
                }
                Err(status) => return self.disconnect(Some(Error::Transport(status))),
            }
        }

        if let Err(status) = self.arm() {
            self.disconnect(Some(Error::Transport(status)));
        }
    }

    /// Route one message; returns false once the connection is gone
    fn handle_packet(&self, packet: MessagePacket) -> bool {
        let message = match IncomingMessage::from_packet(packet) {
            Ok(message) => message,
            Err(error) => {
                log::error!("client: bad message: {}", error);
                self.disconnect(Some(error));
                return false;
            }
        };

        if message.is_epitaph() {
            let status = match message.epitaph_status() {
                Ok(status) => status,
                Err(error) => {
                    self.disconnect(Some(error));
                    return false;
                }
            };
            log::debug!("client: epitaph {}", status);
            self.state.lock().epitaph = Some(status);
            self.disconnect(Some(Error::ClientChannelClosed { status }));
            return false;
        }

        let txid = message.txid();
        if txid == 0 {
            match &self.event_handler {
                Some(handler) => handler.on_event(message),
                None => log::warn!("client: dropped event ordinal {:#x}", message.ordinal()),
            }
            return true;
        }

        let handler = self.state.lock().pending.remove(&txid);
        match handler {
            Some(handler) => handler(Ok(message)),
            None => log::warn!(
                "client: discarding response with unknown txid {} (ordinal {:#x})",
                txid,
                message.ordinal()
            ),
        }
        true
    }

    /// Write a request and register its handler
    fn send_two_way(&self, mut message: OutgoingMessage, handler: ResponseHandler) -> Result<u32> {
        let sent = {
            let mut state = self.state.lock();
            let txid = state.alloc_txid();
            message.set_txid(txid);
            // The reply cannot be routed before the handler is registered:
            // routing needs this lock.
            let written = state
                .check_connected()
                .and_then(|channel| message.write(channel).map_err(Error::Transport));
            match written {
                Ok(()) => {
                    state.pending.insert(txid, handler);
                    Ok(txid)
                }
                Err(error) => Err((error, handler)),
            }
        };
        // A call that fails up front drops its handler uninvoked.
        sent.map_err(|(error, handler)| {
            drop(handler);
            error
        })
    }

    /// Drop the channel and fail every pending call
    ///
    /// `error` is reported to the event handler if the connection was
    /// still up.
    fn disconnect(&self, error: Option<Error>) {
        let (channel, wait, pending) = {
            let mut state = self.state.lock();
            (
                state.channel.take(),
                state.wait.take(),
                core::mem::take(&mut state.pending),
            )
        };
        if let Some(id) = wait {
            self.dispatcher.cancel_wait(id);
        }
        let was_connected = channel.is_some();
        drop(channel);

        fail_pending(pending);
        if let (true, Some(error)) = (was_connected, error) {
            if let Some(handler) = &self.event_handler {
                handler.on_fidl_error(error);
            }
        }
    }
}

/// Invoke every handler of a drained pending table with `NoConnection`
fn fail_pending(pending: BTreeMap<u32, ResponseHandler>) {
    if !pending.is_empty() {
        log::debug!("client: failing {} pending calls", pending.len());
    }
    for (_, handler) in pending {
        handler(Err(Error::NoConnection));
    }
}

/// ============================================================================
/// Client
/// ============================================================================

/// Client end of a protocol
///
/// Dropping the client tears it down.
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Start receiving on `channel`
    pub fn bind(
        dispatcher: Arc<dyn Dispatcher>,
        channel: Channel,
        config: ClientConfig,
        event_handler: Option<Arc<dyn EventHandler>>,
    ) -> core::result::Result<Self, Status> {
        let inner = Arc::new(ClientInner {
            dispatcher,
            config,
            event_handler,
            state: SpinMutex::new(ClientState {
                channel: Some(channel),
                wait: None,
                generation: 0,
                pending: BTreeMap::new(),
                next_txid: 1,
                epitaph: None,
            }),
        });
        inner.arm()?;
        Ok(Self { inner })
    }

    fn header(&self, ordinal: u64) -> TransactionHeader {
        TransactionHeader::new(0, ordinal, DynamicFlags::empty(), self.inner.config.wire_format)
    }

    /// Send a raw request
    ///
    /// Returns the transaction id. `handler` runs exactly once unless this
    /// returns an error, in which case it never runs.
    pub fn call_raw(
        &self,
        ordinal: u64,
        body: &[u8],
        handles: Vec<Handle>,
        handler: ResponseHandler,
    ) -> Result<u32> {
        let message = OutgoingMessage::from_raw(self.header(ordinal), body, handles);
        self.inner.send_two_way(message, handler)
    }

    /// Send a typed request; `handler` receives the decoded reply
    pub fn call<Req, Resp, F>(&self, ordinal: u64, request: &mut Req, handler: F) -> Result<()>
    where
        Req: Encode,
        Resp: Decode + 'static,
        F: FnOnce(Result<Resp>) + Send + 'static,
    {
        let message = OutgoingMessage::encode(self.header(ordinal), request)?;
        let decode = Box::new(move |result: Result<IncomingMessage>| {
            handler(result.and_then(|mut message| message.decode_body::<Resp>()));
        });
        self.inner.send_two_way(message, decode).map(|_| ())
    }

    /// Send a typed request and block for the reply
    ///
    /// Another thread must be running the dispatcher; calling this from a
    /// dispatcher thread deadlocks.
    pub fn call_sync<Req, Resp>(&self, ordinal: u64, request: &mut Req) -> Result<Resp>
    where
        Req: Encode,
        Resp: Decode + Send + 'static,
    {
        let completion = Arc::new(Completion::new());
        let done = completion.clone();
        self.call(ordinal, request, move |result: Result<Resp>| done.complete(result))?;
        completion.wait()
    }

    /// Send a message that expects no reply
    pub fn send_one_way<Req: Encode>(&self, ordinal: u64, request: &mut Req) -> Result<()> {
        let message = OutgoingMessage::encode(self.header(ordinal), request)?;
        let state = self.inner.state.lock();
        let channel = state.check_connected()?;
        message.write(channel).map_err(Error::Transport)
    }

    /// Switch to a new channel
    ///
    /// Every call pending on the old channel fails with `NoConnection`;
    /// handlers issuing new calls from that callback reach the new
    /// channel. Returns the old channel, if there was one.
    pub fn replace_channel(&self, channel: Channel) -> core::result::Result<Option<Channel>, Status> {
        let (old, wait, pending) = {
            let mut state = self.inner.state.lock();
            state.epitaph = None;
            (
                state.channel.replace(channel),
                state.wait.take(),
                core::mem::take(&mut state.pending),
            )
        };
        if let Some(id) = wait {
            self.inner.dispatcher.cancel_wait(id);
        }
        let armed = self.inner.arm();
        fail_pending(pending);
        armed.map(|()| old)
    }

    /// Close the channel and fail every pending call
    pub fn teardown(&self) {
        self.inner.disconnect(None);
    }

    /// Whether the client still has a channel
    pub fn is_bound(&self) -> bool {
        self.inner.state.lock().channel.is_some()
    }

    /// Number of calls awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Epitaph received from the server, if any
    pub fn epitaph(&self) -> Option<Status> {
        self.inner.state.lock().epitaph
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.disconnect(None);
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("bound", &self.is_bound())
            .field("pending", &self.pending_count())
            .finish()
    }
}
