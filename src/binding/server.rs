// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Server Binding
//!
//! Binds one channel endpoint to a [`Protocol`] implementation and a
//! [`Dispatcher`].
//!
//! # Design
//!
//! - **One message per wakeup**: Each readable signal reads and dispatches
//!   one message; the wait is re-armed when the handler returns, or
//!   earlier if it calls [`Transaction::enable_next_dispatch`]
//! - **Consuming completers**: [`Transaction::reply`] and
//!   [`Transaction::close`] take the transaction by value
//! - **In-flight tracking**: Two-way transactions are registered with the
//!   binding; unbinding moves them to [`TxnState::Unbound`] so late replies
//!   fail with `Canceled` instead of touching a dead channel
//! - **Unbind callback**: [`Protocol::on_unbind`] runs exactly once, inline
//!   on the thread that triggered the teardown, with the reason
//!
//! # Usage
//!
//! ```ignore
//! struct Echo;
//!
//! impl Protocol for Echo {
//!     fn dispatch(&self, mut message: IncomingMessage, txn: Transaction) -> fidl::Result<()> {
//!         match message.ordinal() {
//!             ECHO_ORDINAL => {
//!                 let mut value: u32 = message.decode_body()?;
//!                 txn.reply(&mut value)
//!             }
//!             ordinal => {
//!                 self.on_unknown_method(ordinal, txn);
//!                 Ok(())
//!             }
//!         }
//!     }
//! }
//!
//! let binding = bind_server(event_loop.dispatcher(), server_end, Ownership::owned(Echo))?;
//! ```

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use crate::fidl::encoding::Encode;
use crate::fidl::error::{Error, Result};
use crate::fidl::header::{DynamicFlags, TransactionHeader};
use crate::fidl::message::{IncomingMessage, OutgoingMessage};
use crate::fidl::metadata::WireFormatVersion;
use crate::object::channel::Channel;
use crate::object::handle::{Handle, HandleBased, Koid};
use crate::object::signals::Signals;
use crate::status::Status;
use crate::sync::SpinMutex;
use crate::traits::{Dispatcher, WaitHandler, WaitId};
use crate::txn::{TxnSlot, TxnState};

/// ============================================================================
/// Protocol
/// ============================================================================

/// A server implementation
pub trait Protocol: Send + Sync + 'static {
    /// Name used in log messages
    fn name(&self) -> &'static str {
        "protocol"
    }

    /// Handle one incoming message
    ///
    /// Ordinals the implementation does not recognize should be passed to
    /// [`Protocol::on_unknown_method`]. Returning an error (typically a
    /// decode error) closes the binding with that error's status as
    /// epitaph and reports [`UnbindReason::ProtocolError`].
    fn dispatch(&self, message: IncomingMessage, txn: Transaction) -> Result<()>;

    /// A message with an unrecognized ordinal arrived
    ///
    /// Closes the binding with `NotSupported` unless overridden.
    fn on_unknown_method(&self, ordinal: u64, txn: Transaction) {
        log::warn!("{}: unknown method ordinal {:#x}", self.name(), ordinal);
        txn.fail(Error::UnknownOrdinal(ordinal));
    }

    /// The binding was torn down
    fn on_unbind(&self, info: UnbindInfo) {
        let _ = info;
    }
}

/// How a binding holds its server
pub enum Ownership {
    /// The binding owns the server and drops it after unbinding
    Owned(Arc<dyn Protocol>),

    /// The server lives elsewhere; the binding ends if it is dropped
    External(Weak<dyn Protocol>),
}

impl Ownership {
    /// Hand the server to the binding
    pub fn owned<P: Protocol>(server: P) -> Self {
        Self::Owned(Arc::new(server))
    }

    /// Bind a server owned by the caller
    pub fn external<P: Protocol>(server: &Arc<P>) -> Self {
        let weak: Weak<dyn Protocol> = Arc::downgrade(server) as Weak<dyn Protocol>;
        Self::External(weak)
    }

    fn get(&self) -> Option<Arc<dyn Protocol>> {
        match self {
            Self::Owned(server) => Some(server.clone()),
            Self::External(server) => server.upgrade(),
        }
    }
}

/// ============================================================================
/// Unbind
/// ============================================================================

/// Why a binding ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindReason {
    /// [`ServerBindingRef::unbind`]; the channel is handed back
    Unbind,

    /// The server closed the channel with this epitaph
    Close(Status),

    /// The client closed its end
    PeerClosed,

    /// The dispatcher shut down
    DispatcherShutdown,

    /// The client sent something the server could not handle
    ProtocolError(Error),

    /// A two-way transaction was dropped without a reply
    Abandoned,
}

impl UnbindReason {
    /// Whether the server asked for this
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, Self::Unbind | Self::Close(_))
    }

    /// Whether this indicates a bug on either side
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ProtocolError(_) | Self::Abandoned)
    }
}

impl fmt::Display for UnbindReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbind => f.write_str("unbind"),
            Self::Close(status) => write!(f, "closed with {}", status),
            Self::PeerClosed => f.write_str("peer closed"),
            Self::DispatcherShutdown => f.write_str("dispatcher shutdown"),
            Self::ProtocolError(error) => write!(f, "protocol error: {}", error),
            Self::Abandoned => f.write_str("transaction abandoned"),
        }
    }
}

/// What a server is told when its binding ends
#[derive(Debug)]
pub struct UnbindInfo {
    /// Why
    pub reason: UnbindReason,

    /// The channel, returned only for [`UnbindReason::Unbind`]
    pub channel: Option<Channel>,
}

/// ============================================================================
/// Binding
/// ============================================================================

/// Binding state, reachable only with the binding lock held
///
/// The binding is unbound once `channel` is `None`.
struct BindingState {
    channel: Option<Channel>,
    wait: Option<WaitId>,
    in_flight: Vec<Arc<TxnSlot>>,
    server: Option<Ownership>,
}

struct Binding {
    dispatcher: Arc<dyn Dispatcher>,
    koid: Koid,
    state: SpinMutex<BindingState>,
}

impl Binding {
    /// Wait for the next message or peer closure
    fn arm(self: &Arc<Self>) -> core::result::Result<(), Status> {
        let binding = self.clone();
        let handler: WaitHandler = Box::new(move |result| binding.on_signals(result));

        let mut state = self.state.lock();
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

    /// Re-arm, tearing down if the dispatcher refuses
    fn rearm(self: &Arc<Self>) {
        if let Err(status) = self.arm() {
            log::debug!("binding {}: cannot re-arm: {}", self.koid.raw(), status);
            self.teardown(UnbindReason::DispatcherShutdown, None);
        }
    }

    fn on_signals(self: Arc<Self>, result: core::result::Result<Signals, Status>) {
        {
            let mut state = self.state.lock();
            if state.channel.is_none() {
                return;
            }
            state.wait = None;
        }
        match result {
            Err(_) => self.teardown(UnbindReason::DispatcherShutdown, None),
            Ok(signals) if signals.contains(Signals::CHANNEL_READABLE) => self.dispatch_one(),
            Ok(_) => self.teardown(UnbindReason::PeerClosed, None),
        }
    }

    /// Read and dispatch one message
    fn dispatch_one(self: &Arc<Self>) {
        let read = {
            let state = self.state.lock();
            match state.channel.as_ref() {
                Some(channel) => channel.read(),
                None => return,
            }
        };
        let packet = match read {
            Ok(packet) => packet,
            // Another reader got there first.
            Err(Status::ShouldWait) => return self.rearm(),
            Err(Status::PeerClosed) => return self.teardown(UnbindReason::PeerClosed, None),
            Err(status) => {
                return self.teardown(UnbindReason::ProtocolError(Error::Transport(status)), None)
            }
        };
        let message = match IncomingMessage::from_packet(packet) {
            Ok(message) => message,
            Err(error) => {
                log::error!("binding {}: bad message: {}", self.koid.raw(), error);
                return self.teardown(UnbindReason::ProtocolError(error), None);
            }
        };

        let header = *message.header();
        let slot = Arc::new(TxnSlot::new());
        let server = {
            let mut state = self.state.lock();
            if !header.is_one_way() {
                state.in_flight.retain(|slot| !slot.state().is_terminal());
                state.in_flight.push(slot.clone());
            }
            state.server.as_ref().and_then(Ownership::get)
        };
        let txn = Transaction {
            binding: Arc::downgrade(self),
            slot: slot.clone(),
            txid: header.tx_id,
            ordinal: header.ordinal,
            flags: header.flags(),
            version: message.wire_format(),
        };

        let Some(server) = server else {
            // The external server went away.
            txn.drop_without_shutdown();
            return self.teardown(UnbindReason::Unbind, None);
        };

        log::trace!(
            "{}: dispatch ordinal {:#x} txid {}",
            server.name(),
            header.ordinal,
            header.tx_id
        );
        if let Err(error) = server.dispatch(message, txn) {
            log::error!("{}: ordinal {:#x}: {}", server.name(), header.ordinal, error);
            self.teardown(UnbindReason::ProtocolError(error), Some(error.as_status()));
        }
        drop(server);

        if slot.enable_next_dispatch() {
            self.rearm();
        }
    }

    /// Send a message on the bound channel
    fn write(&self, message: OutgoingMessage) -> core::result::Result<(), Status> {
        let state = self.state.lock();
        match state.channel.as_ref() {
            Some(channel) => message.write(channel),
            None => Err(Status::Canceled),
        }
    }

    /// End the binding
    ///
    /// Only the first call does anything.
    fn teardown(self: &Arc<Self>, reason: UnbindReason, epitaph: Option<Status>) {
        let (channel, wait, in_flight, server) = {
            let mut state = self.state.lock();
            let Some(channel) = state.channel.take() else {
                return;
            };
            (
                channel,
                state.wait.take(),
                core::mem::take(&mut state.in_flight),
                state.server.take(),
            )
        };

        if let Some(id) = wait {
            self.dispatcher.cancel_wait(id);
        }
        for slot in in_flight {
            let _ = slot.transition(TxnState::Unbound);
        }
        if let Some(status) = epitaph {
            if let Err(write_status) =
                OutgoingMessage::epitaph(status, WireFormatVersion::default()).write(&channel)
            {
                log::debug!("binding {}: epitaph not sent: {}", self.koid.raw(), write_status);
            }
        }

        if reason.is_error() {
            log::warn!("binding {} unbound: {}", self.koid.raw(), reason);
        } else {
            log::debug!("binding {} unbound: {}", self.koid.raw(), reason);
        }

        let info = UnbindInfo {
            reason,
            channel: match reason {
                UnbindReason::Unbind => Some(channel),
                _ => {
                    drop(channel);
                    None
                }
            },
        };
        if let Some(server) = server.as_ref().and_then(Ownership::get) {
            server.on_unbind(info);
        }
    }
}

/// Bind `channel` to a server
///
/// # Returns
///
/// - `BadState` if the dispatcher is shutting down
/// - `AccessDenied` if the channel handle lacks `WAIT`
pub fn bind_server(
    dispatcher: Arc<dyn Dispatcher>,
    channel: Channel,
    server: Ownership,
) -> core::result::Result<ServerBindingRef, Status> {
    let koid = channel.koid();
    let binding = Arc::new(Binding {
        dispatcher,
        koid,
        state: SpinMutex::new(BindingState {
            channel: Some(channel),
            wait: None,
            in_flight: Vec::new(),
            server: Some(server),
        }),
    });
    binding.arm()?;
    log::debug!("binding {} bound", koid.raw());
    Ok(ServerBindingRef {
        binding: Arc::downgrade(&binding),
    })
}

/// A weak reference to a server binding
#[derive(Clone)]
pub struct ServerBindingRef {
    binding: Weak<Binding>,
}

impl ServerBindingRef {
    /// Whether the binding is still active
    pub fn is_bound(&self) -> bool {
        self.binding
            .upgrade()
            .is_some_and(|binding| binding.state.lock().channel.is_some())
    }

    /// Number of two-way transactions awaiting a reply
    pub fn in_flight(&self) -> usize {
        self.binding.upgrade().map_or(0, |binding| {
            binding
                .state
                .lock()
                .in_flight
                .iter()
                .filter(|slot| !slot.state().is_terminal())
                .count()
        })
    }

    /// Stop serving and hand the channel back through [`Protocol::on_unbind`]
    pub fn unbind(&self) {
        if let Some(binding) = self.binding.upgrade() {
            binding.teardown(UnbindReason::Unbind, None);
        }
    }

    /// Send an epitaph and close the channel
    pub fn close(&self, status: Status) {
        if let Some(binding) = self.binding.upgrade() {
            binding.teardown(UnbindReason::Close(status), Some(status));
        }
    }

    /// Send an event (a message with transaction id 0)
    pub fn send_event<T: Encode>(&self, ordinal: u64, body: &mut T) -> Result<()> {
        let binding = self.binding.upgrade().ok_or(Error::Transport(Status::Canceled))?;
        let header = TransactionHeader::new(0, ordinal, DynamicFlags::empty(), WireFormatVersion::default());
        let message = OutgoingMessage::encode(header, body)?;
        binding.write(message).map_err(Error::Transport)
    }
}

impl fmt::Debug for ServerBindingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBindingRef")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// ============================================================================
/// Transaction
/// ============================================================================

/// Completer for one incoming message
///
/// A two-way transaction must end with [`Transaction::reply`],
/// [`Transaction::close`], [`Transaction::fail`] or
/// [`Transaction::drop_without_shutdown`]. Dropping it while still pending
/// closes the binding with an `Internal` epitaph.
pub struct Transaction {
    binding: Weak<Binding>,
    slot: Arc<TxnSlot>,
    txid: u32,
    ordinal: u64,
    flags: DynamicFlags,
    version: WireFormatVersion,
}

impl Transaction {
    /// Transaction id (0 for one-way messages)
    pub fn txid(&self) -> u32 {
        self.txid
    }

    /// Method ordinal
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Whether the caller expects no reply
    pub fn is_one_way(&self) -> bool {
        self.txid == 0
    }

    /// Dynamic flags of the request
    pub fn flags(&self) -> DynamicFlags {
        self.flags
    }

    /// Wire format of the request, used for the reply
    pub fn wire_format(&self) -> WireFormatVersion {
        self.version
    }

    /// Current state
    pub fn state(&self) -> TxnState {
        self.slot.state()
    }

    /// The binding this transaction arrived on
    pub fn binding(&self) -> ServerBindingRef {
        ServerBindingRef {
            binding: self.binding.clone(),
        }
    }

    /// Let the binding dispatch the next message before this one completes
    pub fn enable_next_dispatch(&self) {
        if self.slot.enable_next_dispatch() {
            if let Some(binding) = self.binding.upgrade() {
                binding.rearm();
            }
        }
    }

    /// Encode and send the reply
    ///
    /// Fails with `Transport(Canceled)` if the binding was torn down
    /// first. An encoding error closes the binding.
    ///
    /// # Panics
    ///
    /// If the transaction is one-way.
    pub fn reply<T: Encode>(self, body: &mut T) -> Result<()> {
        let header = self.reply_header();
        match OutgoingMessage::encode(header, body) {
            Ok(message) => self.send_reply(message),
            Err(error) => {
                self.fail(error);
                Err(error)
            }
        }
    }

    /// Send a reply with a raw body
    pub fn reply_raw(self, body: &[u8], handles: Vec<Handle>) -> Result<()> {
        let message = OutgoingMessage::from_raw(self.reply_header(), body, handles);
        self.send_reply(message)
    }

    /// End the exchange with an epitaph and close the binding
    pub fn close(self, status: Status) -> Result<()> {
        self.slot.transition(TxnState::Closed).map_err(Error::Transport)?;
        let binding = self.binding.upgrade().ok_or(Error::Transport(Status::Canceled))?;
        binding.teardown(UnbindReason::Close(status), Some(status));
        Ok(())
    }

    /// Close the binding because the request was malformed
    pub fn fail(self, error: Error) {
        if self.slot.transition(TxnState::Closed).is_err() {
            return;
        }
        if let Some(binding) = self.binding.upgrade() {
            binding.teardown(UnbindReason::ProtocolError(error), Some(error.as_status()));
        }
    }

    /// Give up on replying without closing the binding
    pub fn drop_without_shutdown(self) {
        let _ = self.slot.transition(TxnState::Closed);
    }

    fn reply_header(&self) -> TransactionHeader {
        assert!(
            !self.is_one_way(),
            "reply on one-way transaction (ordinal {:#x})",
            self.ordinal
        );
        TransactionHeader::new(self.txid, self.ordinal, self.flags, self.version)
    }

    fn send_reply(self, message: OutgoingMessage) -> Result<()> {
        self.slot.transition(TxnState::Replied).map_err(Error::Transport)?;
        let binding = self.binding.upgrade().ok_or(Error::Transport(Status::Canceled))?;
        binding.write(message).map_err(Error::Transport)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.slot.state() != TxnState::Pending {
            return;
        }
        if self.slot.transition(TxnState::Closed).is_err() || self.is_one_way() {
            return;
        }
        log::warn!(
            "transaction {} (ordinal {:#x}) dropped without a reply",
            self.txid,
            self.ordinal
        );
        let Some(binding) = self.binding.upgrade() else {
            return;
        };
        // Torn down from the loop so a handler returning an error is
        // reported first.
        let weak = Arc::downgrade(&binding);
        let teardown = Box::new(move |result: core::result::Result<(), Status>| {
            if result.is_ok() {
                if let Some(binding) = weak.upgrade() {
                    binding.teardown(UnbindReason::Abandoned, Some(Status::Internal));
                }
            }
        });
        if binding.dispatcher.post_task(teardown).is_err() {
            log::debug!("binding {}: dispatcher gone, abandon ignored", binding.koid.raw());
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("txid", &self.txid)
            .field("ordinal", &self.ordinal)
            .field("state", &self.slot.state())
            .finish()
    }
}
