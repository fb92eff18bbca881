// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Channel Object
//!
//! Channels are bidirectional IPC endpoints used for message passing
//! between processes. Each channel has two endpoints, and messages
//! written to one endpoint can be read from the other.
//!
//! # Design
//!
//! - **Message pipe**: Both endpoints share one [`MessagePipe`]; one lock
//!   protects both inbound queues
//! - **Atomic transfer**: A packet and every handle in it are enqueued
//!   together, or the write fails and the handles are released
//! - **Two-phase read**: [`Channel::begin_read`] peeks and returns a
//!   [`ReadTicket`]; [`Channel::accept_read`] consumes the packet the
//!   ticket names, so two racing readers can never both get it
//! - **Peer closed**: Closing the last handle to an endpoint releases its
//!   queued packets through the reaper and raises
//!   [`Signals::CHANNEL_PEER_CLOSED`] on the other endpoint
//!
//! # Usage
//!
//! ```ignore
//! let (a, b) = Channel::create()?;
//! a.write(b"hello", Vec::new())?;
//! let ticket = b.begin_read()?;
//! let packet = b.accept_read(ticket)?;
//! ```

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicU32, Ordering};
use crate::object::handle::{
    impl_handle_based, Handle, KernelObject, KernelObjectBase, Koid, ObjectType, Rights,
};
use crate::object::message_packet::{MessagePacket, MAX_MESSAGE_BYTES, MAX_MESSAGE_HANDLES, TXID_SIZE};
use crate::object::peered::{Side, Sided};
use crate::object::signals::{Notifications, Signals, StateTracker};
use crate::sync::{Completion, SpinMutex};
use crate::status::{Result, Status};

/// Bit set in every transaction id allocated by [`Channel::call`]
pub const KERNEL_TXID_BIT: u32 = 0x8000_0000;

/// ============================================================================
/// Read Ticket
/// ============================================================================

/// Identifies the packet observed by [`Channel::begin_read`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTicket {
    /// Pipe sequence number of the observed packet
    seq: u64,

    /// Payload size in bytes
    pub message_size: usize,

    /// Number of handles in the packet
    pub handle_count: usize,
}

/// ============================================================================
/// Message Pipe
/// ============================================================================

/// A caller blocked in [`Channel::call`]
struct CallWaiter {
    txid: u32,
    completion: Arc<Completion<Result<MessagePacket>>>,
}

/// State of one endpoint, guarded by the pipe lock
struct SideState {
    /// Packets waiting to be read by this endpoint
    inbound: VecDeque<MessagePacket>,

    /// Whether this endpoint still has handles
    open: bool,

    /// Callers on this endpoint waiting for a reply
    call_waiters: Vec<CallWaiter>,
}

impl SideState {
    const fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            open: true,
            call_waiters: Vec::new(),
        }
    }
}

/// Pipe state, reachable only with the pipe lock held
struct PipeState {
    sides: Sided<SideState>,
    next_seq: u64,
}

/// Where a written packet went
enum Delivery {
    /// Queued on the peer; notifications to deliver
    Queued(Notifications),

    /// Handed straight to a caller blocked in `call`
    Reply(Arc<Completion<Result<MessagePacket>>>, MessagePacket),
}

/// Shared state of a channel pair
pub struct MessagePipe {
    state: SpinMutex<PipeState>,
    trackers: Sided<StateTracker>,
    next_call_txid: AtomicU32,
}

impl MessagePipe {
    fn new() -> Self {
        Self {
            state: SpinMutex::new(PipeState {
                sides: Sided::new(SideState::new(), SideState::new()),
                next_seq: 1,
            }),
            trackers: Sided::new(
                StateTracker::new(Signals::CHANNEL_WRITABLE),
                StateTracker::new(Signals::CHANNEL_WRITABLE),
            ),
            next_call_txid: AtomicU32::new(1),
        }
    }

    /// Allocate a kernel transaction id (high bit set, never zero)
    fn alloc_call_txid(&self) -> u32 {
        let n = self.next_call_txid.fetch_add(1, Ordering::Relaxed);
        KERNEL_TXID_BIT | (n & !KERNEL_TXID_BIT)
    }

    /// Write a packet from `side` to its peer
    ///
    /// If `waiter` is given it is registered on `side` under the same lock,
    /// so the reply cannot slip past it.
    fn write_from(
        &self,
        side: Side,
        mut packet: MessagePacket,
        waiter: Option<CallWaiter>,
    ) -> Result<()> {
        let outcome = {
            let mut state = self.state.lock();
            let peer = side.opposite();
            if !state.sides[peer].open {
                Err((Status::PeerClosed, packet))
            } else if state.sides[peer].inbound.try_reserve(1).is_err() {
                Err((Status::NoMemory, packet))
            } else {
                if let Some(waiter) = waiter {
                    state.sides[side].call_waiters.push(waiter);
                }
                let seq = state.next_seq;
                state.next_seq += 1;
                packet.set_seq(seq);

                let txid = packet.txid();
                let target = &mut state.sides[peer];
                let matched = if txid & KERNEL_TXID_BIT != 0 {
                    target.call_waiters.iter().position(|w| w.txid == txid)
                } else {
                    None
                };
                match matched {
                    Some(index) => {
                        let waiter = target.call_waiters.swap_remove(index);
                        Ok(Delivery::Reply(waiter.completion, packet))
                    }
                    None => {
                        let was_empty = target.inbound.is_empty();
                        target.inbound.push_back(packet);
                        let notify = if was_empty {
                            self.trackers[peer].update(Signals::empty(), Signals::CHANNEL_READABLE)
                        } else {
                            Notifications::none()
                        };
                        Ok(Delivery::Queued(notify))
                    }
                }
            }
        };

        match outcome {
            Ok(Delivery::Queued(notify)) => {
                notify.deliver();
                Ok(())
            }
            Ok(Delivery::Reply(completion, packet)) => {
                completion.complete(Ok(packet));
                Ok(())
            }
            // The rejected packet and its handles are released here, with
            // the pipe lock dropped.
            Err((status, packet)) => {
                drop(packet);
                Err(status)
            }
        }
    }

    /// Observe the packet at the head of `side`'s queue
    fn begin_read(&self, side: Side) -> Result<ReadTicket> {
        let state = self.state.lock();
        match state.sides[side].inbound.front() {
            Some(packet) => Ok(ReadTicket {
                seq: packet.seq(),
                message_size: packet.data_size(),
                handle_count: packet.handle_count(),
            }),
            None if !state.sides[side.opposite()].open => Err(Status::PeerClosed),
            None => Err(Status::ShouldWait),
        }
    }

    /// Consume the packet named by `ticket`
    fn accept_read(&self, side: Side, ticket: ReadTicket) -> Result<MessagePacket> {
        let (packet, notify) = {
            let mut state = self.state.lock();
            let inbound = &mut state.sides[side].inbound;
            match inbound.front() {
                Some(front) if front.seq() == ticket.seq => {}
                _ => return Err(Status::BadState),
            }
            let packet = inbound.pop_front().ok_or(Status::BadState)?;
            let notify = if inbound.is_empty() {
                self.trackers[side].update(Signals::CHANNEL_READABLE, Signals::empty())
            } else {
                Notifications::none()
            };
            (packet, notify)
        };
        notify.deliver();
        Ok(packet)
    }

    /// Tear down `side` after its last handle closed
    ///
    /// Returns the handles that were queued for it.
    fn close_side(&self, side: Side) -> Vec<Handle> {
        let peer = side.opposite();
        let (orphans, own_waiters, peer_waiters, notify) = {
            let mut state = self.state.lock();
            let (mine, theirs) = state.sides.split_mut(side);
            mine.open = false;
            let mut orphans = Vec::new();
            for mut packet in mine.inbound.drain(..) {
                orphans.append(&mut packet.take_handles());
            }
            let own_waiters = core::mem::take(&mut mine.call_waiters);
            let peer_waiters = core::mem::take(&mut theirs.call_waiters);
            let notify = if theirs.open {
                self.trackers[peer].update(Signals::CHANNEL_WRITABLE, Signals::CHANNEL_PEER_CLOSED)
            } else {
                Notifications::none()
            };
            (orphans, own_waiters, peer_waiters, notify)
        };

        notify.deliver();
        for waiter in own_waiters {
            waiter.completion.complete(Err(Status::Canceled));
        }
        for waiter in peer_waiters {
            waiter.completion.complete(Err(Status::PeerClosed));
        }
        orphans
    }

    /// Number of packets queued for `side`
    fn queued(&self, side: Side) -> usize {
        self.state.lock().sides[side].inbound.len()
    }
}

/// ============================================================================
/// Channel Endpoint
/// ============================================================================

/// Kernel object for one end of a channel
pub struct ChannelEndpoint {
    base: KernelObjectBase,
    side: Side,
    peer_koid: Koid,
    pipe: Arc<MessagePipe>,
}

impl KernelObject for ChannelEndpoint {
    fn base(&self) -> &KernelObjectBase {
        &self.base
    }

    fn state_tracker(&self) -> &StateTracker {
        &self.pipe.trackers[self.side]
    }

    fn related_koid(&self) -> Koid {
        self.peer_koid
    }

    fn on_zero_handles(&self) -> Vec<Handle> {
        let orphans = self.pipe.close_side(self.side);
        log::trace!(
            "channel endpoint {} closed, releasing {} queued handles",
            self.base.koid().raw(),
            orphans.len()
        );
        orphans
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A handle disposition for [`Channel::write_etc`]
#[derive(Debug)]
pub struct HandleDisposition {
    /// Handle to move
    pub handle: Handle,

    /// Expected object type ([`ObjectType::None`] accepts any)
    pub object_type: ObjectType,

    /// Rights to send ([`Rights::SAME_RIGHTS`] keeps them)
    pub rights: Rights,
}

impl HandleDisposition {
    /// Move a handle with its current rights
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            object_type: ObjectType::None,
            rights: Rights::SAME_RIGHTS,
        }
    }

    /// Check the type and reduce rights
    fn resolve(self) -> Result<Handle> {
        if self.object_type != ObjectType::None && self.handle.object_type() != self.object_type {
            return Err(Status::WrongType);
        }
        self.handle.replace(self.rights)
    }
}

/// ============================================================================
/// Channel Handle
/// ============================================================================

/// Handle to a channel endpoint
#[derive(Debug)]
pub struct Channel(Handle);

impl_handle_based!(Channel);

impl Channel {
    /// Create a connected pair of endpoints
    ///
    /// Both endpoints start with [`Rights::CHANNEL_DEFAULT`] and
    /// [`Signals::CHANNEL_WRITABLE`].
    pub fn create() -> Result<(Channel, Channel)> {
        let (left_koid, right_koid) = Koid::alloc_pair();
        let pipe = Arc::new(MessagePipe::new());

        let left: Arc<dyn KernelObject> = Arc::new(ChannelEndpoint {
            base: KernelObjectBase::with_koid(left_koid, ObjectType::Channel),
            side: Side::Left,
            peer_koid: right_koid,
            pipe: pipe.clone(),
        });
        let right: Arc<dyn KernelObject> = Arc::new(ChannelEndpoint {
            base: KernelObjectBase::with_koid(right_koid, ObjectType::Channel),
            side: Side::Right,
            peer_koid: left_koid,
            pipe,
        });

        log::trace!("channel pair created: {} <-> {}", left_koid.raw(), right_koid.raw());
        Ok((
            Channel(Handle::new(left, Rights::CHANNEL_DEFAULT)),
            Channel(Handle::new(right, Rights::CHANNEL_DEFAULT)),
        ))
    }

    fn endpoint(&self) -> Result<&ChannelEndpoint> {
        self.0.object_as::<ChannelEndpoint>()
    }

    /// Build a packet after validating every handle against this endpoint
    fn prepare(&self, data: &[u8], handles: Vec<Handle>) -> Result<(&ChannelEndpoint, MessagePacket)> {
        let endpoint = self.endpoint()?;
        self.0.require(Rights::WRITE)?;
        if data.len() > MAX_MESSAGE_BYTES || handles.len() > MAX_MESSAGE_HANDLES {
            return Err(Status::OutOfRange);
        }
        let own_koid = endpoint.base.koid();
        for handle in &handles {
            if handle.is_invalid() {
                return Err(Status::BadHandle);
            }
            if handle.koid() == own_koid {
                return Err(Status::NotSupported);
            }
            if !handle.rights().contains(Rights::TRANSFER) {
                return Err(Status::AccessDenied);
            }
        }
        let packet = MessagePacket::create(data, handles)?;
        Ok((endpoint, packet))
    }

    /// Write a message to the peer
    ///
    /// The handles are consumed whether or not the write succeeds: on
    /// success they travel with the packet, on failure they are closed.
    ///
    /// # Returns
    ///
    /// - `PeerClosed` if the peer endpoint is gone
    /// - `OutOfRange` if the payload or handle count is over the limit
    /// - `AccessDenied` if this handle lacks `WRITE` or a transferred handle
    ///   lacks `TRANSFER`
    /// - `NotSupported` if the endpoint's own handle is in `handles`
    pub fn write(&self, data: &[u8], handles: Vec<Handle>) -> Result<()> {
        let (endpoint, packet) = self.prepare(data, handles)?;
        endpoint.pipe.write_from(endpoint.side, packet, None)
    }

    /// Write with per-handle type checks and rights reduction
    pub fn write_etc(&self, data: &[u8], dispositions: Vec<HandleDisposition>) -> Result<()> {
        let handles = dispositions
            .into_iter()
            .map(HandleDisposition::resolve)
            .collect::<Result<Vec<Handle>>>()?;
        self.write(data, handles)
    }

    /// Observe the next message without consuming it
    ///
    /// # Returns
    ///
    /// - `ShouldWait` if nothing is queued
    /// - `PeerClosed` if nothing is queued and nothing ever will be
    pub fn begin_read(&self) -> Result<ReadTicket> {
        self.0.require(Rights::READ)?;
        let endpoint = self.endpoint()?;
        endpoint.pipe.begin_read(endpoint.side)
    }

    /// Consume the message observed by [`Channel::begin_read`]
    ///
    /// Fails with `BadState` if that message was already consumed.
    pub fn accept_read(&self, ticket: ReadTicket) -> Result<MessagePacket> {
        self.0.require(Rights::READ)?;
        let endpoint = self.endpoint()?;
        endpoint.pipe.accept_read(endpoint.side, ticket)
    }

    /// Read the next message
    pub fn read(&self) -> Result<MessagePacket> {
        loop {
            let ticket = self.begin_read()?;
            match self.accept_read(ticket) {
                // Another reader took it between the two phases.
                Err(Status::BadState) => continue,
                other => return other,
            }
        }
    }

    /// Read the next message if it fits the caller's buffers
    ///
    /// Leaves the message queued and fails with `BufferTooSmall` otherwise.
    pub fn read_limited(&self, max_bytes: usize, max_handles: usize) -> Result<MessagePacket> {
        loop {
            let ticket = self.begin_read()?;
            if ticket.message_size > max_bytes || ticket.handle_count > max_handles {
                return Err(Status::BufferTooSmall);
            }
            match self.accept_read(ticket) {
                Err(Status::BadState) => continue,
                other => return other,
            }
        }
    }

    /// Write a request and block until its reply arrives
    ///
    /// The first four bytes of `data` are overwritten with a kernel
    /// transaction id. The reply is matched by that id and never appears
    /// in this endpoint's inbound queue.
    pub fn call(&self, data: &[u8], handles: Vec<Handle>) -> Result<MessagePacket> {
        self.0.require(Rights::READ)?;
        if data.len() < TXID_SIZE {
            return Err(Status::InvalidArgs);
        }
        let (endpoint, mut packet) = self.prepare(data, handles)?;
        let txid = endpoint.pipe.alloc_call_txid();
        packet.set_txid(txid)?;

        let completion = Arc::new(Completion::new());
        let waiter = CallWaiter {
            txid,
            completion: completion.clone(),
        };
        endpoint.pipe.write_from(endpoint.side, packet, Some(waiter))?;
        completion.wait()
    }

    /// Assert user signals on the peer endpoint
    pub fn signal_peer(&self, clear: Signals, set: Signals) -> Result<()> {
        self.0.require(Rights::SIGNAL_PEER)?;
        if !Signals::USER_ALL.contains(clear | set) {
            return Err(Status::InvalidArgs);
        }
        let endpoint = self.endpoint()?;
        let peer = endpoint.side.opposite();
        let notify = {
            let state = endpoint.pipe.state.lock();
            if !state.sides[peer].open {
                return Err(Status::PeerClosed);
            }
            endpoint.pipe.trackers[peer].update(clear, set)
        };
        notify.deliver();
        Ok(())
    }

    /// Number of messages waiting to be read on this endpoint
    pub fn outstanding(&self) -> Result<usize> {
        let endpoint = self.endpoint()?;
        Ok(endpoint.pipe.queued(endpoint.side))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::event::Event;
    use crate::object::handle::HandleBased;
    use alloc::vec;

    fn handle_count(handle: &Handle) -> usize {
        handle.object().unwrap().base().handle_count()
    }

    #[test]
    fn test_channel_create() {
        let (a, b) = Channel::create().unwrap();
        let a_info = a.basic_info().unwrap();
        let b_info = b.basic_info().unwrap();

        assert_eq!(a_info.object_type, ObjectType::Channel);
        assert_eq!(a_info.related_koid, b_info.koid);
        assert_eq!(b_info.related_koid, a_info.koid);
        assert_eq!(a_info.rights, Rights::CHANNEL_DEFAULT);
        assert_eq!(a.as_handle().signals().unwrap(), Signals::CHANNEL_WRITABLE);
    }

    #[test]
    fn test_channel_write_read() {
        let (a, b) = Channel::create().unwrap();
        a.write(b"hello", Vec::new()).unwrap();

        assert!(b.as_handle().signals().unwrap().contains(Signals::CHANNEL_READABLE));
        let packet = b.read().unwrap();
        assert_eq!(packet.data(), b"hello");
        assert!(!b.as_handle().signals().unwrap().contains(Signals::CHANNEL_READABLE));
        assert_eq!(b.read().unwrap_err(), Status::ShouldWait);
    }

    #[test]
    fn test_channel_fifo() {
        let (a, b) = Channel::create().unwrap();
        for i in 0u8..5 {
            a.write(&[i], Vec::new()).unwrap();
        }
        assert_eq!(b.outstanding().unwrap(), 5);
        for i in 0u8..5 {
            assert_eq!(b.read().unwrap().data(), &[i]);
        }
    }

    #[test]
    fn test_channel_bidirectional() {
        let (a, b) = Channel::create().unwrap();
        a.write(b"ping", Vec::new()).unwrap();
        b.write(b"pong", Vec::new()).unwrap();
        assert_eq!(a.read().unwrap().data(), b"pong");
        assert_eq!(b.read().unwrap().data(), b"ping");
    }

    #[test]
    fn test_channel_peer_closed() {
        let (a, b) = Channel::create().unwrap();
        a.write(b"last", Vec::new()).unwrap();
        drop(a);

        let signals = b.as_handle().signals().unwrap();
        assert!(signals.contains(Signals::CHANNEL_PEER_CLOSED));
        assert!(!signals.contains(Signals::CHANNEL_WRITABLE));

        assert_eq!(b.write(b"x", Vec::new()), Err(Status::PeerClosed));
        // Queued messages remain readable after the peer is gone.
        assert_eq!(b.read().unwrap().data(), b"last");
        assert_eq!(b.read().unwrap_err(), Status::PeerClosed);
    }

    #[test]
    fn test_channel_double_accept() {
        let (a, b) = Channel::create().unwrap();
        a.write(b"one", Vec::new()).unwrap();
        a.write(b"two", Vec::new()).unwrap();

        let ticket = b.begin_read().unwrap();
        assert_eq!(ticket.message_size, 3);
        assert_eq!(ticket.handle_count, 0);

        let first_reader = ticket;
        let second_reader = b.begin_read().unwrap();
        assert_eq!(first_reader, second_reader);

        assert_eq!(b.accept_read(first_reader).unwrap().data(), b"one");
        assert_eq!(b.accept_read(second_reader).unwrap_err(), Status::BadState);
        assert_eq!(b.read().unwrap().data(), b"two");
    }

    #[test]
    fn test_channel_transfers_handles() {
        let (a, b) = Channel::create().unwrap();
        let event = Event::create().unwrap();
        let koid = event.koid();

        a.write(b"token", vec![event.into_handle()]).unwrap();
        let (data, mut handles) = b.read().unwrap().into_parts();
        assert_eq!(data, b"token");
        assert_eq!(handles.len(), 1);
        let received = handles.remove(0);
        assert_eq!(received.koid(), koid);
        assert_eq!(handle_count(&received), 1);
    }

    #[test]
    fn test_channel_write_consumes_handles_on_failure() {
        let (a, b) = Channel::create().unwrap();
        let event = Event::create().unwrap();
        let keep = event.as_handle().duplicate(Rights::SAME_RIGHTS).unwrap();
        assert_eq!(handle_count(&keep), 2);

        drop(b);
        assert_eq!(
            a.write(b"lost", vec![event.into_handle()]),
            Err(Status::PeerClosed)
        );
        assert_eq!(handle_count(&keep), 1);
    }

    #[test]
    fn test_channel_write_validation() {
        let (a, _b) = Channel::create().unwrap();

        let too_big = vec![0u8; MAX_MESSAGE_BYTES + 1];
        assert_eq!(a.write(&too_big, Vec::new()), Err(Status::OutOfRange));

        assert_eq!(
            a.write(b"", vec![Handle::invalid()]),
            Err(Status::BadHandle)
        );

        let event = Event::create().unwrap();
        let no_transfer = event.into_handle().replace(Rights::WAIT).unwrap();
        assert_eq!(a.write(b"", vec![no_transfer]), Err(Status::AccessDenied));

        let read_only = a.into_handle().replace(Rights::READ | Rights::TRANSFER).unwrap();
        let read_only = Channel::from_handle(read_only);
        assert_eq!(read_only.write(b"", Vec::new()), Err(Status::AccessDenied));
    }

    #[test]
    fn test_channel_write_self_not_supported() {
        let (a, _b) = Channel::create().unwrap();
        // Channel handles lack DUPLICATE, so mint a second one directly.
        let object = a.as_handle().object().unwrap().clone();
        let self_handle = Handle::new(object, Rights::CHANNEL_DEFAULT);
        assert_eq!(self_handle.koid(), a.koid());
        assert_eq!(a.write(b"", vec![self_handle]), Err(Status::NotSupported));
    }

    #[test]
    fn test_channel_close_releases_queued_handles() {
        let (a, b) = Channel::create().unwrap();
        let event = Event::create().unwrap();
        let keep = event.as_handle().duplicate(Rights::SAME_RIGHTS).unwrap();

        a.write(b"", vec![event.into_handle()]).unwrap();
        assert_eq!(handle_count(&keep), 2);

        drop(b);
        assert_eq!(handle_count(&keep), 1);
    }

    #[test]
    fn test_channel_nested_teardown() {
        // A chain of channels, each carried inside the previous one.
        const DEPTH: usize = 10_000;

        let (head, mut carrier) = Channel::create().unwrap();
        for _ in 0..DEPTH {
            let (next_a, next_b) = Channel::create().unwrap();
            next_a.write(b"", vec![carrier.into_handle()]).unwrap();
            carrier = next_b;
            drop(next_a);
        }
        drop(carrier);
        // The innermost peer closed once the chain was released.
        assert!(head
            .as_handle()
            .signals()
            .unwrap()
            .contains(Signals::CHANNEL_PEER_CLOSED));
    }

    #[test]
    fn test_channel_write_etc() {
        let (a, b) = Channel::create().unwrap();
        let event = Event::create().unwrap();
        let wrong = HandleDisposition {
            handle: event.into_handle(),
            object_type: ObjectType::Channel,
            rights: Rights::SAME_RIGHTS,
        };
        assert_eq!(a.write_etc(b"", vec![wrong]), Err(Status::WrongType));

        let event = Event::create().unwrap();
        let reduced = HandleDisposition {
            handle: event.into_handle(),
            object_type: ObjectType::Event,
            rights: Rights::TRANSFER | Rights::WAIT,
        };
        a.write_etc(b"", vec![reduced]).unwrap();
        let (_, handles) = b.read().unwrap().into_parts();
        assert_eq!(handles[0].rights(), Rights::TRANSFER | Rights::WAIT);
    }

    #[test]
    fn test_channel_read_limited() {
        let (a, b) = Channel::create().unwrap();
        a.write(b"0123456789", Vec::new()).unwrap();
        assert_eq!(b.read_limited(4, 0).unwrap_err(), Status::BufferTooSmall);
        assert_eq!(b.read_limited(10, 0).unwrap().data_size(), 10);
    }

    #[test]
    fn test_channel_call() {
        let (a, b) = Channel::create().unwrap();
        let server = std::thread::spawn(move || loop {
            match b.read() {
                Ok(packet) => {
                    let txid = packet.txid();
                    assert_ne!(txid & KERNEL_TXID_BIT, 0);
                    let mut reply = txid.to_le_bytes().to_vec();
                    reply.extend_from_slice(b"ok");
                    b.write(&reply, Vec::new()).unwrap();
                    return;
                }
                Err(Status::ShouldWait) => std::thread::yield_now(),
                Err(status) => panic!("unexpected {status:?}"),
            }
        });

        let reply = a.call(&[0, 0, 0, 0, 1], Vec::new()).unwrap();
        assert_eq!(&reply.data()[4..], b"ok");
        assert_eq!(a.outstanding().unwrap(), 0);
        server.join().unwrap();
    }

    #[test]
    fn test_channel_call_peer_closed() {
        let (a, b) = Channel::create().unwrap();
        let closer = std::thread::spawn(move || {
            while b.outstanding().unwrap() == 0 {
                std::thread::yield_now();
            }
            drop(b);
        });
        assert_eq!(a.call(&[0; 8], Vec::new()).unwrap_err(), Status::PeerClosed);
        closer.join().unwrap();
    }

    #[test]
    fn test_channel_signal_peer() {
        let (a, b) = Channel::create().unwrap();
        a.signal_peer(Signals::empty(), Signals::USER_3).unwrap();
        assert!(b.as_handle().signals().unwrap().contains(Signals::USER_3));
        assert_eq!(
            a.signal_peer(Signals::empty(), Signals::CHANNEL_READABLE),
            Err(Status::InvalidArgs)
        );
        drop(b);
        assert_eq!(
            a.signal_peer(Signals::empty(), Signals::USER_3),
            Err(Status::PeerClosed)
        );
    }
}
