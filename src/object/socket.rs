// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Socket Object
//!
//! A stream socket is a pair of endpoints connected by two bounded byte
//! buffers. Unlike a channel it carries no message boundaries and no
//! handles; framing is layered on top (see [`crate::session::framing`]).
//!
//! # Design
//!
//! - **Bounded**: Each direction buffers at most [`SOCKET_CAPACITY`] bytes
//! - **Short writes**: A write stores as much as fits and reports the count
//! - **Signals**: `SOCKET_READABLE` while bytes are buffered,
//!   `SOCKET_WRITABLE` while the peer has room

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::any::Any;
use crate::object::handle::{
    impl_handle_based, Handle, KernelObject, KernelObjectBase, Koid, ObjectType, Rights,
};
use crate::object::peered::{Side, Sided};
use crate::object::signals::{Notifications, Signals, StateTracker};
use crate::sync::SpinMutex;
use crate::status::{Result, Status};

/// Bytes buffered per direction
pub const SOCKET_CAPACITY: usize = 256 * 1024;

/// Buffer of one endpoint
struct SocketSide {
    /// Bytes waiting to be read by this endpoint
    inbound: VecDeque<u8>,

    /// Whether this endpoint still has handles
    open: bool,
}

/// Shared state of a socket pair
struct SocketPipe {
    state: SpinMutex<Sided<SocketSide>>,
    trackers: Sided<StateTracker>,
}

impl SocketPipe {
    fn write_from(&self, side: Side, data: &[u8]) -> Result<usize> {
        let peer = side.opposite();
        let (written, notify) = {
            let mut sides = self.state.lock();
            let target = &mut sides[peer];
            if !target.open {
                return Err(Status::PeerClosed);
            }
            let room = SOCKET_CAPACITY - target.inbound.len();
            if room == 0 {
                return Err(Status::ShouldWait);
            }
            let count = room.min(data.len());
            target
                .inbound
                .try_reserve(count)
                .map_err(|_| Status::NoMemory)?;
            let was_empty = target.inbound.is_empty();
            target.inbound.extend(&data[..count]);
            let now_full = target.inbound.len() == SOCKET_CAPACITY;

            let mut notify = Notifications::none();
            if was_empty && count > 0 {
                notify.append(self.trackers[peer].update(Signals::empty(), Signals::SOCKET_READABLE));
            }
            if now_full {
                notify.append(self.trackers[side].update(Signals::SOCKET_WRITABLE, Signals::empty()));
            }
            (count, notify)
        };
        notify.deliver();
        Ok(written)
    }

    fn read_into(&self, side: Side, buf: &mut [u8]) -> Result<usize> {
        let peer = side.opposite();
        let (read, notify) = {
            let mut sides = self.state.lock();
            let peer_open = sides[peer].open;
            let source = &mut sides[side];
            if source.inbound.is_empty() {
                return Err(if peer_open {
                    Status::ShouldWait
                } else {
                    Status::PeerClosed
                });
            }
            let was_full = source.inbound.len() == SOCKET_CAPACITY;
            let count = buf.len().min(source.inbound.len());
            for (slot, byte) in buf.iter_mut().zip(source.inbound.drain(..count)) {
                *slot = byte;
            }

            let mut notify = Notifications::none();
            if source.inbound.is_empty() {
                notify.append(self.trackers[side].update(Signals::SOCKET_READABLE, Signals::empty()));
            }
            if was_full && count > 0 && peer_open {
                notify.append(self.trackers[peer].update(Signals::empty(), Signals::SOCKET_WRITABLE));
            }
            (count, notify)
        };
        notify.deliver();
        Ok(read)
    }

    fn close_side(&self, side: Side) {
        let peer = side.opposite();
        let notify = {
            let mut sides = self.state.lock();
            let (mine, theirs) = sides.split_mut(side);
            mine.open = false;
            mine.inbound = VecDeque::new();
            if theirs.open {
                self.trackers[peer].update(Signals::SOCKET_WRITABLE, Signals::SOCKET_PEER_CLOSED)
            } else {
                Notifications::none()
            }
        };
        notify.deliver();
    }
}

/// Kernel object for one end of a socket
pub struct SocketEndpoint {
    base: KernelObjectBase,
    side: Side,
    peer_koid: Koid,
    pipe: Arc<SocketPipe>,
}

impl KernelObject for SocketEndpoint {
    fn base(&self) -> &KernelObjectBase {
        &self.base
    }

    fn state_tracker(&self) -> &StateTracker {
        &self.pipe.trackers[self.side]
    }

    fn related_koid(&self) -> Koid {
        self.peer_koid
    }

    fn on_zero_handles(&self) -> alloc::vec::Vec<Handle> {
        self.pipe.close_side(self.side);
        alloc::vec::Vec::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle to a stream socket endpoint
#[derive(Debug)]
pub struct Socket(Handle);

impl_handle_based!(Socket);

impl Socket {
    /// Create a connected pair of stream sockets
    pub fn create() -> Result<(Socket, Socket)> {
        let (left_koid, right_koid) = Koid::alloc_pair();
        let pipe = Arc::new(SocketPipe {
            state: SpinMutex::new(Sided::new(
                SocketSide {
                    inbound: VecDeque::new(),
                    open: true,
                },
                SocketSide {
                    inbound: VecDeque::new(),
                    open: true,
                },
            )),
            trackers: Sided::new(
                StateTracker::new(Signals::SOCKET_WRITABLE),
                StateTracker::new(Signals::SOCKET_WRITABLE),
            ),
        });

        let left: Arc<dyn KernelObject> = Arc::new(SocketEndpoint {
            base: KernelObjectBase::with_koid(left_koid, ObjectType::Socket),
            side: Side::Left,
            peer_koid: right_koid,
            pipe: pipe.clone(),
        });
        let right: Arc<dyn KernelObject> = Arc::new(SocketEndpoint {
            base: KernelObjectBase::with_koid(right_koid, ObjectType::Socket),
            side: Side::Right,
            peer_koid: left_koid,
            pipe,
        });

        Ok((
            Socket(Handle::new(left, Rights::SOCKET_DEFAULT)),
            Socket(Handle::new(right, Rights::SOCKET_DEFAULT)),
        ))
    }

    fn endpoint(&self) -> Result<&SocketEndpoint> {
        self.0.object_as::<SocketEndpoint>()
    }

    /// Write as many bytes as fit
    ///
    /// # Returns
    ///
    /// The number of bytes written, `ShouldWait` if the peer's buffer is
    /// full, or `PeerClosed`.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.0.require(Rights::WRITE)?;
        let endpoint = self.endpoint()?;
        endpoint.pipe.write_from(endpoint.side, data)
    }

    /// Read up to `buf.len()` bytes
    ///
    /// # Returns
    ///
    /// The number of bytes read, `ShouldWait` if nothing is buffered, or
    /// `PeerClosed` once the peer is gone and the buffer is drained.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.0.require(Rights::READ)?;
        let endpoint = self.endpoint()?;
        endpoint.pipe.read_into(endpoint.side, buf)
    }

    /// Bytes waiting to be read on this endpoint
    pub fn outstanding(&self) -> Result<usize> {
        let endpoint = self.endpoint()?;
        Ok(endpoint.pipe.state.lock()[endpoint.side].inbound.len())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::handle::HandleBased;
    use alloc::vec;

    #[test]
    fn test_socket_stream() {
        let (a, b) = Socket::create().unwrap();
        assert_eq!(a.write(b"hello ").unwrap(), 6);
        assert_eq!(a.write(b"world").unwrap(), 5);
        assert_eq!(b.outstanding().unwrap(), 11);

        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"hello wo");
        assert_eq!(b.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"rld");
        assert_eq!(b.read(&mut buf).unwrap_err(), Status::ShouldWait);
    }

    #[test]
    fn test_socket_signals() {
        let (a, b) = Socket::create().unwrap();
        assert_eq!(b.as_handle().signals().unwrap(), Signals::SOCKET_WRITABLE);

        a.write(b"x").unwrap();
        assert!(b.as_handle().signals().unwrap().contains(Signals::SOCKET_READABLE));

        let mut buf = [0u8; 1];
        b.read(&mut buf).unwrap();
        assert!(!b.as_handle().signals().unwrap().contains(Signals::SOCKET_READABLE));
    }

    #[test]
    fn test_socket_capacity() {
        let (a, b) = Socket::create().unwrap();
        let chunk = vec![7u8; SOCKET_CAPACITY + 10];
        assert_eq!(a.write(&chunk).unwrap(), SOCKET_CAPACITY);
        assert!(!a.as_handle().signals().unwrap().contains(Signals::SOCKET_WRITABLE));
        assert_eq!(a.write(b"more").unwrap_err(), Status::ShouldWait);

        let mut buf = [0u8; 16];
        b.read(&mut buf).unwrap();
        assert!(a.as_handle().signals().unwrap().contains(Signals::SOCKET_WRITABLE));
        assert_eq!(a.write(b"more").unwrap(), 4);
    }

    #[test]
    fn test_socket_peer_closed() {
        let (a, b) = Socket::create().unwrap();
        a.write(b"bye").unwrap();
        drop(a);

        assert!(b.as_handle().signals().unwrap().contains(Signals::SOCKET_PEER_CLOSED));
        assert_eq!(b.write(b"x").unwrap_err(), Status::PeerClosed);

        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).unwrap(), 3);
        assert_eq!(b.read(&mut buf).unwrap_err(), Status::PeerClosed);
    }
}
