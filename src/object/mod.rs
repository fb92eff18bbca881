// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Objects & IPC (Zircon-style)
//!
//! This module implements the capability-based kernel object model
//! inspired by Zircon. All kernel resources are accessed through
//! handles with rights, ensuring fine-grained access control.
//!
//! # Design
//!
//! - **Capability-based security**: All operations through handles with rights
//! - **Object types**: Channel, Event, Socket
//! - **Handle passing**: Channels transfer handles with optional rights reduction
//! - **Handle counting**: Teardown runs when the last handle is closed,
//!   iteratively through the reaper
//!
//! # Modules
//!
//! - [`handle`] - Handle and rights model
//! - [`handle_table`] - Raw handle values per process
//! - [`signals`] - Signal bits and observers
//! - [`reaper`] - Iterative release of orphaned handles
//! - [`message_packet`] - Unit of channel transfer
//! - [`channel`] - IPC channels
//! - [`event`] - Event objects
//! - [`socket`] - Stream sockets

pub mod handle;
pub mod handle_table;
pub mod signals;
pub(crate) mod reaper;
pub mod peered;
pub mod message_packet;
pub mod channel;
pub mod event;
pub mod socket;

// Re-exports
pub use handle::{
    Handle, HandleBased, HandleBasicInfo, KernelObject, KernelObjectBase, Koid, ObjectType,
    Rights,
};
pub use handle_table::{HandleTable, HANDLE_INVALID, MAX_HANDLES};
pub use signals::{Notifications, SignalObserver, Signals, StateTracker};
pub use message_packet::{MessagePacket, MAX_MESSAGE_BYTES, MAX_MESSAGE_HANDLES};
pub use channel::{Channel, HandleDisposition, ReadTicket};
pub use event::Event;
pub use socket::{Socket, SOCKET_CAPACITY};
