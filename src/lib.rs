// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! # Rustux IPC - Capability-based Message Passing
//!
//! The message passing core of Rustux. It provides:
//!
//! - **Channels**: Bidirectional, datagram-style pipes carrying bytes and handles
//! - **Handles**: Rights-checked references to kernel objects, moved by transfer
//! - **Wire format**: Transactional headers, wire-format metadata, typed encoding
//! - **Bindings**: Servers and clients driven by an event loop
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── object/            # Handles, signals, channels, events, sockets
//! ├── fidl/              # Headers, metadata, encoding, messages
//! ├── txn.rs             # Transaction state machine
//! ├── traits.rs          # Dispatcher trait
//! ├── dispatch/          # Event loop
//! ├── binding/           # Server and client bindings
//! ├── session/           # Framed request/reply over sockets
//! ├── sync/              # Spin locks and completions
//! └── lib.rs             # This file
//! ```
//!
//! ## Locking
//!
//! Locks are always taken in this order and never the other way round:
//!
//! - handle table, then channel pipe, then signal tracker
//! - binding or client state, then channel pipe or loop queues
//!
//! Callbacks (wait handlers, reply handlers, unbind hooks) run with no
//! lock held.
//!
//! ## Using a Server Binding
//!
//! ```ignore
//! use rustux_ipc::binding::{bind_server, Ownership};
//! use rustux_ipc::dispatch::{Loop, LoopConfig};
//! use rustux_ipc::object::Channel;
//!
//! let event_loop = Loop::new(LoopConfig::named("server"));
//! let (client_end, server_end) = Channel::create()?;
//! let binding = bind_server(event_loop.dispatcher(), server_end, Ownership::owned(Echo))?;
//! event_loop.run_until_idle()?;
//! ```

#![cfg_attr(not(test), no_std)]

// Alloc crate for heap allocations
extern crate alloc;

// Status codes
pub mod status;

// Core traits and types
pub mod traits;

// Locks and completions
pub mod sync;

// Kernel objects: handles, channels, events, sockets
pub mod object;

// Wire format
pub mod fidl;

// Transaction state machine
pub mod txn;

// Event loop
pub mod dispatch;

// Server and client bindings
pub mod binding;

// Framed sessions over sockets
pub mod session;

// Cross-module scenarios
#[cfg(test)]
mod tests;

// Re-exports
pub use status::{Result, Status};
pub use traits::{Dispatcher, TaskHandler, WaitHandler, WaitId};
pub use object::{Channel, Event, Handle, HandleBased, Rights, Signals, Socket};
pub use txn::{TxnSlot, TxnState};
