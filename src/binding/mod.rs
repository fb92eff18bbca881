// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Bindings
//!
//! Connect channel endpoints to a [`crate::traits::Dispatcher`]: a server
//! binding delivers requests to a [`Protocol`], a [`Client`] matches
//! replies to the calls that issued them.
//!
//! # Modules
//!
//! - [`server`] - Server binding, transactions, unbind
//! - [`client`] - Client with a pending-call table

pub mod client;
pub mod server;

// Re-exports
pub use client::{Client, ClientConfig, EventHandler, ResponseHandler};
pub use server::{
    bind_server, Ownership, Protocol, ServerBindingRef, Transaction, UnbindInfo, UnbindReason,
};
