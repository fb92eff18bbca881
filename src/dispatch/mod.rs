// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Dispatch
//!
//! The event loop that drives bindings.
//!
//! # Modules
//!
//! - [`config`] - Loop configuration
//! - [`event_loop`] - The [`Loop`] dispatcher

pub mod config;
pub mod event_loop;

// Re-exports
pub use config::{LoopConfig, DEFAULT_MAX_READY_PER_RUN};
pub use event_loop::{Loop, LoopState};
