// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Primitives
//!
//! This module provides the locking and waiting primitives the IPC core
//! is built on. They work without `std` and never block the caller on
//! anything other than a spin.
//!
//! # Primitives
//!
//! - **SpinMutex**: Guarded value; the guard is the only path to the state
//! - **Completion**: One-shot value handoff for synchronous waiters

pub mod spinlock;
pub mod completion;

// Re-exports
pub use spinlock::{SpinMutex, SpinMutexGuard};
pub use completion::Completion;
