// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Dispatcher traits
//!
//! Bindings never block. They ask a [`Dispatcher`] to call them back when
//! a handle's signals change, and to run deferred work. [`crate::dispatch::Loop`]
//! is the implementation in this crate; an embedder with its own event
//! loop implements the trait instead.

use alloc::boxed::Box;
use crate::object::handle::Handle;
use crate::object::signals::Signals;
use crate::status::Result;

/// Callback of a signal wait
///
/// Receives the observed signals, or `Canceled` if the dispatcher shut
/// down or the waited-on object lost its last handle.
pub type WaitHandler = Box<dyn FnOnce(Result<Signals>) + Send>;

/// Callback of a posted task
///
/// Receives `Ok(())` when run normally, `Canceled` on shutdown.
pub type TaskHandler = Box<dyn FnOnce(Result<()>) + Send>;

/// Identifies a pending wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitId(pub(crate) u64);

impl WaitId {
    /// Raw value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Asynchronous wait and task execution
///
/// Every handler passed to a dispatcher is invoked exactly once, or
/// dropped uninvoked after a successful [`Dispatcher::cancel_wait`].
pub trait Dispatcher: Send + Sync {
    /// Call `handler` once any signal in `trigger` is asserted on `handle`
    ///
    /// The handler runs on a thread servicing the dispatcher, never inside
    /// this call.
    ///
    /// # Returns
    ///
    /// - `AccessDenied` if `handle` lacks [`crate::object::Rights::WAIT`]
    /// - `BadHandle` if `handle` is invalid
    /// - `BadState` if the dispatcher is shutting down
    fn begin_wait(&self, handle: &Handle, trigger: Signals, handler: WaitHandler) -> Result<WaitId>;

    /// Cancel a wait
    ///
    /// Returns true if the handler will never run. Returns false if the
    /// wait already completed (or never existed); its handler has run or
    /// is about to.
    fn cancel_wait(&self, id: WaitId) -> bool;

    /// Run `task` on a thread servicing the dispatcher
    ///
    /// Fails with `BadState` if the dispatcher is shutting down.
    fn post_task(&self, task: TaskHandler) -> Result<()>;
}
