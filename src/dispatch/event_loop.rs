// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Event Loop
//!
//! A [`Dispatcher`] that queues completed waits and posted tasks, and runs
//! them on whichever threads call [`Loop::run`] or its variants.
//!
//! # Design
//!
//! - **Observer per wait**: A wait registers the loop as a one-shot
//!   observer on the object's [`StateTracker`]; a match moves the wait's
//!   handler to the ready queue
//! - **Cancel wins or loses cleanly**: A wait is either still registered
//!   (cancel removes it, the handler never runs) or already queued (cancel
//!   fails, the handler runs)
//! - **Handlers run unlocked**: The loop lock only guards the queues;
//!   handlers are invoked, and dropped, after it is released
//! - **Shutdown**: Every outstanding handler is invoked exactly once with
//!   `Canceled`
//!
//! # Usage
//!
//! ```ignore
//! let event_loop = Loop::new(LoopConfig::named("server"));
//! event_loop.begin_wait(event.as_handle(), Signals::USER_0, Box::new(|result| {
//!     log::info!("signaled: {:?}", result);
//! }))?;
//! event_loop.run_until_idle()?;
//! ```

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use crate::dispatch::config::LoopConfig;
use crate::object::handle::{Handle, KernelObject, Rights};
use crate::object::signals::{SignalObserver, Signals};
use crate::status::{Result, Status};
use crate::sync::SpinMutex;
use crate::traits::{Dispatcher, TaskHandler, WaitHandler, WaitId};

/// Observer keys are unique across loops so trackers never confuse them
static NEXT_WAIT_KEY: AtomicU64 = AtomicU64::new(1);

/// Run state of a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Dispatching normally
    Runnable,

    /// [`Loop::quit`] was called; run calls return `Canceled`
    Quit,

    /// [`Loop::shutdown`] was called; nothing runs again
    Shutdown,
}

/// ============================================================================
/// Queues
/// ============================================================================

/// A wait registered on an object's tracker
struct PendingWait {
    object: Arc<dyn KernelObject>,
    handler: WaitHandler,
}

/// Work ready to run
enum Ready {
    Wait(WaitHandler, Result<Signals>),
    Task(TaskHandler),
}

impl Ready {
    fn invoke(self) {
        match self {
            Self::Wait(handler, result) => handler(result),
            Self::Task(task) => task(Ok(())),
        }
    }

    fn cancel(self) {
        match self {
            Self::Wait(handler, _) => handler(Err(Status::Canceled)),
            Self::Task(task) => task(Err(Status::Canceled)),
        }
    }
}

/// Loop state, reachable only with the loop lock held
struct Queues {
    state: LoopState,
    waits: BTreeMap<u64, PendingWait>,
    ready: VecDeque<Ready>,
}

impl Queues {
    /// Fail run calls once quit or shut down
    fn check_runnable(&self) -> Result<()> {
        match self.state {
            LoopState::Runnable => Ok(()),
            LoopState::Quit => Err(Status::Canceled),
            LoopState::Shutdown => Err(Status::BadState),
        }
    }
}

/// Shared part of a [`Loop`]
struct LoopInner {
    config: LoopConfig,
    queues: SpinMutex<Queues>,
    running: AtomicUsize,
}

impl LoopInner {
    /// Move a registered wait to the ready queue
    fn complete(&self, key: u64, result: Result<Signals>) {
        let object = {
            let mut queues = self.queues.lock();
            match queues.waits.remove(&key) {
                Some(PendingWait { object, handler }) => {
                    queues.ready.push_back(Ready::Wait(handler, result));
                    Some(object)
                }
                // Canceled, or already shut down.
                None => None,
            }
        };
        drop(object);
    }
}

impl SignalObserver for LoopInner {
    fn on_match(&self, key: u64, observed: Signals) {
        self.complete(key, Ok(observed));
    }

    fn on_cancel(&self, key: u64) {
        self.complete(key, Err(Status::Canceled));
    }
}

/// Counts a thread inside a run call
struct RunGuard<'a>(&'a AtomicUsize);

impl<'a> RunGuard<'a> {
    fn enter(running: &'a AtomicUsize) -> Self {
        running.fetch_add(1, Ordering::AcqRel);
        Self(running)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// ============================================================================
/// Loop
/// ============================================================================

/// Event loop
///
/// Cloning yields another reference to the same loop. Call
/// [`Loop::shutdown`] before the last reference goes away; pending
/// handlers are otherwise never invoked.
#[derive(Clone)]
pub struct Loop {
    inner: Arc<LoopInner>,
}

impl Loop {
    /// Create a loop
    pub fn new(config: LoopConfig) -> Self {
        log::debug!("loop '{}' created", config.name);
        Self {
            inner: Arc::new(LoopInner {
                config,
                queues: SpinMutex::new(Queues {
                    state: LoopState::Runnable,
                    waits: BTreeMap::new(),
                    ready: VecDeque::new(),
                }),
                running: AtomicUsize::new(0),
            }),
        }
    }

    /// This loop as a shareable dispatcher
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::new(self.clone())
    }

    /// Name from the configuration
    pub fn name(&self) -> &'static str {
        self.inner.config.name
    }

    /// Current run state
    pub fn state(&self) -> LoopState {
        self.inner.queues.lock().state
    }

    /// Number of registered waits
    pub fn pending_waits(&self) -> usize {
        self.inner.queues.lock().waits.len()
    }

    /// Number of handlers ready to run
    pub fn ready_count(&self) -> usize {
        self.inner.queues.lock().ready.len()
    }

    /// Run at most one ready handler
    ///
    /// Returns whether a handler ran.
    ///
    /// # Returns
    ///
    /// - `Canceled` if the loop was quit
    /// - `BadState` if the loop was shut down
    pub fn run_one(&self) -> Result<bool> {
        let _guard = RunGuard::enter(&self.inner.running);
        let next = {
            let mut queues = self.inner.queues.lock();
            queues.check_runnable()?;
            queues.ready.pop_front()
        };
        match next {
            Some(ready) => {
                ready.invoke();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run handlers until none are ready
    ///
    /// Returns how many ran. Fails like [`Loop::run_one`]; quit is
    /// observed between batches of `max_ready_per_run` handlers.
    pub fn run_until_idle(&self) -> Result<usize> {
        let _guard = RunGuard::enter(&self.inner.running);
        let batch_size = self.inner.config.batch();
        let mut dispatched = 0;
        loop {
            let batch: Vec<Ready> = {
                let mut queues = self.inner.queues.lock();
                queues.check_runnable()?;
                let count = batch_size.min(queues.ready.len());
                queues.ready.drain(..count).collect()
            };
            if batch.is_empty() {
                return Ok(dispatched);
            }
            for ready in batch {
                ready.invoke();
                dispatched += 1;
            }
        }
    }

    /// Run handlers until the loop is quit or shut down
    ///
    /// Spins while idle. Returns `Canceled` after [`Loop::quit`] and
    /// `BadState` after [`Loop::shutdown`].
    pub fn run(&self) -> Status {
        loop {
            match self.run_until_idle() {
                Ok(_) => core::hint::spin_loop(),
                Err(status) => return status,
            }
        }
    }

    /// Make run calls return `Canceled`
    pub fn quit(&self) {
        let mut queues = self.inner.queues.lock();
        if queues.state == LoopState::Runnable {
            queues.state = LoopState::Quit;
        }
    }

    /// Allow running again after [`Loop::quit`]
    ///
    /// Fails with `BadState` while a thread is still in a run call or
    /// after shutdown.
    pub fn reset_quit(&self) -> Result<()> {
        if self.inner.running.load(Ordering::Acquire) != 0 {
            return Err(Status::BadState);
        }
        let mut queues = self.inner.queues.lock();
        match queues.state {
            LoopState::Shutdown => Err(Status::BadState),
            _ => {
                queues.state = LoopState::Runnable;
                Ok(())
            }
        }
    }

    /// Cancel everything and refuse new work
    ///
    /// Every pending wait and every queued handler is invoked once with
    /// `Canceled`. Calling it again does nothing.
    pub fn shutdown(&self) {
        let (waits, ready) = {
            let mut queues = self.inner.queues.lock();
            if queues.state == LoopState::Shutdown {
                return;
            }
            queues.state = LoopState::Shutdown;
            (
                core::mem::take(&mut queues.waits),
                core::mem::take(&mut queues.ready),
            )
        };
        log::debug!(
            "loop '{}' shutting down: {} waits, {} ready",
            self.inner.config.name,
            waits.len(),
            ready.len()
        );

        for (key, wait) in waits {
            wait.object.state_tracker().remove_observer(key);
            (wait.handler)(Err(Status::Canceled));
        }
        for item in ready {
            item.cancel();
        }
    }
}

impl Dispatcher for Loop {
    fn begin_wait(&self, handle: &Handle, trigger: Signals, handler: WaitHandler) -> Result<WaitId> {
        handle.require(Rights::WAIT)?;
        let object = handle.object()?.clone();
        let key = NEXT_WAIT_KEY.fetch_add(1, Ordering::Relaxed);
        {
            let mut queues = self.inner.queues.lock();
            if queues.state == LoopState::Shutdown {
                drop(queues);
                drop(handler);
                return Err(Status::BadState);
            }
            queues.waits.insert(
                key,
                PendingWait {
                    object: object.clone(),
                    handler,
                },
            );
        }

        let observer: Arc<dyn SignalObserver> = self.inner.clone();
        object
            .state_tracker()
            .add_observer(key, trigger, observer)
            .deliver();
        log::trace!("loop '{}' wait {} on koid {}", self.inner.config.name, key, handle.koid().raw());
        Ok(WaitId(key))
    }

    fn cancel_wait(&self, id: WaitId) -> bool {
        let removed = self.inner.queues.lock().waits.remove(&id.0);
        match removed {
            Some(wait) => {
                wait.object.state_tracker().remove_observer(id.0);
                true
            }
            None => false,
        }
    }

    fn post_task(&self, task: TaskHandler) -> Result<()> {
        let mut queues = self.inner.queues.lock();
        if queues.state == LoopState::Shutdown {
            drop(queues);
            drop(task);
            return Err(Status::BadState);
        }
        queues.ready.push_back(Ready::Task(task));
        Ok(())
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
