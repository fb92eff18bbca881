// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Signals & State Tracking
//!
//! Every kernel object carries a set of signal bits describing its
//! observable state (readable, peer closed, user-defined). Waiters do not
//! hold a handle to the object: they register an observer with the
//! object's [`StateTracker`], so observation never extends ownership.
//!
//! # Design
//!
//! - **One-shot observers**: An observer fires once and is removed
//! - **Deferred delivery**: Matching happens under the tracker lock;
//!   notification happens after it is released, through [`Notifications`]
//! - **Cancellation**: When the last handle to an object goes away every
//!   remaining observer is told via [`SignalObserver::on_cancel`]

use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use crate::sync::SpinMutex;

bitflags! {
    /// Signal bits asserted on a kernel object
    ///
    /// Low bits are object-specific and overlap between object types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        /// Channel has at least one pending message
        const CHANNEL_READABLE = 1 << 0;
        /// Channel peer is open
        const CHANNEL_WRITABLE = 1 << 1;
        /// Last handle to the channel peer was closed
        const CHANNEL_PEER_CLOSED = 1 << 2;

        /// Socket has buffered bytes
        const SOCKET_READABLE = 1 << 0;
        /// Socket peer has buffer space
        const SOCKET_WRITABLE = 1 << 1;
        /// Last handle to the socket peer was closed
        const SOCKET_PEER_CLOSED = 1 << 2;

        /// Event is signaled
        const EVENT_SIGNALED = 1 << 4;

        /// User signals
        const USER_0 = 1 << 24;
        const USER_1 = 1 << 25;
        const USER_2 = 1 << 26;
        const USER_3 = 1 << 27;
        const USER_4 = 1 << 28;
        const USER_5 = 1 << 29;
        const USER_6 = 1 << 30;
        const USER_7 = 1 << 31;
        const USER_ALL = 0xFF << 24;
    }
}

/// Receiver of signal matches
///
/// Implementations must be cheap: they are invoked from whatever thread
/// changed the signals, after every kernel lock has been dropped.
pub trait SignalObserver: Send + Sync {
    /// Signals matching the trigger were asserted
    fn on_match(&self, key: u64, observed: Signals);

    /// The object lost its last handle before the trigger matched
    fn on_cancel(&self, key: u64);
}

/// A registered observer
struct ObserverEntry {
    key: u64,
    trigger: Signals,
    observer: Arc<dyn SignalObserver>,
}

/// What an observer is about to be told
enum Delivery {
    Matched(Signals),
    Canceled,
}

/// Observer notifications collected under a lock
///
/// Deliver them with [`Notifications::deliver`] once every lock is
/// released.
#[must_use = "notifications must be delivered after the lock is released"]
#[derive(Default)]
pub struct Notifications {
    pending: Vec<(ObserverEntry, Delivery)>,
}

impl Notifications {
    /// No notifications
    pub const fn none() -> Self {
        Self { pending: Vec::new() }
    }

    /// Number of notifications to deliver
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if there is nothing to deliver
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Merge another batch into this one
    pub fn append(&mut self, mut other: Notifications) {
        self.pending.append(&mut other.pending);
    }

    /// Invoke every observer
    pub fn deliver(self) {
        for (entry, delivery) in self.pending {
            match delivery {
                Delivery::Matched(observed) => entry.observer.on_match(entry.key, observed),
                Delivery::Canceled => entry.observer.on_cancel(entry.key),
            }
        }
    }
}

/// Tracker state, reachable only with the tracker lock held
struct TrackerState {
    signals: Signals,
    observers: Vec<ObserverEntry>,
}

/// Signal state and observers of one kernel object
pub struct StateTracker {
    inner: SpinMutex<TrackerState>,
}

impl StateTracker {
    /// Create a tracker with initial signals
    pub const fn new(initial: Signals) -> Self {
        Self {
            inner: SpinMutex::new(TrackerState {
                signals: initial,
                observers: Vec::new(),
            }),
        }
    }

    /// Currently asserted signals
    pub fn signals(&self) -> Signals {
        self.inner.lock().signals
    }

    /// Clear then set signals, collecting observers whose trigger now matches
    pub fn update(&self, clear: Signals, set: Signals) -> Notifications {
        let mut state = self.inner.lock();
        let previous = state.signals;
        state.signals = (previous - clear) | set;
        if state.signals == previous {
            return Notifications::none();
        }

        let current = state.signals;
        let mut fired = Notifications::none();
        let mut index = 0;
        while index < state.observers.len() {
            if state.observers[index].trigger.intersects(current) {
                let entry = state.observers.swap_remove(index);
                fired.pending.push((entry, Delivery::Matched(current)));
            } else {
                index += 1;
            }
        }
        fired
    }

    /// Register a one-shot observer
    ///
    /// If the trigger already matches, the observer is not registered and
    /// the returned notifications fire it immediately.
    pub fn add_observer(
        &self,
        key: u64,
        trigger: Signals,
        observer: Arc<dyn SignalObserver>,
    ) -> Notifications {
        let mut state = self.inner.lock();
        let entry = ObserverEntry { key, trigger, observer };
        if trigger.intersects(state.signals) {
            let mut fired = Notifications::none();
            fired.pending.push((entry, Delivery::Matched(state.signals)));
            return fired;
        }
        state.observers.push(entry);
        Notifications::none()
    }

    /// Remove an observer that has not fired yet
    ///
    /// Returns false if no observer with `key` is registered.
    pub fn remove_observer(&self, key: u64) -> bool {
        let mut state = self.inner.lock();
        match state.observers.iter().position(|entry| entry.key == key) {
            Some(index) => {
                state.observers.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Cancel every registered observer
    pub fn cancel_all(&self) -> Notifications {
        let mut state = self.inner.lock();
        let mut fired = Notifications::none();
        for entry in state.observers.drain(..) {
            fired.pending.push((entry, Delivery::Canceled));
        }
        fired
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
