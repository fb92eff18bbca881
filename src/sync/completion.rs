// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! One-Shot Completion
//!
//! A `Completion<T>` carries exactly one value from the thread that
//! produces it to the thread that waits for it. It is what synchronous
//! callers block on while the asynchronous completion happens somewhere
//! else (a kernel `call` waiting for its reply, or a client `call_sync`
//! waiting for the dispatcher thread to route the response).
//!
//! # Design
//!
//! - **Single resolution**: Completing twice is a contract violation and panics
//! - **No pumping**: A waiter only spins; it never runs other work
//!
//! # Usage
//!
//! ```ignore
//! let done = Arc::new(Completion::new());
//! let producer = done.clone();
//! spawn(move || producer.complete(42));
//! assert_eq!(done.wait(), 42);
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use crate::sync::SpinMutex;

/// One-shot value handoff
pub struct Completion<T> {
    /// Set once the value has been stored
    signaled: AtomicBool,

    /// The value, until a waiter takes it
    value: SpinMutex<Option<T>>,
}

impl<T> Completion<T> {
    /// Create an unsignaled completion
    pub const fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
            value: SpinMutex::new(None),
        }
    }

    /// Store the value and wake the waiter
    ///
    /// # Panics
    ///
    /// If the completion was already signaled.
    pub fn complete(&self, value: T) {
        let mut slot = self.value.lock();
        assert!(
            !self.signaled.load(Ordering::Acquire),
            "completion signaled twice"
        );
        *slot = Some(value);
        self.signaled.store(true, Ordering::Release);
    }

    /// Check whether the value has been stored
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Take the value if it is available
    pub fn try_take(&self) -> Option<T> {
        if !self.is_signaled() {
            return None;
        }
        self.value.lock().take()
    }

    /// Spin until the value is available and take it
    ///
    /// Only one thread may wait on a given completion; a second waiter
    /// would spin forever once the first has taken the value.
    pub fn wait(&self) -> T {
        loop {
            if let Some(value) = self.try_take() {
                return value;
            }
            core::hint::spin_loop();
        }
    }

    /// Spin at most `spins` iterations
    ///
    /// Returns `None` if the value did not arrive in time.
    pub fn wait_spins(&self, spins: usize) -> Option<T> {
        for _ in 0..spins {
            if let Some(value) = self.try_take() {
                return Some(value);
            }
            core::hint::spin_loop();
        }
        self.try_take()
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
