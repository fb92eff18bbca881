// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Reaper
//!
//! Closing the last handle to an object may release further handles: a
//! channel endpoint owns every packet in its inbound queue, and those
//! packets own the handles that were sent through it. A channel carried
//! inside a message on another channel can nest arbitrarily deep.
//!
//! Tearing such a graph down with nested destructors would recurse once
//! per level. The reaper instead keeps a local worklist: each object that
//! lost its last handle hands back its orphaned handles, and those are
//! released by the same loop.
//!
//! # Design
//!
//! - **Iterative**: Stack depth is constant regardless of nesting
//! - **Observer cancellation first**: Waiters are told before teardown runs

use alloc::sync::Arc;
use alloc::vec::Vec;
use crate::object::handle::{Handle, KernelObject};

/// Worklist of objects whose handle count reached zero
pub(crate) struct Reaper {
    worklist: Vec<Arc<dyn KernelObject>>,
    released: usize,
}

impl Reaper {
    /// Create an empty reaper
    pub(crate) const fn new() -> Self {
        Self {
            worklist: Vec::new(),
            released: 0,
        }
    }

    /// Queue an object that just lost its last handle
    pub(crate) fn push(&mut self, object: Arc<dyn KernelObject>) {
        self.worklist.push(object);
    }

    /// Release handles, queueing any object that loses its last one
    pub(crate) fn push_handles(&mut self, handles: Vec<Handle>) {
        for handle in handles {
            if let Some(object) = handle.release_deferred() {
                self.worklist.push(object);
            }
        }
    }

    /// Tear down every queued object
    ///
    /// Returns the number of objects torn down.
    pub(crate) fn drain(&mut self) -> usize {
        while let Some(object) = self.worklist.pop() {
            object.base().mark_destroying();
            object.state_tracker().cancel_all().deliver();
            let orphans = object.on_zero_handles();
            self.push_handles(orphans);
            self.released += 1;
        }
        self.released
    }
}

/// Tear down an object whose last handle was just closed
pub(crate) fn release(object: Arc<dyn KernelObject>) {
    let mut reaper = Reaper::new();
    reaper.push(object);
    let released = reaper.drain();
    if released > 1 {
        log::trace!("reaper released {} objects", released);
    }
}

// ============================================================================
// Tests
// ============================================================================
