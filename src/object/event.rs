// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Event Object
//!
//! Events are the simplest kernel object: a signal set with no other
//! state. They are commonly sent through channels as tokens whose
//! identity (koid) the receiver can check.
//!
//! # Design
//!
//! - **Signaling**: [`Signals::EVENT_SIGNALED`] plus the user signals
//! - **No reset modes**: Waiters clear the signal explicitly
//!
//! # Usage
//!
//! ```ignore
//! let event = Event::create()?;
//! event.signal(Signals::empty(), Signals::EVENT_SIGNALED)?;
//! assert!(event.is_signaled()?);
//! ```

use alloc::sync::Arc;
use core::any::Any;
use crate::object::handle::{
    impl_handle_based, Handle, KernelObject, KernelObjectBase, ObjectType, Rights,
};
use crate::object::signals::{Signals, StateTracker};
use crate::status::Result;

/// Kernel-side event object
pub struct EventObject {
    base: KernelObjectBase,
    tracker: StateTracker,
}

impl KernelObject for EventObject {
    fn base(&self) -> &KernelObjectBase {
        &self.base
    }

    fn state_tracker(&self) -> &StateTracker {
        &self.tracker
    }

    fn allowed_user_signals(&self) -> Signals {
        Signals::USER_ALL | Signals::EVENT_SIGNALED
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handle to an event
#[derive(Debug)]
pub struct Event(Handle);

impl_handle_based!(Event);

impl Event {
    /// Create a new unsignaled event
    pub fn create() -> Result<Self> {
        let object: Arc<dyn KernelObject> = Arc::new(EventObject {
            base: KernelObjectBase::new(ObjectType::Event),
            tracker: StateTracker::new(Signals::empty()),
        });
        Ok(Self(Handle::new(object, Rights::EVENT_DEFAULT)))
    }

    /// Clear and set signals
    pub fn signal(&self, clear: Signals, set: Signals) -> Result<()> {
        self.0.signal(clear, set)
    }

    /// Check if [`Signals::EVENT_SIGNALED`] is asserted
    pub fn is_signaled(&self) -> Result<bool> {
        Ok(self.0.signals()?.contains(Signals::EVENT_SIGNALED))
    }
}

// ============================================================================
// Tests
// ============================================================================
