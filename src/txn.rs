// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Transaction State
//!
//! One request/reply exchange moves through a small state machine:
//!
//! ```text
//!            reply            close             unbind
//! Pending ---------> Replied  ------> Closed    ------> Unbound
//!    |_______________________________^  ^_____________^
//! ```
//!
//! Only `Pending` has outgoing transitions. Completing a transaction
//! twice is a bug in the handler and panics. Completing one whose binding
//! went away first is not a bug (the binding raced the handler) and
//! fails with `Canceled`.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use crate::status::{Result, Status};
use crate::sync::SpinMutex;

/// State of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Waiting for a reply
    Pending,

    /// A reply was sent
    Replied,

    /// Ended with an epitaph or error
    Closed,

    /// The owning binding was torn down first
    Unbound,
}

impl TxnState {
    /// Whether no transition leaves this state
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Replied => "replied",
            Self::Closed => "closed",
            Self::Unbound => "unbound",
        };
        f.write_str(name)
    }
}

/// Shared state of one transaction
///
/// Held by the completer and by the binding that dispatched it, so either
/// side can move it out of `Pending`.
pub struct TxnSlot {
    state: SpinMutex<TxnState>,
    next_dispatch: AtomicBool,
}

impl TxnSlot {
    /// A pending transaction
    pub const fn new() -> Self {
        Self {
            state: SpinMutex::new(TxnState::Pending),
            next_dispatch: AtomicBool::new(false),
        }
    }

    /// Current state
    pub fn state(&self) -> TxnState {
        *self.state.lock()
    }

    /// Leave `Pending`
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the transaction was pending
    /// - `Canceled` if it was already `Unbound`
    /// - `BadState` when unbinding an already completed transaction
    ///
    /// # Panics
    ///
    /// If `to` is `Pending`, or if a completed (`Replied` or `Closed`)
    /// transaction is completed again.
    pub fn transition(&self, to: TxnState) -> Result<()> {
        assert!(to != TxnState::Pending, "transaction cannot return to pending");
        let mut state = self.state.lock();
        match (*state, to) {
            (TxnState::Pending, _) => {
                *state = to;
                Ok(())
            }
            (TxnState::Unbound, _) => Err(Status::Canceled),
            (_, TxnState::Unbound) => Err(Status::BadState),
            (from, to) => {
                drop(state);
                panic!("transaction completed twice ({} -> {})", from, to);
            }
        }
    }

    /// Allow the next message to be dispatched before this one completes
    ///
    /// Returns true the first time it is called.
    pub fn enable_next_dispatch(&self) -> bool {
        !self.next_dispatch.swap(true, Ordering::AcqRel)
    }

    /// Whether [`TxnSlot::enable_next_dispatch`] was called
    pub fn next_dispatch_enabled(&self) -> bool {
        self.next_dispatch.load(Ordering::Acquire)
    }
}

impl Default for TxnSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TxnSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnSlot")
            .field("state", &self.state())
            .field("next_dispatch", &self.next_dispatch_enabled())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_reply() {
        let slot = TxnSlot::new();
        assert_eq!(slot.state(), TxnState::Pending);
        assert!(!slot.state().is_terminal());
        assert_eq!(slot.transition(TxnState::Replied), Ok(()));
        assert_eq!(slot.state(), TxnState::Replied);
        assert!(slot.state().is_terminal());
    }

    #[test]
    #[should_panic(expected = "transaction completed twice")]
    fn test_txn_double_reply_panics() {
        let slot = TxnSlot::new();
        slot.transition(TxnState::Replied).unwrap();
        let _ = slot.transition(TxnState::Replied);
    }

    #[test]
    #[should_panic(expected = "transaction completed twice")]
    fn test_txn_close_after_reply_panics() {
        let slot = TxnSlot::new();
        slot.transition(TxnState::Replied).unwrap();
        let _ = slot.transition(TxnState::Closed);
    }

    #[test]
    fn test_txn_unbound_first() {
        let slot = TxnSlot::new();
        assert_eq!(slot.transition(TxnState::Unbound), Ok(()));
        assert_eq!(slot.transition(TxnState::Replied), Err(Status::Canceled));
        assert_eq!(slot.transition(TxnState::Closed), Err(Status::Canceled));
        assert_eq!(slot.state(), TxnState::Unbound);
    }

    #[test]
    fn test_txn_unbind_after_reply() {
        let slot = TxnSlot::new();
        slot.transition(TxnState::Closed).unwrap();
        assert_eq!(slot.transition(TxnState::Unbound), Err(Status::BadState));
        assert_eq!(slot.state(), TxnState::Closed);
    }

    #[test]
    #[should_panic(expected = "cannot return to pending")]
    fn test_txn_back_to_pending_panics() {
        let _ = TxnSlot::new().transition(TxnState::Pending);
    }

    #[test]
    fn test_enable_next_dispatch() {
        let slot = TxnSlot::new();
        assert!(!slot.next_dispatch_enabled());
        assert!(slot.enable_next_dispatch());
        assert!(!slot.enable_next_dispatch());
        assert!(slot.next_dispatch_enabled());
    }
}
