// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Status Codes
//!
//! Every operation in the IPC core reports failure through [`Status`].
//! The raw values match the Zircon ABI so that a status crossing a
//! channel (for example inside an epitaph) means the same thing on
//! both sides, whatever runtime sits there.
//!
//! # Error Return Convention
//!
//! ```text
//! Success: Ok(..)         raw value 0
//! Failure: Err(Status)    raw value negative
//! ```

/// Result type used across the crate
pub type Result<T> = core::result::Result<T, Status>;

/// Raw status value for success
pub const OK: i32 = 0;

/// Status code
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Status {
    /// Internal error (should never be seen by well-behaved code)
    #[error("internal error")]
    Internal = -1,

    /// Operation not supported on this object
    #[error("not supported")]
    NotSupported = -2,

    /// Resource limit (e.g. handle table) reached
    #[error("no resources")]
    NoResources = -3,

    /// Allocation failed
    #[error("no memory")]
    NoMemory = -4,

    /// Malformed argument
    #[error("invalid arguments")]
    InvalidArgs = -10,

    /// Handle is invalid or was already moved
    #[error("bad handle")]
    BadHandle = -11,

    /// Handle refers to the wrong object type
    #[error("wrong type")]
    WrongType = -12,

    /// Size or count exceeds a limit
    #[error("out of range")]
    OutOfRange = -14,

    /// Caller buffer too small
    #[error("buffer too small")]
    BufferTooSmall = -15,

    /// Protocol sequencing violation
    #[error("bad state")]
    BadState = -20,

    /// Deadline expired
    #[error("timed out")]
    TimedOut = -21,

    /// Operation would block
    #[error("should wait")]
    ShouldWait = -22,

    /// Operation canceled (dispatcher shutdown, unbind)
    #[error("canceled")]
    Canceled = -23,

    /// The other end of a peered object is gone
    #[error("peer closed")]
    PeerClosed = -24,

    /// Object not found
    #[error("not found")]
    NotFound = -25,

    /// Missing rights
    #[error("access denied")]
    AccessDenied = -30,
}

impl Status {
    /// Convert a raw value into a result
    ///
    /// Unknown negative values map to [`Status::Internal`].
    pub const fn from_raw(raw: i32) -> Result<()> {
        match raw {
            OK => Ok(()),
            -2 => Err(Self::NotSupported),
            -3 => Err(Self::NoResources),
            -4 => Err(Self::NoMemory),
            -10 => Err(Self::InvalidArgs),
            -11 => Err(Self::BadHandle),
            -12 => Err(Self::WrongType),
            -14 => Err(Self::OutOfRange),
            -15 => Err(Self::BufferTooSmall),
            -20 => Err(Self::BadState),
            -21 => Err(Self::TimedOut),
            -22 => Err(Self::ShouldWait),
            -23 => Err(Self::Canceled),
            -24 => Err(Self::PeerClosed),
            -25 => Err(Self::NotFound),
            -30 => Err(Self::AccessDenied),
            _ => Err(Self::Internal),
        }
    }

    /// Get raw value
    pub const fn into_raw(self) -> i32 {
        self as i32
    }

    /// Raw value of a result (0 for success)
    pub const fn raw_of(result: Result<()>) -> i32 {
        match result {
            Ok(()) => OK,
            Err(status) => status.into_raw(),
        }
    }

    /// Zircon-style constant name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Internal => "ZX_ERR_INTERNAL",
            Self::NotSupported => "ZX_ERR_NOT_SUPPORTED",
            Self::NoResources => "ZX_ERR_NO_RESOURCES",
            Self::NoMemory => "ZX_ERR_NO_MEMORY",
            Self::InvalidArgs => "ZX_ERR_INVALID_ARGS",
            Self::BadHandle => "ZX_ERR_BAD_HANDLE",
            Self::WrongType => "ZX_ERR_WRONG_TYPE",
            Self::OutOfRange => "ZX_ERR_OUT_OF_RANGE",
            Self::BufferTooSmall => "ZX_ERR_BUFFER_TOO_SMALL",
            Self::BadState => "ZX_ERR_BAD_STATE",
            Self::TimedOut => "ZX_ERR_TIMED_OUT",
            Self::ShouldWait => "ZX_ERR_SHOULD_WAIT",
            Self::Canceled => "ZX_ERR_CANCELED",
            Self::PeerClosed => "ZX_ERR_PEER_CLOSED",
            Self::NotFound => "ZX_ERR_NOT_FOUND",
            Self::AccessDenied => "ZX_ERR_ACCESS_DENIED",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
