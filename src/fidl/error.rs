// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Wire-Layer Errors
//!
//! Errors raised while encoding, decoding or routing messages. Transport
//! failures from the object layer are wrapped as [`Error::Transport`].

use crate::status::Status;

/// Result type of the wire layer
pub type Result<T> = core::result::Result<T, Error>;

/// Wire-layer error
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Message shorter than its header
    #[error("invalid message header")]
    InvalidHeader,

    /// Header magic number is not one this library understands
    #[error("incompatible magic number {0:#x}")]
    IncompatibleMagicNumber(u8),

    /// Metadata selects a wire format this library cannot decode
    #[error("unsupported wire format")]
    UnsupportedWireFormat,

    /// Tried to read past the end of the message, or a count over a limit
    #[error("out of range")]
    OutOfRange,

    /// Presence marker is neither the present nor the absent value
    #[error("invalid presence indicator")]
    InvalidPresenceIndicator,

    /// Padding or reserved bytes are not zero
    #[error("non-zero padding")]
    NonZeroPadding,

    /// Boolean byte is neither 0 nor 1
    #[error("invalid boolean")]
    InvalidBoolean,

    /// String payload is not UTF-8
    #[error("invalid utf-8 in string")]
    Utf8Error,

    /// Fewer handles in the message than the layout requires
    #[error("missing handles")]
    MissingHandles,

    /// Bytes left over after decoding
    #[error("extra bytes")]
    ExtraBytes,

    /// Handles left over after decoding
    #[error("extra handles")]
    ExtraHandles,

    /// Out-of-line nesting deeper than `MAX_DEPTH`
    #[error("maximum recursion depth exceeded")]
    MaxRecursionDepth,

    /// Envelope header is inconsistent with its contents
    #[error("invalid envelope")]
    InvalidEnvelope,

    /// Parameter offsets overlap, repeat, or run past the message
    #[error("malformed parameters")]
    MalformedParams,

    /// No method with this ordinal
    #[error("unknown ordinal {0:#x}")]
    UnknownOrdinal(u64),

    /// Response for a transaction that is not pending
    #[error("invalid response transaction id")]
    InvalidResponseTxid,

    /// The connection went away while the call was pending
    #[error("no connection")]
    NoConnection,

    /// The channel was closed with an epitaph
    #[error("channel closed with epitaph {status}")]
    ClientChannelClosed {
        /// Epitaph status
        status: Status,
    },

    /// Transport operation failed
    #[error("transport error: {0}")]
    Transport(Status),

    /// Encoding a value failed in the object layer
    #[error("encode error: {0}")]
    Encode(Status),
}

impl Error {
    /// Whether the error ends the connection it occurred on
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidResponseTxid | Self::UnknownOrdinal(_))
    }

    /// Status to report on the wire for this error
    pub fn as_status(&self) -> Status {
        match self {
            Self::UnknownOrdinal(_) => Status::NotSupported,
            Self::Transport(status) | Self::Encode(status) => *status,
            Self::ClientChannelClosed { status } => *status,
            Self::NoConnection => Status::PeerClosed,
            _ => Status::InvalidArgs,
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::Transport(status)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::IncompatibleMagicNumber(7).to_string(),
            "incompatible magic number 0x7"
        );
        assert_eq!(
            Error::ClientChannelClosed {
                status: Status::PeerClosed
            }
            .to_string(),
            "channel closed with epitaph peer closed"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(!Error::InvalidResponseTxid.is_fatal());
        assert!(Error::IncompatibleMagicNumber(0).is_fatal());
        assert_eq!(Error::UnknownOrdinal(3).as_status(), Status::NotSupported);
        assert_eq!(Error::from(Status::PeerClosed), Error::Transport(Status::PeerClosed));
    }
}
