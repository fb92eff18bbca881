// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Wire Format
//!
//! Layout of the bytes carried by channel messages: the transactional
//! header, its self-describing metadata, and typed body encoding.
//!
//! # Design
//!
//! - **Validate at the edge**: The magic number is checked once, where a
//!   message enters ([`IncomingMessage`]); past that point the wire format
//!   is trusted
//! - **Two versions**: V1 and V2 differ only in envelope layout
//! - **Own error type**: [`Error`] separates fatal framing errors from
//!   tolerable ones
//!
//! # Modules
//!
//! - [`metadata`] - 8-byte wire-format metadata
//! - [`header`] - 16-byte transactional header, epitaphs
//! - [`encoding`] - typed encoder/decoder
//! - [`params`] - offset-based parameter walking
//! - [`message`] - outgoing and incoming messages
//! - [`error`] - wire-layer errors

pub mod encoding;
pub mod error;
pub mod header;
pub mod message;
pub mod metadata;
pub mod params;

// Re-exports
pub use encoding::{Decode, Decoder, Encode, Encoder, Envelope, Layout, MAX_DEPTH};
pub use error::{Error, Result};
pub use header::{
    decode_epitaph, encode_epitaph, DynamicFlags, TransactionHeader, EPITAPH_ORDINAL, EPITAPH_SIZE,
    HEADER_SIZE,
};
pub use message::{IncomingMessage, OutgoingMessage};
pub use metadata::{WireFormatMetadata, WireFormatVersion, MAGIC_NUMBER_INITIAL};
pub use params::{walk_params, Param, ParamDesc};
