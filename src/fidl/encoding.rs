// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Typed Encoding & Decoding
//!
//! Converts typed values to and from the flat bytes + handles layout
//! carried by a message body.
//!
//! # Design
//!
//! - **Inline + out-of-line**: Every value has a fixed inline part; strings,
//!   vectors and large envelope payloads live out-of-line, each object
//!   starting on an 8-byte boundary, in depth-first order
//! - **Zero padding**: The encoder zero-fills; the decoder rejects non-zero
//!   padding
//! - **Handles**: Encoded as a presence marker inline; the handle itself
//!   moves into the message's handle array in encounter order
//! - **Versioned envelopes**: V1 envelopes are 16 bytes with the payload
//!   out-of-line; V2 envelopes are 8 bytes and inline payloads of 4 bytes
//!   or less
//! - **Bounded**: Nesting deeper than [`MAX_DEPTH`] is rejected
//!
//! # Usage
//!
//! ```ignore
//! fidl_struct! {
//!     pub struct Point { pub x: u32, pub y: u32 }
//! }
//!
//! let mut bytes = Vec::new();
//! let mut handles = Vec::new();
//! Encoder::encode(&mut bytes, &mut handles, WireFormatVersion::V2, &mut point)?;
//! let decoded: Point = Decoder::decode(WireFormatVersion::V2, &bytes, &mut handles)?;
//! ```

use alloc::string::String;
use alloc::vec::Vec;
use crate::fidl::error::{Error, Result};
use crate::fidl::metadata::WireFormatVersion;
use crate::object::handle::Handle;
use crate::status::Status;

/// Maximum out-of-line nesting depth
pub const MAX_DEPTH: usize = 32;

/// Presence marker of an out-of-line object
pub const ALLOC_PRESENT_U64: u64 = u64::MAX;

/// Absence marker of an out-of-line object
pub const ALLOC_ABSENT_U64: u64 = 0;

/// Presence marker of a handle
pub const ALLOC_PRESENT_U32: u32 = u32::MAX;

/// Absence marker of a handle
pub const ALLOC_ABSENT_U32: u32 = 0;

/// Size of a V1 envelope header
pub const ENVELOPE_V1_SIZE: usize = 16;

/// Size of a V2 envelope header
pub const ENVELOPE_V2_SIZE: usize = 8;

/// Largest value a V2 envelope stores inline
pub const ENVELOPE_INLINE_MAX: usize = 4;

/// V2 envelope flag: the value is stored inline
pub const ENVELOPE_INLINED: u16 = 1 << 0;

/// Round `x` up to a multiple of `align` (a power of two)
pub const fn round_up_to_align(x: usize, align: usize) -> usize {
    (x + align - 1) & !(align - 1)
}

/// ============================================================================
/// Traits
/// ============================================================================

/// Inline shape of a type
pub trait Layout {
    /// Alignment of the inline part
    fn inline_align(version: WireFormatVersion) -> usize;

    /// Size of the inline part
    fn inline_size(version: WireFormatVersion) -> usize;
}

/// A value that can be written into a message
///
/// Encoding takes `&mut self` so handles can be moved out of the value.
pub trait Encode: Layout {
    /// Write the inline part at `offset` (already claimed by the caller)
    fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, depth: usize) -> Result<()>;
}

/// A value that can be read out of a message
pub trait Decode: Layout + Sized {
    /// A placeholder to decode into
    fn new_empty() -> Self;

    /// Read the inline part at `offset` into `self`
    fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, depth: usize) -> Result<()>;
}

/// Check nesting before descending into an out-of-line object
fn descend(depth: usize) -> Result<usize> {
    let next = depth + 1;
    if next > MAX_DEPTH {
        return Err(Error::MaxRecursionDepth);
    }
    Ok(next)
}

/// ============================================================================
/// Encoder
/// ============================================================================

/// Writes values into a byte buffer and handle array
pub struct Encoder<'a> {
    buf: &'a mut Vec<u8>,
    handles: &'a mut Vec<Handle>,
    version: WireFormatVersion,
}

impl<'a> Encoder<'a> {
    /// Encode `value` into `buf` and `handles`, replacing their contents
    pub fn encode<T: Encode>(
        buf: &'a mut Vec<u8>,
        handles: &'a mut Vec<Handle>,
        version: WireFormatVersion,
        value: &mut T,
    ) -> Result<()> {
        buf.clear();
        handles.clear();
        let mut encoder = Encoder {
            buf,
            handles,
            version,
        };
        let offset = encoder.alloc(T::inline_size(version));
        value.encode(&mut encoder, offset, 0)
    }

    /// Wire format being written
    pub fn version(&self) -> WireFormatVersion {
        self.version
    }

    /// Claim a zeroed, 8-byte aligned region at the end of the buffer
    pub fn alloc(&mut self, len: usize) -> usize {
        let offset = self.buf.len();
        self.buf.resize(offset + round_up_to_align(len, 8), 0);
        offset
    }

    /// Copy raw bytes at `offset`
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Move a handle into the handle array
    pub fn push_handle(&mut self, handle: Handle) -> Result<()> {
        if self.handles.len() >= crate::object::MAX_MESSAGE_HANDLES {
            return Err(Error::OutOfRange);
        }
        self.handles.push(handle);
        Ok(())
    }

    /// Number of handles written so far
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Current end of the buffer
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// ============================================================================
/// Decoder
/// ============================================================================

/// Reads values out of a byte buffer and handle array
pub struct Decoder<'a> {
    buf: &'a [u8],
    next_out_of_line: usize,
    handles: &'a mut [Handle],
    next_handle: usize,
    version: WireFormatVersion,
}

impl<'a> Decoder<'a> {
    /// Decode a `T` from `buf`, taking handles from `handles`
    ///
    /// Every byte and every handle must be consumed.
    pub fn decode<T: Decode>(
        version: WireFormatVersion,
        buf: &'a [u8],
        handles: &'a mut [Handle],
    ) -> Result<T> {
        let mut value = T::new_empty();
        Self::decode_into(version, buf, handles, &mut value)?;
        Ok(value)
    }

    /// Decode into an existing value
    pub fn decode_into<T: Decode>(
        version: WireFormatVersion,
        buf: &'a [u8],
        handles: &'a mut [Handle],
        value: &mut T,
    ) -> Result<()> {
        let inline_size = T::inline_size(version);
        let inline_end = round_up_to_align(inline_size, 8);
        if buf.len() < inline_end {
            return Err(Error::OutOfRange);
        }
        let mut decoder = Decoder {
            buf,
            next_out_of_line: inline_end,
            handles,
            next_handle: 0,
            version,
        };
        decoder.check_padding(inline_size, inline_end)?;
        value.decode(&mut decoder, 0, 0)?;

        if decoder.next_out_of_line != buf.len() {
            return Err(Error::ExtraBytes);
        }
        if decoder.next_handle != decoder.handles.len() {
            return Err(Error::ExtraHandles);
        }
        Ok(())
    }

    /// Wire format being read
    pub fn version(&self) -> WireFormatVersion {
        self.version
    }

    /// Claim the next out-of-line object of `len` bytes
    pub fn claim(&mut self, len: usize) -> Result<usize> {
        let offset = self.next_out_of_line;
        let padded = len
            .checked_add(7)
            .map(|n| n & !7)
            .ok_or(Error::OutOfRange)?;
        let end = offset.checked_add(padded).ok_or(Error::OutOfRange)?;
        if end > self.buf.len() {
            return Err(Error::OutOfRange);
        }
        self.check_padding(offset + len, end)?;
        self.next_out_of_line = end;
        Ok(offset)
    }

    /// Borrow `len` bytes at `offset`
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(Error::OutOfRange)?;
        self.buf.get(offset..end).ok_or(Error::OutOfRange)
    }

    /// Require zero bytes in `[start, end)`
    pub fn check_padding(&self, start: usize, end: usize) -> Result<()> {
        let padding = self.bytes(start, end.saturating_sub(start))?;
        if padding.iter().any(|&b| b != 0) {
            return Err(Error::NonZeroPadding);
        }
        Ok(())
    }

    /// Take the next handle from the handle array
    pub fn take_handle(&mut self) -> Result<Handle> {
        let slot = self
            .handles
            .get_mut(self.next_handle)
            .ok_or(Error::MissingHandles)?;
        self.next_handle += 1;
        Ok(slot.take())
    }

    /// Number of handles consumed so far
    pub fn handles_consumed(&self) -> usize {
        self.next_handle
    }

    /// Next out-of-line offset
    pub fn out_of_line_offset(&self) -> usize {
        self.next_out_of_line
    }
}

/// ============================================================================
/// Primitives
/// ============================================================================

macro_rules! impl_numeric {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Layout for $ty {
                fn inline_align(_version: WireFormatVersion) -> usize {
                    core::mem::size_of::<$ty>()
                }

                fn inline_size(_version: WireFormatVersion) -> usize {
                    core::mem::size_of::<$ty>()
                }
            }

            impl Encode for $ty {
                fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, _depth: usize) -> Result<()> {
                    encoder.write_bytes(offset, &self.to_le_bytes());
                    Ok(())
                }
            }

            impl Decode for $ty {
                fn new_empty() -> Self {
                    Default::default()
                }

                fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, _depth: usize) -> Result<()> {
                    let bytes = decoder.bytes(offset, core::mem::size_of::<$ty>())?;
                    let mut raw = [0u8; core::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    *self = <$ty>::from_le_bytes(raw);
                    Ok(())
                }
            }
        )*
    };
}

impl_numeric!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Layout for bool {
    fn inline_align(_version: WireFormatVersion) -> usize {
        1
    }

    fn inline_size(_version: WireFormatVersion) -> usize {
        1
    }
}

impl Encode for bool {
    fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, _depth: usize) -> Result<()> {
        encoder.write_bytes(offset, &[*self as u8]);
        Ok(())
    }
}

impl Decode for bool {
    fn new_empty() -> Self {
        false
    }

    fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, _depth: usize) -> Result<()> {
        *self = match decoder.bytes(offset, 1)?[0] {
            0 => false,
            1 => true,
            _ => return Err(Error::InvalidBoolean),
        };
        Ok(())
    }
}

/// ============================================================================
/// Vectors & Strings
/// ============================================================================

/// Size of a vector/string header (count + presence)
const VECTOR_HEADER_SIZE: usize = 16;

fn encode_vector_header(encoder: &mut Encoder<'_>, offset: usize, count: usize) {
    encoder.write_bytes(offset, &(count as u64).to_le_bytes());
    encoder.write_bytes(offset + 8, &ALLOC_PRESENT_U64.to_le_bytes());
}

fn decode_vector_header(decoder: &Decoder<'_>, offset: usize) -> Result<usize> {
    let mut count = [0u8; 8];
    count.copy_from_slice(decoder.bytes(offset, 8)?);
    let mut presence = [0u8; 8];
    presence.copy_from_slice(decoder.bytes(offset + 8, 8)?);
    if u64::from_le_bytes(presence) != ALLOC_PRESENT_U64 {
        return Err(Error::InvalidPresenceIndicator);
    }
    usize::try_from(u64::from_le_bytes(count)).map_err(|_| Error::OutOfRange)
}

impl<T: Layout> Layout for Vec<T> {
    fn inline_align(_version: WireFormatVersion) -> usize {
        8
    }

    fn inline_size(_version: WireFormatVersion) -> usize {
        VECTOR_HEADER_SIZE
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, depth: usize) -> Result<()> {
        let depth = descend(depth)?;
        encode_vector_header(encoder, offset, self.len());
        let stride = T::inline_size(encoder.version());
        let base = encoder.alloc(stride * self.len());
        for (index, item) in self.iter_mut().enumerate() {
            item.encode(encoder, base + index * stride, depth)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn new_empty() -> Self {
        Vec::new()
    }

    fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, depth: usize) -> Result<()> {
        let depth = descend(depth)?;
        let count = decode_vector_header(decoder, offset)?;
        let stride = T::inline_size(decoder.version());
        let len = count.checked_mul(stride).ok_or(Error::OutOfRange)?;
        // Claiming first bounds `count` by the message size before allocating.
        let base = decoder.claim(len)?;
        self.clear();
        self.reserve(count);
        for index in 0..count {
            let mut item = T::new_empty();
            item.decode(decoder, base + index * stride, depth)?;
            self.push(item);
        }
        Ok(())
    }
}

impl Layout for String {
    fn inline_align(_version: WireFormatVersion) -> usize {
        8
    }

    fn inline_size(_version: WireFormatVersion) -> usize {
        VECTOR_HEADER_SIZE
    }
}

impl Encode for String {
    fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, depth: usize) -> Result<()> {
        descend(depth)?;
        encode_vector_header(encoder, offset, self.len());
        let base = encoder.alloc(self.len());
        encoder.write_bytes(base, self.as_bytes());
        Ok(())
    }
}

impl Decode for String {
    fn new_empty() -> Self {
        String::new()
    }

    fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, depth: usize) -> Result<()> {
        descend(depth)?;
        let len = decode_vector_header(decoder, offset)?;
        let base = decoder.claim(len)?;
        let bytes = decoder.bytes(base, len)?;
        let text = core::str::from_utf8(bytes).map_err(|_| Error::Utf8Error)?;
        self.clear();
        self.push_str(text);
        Ok(())
    }
}

/// ============================================================================
/// Handles
/// ============================================================================

impl Layout for Handle {
    fn inline_align(_version: WireFormatVersion) -> usize {
        4
    }

    fn inline_size(_version: WireFormatVersion) -> usize {
        4
    }
}

impl Encode for Handle {
    fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, _depth: usize) -> Result<()> {
        if self.is_invalid() {
            return Err(Error::Encode(Status::BadHandle));
        }
        encoder.write_bytes(offset, &ALLOC_PRESENT_U32.to_le_bytes());
        encoder.push_handle(self.take())
    }
}

impl Decode for Handle {
    fn new_empty() -> Self {
        Handle::invalid()
    }

    fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, _depth: usize) -> Result<()> {
        let marker = u32::from_le_bytes(decoder.bytes(offset, 4)?.try_into().map_err(|_| Error::OutOfRange)?);
        if marker != ALLOC_PRESENT_U32 {
            return Err(Error::InvalidPresenceIndicator);
        }
        *self = decoder.take_handle()?;
        Ok(())
    }
}

impl Layout for Option<Handle> {
    fn inline_align(version: WireFormatVersion) -> usize {
        Handle::inline_align(version)
    }

    fn inline_size(version: WireFormatVersion) -> usize {
        Handle::inline_size(version)
    }
}

impl Encode for Option<Handle> {
    fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, depth: usize) -> Result<()> {
        match self {
            Some(handle) if handle.is_valid() => handle.encode(encoder, offset, depth),
            _ => {
                encoder.write_bytes(offset, &ALLOC_ABSENT_U32.to_le_bytes());
                Ok(())
            }
        }
    }
}

impl Decode for Option<Handle> {
    fn new_empty() -> Self {
        None
    }

    fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, depth: usize) -> Result<()> {
        let marker = u32::from_le_bytes(decoder.bytes(offset, 4)?.try_into().map_err(|_| Error::OutOfRange)?);
        *self = match marker {
            ALLOC_ABSENT_U32 => None,
            _ => {
                let mut handle = Handle::invalid();
                handle.decode(decoder, offset, depth)?;
                Some(handle)
            }
        };
        Ok(())
    }
}

/// ============================================================================
/// Envelopes
/// ============================================================================

/// An optional, self-sized value (table field or union member)
///
/// The envelope records how many bytes and handles its payload used, so a
/// reader can validate (or skip) it without knowing the payload type.
#[derive(Debug, Default, PartialEq)]
pub struct Envelope<T>(pub Option<T>);

impl<T> Envelope<T> {
    /// An absent envelope
    pub const fn absent() -> Self {
        Self(None)
    }

    /// A present envelope
    pub const fn present(value: T) -> Self {
        Self(Some(value))
    }
}

impl<T: Layout> Layout for Envelope<T> {
    fn inline_align(_version: WireFormatVersion) -> usize {
        8
    }

    fn inline_size(version: WireFormatVersion) -> usize {
        match version {
            WireFormatVersion::V1 => ENVELOPE_V1_SIZE,
            WireFormatVersion::V2 => ENVELOPE_V2_SIZE,
        }
    }
}

impl<T: Encode> Encode for Envelope<T> {
    fn encode(&mut self, encoder: &mut Encoder<'_>, offset: usize, depth: usize) -> Result<()> {
        let Some(value) = self.0.as_mut() else {
            // Absent: the zero-filled header already says so.
            return Ok(());
        };
        let depth = descend(depth)?;
        let version = encoder.version();
        let size = T::inline_size(version);
        let handles_before = encoder.handle_count();

        match version {
            WireFormatVersion::V2 if size <= ENVELOPE_INLINE_MAX => {
                value.encode(encoder, offset, depth)?;
                let num_handles = (encoder.handle_count() - handles_before) as u16;
                encoder.write_bytes(offset + 4, &num_handles.to_le_bytes());
                encoder.write_bytes(offset + 6, &ENVELOPE_INLINED.to_le_bytes());
            }
            WireFormatVersion::V2 => {
                let start = encoder.len();
                let base = encoder.alloc(size);
                value.encode(encoder, base, depth)?;
                let num_bytes = (encoder.len() - start) as u32;
                let num_handles = (encoder.handle_count() - handles_before) as u16;
                encoder.write_bytes(offset, &num_bytes.to_le_bytes());
                encoder.write_bytes(offset + 4, &num_handles.to_le_bytes());
            }
            WireFormatVersion::V1 => {
                let start = encoder.len();
                let base = encoder.alloc(size);
                value.encode(encoder, base, depth)?;
                let num_bytes = (encoder.len() - start) as u32;
                let num_handles = (encoder.handle_count() - handles_before) as u32;
                encoder.write_bytes(offset, &num_bytes.to_le_bytes());
                encoder.write_bytes(offset + 4, &num_handles.to_le_bytes());
                encoder.write_bytes(offset + 8, &ALLOC_PRESENT_U64.to_le_bytes());
            }
        }
        Ok(())
    }
}

impl<T: Decode> Envelope<T> {
    /// Decode the payload out-of-line and check the recorded sizes
    fn decode_out_of_line(
        decoder: &mut Decoder<'_>,
        num_bytes: usize,
        num_handles: usize,
        depth: usize,
    ) -> Result<T> {
        let start = decoder.out_of_line_offset();
        let handles_before = decoder.handles_consumed();
        let base = decoder.claim(T::inline_size(decoder.version()))?;
        let mut value = T::new_empty();
        value.decode(decoder, base, depth)?;
        if decoder.out_of_line_offset() - start != num_bytes
            || decoder.handles_consumed() - handles_before != num_handles
        {
            return Err(Error::InvalidEnvelope);
        }
        Ok(value)
    }
}

impl<T: Decode> Decode for Envelope<T> {
    fn new_empty() -> Self {
        Self(None)
    }

    fn decode(&mut self, decoder: &mut Decoder<'_>, offset: usize, depth: usize) -> Result<()> {
        let header = decoder.bytes(offset, Self::inline_size(decoder.version()))?;
        if header.iter().all(|&b| b == 0) {
            self.0 = None;
            return Ok(());
        }
        let depth = descend(depth)?;
        let word = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
        let half = |at: usize| u16::from_le_bytes([header[at], header[at + 1]]) as usize;

        let value = match decoder.version() {
            WireFormatVersion::V1 => {
                let num_bytes = word(0) as usize;
                let num_handles = word(4) as usize;
                let presence = u64::from_le_bytes([
                    header[8], header[9], header[10], header[11], header[12], header[13], header[14],
                    header[15],
                ]);
                if presence != ALLOC_PRESENT_U64 {
                    return Err(Error::InvalidPresenceIndicator);
                }
                Self::decode_out_of_line(decoder, num_bytes, num_handles, depth)?
            }
            WireFormatVersion::V2 => {
                let num_handles = half(4);
                let flags = half(6) as u16;
                let size = T::inline_size(WireFormatVersion::V2);
                if flags & !ENVELOPE_INLINED != 0 {
                    return Err(Error::InvalidEnvelope);
                }
                if flags & ENVELOPE_INLINED != 0 {
                    if size > ENVELOPE_INLINE_MAX {
                        return Err(Error::InvalidEnvelope);
                    }
                    decoder.check_padding(offset + size, offset + ENVELOPE_INLINE_MAX)?;
                    let handles_before = decoder.handles_consumed();
                    let mut value = T::new_empty();
                    value.decode(decoder, offset, depth)?;
                    if decoder.handles_consumed() - handles_before != num_handles {
                        return Err(Error::InvalidEnvelope);
                    }
                    value
                } else {
                    let num_bytes = word(0) as usize;
                    if size <= ENVELOPE_INLINE_MAX || num_bytes % 8 != 0 {
                        return Err(Error::InvalidEnvelope);
                    }
                    Self::decode_out_of_line(decoder, num_bytes, num_handles, depth)?
                }
            }
        };
        self.0 = Some(value);
        Ok(())
    }
}

/// ============================================================================
/// Structs
/// ============================================================================

/// Define a struct with a wire layout
///
/// Fields are laid out in declaration order, each at its natural
/// alignment; the struct is padded to its own alignment.
#[macro_export]
macro_rules! fidl_struct {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_attr:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$attr])*
        $vis struct $name {
            $(
                $(#[$field_attr])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::fidl::encoding::Layout for $name {
            fn inline_align(version: $crate::fidl::WireFormatVersion) -> usize {
                let mut align = 1usize;
                $(
                    align = align.max(<$ty as $crate::fidl::encoding::Layout>::inline_align(version));
                )*
                align
            }

            #[allow(unused_mut)]
            fn inline_size(version: $crate::fidl::WireFormatVersion) -> usize {
                let mut end = 0usize;
                $(
                    end = $crate::fidl::encoding::round_up_to_align(
                        end,
                        <$ty as $crate::fidl::encoding::Layout>::inline_align(version),
                    ) + <$ty as $crate::fidl::encoding::Layout>::inline_size(version);
                )*
                $crate::fidl::encoding::round_up_to_align(end, Self::inline_align(version)).max(1)
            }
        }

        impl $crate::fidl::encoding::Encode for $name {
            #[allow(unused_mut, unused_variables, unused_assignments)]
            fn encode(
                &mut self,
                encoder: &mut $crate::fidl::encoding::Encoder<'_>,
                offset: usize,
                depth: usize,
            ) -> $crate::fidl::Result<()> {
                let version = encoder.version();
                let mut end = 0usize;
                $(
                    let at = $crate::fidl::encoding::round_up_to_align(
                        end,
                        <$ty as $crate::fidl::encoding::Layout>::inline_align(version),
                    );
                    $crate::fidl::encoding::Encode::encode(&mut self.$field, encoder, offset + at, depth)?;
                    end = at + <$ty as $crate::fidl::encoding::Layout>::inline_size(version);
                )*
                Ok(())
            }
        }

        impl $crate::fidl::encoding::Decode for $name {
            fn new_empty() -> Self {
                Self {
                    $(
                        $field: <$ty as $crate::fidl::encoding::Decode>::new_empty(),
                    )*
                }
            }

            #[allow(unused_mut, unused_variables)]
            fn decode(
                &mut self,
                decoder: &mut $crate::fidl::encoding::Decoder<'_>,
                offset: usize,
                depth: usize,
            ) -> $crate::fidl::Result<()> {
                let version = decoder.version();
                let mut end = 0usize;
                $(
                    let at = $crate::fidl::encoding::round_up_to_align(
                        end,
                        <$ty as $crate::fidl::encoding::Layout>::inline_align(version),
                    );
                    decoder.check_padding(offset + end, offset + at)?;
                    $crate::fidl::encoding::Decode::decode(&mut self.$field, decoder, offset + at, depth)?;
                    end = at + <$ty as $crate::fidl::encoding::Layout>::inline_size(version);
                )*
                let size = <Self as $crate::fidl::encoding::Layout>::inline_size(version);
                decoder.check_padding(offset + end, offset + size)
            }
        }
    };
}

// ============================================================================
// Tests
// ============================================================================
