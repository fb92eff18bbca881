// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle & Rights Model
//!
//! This module implements the capability-based handle system.
//! All kernel resources are accessed through handles with rights,
//! ensuring fine-grained access control.
//!
//! # Design
//!
//! - **Handles**: Move-only capability tokens referencing kernel objects
//! - **Rights**: Bitmask specifying permitted operations
//! - **Ownership**: A handle has exactly one owner; copying it requires an
//!   explicit [`Handle::duplicate`] gated by [`Rights::DUPLICATE`]
//! - **Transfer**: Handles move into message packets and out again
//! - **Lifetime**: Closing the last handle to an object runs its
//!   zero-handles teardown through the [`reaper`](super::reaper)
//!
//! # Usage
//!
//! ```ignore
//! let event = Event::create()?;
//! let copy = event.as_handle().duplicate(Rights::SAME_RIGHTS)?;
//! copy.require(Rights::SIGNAL)?;
//! ```

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use bitflags::bitflags;
use crate::object::reaper;
use crate::object::signals::{Signals, StateTracker};
use crate::status::{Result, Status};

// ============================================================================
// Handle Rights
// ============================================================================

bitflags! {
    /// Handle rights bitmask
    ///
    /// Rights are permissions that control what operations can be performed
    /// on a kernel object through a handle.
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        /// Duplicate handle
        const DUPLICATE = 1 << 0;
        /// Transfer through a channel
        const TRANSFER = 1 << 1;
        /// Read state / messages
        const READ = 1 << 2;
        /// Modify state / write messages
        const WRITE = 1 << 3;
        /// Assert user signals on the object
        const SIGNAL = 1 << 12;
        /// Assert user signals on the peer
        const SIGNAL_PEER = 1 << 13;
        /// Wait on signals
        const WAIT = 1 << 14;
        /// Query basic info
        const INSPECT = 1 << 15;

        /// Keep same rights on duplicate/replace
        const SAME_RIGHTS = 1 << 31;

        /// Rights every handle normally starts with
        const BASIC = Self::TRANSFER.bits()
            | Self::DUPLICATE.bits()
            | Self::WAIT.bits()
            | Self::INSPECT.bits();

        /// Read and write
        const IO = Self::READ.bits() | Self::WRITE.bits();

        /// Rights of a new channel endpoint (no duplicate)
        const CHANNEL_DEFAULT = Self::TRANSFER.bits()
            | Self::WAIT.bits()
            | Self::INSPECT.bits()
            | Self::IO.bits()
            | Self::SIGNAL.bits()
            | Self::SIGNAL_PEER.bits();

        /// Rights of a new event
        const EVENT_DEFAULT = Self::BASIC.bits() | Self::SIGNAL.bits();

        /// Rights of a new socket endpoint
        const SOCKET_DEFAULT = Self::BASIC.bits()
            | Self::IO.bits()
            | Self::SIGNAL.bits()
            | Self::SIGNAL_PEER.bits();
    }
}

impl Rights {
    /// Require specific rights
    pub fn require(self, required: Self) -> Result<()> {
        if self.contains(required) {
            Ok(())
        } else {
            Err(Status::AccessDenied)
        }
    }

    /// Resolve a requested rights mask against the current rights
    ///
    /// `SAME_RIGHTS` keeps the current rights; otherwise the request must
    /// not add any right the current mask lacks.
    pub fn resolve(self, requested: Self) -> Result<Self> {
        if requested.contains(Self::SAME_RIGHTS) {
            return Ok(self);
        }
        if self.contains(requested) {
            Ok(requested)
        } else {
            Err(Status::InvalidArgs)
        }
    }

    /// Default rights for a new object of the given type
    pub fn default_for_type(obj_type: ObjectType) -> Self {
        match obj_type {
            ObjectType::Channel => Self::CHANNEL_DEFAULT,
            ObjectType::Event => Self::EVENT_DEFAULT,
            ObjectType::Socket => Self::SOCKET_DEFAULT,
            ObjectType::None => Self::empty(),
        }
    }
}

/// ============================================================================
/// Kernel Object Types
/// ============================================================================

/// Kernel object type
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// No object
    None = 0,

    /// Channel endpoint
    Channel = 4,

    /// Event object
    Event = 5,

    /// Stream socket endpoint
    Socket = 14,
}

impl ObjectType {
    /// Create from raw value
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            4 => Self::Channel,
            5 => Self::Event,
            14 => Self::Socket,
            _ => Self::None,
        }
    }

    /// Get raw value
    pub const fn into_raw(self) -> u32 {
        self as u32
    }

    /// Get name as string
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Channel => "channel",
            Self::Event => "event",
            Self::Socket => "socket",
        }
    }
}

/// ============================================================================
/// Kernel Object ID
/// ============================================================================

/// Kernel object identifier, unique for the lifetime of the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Koid(u64);

/// Next koid counter
static NEXT_KOID: AtomicU64 = AtomicU64::new(1);

impl Koid {
    /// Koid of no object
    pub const INVALID: Self = Self(0);

    /// Allocate a fresh koid
    pub(crate) fn alloc() -> Self {
        Self(NEXT_KOID.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate two consecutive koids for a peered pair
    pub(crate) fn alloc_pair() -> (Self, Self) {
        let first = NEXT_KOID.fetch_add(2, Ordering::Relaxed);
        (Self(first), Self(first + 1))
    }

    /// Get raw value
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// ============================================================================
/// Kernel Object Base
/// ============================================================================

/// Kernel object base
///
/// All kernel objects share this common structure. The handle count is
/// distinct from the `Arc` strong count: dispatchers observing an object
/// hold an `Arc` but never a handle.
pub struct KernelObjectBase {
    /// Object identifier
    koid: Koid,

    /// Object type
    obj_type: ObjectType,

    /// Number of live handles
    handle_count: AtomicUsize,

    /// Whether the zero-handles teardown has started
    destroying: AtomicBool,
}

impl KernelObjectBase {
    /// Create a new kernel object base with no handles
    pub fn new(obj_type: ObjectType) -> Self {
        Self::with_koid(Koid::alloc(), obj_type)
    }

    /// Create a base with a preallocated koid
    pub const fn with_koid(koid: Koid, obj_type: ObjectType) -> Self {
        Self {
            koid,
            obj_type,
            handle_count: AtomicUsize::new(0),
            destroying: AtomicBool::new(false),
        }
    }

    /// Object identifier
    pub const fn koid(&self) -> Koid {
        self.koid
    }

    /// Object type
    pub const fn obj_type(&self) -> ObjectType {
        self.obj_type
    }

    /// Increment handle count
    pub fn handle_inc(&self) {
        self.handle_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement handle count
    ///
    /// Returns true if this was the last handle.
    pub fn handle_dec(&self) -> bool {
        self.handle_count.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Get handle count
    pub fn handle_count(&self) -> usize {
        self.handle_count.load(Ordering::Acquire)
    }

    /// Check if object is being destroyed
    pub fn is_destroying(&self) -> bool {
        self.destroying.load(Ordering::Acquire)
    }

    /// Mark object as destroying
    pub fn mark_destroying(&self) {
        self.destroying.store(true, Ordering::Release);
    }
}

/// Behavior shared by every kernel object
pub trait KernelObject: Any + Send + Sync {
    /// Common object state
    fn base(&self) -> &KernelObjectBase;

    /// Signal state of this object
    fn state_tracker(&self) -> &StateTracker;

    /// Koid of the peer, for peered objects
    fn related_koid(&self) -> Koid {
        Koid::INVALID
    }

    /// Signals a handle holder may assert with [`Handle::signal`]
    fn allowed_user_signals(&self) -> Signals {
        Signals::USER_ALL
    }

    /// Teardown after the last handle closed
    ///
    /// Returns capabilities the object still owned (queued packets, etc.).
    /// They are released by the reaper iteratively instead of by nested
    /// destructors.
    fn on_zero_handles(&self) -> Vec<Handle> {
        Vec::new()
    }

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

/// Basic information about a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleBasicInfo {
    /// Object identifier
    pub koid: Koid,

    /// Rights carried by the handle
    pub rights: Rights,

    /// Object type
    pub object_type: ObjectType,

    /// Peer koid for peered objects
    pub related_koid: Koid,
}

/// ============================================================================
/// Handle
/// ============================================================================

/// Handle to a kernel object
///
/// A handle is a capability token that references a kernel object
/// and specifies what operations are permitted on it. It is deliberately
/// not `Clone`: moving it is the only way to give it to someone else.
pub struct Handle {
    /// Referenced object (None for the invalid handle)
    object: Option<Arc<dyn KernelObject>>,

    /// Rights mask
    rights: Rights,
}

impl Handle {
    /// Create a new handle, taking a handle count on `object`
    pub(crate) fn new(object: Arc<dyn KernelObject>, rights: Rights) -> Self {
        object.base().handle_inc();
        Self {
            object: Some(object),
            rights,
        }
    }

    /// The invalid handle
    pub const fn invalid() -> Self {
        Self {
            object: None,
            rights: Rights::empty(),
        }
    }

    /// Check if handle is valid
    pub fn is_valid(&self) -> bool {
        self.object.is_some()
    }

    /// Check if handle is invalid
    pub fn is_invalid(&self) -> bool {
        self.object.is_none()
    }

    /// Get the rights for this handle
    pub fn rights(&self) -> Rights {
        self.rights
    }

    /// Object identifier ([`Koid::INVALID`] for an invalid handle)
    pub fn koid(&self) -> Koid {
        self.object
            .as_ref()
            .map_or(Koid::INVALID, |object| object.base().koid())
    }

    /// Get the object type for this handle
    pub fn object_type(&self) -> ObjectType {
        self.object
            .as_ref()
            .map_or(ObjectType::None, |object| object.base().obj_type())
    }

    /// Referenced object
    pub(crate) fn object(&self) -> Result<&Arc<dyn KernelObject>> {
        self.object.as_ref().ok_or(Status::BadHandle)
    }

    /// Referenced object downcast to its concrete type
    pub(crate) fn object_as<T: KernelObject>(&self) -> Result<&T> {
        self.object()?
            .as_any()
            .downcast_ref::<T>()
            .ok_or(Status::WrongType)
    }

    /// Require specific rights
    pub fn require(&self, required: Rights) -> Result<()> {
        if self.is_invalid() {
            return Err(Status::BadHandle);
        }
        self.rights.require(required)
    }

    /// Check if handle has specific rights
    pub fn has_rights(&self, rights: Rights) -> bool {
        self.is_valid() && self.rights.contains(rights)
    }

    /// Duplicate handle
    ///
    /// Requires [`Rights::DUPLICATE`]. `rights` may only remove rights,
    /// or be [`Rights::SAME_RIGHTS`].
    pub fn duplicate(&self, rights: Rights) -> Result<Self> {
        self.require(Rights::DUPLICATE)?;
        let new_rights = self.rights.resolve(rights)?;
        let object = self.object()?.clone();
        Ok(Self::new(object, new_rights))
    }

    /// Mint a second handle with identical rights
    ///
    /// Kernel-internal: lets the handle table operate on an object without
    /// holding its lock, while still counting as a live handle.
    pub(crate) fn clone_internal(&self) -> Result<Self> {
        let object = self.object()?.clone();
        Ok(Self::new(object, self.rights))
    }

    /// Replace handle with one carrying fewer rights
    ///
    /// The original is consumed whether or not this succeeds.
    pub fn replace(mut self, rights: Rights) -> Result<Self> {
        if self.is_invalid() {
            return Err(Status::BadHandle);
        }
        let new_rights = self.rights.resolve(rights)?;
        self.rights = new_rights;
        Ok(self)
    }

    /// Query basic information
    pub fn basic_info(&self) -> Result<HandleBasicInfo> {
        let object = self.object()?;
        Ok(HandleBasicInfo {
            koid: object.base().koid(),
            rights: self.rights,
            object_type: object.base().obj_type(),
            related_koid: object.related_koid(),
        })
    }

    /// Clear and set user signals on the object
    ///
    /// Requires [`Rights::SIGNAL`].
    pub fn signal(&self, clear: Signals, set: Signals) -> Result<()> {
        self.require(Rights::SIGNAL)?;
        let object = self.object()?;
        let allowed = object.allowed_user_signals();
        if !allowed.contains(clear | set) {
            return Err(Status::InvalidArgs);
        }
        object.state_tracker().update(clear, set).deliver();
        Ok(())
    }

    /// Currently asserted signals
    ///
    /// Requires [`Rights::WAIT`].
    pub fn signals(&self) -> Result<Signals> {
        self.require(Rights::WAIT)?;
        Ok(self.object()?.state_tracker().signals())
    }

    /// Take the handle out, leaving an invalid one behind
    pub fn take(&mut self) -> Self {
        core::mem::replace(self, Self::invalid())
    }

    /// Give up this handle without running the zero-handles teardown
    ///
    /// Returns the object if this was its last handle; the caller (the
    /// reaper) becomes responsible for tearing it down.
    pub(crate) fn release_deferred(mut self) -> Option<Arc<dyn KernelObject>> {
        let object = self.object.take()?;
        if object.base().handle_dec() {
            Some(object)
        } else {
            None
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            if object.base().handle_dec() {
                reaper::release(object);
            }
        }
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("koid", &self.koid().raw())
            .field("type", &self.object_type().name())
            .field("rights", &self.rights)
            .finish()
    }
}

/// ============================================================================
/// Typed Handles
/// ============================================================================

/// A typed wrapper around a [`Handle`]
pub trait HandleBased: Sized {
    /// Wrap a handle
    fn from_handle(handle: Handle) -> Self;

    /// Unwrap into the untyped handle
    fn into_handle(self) -> Handle;

    /// Borrow the untyped handle
    fn as_handle(&self) -> &Handle;

    /// Object identifier
    fn koid(&self) -> Koid {
        self.as_handle().koid()
    }

    /// Duplicate, keeping the wrapper type
    fn duplicate_handle(&self, rights: Rights) -> Result<Self> {
        self.as_handle().duplicate(rights).map(Self::from_handle)
    }

    /// Replace, keeping the wrapper type
    fn replace_handle(self, rights: Rights) -> Result<Self> {
        self.into_handle().replace(rights).map(Self::from_handle)
    }

    /// Query basic information
    fn basic_info(&self) -> Result<HandleBasicInfo> {
        self.as_handle().basic_info()
    }
}

macro_rules! impl_handle_based {
    ($name:ident) => {
        impl $crate::object::handle::HandleBased for $name {
            fn from_handle(handle: $crate::object::handle::Handle) -> Self {
                Self(handle)
            }

            fn into_handle(self) -> $crate::object::handle::Handle {
                self.0
            }

            fn as_handle(&self) -> &$crate::object::handle::Handle {
                &self.0
            }
        }

        impl From<$crate::object::handle::Handle> for $name {
            fn from(handle: $crate::object::handle::Handle) -> Self {
                Self(handle)
            }
        }

        impl From<$name> for $crate::object::handle::Handle {
            fn from(typed: $name) -> Self {
                typed.0
            }
        }
    };
}

pub(crate) use impl_handle_based;

// ============================================================================
// Tests
// ============================================================================
