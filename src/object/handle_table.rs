// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle Table
//!
//! A process names its capabilities by raw `u32` values. The table maps
//! those values to owned [`Handle`]s; closing a value drops the handle.
//!
//! # Design
//!
//! - **Fixed capacity**: [`MAX_HANDLES`] slots; value 0 is never used
//! - **Atomic transfer**: [`HandleTable::write_channel`] removes every
//!   transferred value under one lock, so they are gone from the table
//!   whether the write succeeds or fails
//! - **Lock scope**: Channel operations run with the table lock dropped,
//!   on an internal handle minted for the duration of the call

use alloc::vec::Vec;
use crate::object::channel::Channel;
use crate::object::handle::{Handle, HandleBasicInfo, HandleBased, ObjectType, Rights};
use crate::sync::SpinMutex;
use crate::status::{Result, Status};

/// Maximum handles per process
pub const MAX_HANDLES: usize = 256;

/// Raw handle value that never names a handle
pub const HANDLE_INVALID: u32 = 0;

/// Table slots, reachable only with the table lock held
struct TableState {
    slots: Vec<Option<Handle>>,
    count: usize,
}

impl TableState {
    fn slot_index(raw: u32) -> Result<usize> {
        let index = (raw as usize).checked_sub(1).ok_or(Status::BadHandle)?;
        if index >= MAX_HANDLES {
            return Err(Status::BadHandle);
        }
        Ok(index)
    }

    fn get(&self, raw: u32) -> Result<&Handle> {
        let index = Self::slot_index(raw)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(Status::BadHandle)
    }

    fn take(&mut self, raw: u32) -> Result<Handle> {
        let index = Self::slot_index(raw)?;
        let handle = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(Status::BadHandle)?;
        self.count -= 1;
        Ok(handle)
    }

    fn insert(&mut self, handle: Handle) -> core::result::Result<u32, Handle> {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(handle);
                self.count += 1;
                Ok(index as u32 + 1)
            }
            None => Err(handle),
        }
    }

    fn free(&self) -> usize {
        MAX_HANDLES - self.count
    }
}

/// Handle table
///
/// Manages handles for a process.
pub struct HandleTable {
    state: SpinMutex<TableState>,
}

impl HandleTable {
    /// Create a new, empty handle table
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_HANDLES);
        slots.resize_with(MAX_HANDLES, || None);
        Self {
            state: SpinMutex::new(TableState { slots, count: 0 }),
        }
    }

    /// Add a handle to the table
    ///
    /// # Returns
    ///
    /// The raw value naming it, or `NoResources` if the table is full (the
    /// handle is closed in that case).
    pub fn add(&self, handle: Handle) -> Result<u32> {
        if handle.is_invalid() {
            return Err(Status::BadHandle);
        }
        let rejected = {
            let mut state = self.state.lock();
            match state.insert(handle) {
                Ok(raw) => return Ok(raw),
                Err(handle) => handle,
            }
        };
        drop(rejected);
        Err(Status::NoResources)
    }

    /// Query basic information about a raw value
    pub fn get_info(&self, raw: u32) -> Result<HandleBasicInfo> {
        self.state.lock().get(raw)?.basic_info()
    }

    /// Remove a handle from the table without closing it
    pub fn remove(&self, raw: u32) -> Result<Handle> {
        self.state.lock().take(raw)
    }

    /// Close a raw value
    pub fn close(&self, raw: u32) -> Result<()> {
        let handle = self.remove(raw)?;
        drop(handle);
        Ok(())
    }

    /// Duplicate a handle in the table
    pub fn duplicate(&self, raw: u32, rights: Rights) -> Result<u32> {
        let copy = self.state.lock().get(raw)?.duplicate(rights)?;
        self.add(copy)
    }

    /// Replace a handle with one carrying fewer rights
    ///
    /// The original value is invalid afterwards, even on failure.
    pub fn replace(&self, raw: u32, rights: Rights) -> Result<u32> {
        let handle = self.remove(raw)?;
        let replaced = handle.replace(rights)?;
        self.add(replaced)
    }

    /// Remove several handles under one lock
    ///
    /// If any value is missing or repeated, every valid value is still
    /// removed (and closed) and `BadHandle` is returned.
    pub fn take_all(&self, raws: &[u32]) -> Result<Vec<Handle>> {
        let (taken, failed) = {
            let mut state = self.state.lock();
            let mut taken = Vec::with_capacity(raws.len());
            let mut failed = false;
            for &raw in raws {
                match state.take(raw) {
                    Ok(handle) => taken.push(handle),
                    Err(_) => failed = true,
                }
            }
            (taken, failed)
        };
        if failed {
            drop(taken);
            return Err(Status::BadHandle);
        }
        Ok(taken)
    }

    /// Mint an internal channel handle for `raw`
    fn channel(&self, raw: u32) -> Result<Channel> {
        let state = self.state.lock();
        let handle = state.get(raw)?;
        if handle.object_type() != ObjectType::Channel {
            return Err(Status::WrongType);
        }
        handle.clone_internal().map(Channel::from_handle)
    }

    /// Write a message, transferring handles named by raw values
    ///
    /// Every value in `handles` is removed from the table before the write
    /// is attempted.
    pub fn write_channel(&self, raw: u32, data: &[u8], handles: &[u32]) -> Result<()> {
        if handles.contains(&raw) {
            let consumed = self.take_all(handles);
            drop(consumed);
            return Err(Status::NotSupported);
        }
        let transferred = self.take_all(handles)?;
        let channel = match self.channel(raw) {
            Ok(channel) => channel,
            Err(status) => {
                drop(transferred);
                return Err(status);
            }
        };
        channel.write(data, transferred)
    }

    /// Read a message, installing received handles in the table
    ///
    /// Fails with `NoResources` (leaving the message queued) if the table
    /// cannot hold every received handle.
    pub fn read_channel(&self, raw: u32) -> Result<(Vec<u8>, Vec<u32>)> {
        let channel = self.channel(raw)?;
        let ticket = channel.begin_read()?;
        if self.state.lock().free() < ticket.handle_count {
            return Err(Status::NoResources);
        }
        let (data, handles) = channel.accept_read(ticket)?.into_parts();

        let mut values = Vec::with_capacity(handles.len());
        let mut overflow = Vec::new();
        {
            let mut state = self.state.lock();
            for handle in handles {
                match state.insert(handle) {
                    Ok(value) => values.push(value),
                    Err(handle) => overflow.push(handle),
                }
            }
        }
        if !overflow.is_empty() {
            log::warn!(
                "handle table filled during read; closing {} received handles",
                overflow.len()
            );
        }
        drop(overflow);
        Ok((data, values))
    }

    /// Get handle count
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Check if handle table is full
    pub fn is_full(&self) -> bool {
        self.count() >= MAX_HANDLES
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
