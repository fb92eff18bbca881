// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Peered Object Sides
//!
//! Channels and sockets are created as a pair of endpoints sharing one
//! piece of state. [`Side`] names an endpoint and [`Sided`] stores one
//! value per endpoint, indexed by side.

use core::ops::{Index, IndexMut};

/// One endpoint of a peered pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The other endpoint
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// A value per side
#[derive(Debug, Default)]
pub struct Sided<T> {
    left: T,
    right: T,
}

impl<T> Sided<T> {
    /// Create from both values
    pub const fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    /// Borrow both sides mutably, `side` first
    pub fn split_mut(&mut self, side: Side) -> (&mut T, &mut T) {
        match side {
            Side::Left => (&mut self.left, &mut self.right),
            Side::Right => (&mut self.right, &mut self.left),
        }
    }
}

impl<T> Index<Side> for Sided<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl<T> IndexMut<Side> for Sided<T> {
    fn index_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
