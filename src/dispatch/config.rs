// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Loop configuration

/// Default number of handlers dispatched per lock acquisition
pub const DEFAULT_MAX_READY_PER_RUN: usize = 16;

/// Configuration of a [`super::Loop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Name used in log messages
    pub name: &'static str,

    /// Most ready handlers taken off the queue in one batch
    ///
    /// Quit and shutdown are observed between batches. Zero is treated
    /// as one.
    pub max_ready_per_run: usize,
}

impl LoopConfig {
    /// Default configuration with a name
    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            max_ready_per_run: DEFAULT_MAX_READY_PER_RUN,
        }
    }

    /// Batch size actually used
    pub(crate) fn batch(&self) -> usize {
        self.max_ready_per_run.max(1)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::named("loop")
    }
}
