// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Integration Tests
//!
//! This module contains integration tests for the IPC core.
//! These tests verify that channels, the wire format, the event loop and
//! the bindings work together correctly.

mod channel_tests;
mod binding_tests;
