// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that drive real subprocesses through the public API.

#![cfg(unix)]

mod basic;
mod fixtures;
mod performance;
