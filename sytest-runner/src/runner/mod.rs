// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`]. Each test is run through each selected
//! pipeline: setup stages in order, then the produced program. Every stage runs as a subprocess in
//! its own process group, under its own deadline.

mod executor;
mod imp;

#[cfg(unix)]
#[path = "unix.rs"]
mod os;

#[cfg(windows)]
#[path = "windows.rs"]
mod os;

pub use executor::{StageResult, StageStatus};
pub use imp::*;
