// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `sytest` command-line interface.
//!
//! This crate is a thin front end over `sytest-runner`: it parses arguments, sets up logging,
//! and maps failures to documented exit codes.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputWriter, StderrStyles};
