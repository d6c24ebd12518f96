// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for sytest.
//!
//! Configuration is read from a built-in default layered under an optional `sytest.toml`. It
//! describes how tests are discovered, how long they may run, and the named pipelines of stages
//! that turn a test source into an executable artifact.

mod core;
mod pipeline;
mod test_threads;

pub use self::core::*;
pub use pipeline::*;
pub use test_threads::*;
