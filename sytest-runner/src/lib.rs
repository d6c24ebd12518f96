// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for sytest, a golden-output test harness for compiler toolchains.
//!
//! The basic flow is:
//!
//! 1. Load a [`HarnessConfig`](config::HarnessConfig) and select its pipelines.
//! 2. Discover tests into a [`TestList`](test_list::TestList).
//! 3. Run every test through every pipeline with a [`TestRunner`](runner::TestRunner), feeding
//!    events to a [`TestReporter`](reporter::TestReporter).
//! 4. In performance mode, compare timings against the baseline with a
//!    [`PerformanceTracker`](perf::PerformanceTracker).

pub mod config;
pub mod errors;
pub mod exit_codes;
mod helpers;
pub mod normalize;
pub mod outcome;
pub mod perf;
pub mod reporter;
pub mod runner;
pub mod test_list;
mod time;
pub mod timer;
