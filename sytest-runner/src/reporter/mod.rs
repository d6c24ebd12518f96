// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the results of a test run in human and machine-readable formats.
//!
//! The main type here is [`TestReporter`], which is constructed via a [`TestReporterBuilder`].

mod aggregator;
mod artifacts;
mod displayer;
mod events;
pub mod structured;
mod timings;

pub use aggregator::*;
pub use artifacts::ArtifactWriter;
pub use displayer::*;
pub use events::*;
pub use timings::*;
