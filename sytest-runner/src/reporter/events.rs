// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events produced by the test runner.

use super::AggregateReport;
use crate::{
    config::Pipeline,
    runner::PipelineExecution,
    test_list::{TestCase, TestList},
};
use chrono::{DateTime, Local};
use std::time::Duration;

/// A test event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and consumed by a
/// [`TestReporter`](super::TestReporter).
#[derive(Clone, Debug)]
pub enum HarnessEvent<'a> {
    /// The test run started.
    RunStarted {
        /// The tests that will be run.
        test_list: &'a TestList,

        /// The pipelines each test will be run through.
        pipelines: &'a [Pipeline],

        /// When the run started.
        start_time: DateTime<Local>,
    },

    /// A test started running through a pipeline.
    TestStarted {
        /// The test case.
        case: &'a TestCase,

        /// The pipeline.
        pipeline: &'a Pipeline,
    },

    /// A test finished running through a pipeline.
    TestFinished {
        /// The test case.
        case: &'a TestCase,

        /// The pipeline.
        pipeline: &'a Pipeline,

        /// Everything that happened, including captured output.
        execution: PipelineExecution,
    },

    /// The test run finished.
    RunFinished {
        /// When the run started.
        start_time: DateTime<Local>,

        /// How long the run took.
        elapsed: Duration,

        /// The aggregated results, in discovery order.
        report: AggregateReport,
    },
}
