// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Machine-readable run reports.

use super::AggregateReport;
use crate::{errors::WriteEventError, perf::Comparison, test_list::SerializableFormat};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::{io::Write, time::Duration};

/// A serialized run report.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunReport<'a> {
    /// When the run started.
    pub started_at: DateTime<FixedOffset>,

    /// How long the run took.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,

    /// The aggregated outcomes.
    #[serde(flatten)]
    pub report: &'a AggregateReport,

    /// Timing comparisons against the baseline, by pipeline. Empty outside performance mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub performance: Vec<PipelineComparisons<'a>>,
}

/// Timing comparisons for one pipeline.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineComparisons<'a> {
    /// The pipeline.
    pub pipeline: &'a str,

    /// One entry per timed test.
    pub comparisons: &'a [Comparison],
}

impl RunReport<'_> {
    /// Writes the report to `writer`, followed by a newline.
    pub fn write(
        &self,
        format: SerializableFormat,
        mut writer: impl Write,
    ) -> Result<(), WriteEventError> {
        format
            .to_writer(self, &mut writer)
            .map_err(WriteEventError::Json)?;
        writeln!(writer)?;
        Ok(())
    }
}
