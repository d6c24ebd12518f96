// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out and aggregates test execution statuses.
//!
//! The main structure in this module is [`TestReporter`].

use super::{AggregateReport, ArtifactWriter, ComparisonTable, HarnessEvent, write_perf_table};
use crate::{
    config::Pipeline,
    errors::WriteEventError,
    outcome::Outcome,
    perf::PerformanceTracker,
    runner::PipelineExecution,
    test_list::{TestCase, TestList},
};
use camino::Utf8PathBuf;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use owo_colors::{OwoColorize, Style};
use std::{
    fmt,
    io::{self, BufWriter, Write},
    time::Duration,
};
use swrite::{SWrite, swriteln};
use tracing::warn;

/// Standard error destination for the reporter.
///
/// This is usually a terminal, but can be an in-memory buffer for tests.
pub enum ReporterStderr<'a> {
    /// Produce output on the (possibly piped) terminal.
    ///
    /// If the terminal isn't piped, produce output to a progress bar.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct TestReporterBuilder {
    hide_progress_bar: bool,
    verbose: bool,
    output_dir: Option<Utf8PathBuf>,
}

impl TestReporterBuilder {
    /// Hides the progress bar even on a terminal.
    pub fn set_hide_progress_bar(&mut self, hide_progress_bar: bool) -> &mut Self {
        self.hide_progress_bar = hide_progress_bar;
        self
    }

    /// Prints a status line for every test, and the full stderr of failing stages.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Writes diagnostic artifacts for failing tests to this directory.
    pub fn set_output_dir(&mut self, output_dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Creates a new test reporter.
    pub fn build<'a>(
        &self,
        test_list: &TestList,
        pipelines: &[Pipeline],
        output: ReporterStderr<'a>,
    ) -> TestReporter<'a> {
        let styles = Box::new(Styles::default());
        let job_count = test_list.len() * pipelines.len();

        let stderr = match output {
            ReporterStderr::Terminal if is_ci::uncached() => {
                // Some CI environments appear to pretend to be a terminal. Disable the progress bar
                // in these environments.
                ReporterStderrImpl::TerminalWithoutBar
            }
            ReporterStderr::Terminal if self.hide_progress_bar => {
                ReporterStderrImpl::TerminalWithoutBar
            }
            ReporterStderr::Terminal => {
                let progress_bar = ProgressBar::new(job_count as u64);
                let count_width = format!("{job_count}").len();
                // {{foo}} is passed into the ProgressBar, while {count_width} is inserted by
                // format!().
                let template = format!(
                    "{{prefix:>12}} [{{elapsed_precise:>9}}] [{{wide_bar}}] \
                    {{pos:>{count_width}}}/{{len:{count_width}}}: {{msg}}     "
                );
                progress_bar.set_style(
                    ProgressStyle::default_bar()
                        .progress_chars("=> ")
                        .template(&template)
                        .expect("template is known to be valid"),
                );
                // set_draw_target must be called before enable_steady_tick to avoid a spurious
                // extra line from being printed as the draw target changes.
                progress_bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
                progress_bar.enable_steady_tick(Duration::from_millis(100));
                ReporterStderrImpl::TerminalWithBar(progress_bar)
            }
            ReporterStderr::Buffer(buf) => ReporterStderrImpl::Buffer(buf),
        };

        let show_pass_lines =
            self.verbose || !matches!(stderr, ReporterStderrImpl::TerminalWithBar(_));
        let artifacts = match (&self.output_dir, pipelines.first()) {
            (Some(output_dir), Some(first)) => Some(ArtifactWriter::new(output_dir, first.name())),
            _ => None,
        };

        TestReporter {
            inner: TestReporterImpl {
                show_pass_lines,
                verbose: self.verbose,
                show_pipeline: pipelines.len() > 1,
                styles,
            },
            stderr,
            artifacts,
        }
    }
}

enum ReporterStderrImpl<'a> {
    TerminalWithBar(ProgressBar),
    TerminalWithoutBar,
    Buffer(&'a mut Vec<u8>),
}

impl ReporterStderrImpl<'_> {
    fn finish_and_clear_bar(&self) {
        match self {
            ReporterStderrImpl::TerminalWithBar(bar) => {
                bar.finish_and_clear();
            }
            ReporterStderrImpl::TerminalWithoutBar | ReporterStderrImpl::Buffer(_) => {}
        }
    }
}

/// Functionality to report test results to stderr and write diagnostic artifacts.
pub struct TestReporter<'a> {
    inner: TestReporterImpl,
    stderr: ReporterStderrImpl<'a>,
    artifacts: Option<ArtifactWriter>,
}

impl<'a> TestReporter<'a> {
    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.inner.styles.colorize();
    }

    /// Report a test event.
    pub fn report_event(&mut self, event: HarnessEvent<'a>) -> Result<(), WriteEventError> {
        if let HarnessEvent::TestFinished {
            case,
            pipeline,
            execution,
        } = &event
        {
            self.write_artifacts(case, pipeline, execution);
        }

        self.write_event(event)
    }

    /// Writes the timing of every passing test, compared against the baseline.
    ///
    /// If more than one pipeline was run, a comparison table across pipelines follows.
    pub fn report_performance(
        &mut self,
        tracker: &PerformanceTracker,
    ) -> Result<(), WriteEventError> {
        let inner = &self.inner;
        self.stderr.write_with(|writer| {
            let comparisons = tracker.comparisons();
            for (pipeline, comparisons) in &comparisons {
                writeln!(
                    writer,
                    "{:>12} {} ({} samples)",
                    "Timings".style(inner.styles.pass),
                    pipeline.style(inner.styles.pipeline),
                    comparisons.len().style(inner.styles.count),
                )?;
                write_perf_table(comparisons, &mut *writer)?;
            }

            if comparisons.len() > 1 {
                let table = ComparisonTable::new(tracker.samples());
                if !table.is_empty() {
                    writeln!(writer, "{:>12}", "Comparison".style(inner.styles.pass))?;
                    table.write_text(&mut *writer)?;
                }
            }
            Ok(())
        })
    }

    /// Mark the reporter done.
    pub fn finish(&mut self) {
        self.stderr.finish_and_clear_bar();
    }

    // ---
    // Helper methods
    // ---

    fn write_artifacts(
        &mut self,
        case: &TestCase,
        pipeline: &Pipeline,
        execution: &PipelineExecution,
    ) {
        if let Some(artifacts) = &mut self.artifacts {
            // Artifacts are best-effort: failing to write one doesn't change any outcome.
            if let Err(error) = artifacts.write(case, pipeline.name(), execution) {
                warn!("{error}: {}", error_source(&error));
            }
        }
    }

    fn write_event(&mut self, event: HarnessEvent<'a>) -> Result<(), WriteEventError> {
        let inner = &self.inner;
        self.stderr
            .write_with(|writer| inner.write_event_impl(&event, writer))?;

        if let ReporterStderrImpl::TerminalWithBar(progress_bar) = &self.stderr {
            update_progress_bar(&event, &self.inner.styles, progress_bar);
        }
        Ok(())
    }
}

impl fmt::Debug for TestReporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TestReporter")
            .field("stderr", &"BufferWriter { .. }")
            .field("artifacts", &self.artifacts)
            .finish()
    }
}

impl ReporterStderrImpl<'_> {
    fn write_with(
        &mut self,
        f: impl FnOnce(&mut dyn Write) -> io::Result<()>,
    ) -> Result<(), WriteEventError> {
        match self {
            ReporterStderrImpl::TerminalWithBar(progress_bar) => {
                // Write to a string that will be printed as a log line.
                let mut buf: Vec<u8> = Vec::new();
                f(&mut buf).map_err(WriteEventError::Io)?;
                // ProgressBar::println doesn't print status lines if the bar is hidden. The suspend
                // method prints it in both cases.
                progress_bar.suspend(|| {
                    _ = std::io::stderr().write_all(&buf);
                });
            }
            ReporterStderrImpl::TerminalWithoutBar => {
                let mut writer = BufWriter::new(std::io::stderr());
                f(&mut writer).map_err(WriteEventError::Io)?;
                writer.flush().map_err(WriteEventError::Io)?;
            }
            ReporterStderrImpl::Buffer(buf) => {
                f(&mut **buf).map_err(WriteEventError::Io)?;
            }
        }
        Ok(())
    }
}

struct TestReporterImpl {
    show_pass_lines: bool,
    verbose: bool,
    show_pipeline: bool,
    styles: Box<Styles>,
}

impl TestReporterImpl {
    fn write_event_impl(&self, event: &HarnessEvent<'_>, writer: &mut dyn Write) -> io::Result<()> {
        match event {
            HarnessEvent::RunStarted {
                test_list,
                pipelines,
                ..
            } => {
                write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;

                let count_style = self.styles.count;
                write!(
                    writer,
                    "{} tests across {} {} ({})",
                    test_list.len().style(count_style),
                    pipelines.len().style(count_style),
                    if pipelines.len() == 1 {
                        "pipeline"
                    } else {
                        "pipelines"
                    },
                    pipelines
                        .iter()
                        .map(|pipeline| pipeline.name())
                        .join(", ")
                        .style(self.styles.pipeline),
                )?;

                let skip_count = test_list.issues().len();
                if skip_count > 0 {
                    write!(writer, " ({} skipped)", skip_count.style(count_style))?;
                }

                writeln!(writer)?;
            }
            HarnessEvent::TestStarted { .. } => {}
            HarnessEvent::TestFinished {
                case,
                pipeline,
                execution,
            } => {
                let outcome = &execution.outcome;
                if outcome.is_pass() && !self.show_pass_lines {
                    return Ok(());
                }

                self.write_status_line(outcome, execution.time_taken, case, pipeline, writer)?;
                if !outcome.is_pass() {
                    write_indented(&self.outcome_details(outcome), writer)?;
                    if self.verbose {
                        self.write_stage_stderr(execution, writer)?;
                    }
                }
            }
            HarnessEvent::RunFinished {
                elapsed, report, ..
            } => {
                self.write_summary(*elapsed, report, writer)?;
            }
        }

        Ok(())
    }

    fn write_status_line(
        &self,
        outcome: &Outcome,
        time_taken: Duration,
        case: &TestCase,
        pipeline: &Pipeline,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let style = self.outcome_style(outcome);
        write!(writer, "{:>12} ", outcome.label().style(style))?;
        self.write_duration(time_taken, writer)?;
        write!(writer, "{}", case.path().style(self.styles.path))?;
        if self.show_pipeline {
            write!(writer, " [{}]", pipeline.name().style(self.styles.pipeline))?;
        }
        if let Outcome::Pass {
            elapsed: Some(elapsed),
        } = outcome
        {
            write!(writer, " (timer: {elapsed:.6}s)")?;
        }
        writeln!(writer)
    }

    fn write_duration(&self, duration: Duration, writer: &mut dyn Write) -> io::Result<()> {
        // * > means right-align.
        // * 8 is the number of characters to pad to.
        // * .3 means print three digits after the decimal point.
        write!(writer, "[{:>8.3?}s] ", duration.as_secs_f64())
    }

    fn write_summary(
        &self,
        elapsed: Duration,
        report: &AggregateReport,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let summary_style = if report.is_success() {
            self.styles.pass
        } else {
            self.styles.fail
        };
        write!(writer, "------------\n{:>12} ", "Summary".style(summary_style))?;
        self.write_duration(elapsed, writer)?;

        write!(
            writer,
            "{} {} run: {} {}",
            report.tested.style(self.styles.count),
            if report.tested == 1 { "test" } else { "tests" },
            report.passed.style(self.styles.count),
            "passed".style(self.styles.pass),
        )?;
        if report.failed() > 0 {
            write!(
                writer,
                ", {} {}",
                report.failed().style(self.styles.count),
                "failed".style(self.styles.fail),
            )?;
        }
        if !report.discovery_issues.is_empty() {
            write!(
                writer,
                ", {} {}",
                report.discovery_issues.len().style(self.styles.count),
                "skipped".style(self.styles.skip),
            )?;
        }
        writeln!(writer)?;

        for failure in &report.failures {
            let style = self.outcome_style(&failure.outcome);
            write!(
                writer,
                "{:>12} {}",
                failure.outcome.label().style(style),
                failure.path.style(self.styles.path),
            )?;
            if self.show_pipeline {
                write!(writer, " [{}]", failure.pipeline.style(self.styles.pipeline))?;
            }
            writeln!(writer, ": {}", failure.outcome.kind())?;
            write_indented(&self.outcome_details(&failure.outcome), writer)?;
        }

        for issue in &report.discovery_issues {
            writeln!(writer, "{:>12} {issue}", "SKIP".style(self.styles.skip))?;
        }

        Ok(())
    }

    fn write_stage_stderr(
        &self,
        execution: &PipelineExecution,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let stderrs = execution
            .stages
            .iter()
            .map(|stage| (stage.name.as_str(), &stage.result.stderr[..]))
            .chain(execution.run.iter().map(|run| ("run", &run.stderr[..])));

        for (name, stderr) in stderrs {
            if stderr.is_empty() {
                continue;
            }
            writeln!(
                writer,
                "{}{}{}",
                "--- STDERR: ".style(self.styles.fail),
                name,
                " ---".style(self.styles.fail),
            )?;
            writer.write_all(stderr)?;
            if !stderr.ends_with(b"\n") {
                writeln!(writer)?;
            }
        }
        Ok(())
    }

    fn outcome_details(&self, outcome: &Outcome) -> String {
        let mut out = String::new();
        match outcome {
            Outcome::Pass { .. } => {}
            Outcome::CompileError {
                stage,
                description,
                stderr,
                ..
            }
            | Outcome::LinkError {
                stage,
                description,
                stderr,
                ..
            } => {
                swriteln!(out, "stage `{stage}` {description}");
                if !stderr.is_empty() {
                    swriteln!(out, "stderr:");
                    swriteln!(out, "{}", stderr.trim_end());
                }
            }
            Outcome::CompilerTimeout { stage, timeout } => {
                swriteln!(
                    out,
                    "stage `{stage}` timed out after {}",
                    humantime::format_duration(*timeout)
                );
            }
            Outcome::RuntimeTimeout { got } => {
                swriteln!(out, "program timed out");
                if !got.is_empty() {
                    swriteln!(out, "output before timeout:");
                    swriteln!(out, "{}", got.trim_end());
                }
            }
            Outcome::RuntimeError {
                description, got, ..
            } => {
                swriteln!(out, "program {description}");
                if !got.is_empty() {
                    swriteln!(out, "output:");
                    swriteln!(out, "{}", got.trim_end());
                }
            }
            Outcome::OutputMismatch { expected, got } => {
                swriteln!(out, "expected:");
                swriteln!(out, "{expected}");
                swriteln!(out, "got:");
                swriteln!(out, "{got}");
            }
            Outcome::ReturnCodeMismatch { expected, got } => {
                swriteln!(out, "expected return code {expected}, got {got}");
            }
        }
        out
    }

    fn outcome_style(&self, outcome: &Outcome) -> Style {
        if outcome.is_pass() {
            self.styles.pass
        } else {
            self.styles.fail
        }
    }
}

fn write_indented(text: &str, writer: &mut dyn Write) -> io::Result<()> {
    for line in text.lines() {
        if line.is_empty() {
            writeln!(writer)?;
        } else {
            writeln!(writer, "    {line}")?;
        }
    }
    Ok(())
}

fn update_progress_bar(event: &HarnessEvent<'_>, styles: &Styles, progress_bar: &ProgressBar) {
    match event {
        HarnessEvent::RunStarted { .. } => {
            progress_bar.set_prefix(format!("{:>12}", "Running".style(styles.pass)));
        }
        HarnessEvent::TestStarted { case, .. } => {
            progress_bar.set_message(case.path().to_string());
        }
        HarnessEvent::TestFinished { .. } => {
            progress_bar.inc(1);
        }
        HarnessEvent::RunFinished { .. } => {}
    }
}

fn error_source(error: &dyn std::error::Error) -> String {
    error
        .source()
        .map_or_else(String::new, |source| source.to_string())
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    path: Style,
    pipeline: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.path = Style::new().bold();
        self.pipeline = Style::new().blue().bold();
    }
}
