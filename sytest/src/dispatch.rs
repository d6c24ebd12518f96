// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use std::{
    fs::File,
    io::{BufWriter, Write},
    time::Duration,
};
use sytest_runner::{
    config::{HarnessConfig, TestThreads, ToolPaths},
    errors::{WriteEventError, WriteTestListError},
    exit_codes::SytestExitCode,
    perf::PerformanceTracker,
    reporter::{
        ComparisonTable, TestReporterBuilder,
        structured::{PipelineComparisons, RunReport},
    },
    runner::TestRunnerBuilder,
    test_list::{DiscoveryOptions, OutputFormat, SerializableFormat, TestList},
};
use tracing::warn;

/// A golden-output test harness for compiler toolchains.
///
/// Each test is a source file compiled by the compiler under test, linked against a runtime
/// library, and run; its stdout and exit code are compared against a golden `.out` file.
#[derive(Debug, Parser)]
#[command(
    version,
    bin_name = "sytest",
    styles = clap_styles::style(),
    max_term_width = 100
)]
pub struct SytestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl SytestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(output, output_writer),
            Command::List(opts) => opts.exec(output, output_writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile, link and run tests, comparing their output against golden files
    Run(Box<RunOpts>),

    /// List the tests that would be run
    List(ListOpts),
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: sytest.toml in the current directory]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, base_dir: &Utf8Path) -> Result<HarnessConfig> {
        let config = HarnessConfig::from_sources(base_dir, self.config_file.as_deref())?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    /// The compiler under test
    #[arg(value_name = "COMPILER")]
    compiler: Utf8PathBuf,

    /// The runtime library linked into each test binary
    #[arg(value_name = "LINK_LIB")]
    link_lib: Utf8PathBuf,

    /// Directory containing the tests
    #[arg(value_name = "TEST_PATH")]
    test_path: Utf8PathBuf,

    /// Recurse into sub-directories
    #[arg(long, short)]
    recursive: bool,

    /// Run-stage timeout in seconds, fractions allowed [default: from config]
    #[arg(long, short, value_name = "SECS", value_parser = positive_secs)]
    timeout: Option<Duration>,

    /// Record timing and compare with the baseline
    #[arg(long = "performance", short = 'z')]
    performance: bool,

    /// Pipeline(s) to run [default: run.default-pipeline from config]
    #[arg(long, short, value_name = "NAME")]
    pipeline: Vec<String>,

    /// Runtime library source, used by reference pipelines
    #[arg(long, value_name = "PATH")]
    c_lib: Option<Utf8PathBuf>,

    /// Number of tests to run simultaneously [default: logical CPU count]
    #[arg(
        long,
        short = 'j',
        value_name = "N",
        allow_negative_numbers = true,
        env = "SYTEST_TEST_THREADS"
    )]
    test_threads: Option<TestThreads>,

    /// Diagnostic artifact directory [default: run.output-dir from config]
    #[arg(long, value_name = "DIR")]
    output_dir: Option<Utf8PathBuf>,

    /// Baseline directory [default: run.baseline-dir from config]
    #[arg(long, value_name = "DIR")]
    baseline_dir: Option<Utf8PathBuf>,

    /// Write the comparison table across pipelines as CSV
    #[arg(long, value_name = "FILE", requires = "performance")]
    csv: Option<Utf8PathBuf>,

    /// Output format for the run report
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormatOpt,

    /// Do not display the progress bar
    #[arg(long, env = "SYTEST_HIDE_PROGRESS_BAR", value_parser = BoolishValueParser::new())]
    hide_progress_bar: bool,

    #[clap(flatten)]
    config_opts: ConfigOpts,
}

impl RunOpts {
    fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let base_dir = current_dir()?;
        let config = self.config_opts.make_config(&base_dir)?;
        let pipelines = config.pipelines(self.pipeline.as_slice())?;

        let discovery = DiscoveryOptions {
            recursive: self.recursive,
            extension: config.extension().to_owned(),
        };
        let test_list = TestList::discover(&self.test_path, &discovery)?;

        let tools = ToolPaths {
            compiler: self.compiler,
            link_lib: self.link_lib,
            c_lib: self.c_lib,
        };

        let mut tracker = if self.performance {
            let baseline_dir = self
                .baseline_dir
                .map_or_else(|| config.baseline_dir(), |dir| base_dir.join(dir));
            let (tracker, errors) = PerformanceTracker::load(baseline_dir, &pipelines);
            for error in errors {
                warn!("{error}, comparing against an empty baseline");
            }
            Some(tracker)
        } else {
            None
        };

        let output_dir = self
            .output_dir
            .map_or_else(|| config.output_dir(), |dir| base_dir.join(dir));

        let mut runner_builder = TestRunnerBuilder::default();
        runner_builder.set_performance(self.performance);
        if let Some(test_threads) = self.test_threads {
            runner_builder.set_test_threads(test_threads);
        }
        if let Some(timeout) = self.timeout {
            runner_builder.set_run_timeout(timeout);
        }
        let runner = runner_builder.build(&test_list, &config, &pipelines, &tools)?;

        let (mut stdout, stderr) = output_writer.split();

        let mut reporter_builder = TestReporterBuilder::default();
        reporter_builder
            .set_verbose(output.verbose)
            .set_hide_progress_bar(self.hide_progress_bar)
            .set_output_dir(output_dir);
        let mut reporter = reporter_builder.build(&test_list, &pipelines, stderr);
        if output.color.should_colorize(supports_color::Stream::Stderr) {
            reporter.colorize();
        }

        let run_results = runner.try_execute(|event| reporter.report_event(event))?;
        reporter.finish();

        if let Some(tracker) = &mut tracker {
            tracker.record_results(&test_list, &run_results);
            reporter.report_performance(tracker)?;

            if let Some(csv) = &self.csv {
                write_csv(csv, &ComparisonTable::new(tracker.samples()))?;
            }

            if let Err(error) = tracker.persist() {
                warn!("{error}, baseline not updated");
            }
        }

        if let Some(format) = self.message_format.to_serializable() {
            let comparisons = tracker
                .as_ref()
                .map(PerformanceTracker::comparisons)
                .unwrap_or_default();
            let run_report = RunReport {
                started_at: run_results.start_time.fixed_offset(),
                elapsed: run_results.elapsed,
                report: &run_results.report,
                performance: comparisons
                    .iter()
                    .map(|(pipeline, comparisons)| PipelineComparisons {
                        pipeline,
                        comparisons,
                    })
                    .collect(),
            };
            run_report.write(format, &mut stdout)?;
            stdout.flush().map_err(WriteEventError::Io)?;
        }

        if run_results.is_success() {
            Ok(SytestExitCode::OK)
        } else {
            Err(ExpectedError::test_run_failed())
        }
    }
}

#[derive(Debug, Args)]
struct ListOpts {
    /// Directory containing the tests
    #[arg(value_name = "TEST_PATH")]
    test_path: Utf8PathBuf,

    /// Recurse into sub-directories
    #[arg(long, short)]
    recursive: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormatOpt,

    #[clap(flatten)]
    config_opts: ConfigOpts,
}

impl ListOpts {
    fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let base_dir = current_dir()?;
        let config = self.config_opts.make_config(&base_dir)?;

        let discovery = DiscoveryOptions {
            recursive: self.recursive,
            extension: config.extension().to_owned(),
        };
        let test_list = TestList::discover(&self.test_path, &discovery)?;

        let format = match self.message_format.to_serializable() {
            Some(format) => OutputFormat::Serializable(format),
            None => OutputFormat::Human {
                verbose: output.verbose,
            },
        };
        let colorize = output.color.should_colorize(supports_color::Stream::Stdout);

        let mut writer = output_writer.stdout_writer();
        test_list.write(format, &mut writer, colorize)?;
        writer.flush().map_err(WriteTestListError::Io)?;
        Ok(SytestExitCode::OK)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormatOpt {
    /// Human-readable output on stderr
    #[default]
    Human,
    /// A JSON report on stdout
    Json,
    /// A pretty-printed JSON report on stdout
    JsonPretty,
}

impl MessageFormatOpt {
    fn to_serializable(self) -> Option<SerializableFormat> {
        match self {
            Self::Human => None,
            Self::Json => Some(SerializableFormat::Json),
            Self::JsonPretty => Some(SerializableFormat::JsonPretty),
        }
    }
}

fn positive_secs(input: &str) -> std::result::Result<Duration, String> {
    let secs = input.parse::<f64>().map_err(|error| error.to_string())?;
    if secs <= 0.0 {
        return Err("timeout must be positive".to_owned());
    }
    Duration::try_from_secs_f64(secs).map_err(|error| error.to_string())
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(ExpectedError::current_dir_invalid)?;
    Utf8PathBuf::try_from(dir)
        .map_err(|err| ExpectedError::current_dir_invalid(err.into_io_error()))
}

fn write_csv(path: &Utf8Path, table: &ComparisonTable) -> Result<()> {
    let write = || {
        let mut writer = BufWriter::new(File::create(path)?);
        table.write_csv(&mut writer)?;
        writer.flush()
    };
    write().map_err(|err| ExpectedError::csv_write_error(path, err))
}
