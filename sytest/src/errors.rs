// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use sytest_runner::{errors::*, exit_codes::SytestExitCode};
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholder messages: errors are printed with display_to_stderr,
// which colorizes them.

/// An error occurred that sytest knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid {
        #[source]
        err: std::io::Error,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("pipeline not found")]
    PipelineNotFound {
        #[from]
        err: PipelineNotFound,
    },
    #[error("test discovery failed")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("test runner build error")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("error writing CSV to `{path}`")]
    CsvWriteError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error writing event")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("error writing test list")]
    WriteTestListError {
        #[from]
        err: WriteTestListError,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn current_dir_invalid(err: std::io::Error) -> Self {
        Self::CurrentDirInvalid { err }
    }

    pub(crate) fn csv_write_error(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::CsvWriteError {
            path: path.into(),
            err,
        }
    }

    pub(crate) fn test_run_failed() -> Self {
        Self::TestRunFailed
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirInvalid { .. }
            | Self::ConfigParseError { .. }
            | Self::PipelineNotFound { .. }
            | Self::DiscoveryError { .. }
            | Self::TestRunnerBuildError { .. } => SytestExitCode::SETUP_ERROR,
            Self::CsvWriteError { .. }
            | Self::WriteEventError { .. }
            | Self::WriteTestListError { .. } => SytestExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => SytestExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirInvalid { err } => {
                tracing::error!("current directory is invalid");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                tracing::error!(
                    "failed to parse sytest config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::PipelineNotFound { err } => {
                tracing::error!("{err}");
                None
            }
            Self::DiscoveryError { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::TestRunnerBuildError { err } => {
                tracing::error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::CsvWriteError { path, err } => {
                tracing::error!(
                    "failed to write comparison table to `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                tracing::error!("failed to write event to output");
                Some(err as &dyn Error)
            }
            Self::WriteTestListError { err } => {
                tracing::error!("failed to write test list to output");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                // The summary already lists every failure.
                tracing::error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
