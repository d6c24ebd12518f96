// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by sytest.

use crate::config::Placeholder;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::io;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse sytest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A pipeline has no stages.
    #[error("pipeline `{pipeline}` has no stages")]
    EmptyPipeline {
        /// The name of the pipeline.
        pipeline: String,
    },

    /// A stage has an empty command.
    #[error("stage `{stage}` in pipeline `{pipeline}` has an empty command")]
    EmptyCommand {
        /// The name of the pipeline.
        pipeline: String,
        /// The name of the stage.
        stage: String,
    },

    /// A stage command referred to a placeholder that isn't known.
    #[error(
        "stage `{stage}` in pipeline `{pipeline}` uses unknown placeholder `{{{placeholder}}}` \
         (known placeholders: {})",
        Placeholder::variants().join(", ")
    )]
    UnknownPlaceholder {
        /// The name of the pipeline.
        pipeline: String,
        /// The name of the stage.
        stage: String,
        /// The unknown placeholder, without braces.
        placeholder: String,
    },

    /// The default pipeline named in the config doesn't exist.
    #[error("default pipeline `{0}` is not defined")]
    DefaultPipelineNotFound(String),
}

/// A pipeline was requested but isn't defined in the config.
#[derive(Clone, Debug, Error)]
#[error("pipeline `{name}` not found (known pipelines: {})", .all_pipelines.join(", "))]
pub struct PipelineNotFound {
    name: String,
    all_pipelines: Vec<String>,
}

impl PipelineNotFound {
    pub(crate) fn new(
        name: impl Into<String>,
        all_pipelines: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_pipelines: Vec<_> = all_pipelines.into_iter().map(|s| s.into()).collect();
        all_pipelines.sort_unstable();
        Self {
            name: name.into(),
            all_pipelines,
        }
    }
}

/// Error returned while parsing a [`TestThreads`](crate::config::TestThreads) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for test-threads: {input}\n(hint: {message})")]
pub struct TestThreadsParseError {
    input: String,
    message: &'static str,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>, message: &'static str) -> Self {
        Self {
            input: input.into(),
            message,
        }
    }
}

/// A fatal error that occurred while discovering tests.
///
/// Per-test problems (such as a missing golden file) are not errors: they're reported as
/// [`DiscoveryIssue`](crate::test_list::DiscoveryIssue)s instead.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The test root doesn't exist or isn't a directory.
    #[error("test root `{path}` is not a directory")]
    RootNotADirectory {
        /// The test root.
        path: Utf8PathBuf,
    },

    /// A directory could not be read.
    #[error("failed to read directory `{path}`")]
    ReadDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while parsing a golden (`.out`) file.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum GoldenParseError {
    /// The golden file has no non-blank lines, so there's no return code.
    #[error("golden file is empty (expected at least a return code line)")]
    Empty,

    /// The last non-blank line is not an integer.
    #[error("last line of golden file `{line}` is not an integer return code")]
    InvalidReturnCode {
        /// The offending line.
        line: String,
    },
}

/// The diagnostic stream didn't end with a `TOTAL: ...` timer trailer.
///
/// This never changes the outcome of a test: timing is advisory.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("cannot find timer in stderr (last line: `{last_line}`)")]
pub struct TimerParseError {
    last_line: String,
}

impl TimerParseError {
    pub(crate) fn new(last_line: impl Into<String>) -> Self {
        Self {
            last_line: last_line.into(),
        }
    }

    /// Returns the last non-blank line of the stream that was searched.
    pub fn last_line(&self) -> &str {
        &self.last_line
    }
}

/// An error that occurred while reading a performance baseline.
///
/// Baselines are advisory, so these errors are reported as warnings and the run proceeds with an
/// empty baseline.
#[derive(Debug, Error)]
pub enum BaselineReadError {
    /// The baseline file could not be read.
    #[error("failed to read baseline at `{path}`")]
    Read {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The baseline file was not valid JSON.
    #[error("failed to parse baseline at `{path}`")]
    Parse {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while persisting a performance baseline.
#[derive(Debug, Error)]
pub enum BaselineWriteError {
    /// The baseline directory could not be created.
    #[error("failed to create baseline directory `{path}`")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The baseline could not be serialized.
    #[error("failed to serialize baseline for `{path}`")]
    Serialize {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The baseline file could not be written.
    #[error("failed to write baseline to `{path}`")]
    Write {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },
}

/// An error that occurred while writing a diagnostic artifact for a failing test.
#[derive(Debug, Error)]
#[error("failed to write diagnostic artifact `{path}`")]
pub struct ArtifactWriteError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl ArtifactWriteError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// No pipelines were selected.
    #[error("no pipelines selected to run")]
    NoPipelines,

    /// A pipeline needs the runtime library source, but none was given.
    #[error("pipeline `{pipeline}` uses {{c-lib}}, but no library source was specified")]
    MissingCLib {
        /// The name of the pipeline.
        pipeline: String,
    },
}

/// An error that occurred while writing a test list to a writer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteTestListError {
    /// An error occurred while writing the list to the provided output.
    #[error("error writing to output")]
    Io(#[source] io::Error),

    /// An error occurred while serializing JSON.
    #[error("error serializing to JSON")]
    Json(#[source] serde_json::Error),
}

/// An error that occurred while writing an event or report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing to the output.
    #[error("error writing to output")]
    Io(#[source] io::Error),

    /// An error occurred while serializing the report.
    #[error("error serializing report")]
    Json(#[source] serde_json::Error),

    /// An error occurred while writing a diagnostic artifact.
    #[error(transparent)]
    Artifact(#[from] ArtifactWriteError),
}

impl From<io::Error> for WriteEventError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}
