// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    pipeline::{Pipeline, PipelineImpl},
    test_threads::TestThreads,
};
use crate::errors::{ConfigParseError, ConfigParseErrorKind, PipelineNotFound};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for sytest.
///
/// This is the root data structure for sytest configuration. Stage commands are grouped into
/// named [pipelines](Pipeline), obtained through the [`pipelines`](Self::pipelines) method.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    base_dir: Utf8PathBuf,
    discovery: DiscoveryConfigImpl,
    run: RunConfigImpl,
    pipelines: IndexMap<String, Pipeline>,
}

impl HarnessConfig {
    /// The default location of the config within the base directory.
    pub const CONFIG_PATH: &'static str = "sytest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from the given file, or if not specified from `sytest.toml` in
    /// `base_dir`.
    ///
    /// If no config file is specified and `base_dir` doesn't have `sytest.toml`, uses the default
    /// config options. Relative directories in the config are resolved against `base_dir`.
    pub fn from_sources(
        base_dir: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let base_dir = base_dir.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = base_dir.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        Self::build(base_dir, &builder).map_err(|kind| ConfigParseError::new(config_file, kind))
    }

    /// Returns the default sytest config.
    pub fn default_config(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self::build(base_dir.into(), &Self::make_default_config())
            .expect("default config is always valid")
    }

    /// Returns the file extension that marks test sources.
    pub fn extension(&self) -> &str {
        &self.discovery.extension
    }

    /// Returns the default run-stage timeout.
    pub fn run_timeout(&self) -> Duration {
        self.run.timeout
    }

    /// Returns the number of tests to run simultaneously.
    pub fn test_threads(&self) -> TestThreads {
        self.run.test_threads
    }

    /// Returns the absolute directory that diagnostic artifacts are written to.
    pub fn output_dir(&self) -> Utf8PathBuf {
        self.base_dir.join(&self.run.output_dir)
    }

    /// Returns the absolute directory that timing baselines are stored in.
    pub fn baseline_dir(&self) -> Utf8PathBuf {
        self.base_dir.join(&self.run.baseline_dir)
    }

    /// Returns the name of the pipeline that runs when none is requested.
    pub fn default_pipeline(&self) -> &str {
        &self.run.default_pipeline
    }

    /// Returns the names of all configured pipelines, in definition order.
    pub fn pipeline_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.pipelines.keys().map(String::as_str)
    }

    /// Returns the pipeline with the given name.
    pub fn pipeline(&self, name: &str) -> Result<&Pipeline, PipelineNotFound> {
        self.pipelines
            .get(name)
            .ok_or_else(|| PipelineNotFound::new(name, self.pipeline_names()))
    }

    /// Returns the pipelines with the given names, in the given order, or the default pipeline if
    /// `names` is empty. Duplicate names are only returned once.
    pub fn pipelines<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Pipeline>, PipelineNotFound> {
        if names.is_empty() {
            return Ok(vec![self.pipeline(self.default_pipeline())?.clone()]);
        }

        let mut selected: IndexMap<&str, Pipeline> = IndexMap::new();
        for name in names {
            let name = name.as_ref();
            if !selected.contains_key(name) {
                selected.insert(name, self.pipeline(name)?.clone());
            }
        }
        Ok(selected.into_values().collect())
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build(
        base_dir: Utf8PathBuf,
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<Self, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let inner: HarnessConfigImpl = serde_path_to_error::deserialize(config)
            .map_err(|error| ConfigParseErrorKind::DeserializeError(Box::new(error)))?;

        let pipelines = inner
            .pipelines
            .into_iter()
            .map(|(name, pipeline)| {
                let pipeline = Pipeline::from_impl(&name, pipeline)?;
                Ok((name, pipeline))
            })
            .collect::<Result<IndexMap<_, _>, _>>()?;

        if !pipelines.contains_key(&inner.run.default_pipeline) {
            return Err(ConfigParseErrorKind::DefaultPipelineNotFound(
                inner.run.default_pipeline,
            ));
        }

        Ok(Self {
            base_dir,
            discovery: inner.discovery,
            run: inner.run,
            pipelines,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HarnessConfigImpl {
    discovery: DiscoveryConfigImpl,
    run: RunConfigImpl,
    #[serde(rename = "pipeline")]
    pipelines: IndexMap<String, PipelineImpl>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DiscoveryConfigImpl {
    extension: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunConfigImpl {
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    test_threads: TestThreads,
    output_dir: Utf8PathBuf,
    baseline_dir: Utf8PathBuf,
    default_pipeline: String,
}
