// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ArtifactWriteError,
    helpers::sanitize_path,
    outcome::Outcome,
    runner::PipelineExecution,
    test_list::TestCase,
};
use camino::Utf8PathBuf;
use std::fs;
use tracing::debug;

/// Dumps the captured streams of failing tests to an output directory.
///
/// Artifacts are named `<stream>-<sanitized path>.txt`. Pipelines other than the first selected
/// one have their name prefixed, so that runs with several pipelines don't overwrite each other.
#[derive(Clone, Debug)]
pub struct ArtifactWriter {
    output_dir: Utf8PathBuf,
    first_pipeline: String,
    dir_created: bool,
}

impl ArtifactWriter {
    /// Creates a new writer. The output directory is only created once something is written.
    pub fn new(output_dir: impl Into<Utf8PathBuf>, first_pipeline: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            first_pipeline: first_pipeline.into(),
            dir_created: false,
        }
    }

    /// Writes the artifacts for one finished test, returning the paths that were written.
    ///
    /// Nothing is written for a passing test.
    pub fn write(
        &mut self,
        case: &TestCase,
        pipeline: &str,
        execution: &PipelineExecution,
    ) -> Result<Vec<Utf8PathBuf>, ArtifactWriteError> {
        let mut written = Vec::new();
        if execution.outcome.is_pass() {
            return Ok(written);
        }

        let sanitized = sanitize_path(case.path());
        let prefix = if pipeline == self.first_pipeline {
            String::new()
        } else {
            format!("{pipeline}-")
        };

        if let Some(stdout) = execution.compiler_stdout() {
            let file_name = format!("{prefix}compiler-stdout-{sanitized}.txt");
            written.push(self.write_one(&file_name, stdout)?);
        }

        match &execution.outcome {
            Outcome::LinkError { .. } => {
                if let Some(link) = execution.last_link_stage() {
                    written.push(self.write_one(
                        &format!("{prefix}linker-stdout-{sanitized}.txt"),
                        &link.result.stdout,
                    )?);
                    written.push(self.write_one(
                        &format!("{prefix}linker-stderr-{sanitized}.txt"),
                        &link.result.stderr,
                    )?);
                }
            }
            Outcome::RuntimeError { .. }
            | Outcome::RuntimeTimeout { .. }
            | Outcome::OutputMismatch { .. }
            | Outcome::ReturnCodeMismatch { .. } => {
                if let Some(run) = &execution.run {
                    written.push(self.write_one(
                        &format!("{prefix}program-stdout-{sanitized}.txt"),
                        &run.stdout,
                    )?);
                }
            }
            Outcome::Pass { .. }
            | Outcome::CompileError { .. }
            | Outcome::CompilerTimeout { .. } => {}
        }

        Ok(written)
    }

    fn write_one(
        &mut self,
        file_name: &str,
        contents: &[u8],
    ) -> Result<Utf8PathBuf, ArtifactWriteError> {
        if !self.dir_created {
            fs::create_dir_all(&self.output_dir)
                .map_err(|error| ArtifactWriteError::new(&self.output_dir, error))?;
            self.dir_created = true;
        }

        let path = self.output_dir.join(file_name);
        fs::write(&path, contents).map_err(|error| ArtifactWriteError::new(&path, error))?;
        debug!("wrote artifact {path}");
        Ok(path)
    }
}
