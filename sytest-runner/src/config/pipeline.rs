// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ConfigParseErrorKind;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::{fmt, time::Duration};

/// A named, ordered sequence of setup stages.
///
/// Once every stage succeeds, the artifact at `{binary}` is executed and judged against the golden
/// file.
#[derive(Clone, Debug)]
pub struct Pipeline {
    name: String,
    stages: Vec<StageSpec>,
    run_timeout: Option<Duration>,
}

impl Pipeline {
    /// Returns the name of the pipeline.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the setup stages, in execution order.
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the run timeout configured for this pipeline, if any.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout
    }

    /// Returns true if any stage of this pipeline refers to `placeholder`.
    pub fn uses_placeholder(&self, placeholder: Placeholder) -> bool {
        self.stages.iter().any(|stage| {
            stage
                .command
                .iter()
                .any(|arg| arg.placeholders().any(|p| p == placeholder))
        })
    }

    pub(super) fn from_impl(
        name: &str,
        pipeline: PipelineImpl,
    ) -> Result<Self, ConfigParseErrorKind> {
        if pipeline.stages.is_empty() {
            return Err(ConfigParseErrorKind::EmptyPipeline {
                pipeline: name.to_owned(),
            });
        }

        let stages = pipeline
            .stages
            .into_iter()
            .enumerate()
            .map(|(idx, stage)| StageSpec::from_impl(name, idx, stage))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_owned(),
            stages,
            run_timeout: pipeline.run_timeout,
        })
    }
}

/// A single setup stage: a command template, a role and a deadline.
#[derive(Clone, Debug)]
pub struct StageSpec {
    name: String,
    role: StageRole,
    command: Vec<ArgTemplate>,
    timeout: Duration,
}

impl StageSpec {
    /// Returns the name of the stage.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the role of the stage, used to classify its failures.
    pub fn role(&self) -> StageRole {
        self.role
    }

    /// Returns the deadline for this stage.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Substitutes placeholders, returning the program and its arguments.
    pub fn resolve(&self, values: &PlaceholderValues<'_>) -> (String, Vec<String>) {
        let mut iter = self.command.iter().map(|arg| arg.substitute(values));
        // The command is checked to be non-empty at parse time.
        let program = iter.next().unwrap_or_default();
        (program, iter.collect())
    }

    fn from_impl(
        pipeline: &str,
        idx: usize,
        stage: StageImpl,
    ) -> Result<Self, ConfigParseErrorKind> {
        if stage.command.is_empty() {
            return Err(ConfigParseErrorKind::EmptyCommand {
                pipeline: pipeline.to_owned(),
                stage: stage.name,
            });
        }

        let command = stage
            .command
            .iter()
            .map(|arg| ArgTemplate::parse(arg))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|placeholder| ConfigParseErrorKind::UnknownPlaceholder {
                pipeline: pipeline.to_owned(),
                stage: stage.name.clone(),
                placeholder,
            })?;

        let role = stage.role.unwrap_or(if idx == 0 {
            StageRole::Compile
        } else {
            StageRole::Link
        });

        Ok(Self {
            name: stage.name,
            role,
            command,
            timeout: stage.timeout,
        })
    }
}

/// The role of a setup stage.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum StageRole {
    /// A failure is reported as a compile error.
    Compile,

    /// A failure is reported as a link error.
    Link,
}

impl StageRole {
    /// Returns a string representation of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A placeholder that can appear in a stage command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Placeholder {
    /// The test source.
    Input,
    /// The runtime library linked into the artifact.
    LinkLib,
    /// The runtime library source, for reference compilers.
    CLib,
    /// The compiler under test.
    Compiler,
    /// An intermediate file in the per-test scratch directory.
    Asm,
    /// The artifact to produce, in the per-test scratch directory.
    Binary,
}

impl Placeholder {
    const ALL: [Self; 6] = [
        Self::Input,
        Self::LinkLib,
        Self::CLib,
        Self::Compiler,
        Self::Asm,
        Self::Binary,
    ];

    /// Returns the names of all known placeholders.
    pub fn variants() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.name()).collect()
    }

    /// Returns the name of this placeholder, without braces.
    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::LinkLib => "link-lib",
            Self::CLib => "c-lib",
            Self::Compiler => "compiler",
            Self::Asm => "asm",
            Self::Binary => "binary",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Paths to the tools that are supplied on the command line.
#[derive(Clone, Debug)]
pub struct ToolPaths {
    /// The compiler under test.
    pub compiler: Utf8PathBuf,

    /// The runtime library linked into each artifact.
    pub link_lib: Utf8PathBuf,

    /// The runtime library source, used by reference pipelines.
    pub c_lib: Option<Utf8PathBuf>,
}

/// The values substituted for placeholders when running one test.
#[derive(Clone, Copy, Debug)]
pub struct PlaceholderValues<'a> {
    /// The tools supplied on the command line.
    pub tools: &'a ToolPaths,
    /// The test source.
    pub input: &'a Utf8Path,
    /// The intermediate file.
    pub asm: &'a Utf8Path,
    /// The artifact.
    pub binary: &'a Utf8Path,
}

impl<'a> PlaceholderValues<'a> {
    fn get(&self, placeholder: Placeholder) -> &'a str {
        match placeholder {
            Placeholder::Input => self.input.as_str(),
            Placeholder::LinkLib => self.tools.link_lib.as_str(),
            Placeholder::CLib => self.tools.c_lib.as_deref().map_or("", Utf8Path::as_str),
            Placeholder::Compiler => self.tools.compiler.as_str(),
            Placeholder::Asm => self.asm.as_str(),
            Placeholder::Binary => self.binary.as_str(),
        }
    }
}

/// One argument of a stage command, split into literal text and placeholders.
///
/// `{{` stands for a literal `{`. A `{` without a matching `}` is kept as literal text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArgTemplate {
    segments: Vec<Segment>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

impl ArgTemplate {
    /// Parses an argument, returning the name of the first unknown placeholder on failure.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            if let Some(escaped) = after.strip_prefix('{') {
                literal.push('{');
                rest = escaped;
                continue;
            }

            let Some(close) = after.find('}') else {
                literal.push('{');
                rest = after;
                continue;
            };

            let name = &after[..close];
            let placeholder = Placeholder::from_name(name).ok_or_else(|| name.to_owned())?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(placeholder));
            rest = &after[close + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Returns the placeholders used in this argument.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes placeholder values into this argument.
    pub fn substitute(&self, values: &PlaceholderValues<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(p) => out.push_str(values.get(*p)),
            }
        }
        out
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct PipelineImpl {
    stages: Vec<StageImpl>,
    #[serde(default, with = "humantime_serde")]
    run_timeout: Option<Duration>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StageImpl {
    name: String,
    #[serde(default)]
    role: Option<StageRole>,
    command: Vec<String>,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
}
