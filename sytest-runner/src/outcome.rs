// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of pipeline results into outcomes.

use crate::{
    config::{StageRole, StageSpec},
    errors::GoldenParseError,
    normalize::{GoldenOutput, normalize_output, preview_bytes, preview_lines},
    runner::{StageResult, StageStatus},
};
use serde::Serialize;
use std::time::Duration;

/// The outcome of running one test through one pipeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Outcome {
    /// All stages succeeded and the output matched.
    Pass {
        /// The elapsed time reported by the program, in performance mode.
        elapsed: Option<f64>,
    },

    /// A compile stage failed.
    CompileError {
        /// The stage that failed.
        stage: String,
        /// The exit code, if the stage exited normally.
        exit_code: Option<i32>,
        /// How the stage ended.
        description: String,
        /// A preview of the stage's stderr.
        stderr: String,
    },

    /// A link stage failed.
    LinkError {
        /// The stage that failed.
        stage: String,
        /// The exit code, if the stage exited normally.
        exit_code: Option<i32>,
        /// How the stage ended.
        description: String,
        /// A preview of the stage's stderr.
        stderr: String,
    },

    /// A setup stage exceeded its deadline.
    CompilerTimeout {
        /// The stage that timed out.
        stage: String,
        /// The deadline.
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },

    /// The program exceeded the run deadline.
    RuntimeTimeout {
        /// A preview of what the program printed before it was killed.
        got: String,
    },

    /// The program was killed by a signal, or could not be executed.
    RuntimeError {
        /// The signal, if there was one.
        signal: Option<i32>,
        /// How the program ended.
        description: String,
        /// A preview of what the program printed.
        got: String,
    },

    /// The program's output didn't match the golden file.
    OutputMismatch {
        /// A preview of the expected output.
        expected: String,
        /// A preview of the actual output.
        got: String,
    },

    /// The output matched, but the return code didn't.
    ReturnCodeMismatch {
        /// The expected return code.
        expected: u8,
        /// The actual return code, modulo 256.
        got: u8,
    },
}

impl Outcome {
    /// Classifies a setup stage result, returning `None` if the stage succeeded.
    pub fn from_setup_stage(stage: &StageSpec, result: &StageResult) -> Option<Self> {
        match &result.status {
            StageStatus::Exited(0) => None,
            StageStatus::TimedOut => Some(Self::CompilerTimeout {
                stage: stage.name().to_owned(),
                timeout: stage.timeout(),
            }),
            status => Some(Self::stage_failed(stage, status, &result.stderr)),
        }
    }

    /// Returns the error outcome for a setup stage that ended with `status`, according to the
    /// stage's role.
    pub fn stage_failed(stage: &StageSpec, status: &StageStatus, stderr: &[u8]) -> Self {
        let stage_name = stage.name().to_owned();
        let exit_code = status.exit_code();
        let description = status.describe();
        let stderr = preview_bytes(stderr);
        match stage.role() {
            StageRole::Compile => Self::CompileError {
                stage: stage_name,
                exit_code,
                description,
                stderr,
            },
            StageRole::Link => Self::LinkError {
                stage: stage_name,
                exit_code,
                description,
                stderr,
            },
        }
    }

    /// Classifies the result of running the produced program against its golden file.
    ///
    /// Timeouts and signals take precedence over content, and content takes precedence over the
    /// return code.
    pub fn classify(run: &StageResult, expected: &Result<GoldenOutput, GoldenParseError>) -> Self {
        let code = match &run.status {
            StageStatus::TimedOut => {
                return Self::RuntimeTimeout {
                    got: preview_bytes(&run.stdout),
                };
            }
            StageStatus::Signaled(signal) => {
                return Self::RuntimeError {
                    signal: Some(*signal),
                    description: run.status.describe(),
                    got: preview_bytes(&run.stdout),
                };
            }
            StageStatus::ExecFail(_) => {
                return Self::RuntimeError {
                    signal: None,
                    description: run.status.describe(),
                    got: String::new(),
                };
            }
            StageStatus::Exited(code) => code.rem_euclid(256) as u8,
        };

        let actual = normalize_output(&run.stdout);
        let expected = match expected {
            Ok(expected) => expected,
            Err(error) => {
                return Self::OutputMismatch {
                    expected: format!("<invalid golden file: {error}>"),
                    got: preview_lines(&actual),
                };
            }
        };

        if actual != expected.lines {
            Self::OutputMismatch {
                expected: preview_lines(&expected.lines),
                got: preview_lines(&actual),
            }
        } else if code != expected.return_code {
            Self::ReturnCodeMismatch {
                expected: expected.return_code,
                got: code,
            }
        } else {
            Self::Pass { elapsed: None }
        }
    }

    /// Returns true if this is a pass.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    /// Returns a short label for this outcome, at most 12 characters wide.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass { .. } => "PASS",
            Self::CompileError { .. } => "COMPILE ERR",
            Self::LinkError { .. } => "LINK ERR",
            Self::CompilerTimeout { .. } => "COMP TIMEOUT",
            Self::RuntimeTimeout { .. } => "TIMEOUT",
            Self::RuntimeError {
                signal: Some(_), ..
            } => "SIGNAL",
            Self::RuntimeError { signal: None, .. } => "EXEC FAIL",
            Self::OutputMismatch { .. } => "FAIL",
            Self::ReturnCodeMismatch { .. } => "RET MISMATCH",
        }
    }

    /// Returns the name of this outcome's classification.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pass { .. } => "Pass",
            Self::CompileError { .. } => "CompileError",
            Self::LinkError { .. } => "LinkError",
            Self::CompilerTimeout { .. } => "CompilerTimeout",
            Self::RuntimeTimeout { .. } => "RuntimeTimeout",
            Self::RuntimeError { .. } => "RuntimeError",
            Self::OutputMismatch { .. } => "OutputMismatch",
            Self::ReturnCodeMismatch { .. } => "ReturnCodeMismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn result(status: StageStatus, stdout: &'static str) -> StageResult {
        StageResult {
            status,
            stdout: Bytes::from_static(stdout.as_bytes()),
            stderr: Bytes::new(),
            time_taken: Duration::ZERO,
        }
    }

    fn golden(contents: &str) -> Result<GoldenOutput, GoldenParseError> {
        GoldenOutput::parse(contents)
    }

    #[test]
    fn pass() {
        let outcome = Outcome::classify(&result(StageStatus::Exited(0), "3\n"), &golden("3\n0"));
        assert_eq!(outcome, Outcome::Pass { elapsed: None });
    }

    #[test]
    fn normalization_applies_to_both_sides() {
        let outcome = Outcome::classify(
            &result(StageStatus::Exited(1), "  a\r\n\r\nb  \n"),
            &golden("a\n\nb\n1\n"),
        );
        assert_eq!(outcome, Outcome::Pass { elapsed: None });
    }

    #[test]
    fn signal_beats_matching_output() {
        let outcome = Outcome::classify(
            &result(StageStatus::Signaled(11), "3\n"),
            &golden("3\n0"),
        );
        assert!(matches!(
            outcome,
            Outcome::RuntimeError {
                signal: Some(11),
                ..
            }
        ));
        assert!(!outcome.is_pass());
    }

    #[test]
    fn content_beats_return_code() {
        let outcome = Outcome::classify(&result(StageStatus::Exited(7), "4\n"), &golden("3\n0"));
        assert_eq!(
            outcome,
            Outcome::OutputMismatch {
                expected: "3".to_owned(),
                got: "4".to_owned(),
            }
        );
    }

    #[test]
    fn return_code_mismatch() {
        let outcome = Outcome::classify(&result(StageStatus::Exited(1), "3\n"), &golden("3\n0"));
        assert_eq!(
            outcome,
            Outcome::ReturnCodeMismatch {
                expected: 0,
                got: 1
            }
        );
    }

    #[test]
    fn return_code_modulo() {
        let outcome = Outcome::classify(&result(StageStatus::from_raw(511), ""), &golden("-1"));
        assert_eq!(outcome, Outcome::Pass { elapsed: None });
    }

    #[test]
    fn invalid_golden_never_passes() {
        let outcome = Outcome::classify(&result(StageStatus::Exited(0), ""), &golden(""));
        assert_eq!(
            outcome,
            Outcome::OutputMismatch {
                expected: "<invalid golden file: golden file is empty (expected at least a \
                           return code line)>"
                    .to_owned(),
                got: String::new(),
            }
        );
    }

    #[test]
    fn runtime_timeout_keeps_output() {
        let outcome = Outcome::classify(&result(StageStatus::TimedOut, "partial"), &golden("0"));
        assert_eq!(
            outcome,
            Outcome::RuntimeTimeout {
                got: "partial".to_owned()
            }
        );
    }

    #[test]
    fn exec_fail_is_runtime_error() {
        let outcome = Outcome::classify(
            &result(StageStatus::ExecFail("permission denied".to_owned()), ""),
            &golden("0"),
        );
        assert_eq!(outcome.label(), "EXEC FAIL");
        assert_eq!(outcome.kind(), "RuntimeError");
    }

    #[test]
    fn setup_stage_roles() {
        let config = HarnessConfig::default_config("/base");
        let stages = config.pipeline("default").unwrap().stages();
        let (compile, link) = (&stages[0], &stages[1]);

        assert_eq!(
            Outcome::from_setup_stage(compile, &result(StageStatus::Exited(0), "")),
            None
        );
        assert_eq!(
            Outcome::from_setup_stage(compile, &result(StageStatus::Exited(1), "")),
            Some(Outcome::CompileError {
                stage: "compile".to_owned(),
                exit_code: Some(1),
                description: "exited with code 1".to_owned(),
                stderr: String::new(),
            })
        );
        assert_eq!(
            Outcome::from_setup_stage(
                link,
                &result(StageStatus::ExecFail("not found".to_owned()), "")
            ),
            Some(Outcome::LinkError {
                stage: "link".to_owned(),
                exit_code: None,
                description: "failed to execute: not found".to_owned(),
                stderr: String::new(),
            })
        );
        // Timeouts are reported the same way whatever the role.
        assert_eq!(
            Outcome::from_setup_stage(link, &result(StageStatus::TimedOut, "")),
            Some(Outcome::CompilerTimeout {
                stage: "link".to_owned(),
                timeout: Duration::from_secs(15),
            })
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let outcome = Outcome::ReturnCodeMismatch {
            expected: 0,
            got: 1,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({ "kind": "return-code-mismatch", "expected": 0, "got": 1 })
        );
    }
}
