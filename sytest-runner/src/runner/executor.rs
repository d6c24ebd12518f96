// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a single stage as a subprocess.

use super::os;
use crate::{helpers::display_signal, time::stopwatch};
use bytes::{Bytes, BytesMut};
use camino::Utf8Path;
use std::{fs::File, io, process::Stdio, time::Duration};
use tokio::io::{AsyncReadExt, BufReader};
use tracing::debug;

/// How long to wait for stdout and stderr to close after a stage exits.
///
/// Processes that hand their output pipes to a background grandchild would otherwise keep the
/// stage open indefinitely.
const LEAK_TIMEOUT: Duration = Duration::from_millis(100);

/// How a stage process ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StageStatus {
    /// The process exited normally with this code.
    Exited(i32),

    /// The process was terminated by this signal.
    Signaled(i32),

    /// The process exceeded its deadline and was killed.
    TimedOut,

    /// The process could not be started, or its output could not be read.
    ExecFail(String),
}

impl StageStatus {
    /// Decodes a raw status as reported by a process wrapper.
    ///
    /// Negative values mean "killed by signal `-N`"; anything else is an exit code, taken modulo
    /// 256.
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 {
            Self::Signaled(raw.checked_neg().unwrap_or(i32::MAX))
        } else {
            Self::Exited(raw % 256)
        }
    }

    /// Returns the exit code, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns a human-readable description of this status.
    pub fn describe(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {code}"),
            Self::Signaled(signal) => display_signal(*signal),
            Self::TimedOut => "timed out".to_owned(),
            Self::ExecFail(error) => format!("failed to execute: {error}"),
        }
    }
}

/// The result of running a stage.
#[derive(Clone, Debug)]
pub struct StageResult {
    /// How the process ended.
    pub status: StageStatus,

    /// Captured standard output.
    pub stdout: Bytes,

    /// Captured standard error.
    pub stderr: Bytes,

    /// Wall-clock time taken.
    pub time_taken: Duration,
}

impl StageResult {
    /// A result for a stage that never ran.
    pub(super) fn exec_fail(error: impl Into<String>, time_taken: Duration) -> Self {
        Self {
            status: StageStatus::ExecFail(error.into()),
            stdout: Bytes::new(),
            stderr: Bytes::new(),
            time_taken,
        }
    }
}

/// Runs `program` with `args` until it exits or `timeout` elapses.
///
/// Stdin is read from `stdin` if given, otherwise it's empty. Stdout and stderr are always
/// captured.
pub(super) async fn run_stage(
    program: &str,
    args: &[String],
    stdin: Option<&Utf8Path>,
    timeout: Duration,
) -> StageResult {
    let stopwatch = stopwatch();
    debug!(program, ?args, "running stage");

    match run_stage_inner(program, args, stdin, timeout).await {
        Ok((status, stdout, stderr)) => StageResult {
            status,
            stdout,
            stderr,
            time_taken: stopwatch.snapshot().duration,
        },
        Err(error) => StageResult::exec_fail(error.to_string(), stopwatch.snapshot().duration),
    }
}

async fn run_stage_inner(
    program: &str,
    args: &[String],
    stdin: Option<&Utf8Path>,
    timeout: Duration,
) -> io::Result<(StageStatus, Bytes, Bytes)> {
    let mut cmd = std::process::Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    match stdin {
        Some(path) => cmd.stdin(File::open(path)?),
        None => cmd.stdin(Stdio::null()),
    };
    os::set_process_group(&mut cmd);

    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;
    let pgid = child.id();

    let child_stdout = child.stdout.take().map(BufReader::new);
    let child_stderr = child.stderr.take().map(BufReader::new);
    let mut stdout = BytesMut::with_capacity(4096);
    let mut stderr = BytesMut::with_capacity(4096);

    let (res, timed_out) = {
        // Set up futures for reading from stdout and stderr.
        let stdout_fut = async {
            if let Some(mut child_stdout) = child_stdout {
                loop {
                    stdout.reserve(4096);
                    let bytes_read = child_stdout.read_buf(&mut stdout).await?;
                    if bytes_read == 0 {
                        break;
                    }
                }
            }
            Ok::<_, io::Error>(())
        };
        tokio::pin!(stdout_fut);
        let mut stdout_done = false;

        let stderr_fut = async {
            if let Some(mut child_stderr) = child_stderr {
                loop {
                    stderr.reserve(4096);
                    let bytes_read = child_stderr.read_buf(&mut stderr).await?;
                    if bytes_read == 0 {
                        break;
                    }
                }
            }
            Ok::<_, io::Error>(())
        };
        tokio::pin!(stderr_fut);
        let mut stderr_done = false;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;

        let res = loop {
            tokio::select! {
                res = &mut stdout_fut, if !stdout_done => {
                    stdout_done = true;
                    res?;
                }
                res = &mut stderr_fut, if !stderr_done => {
                    stderr_done = true;
                    res?;
                }
                res = child.wait() => {
                    break res;
                }
                () = &mut deadline, if !timed_out => {
                    // Kill the whole group, then keep looping so the child gets reaped.
                    os::terminate_child(&mut child);
                    timed_out = true;
                }
            }
        };

        // Once the process is done executing, wait up to LEAK_TIMEOUT for the pipes to shut
        // down. Whatever was read by then is kept.
        loop {
            let sleep = tokio::time::sleep(LEAK_TIMEOUT);

            tokio::select! {
                res = &mut stdout_fut, if !stdout_done => {
                    stdout_done = true;
                    res?;
                }
                res = &mut stderr_fut, if !stderr_done => {
                    stderr_done = true;
                    res?;
                }
                () = sleep, if !(stdout_done && stderr_done) => {
                    debug!(program, "output pipes still open after exit, ignoring");
                    break;
                }
                else => {
                    break;
                }
            }
        }

        // Background processes may still be holding the pipes, or may have detached from them.
        // Either way nothing in the group outlives the stage.
        if let Some(pgid) = pgid {
            os::kill_process_group(pgid);
        }

        (res, timed_out)
    };

    let exit_status = res?;
    let status = if timed_out {
        StageStatus::TimedOut
    } else {
        os::decode_exit_status(exit_status)
    };

    Ok((status, stdout.freeze(), stderr.freeze()))
}
