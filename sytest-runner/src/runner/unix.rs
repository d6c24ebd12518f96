// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::StageStatus;
use libc::SIGKILL;
use std::{
    os::unix::process::{CommandExt, ExitStatusExt},
    process::ExitStatus,
};
use tokio::process::Child;

/// Pre-execution configuration on Unix.
///
/// This puts the stage into its own process group, so that it can be killed along with anything
/// it spawns.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

/// Kills the process group of `child`.
pub(super) fn terminate_child(child: &mut Child) {
    let Some(pid) = child.id() else {
        // The child has already been reaped.
        return;
    };
    kill_process_group(pid);
}

/// Kills whatever is left of the process group led by `pid`.
///
/// The group outlives its leader as long as any member is alive, so this also reaches background
/// processes left behind by a stage that has already exited.
pub(super) fn kill_process_group(pid: u32) {
    // The process group ID is the same as the leader's PID, and negating it addresses the whole
    // group. ESRCH just means nothing is left.
    unsafe {
        libc::kill(-(pid as libc::pid_t), SIGKILL);
    }
}

pub(super) fn decode_exit_status(exit_status: ExitStatus) -> StageStatus {
    match (exit_status.signal(), exit_status.code()) {
        (Some(signal), _) => StageStatus::Signaled(signal),
        (None, Some(code)) => StageStatus::Exited(code),
        // Stopped or continued: neither applies to a process that has been waited on.
        (None, None) => StageStatus::ExecFail(format!("unrecognized exit status: {exit_status}")),
    }
}
