// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::StageStatus;
use std::process::ExitStatus;
use tokio::process::Child;

// Windows has no process groups in the Unix sense: only the direct child is killed.
pub(super) fn set_process_group(_cmd: &mut std::process::Command) {}

pub(super) fn terminate_child(child: &mut Child) {
    // Failure means the process has already exited.
    let _ = child.start_kill();
}

// Without a process group there's nothing to clean up once the child has exited.
pub(super) fn kill_process_group(_pid: u32) {}

pub(super) fn decode_exit_status(exit_status: ExitStatus) -> StageStatus {
    match exit_status.code() {
        // Crashes are reported as NTSTATUS codes, which are negative as an i32.
        Some(code) => StageStatus::from_raw(code),
        None => StageStatus::ExecFail(format!("unrecognized exit status: {exit_status}")),
    }
}
