// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `sytest` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum SytestExitCode {}

impl SytestExitCode {
    /// No errors occurred and every test that was run passed.
    pub const OK: i32 = 0;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// The run could not be set up: the test root, the config or the arguments were invalid.
    pub const SETUP_ERROR: i32 = 2;

    /// Writing data to stdout, stderr or the output directory produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 3;
}
