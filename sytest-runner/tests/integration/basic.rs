// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use std::time::Duration;
use sytest_runner::{
    config::TestThreads,
    outcome::Outcome,
    reporter::{AggregateReport, ReporterStderr, TestReporterBuilder},
    runner::TestRunnerBuilder,
};

fn outcome_of<'a>(report: &'a AggregateReport, file_name: &str) -> &'a Outcome {
    report
        .passes
        .iter()
        .chain(&report.failures)
        .find(|entry| entry.path.file_name() == Some(file_name))
        .map(|entry| &entry.outcome)
        .unwrap_or_else(|| panic!("{file_name} is in the report"))
}

#[test]
fn classifies_every_outcome() {
    let workspace = Workspace::new();
    workspace.add_test("pass.sy", "echo hello\necho world\n", "hello\nworld\n0\n", None);
    workspace.add_test("stdin.sy", "read x\necho $((x * 2))\n", "42\n0\n", Some("21\n"));
    workspace.add_test("mismatch.sy", "echo wrong\n", "right\n0\n", None);
    workspace.add_test("retcode.sy", "echo ok\nexit 3\n", "ok\n0\n", None);
    workspace.add_test("wrapped.sy", "exit 300\n", "44\n", None);
    workspace.add_test("segv.sy", "echo before\nkill -SEGV $$\n", "0\n", None);
    workspace.add_test("hang.sy", "echo started\nsleep 30\n", "0\n", None);
    workspace.add_test("syntax.sy", "# COMPILE_ERROR\n", "0\n", None);
    workspace.add_test("slowcc.sy", "# COMPILE_HANG\n", "0\n", None);
    workspace.add_test("unlinked.sy", "# LINK_ERROR\n", "0\n", None);

    let test_list = workspace.discover(false);
    assert_eq!(test_list.len(), 10);
    let pipelines = workspace.pipelines(&[]);
    let (results, finished) = run(&workspace, &test_list, &pipelines, false);

    assert_eq!(finished, 10, "one finished event per test");
    let report = &results.report;
    assert_eq!(report.tested, 10);
    assert_eq!(report.passed, 3);
    assert!(!results.is_success());

    assert_eq!(outcome_of(report, "pass.sy"), &Outcome::Pass { elapsed: None });
    assert_eq!(outcome_of(report, "stdin.sy"), &Outcome::Pass { elapsed: None });
    assert_eq!(
        outcome_of(report, "wrapped.sy"),
        &Outcome::Pass { elapsed: None },
        "exit codes are compared modulo 256"
    );
    assert_eq!(
        outcome_of(report, "mismatch.sy"),
        &Outcome::OutputMismatch {
            expected: "right".to_owned(),
            got: "wrong".to_owned(),
        }
    );
    assert_eq!(
        outcome_of(report, "retcode.sy"),
        &Outcome::ReturnCodeMismatch {
            expected: 0,
            got: 3,
        }
    );

    match outcome_of(report, "segv.sy") {
        Outcome::RuntimeError { signal, got, .. } => {
            assert_eq!(*signal, Some(libc::SIGSEGV));
            assert_eq!(got, "before\n");
        }
        other => panic!("unexpected outcome for segv.sy: {other:?}"),
    }
    match outcome_of(report, "hang.sy") {
        Outcome::RuntimeTimeout { got } => assert_eq!(got, "started\n"),
        other => panic!("unexpected outcome for hang.sy: {other:?}"),
    }
    match outcome_of(report, "syntax.sy") {
        Outcome::CompileError {
            stage,
            exit_code,
            stderr,
            ..
        } => {
            assert_eq!(stage, "compile");
            assert_eq!(*exit_code, Some(1));
            assert_eq!(stderr, "error: expected ';'\n");
        }
        other => panic!("unexpected outcome for syntax.sy: {other:?}"),
    }
    match outcome_of(report, "slowcc.sy") {
        Outcome::CompilerTimeout { stage, timeout } => {
            assert_eq!(stage, "compile");
            assert_eq!(*timeout, Duration::from_secs(1));
        }
        other => panic!("unexpected outcome for slowcc.sy: {other:?}"),
    }
    match outcome_of(report, "unlinked.sy") {
        Outcome::LinkError {
            stage, exit_code, ..
        } => {
            assert_eq!(stage, "link");
            assert_eq!(*exit_code, Some(1));
        }
        other => panic!("unexpected outcome for unlinked.sy: {other:?}"),
    }
}

#[test]
fn missing_golden_is_skipped() {
    let workspace = Workspace::new();
    workspace.add_test("a.sy", "echo 1\n", "1\n0\n", None);
    std::fs::write(workspace.tests_dir().join("b.sy"), "#!/bin/sh\n").unwrap();

    let test_list = workspace.discover(false);
    let pipelines = workspace.pipelines(&[]);
    let (results, _) = run(&workspace, &test_list, &pipelines, false);

    assert_eq!(results.report.tested, 1);
    assert!(results.is_success(), "discovery issues don't fail the run");
    assert_eq!(results.report.discovery_issues.len(), 1);
    assert_eq!(
        results.report.discovery_issues[0].path,
        workspace.tests_dir().join("b.sy")
    );
}

#[test]
fn recursive_aggregation() {
    let workspace = Workspace::new();
    workspace.add_test("top.sy", "echo 1\n", "1\n0\n", None);
    workspace.add_test("functional/a.sy", "echo a\n", "a\n0\n", None);
    workspace.add_test("functional/b.sy", "echo b\n", "nope\n0\n", None);
    workspace.add_test("functional/deep/c.sy", "exit 7\n", "7\n", None);

    let flat = workspace.discover(false);
    assert_eq!(flat.len(), 1, "sub-directories are skipped without recursion");

    let test_list = workspace.discover(true);
    assert_eq!(test_list.len(), 4);
    let pipelines = workspace.pipelines(&[]);
    let (results, _) = run(&workspace, &test_list, &pipelines, false);

    assert_eq!(results.report.tested, 4);
    assert_eq!(results.report.passed, 3);
    assert_eq!(results.report.failures.len(), 1);
    assert_eq!(
        results.report.failures[0].path,
        workspace.tests_dir().join("functional/b.sy")
    );

    // Results arrive out of order, but reports follow discovery order.
    let order: Vec<_> = results
        .report
        .passes
        .iter()
        .map(|entry| entry.path.strip_prefix(workspace.tests_dir()).unwrap().to_owned())
        .collect();
    assert_eq!(order, ["functional/a.sy", "functional/deep/c.sy", "top.sy"]);
}

#[test]
fn multiple_pipelines() {
    let workspace = Workspace::new();
    workspace.add_test("slow.sy", "sleep 2\necho done\n", "done\n0\n", None);

    let test_list = workspace.discover(false);
    let pipelines = workspace.pipelines(&["sh", "sh-slow"]);
    let (results, finished) = run(&workspace, &test_list, &pipelines, false);

    assert_eq!(finished, 2);
    assert_eq!(results.report.tested, 2);
    // `sh` uses the 1s default run timeout, `sh-slow` overrides it.
    assert_eq!(results.report.failures.len(), 1);
    assert_eq!(results.report.failures[0].pipeline, "sh");
    assert!(matches!(
        results.report.failures[0].outcome,
        Outcome::RuntimeTimeout { .. }
    ));
    assert_eq!(results.report.passes[0].pipeline, "sh-slow");
}

#[test]
fn cli_timeout_overrides_config() {
    let workspace = Workspace::new();
    workspace.add_test("slow.sy", "sleep 2\necho done\n", "done\n0\n", None);

    let test_list = workspace.discover(false);
    let pipelines = workspace.pipelines(&["sh-slow"]);
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_test_threads(TestThreads::Count(1))
        .set_run_timeout(SHORT_TIMEOUT);
    let runner = builder
        .build(&test_list, &workspace.config, &pipelines, &workspace.tools)
        .unwrap();
    let results = runner.execute(|_| {});

    assert!(matches!(
        results.report.failures[0].outcome,
        Outcome::RuntimeTimeout { .. }
    ));
}

#[test]
fn reporter_writes_summary_and_artifacts() {
    let workspace = Workspace::new();
    workspace.add_test("pass.sy", "echo 1\n", "1\n0\n", None);
    workspace.add_test("mismatch.sy", "echo 2\n", "1\n0\n", None);
    workspace.add_test("unlinked.sy", "# LINK_ERROR\n", "0\n", None);

    let test_list = workspace.discover(false);
    let pipelines = workspace.pipelines(&[]);
    let output_dir = workspace.root().join("output");

    let mut buf = Vec::new();
    let mut builder = TestReporterBuilder::default();
    builder.set_output_dir(&output_dir);
    let mut reporter = builder.build(&test_list, &pipelines, ReporterStderr::Buffer(&mut buf));

    let mut runner_builder = TestRunnerBuilder::default();
    runner_builder.set_test_threads(TestThreads::Count(2));
    let runner = runner_builder
        .build(&test_list, &workspace.config, &pipelines, &workspace.tools)
        .unwrap();
    let results = runner
        .try_execute(|event| reporter.report_event(event))
        .expect("reporting succeeded");
    reporter.finish();
    drop(reporter);

    assert_eq!(results.report.passed, 1);
    let stderr = String::from_utf8(buf).unwrap();
    assert!(
        stderr.contains("3 tests run: 1 passed, 2 failed"),
        "summary is present: {stderr}"
    );

    let sanitized = |name: &str| {
        workspace
            .tests_dir()
            .join(name)
            .as_str()
            .replace(['/', '\\'], "_")
    };
    let mismatch = sanitized("mismatch.sy");
    assert_eq!(
        std::fs::read_to_string(output_dir.join(format!("program-stdout-{mismatch}.txt"))).unwrap(),
        "2\n"
    );
    assert!(output_dir.join(format!("compiler-stdout-{mismatch}.txt")).is_file());

    let unlinked = sanitized("unlinked.sy");
    assert_eq!(
        std::fs::read_to_string(output_dir.join(format!("linker-stderr-{unlinked}.txt"))).unwrap(),
        "undefined reference to `getint'\n"
    );
    assert!(
        !output_dir
            .join(format!("program-stdout-{}.txt", sanitized("pass.sy")))
            .exists(),
        "passing tests leave no artifacts"
    );
}

#[test]
fn background_jobs_do_not_outlive_a_test() {
    let workspace = Workspace::new();
    let exited = workspace.root().join("exited-marker");
    let timed_out = workspace.root().join("timed-out-marker");
    workspace.add_test(
        "exits.sy",
        &format!("(sleep 1; touch '{exited}') &\necho hi\n"),
        "hi\n0\n",
        None,
    );
    workspace.add_test(
        "hangs.sy",
        &format!("(sleep 2; touch '{timed_out}') &\nsleep 30\n"),
        "0\n",
        None,
    );

    let test_list = workspace.discover(false);
    let pipelines = workspace.pipelines(&[]);
    let (results, _) = run(&workspace, &test_list, &pipelines, false);

    assert_eq!(outcome_of(&results.report, "exits.sy"), &Outcome::Pass { elapsed: None });
    assert!(matches!(
        outcome_of(&results.report, "hangs.sy"),
        Outcome::RuntimeTimeout { .. }
    ));

    std::thread::sleep(Duration::from_millis(2500));
    assert!(!exited.exists(), "background job of a passing test was killed");
    assert!(!timed_out.exists(), "background job of a timed-out test was killed");
}

#[cfg(target_os = "linux")]
#[test]
fn stray_entries_do_not_stop_discovery() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    let workspace = Workspace::new();
    workspace.add_test("a.sy", "echo a\n", "a\n0\n", None);
    workspace.add_test("sub/b.sy", "echo b\n", "b\n0\n", None);
    let sub = workspace.tests_dir().join("sub");
    std::fs::write(sub.as_std_path().join(OsStr::from_bytes(b"notes\xff.txt")), "").unwrap();

    let test_list = workspace.discover(true);
    assert_eq!(test_list.len(), 2);
    let pipelines = workspace.pipelines(&[]);
    let (results, _) = run(&workspace, &test_list, &pipelines, false);

    assert_eq!(results.report.passed, 2);
    assert!(results.report.discovery_issues.is_empty());
}
