// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use sytest_runner::{
    outcome::Outcome,
    perf::{Baseline, PerformanceTracker},
    reporter::ComparisonTable,
};

const TIMED: &str = "echo 1\necho 'TOTAL: 0H-0M-1S-500000us' >&2\n";

#[test]
fn timer_is_recorded_and_compared() {
    let workspace = Workspace::new();
    workspace.add_test("timed.sy", TIMED, "1\n0\n", None);
    workspace.add_test("untimed.sy", "echo 1\n", "1\n0\n", None);

    let test_list = workspace.discover(false);
    let pipelines = workspace.pipelines(&[]);
    let baseline_dir = workspace.root().join("baseline");

    let timed_path = workspace.tests_dir().join("timed.sy");
    let mut previous = Baseline::default();
    previous.insert(timed_path.as_str(), 1.0);
    previous
        .persist(&PerformanceTracker::baseline_path(&baseline_dir, "sh"))
        .unwrap();

    let (mut tracker, errors) = PerformanceTracker::load(&baseline_dir, &pipelines);
    assert!(errors.is_empty(), "baseline loaded: {errors:?}");

    let (results, _) = run(&workspace, &test_list, &pipelines, true);
    assert!(
        results.is_success(),
        "a missing timer doesn't fail a test: {:?}",
        results.report.failures
    );
    let untimed = results
        .results
        .iter()
        .find(|result| test_list.cases()[result.case].path().ends_with("untimed.sy"))
        .unwrap();
    assert_eq!(untimed.outcome, Outcome::Pass { elapsed: None });
    assert!(untimed.timer_error.is_some());

    tracker.record_results(&test_list, &results);
    let comparisons = tracker.comparisons();
    assert_eq!(comparisons.len(), 1);
    let (pipeline, comparisons) = &comparisons[0];
    assert_eq!(*pipeline, "sh");
    assert_eq!(comparisons.len(), 1, "only timed passes are sampled");
    assert_eq!(comparisons[0].path, timed_path.as_str());
    assert_eq!(comparisons[0].current, 1.5);
    assert_eq!(comparisons[0].previous, Some(1.0));
    assert_eq!(comparisons[0].delta, Some(0.5));

    tracker.persist().unwrap();
    let persisted =
        Baseline::load(&PerformanceTracker::baseline_path(&baseline_dir, "sh")).unwrap();
    assert_eq!(persisted.get(timed_path.as_str()), Some(1.5));
    assert_eq!(persisted.len(), 1);
}

#[test]
fn corrupt_baseline_is_replaced() {
    let workspace = Workspace::new();
    workspace.add_test("timed.sy", TIMED, "1\n0\n", None);

    let test_list = workspace.discover(false);
    let pipelines = workspace.pipelines(&["sh", "sh-slow"]);
    let baseline_dir = workspace.root().join("baseline");
    std::fs::create_dir(&baseline_dir).unwrap();
    std::fs::write(
        PerformanceTracker::baseline_path(&baseline_dir, "sh"),
        "{ not json",
    )
    .unwrap();

    let (mut tracker, errors) = PerformanceTracker::load(&baseline_dir, &pipelines);
    assert_eq!(errors.len(), 1, "only the corrupt baseline errors");

    let (results, _) = run(&workspace, &test_list, &pipelines, true);
    tracker.record_results(&test_list, &results);
    for (_, comparisons) in tracker.comparisons() {
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].previous, None);
    }

    let table = ComparisonTable::new(tracker.samples());
    assert_eq!(table.pipelines(), ["sh", "sh-slow"]);
    let mut csv = Vec::new();
    table.write_csv(&mut csv).unwrap();
    assert_eq!(
        String::from_utf8(csv).unwrap(),
        format!("file,sh,sh-slow\n{},1.5,1.5\n", workspace.tests_dir().join("timed.sy"))
    );

    tracker.persist().unwrap();
    let repaired =
        Baseline::load(&PerformanceTracker::baseline_path(&baseline_dir, "sh")).unwrap();
    assert_eq!(repaired.len(), 1);
}
