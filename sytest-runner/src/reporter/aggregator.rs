// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Folding per-test outcomes into reports.

use crate::{
    config::Pipeline,
    outcome::Outcome,
    runner::TestResult,
    test_list::{DiscoveryIssue, TestDir, TestDirEntry, TestList},
};
use camino::Utf8PathBuf;
use serde::Serialize;

/// The outcome of one test through one pipeline, as it appears in a report.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportEntry {
    /// The test source.
    pub path: Utf8PathBuf,

    /// The pipeline.
    pub pipeline: String,

    /// The outcome.
    pub outcome: Outcome,
}

/// Counts and lists of outcomes.
///
/// Reports combine associatively: counts add and lists concatenate.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AggregateReport {
    /// The number of (test, pipeline) pairs that were run.
    pub tested: usize,

    /// The number of those that passed.
    pub passed: usize,

    /// Passing entries, with timing if it was measured.
    pub passes: Vec<ReportEntry>,

    /// Failing entries.
    pub failures: Vec<ReportEntry>,

    /// Tests that were skipped during discovery. These aren't counted as tested.
    pub discovery_issues: Vec<DiscoveryIssue>,
}

impl AggregateReport {
    /// Builds the report for a whole run by folding over the discovery tree.
    ///
    /// `results` must be sorted by case and then pipeline.
    pub fn from_tree(test_list: &TestList, pipelines: &[Pipeline], results: &[TestResult]) -> Self {
        let by_case = ResultsByCase::new(test_list, results);
        let mut report = Self::fold_dir(test_list.tree(), test_list, pipelines, &by_case);
        report.discovery_issues = test_list.issues().to_vec();
        report
    }

    /// Builds the report for a single directory of the discovery tree, including its
    /// sub-directories.
    pub fn for_dir(
        dir: &TestDir,
        test_list: &TestList,
        pipelines: &[Pipeline],
        results: &[TestResult],
    ) -> Self {
        let by_case = ResultsByCase::new(test_list, results);
        Self::fold_dir(dir, test_list, pipelines, &by_case)
    }

    /// Records one outcome.
    pub fn record(&mut self, entry: ReportEntry) {
        self.tested += 1;
        if entry.outcome.is_pass() {
            self.passed += 1;
            self.passes.push(entry);
        } else {
            self.failures.push(entry);
        }
    }

    /// Merges `other` into `self`, appending its lists after this report's.
    pub fn merge(&mut self, other: Self) {
        self.tested += other.tested;
        self.passed += other.passed;
        self.passes.extend(other.passes);
        self.failures.extend(other.failures);
        self.discovery_issues.extend(other.discovery_issues);
    }

    /// Returns the number of failures.
    pub fn failed(&self) -> usize {
        self.tested - self.passed
    }

    /// Returns true if every test that was run passed.
    pub fn is_success(&self) -> bool {
        self.tested == self.passed
    }

    fn fold_dir(
        dir: &TestDir,
        test_list: &TestList,
        pipelines: &[Pipeline],
        by_case: &ResultsByCase<'_>,
    ) -> Self {
        let mut report = Self::default();
        for entry in dir.entries() {
            match entry {
                TestDirEntry::Case(idx) => {
                    let path = test_list.cases()[*idx].path();
                    for result in by_case.get(*idx) {
                        report.record(ReportEntry {
                            path: path.to_owned(),
                            pipeline: pipelines[result.pipeline].name().to_owned(),
                            outcome: result.outcome.clone(),
                        });
                    }
                }
                TestDirEntry::Dir(child) => {
                    report.merge(Self::fold_dir(child, test_list, pipelines, by_case));
                }
            }
        }
        report
    }
}

struct ResultsByCase<'a> {
    by_case: Vec<Vec<&'a TestResult>>,
}

impl<'a> ResultsByCase<'a> {
    fn new(test_list: &TestList, results: &'a [TestResult]) -> Self {
        let mut by_case = vec![Vec::new(); test_list.len()];
        for result in results {
            if let Some(slot) = by_case.get_mut(result.case) {
                slot.push(result);
            }
        }
        Self { by_case }
    }

    fn get(&self, case: usize) -> &[&'a TestResult] {
        self.by_case.get(case).map_or(&[], Vec::as_slice)
    }
}
