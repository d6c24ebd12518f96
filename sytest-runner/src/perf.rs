// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Performance tracking against the baseline of the previous run.
//!
//! Each pipeline has its own baseline at `<baseline-dir>/<pipeline>.json`: a JSON object mapping
//! test paths to elapsed seconds. The baseline is loaded once before a run and replaced wholesale
//! after it.

use crate::{
    config::Pipeline,
    errors::{BaselineReadError, BaselineWriteError},
    outcome::Outcome,
    runner::RunResults,
    test_list::TestList,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fs, io, io::Write};
use tracing::debug;

/// Elapsed times by test path.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Baseline {
    entries: IndexMap<String, f64>,
}

impl Baseline {
    /// Loads a baseline. A missing file is an empty baseline.
    pub fn load(path: &Utf8Path) -> Result<Self, BaselineReadError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("no baseline at {path}");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(BaselineReadError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|error| BaselineReadError::Parse {
            path: path.to_owned(),
            error,
        })
    }

    /// Atomically replaces the baseline at `path` with this one.
    pub fn persist(&self, path: &Utf8Path) -> Result<(), BaselineWriteError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|error| BaselineWriteError::CreateDir {
                path: dir.to_owned(),
                error,
            })?;
        }

        let json =
            serde_json::to_string_pretty(self).map_err(|error| BaselineWriteError::Serialize {
                path: path.to_owned(),
                error,
            })?;

        atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(json.as_bytes()))
            .map_err(|error| BaselineWriteError::Write {
                path: path.to_owned(),
                error,
            })
    }

    /// Returns the recorded time for `path`.
    pub fn get(&self, path: &str) -> Option<f64> {
        self.entries.get(path).copied()
    }

    /// Records a time for `path`.
    pub fn insert(&mut self, path: impl Into<String>, elapsed: f64) {
        self.entries.insert(path.into(), elapsed);
    }

    /// Iterates over the entries, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(path, elapsed)| (path.as_str(), *elapsed))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Returns the relative change from `previous` to `current`, or `None` if `previous` can't be
/// divided by.
pub fn regression_delta(current: f64, previous: f64) -> Option<f64> {
    (previous != 0.0 && previous.is_finite()).then(|| current / previous - 1.0)
}

/// One timing sample compared against the baseline.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Comparison {
    /// The test path.
    pub path: String,
    /// The elapsed time in this run.
    pub current: f64,
    /// The elapsed time in the baseline, if the test was in it.
    pub previous: Option<f64>,
    /// `current / previous - 1`, if there is a usable previous time.
    pub delta: Option<f64>,
}

/// Tracks timing samples for each pipeline against its baseline.
#[derive(Clone, Debug)]
pub struct PerformanceTracker {
    baseline_dir: Utf8PathBuf,
    pipelines: Vec<PipelineTimings>,
}

#[derive(Clone, Debug)]
struct PipelineTimings {
    name: String,
    previous: Baseline,
    current: Baseline,
}

impl PerformanceTracker {
    /// Loads the baselines for `pipelines` from `baseline_dir`.
    ///
    /// Baselines that can't be read are replaced with empty ones; the errors are returned so they
    /// can be reported as warnings.
    pub fn load(
        baseline_dir: impl Into<Utf8PathBuf>,
        pipelines: &[Pipeline],
    ) -> (Self, Vec<BaselineReadError>) {
        let baseline_dir = baseline_dir.into();
        let mut errors = Vec::new();

        let pipelines = pipelines
            .iter()
            .map(|pipeline| {
                let path = Self::baseline_path(&baseline_dir, pipeline.name());
                let previous = Baseline::load(&path).unwrap_or_else(|error| {
                    errors.push(error);
                    Baseline::default()
                });
                PipelineTimings {
                    name: pipeline.name().to_owned(),
                    previous,
                    current: Baseline::default(),
                }
            })
            .collect();

        (
            Self {
                baseline_dir,
                pipelines,
            },
            errors,
        )
    }

    /// Returns the path to the baseline for a pipeline.
    pub fn baseline_path(baseline_dir: &Utf8Path, pipeline: &str) -> Utf8PathBuf {
        baseline_dir.join(format!("{pipeline}.json"))
    }

    /// Records a sample for the pipeline at index `pipeline`.
    pub fn record(&mut self, pipeline: usize, path: &Utf8Path, elapsed: f64) {
        if let Some(timings) = self.pipelines.get_mut(pipeline) {
            timings.current.insert(path.as_str(), elapsed);
        }
    }

    /// Records a sample for every passing result that carries a time.
    pub fn record_results(&mut self, test_list: &TestList, results: &RunResults) {
        for result in &results.results {
            if let Outcome::Pass {
                elapsed: Some(elapsed),
            } = result.outcome
            {
                let path = test_list.cases()[result.case].path();
                self.record(result.pipeline, path, elapsed);
            }
        }
    }

    /// Returns the samples of each pipeline compared against its baseline, in recording order.
    pub fn comparisons(&self) -> Vec<(&str, Vec<Comparison>)> {
        self.pipelines
            .iter()
            .map(|timings| {
                let comparisons = timings
                    .current
                    .iter()
                    .map(|(path, current)| {
                        let previous = timings.previous.get(path);
                        let delta =
                            previous.and_then(|previous| regression_delta(current, previous));
                        Comparison {
                            path: path.to_owned(),
                            current,
                            previous,
                            delta,
                        }
                    })
                    .collect();
                (timings.name.as_str(), comparisons)
            })
            .collect()
    }

    /// Returns this run's samples for each pipeline.
    pub fn samples(&self) -> impl Iterator<Item = (&str, &Baseline)> + '_ {
        self.pipelines
            .iter()
            .map(|timings| (timings.name.as_str(), &timings.current))
    }

    /// Replaces each pipeline's baseline with this run's samples.
    pub fn persist(&self) -> Result<(), BaselineWriteError> {
        for timings in &self.pipelines {
            let path = Self::baseline_path(&self.baseline_dir, &timings.name);
            timings.current.persist(&path)?;
            debug!("wrote {} samples to {path}", timings.current.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use camino_tempfile::tempdir;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(2.5, 2.0, Some(0.25) ; "slower")]
    #[test_case(1.0, 2.0, Some(-0.5) ; "faster")]
    #[test_case(1.0, 0.0, None ; "zero baseline")]
    #[test_case(1.0, f64::NAN, None ; "nan baseline")]
    #[test_case(1.0, f64::INFINITY, None ; "infinite baseline")]
    fn delta(current: f64, previous: f64, expected: Option<f64>) {
        assert_eq!(regression_delta(current, previous), expected);
    }

    #[test]
    fn baseline_missing_is_empty() {
        let dir = tempdir().unwrap();
        let baseline = Baseline::load(&dir.path().join("nope.json")).unwrap();
        assert!(baseline.is_empty());
    }

    #[test]
    fn baseline_corrupt_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("default.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Baseline::load(&path),
            Err(BaselineReadError::Parse { .. })
        ));
    }

    #[test]
    fn baseline_persist_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/default.json");

        let mut baseline = Baseline::default();
        baseline.insert("tests/b.sy", 2.0);
        baseline.insert("tests/a.sy", 0.5);
        baseline.persist(&path).unwrap();

        let loaded = Baseline::load(&path).unwrap();
        assert_eq!(loaded, baseline);
        assert_eq!(
            loaded.iter().collect::<Vec<_>>(),
            [("tests/b.sy", 2.0), ("tests/a.sy", 0.5)]
        );
    }

    #[test]
    fn tracker_compares_and_replaces() {
        let dir = tempdir().unwrap();
        let config = HarnessConfig::default_config(dir.path());
        let pipelines = config.pipelines(&["default"]).unwrap();

        let mut previous = Baseline::default();
        previous.insert("t/fft.sy", 2.0);
        previous.insert("t/gone.sy", 1.0);
        previous
            .persist(&PerformanceTracker::baseline_path(dir.path(), "default"))
            .unwrap();

        let (mut tracker, errors) = PerformanceTracker::load(dir.path(), &pipelines);
        assert!(errors.is_empty());
        tracker.record(0, Utf8Path::new("t/fft.sy"), 2.5);
        tracker.record(0, Utf8Path::new("t/new.sy"), 1.0);

        let comparisons = tracker.comparisons();
        assert_eq!(comparisons.len(), 1);
        assert_eq!(comparisons[0].0, "default");
        assert_eq!(
            comparisons[0].1,
            [
                Comparison {
                    path: "t/fft.sy".to_owned(),
                    current: 2.5,
                    previous: Some(2.0),
                    delta: Some(0.25),
                },
                Comparison {
                    path: "t/new.sy".to_owned(),
                    current: 1.0,
                    previous: None,
                    delta: None,
                },
            ]
        );

        tracker.persist().unwrap();
        let persisted =
            Baseline::load(&PerformanceTracker::baseline_path(dir.path(), "default")).unwrap();
        assert_eq!(persisted.get("t/gone.sy"), None, "baseline is replaced, not merged");
        assert_eq!(persisted.len(), 2);
    }

    #[test]
    fn tracker_tolerates_corrupt_baseline() {
        let dir = tempdir().unwrap();
        let config = HarnessConfig::default_config(dir.path());
        let pipelines = config.pipelines(&["default"]).unwrap();
        fs::write(
            PerformanceTracker::baseline_path(dir.path(), "default"),
            "[1, 2",
        )
        .unwrap();

        let (tracker, errors) = PerformanceTracker::load(dir.path(), &pipelines);
        assert_eq!(errors.len(), 1);
        assert!(tracker.comparisons()[0].1.is_empty());
    }
}
