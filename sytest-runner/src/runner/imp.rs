// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::executor::{StageResult, run_stage};
use crate::{
    config::{
        HarnessConfig, Pipeline, Placeholder, PlaceholderValues, StageRole, TestThreads, ToolPaths,
    },
    errors::{TestRunnerBuildError, TimerParseError},
    outcome::Outcome,
    reporter::{AggregateReport, HarnessEvent},
    test_list::{TestCase, TestList},
    time::stopwatch,
    timer::parse_timer,
};
use chrono::{DateTime, Local};
use futures::prelude::*;
use std::{convert::Infallible, time::Duration};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// The tracing target that per-test outcomes are logged under.
pub const OUTCOME_TARGET: &str = "sytest_runner::outcome";

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
    run_timeout: Option<Duration>,
    performance: bool,
}

impl TestRunnerBuilder {
    /// Sets the number of tests to run simultaneously, overriding the config.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets the run-stage timeout for every pipeline, overriding the config.
    pub fn set_run_timeout(&mut self, run_timeout: Duration) -> &mut Self {
        self.run_timeout = Some(run_timeout);
        self
    }

    /// Enables performance mode: the timer trailer is extracted from every passing test.
    pub fn set_performance(&mut self, performance: bool) -> &mut Self {
        self.performance = performance;
        self
    }

    /// Creates a new test runner.
    pub fn build<'a>(
        self,
        test_list: &'a TestList,
        config: &HarnessConfig,
        pipelines: &'a [Pipeline],
        tools: &'a ToolPaths,
    ) -> Result<TestRunner<'a>, TestRunnerBuildError> {
        if pipelines.is_empty() {
            return Err(TestRunnerBuildError::NoPipelines);
        }
        if tools.c_lib.is_none() {
            if let Some(pipeline) = pipelines
                .iter()
                .find(|pipeline| pipeline.uses_placeholder(Placeholder::CLib))
            {
                return Err(TestRunnerBuildError::MissingCLib {
                    pipeline: pipeline.name().to_owned(),
                });
            }
        }

        let test_threads = self
            .test_threads
            .unwrap_or_else(|| config.test_threads())
            .compute()
            .max(1);
        let run_timeouts = pipelines
            .iter()
            .map(|pipeline| {
                self.run_timeout
                    .or(pipeline.run_timeout())
                    .unwrap_or_else(|| config.run_timeout())
            })
            .collect();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("sytest-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            test_list,
            pipelines,
            tools,
            run_timeouts,
            test_threads,
            performance: self.performance,
            runtime,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<'a> {
    test_list: &'a TestList,
    pipelines: &'a [Pipeline],
    tools: &'a ToolPaths,
    run_timeouts: Vec<Duration>,
    test_threads: usize,
    performance: bool,
    runtime: Runtime,
}

impl<'a> TestRunner<'a> {
    /// Runs every test through every pipeline.
    ///
    /// The callback is called with progress events.
    pub fn execute<F>(&self, mut callback: F) -> RunResults
    where
        F: FnMut(HarnessEvent<'a>),
    {
        match self.try_execute::<Infallible, _>(|event| {
            callback(event);
            Ok(())
        }) {
            Ok(results) => results,
            Err(never) => match never {},
        }
    }

    /// Runs every test through every pipeline.
    ///
    /// Accepts a callback that is called with progress events. If the callback returns an error,
    /// it is no longer called, the remaining tests still run to completion, and the first error is
    /// returned.
    pub fn try_execute<E, F>(&self, callback: F) -> Result<RunResults, E>
    where
        F: FnMut(HarnessEvent<'a>) -> Result<(), E>,
    {
        let stopwatch = stopwatch();
        let test_list = self.test_list;
        let pipelines = self.pipelines;

        let mut ctx = CallbackContext {
            callback,
            first_error: None,
        };
        ctx.send(HarnessEvent::RunStarted {
            test_list,
            pipelines,
            start_time: stopwatch.start_time(),
        });

        let jobs: Vec<(usize, usize)> = (0..test_list.len())
            .flat_map(|case| (0..pipelines.len()).map(move |pipeline| (case, pipeline)))
            .collect();
        let mut results = Vec::with_capacity(jobs.len());

        self.runtime.block_on(async {
            let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();

            let run_fut = futures::stream::iter(jobs)
                .map(move |(case_idx, pipeline_idx)| {
                    let sender = sender.clone();
                    async move {
                        let case = &test_list.cases()[case_idx];
                        let pipeline = &pipelines[pipeline_idx];

                        // Failure to send means the receiver was dropped.
                        let _ = sender.send(InternalEvent::Started { case, pipeline });
                        let execution = self
                            .run_pipeline(case, pipeline, self.run_timeouts[pipeline_idx])
                            .await;
                        let _ = sender.send(InternalEvent::Finished {
                            case_idx,
                            pipeline_idx,
                            execution,
                        });
                    }
                })
                // buffer_unordered means tests are started in order but finish in any order.
                .buffer_unordered(self.test_threads)
                .collect::<()>();
            tokio::pin!(run_fut);

            loop {
                tokio::select! {
                    biased;

                    Some(event) = receiver.recv() => {
                        handle_event(event, test_list, pipelines, &mut ctx, &mut results);
                    }
                    () = &mut run_fut => {
                        // Every event has been sent by now.
                        while let Ok(event) = receiver.try_recv() {
                            handle_event(event, test_list, pipelines, &mut ctx, &mut results);
                        }
                        break;
                    }
                }
            }
        });

        results.sort_by_key(|result: &TestResult| (result.case, result.pipeline));
        let report = AggregateReport::from_tree(test_list, pipelines, &results);
        let snapshot = stopwatch.snapshot();

        ctx.send(HarnessEvent::RunFinished {
            start_time: snapshot.start_time,
            elapsed: snapshot.duration,
            report: report.clone(),
        });

        match ctx.first_error {
            None => Ok(RunResults {
                start_time: snapshot.start_time,
                elapsed: snapshot.duration,
                results,
                report,
            }),
            Some(error) => Err(error),
        }
    }

    // ---
    // Helper methods
    // ---

    /// Runs a single test through a single pipeline, in its own scratch directory.
    async fn run_pipeline(
        &self,
        case: &TestCase,
        pipeline: &Pipeline,
        run_timeout: Duration,
    ) -> PipelineExecution {
        let stopwatch = stopwatch();
        let mut stages = Vec::with_capacity(pipeline.stages().len());

        let finish = |stages: Vec<StageRecord>,
                      run: Option<StageResult>,
                      outcome: Outcome,
                      timer_error: Option<TimerParseError>| PipelineExecution {
            stages,
            run,
            outcome,
            timer_error,
            time_taken: stopwatch.snapshot().duration,
        };

        let scratch = match camino_tempfile::Builder::new().prefix("sytest-").tempdir() {
            Ok(scratch) => scratch,
            Err(error) => {
                // Charge the failure to the first stage, which can't run without it.
                let stage = &pipeline.stages()[0];
                let result = StageResult::exec_fail(
                    format!("failed to create scratch directory: {error}"),
                    Duration::ZERO,
                );
                let outcome = Outcome::stage_failed(stage, &result.status, &result.stderr);
                stages.push(StageRecord {
                    name: stage.name().to_owned(),
                    role: stage.role(),
                    result,
                });
                return finish(stages, None, outcome, None);
            }
        };

        let asm = scratch.path().join("test.s");
        let binary = scratch
            .path()
            .join(format!("test{}", std::env::consts::EXE_SUFFIX));
        let values = PlaceholderValues {
            tools: self.tools,
            input: case.path(),
            asm: &asm,
            binary: &binary,
        };

        for stage in pipeline.stages() {
            let (program, args) = stage.resolve(&values);
            let result = run_stage(&program, &args, None, stage.timeout()).await;
            let failure = Outcome::from_setup_stage(stage, &result);
            stages.push(StageRecord {
                name: stage.name().to_owned(),
                role: stage.role(),
                result,
            });
            if let Some(outcome) = failure {
                return finish(stages, None, outcome, None);
            }
        }

        let run = run_stage(binary.as_str(), &[], case.input(), run_timeout).await;
        let mut outcome = Outcome::classify(&run, case.expected());
        let mut timer_error = None;

        if self.performance && outcome.is_pass() {
            match parse_timer(&run.stderr) {
                Ok(elapsed) => outcome = Outcome::Pass {
                    elapsed: Some(elapsed),
                },
                Err(error) => {
                    warn!("{}: {error}", case.path());
                    timer_error = Some(error);
                }
            }
        }

        finish(stages, Some(run), outcome, timer_error)
    }
}

/// A setup stage that was run as part of a pipeline.
#[derive(Clone, Debug)]
pub struct StageRecord {
    /// The name of the stage.
    pub name: String,

    /// The role of the stage.
    pub role: StageRole,

    /// What happened.
    pub result: StageResult,
}

/// Everything that happened while running one test through one pipeline.
#[derive(Clone, Debug)]
pub struct PipelineExecution {
    /// The setup stages that ran, in order. The last one failed if `run` is `None`.
    pub stages: Vec<StageRecord>,

    /// The run of the produced program, if every setup stage succeeded.
    pub run: Option<StageResult>,

    /// The classified outcome.
    pub outcome: Outcome,

    /// Set if performance mode is on, the test passed, and no timer was found.
    pub timer_error: Option<TimerParseError>,

    /// Wall-clock time for the whole pipeline.
    pub time_taken: Duration,
}

impl PipelineExecution {
    /// Returns the stdout of the first setup stage, which is conventionally the compiler.
    pub fn compiler_stdout(&self) -> Option<&[u8]> {
        self.stages.first().map(|stage| &stage.result.stdout[..])
    }

    /// Returns the last link stage that ran, if any.
    pub fn last_link_stage(&self) -> Option<&StageRecord> {
        self.stages
            .iter()
            .rev()
            .find(|stage| stage.role == StageRole::Link)
    }
}

/// The result of one (test, pipeline) pair, as kept after the run.
#[derive(Clone, Debug)]
pub struct TestResult {
    /// The index of the test case in the [`TestList`].
    pub case: usize,

    /// The index of the pipeline in the list passed to the runner.
    pub pipeline: usize,

    /// The outcome.
    pub outcome: Outcome,

    /// The timer extraction error, if any.
    pub timer_error: Option<TimerParseError>,

    /// Wall-clock time for the whole pipeline.
    pub time_taken: Duration,
}

/// The results of a test run.
#[derive(Clone, Debug)]
pub struct RunResults {
    /// When the run started.
    pub start_time: DateTime<Local>,

    /// How long the run took.
    pub elapsed: Duration,

    /// One result per (test, pipeline) pair, in discovery order and then pipeline order.
    pub results: Vec<TestResult>,

    /// The aggregated report.
    pub report: AggregateReport,
}

impl RunResults {
    /// Returns true if every test passed.
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

#[derive(Debug)]
enum InternalEvent<'a> {
    Started {
        case: &'a TestCase,
        pipeline: &'a Pipeline,
    },
    Finished {
        case_idx: usize,
        pipeline_idx: usize,
        execution: PipelineExecution,
    },
}

struct CallbackContext<F, E> {
    callback: F,
    first_error: Option<E>,
}

impl<'a, F, E> CallbackContext<F, E>
where
    F: FnMut(HarnessEvent<'a>) -> Result<(), E>,
{
    fn send(&mut self, event: HarnessEvent<'a>) {
        if self.first_error.is_some() {
            return;
        }
        if let Err(error) = (self.callback)(event) {
            self.first_error = Some(error);
        }
    }
}

fn handle_event<'a, F, E>(
    event: InternalEvent<'a>,
    test_list: &'a TestList,
    pipelines: &'a [Pipeline],
    ctx: &mut CallbackContext<F, E>,
    results: &mut Vec<TestResult>,
) where
    F: FnMut(HarnessEvent<'a>) -> Result<(), E>,
{
    match event {
        InternalEvent::Started { case, pipeline } => {
            debug!(path = %case.path(), pipeline = pipeline.name(), "test started");
            ctx.send(HarnessEvent::TestStarted { case, pipeline });
        }
        InternalEvent::Finished {
            case_idx,
            pipeline_idx,
            execution,
        } => {
            let case = &test_list.cases()[case_idx];
            let pipeline = &pipelines[pipeline_idx];
            info!(
                target: OUTCOME_TARGET,
                "{} [{}] {}: {}",
                case.path(),
                pipeline.name(),
                execution.outcome.kind(),
                serde_json::to_string(&execution.outcome).unwrap_or_default(),
            );

            results.push(TestResult {
                case: case_idx,
                pipeline: pipeline_idx,
                outcome: execution.outcome.clone(),
                timer_error: execution.timer_error.clone(),
                time_taken: execution.time_taken,
            });
            ctx.send(HarnessEvent::TestFinished {
                case,
                pipeline,
                execution,
            });
        }
    }
}
