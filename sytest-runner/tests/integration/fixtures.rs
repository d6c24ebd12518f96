// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A fake toolchain built out of shell scripts.
//!
//! Test sources are themselves shell scripts. The "compiler" copies the source to `{asm}`, and
//! the "linker" copies that to `{binary}` and marks it executable, so running a test runs its
//! source. Markers in the source make the toolchain misbehave:
//!
//! * `COMPILE_ERROR` / `COMPILE_HANG`: the compiler fails or hangs.
//! * `LINK_ERROR`: the linker fails.

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use indoc::indoc;
use std::{fs, time::Duration};
use sytest_runner::{
    config::{HarnessConfig, Pipeline, TestThreads, ToolPaths},
    reporter::HarnessEvent,
    runner::{RunResults, TestRunnerBuilder},
    test_list::{DiscoveryOptions, TestList},
};

const COMPILER: &str = indoc! {r#"
    if grep -q COMPILE_ERROR "$1"; then
        echo "compiling $1"
        echo "error: expected ';'" >&2
        exit 1
    fi
    if grep -q COMPILE_HANG "$1"; then
        sleep 30
    fi
    echo "compiling $1"
    cp "$1" "$2"
"#};

const LINKER: &str = indoc! {r#"
    if grep -q LINK_ERROR "$1"; then
        echo "linking"
        echo "undefined reference to \`getint'" >&2
        exit 1
    fi
    cp "$1" "$2" && chmod +x "$2"
"#};

const CONFIG: &str = indoc! {r#"
    [run]
    timeout = "1s"
    test-threads = 4
    default-pipeline = "sh"

    [pipeline.sh]
    stages = [
        { name = "compile", role = "compile", timeout = "1s", command = [
            "/bin/sh", "{compiler}", "{input}", "{asm}",
        ] },
        { name = "link", role = "link", timeout = "5s", command = [
            "/bin/sh", "{link-lib}", "{asm}", "{binary}",
        ] },
    ]

    [pipeline.sh-slow]
    run-timeout = "5s"
    stages = [
        { name = "compile", timeout = "5s", command = [
            "/bin/sh", "{compiler}", "{input}", "{asm}",
        ] },
        { name = "link", timeout = "5s", command = ["/bin/sh", "{link-lib}", "{asm}", "{binary}"] },
    ]
"#};

/// A scratch workspace with a toolchain, a config and a test directory.
pub(crate) struct Workspace {
    dir: Utf8TempDir,
    pub(crate) config: HarnessConfig,
    pub(crate) tools: ToolPaths,
}

impl Workspace {
    pub(crate) fn new() -> Self {
        let dir = camino_tempfile::Builder::new()
            .prefix("sytest-integration-")
            .tempdir()
            .expect("created temp dir");
        let root = dir.path();

        fs::write(root.join("compiler.sh"), COMPILER).expect("wrote compiler");
        fs::write(root.join("linker.sh"), LINKER).expect("wrote linker");
        fs::write(root.join("sytest.toml"), CONFIG).expect("wrote config");
        fs::create_dir(root.join("tests")).expect("created tests dir");

        let config = HarnessConfig::from_sources(root, None).expect("config is valid");
        let tools = ToolPaths {
            compiler: root.join("compiler.sh"),
            link_lib: root.join("linker.sh"),
            c_lib: None,
        };
        Self { dir, config, tools }
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn tests_dir(&self) -> Utf8PathBuf {
        self.root().join("tests")
    }

    /// Adds a test whose program is the shell script `body`, with the given golden file and
    /// optional stdin.
    pub(crate) fn add_test(&self, rel_path: &str, body: &str, golden: &str, stdin: Option<&str>) {
        let source = self.tests_dir().join(rel_path);
        fs::create_dir_all(source.parent().expect("source has a parent"))
            .expect("created parent dir");
        fs::write(&source, format!("#!/bin/sh\n{body}")).expect("wrote source");
        fs::write(source.with_extension("out"), golden).expect("wrote golden");
        if let Some(stdin) = stdin {
            fs::write(source.with_extension("in"), stdin).expect("wrote stdin");
        }
    }

    pub(crate) fn discover(&self, recursive: bool) -> TestList {
        let options = DiscoveryOptions {
            recursive,
            extension: self.config.extension().to_owned(),
        };
        TestList::discover(self.tests_dir(), &options).expect("discovery succeeded")
    }

    pub(crate) fn pipelines(&self, names: &[&str]) -> Vec<Pipeline> {
        self.config.pipelines(names).expect("pipelines exist")
    }
}

/// Runs every test through `pipelines`, returning the results and the number of finished events.
pub(crate) fn run(
    workspace: &Workspace,
    test_list: &TestList,
    pipelines: &[Pipeline],
    performance: bool,
) -> (RunResults, usize) {
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_test_threads(TestThreads::Count(4))
        .set_performance(performance);
    let runner = builder
        .build(test_list, &workspace.config, pipelines, &workspace.tools)
        .expect("runner built");

    let mut finished = 0;
    let results = runner.execute(|event| {
        if let HarnessEvent::TestFinished { .. } = event {
            finished += 1;
        }
    });
    (results, finished)
}

/// A run timeout short enough to keep the suite quick.
pub(crate) const SHORT_TIMEOUT: Duration = Duration::from_secs(1);
