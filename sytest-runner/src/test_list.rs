// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery of test cases.
//!
//! The main structure in this module is [`TestList`], which holds every discovered test case
//! along with the directory tree they were found in.

use crate::{
    errors::{DiscoveryError, GoldenParseError, WriteTestListError},
    normalize::GoldenOutput,
};
use camino::{Utf8Path, Utf8PathBuf};
use owo_colors::{OwoColorize, Style};
use serde::Serialize;
use std::{fmt, fs, io, io::Write};
use tracing::{debug, warn};

/// Options controlling how tests are discovered.
#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    /// Whether to descend into sub-directories.
    pub recursive: bool,

    /// The extension of test sources, without the leading dot.
    pub extension: String,
}

/// A single test case: a source file together with its golden output.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestCase {
    path: Utf8PathBuf,
    prefix: String,
    input: Option<Utf8PathBuf>,
    golden: Utf8PathBuf,
    #[serde(skip)]
    expected: Result<GoldenOutput, GoldenParseError>,
}

impl TestCase {
    /// Returns the path to the test source.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the file name of the test source up to its first `.`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the file fed to the program on stdin, if any.
    pub fn input(&self) -> Option<&Utf8Path> {
        self.input.as_deref()
    }

    /// Returns the path to the golden file.
    pub fn golden(&self) -> &Utf8Path {
        &self.golden
    }

    /// Returns the parsed golden file, or the reason it could not be parsed.
    pub fn expected(&self) -> &Result<GoldenOutput, GoldenParseError> {
        &self.expected
    }
}

/// A problem found during discovery. The test or directory is skipped, but the walk continues.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscoveryIssue {
    /// The test source, or the directory that could not be read.
    pub path: Utf8PathBuf,

    /// The golden file that was expected. `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub golden: Option<Utf8PathBuf>,

    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for DiscoveryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)?;
        if let Some(golden) = &self.golden {
            write!(f, " ({golden})")?;
        }
        Ok(())
    }
}

/// One directory in the discovery tree.
#[derive(Clone, Debug)]
pub struct TestDir {
    path: Utf8PathBuf,
    entries: Vec<TestDirEntry>,
}

impl TestDir {
    /// Returns the path to this directory.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the entries of this directory, in sorted order.
    pub fn entries(&self) -> &[TestDirEntry] {
        &self.entries
    }
}

/// An entry in a [`TestDir`].
#[derive(Clone, Debug)]
pub enum TestDirEntry {
    /// A test case, as an index into [`TestList::cases`].
    Case(usize),

    /// A sub-directory.
    Dir(TestDir),
}

/// The set of discovered tests.
#[derive(Clone, Debug)]
pub struct TestList {
    cases: Vec<TestCase>,
    tree: TestDir,
    issues: Vec<DiscoveryIssue>,
}

impl TestList {
    /// Discovers tests under `root`.
    ///
    /// Within a directory, entries are visited in lexicographic order of their file names, with
    /// sub-directories (if `options.recursive` is set) visited at their sorted position. The
    /// resulting case order is the order tests are reported in.
    pub fn discover(
        root: impl Into<Utf8PathBuf>,
        options: &DiscoveryOptions,
    ) -> Result<Self, DiscoveryError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DiscoveryError::RootNotADirectory { path: root });
        }

        let mut cases = Vec::new();
        let mut issues = Vec::new();
        let tree = walk_dir(root, options, &mut cases, &mut issues)?;

        debug!(
            "discovered {} tests ({} skipped)",
            cases.len(),
            issues.len()
        );
        Ok(Self {
            cases,
            tree,
            issues,
        })
    }

    /// Returns the root of the discovery tree.
    pub fn tree(&self) -> &TestDir {
        &self.tree
    }

    /// Returns all discovered test cases, in discovery order.
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Returns the number of discovered test cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if no test cases were discovered.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Returns the per-test problems found during discovery.
    pub fn issues(&self) -> &[DiscoveryIssue] {
        &self.issues
    }

    /// Outputs this list to the given writer.
    pub fn write(
        &self,
        output_format: OutputFormat,
        writer: impl Write,
        colorize: bool,
    ) -> Result<(), WriteTestListError> {
        match output_format {
            OutputFormat::Human { verbose } => self
                .write_human(writer, verbose, colorize)
                .map_err(WriteTestListError::Io),
            OutputFormat::Serializable(format) => format
                .to_writer(&self.to_summary(), writer)
                .map_err(WriteTestListError::Json),
        }
    }

    /// Returns a serializable summary of this list.
    pub fn to_summary(&self) -> TestListSummary<'_> {
        TestListSummary {
            test_count: self.cases.len(),
            tests: &self.cases,
            discovery_issues: &self.issues,
        }
    }

    fn write_human(&self, mut writer: impl Write, verbose: bool, colorize: bool) -> io::Result<()> {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }

        for case in &self.cases {
            writeln!(writer, "{}", case.path().style(styles.path))?;
            if verbose {
                writeln!(writer, "    golden: {}", case.golden())?;
                if let Some(input) = case.input() {
                    writeln!(writer, "    input: {input}")?;
                }
                if let Err(error) = case.expected() {
                    let heading = "invalid golden file".style(styles.warning);
                    writeln!(writer, "    {heading}: {error}")?;
                }
            }
        }
        for issue in &self.issues {
            writeln!(writer, "{}: {issue}", "skipped".style(styles.warning))?;
        }
        Ok(())
    }
}

/// A serializable summary of a [`TestList`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestListSummary<'a> {
    /// The number of tests that will be run.
    pub test_count: usize,

    /// The tests, in discovery order.
    pub tests: &'a [TestCase],

    /// Tests that were skipped during discovery.
    pub discovery_issues: &'a [DiscoveryIssue],
}

/// Output formats for test lists.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// A human-readable output format.
    Human {
        /// Whether to produce verbose output.
        verbose: bool,
    },

    /// A machine-readable output format.
    Serializable(SerializableFormat),
}

/// A serialized, machine-readable output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SerializableFormat {
    /// JSON with no whitespace.
    Json,
    /// JSON, prettified.
    JsonPretty,
}

impl SerializableFormat {
    /// Write this data in the given format to the writer.
    pub fn to_writer(self, value: &impl Serialize, writer: impl Write) -> serde_json::Result<()> {
        match self {
            SerializableFormat::Json => serde_json::to_writer(writer, value),
            SerializableFormat::JsonPretty => serde_json::to_writer_pretty(writer, value),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    path: Style,
    warning: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.path = Style::new().bold();
        self.warning = Style::new().yellow().bold();
    }
}

fn walk_dir(
    dir: Utf8PathBuf,
    options: &DiscoveryOptions,
    cases: &mut Vec<TestCase>,
    issues: &mut Vec<DiscoveryIssue>,
) -> Result<TestDir, DiscoveryError> {
    let mut children = Vec::new();
    let read_dir = dir
        .read_dir_utf8()
        .map_err(|error| DiscoveryError::ReadDir {
            path: dir.clone(),
            error,
        })?;
    for entry in read_dir {
        // Non-UTF-8 names surface here as errors. They can't be test sources, so skip them.
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!("skipping entry in `{dir}`: {error}");
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) => children.push((entry.file_name().to_owned(), file_type.is_dir())),
            Err(error) => warn!("skipping `{}`: {error}", entry.path()),
        }
    }
    children.sort_unstable();

    let mut entries = Vec::new();
    for (file_name, is_dir) in children {
        let path = dir.join(&file_name);
        if is_dir {
            if options.recursive {
                match walk_dir(path, options, cases, issues) {
                    Ok(child) => entries.push(TestDirEntry::Dir(child)),
                    Err(DiscoveryError::ReadDir { path, error }) => {
                        let issue = DiscoveryIssue {
                            path,
                            golden: None,
                            reason: format!("failed to read directory: {error}"),
                        };
                        warn!("skipping directory: {issue}");
                        issues.push(issue);
                    }
                    Err(error) => return Err(error),
                }
            }
            continue;
        }

        if path.extension() != Some(options.extension.as_str()) || !path.is_file() {
            continue;
        }

        match discover_case(&dir, path, &file_name) {
            Ok(case) => {
                entries.push(TestDirEntry::Case(cases.len()));
                cases.push(case);
            }
            Err(issue) => {
                warn!("skipping test: {issue}");
                issues.push(issue);
            }
        }
    }

    Ok(TestDir { path: dir, entries })
}

fn discover_case(
    dir: &Utf8Path,
    path: Utf8PathBuf,
    file_name: &str,
) -> Result<TestCase, DiscoveryIssue> {
    let prefix = file_name
        .split_once('.')
        .map_or(file_name, |(prefix, _)| prefix)
        .to_owned();
    let golden = dir.join(format!("{prefix}.out"));
    let input = dir.join(format!("{prefix}.in"));

    let contents = match fs::read(&golden) {
        Ok(contents) => contents,
        Err(error) => {
            let reason = if error.kind() == io::ErrorKind::NotFound {
                "golden file not found".to_owned()
            } else {
                format!("failed to read golden file: {error}")
            };
            return Err(DiscoveryIssue {
                path,
                golden: Some(golden),
                reason,
            });
        }
    };
    let expected = GoldenOutput::parse(&String::from_utf8_lossy(&contents));

    Ok(TestCase {
        path,
        prefix,
        input: input.is_file().then_some(input),
        golden,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::{Utf8TempDir, tempdir};
    use pretty_assertions::assert_eq;

    fn write(dir: &Utf8TempDir, path: &str, contents: &str) {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn options(recursive: bool) -> DiscoveryOptions {
        DiscoveryOptions {
            recursive,
            extension: "sy".to_owned(),
        }
    }

    fn relative_paths(dir: &Utf8TempDir, list: &TestList) -> Vec<String> {
        list.cases()
            .iter()
            .map(|case| {
                case.path()
                    .strip_prefix(dir.path())
                    .unwrap()
                    .as_str()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn discover_flat() {
        let dir = tempdir().unwrap();
        write(&dir, "b.sy", "");
        write(&dir, "b.out", "0");
        write(&dir, "a.sy", "");
        write(&dir, "a.out", "3\n0\n");
        write(&dir, "a.in", "1 2");
        write(&dir, "notes.txt", "");
        write(&dir, "sub/c.sy", "");
        write(&dir, "sub/c.out", "0");

        let list = TestList::discover(dir.path(), &options(false)).unwrap();
        assert_eq!(relative_paths(&dir, &list), ["a.sy", "b.sy"]);

        let a = &list.cases()[0];
        assert_eq!(a.prefix(), "a");
        assert_eq!(a.input(), Some(dir.path().join("a.in").as_path()));
        assert_eq!(a.golden(), dir.path().join("a.out"));
        assert_eq!(
            a.expected(),
            &Ok(GoldenOutput {
                lines: vec!["3".to_owned()],
                return_code: 0,
            })
        );
        assert_eq!(list.cases()[1].input(), None);
    }

    #[test]
    fn discover_recursive_order() {
        let dir = tempdir().unwrap();
        for path in ["m.sy", "a/x.sy", "a/b/y.sy", "z/w.sy", "c.sy"] {
            write(&dir, path, "");
            write(&dir, &path.replace(".sy", ".out"), "0");
        }

        let list = TestList::discover(dir.path(), &options(true)).unwrap();
        assert_eq!(
            relative_paths(&dir, &list),
            ["a/b/y.sy", "a/x.sy", "c.sy", "m.sy", "z/w.sy"]
        );

        let tree = list.tree();
        assert_eq!(tree.entries().len(), 4, "a/, c.sy, m.sy, z/");
        match &tree.entries()[0] {
            TestDirEntry::Dir(a) => {
                assert_eq!(a.path(), dir.path().join("a"));
                assert!(matches!(a.entries()[0], TestDirEntry::Dir(_)));
                assert!(matches!(a.entries()[1], TestDirEntry::Case(1)));
            }
            other => panic!("expected directory, found {other:?}"),
        }
    }

    #[test]
    fn prefix_stops_at_first_dot() {
        let dir = tempdir().unwrap();
        write(&dir, "long.name.sy", "");
        write(&dir, "long.out", "0");

        let list = TestList::discover(dir.path(), &options(false)).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.cases()[0].prefix(), "long");
    }

    #[test]
    fn missing_golden_is_an_issue() {
        let dir = tempdir().unwrap();
        write(&dir, "lonely.sy", "");
        write(&dir, "fine.sy", "");
        write(&dir, "fine.out", "0");

        let list = TestList::discover(dir.path(), &options(false)).unwrap();
        assert_eq!(relative_paths(&dir, &list), ["fine.sy"]);
        assert_eq!(list.issues().len(), 1);
        assert_eq!(list.issues()[0].path, dir.path().join("lonely.sy"));
        assert_eq!(list.issues()[0].reason, "golden file not found");
    }

    #[test]
    fn invalid_golden_is_kept() {
        let dir = tempdir().unwrap();
        write(&dir, "bad.sy", "");
        write(&dir, "bad.out", "\n\n");

        let list = TestList::discover(dir.path(), &options(false)).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.cases()[0].expected(), &Err(GoldenParseError::Empty));
    }

    #[test]
    fn write_list() {
        let dir = tempdir().unwrap();
        write(&dir, "a.sy", "");
        write(&dir, "a.out", "0");
        write(&dir, "a.in", "");
        write(&dir, "b.sy", "");

        let list = TestList::discover(dir.path(), &options(false)).unwrap();

        let mut buf = Vec::new();
        list.write(OutputFormat::Human { verbose: true }, &mut buf, false)
            .unwrap();
        let human = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = human.lines().collect();
        assert_eq!(lines[0], dir.path().join("a.sy").as_str());
        assert_eq!(
            lines[1],
            format!("    golden: {}", dir.path().join("a.out"))
        );
        assert_eq!(lines[2], format!("    input: {}", dir.path().join("a.in")));
        assert!(lines[3].starts_with("skipped: "));

        let mut buf = Vec::new();
        list.write(
            OutputFormat::Serializable(SerializableFormat::Json),
            &mut buf,
            false,
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["test-count"], 1);
        assert_eq!(json["tests"][0]["prefix"], "a");
        assert_eq!(
            json["discovery-issues"][0]["reason"],
            "golden file not found"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_skipped() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempdir().unwrap();
        write(&dir, "a.sy", "");
        write(&dir, "a.out", "0");
        write(&dir, "sub/b.sy", "");
        write(&dir, "sub/b.out", "0");
        let odd_name = OsStr::from_bytes(b"notes\xff.txt");
        fs::write(dir.path().join("sub").as_std_path().join(odd_name), "").unwrap();
        fs::write(dir.path().as_std_path().join(odd_name), "").unwrap();

        let list = TestList::discover(dir.path(), &options(true)).unwrap();
        assert_eq!(relative_paths(&dir, &list), ["a.sy", "sub/b.sy"]);
        assert!(list.issues().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_an_issue() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        write(&dir, "a.sy", "");
        write(&dir, "a.out", "0");
        write(&dir, "locked/b.sy", "");
        write(&dir, "locked/b.out", "0");
        write(&dir, "z/c.sy", "");
        write(&dir, "z/c.out", "0");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            // Privileged users can read the directory anyway.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let list = TestList::discover(dir.path(), &options(true));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let list = list.unwrap();

        assert_eq!(relative_paths(&dir, &list), ["a.sy", "z/c.sy"]);
        assert_eq!(list.issues().len(), 1);
        let issue = &list.issues()[0];
        assert_eq!(issue.path, locked);
        assert_eq!(issue.golden, None);
        assert!(
            issue.reason.starts_with("failed to read directory: "),
            "reason: {}",
            issue.reason
        );
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = tempdir().unwrap();
        write(&dir, "file.sy", "");

        let error = TestList::discover(dir.path().join("file.sy"), &options(false)).unwrap_err();
        assert!(matches!(error, DiscoveryError::RootNotADirectory { .. }));
        let error = TestList::discover(dir.path().join("missing"), &options(false)).unwrap_err();
        assert!(matches!(error, DiscoveryError::RootNotADirectory { .. }));
    }
}
