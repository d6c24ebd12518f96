// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Performance tables.

use crate::{
    helpers::shorten_left,
    perf::{Baseline, Comparison},
};
use indexmap::IndexMap;
use std::io::{self, Write};

/// Paths in tables are shortened to this many characters.
const PATH_WIDTH: usize = 30;

/// Writes one line per sample, with the change against the baseline if there is one.
pub fn write_perf_table(comparisons: &[Comparison], mut writer: impl Write) -> io::Result<()> {
    for comparison in comparisons {
        write!(
            writer,
            "{:<32} {:>10.6}s",
            shorten_left(&comparison.path, PATH_WIDTH),
            comparison.current,
        )?;
        if let (Some(previous), Some(delta)) = (comparison.previous, comparison.delta) {
            write!(writer, "; Prev: {previous:>10.6}s, {:>+.3}%", delta * 100.0)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Elapsed times of every test across several pipelines.
#[derive(Clone, Debug, Default)]
pub struct ComparisonTable {
    pipelines: Vec<String>,
    rows: IndexMap<String, Vec<Option<f64>>>,
}

impl ComparisonTable {
    /// Builds a table from each pipeline's samples. Rows are in first-seen order.
    pub fn new<'a>(samples: impl IntoIterator<Item = (&'a str, &'a Baseline)>) -> Self {
        let mut table = Self::default();
        for (column, (pipeline, baseline)) in samples.into_iter().enumerate() {
            table.pipelines.push(pipeline.to_owned());
            for (path, elapsed) in baseline.iter() {
                let row = table.rows.entry(path.to_owned()).or_default();
                row.resize(column + 1, None);
                row[column] = Some(elapsed);
            }
        }

        let width = table.pipelines.len();
        for row in table.rows.values_mut() {
            row.resize(width, None);
        }
        table
    }

    /// Returns the pipeline names, in column order.
    pub fn pipelines(&self) -> &[String] {
        &self.pipelines
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the table as aligned text.
    pub fn write_text(&self, mut writer: impl Write) -> io::Result<()> {
        write!(writer, "{:<32}", "file")?;
        for pipeline in &self.pipelines {
            write!(writer, " {:>12}", shorten_left(pipeline, 10))?;
        }
        writeln!(writer)?;

        for (path, row) in &self.rows {
            write!(writer, "{:<32}", shorten_left(path, PATH_WIDTH))?;
            for cell in row {
                match cell {
                    Some(elapsed) => write!(writer, " {elapsed:>11.6}s")?,
                    None => write!(writer, " {:>12}", "-")?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Writes the table as CSV, with a `file,<pipeline>...` header. Missing samples are empty
    /// cells.
    pub fn write_csv(&self, mut writer: impl Write) -> io::Result<()> {
        write!(writer, "file")?;
        for pipeline in &self.pipelines {
            write!(writer, ",{}", csv_field(pipeline))?;
        }
        writeln!(writer)?;

        for (path, row) in &self.rows {
            write!(writer, "{}", csv_field(path))?;
            for cell in row {
                match cell {
                    Some(elapsed) => write!(writer, ",{elapsed}")?,
                    None => write!(writer, ",")?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
