// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output normalization and golden file parsing.
//!
//! Both sides of a comparison go through [`normalize_output`]: carriage returns are stripped,
//! every line is trimmed, and blank lines are dropped. Golden files additionally carry the
//! expected return code on their last non-blank line.

use crate::errors::GoldenParseError;
use serde::Serialize;

/// The maximum number of bytes of output kept in an outcome.
pub const PREVIEW_LIMIT: usize = 512;

const TRUNCATED_MARKER: &str = "...(truncated)";

/// Normalizes captured output into its non-blank, trimmed lines.
///
/// Invalid UTF-8 is replaced with U+FFFD.
pub fn normalize_output(output: &[u8]) -> Vec<String> {
    normalize_str(&String::from_utf8_lossy(output))
}

fn normalize_str(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.replace('\r', ""))
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Returns `text` cut down to at most `limit` bytes, with a marker if anything was removed.
pub fn preview(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_owned();
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATED_MARKER}", &text[..end])
}

/// Returns a preview of raw captured output.
pub fn preview_bytes(output: &[u8]) -> String {
    preview(&String::from_utf8_lossy(output), PREVIEW_LIMIT)
}

/// Returns a preview of normalized lines.
pub fn preview_lines(lines: &[String]) -> String {
    preview(&lines.join("\n"), PREVIEW_LIMIT)
}

/// The expected behavior of a test, parsed from its golden (`.out`) file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GoldenOutput {
    /// The expected normalized stdout lines.
    pub lines: Vec<String>,

    /// The expected return code, in `0..=255`.
    pub return_code: u8,
}

impl GoldenOutput {
    /// Parses the contents of a golden file.
    ///
    /// The last non-blank line is the return code, taken modulo 256 (so `-1` is `255`). The code
    /// may be arbitrarily large.
    pub fn parse(contents: &str) -> Result<Self, GoldenParseError> {
        let mut lines = normalize_str(contents);
        let last = lines.pop().ok_or(GoldenParseError::Empty)?;
        let return_code = parse_return_code(&last)
            .ok_or_else(|| GoldenParseError::InvalidReturnCode { line: last.clone() })?;

        Ok(Self { lines, return_code })
    }
}

/// Parses a decimal integer of any size, reduced modulo 256.
fn parse_return_code(line: &str) -> Option<u8> {
    let (negative, digits) = match line.as_bytes().first()? {
        b'-' => (true, &line[1..]),
        b'+' => (false, &line[1..]),
        _ => (false, line),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let magnitude = digits
        .bytes()
        .fold(0u32, |acc, b| (acc * 10 + u32::from(b - b'0')) % 256);
    let code = if negative {
        (256 - magnitude) % 256
    } else {
        magnitude
    };
    u8::try_from(code).ok()
}
