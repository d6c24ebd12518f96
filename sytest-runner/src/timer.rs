// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extracts the elapsed time that a test program reports on stderr.
//!
//! Programs built against the runtime library print a trailer such as
//! `TOTAL: 0H-0M-1S-500000us` when they exit. Only a trailer at the very end of the stream counts.

use crate::errors::TimerParseError;
use regex::Regex;
use std::sync::LazyLock;

static TIMER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TOTAL:\s*(\d+)H-(\d+)M-(\d+)S-(-?\d+)us\s*$").expect("timer regex is valid")
});

/// Parses the timer trailer out of `stderr`, returning the elapsed time in seconds.
pub fn parse_timer(stderr: &[u8]) -> Result<f64, TimerParseError> {
    let text = String::from_utf8_lossy(stderr);
    let error = || {
        let last_line = text.lines().rev().find(|line| !line.trim().is_empty());
        TimerParseError::new(last_line.unwrap_or_default().trim())
    };

    let captures = TIMER_REGEX.captures(&text).ok_or_else(error)?;
    let field = |idx: usize| -> Result<f64, TimerParseError> {
        captures[idx].parse::<i64>().map(|n| n as f64).map_err(|_| error())
    };

    let hours = field(1)?;
    let minutes = field(2)?;
    let seconds = field(3)?;
    let micros = field(4)?;
    Ok(hours * 3600.0 + minutes * 60.0 + seconds + micros / 1e6)
}
