// Copyright (c) The sytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;

/// Returns the name of a signal, such as `SIGSEGV`.
pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            nix::sys::signal::Signal::try_from(signal)
                .ok()
                .map(|signal| signal.as_str())
        } else {
            let _ = signal;
            None
        }
    }
}

/// Displays a signal number together with its name, if known.
pub(crate) fn display_signal(signal: i32) -> String {
    match signal_str(signal) {
        Some(name) => format!("aborted with signal {signal} ({name})"),
        None => format!("aborted with signal {signal}"),
    }
}

/// Turns a test path into a string that can be used as part of a file name.
pub(crate) fn sanitize_path(path: &Utf8Path) -> String {
    path.as_str().replace(['/', '\\'], "_")
}

/// Shortens `s` to its last `max_len` characters, prefixed with `..`.
pub(crate) fn shorten_left(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        return s.to_owned();
    }
    let tail: String = s.chars().skip(count - max_len).collect();
    format!("..{tail}")
}
