//! Helpers that keep user-submitted text from breaking single-line log records.
//!
//! Post bodies, thread names and search strings arrive from the network and may
//! contain newlines or terminal control sequences. Everything that ends up in a
//! log line goes through [escape_log] (or [preview] for long bodies) first.

use std::fmt::Write;

/// Default cap for logged user text.
pub const DEFAULT_PREVIEW: usize = 120;

/// Escape `s` for a single log line, capped at [DEFAULT_PREVIEW] characters.
pub fn escape_log(s: &str) -> String {
    preview(s, DEFAULT_PREVIEW)
}

/// Escape `s` and truncate it to `max_chars` characters, appending `…` when cut.
///
/// Backslash, `\n`, `\r` and `\t` become their escaped forms; any other control
/// character is written as `\xNN`.
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
