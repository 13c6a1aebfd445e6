//! `KEY=VALUE` line codec for the on-disk configuration files.
//!
//! Files hold shell variables (`WIFI_SSID="my ap"`) that the access-point
//! scripts source directly, so every value written must be safe to embed
//! in a shell assignment. Keys use two spellings:
//!
//! | Format | Example | Used by |
//! |--------|---------|---------|
//! | storage | `WIFI_INTERFACE_MODE` | files on disk |
//! | representation | `wifi.interface-mode` | HTTP API, in-memory maps |
//!
//! Converting storage to representation turns only the **first** `_`
//! into `.`; the rest become `-`.

use std::borrow::Cow;

use crate::value::ConfigValue;

/// Characters that force a value to be double-quoted.
const SHELL_SPECIAL: &[char] = &['\\', '"', '\'', '`', '$', '\n', '\t', ' ', '#'];

/// Characters that are backslash-escaped inside double quotes.
const ESCAPED: &[char] = &['\\', '"', '`', '$'];

/// Convert a representation key (`wifi.operation-mode`) to its storage
/// spelling (`WIFI_OPERATION_MODE`).
pub fn repr_to_storage(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Convert a storage key (`WIFI_OPERATION_MODE`) to its representation
/// spelling (`wifi.operation-mode`).
pub fn storage_to_repr(key: &str) -> String {
    let mut seen_separator = false;
    key.chars()
        .map(|c| match c {
            '_' if !seen_separator => {
                seen_separator = true;
                '.'
            }
            '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Escape a value for embedding in a shell variable assignment.
///
/// Values without any shell-special character are returned unchanged.
/// Everything else is wrapped in double quotes with `\ " ` $` escaped.
pub fn escape_value(value: &str) -> String {
    if !value.contains(SHELL_SPECIAL) {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 8);
    out.push('"');
    for c in value.chars() {
        if ESCAPED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Reverse [`escape_value`].
///
/// One matching pair of surrounding quotes is stripped. Backslash escapes
/// are only honoured inside double quotes; bare and single-quoted text is
/// returned literally.
pub fn unescape_value(raw: &str) -> String {
    if let Some(inner) = strip_quotes(raw, '\'') {
        return inner.to_string();
    }
    let Some(inner) = strip_quotes(raw, '"') else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if ESCAPED.contains(&next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn strip_quotes(raw: &str, quote: char) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

/// Format one configuration entry as a file line, including the newline.
pub fn encode_line(key: &str, value: &ConfigValue) -> String {
    format!(
        "{}={}\n",
        repr_to_storage(key),
        escape_value(&value.to_string())
    )
}

/// Split a raw line into its storage key and raw value.
///
/// Blank lines, `#` comments, and lines without a non-empty key before the
/// first `=` yield `None`.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once('=') {
        Some((key, value)) if !key.is_empty() => Some((key, value)),
        _ => None,
    }
}

/// Iterate over the entries of file text.
///
/// An entry usually spans one line, but a double-quoted value holding a
/// newline continues until its closing quote.
pub fn logical_lines(content: &str) -> LogicalLines<'_> {
    LogicalLines {
        lines: content.lines(),
    }
}

/// Iterator returned by [`logical_lines`].
pub struct LogicalLines<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> Iterator for LogicalLines<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.lines.next()?;
        if !opens_quote(first) {
            return Some(Cow::Borrowed(first));
        }

        let mut joined = first.to_string();
        while opens_quote(&joined) {
            let Some(next) = self.lines.next() else {
                break;
            };
            joined.push('\n');
            joined.push_str(next);
        }
        Some(Cow::Owned(joined))
    }
}

/// Whether the value of `line` starts a double-quoted string the line does
/// not close.
fn opens_quote(line: &str) -> bool {
    let Some(rest) = split_line(line).and_then(|(_, raw)| raw.strip_prefix('"')) else {
        return false;
    };
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => return false,
            _ => {}
        }
    }
    true
}

/// Decode one file line into a representation key and its value.
pub fn decode_line(line: &str) -> Option<(String, ConfigValue)> {
    let (key, raw) = split_line(line)?;
    Some((
        storage_to_repr(key),
        ConfigValue::from_text(unescape_value(raw)),
    ))
}
