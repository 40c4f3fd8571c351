//! Path and JSON helpers shared by the service handlers.

use std::fmt::Write;
use std::path::PathBuf;

/// How strings are escaped inside generated JSON array literals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonEscaping {
    /// Standard JSON string escaping.
    #[default]
    Standard,
    /// Backslashes are written as `/`, and BEL and VT are written as `\a`
    /// and `\v`. Older script consumers expect this form.
    Legacy,
}

impl JsonEscaping {
    pub fn from_legacy_flag(legacy: bool) -> Self {
        if legacy {
            JsonEscaping::Legacy
        } else {
            JsonEscaping::Standard
        }
    }
}

/// Convert separators to the platform's preferred one.
///
/// Script code always uses `/`; Windows APIs want `\`.
pub fn fix_separators(path: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(path.replace('/', "\\"))
    } else {
        PathBuf::from(path)
    }
}

/// Drop a single trailing `/` or `\`.
///
/// Roots (`/`, `C:\`) are left alone.
pub fn strip_trailing_separator(path: &str) -> &str {
    match path.strip_suffix(|c: char| c == '/' || c == '\\') {
        Some(rest) if !rest.is_empty() && !rest.ends_with(':') => rest,
        _ => path,
    }
}

/// Render `items` as a JSON array of strings.
pub fn json_string_array<I, S>(items: I, escaping: JsonEscaping) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::from("[");
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        match escaping {
            JsonEscaping::Standard => {
                out.push_str(&serde_json::Value::from(item.as_ref()).to_string());
            }
            JsonEscaping::Legacy => {
                out.push('"');
                escape_legacy(item.as_ref(), &mut out);
                out.push('"');
            }
        }
    }
    out.push(']');
    out
}

fn escape_legacy(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0B}' => out.push_str("\\v"),
            '"' => out.push_str("\\\""),
            '\\' => out.push('/'),
            c if c < ' ' => {
                // Writing to a String cannot fail.
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
}
