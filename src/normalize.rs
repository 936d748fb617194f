//! Response normalizer: strips markdown fencing and trailing whitespace.

use regex::Regex;
use std::sync::LazyLock;

/// First fenced block: opening fence plus info string, interior, closing fence.
static RE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap());

/// Normalize backend output.
///
/// Keeps only the interior of the first fenced block if there is one,
/// trims trailing whitespace on every line and drops leading and trailing
/// blank lines. The result is idempotent under a second call.
pub fn normalize(raw: &str) -> String {
    let body = match RE_FENCE.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw,
    };

    let lines: Vec<&str> = body.lines().map(str::trim_end).collect();
    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Like [`normalize`], but `None` when nothing is left to insert.
pub fn normalize_non_empty(raw: &str) -> Option<String> {
    let text = normalize(raw);
    (!text.is_empty()).then_some(text)
}
