use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\u{a0}]+").unwrap());

/// Straighten typographic quotes and collapse whitespace runs.
pub fn normalize_verse(text: &str) -> String {
    let straightened: String = text
        .chars()
        .map(|c| match c {
            '‘' | '’' => '\'',
            '“' | '”' => '"',
            other => other,
        })
        .collect();
    WHITESPACE_RE
        .replace_all(&straightened, " ")
        .trim()
        .to_string()
}
