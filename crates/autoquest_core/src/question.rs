//! Question text handling: lookup keys, option detection and index ids.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound on the length of an embedded-row id, in characters.
pub const EMBEDDED_ID_MAX_CHARS: usize = 100;

// `\s*` spans blank lines, so "\n\nYes" is an option line too.
static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\n\s*(Yes|No)\b").expect("option line regex"));

static BINARY_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(Yes|No)\b").expect("binary word regex"));

/// Removes embedded `Yes`/`No` option lines from a form question.
pub fn strip_options(question: &str) -> String {
    OPTION_LINE
        .replace_all(question.trim(), "")
        .trim()
        .to_string()
}

/// Lookup key used by the answer store: options stripped, trimmed, lowercased.
pub fn question_key(question: &str) -> String {
    strip_options(question).to_lowercase()
}

/// True when the question offers a Yes/No choice anywhere in its text.
pub fn is_binary_choice(question: &str) -> bool {
    BINARY_WORD.is_match(question)
}

/// Stable id for a question in the similarity index and the embedded-id log.
pub fn embedded_id(question: &str) -> String {
    question
        .trim()
        .to_lowercase()
        .chars()
        .take(EMBEDDED_ID_MAX_CHARS)
        .collect()
}
