//! Coerces free-form model output into a canonical answer shape.
//!
//! Rules are tried in a fixed order and the first one that matches wins:
//!
//! 1. an explicit `Answer: Yes` / `Answer: No` label
//! 2. for Yes/No questions, any mention of "yes" or "no", defaulting to `Yes`
//! 3. a standalone experience level `3` or `4`
//! 4. any other `Answer: <text>` label
//! 5. the last line of the output

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::question::is_binary_choice;

static LABELLED_BINARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Answer:\s*(Yes|No)\b").expect("labelled binary regex"));

static EXPERIENCE_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([34])\b").expect("experience level regex"));

static LABELLED_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Answer:\s*(.+)").expect("labelled text regex"));

/// Which normalization rule produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Empty,
    LabelledBinary,
    BinaryMention,
    /// Yes/No question, but the output mentioned neither.
    BinaryDefault,
    ExperienceLevel,
    LabelledText,
    LastLine,
}

impl Rule {
    pub fn is_low_confidence(self) -> bool {
        matches!(self, Rule::BinaryDefault)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub answer: String,
    pub rule: Rule,
}

impl Normalized {
    fn new(answer: impl Into<String>, rule: Rule) -> Self {
        Self {
            answer: answer.into(),
            rule,
        }
    }
}

pub fn normalize(model_output: &str, question: &str) -> String {
    normalize_detailed(model_output, question).answer
}

pub fn normalize_detailed(model_output: &str, question: &str) -> Normalized {
    let raw = model_output.trim();
    if raw.is_empty() {
        return Normalized::new(String::new(), Rule::Empty);
    }

    if let Some(caps) = LABELLED_BINARY.captures(raw) {
        return Normalized::new(&caps[1], Rule::LabelledBinary);
    }

    if is_binary_choice(question) {
        let lowered = raw.to_lowercase();
        return if lowered.contains("yes") {
            Normalized::new("Yes", Rule::BinaryMention)
        } else if lowered.contains("no") {
            Normalized::new("No", Rule::BinaryMention)
        } else {
            Normalized::new("Yes", Rule::BinaryDefault)
        };
    }

    if let Some(caps) = EXPERIENCE_LEVEL.captures(raw) {
        return Normalized::new(&caps[1], Rule::ExperienceLevel);
    }

    if let Some(caps) = LABELLED_TEXT.captures(raw) {
        return Normalized::new(caps[1].trim(), Rule::LabelledText);
    }

    let last = raw.lines().last().map(str::trim).unwrap_or(raw);
    Normalized::new(last, Rule::LastLine)
}
