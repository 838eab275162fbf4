use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{AutoQuestError, Result};
use crate::model::AnswerRecord;

pub const QUESTION_COLUMN: &str = "Question";
pub const ANSWER_COLUMN: &str = "Answer";

/// Reads every data row of the answer sheet, including incomplete ones.
///
/// Extra columns are ignored. Missing cells read as empty strings.
pub fn read_rows_csv(path: &Path) -> Result<Vec<AnswerRecord>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| {
                AutoQuestError::InvalidSheet(format!(
                    "{}: missing '{name}' column",
                    path.display()
                ))
            })
    };
    let q_idx = column(QUESTION_COLUMN)?;
    let a_idx = column(ANSWER_COLUMN)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(AnswerRecord::new(
            record.get(q_idx).unwrap_or_default(),
            record.get(a_idx).unwrap_or_default(),
        ));
    }

    Ok(rows)
}

/// Rewrites the whole answer sheet. The table is written to a sibling temp
/// file first and renamed into place.
pub fn save_rows_csv(path: &Path, rows: &[AnswerRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record([QUESTION_COLUMN, ANSWER_COLUMN])?;
        for row in rows {
            writer.write_record([row.question.as_str(), row.answer.as_str()])?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Drops repeated (question, answer) pairs, keeping the last occurrence of
/// each. Relative order of the surviving rows is unchanged.
pub fn dedup_keep_last(rows: Vec<AnswerRecord>) -> Vec<AnswerRecord> {
    let mut seen = HashSet::new();
    let mut kept: Vec<AnswerRecord> = rows
        .into_iter()
        .rev()
        .filter(|row| seen.insert((row.question.clone(), row.answer.clone())))
        .collect();
    kept.reverse();
    kept
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
