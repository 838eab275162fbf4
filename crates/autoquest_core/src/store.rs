//! The answer sheet: an in-memory question map backed by a CSV table.
//!
//! Writers are serialized by a dedicated lock held across the
//! read-merge-rewrite of the file, so concurrent appends never drop rows.
//! The question map has its own short-lived lock; lookups never wait on
//! a file rewrite.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info};

use crate::error::Result;
use crate::model::AnswerRecord;
use crate::question::question_key;
use crate::storage::{dedup_keep_last, read_rows_csv, save_rows_csv};

pub struct AnswerStore {
    path: PathBuf,
    answers: RwLock<HashMap<String, String>>,
    writer: Mutex<()>,
}

impl AnswerStore {
    /// Loads the sheet at `path`. A missing file is an empty sheet; an
    /// unreadable or malformed one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut answers = HashMap::new();

        if path.exists() {
            for row in read_rows_csv(&path)?.into_iter().filter(AnswerRecord::is_complete) {
                answers.insert(question_key(&row.question), row.answer.trim().to_string());
            }
            info!(path = %path.display(), entries = answers.len(), "answer sheet loaded");
        } else {
            info!(path = %path.display(), "answer sheet not found, starting empty");
        }

        Ok(Self::with_answers(path, answers))
    }

    fn with_answers(path: PathBuf, answers: HashMap<String, String>) -> Self {
        Self {
            path,
            answers: RwLock::new(answers),
            writer: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete rows currently on disk, in table order.
    pub fn snapshot(&self) -> Result<Vec<AnswerRecord>> {
        let _writer = self.lock_writer();
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Ok(read_rows_csv(&self.path)?
            .into_iter()
            .filter(AnswerRecord::is_complete)
            .collect())
    }

    /// Records a resolved pair and rewrites the sheet.
    ///
    /// Returns whether the pair reached disk. Flush failures are logged and
    /// swallowed; the in-memory map is updated either way.
    pub fn append(&self, question: &str, answer: &str) -> bool {
        let record = AnswerRecord::new(question.trim(), answer.trim());
        if !record.is_complete() {
            debug!(question = %record.question, "skipping incomplete answer record");
            return false;
        }

        let _writer = self.lock_writer();
        self.write()
            .insert(question_key(&record.question), record.answer.clone());

        match self.flush(record) {
            Ok(()) => true,
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "could not persist answer sheet");
                false
            }
        }
    }

    // Callers hold the writer lock.
    fn flush(&self, record: AnswerRecord) -> Result<()> {
        let mut rows = if self.path.exists() {
            read_rows_csv(&self.path)?
        } else {
            Vec::new()
        };
        rows.push(record);
        save_rows_csv(&self.path, &dedup_keep_last(rows))?;
        debug!(path = %self.path.display(), "answer sheet written");
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.answers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.answers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}
