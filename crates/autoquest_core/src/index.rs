//! Persistent vector index over answered questions.
//!
//! Entries live in `<dir>/<collection>.jsonl`. The set of question ids that
//! have already been embedded is kept in `<dir>/embedded_ids.json`, so
//! reseeding from the answer sheet after a restart only embeds new rows.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::model::{AnswerRecord, IndexEntry, SimilarMatch};
use crate::question::embedded_id;
use crate::retrieval::{top_k, SimilarityIndex};

pub const EMBEDDED_IDS_FILE: &str = "embedded_ids.json";

#[derive(Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    embedded_ids: HashSet<String>,
}

pub struct VectorIndex {
    embedder: Box<dyn EmbeddingProvider>,
    entries_path: PathBuf,
    ids_path: PathBuf,
    min_similarity: Option<f32>,
    state: RwLock<IndexState>,
    // Serializes file writes; `state` is only locked for in-memory updates.
    writer: Mutex<()>,
}

impl VectorIndex {
    pub fn open(
        dir: &Path,
        collection: &str,
        embedder: Box<dyn EmbeddingProvider>,
        min_similarity: Option<f32>,
    ) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let entries_path = dir.join(format!("{collection}.jsonl"));
        let ids_path = dir.join(EMBEDDED_IDS_FILE);

        let mut state = IndexState::default();
        if entries_path.exists() {
            state.entries = load_entries_jsonl(&entries_path)?;
            if ids_path.exists() {
                state.embedded_ids = load_embedded_ids(&ids_path)?;
            }
        } else if ids_path.exists() {
            warn!(
                path = %ids_path.display(),
                "embedded-id log without index entries, discarding it"
            );
        }
        state
            .embedded_ids
            .extend(state.entries.iter().map(|e| e.id.clone()));

        info!(
            collection,
            entries = state.entries.len(),
            "similarity index opened"
        );

        Ok(Self {
            embedder,
            entries_path,
            ids_path,
            min_similarity,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_embedded(&self, question: &str) -> bool {
        self.read().embedded_ids.contains(&embedded_id(question))
    }

    /// Embeds every complete record not yet in the index and rewrites the
    /// embedded-id log. Returns how many records were embedded.
    pub async fn seed(&self, records: &[AnswerRecord]) -> Result<usize> {
        let mut added = 0;
        for record in records.iter().filter(|r| r.is_complete()) {
            if self.insert(&record.question, &record.answer).await? {
                added += 1;
            }
        }
        self.save_embedded_ids().await?;
        info!(added, total = self.len(), "similarity index seeded");
        Ok(added)
    }

    async fn insert(&self, question: &str, answer: &str) -> Result<bool> {
        let question = question.trim();
        let id = embedded_id(question);
        let known = self.read().embedded_ids.contains(&id);
        if known {
            return Ok(false);
        }

        let embedding = self.embedder.embed(question).await?;
        let entry = IndexEntry {
            id: id.clone(),
            question: question.to_string(),
            answer: answer.trim().to_string(),
            embedding,
            created_at: Utc::now(),
        };

        let _writer = self.writer.lock().await;
        // Another writer may have embedded the same question meanwhile.
        let known = self.read().embedded_ids.contains(&id);
        if known {
            return Ok(false);
        }

        // The id is only recorded once its entry is on disk.
        let path = self.entries_path.clone();
        let line = entry.clone();
        tokio::task::spawn_blocking(move || append_entry_jsonl(&path, &line)).await??;

        debug!(id = %entry.id, "question embedded");
        let mut state = self.write();
        state.embedded_ids.insert(id);
        state.entries.push(entry);
        Ok(true)
    }

    async fn save_embedded_ids(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut ids: Vec<String> = self.read().embedded_ids.iter().cloned().collect();
        ids.sort();
        let path = self.ids_path.clone();
        tokio::task::spawn_blocking(move || write_embedded_ids(&path, &ids)).await?
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SimilarityIndex for VectorIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SimilarMatch>> {
        let empty = self.is_empty();
        if k == 0 || empty {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(text).await?;
        let state = self.read();
        Ok(top_k(&query_embedding, &state.entries, k)
            .into_iter()
            .filter(|(_, score)| self.min_similarity.is_none_or(|min| *score >= min))
            .map(|(entry, score)| SimilarMatch {
                question: entry.question.clone(),
                answer: entry.answer.clone(),
                score,
            })
            .collect())
    }

    async fn add(&self, text: &str, answer: &str) -> Result<bool> {
        let added = self.insert(text, answer).await?;
        if added {
            self.save_embedded_ids().await?;
        }
        Ok(added)
    }
}

pub fn load_entries_jsonl(path: &Path) -> Result<Vec<IndexEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }

    Ok(entries)
}

fn append_entry_jsonl(path: &Path, entry: &IndexEntry) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, entry)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn write_embedded_ids(path: &Path, ids: &[String]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, ids)?;
    writer.flush()?;
    Ok(())
}

fn load_embedded_ids(path: &Path) -> Result<HashSet<String>> {
    let ids: Vec<String> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use crate::error::AutoQuestError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn hash_index(dir: &Path, min_similarity: Option<f32>) -> VectorIndex {
        VectorIndex::open(
            dir,
            "qa",
            Box::new(HashEmbeddingProvider::new(256)),
            min_similarity,
        )
        .unwrap()
    }

    fn records() -> Vec<AnswerRecord> {
        vec![
            AnswerRecord::new("How many years of Python experience do you have?", "4"),
            AnswerRecord::new("Are you comfortable with W2?", "Yes"),
            AnswerRecord::new("Incomplete row", ""),
        ]
    }

    struct CountingEmbedder {
        inner: HashEmbeddingProvider,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AutoQuestError::Model("offline".into()))
        }
    }

    #[tokio::test]
    async fn query_returns_closest_question_first() {
        let dir = tempfile::tempdir().unwrap();
        let index = hash_index(dir.path(), None);
        assert_eq!(index.seed(&records()).await.unwrap(), 2);

        let hits = index
            .query("Years of Python experience?", 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].answer, "4");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn empty_index_does_not_embed_queries() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), "qa", Box::new(FailingEmbedder), None).unwrap();
        assert!(index.query("anything", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn min_similarity_filters_weak_matches() {
        let dir = tempfile::tempdir().unwrap();
        let index = hash_index(dir.path(), Some(0.99));
        index.seed(&records()).await.unwrap();

        assert!(index.query("Unrelated salary question", 1).await.unwrap().is_empty());
        let exact = index
            .query("Are you comfortable with W2?", 1)
            .await
            .unwrap();
        assert_eq!(exact[0].answer, "Yes");
    }

    #[tokio::test]
    async fn reseeding_after_restart_embeds_only_new_rows() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let open = || {
            VectorIndex::open(
                dir.path(),
                "qa",
                Box::new(CountingEmbedder {
                    inner: HashEmbeddingProvider::new(64),
                    calls: Arc::clone(&calls),
                }),
                None,
            )
            .unwrap()
        };

        let first = open();
        assert_eq!(first.seed(&records()).await.unwrap(), 2);
        drop(first);

        let mut more = records();
        more.push(AnswerRecord::new("Do you need sponsorship?", "No"));
        let second = open();
        assert_eq!(second.len(), 2);
        assert_eq!(second.seed(&more).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let ids = load_embedded_ids(&dir.path().join(EMBEDDED_IDS_FILE)).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("do you need sponsorship?"));
    }

    #[tokio::test]
    async fn add_skips_questions_already_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let index = hash_index(dir.path(), None);

        assert!(index.add("Do you relocate?", "Yes").await.unwrap());
        assert!(!index.add("  do you RELOCATE?  ", "No").await.unwrap());
        assert_eq!(index.len(), 1);
        assert!(index.is_embedded("Do you relocate?"));

        let reopened = hash_index(dir.path(), None);
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn failed_entry_write_leaves_question_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let index = hash_index(dir.path(), None);
        let entries = dir.path().join("qa.jsonl");
        fs::create_dir(&entries).unwrap();

        assert!(index.add("Do you relocate?", "Yes").await.is_err());
        assert!(!index.is_embedded("Do you relocate?"));
        assert!(index.is_empty());

        fs::remove_dir(&entries).unwrap();
        assert!(index.add("Do you relocate?", "Yes").await.unwrap());
        let hits = index.query("Do you relocate?", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].answer, "Yes");

        let ids = load_embedded_ids(&dir.path().join(EMBEDDED_IDS_FILE)).unwrap();
        assert!(ids.contains("do you relocate?"));
    }

    #[tokio::test]
    async fn orphaned_id_log_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(EMBEDDED_IDS_FILE),
            r#"["are you comfortable with w2?"]"#,
        )
        .unwrap();

        let index = hash_index(dir.path(), None);
        assert_eq!(index.seed(&records()).await.unwrap(), 2);
    }
}
