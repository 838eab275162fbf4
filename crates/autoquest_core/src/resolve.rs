//! The answer-resolution chain: answer sheet, then similarity index, then
//! the generative fallback. Every resolved pair is written back.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AutoQuestError, Result};
use crate::generate::{GenerativeFallback, INSTRUCTION_TEMPLATE};
use crate::model::{AnswerSource, Resolution, SimilarMatch};
use crate::normalize::normalize_detailed;
use crate::question::question_key;
use crate::retrieval::SimilarityIndex;
use crate::store::AnswerStore;

pub struct Resolver {
    store: Arc<AnswerStore>,
    index: Arc<dyn SimilarityIndex>,
    generator: Arc<dyn GenerativeFallback>,
}

impl Resolver {
    pub fn new(
        store: Arc<AnswerStore>,
        index: Arc<dyn SimilarityIndex>,
        generator: Arc<dyn GenerativeFallback>,
    ) -> Self {
        Self {
            store,
            index,
            generator,
        }
    }

    pub fn store(&self) -> &AnswerStore {
        &self.store
    }

    pub async fn resolve(&self, question: &str) -> Result<Resolution> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AutoQuestError::InvalidArg("question must not be empty".into()));
        }

        let key = question_key(question);
        let (raw, source, score) = if let Some(answer) = self.store.get(&key) {
            debug!(%key, "answer sheet hit");
            (answer, AnswerSource::Store, None)
        } else if let Some(hit) = self.closest(question).await {
            debug!(%key, matched = %hit.question, score = hit.score, "similarity hit");
            (hit.answer, AnswerSource::Similarity, Some(hit.score))
        } else {
            debug!(%key, "falling back to generation");
            let output = self.generator.complete(INSTRUCTION_TEMPLATE, question).await?;
            (output, AnswerSource::Generated, None)
        };

        let normalized = normalize_detailed(&raw, question);
        let low_confidence = normalized.rule.is_low_confidence();
        if low_confidence {
            warn!(%key, ?source, raw = %raw, "binary answer undetermined, defaulted to Yes");
        }

        self.remember(question, &normalized.answer).await;

        Ok(Resolution {
            answer: normalized.answer,
            source,
            low_confidence,
            score,
        })
    }

    async fn closest(&self, question: &str) -> Option<SimilarMatch> {
        match self.index.query(question, 1).await {
            Ok(hits) => hits
                .into_iter()
                .next()
                .filter(|hit| !hit.answer.trim().is_empty()),
            Err(err) => {
                warn!(error = %err, "similarity query failed, treating as miss");
                None
            }
        }
    }

    /// Persists the pair and mirrors it into the index. Both steps are
    /// best-effort; failures are logged only.
    async fn remember(&self, question: &str, answer: &str) {
        let store = Arc::clone(&self.store);
        let (q, a) = (question.to_string(), answer.to_string());
        let persisted = match tokio::task::spawn_blocking(move || store.append(&q, &a)).await {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(error = %err, "answer sheet write task failed");
                false
            }
        };
        if !persisted {
            return;
        }

        if let Err(err) = self.index.add(question, answer).await {
            warn!(error = %err, "could not add resolved answer to similarity index");
        }
    }
}
