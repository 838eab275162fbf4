use async_trait::async_trait;

use crate::error::Result;
use crate::model::{IndexEntry, SimilarMatch};

/// Nearest-neighbour lookup over previously answered questions.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// At most `top_k` matches, best first.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<SimilarMatch>>;

    /// Adds a question with its answer. Returns `false` when the question was
    /// already indexed.
    async fn add(&self, text: &str, answer: &str) -> Result<bool>;
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine of the angle between two vectors; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let denom = dot(a, a).sqrt() * dot(b, b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot(a, b) / denom
    }
}

/// The `k` entries closest to `query`, best first. Ties keep index order.
pub fn top_k<'a>(query: &[f32], entries: &'a [IndexEntry], k: usize) -> Vec<(&'a IndexEntry, f32)> {
    if k == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<_> = entries
        .iter()
        .map(|entry| (entry, cosine_similarity(query, &entry.embedding)))
        .collect();
    ranked.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    ranked.truncate(k);
    ranked
}
