use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AutoQuestError, Result};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fails when the backing model cannot serve requests.
    async fn probe(&self) -> Result<()> {
        self.embed("ping").await.map(|_| ())
    }
}

#[async_trait]
impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn probe(&self) -> Result<()> {
        (**self).probe().await
    }
}

/// Feature-hashing embedder. Needs no model, so it suits tests and offline use.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut counts = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());
        for token in tokens {
            counts[bucket(token, self.dim)] += 1.0;
        }
        Ok(unit_length(counts))
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

// FNV-1a keeps buckets stable across runs, unlike the std hasher.
fn bucket(token: &str, dim: usize) -> usize {
    let hash = token
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    (hash % dim as u64) as usize
}

fn unit_length(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings served by a local Ollama instance through `/api/embed`.
pub struct OllamaEmbeddingProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbeddingProvider {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AutoQuestError::Model(format!(
                "embedding model {} returned status {}",
                self.model,
                response.status()
            )));
        }

        let body: OllamaEmbedResponse = response.json().await?;
        first_embedding(body, &self.model)
    }

    async fn probe(&self) -> Result<()> {
        self.embed("ping").await.map(|_| ()).map_err(|err| {
            AutoQuestError::BackendUnavailable(format!("embedding model {}: {err}", self.model))
        })
    }
}

fn first_embedding(body: OllamaEmbedResponse, model: &str) -> Result<Vec<f32>> {
    body.embeddings
        .into_iter()
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AutoQuestError::Model(format!("embedding model {model} returned no vector")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::cosine_similarity;

    #[tokio::test]
    async fn hash_embeddings_are_unit_length_and_deterministic() {
        let e = HashEmbeddingProvider::new(64);
        let a = e.embed("Are you comfortable with W2?").await.unwrap();
        let b = e.embed("are you COMFORTABLE with w2").await.unwrap();

        assert_eq!(a.len(), 64);
        assert!((a.iter().map(|x| x * x).sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_embedding_of_blank_text_is_zero() {
        let e = HashEmbeddingProvider::new(2);
        let v = e.embed("  ?! ").await.unwrap();
        assert_eq!(v.len(), 8);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn ollama_response_takes_first_vector() {
        let body: OllamaEmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2],[0.3,0.4]]}"#).unwrap();
        assert_eq!(first_embedding(body, "m").unwrap(), vec![0.1, 0.2]);

        let empty: OllamaEmbedResponse = serde_json::from_str(r#"{"embeddings":[]}"#).unwrap();
        assert!(matches!(
            first_embedding(empty, "m"),
            Err(AutoQuestError::Model(_))
        ));
    }
}
