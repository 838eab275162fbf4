use std::sync::Arc;

use anyhow::{Context, Result};
use autoquest_core::{
    AnswerStore, Config, EmbeddingBackend, EmbeddingProvider, GenerativeFallback,
    HashEmbeddingProvider, OllamaEmbeddingProvider, OllamaGenerator, Resolver, VectorIndex,
};
use tracing::info;

fn make_embedder(config: &Config) -> Result<Box<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let provider: Box<dyn EmbeddingProvider> = match embedding.backend {
        EmbeddingBackend::Hash => Box::new(HashEmbeddingProvider::new(embedding.dim)),
        EmbeddingBackend::Ollama => Box::new(
            OllamaEmbeddingProvider::new(
                &embedding.base_url,
                &embedding.model,
                embedding.timeout(),
            )
            .context("build embedding client")?,
        ),
    };
    Ok(provider)
}

async fn open_index(config: &Config) -> Result<VectorIndex> {
    let embedder = make_embedder(config)?;
    if config.server.probe_on_startup {
        embedder.probe().await.context("embedding model unavailable")?;
    }

    let store = &config.vector_store;
    VectorIndex::open(&store.dir, &store.collection, embedder, store.min_similarity)
        .with_context(|| format!("open vector store {}", store.dir.display()))
}

/// Loads the answer sheet, seeds the similarity index from it and connects
/// the generator. Any failure here means the service must not start.
pub async fn bootstrap(config: &Config) -> Result<Resolver> {
    let store = AnswerStore::open(&config.answer_sheet)
        .with_context(|| format!("load answer sheet {}", config.answer_sheet.display()))?;

    let index = open_index(config).await?;
    let snapshot = store.snapshot().context("read answer sheet snapshot")?;
    let embedded = index.seed(&snapshot).await.context("seed similarity index")?;

    let gen_cfg = &config.generator;
    let generator = OllamaGenerator::new(
        &gen_cfg.base_url,
        &gen_cfg.model,
        gen_cfg.temperature,
        gen_cfg.timeout(),
    )
    .context("build generator client")?;
    if config.server.probe_on_startup {
        generator
            .probe()
            .await
            .context("generative model unavailable")?;
    }

    info!(
        answers = store.len(),
        embedded,
        indexed = index.len(),
        model = generator.model(),
        "resolver ready"
    );

    Ok(Resolver::new(
        Arc::new(store),
        Arc::new(index),
        Arc::new(generator),
    ))
}

/// Embeds answer-sheet rows that are not in the index yet.
pub async fn embed_only(config: &Config) -> Result<usize> {
    let store = AnswerStore::open(&config.answer_sheet)
        .with_context(|| format!("load answer sheet {}", config.answer_sheet.display()))?;
    let index = open_index(config).await?;
    let snapshot = store.snapshot().context("read answer sheet snapshot")?;
    index.seed(&snapshot).await.context("seed similarity index")
}
